use crate::config::{BLOCK_SIZE, PRESENCE_COLUMN_ID};
use crate::storage::storage_util::pad_up_to_size;
use crate::utils::bitmap;

/// Schema of one block: per-column attribute sizes plus the derived slot
/// count and mini-block offsets. Immutable after construction.
///
/// Column 0 is the presence column. It is pointer-sized, its null bit is
/// the slot liveness bit, and its value stores the version chain head.
/// Data columns (ids >= 1) are ordered so ascending id means non-increasing
/// attribute size; that ordering is what makes sorted projections pack
/// densely.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BlockLayout {
    attr_sizes: Vec<u8>,
    tuple_size: u32,
    header_size: u32,
    num_slots: u32,
    column_offsets: Vec<u32>,
}

impl BlockLayout {
    pub fn new(attr_sizes: Vec<u8>) -> Self {
        assert!(
            attr_sizes.len() >= 2 && attr_sizes.len() <= u16::MAX as usize,
            "layout needs the presence column and at least one data column"
        );
        assert_eq!(
            attr_sizes[PRESENCE_COLUMN_ID as usize], 8,
            "presence column stores a version pointer"
        );
        for &size in &attr_sizes {
            assert!(
                matches!(size, 1 | 2 | 4 | 8 | 16),
                "invalid attribute size {}",
                size
            );
        }
        for pair in attr_sizes[1..].windows(2) {
            debug_assert!(
                pair[0] >= pair[1],
                "data columns must be ordered by non-increasing size"
            );
        }

        let tuple_size: u32 = attr_sizes.iter().map(|&size| size as u32).sum();
        let header_size = Self::compute_header_size(attr_sizes.len() as u16);

        // Upper bound on the slot count: each slot needs its value bytes
        // plus one null bit per column. Alignment padding can push that
        // estimate past the block end, so shrink until the walk fits.
        let payload_bits = (BLOCK_SIZE as u64 - header_size as u64) * 8;
        let mut num_slots =
            (payload_bits / (tuple_size as u64 * 8 + attr_sizes.len() as u64)) as u32;
        let mut column_offsets = Vec::with_capacity(attr_sizes.len());
        while Self::walk_offsets(&attr_sizes, header_size, num_slots, &mut column_offsets)
            > BLOCK_SIZE as u32
        {
            num_slots -= 1;
        }
        assert!(num_slots > 0, "tuple does not fit in a block");

        BlockLayout {
            attr_sizes,
            tuple_size,
            header_size,
            num_slots,
            column_offsets,
        }
    }

    /// Bytes of the block header: layout version, record count, slot count,
    /// per-column mini-block offsets, column count, and per-column sizes,
    /// padded so the first mini-block starts 8-aligned.
    fn compute_header_size(num_cols: u16) -> u32 {
        let size = 4 + 4 + 4 + 4 * num_cols as u32 + 2 + num_cols as u32;
        pad_up_to_size(8, size)
    }

    /// Place each mini-block (null bitmap, then values aligned to the
    /// attribute size) at the next 8-aligned offset, in column id order.
    /// Returns one past the end of the last mini-block.
    fn walk_offsets(attr_sizes: &[u8], header_size: u32, num_slots: u32, out: &mut Vec<u32>) -> u32 {
        out.clear();
        let mut offset = header_size;
        for &size in attr_sizes {
            offset = pad_up_to_size(8, offset);
            out.push(offset);
            offset = pad_up_to_size(size, offset + bitmap::bytes_for(num_slots));
            offset += num_slots * size as u32;
        }
        offset
    }

    pub fn num_cols(&self) -> u16 {
        self.attr_sizes.len() as u16
    }

    pub fn attr_size(&self, col: u16) -> u8 {
        self.attr_sizes[col as usize]
    }

    pub fn attr_sizes(&self) -> &[u8] {
        &self.attr_sizes
    }

    /// Bytes of one logical tuple, summed over all columns.
    pub fn tuple_size(&self) -> u32 {
        self.tuple_size
    }

    pub fn header_size(&self) -> u32 {
        self.header_size
    }

    pub fn num_slots(&self) -> u32 {
        self.num_slots
    }

    /// Offset of the column's mini-block from the block start.
    pub fn column_offset(&self, col: u16) -> u32 {
        self.column_offsets[col as usize]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::test_util;
    use rand::prelude::*;

    #[test]
    fn test_mini_blocks_stay_in_bounds() {
        let mut rng = StdRng::seed_from_u64(0x1a);
        for _ in 0..50 {
            let layout = test_util::random_layout(test_util::MAX_TEST_COLUMNS, &mut rng);
            assert!(layout.num_slots() > 0);

            let mut previous_end = layout.header_size();
            for col in 0..layout.num_cols() {
                let offset = layout.column_offset(col);
                assert_eq!(offset % 8, 0);
                assert!(offset >= previous_end);
                let values = pad_up_to_size(
                    layout.attr_size(col),
                    offset + bitmap::bytes_for(layout.num_slots()),
                );
                assert_eq!(values % layout.attr_size(col) as u32, 0);
                previous_end = values + layout.num_slots() * layout.attr_size(col) as u32;
            }
            assert!(previous_end <= BLOCK_SIZE as u32);
        }
    }

    #[test]
    fn test_slot_count_is_maximal() {
        let mut rng = StdRng::seed_from_u64(0x1b);
        for _ in 0..50 {
            let layout = test_util::random_layout(test_util::MAX_TEST_COLUMNS, &mut rng);
            // one more slot per column must not fit
            let mut offsets = Vec::new();
            let grown = BlockLayout::walk_offsets(
                layout.attr_sizes(),
                layout.header_size(),
                layout.num_slots() + 1,
                &mut offsets,
            );
            assert!(grown > BLOCK_SIZE as u32);
        }
    }

    #[test]
    fn test_serde_round_trip() {
        let layout = BlockLayout::new(vec![8, 8, 4, 2, 1]);
        let encoded = serde_json::to_string(&layout).unwrap();
        let decoded: BlockLayout = serde_json::from_str(&encoded).unwrap();
        assert_eq!(layout, decoded);
    }
}

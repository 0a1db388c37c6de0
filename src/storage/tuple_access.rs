use crate::config::{Address, BLOCK_OFFSET_MASK, PRESENCE_COLUMN_ID};
use crate::storage::block::{self, RawBlock};
use crate::storage::layout::BlockLayout;
use crate::storage::storage_util::aligned_address;
use crate::utils::bitmap::{self, ConcurrentBitmap};

/// One tuple's position: block address in the high bits, slot offset in the
/// low 20. Blocks are 1 MiB aligned, so the packing is lossless.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TupleSlot(u64);

impl TupleSlot {
    pub fn new(block: RawBlock, offset: u32) -> Self {
        debug_assert!(offset as u64 <= BLOCK_OFFSET_MASK);
        TupleSlot(block.addr() | offset as u64)
    }

    pub fn block(self) -> RawBlock {
        RawBlock(self.0 & !BLOCK_OFFSET_MASK)
    }

    pub fn offset(self) -> u32 {
        (self.0 & BLOCK_OFFSET_MASK) as u32
    }

    pub(crate) fn from_raw(raw: u64) -> Self {
        TupleSlot(raw)
    }

    pub(crate) fn raw(self) -> u64 {
        self.0
    }
}

/// Interprets a raw block as header plus per-column mini-blocks and hands
/// out typed attribute access. Stateless apart from the layout, so one
/// strategy serves every block of its table.
///
/// Mini-block layout, one per column:
///
/// ```ignore
/// | null bitmap (padded up to the attribute size) | val0 | val1 | ... |
/// ```
pub struct TupleAccessStrategy {
    layout: BlockLayout,
}

impl TupleAccessStrategy {
    pub fn new(layout: BlockLayout) -> Self {
        TupleAccessStrategy { layout }
    }

    pub fn layout(&self) -> &BlockLayout {
        &self.layout
    }

    /// Write the header of a zero-filled block fresh from the store. The
    /// mini-block bitmaps stay all-zero, which is exactly "every slot
    /// free".
    pub fn initialize_block(&self, block: RawBlock, layout_version: u32) {
        let num_cols = self.layout.num_cols();
        unsafe {
            block.write(block::LAYOUT_VERSION.start, layout_version);
            block.write(block::NUM_SLOTS.start, self.layout.num_slots());
            for col in 0..num_cols {
                block.write(
                    block::ATTR_OFFSETS + 4 * col as u64,
                    self.layout.column_offset(col),
                );
            }
            let sizes_start = block::ATTR_OFFSETS + 4 * num_cols as u64;
            block.write(sizes_start, num_cols);
            for col in 0..num_cols {
                block.write(sizes_start + 2 + col as u64, self.layout.attr_size(col));
            }
        }
    }

    /// The column's null bitmap on the given block.
    pub fn column_null_bitmap(&self, block: RawBlock, col: u16) -> ConcurrentBitmap {
        ConcurrentBitmap::at(block.addr() + self.layout.column_offset(col) as u64)
    }

    /// Start of the column's value array on the given block.
    pub fn column_start(&self, block: RawBlock, col: u16) -> Address {
        let bitmap_end = block.addr()
            + self.layout.column_offset(col) as u64
            + bitmap::bytes_for(self.layout.num_slots()) as u64;
        aligned_address(self.layout.attr_size(col), bitmap_end)
    }

    fn attr_address(&self, slot: TupleSlot, col: u16) -> Address {
        debug_assert!(slot.offset() < self.layout.num_slots());
        self.column_start(slot.block(), col)
            + self.layout.attr_size(col) as u64 * slot.offset() as u64
    }

    /// Pointer to the attribute's bytes, or `None` when the column is null
    /// for this slot.
    pub fn access_with_null_check(&self, slot: TupleSlot, col: u16) -> Option<Address> {
        if !self
            .column_null_bitmap(slot.block(), col)
            .test(slot.offset())
        {
            return None;
        }
        Some(self.attr_address(slot, col))
    }

    /// Pointer to the attribute's bytes with no presence check. Only the
    /// version pointer on a known-present tuple is read this way.
    pub fn access_without_null_check(&self, slot: TupleSlot, col: u16) -> Address {
        debug_assert_eq!(
            col, PRESENCE_COLUMN_ID,
            "unchecked access is reserved for the presence column"
        );
        self.attr_address(slot, col)
    }

    /// Pointer to the attribute's bytes, marking the column present first
    /// if it was null. Idempotent.
    pub fn access_force_not_null(&self, slot: TupleSlot, col: u16) -> Address {
        let bitmap = self.column_null_bitmap(slot.block(), col);
        if !bitmap.test(slot.offset()) {
            bitmap.flip(slot.offset(), false);
        }
        self.attr_address(slot, col)
    }

    /// Clear the column's presence bit. On the presence column this frees
    /// the slot and drops the block's record count.
    pub fn set_null(&self, slot: TupleSlot, col: u16) {
        // no-op when the bit is already clear
        if self
            .column_null_bitmap(slot.block(), col)
            .flip(slot.offset(), true)
            && col == PRESENCE_COLUMN_ID
        {
            slot.block().record_removed();
        }
    }

    /// Claim the first free slot of the block by flipping its presence bit,
    /// or `None` when the block is full.
    pub fn allocate(&self, block: RawBlock) -> Option<TupleSlot> {
        let bitmap = self.column_null_bitmap(block, PRESENCE_COLUMN_ID);
        let num_slots = self.layout.num_slots();
        let mut pos = 0;
        while pos < num_slots {
            // skip over fully allocated bytes
            if pos % 8 == 0 && pos + 8 <= num_slots && bitmap.word(pos / 8) == 0xff {
                pos += 8;
                continue;
            }
            if bitmap.flip(pos, false) {
                block.record_added();
                return Some(TupleSlot::new(block, pos));
            }
            pos += 1;
        }
        None
    }
}

use crate::config::Address;
use crate::storage::layout::BlockLayout;
use crate::storage::storage_util::pad_up_to_size;
use crate::utils::bitmap;
use std::ptr;

/// Bytes before the column id list: `size` (u32) and `num_cols` (u16).
pub const HEADER_SIZE: u32 = 6;

/// Self-describing packed record over a subset of columns.
///
/// ```ignore
/// | size(u32) | num_cols(u16) | col_ids([u16]) | pad to 4 |
/// | attr_offsets([u32]) | pad to 8 | null bitmap | pad | values... |
/// ```
///
/// `col_ids` are sorted ascending; because the layout assigns ids so that
/// ascending id means non-increasing attribute size, every interior pad
/// shrinks and the record stays dense. The view is a bare address like the
/// rest of the raw records here; the buffer behind it must start 8-aligned
/// and outlive the view.
#[derive(Clone, Copy, Debug)]
pub struct ProjectedRow {
    base: Address,
}

impl ProjectedRow {
    /// Reinterpret `base` as an already initialized row.
    pub fn at(base: Address) -> Self {
        debug_assert_eq!(base % 8, 0, "projected rows live on 8-aligned memory");
        ProjectedRow { base }
    }

    pub fn addr(self) -> Address {
        self.base
    }

    pub fn size(self) -> u32 {
        unsafe { ptr::read(self.base as *const u32) }
    }

    pub fn num_columns(self) -> u16 {
        unsafe { ptr::read((self.base + 4) as *const u16) }
    }

    pub fn column_id(self, i: u16) -> u16 {
        debug_assert!(i < self.num_columns());
        unsafe { ptr::read((self.base + HEADER_SIZE as u64 + 2 * i as u64) as *const u16) }
    }

    fn offsets_start(self) -> Address {
        let ids_end = HEADER_SIZE + 2 * self.num_columns() as u32;
        self.base + pad_up_to_size(4, ids_end) as u64
    }

    fn value_offset(self, i: u16) -> u32 {
        debug_assert!(i < self.num_columns());
        unsafe { ptr::read((self.offsets_start() + 4 * i as u64) as *const u32) }
    }

    /// Start of the null bitmap, which doubles as the end of the copyable
    /// header.
    fn bitmap_start(self) -> Address {
        let offsets_end = self.offsets_start() + 4 * self.num_columns() as u64 - self.base;
        self.base + pad_up_to_size(8, offsets_end as u32) as u64
    }

    fn bitmap_bytes(self) -> &'static mut [u8] {
        let len = bitmap::bytes_for(self.num_columns() as u32) as usize;
        unsafe { std::slice::from_raw_parts_mut(self.bitmap_start() as *mut u8, len) }
    }

    pub fn is_null(self, i: u16) -> bool {
        debug_assert!(i < self.num_columns());
        !bitmap::bits(self.bitmap_bytes())[i as usize]
    }

    pub fn set_null(self, i: u16) {
        debug_assert!(i < self.num_columns());
        bitmap::bits_mut(self.bitmap_bytes()).set(i as usize, false);
    }

    pub fn set_not_null(self, i: u16) {
        debug_assert!(i < self.num_columns());
        bitmap::bits_mut(self.bitmap_bytes()).set(i as usize, true);
    }

    /// Pointer to the value of projection entry `i`, or `None` when null.
    pub fn access_with_null_check(self, i: u16) -> Option<Address> {
        if self.is_null(i) {
            return None;
        }
        Some(self.base + self.value_offset(i) as u64)
    }

    /// Pointer to the value of projection entry `i`, marking it present
    /// first if it was null.
    pub fn access_force_not_null(self, i: u16) -> Address {
        self.set_not_null(i);
        self.base + self.value_offset(i) as u64
    }
}

/// Write a copy of `other`'s header (everything up to the bitmap) at
/// `head` and clear the bitmap, cloning the row's shape without its
/// values.
pub fn copy_layout(head: Address, other: ProjectedRow) -> ProjectedRow {
    let header_len = other.bitmap_start() - other.addr();
    unsafe {
        ptr::copy_nonoverlapping(other.addr() as *const u8, head as *mut u8, header_len as usize);
    }
    let result = ProjectedRow::at(head);
    for byte in result.bitmap_bytes() {
        *byte = 0;
    }
    result
}

/// Compile-once plan for stamping projected rows of one shape.
///
/// Sorting the requested ids puts the widest attribute first, so each pad
/// step only ever shrinks and the packing is dense.
pub struct ProjectedRowInitializer {
    col_ids: Vec<u16>,
    offsets: Vec<u32>,
    size: u32,
}

impl ProjectedRowInitializer {
    pub fn new(layout: &BlockLayout, mut col_ids: Vec<u16>) -> Self {
        assert!(!col_ids.is_empty(), "cannot initialize an empty projection");
        assert!(
            col_ids.len() <= layout.num_cols() as usize,
            "projection cannot exceed the table's columns"
        );
        col_ids.sort_unstable();
        for pair in col_ids.windows(2) {
            debug_assert!(pair[0] < pair[1], "duplicate column id in projection");
        }
        debug_assert!(*col_ids.last().unwrap() < layout.num_cols());

        let n = col_ids.len() as u32;
        let mut size = HEADER_SIZE + 2 * n;
        size = pad_up_to_size(4, size);
        size += 4 * n;
        size = pad_up_to_size(8, size);
        size += bitmap::bytes_for(n);
        size = pad_up_to_size(layout.attr_size(col_ids[0]), size);

        let mut offsets = Vec::with_capacity(col_ids.len());
        for i in 0..col_ids.len() {
            offsets.push(size);
            let next_size = if i == col_ids.len() - 1 {
                8
            } else {
                layout.attr_size(col_ids[i + 1])
            };
            size = pad_up_to_size(next_size, size + layout.attr_size(col_ids[i]) as u32);
        }

        ProjectedRowInitializer {
            col_ids,
            offsets,
            size,
        }
    }

    pub fn projected_row_size(&self) -> u32 {
        self.size
    }

    pub fn num_cols(&self) -> u16 {
        self.col_ids.len() as u16
    }

    pub fn col_id(&self, i: u16) -> u16 {
        self.col_ids[i as usize]
    }

    /// Stamp the plan onto `head`: size, column ids, value offsets, and an
    /// all-null bitmap.
    pub fn initialize_row(&self, head: Address) -> ProjectedRow {
        debug_assert_eq!(head % 8, 0, "projected rows live on 8-aligned memory");
        unsafe {
            ptr::write(head as *mut u32, self.size);
            ptr::write((head + 4) as *mut u16, self.col_ids.len() as u16);
            for (i, &col) in self.col_ids.iter().enumerate() {
                ptr::write((head + HEADER_SIZE as u64 + 2 * i as u64) as *mut u16, col);
            }
        }
        let row = ProjectedRow::at(head);
        unsafe {
            for (i, &offset) in self.offsets.iter().enumerate() {
                ptr::write((row.offsets_start() + 4 * i as u64) as *mut u32, offset);
            }
        }
        for byte in row.bitmap_bytes() {
            *byte = 0;
        }
        row
    }
}

use crate::config::Address;
use crate::storage::layout::BlockLayout;
use crate::storage::projected_row::ProjectedRow;
use crate::storage::tuple_access::{TupleAccessStrategy, TupleSlot};
use std::ptr;

/// Round `offset` up to a multiple of `word_size`.
pub fn pad_up_to_size(word_size: u8, offset: u32) -> u32 {
    let size = word_size as u32;
    let remainder = offset % size;
    if remainder == 0 {
        offset
    } else {
        offset + size - remainder
    }
}

/// Round an address up so it aligns to `size`.
pub fn aligned_address(size: u8, address: Address) -> Address {
    let remainder = address % size as u64;
    if remainder == 0 {
        address
    } else {
        address + size as u64 - remainder
    }
}

/// Write the low `attr_size` bytes of `val` to `pos`. Only sizes 1, 2, 4
/// and 8 dispatch here; 16-byte values move as two 8-byte halves.
pub fn write_bytes(attr_size: u8, val: u64, pos: Address) {
    unsafe {
        match attr_size {
            1 => ptr::write(pos as *mut u8, val as u8),
            2 => ptr::write(pos as *mut u16, val as u16),
            4 => ptr::write(pos as *mut u32, val as u32),
            8 => ptr::write(pos as *mut u64, val),
            _ => unreachable!("invalid attribute size {}", attr_size),
        }
    }
}

/// Read `attr_size` bytes from `pos`, zero-extended to 8 bytes.
pub fn read_bytes(attr_size: u8, pos: Address) -> u64 {
    unsafe {
        match attr_size {
            1 => ptr::read(pos as *const u8) as u64,
            2 => ptr::read(pos as *const u16) as u64,
            4 => ptr::read(pos as *const u32) as u64,
            8 => ptr::read(pos as *const u64),
            _ => unreachable!("invalid attribute size {}", attr_size),
        }
    }
}

/// Copy `attr_size` bytes from `from` into column `i` of `to`, or mark the
/// column null when `from` is `None`.
pub fn copy_with_null_check_to_row(from: Option<Address>, to: ProjectedRow, attr_size: u8, i: u16) {
    match from {
        None => to.set_null(i),
        Some(src) => unsafe {
            let dest = to.access_force_not_null(i);
            ptr::copy_nonoverlapping(src as *const u8, dest as *mut u8, attr_size as usize);
        },
    }
}

/// Copy `attr_size` bytes from `from` into column `col` of the tuple slot,
/// or mark the column null when `from` is `None`.
pub fn copy_with_null_check_to_slot(
    from: Option<Address>,
    accessor: &TupleAccessStrategy,
    to: TupleSlot,
    col: u16,
) {
    match from {
        None => accessor.set_null(to, col),
        Some(src) => unsafe {
            let dest = accessor.access_force_not_null(to, col);
            let attr_size = accessor.layout().attr_size(col);
            ptr::copy_nonoverlapping(src as *const u8, dest as *mut u8, attr_size as usize);
        },
    }
}

/// Copy projection entry `i` from the tuple slot into the row, null state
/// included.
pub fn copy_attr_into_projection(
    accessor: &TupleAccessStrategy,
    from: TupleSlot,
    to: ProjectedRow,
    i: u16,
) {
    let col = to.column_id(i);
    let attr_size = accessor.layout().attr_size(col);
    copy_with_null_check_to_row(accessor.access_with_null_check(from, col), to, attr_size, i);
}

/// Copy projection entry `i` from the row into the tuple slot, null state
/// included.
pub fn copy_attr_from_projection(
    accessor: &TupleAccessStrategy,
    to: TupleSlot,
    from: ProjectedRow,
    i: u16,
) {
    let col = from.column_id(i);
    copy_with_null_check_to_slot(from.access_with_null_check(i), accessor, to, col);
}

/// Apply `delta` into `target`: every column named by the delta gets its
/// value (or null state) copied over; columns of `target` the delta does
/// not name are untouched. Both column id lists are sorted, so a single
/// linear merge locates the matches.
pub fn apply_delta(layout: &BlockLayout, delta: ProjectedRow, target: ProjectedRow) {
    let mut i = 0;
    let mut j = 0;
    while i < delta.num_columns() && j < target.num_columns() {
        let delta_col = delta.column_id(i);
        let target_col = target.column_id(j);
        if delta_col == target_col {
            let attr_size = layout.attr_size(delta_col);
            copy_with_null_check_to_row(delta.access_with_null_check(i), target, attr_size, j);
            i += 1;
            j += 1;
        } else if delta_col < target_col {
            i += 1;
        } else {
            j += 1;
        }
    }
}

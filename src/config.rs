use std::mem::size_of;

/// Raw memory address of a block, record, or attribute.
pub type Address = u64;

/// Blocks are fixed at 1 MiB and allocated with 1 MiB alignment, so a
/// packed tuple slot can carry a block address in its high bits and a slot
/// offset in the low 20.
pub const BLOCK_SIZE: usize = 1 << 20;

/// Low bits of a packed slot word that hold the slot offset.
pub const BLOCK_OFFSET_MASK: u64 = BLOCK_SIZE as u64 - 1;

/// Column 0 of every layout. Its null bit doubles as the slot liveness bit
/// and its value stores the version chain head.
pub const PRESENCE_COLUMN_ID: u16 = 0;

/// Fixed size of one undo buffer segment.
pub const SEGMENT_SIZE: usize = 1 << 15;

/// Timestamps with this bit set are transaction ids, not commit timestamps.
pub const POW_2_63: u64 = 1u64 << 63;

pub const U64_OFFSET: u64 = size_of::<u64>() as u64;

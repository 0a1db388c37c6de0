use crate::config::{Address, BLOCK_SIZE};
use crate::{Error, Result};
use crossbeam::queue::SegQueue;
use std::alloc::{alloc_zeroed, dealloc, Layout};
use std::ops::Range;
use std::ptr;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

pub const LAYOUT_VERSION: Range<u64> = 0..4;
pub const NUM_RECORDS: Range<u64> = LAYOUT_VERSION.end..LAYOUT_VERSION.end + 4;
pub const NUM_SLOTS: Range<u64> = NUM_RECORDS.end..NUM_RECORDS.end + 4;
/// Start of the per-column `u32` mini-block offsets; `num_attrs` (u16) and
/// the per-column `u8` sizes follow them.
pub const ATTR_OFFSETS: u64 = NUM_SLOTS.end;

/// One fixed-size aligned block, addressed by its base.
///
/// Header layout, followed by per-column mini-blocks at the recorded
/// offsets:
///
/// ```ignore
/// | layout_version(u32) | num_records(u32) | num_slots(u32) |
/// | attr_offsets([u32; num_cols]) | num_attrs(u16) | attr_sizes([u8]) |
/// ```
///
/// Only `num_records` mutates after initialization; everything else is
/// baked in for the block's lifetime.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RawBlock(pub(crate) Address);

impl RawBlock {
    pub fn at(address: Address) -> Self {
        debug_assert_eq!(address % BLOCK_SIZE as u64, 0);
        RawBlock(address)
    }

    pub fn addr(self) -> Address {
        self.0
    }

    pub(crate) unsafe fn read<T>(self, offset: u64) -> T {
        ptr::read((self.0 + offset) as *const T)
    }

    pub(crate) unsafe fn write<T>(self, offset: u64, value: T) {
        ptr::write((self.0 + offset) as *mut T, value);
    }

    pub fn layout_version(self) -> u32 {
        unsafe { self.read(LAYOUT_VERSION.start) }
    }

    fn num_records_atomic(self) -> &'static AtomicU32 {
        unsafe { &*((self.0 + NUM_RECORDS.start) as *const AtomicU32) }
    }

    /// Number of live tuples in the block.
    pub fn num_records(self) -> u32 {
        self.num_records_atomic().load(Ordering::Relaxed)
    }

    pub(crate) fn record_added(self) {
        self.num_records_atomic().fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_removed(self) {
        self.num_records_atomic().fetch_sub(1, Ordering::Relaxed);
    }

    pub fn num_slots(self) -> u32 {
        unsafe { self.read(NUM_SLOTS.start) }
    }
}

/// Bounded pool of zero-filled blocks.
///
/// `get` hands out a 1 MiB block aligned to its own size, freshly zeroed;
/// `release` takes it back for reuse. Once `capacity` blocks are out and
/// the free list is empty, `get` fails with [`Error::OutOfBlocks`].
pub struct BlockStore {
    capacity: usize,
    allocated: AtomicUsize,
    free: SegQueue<Address>,
}

impl BlockStore {
    pub fn new(capacity: usize) -> Self {
        BlockStore {
            capacity,
            allocated: AtomicUsize::new(0),
            free: SegQueue::new(),
        }
    }

    fn block_layout() -> Layout {
        Layout::from_size_align(BLOCK_SIZE, BLOCK_SIZE).unwrap()
    }

    pub fn get(&self) -> Result<RawBlock> {
        if let Some(address) = self.free.pop() {
            // recycled blocks carry the previous tenant's bytes
            unsafe { ptr::write_bytes(address as *mut u8, 0, BLOCK_SIZE) };
            return Ok(RawBlock::at(address));
        }
        if self.allocated.fetch_add(1, Ordering::Relaxed) >= self.capacity {
            self.allocated.fetch_sub(1, Ordering::Relaxed);
            return Err(Error::OutOfBlocks);
        }
        let address = unsafe { alloc_zeroed(Self::block_layout()) } as Address;
        assert!(address != 0, "block allocation failed");
        trace!("block store allocated fresh block {:x}", address);
        Ok(RawBlock::at(address))
    }

    pub fn release(&self, block: RawBlock) {
        self.free.push(block.addr());
    }
}

impl Drop for BlockStore {
    fn drop(&mut self) {
        while let Some(address) = self.free.pop() {
            unsafe { dealloc(address as *mut u8, Self::block_layout()) };
        }
    }
}

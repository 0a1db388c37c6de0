use crate::config::{Address, SEGMENT_SIZE, U64_OFFSET};
use crate::storage::projected_row::{self, ProjectedRow, ProjectedRowInitializer};
use crate::storage::storage_util::pad_up_to_size;
use crate::storage::tuple_access::TupleSlot;
use crate::utils::object_pool::ObjectPool;
use std::alloc::{alloc_zeroed, Layout};
use std::ops::Range;
use std::ptr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

pub const NEXT: Range<u64> = 0..U64_OFFSET;
pub const TIMESTAMP: Range<u64> = NEXT.end..NEXT.end + U64_OFFSET;
pub const TABLE: Range<u64> = TIMESTAMP.end..TIMESTAMP.end + U64_OFFSET;
pub const SLOT: Range<u64> = TABLE.end..TABLE.end + U64_OFFSET;
pub const HEADER: u64 = SLOT.end;

/// One link of a tuple's version chain.
///
/// ```ignore
/// | next(u64) | timestamp(u64) | table(u64) | slot(u64) |
/// | before-image (in-place projected row)               |
/// ```
///
/// `timestamp` holds the writer's transaction id while the write is in
/// progress and is atomically rewritten to the commit timestamp on commit.
/// `next` points further back in time; 0 terminates the chain.
#[derive(Clone, Copy, Debug)]
pub struct UndoRecord {
    base: Address,
}

impl UndoRecord {
    pub fn at(base: Address) -> Self {
        debug_assert_eq!(base % 8, 0);
        UndoRecord { base }
    }

    pub fn addr(self) -> Address {
        self.base
    }

    /// Bytes an undo record carrying a row of `row_size` bytes occupies.
    pub fn size_for(row_size: u32) -> u32 {
        HEADER as u32 + row_size
    }

    fn next_atomic(self) -> &'static AtomicU64 {
        unsafe { &*((self.base + NEXT.start) as *const AtomicU64) }
    }

    fn timestamp_atomic(self) -> &'static AtomicU64 {
        unsafe { &*((self.base + TIMESTAMP.start) as *const AtomicU64) }
    }

    pub fn next(self) -> Option<UndoRecord> {
        match self.next_addr() {
            0 => None,
            address => Some(UndoRecord::at(address)),
        }
    }

    pub fn next_addr(self) -> Address {
        self.next_atomic().load(Ordering::Acquire)
    }

    /// Exclusive to the writer until the record is published by the chain
    /// head CAS, so a relaxed store suffices.
    pub(crate) fn set_next(self, next: Address) {
        self.next_atomic().store(next, Ordering::Relaxed);
    }

    pub fn timestamp(self) -> u64 {
        self.timestamp_atomic().load(Ordering::Acquire)
    }

    /// Commit path: rewrite the transaction id to the commit timestamp.
    pub fn set_timestamp(self, timestamp: u64) {
        self.timestamp_atomic().store(timestamp, Ordering::Release);
    }

    pub fn table(self) -> Address {
        unsafe { ptr::read((self.base + TABLE.start) as *const Address) }
    }

    pub fn slot(self) -> TupleSlot {
        TupleSlot::from_raw(unsafe { ptr::read((self.base + SLOT.start) as *const u64) })
    }

    /// The before-image delta this record holds.
    pub fn delta(self) -> ProjectedRow {
        ProjectedRow::at(self.base + HEADER)
    }

    /// Lay out an update record at `head`: the header plus a copy of the
    /// redo row's shape, ready for the before-image values.
    pub fn initialize_record(
        head: Address,
        timestamp: u64,
        slot: TupleSlot,
        table: Address,
        redo: ProjectedRow,
    ) -> UndoRecord {
        let record = Self::write_header(head, timestamp, slot, table);
        projected_row::copy_layout(head + HEADER, redo);
        record
    }

    /// Lay out an insert record at `head` with an all-null row stamped from
    /// the initializer.
    pub fn initialize(
        head: Address,
        timestamp: u64,
        slot: TupleSlot,
        table: Address,
        initializer: &ProjectedRowInitializer,
    ) -> UndoRecord {
        let record = Self::write_header(head, timestamp, slot, table);
        initializer.initialize_row(head + HEADER);
        record
    }

    fn write_header(head: Address, timestamp: u64, slot: TupleSlot, table: Address) -> UndoRecord {
        let record = UndoRecord::at(head);
        record.set_next(0);
        record.timestamp_atomic().store(timestamp, Ordering::Relaxed);
        unsafe {
            ptr::write((head + TABLE.start) as *mut Address, table);
            ptr::write((head + SLOT.start) as *mut u64, slot.raw());
        }
        record
    }
}

/// One fixed chunk of undo record memory.
#[repr(C, align(16))]
pub struct BufferSegment {
    bytes: [u8; SEGMENT_SIZE],
}

impl BufferSegment {
    pub fn alloc() -> Box<BufferSegment> {
        let layout = Layout::new::<BufferSegment>();
        let ptr = unsafe { alloc_zeroed(layout) } as *mut BufferSegment;
        assert!(!ptr.is_null(), "buffer segment allocation failed");
        unsafe { Box::from_raw(ptr) }
    }
}

/// Per-transaction arena for undo records.
///
/// Draws segments from a shared pool, carves 16-aligned entries out of
/// them, and hands the segments back on drop. Records stay readable
/// through the version chains that reference them only as long as this
/// buffer lives; reclaiming them earlier is the garbage collector's
/// problem, not ours.
pub struct UndoBuffer {
    pool: Arc<ObjectPool<BufferSegment>>,
    segments: Vec<Box<BufferSegment>>,
    offset: usize,
    records: Vec<Address>,
}

impl UndoBuffer {
    pub fn new(pool: Arc<ObjectPool<BufferSegment>>) -> Self {
        UndoBuffer {
            pool,
            segments: Vec::new(),
            offset: 0,
            records: Vec::new(),
        }
    }

    /// Reserve `size` bytes for a new undo record and return its head.
    pub fn new_entry(&mut self, size: u32) -> Address {
        let size = pad_up_to_size(16, size) as usize;
        debug_assert!(size <= SEGMENT_SIZE, "undo record larger than a segment");
        if self.segments.is_empty() || self.offset + size > SEGMENT_SIZE {
            self.segments.push(self.pool.get());
            self.offset = 0;
        }
        let segment = self.segments.last_mut().unwrap();
        let head = segment.bytes.as_mut_ptr() as Address + self.offset as u64;
        self.offset += size;
        self.records.push(head);
        head
    }

    /// Every record carved from this buffer, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = UndoRecord> + '_ {
        self.records.iter().map(|&head| UndoRecord::at(head))
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl Drop for UndoBuffer {
    fn drop(&mut self) {
        for segment in self.segments.drain(..) {
            self.pool.release(segment);
        }
    }
}

use crate::config::Address;
use crate::storage::projected_row::{ProjectedRow, ProjectedRowInitializer};
use crate::storage::tuple_access::TupleSlot;
use crate::storage::undo::{BufferSegment, UndoBuffer, UndoRecord};
use crate::transaction::timestamp;
use crate::utils::object_pool::ObjectPool;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// State a transaction keeps while it runs: its start timestamp, its id,
/// and the buffer its undo records live in.
///
/// The id should be larger than every start and commit timestamp handed
/// out so far; the data table compares it against chain heads to detect
/// write-write conflicts. Undo records written here stay reachable from
/// version chains, so the context must outlive any reader that may still
/// walk to them.
pub struct TransactionContext {
    start_time: u64,
    txn_id: AtomicU64,
    undo_buffer: UndoBuffer,
}

impl TransactionContext {
    pub fn new(start: u64, txn_id: u64, buffer_pool: Arc<ObjectPool<BufferSegment>>) -> Self {
        TransactionContext {
            start_time: start,
            txn_id: AtomicU64::new(txn_id),
            undo_buffer: UndoBuffer::new(buffer_pool),
        }
    }

    /// Timestamp reads of this transaction are served at.
    pub fn start_time(&self) -> u64 {
        self.start_time
    }

    pub fn txn_id(&self) -> u64 {
        self.txn_id.load(Ordering::Relaxed)
    }

    /// Reserve and initialize an undo record shaped like `redo`, ready for
    /// the before-image of an update to `slot`.
    pub fn undo_record_for_update(
        &mut self,
        table: Address,
        slot: TupleSlot,
        redo: ProjectedRow,
    ) -> UndoRecord {
        let head = self
            .undo_buffer
            .new_entry(UndoRecord::size_for(redo.size()));
        UndoRecord::initialize_record(head, self.txn_id(), slot, table, redo)
    }

    /// Reserve and initialize an undo record for an insert into `slot`.
    pub fn undo_record_for_insert(
        &mut self,
        table: Address,
        slot: TupleSlot,
        initializer: &ProjectedRowInitializer,
    ) -> UndoRecord {
        let head = self
            .undo_buffer
            .new_entry(UndoRecord::size_for(initializer.projected_row_size()));
        UndoRecord::initialize(head, self.txn_id(), slot, table, initializer)
    }

    /// Externally driven commit: rewrite every undo record this
    /// transaction installed from its id to the commit timestamp, making
    /// its versions visible at `commit_ts`.
    pub fn commit(&self, commit_ts: u64) {
        debug_assert!(
            !timestamp::is_txn_id(commit_ts),
            "commit timestamps have the high bit clear"
        );
        self.txn_id.store(commit_ts, Ordering::Relaxed);
        for record in self.undo_buffer.iter() {
            record.set_timestamp(commit_ts);
        }
    }
}

use crate::config::{Address, PRESENCE_COLUMN_ID};
use crate::storage::block::{BlockStore, RawBlock};
use crate::storage::layout::BlockLayout;
use crate::storage::projected_row::{ProjectedRow, ProjectedRowInitializer};
use crate::storage::storage_util;
use crate::storage::tuple_access::{TupleAccessStrategy, TupleSlot};
use crate::storage::undo::UndoRecord;
use crate::transaction::timestamp;
use crate::transaction::TransactionContext;
use crate::Result;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// A table of tuple slots with per-tuple version chains.
///
/// Writers coordinate through the chain head stored in the presence
/// column: installing an undo record whose timestamp is an uncommitted
/// transaction id takes the write lock, commit releases it by rewriting
/// the timestamp. Readers walk the chain and undo every record newer than
/// their start time.
pub struct DataTable {
    accessor: TupleAccessStrategy,
    block_store: Arc<BlockStore>,
    blocks: RwLock<Vec<RawBlock>>,
    insert_initializer: ProjectedRowInitializer,
    layout_version: u32,
}

impl DataTable {
    pub fn new(block_store: Arc<BlockStore>, layout: BlockLayout, layout_version: u32) -> Self {
        // the insert undo projects exactly the presence column: applying it
        // re-nulls the slot, and it merges away against any caller row
        let insert_initializer =
            ProjectedRowInitializer::new(&layout, vec![PRESENCE_COLUMN_ID]);
        DataTable {
            accessor: TupleAccessStrategy::new(layout),
            block_store,
            blocks: RwLock::new(Vec::new()),
            insert_initializer,
            layout_version,
        }
    }

    pub fn layout(&self) -> &BlockLayout {
        self.accessor.layout()
    }

    fn table_addr(&self) -> Address {
        self as *const DataTable as Address
    }

    fn version_ptr_atomic(&self, slot: TupleSlot) -> &AtomicU64 {
        let address = self
            .accessor
            .access_without_null_check(slot, PRESENCE_COLUMN_ID);
        unsafe { &*(address as *const AtomicU64) }
    }

    fn read_version_ptr(&self, slot: TupleSlot) -> Address {
        self.version_ptr_atomic(slot).load(Ordering::Acquire)
    }

    fn compare_and_swap_version_ptr(
        &self,
        slot: TupleSlot,
        expected: Address,
        desired: Address,
    ) -> bool {
        self.version_ptr_atomic(slot)
            .compare_exchange(expected, desired, Ordering::Release, Ordering::Relaxed)
            .is_ok()
    }

    /// Insert the redo row into a free slot, installing an insert undo
    /// record as the slot's chain head. Fails only when the block store is
    /// exhausted.
    pub fn insert(&self, txn: &mut TransactionContext, redo: ProjectedRow) -> Result<TupleSlot> {
        debug_assert!(
            (0..redo.num_columns()).all(|i| redo.column_id(i) != PRESENCE_COLUMN_ID),
            "insert rows carry data columns only"
        );
        let slot = self.acquire_slot()?;

        let undo = txn.undo_record_for_insert(self.table_addr(), slot, &self.insert_initializer);
        // publish the chain head before the values land: a concurrent
        // reader then sees an uncommitted head and undoes the insert
        self.accessor.access_force_not_null(slot, PRESENCE_COLUMN_ID);
        self.version_ptr_atomic(slot)
            .store(undo.addr(), Ordering::Release);

        for i in 0..redo.num_columns() {
            storage_util::copy_attr_from_projection(&self.accessor, slot, redo, i);
        }
        Ok(slot)
    }

    fn acquire_slot(&self) -> Result<TupleSlot> {
        loop {
            {
                let blocks = self.blocks.read();
                for &block in blocks.iter() {
                    if let Some(slot) = self.accessor.allocate(block) {
                        return Ok(slot);
                    }
                }
            }
            let block = self.block_store.get()?;
            self.accessor.initialize_block(block, self.layout_version);
            debug!("table {:x} acquired block {:x}", self.table_addr(), block.addr());
            self.blocks.write().push(block);
        }
    }

    /// Apply `delta` to the tuple, linking a before-image undo record in
    /// front of the version chain. Returns false without side effects when
    /// another in-progress transaction holds the write lock.
    pub fn update(&self, txn: &mut TransactionContext, slot: TupleSlot, delta: ProjectedRow) -> bool {
        debug_assert!(
            (0..delta.num_columns()).all(|i| delta.column_id(i) != PRESENCE_COLUMN_ID),
            "deltas carry data columns only"
        );
        let undo = txn.undo_record_for_update(self.table_addr(), slot, delta);
        loop {
            let version_ptr = self.read_version_ptr(slot);
            if version_ptr != 0 {
                let head_ts = UndoRecord::at(version_ptr).timestamp();
                if timestamp::is_txn_id(head_ts) && head_ts != txn.txn_id() {
                    trace!(
                        "write-write conflict on slot {:x}: {:x} holds the lock, {:x} loses",
                        slot.raw(),
                        head_ts,
                        txn.txn_id()
                    );
                    return false;
                }
            }
            // before-image of exactly the columns the delta touches
            for i in 0..undo.delta().num_columns() {
                storage_util::copy_attr_into_projection(&self.accessor, slot, undo.delta(), i);
            }
            undo.set_next(version_ptr);
            if self.compare_and_swap_version_ptr(slot, version_ptr, undo.addr()) {
                break;
            }
            // another writer interleaved; re-read the head and re-evaluate
        }
        for i in 0..delta.num_columns() {
            storage_util::copy_attr_from_projection(&self.accessor, slot, delta, i);
        }
        true
    }

    /// Materialize into `out_row` the version of the tuple visible at the
    /// transaction's start time.
    pub fn select(&self, txn: &TransactionContext, slot: TupleSlot, out_row: ProjectedRow) {
        for i in 0..out_row.num_columns() {
            storage_util::copy_attr_into_projection(&self.accessor, slot, out_row, i);
        }
        let mut version_ptr = self.read_version_ptr(slot);
        while version_ptr != 0 {
            let record = UndoRecord::at(version_ptr);
            if !timestamp::newer_than(record.timestamp(), txn.start_time()) {
                break;
            }
            storage_util::apply_delta(self.layout(), record.delta(), out_row);
            version_ptr = record.next_addr();
        }
    }
}

impl Drop for DataTable {
    fn drop(&mut self) {
        for &block in self.blocks.get_mut().iter() {
            self.block_store.release(block);
        }
    }
}

//! Shared helpers for randomized storage tests.

use crate::storage::block::BlockStore;
use crate::storage::data_table::DataTable;
use crate::storage::layout::BlockLayout;
use crate::storage::projected_row::{ProjectedRow, ProjectedRowInitializer};
use crate::storage::storage_util;
use crate::storage::tuple_access::TupleSlot;
use crate::storage::undo::BufferSegment;
use crate::transaction::{timestamp, TransactionContext};
use crate::utils::alloc::AlignedBuffer;
use crate::utils::object_pool::ObjectPool;
use rand::prelude::*;
use std::collections::HashMap;
use std::ptr;
use std::sync::Arc;

pub const MAX_TEST_COLUMNS: u16 = 100;

/// A random layout: presence column plus 1..max_cols data columns with
/// sizes drawn from the legal set, ordered non-increasing.
pub fn random_layout(max_cols: u16, rng: &mut impl Rng) -> BlockLayout {
    let num_cols = rng.gen_range(2..=max_cols);
    let choices = [16u8, 8, 4, 2, 1];
    let mut data_sizes: Vec<u8> = (1..num_cols)
        .map(|_| *choices.choose(rng).unwrap())
        .collect();
    data_sizes.sort_unstable_by(|a, b| b.cmp(a));
    let mut attr_sizes = vec![8u8];
    attr_sizes.extend(data_sizes);
    BlockLayout::new(attr_sizes)
}

/// Every data column id, in order.
pub fn all_data_columns(layout: &BlockLayout) -> Vec<u16> {
    (1..layout.num_cols()).collect()
}

/// A random non-empty subset of the data columns, unsorted.
pub fn random_projection(layout: &BlockLayout, rng: &mut impl Rng) -> Vec<u16> {
    let mut cols = all_data_columns(layout);
    cols.shuffle(rng);
    let keep = rng.gen_range(1..=cols.len());
    cols.truncate(keep);
    cols
}

/// An aligned buffer with a freshly stamped row inside it.
pub fn row_buffer(initializer: &ProjectedRowInitializer) -> (AlignedBuffer, ProjectedRow) {
    let buf = AlignedBuffer::zeroed(initializer.projected_row_size() as usize);
    let row = initializer.initialize_row(buf.addr());
    (buf, row)
}

/// Fill every column of the row with random bytes, or null with the given
/// bias.
pub fn populate_random_row(
    row: ProjectedRow,
    layout: &BlockLayout,
    null_bias: f64,
    rng: &mut impl Rng,
) {
    for i in 0..row.num_columns() {
        let attr_size = layout.attr_size(row.column_id(i)) as usize;
        if rng.gen_bool(null_bias) {
            row.set_null(i);
        } else {
            let mut bytes = [0u8; 16];
            rng.fill_bytes(&mut bytes[..attr_size]);
            let dest = row.access_force_not_null(i);
            unsafe { ptr::copy_nonoverlapping(bytes.as_ptr(), dest as *mut u8, attr_size) };
        }
    }
}

/// Column-by-column equality: ids, null states, and value bytes.
pub fn projection_equal(layout: &BlockLayout, a: ProjectedRow, b: ProjectedRow) -> bool {
    if a.num_columns() != b.num_columns() {
        return false;
    }
    for i in 0..a.num_columns() {
        if a.column_id(i) != b.column_id(i) {
            return false;
        }
        let len = layout.attr_size(a.column_id(i)) as usize;
        match (a.access_with_null_check(i), b.access_with_null_check(i)) {
            (None, None) => {}
            (Some(x), Some(y)) => {
                let x = unsafe { std::slice::from_raw_parts(x as *const u8, len) };
                let y = unsafe { std::slice::from_raw_parts(y as *const u8, len) };
                if x != y {
                    return false;
                }
            }
            _ => return false,
        }
    }
    true
}

struct VersionEntry {
    ts: u64,
    _buf: AlignedBuffer,
    row: ProjectedRow,
    txn_index: Option<usize>,
}

/// A random table plus the offline-replayed reference versions of every
/// tuple, for checking what `select` materializes. Not thread-safe.
pub struct TableTestContext {
    layout: BlockLayout,
    table: Arc<DataTable>,
    buffer_pool: Arc<ObjectPool<BufferSegment>>,
    all_cols: ProjectedRowInitializer,
    null_bias: f64,
    // transactions stay alive so chains keep pointing at valid records
    txns: Vec<TransactionContext>,
    versions: HashMap<TupleSlot, Vec<VersionEntry>>,
}

impl TableTestContext {
    pub fn new(max_cols: u16, rng: &mut impl Rng) -> Self {
        let _ = env_logger::builder().is_test(true).try_init();
        let layout = random_layout(max_cols, rng);
        let store = Arc::new(BlockStore::new(100));
        let buffer_pool = Arc::new(ObjectPool::new(10000, BufferSegment::alloc));
        let table = Arc::new(DataTable::new(store, layout.clone(), 0));
        let all_cols = ProjectedRowInitializer::new(&layout, all_data_columns(&layout));
        TableTestContext {
            layout,
            table,
            buffer_pool,
            all_cols,
            null_bias: rng.gen_range(0.0..1.0),
            txns: Vec::new(),
            versions: HashMap::new(),
        }
    }

    pub fn layout(&self) -> BlockLayout {
        self.layout.clone()
    }

    pub fn table(&self) -> Arc<DataTable> {
        Arc::clone(&self.table)
    }

    pub fn buffer_pool(&self) -> Arc<ObjectPool<BufferSegment>> {
        Arc::clone(&self.buffer_pool)
    }

    /// Insert a random row at `ts` and remember it as the first reference
    /// version.
    pub fn insert_random(&mut self, ts: u64, rng: &mut impl Rng) -> TupleSlot {
        let (buf, redo) = row_buffer(&self.all_cols);
        populate_random_row(redo, &self.layout, self.null_bias, rng);

        let mut txn = TransactionContext::new(ts, ts, self.buffer_pool());
        let slot = self.table.insert(&mut txn, redo).unwrap();
        let txn_index = self.txns.len();
        self.txns.push(txn);
        self.versions.entry(slot).or_default().push(VersionEntry {
            ts,
            _buf: buf,
            row: redo,
            txn_index: Some(txn_index),
        });
        slot
    }

    /// Update random columns of the tuple at `ts`. On success the new
    /// reference version is replayed offline through `apply_delta`.
    pub fn update_random(&mut self, ts: u64, slot: TupleSlot, rng: &mut impl Rng) -> bool {
        let cols = random_projection(&self.layout, rng);
        let initializer = ProjectedRowInitializer::new(&self.layout, cols);
        let (_delta_buf, delta) = row_buffer(&initializer);
        populate_random_row(delta, &self.layout, self.null_bias, rng);

        let mut txn = TransactionContext::new(ts, ts, self.buffer_pool());
        let result = self.table.update(&mut txn, slot, delta);
        let txn_index = self.txns.len();
        self.txns.push(txn);

        if result {
            let versions = self.versions.get_mut(&slot).unwrap();
            let previous = versions.last().unwrap();
            let buf = AlignedBuffer::zeroed(self.all_cols.projected_row_size() as usize);
            unsafe {
                ptr::copy_nonoverlapping(
                    previous.row.addr() as *const u8,
                    buf.addr() as *mut u8,
                    self.all_cols.projected_row_size() as usize,
                );
            }
            let row = ProjectedRow::at(buf.addr());
            storage_util::apply_delta(&self.layout, delta, row);
            versions.push(VersionEntry {
                ts,
                _buf: buf,
                row,
                txn_index: Some(txn_index),
            });
        }
        result
    }

    /// Commit the transaction behind the newest version of `slot`,
    /// re-keying its reference version to the commit timestamp.
    pub fn commit_last_writer(&mut self, slot: TupleSlot, commit_ts: u64) {
        let entry = self.versions.get_mut(&slot).unwrap().last_mut().unwrap();
        let txn_index = entry.txn_index.take().unwrap();
        self.txns[txn_index].commit(commit_ts);
        entry.ts = commit_ts;
    }

    /// Select the tuple at read timestamp `ts` into a fresh all-columns
    /// buffer.
    pub fn select(&self, ts: u64, slot: TupleSlot) -> (AlignedBuffer, ProjectedRow) {
        let txn = TransactionContext::new(ts, ts, self.buffer_pool());
        let (buf, out) = row_buffer(&self.all_cols);
        self.table.select(&txn, slot, out);
        (buf, out)
    }

    /// The newest reference version visible at `ts`, or `None` when the
    /// tuple did not exist yet.
    pub fn reference_version(&self, slot: TupleSlot, ts: u64) -> Option<ProjectedRow> {
        let versions = self.versions.get(&slot)?;
        versions
            .iter()
            .rev()
            .find(|v| timestamp::newer_than(ts, v.ts) || ts == v.ts)
            .map(|v| v.row)
    }
}

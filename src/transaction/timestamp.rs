use crate::config::POW_2_63;

/// Tag a raw counter value as an in-progress transaction id.
pub fn txn_id(id: u64) -> u64 {
    id | POW_2_63
}

/// Whether `ts` is an in-progress transaction id rather than a commit
/// timestamp.
pub fn is_txn_id(ts: u64) -> bool {
    ts & POW_2_63 != 0
}

/// Visibility order between two timestamps: is `a` newer than `b`?
///
/// Transaction ids carry the high bit, so as signed integers they sort
/// below every commit timestamp; flipping the comparison for them makes an
/// in-progress writer newer than every committed version. Committed
/// timestamps compare as plain integers. Equal timestamps are not newer,
/// which is what lets a transaction see its own writes.
pub fn newer_than(a: u64, b: u64) -> bool {
    if is_txn_id(a) || is_txn_id(b) {
        (a as i64) < (b as i64)
    } else {
        a > b
    }
}

//!
//! src/merge.rs  Andrew Belles  Sept 14th, 2025
//!
//! Merge of the historical set with a freshly fetched set. Records are
//! collapsed on their natural key; the last one seen for a key wins.
//!

use indexmap::IndexMap;

use crate::types::Record;

///
/// One record per distinct key. Walking `records` in order, a later record
/// overwrites an earlier one with the same key but keeps the slot the key
/// first occupied, so output order is first-seen order of the keys.
///
pub fn dedup<R: Record>(records: impl IntoIterator<Item = R>) -> Vec<R> {
    let mut by_key: IndexMap<String, R> = IndexMap::new();
    for record in records {
        by_key.insert(record.key().to_string(), record);
    }
    by_key.into_values().collect()
}

/// `dedup(historical ++ fresh)` followed by the record's own ordering
pub fn merge<R: Record>(historical: Vec<R>, fresh: &[R]) -> Vec<R> {
    let mut merged = dedup(historical.into_iter().chain(fresh.iter().cloned()));
    R::finalize(&mut merged);
    merged
}

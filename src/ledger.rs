//! The shared slot ledger: one document mapping each bookable ISO timestamp
//! to the number of requests already occupying it.

use crate::error::AppError;
use crate::store::{quote_segment, DocumentStore, FieldPatch};
use crate::validation::parse_slot;

use std::collections::HashMap;

pub const LEDGER_COLLECTION: &str = "slots";
pub const LEDGER_KEY: &str = "ledger";
const COUNTS_FIELD: &str = "counts";

pub async fn read_counts<S: DocumentStore>(store: &S) -> Result<HashMap<String, i64>, AppError> {
    let doc = store.get(LEDGER_COLLECTION, LEDGER_KEY).await?;
    let mut counts = HashMap::new();
    if let Some(doc) = doc {
        if let Some(map) = doc.get(COUNTS_FIELD).and_then(|v| v.as_object()) {
            for (slot, count) in map {
                if let Some(count) = count.as_i64() {
                    counts.insert(slot.clone(), count);
                }
            }
        }
    }
    Ok(counts)
}

/// Timestamps whose booking count is below capacity, ascending
/// chronologically.  Keys that do not parse as ISO timestamps are dropped.
pub fn available_slots(counts: &HashMap<String, i64>, capacity: i64) -> Vec<String> {
    let mut open: Vec<_> = counts
        .iter()
        .filter(|(_, &count)| count < capacity)
        .filter_map(|(slot, _)| parse_slot(slot).map(|dt| (dt, slot.clone())))
        .collect();
    open.sort();
    open.into_iter().map(|(_, slot)| slot).collect()
}

/// Atomically move a slot's count by `delta` (+1 on booking, -1 on
/// cancellation).
pub async fn adjust_count<S: DocumentStore>(
    store: &S,
    slot: &str,
    delta: i64,
) -> Result<(), AppError> {
    store
        .update(
            LEDGER_COLLECTION,
            LEDGER_KEY,
            vec![FieldPatch::Increment {
                path: format!("{COUNTS_FIELD}.{}", quote_segment(slot)),
                delta,
            }],
        )
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::SLOT_CAPACITY;
    use crate::store::memory::MemoryStore;
    use serde_json::json;

    #[test]
    fn full_slots_are_excluded() {
        let counts = HashMap::from([
            ("2024-06-01T10:00:00".to_string(), 1),
            ("2024-06-01T11:00:00".to_string(), 2),
        ]);
        assert_eq!(
            available_slots(&counts, SLOT_CAPACITY),
            vec!["2024-06-01T10:00:00".to_string()]
        );
    }

    #[test]
    fn empty_ledger_means_no_available_dates() {
        assert!(available_slots(&HashMap::new(), SLOT_CAPACITY).is_empty());
    }

    #[test]
    fn slots_come_back_in_date_order() {
        let counts = HashMap::from([
            ("2024-06-03T09:00:00".to_string(), 0),
            ("2024-06-01T14:00:00".to_string(), 1),
            ("2024-06-02T10:00:00".to_string(), 0),
            ("not-a-timestamp".to_string(), 0),
        ]);
        assert_eq!(
            available_slots(&counts, SLOT_CAPACITY),
            vec![
                "2024-06-01T14:00:00".to_string(),
                "2024-06-02T10:00:00".to_string(),
                "2024-06-03T09:00:00".to_string(),
            ]
        );
    }

    #[test]
    fn counts_over_capacity_stay_hidden() {
        let counts = HashMap::from([("2024-06-01T10:00:00".to_string(), 3)]);
        assert!(available_slots(&counts, SLOT_CAPACITY).is_empty());
    }

    #[tokio::test]
    async fn adjustments_round_trip_through_the_store() {
        let store = MemoryStore::default();
        adjust_count(&store, "2024-06-01T10:00:00", 1).await.unwrap();
        adjust_count(&store, "2024-06-01T10:00:00", 1).await.unwrap();
        adjust_count(&store, "2024-06-01T10:00:00", -1).await.unwrap();
        let counts = read_counts(&store).await.unwrap();
        assert_eq!(counts.get("2024-06-01T10:00:00"), Some(&1));
    }

    #[tokio::test]
    async fn missing_ledger_reads_as_empty() {
        let store = MemoryStore::default();
        assert!(read_counts(&store).await.unwrap().is_empty());
        store.seed(LEDGER_COLLECTION, LEDGER_KEY, json!({ "counts": {} }));
        assert!(read_counts(&store).await.unwrap().is_empty());
    }
}

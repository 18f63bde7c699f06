use log::{debug, error, info};

use super::{Item, ItemStore, PutStatus, Record, TableSpec};
use crate::Settings;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemErrorKind {
    /// Failed local validation and was never submitted.
    Validation,
    /// Submitted, and the store refused this item.
    Rejected,
    /// Submitted, but the whole batch call failed.
    Unavailable,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ItemError {
    /// Position of the record in the input sequence.
    pub index: usize,
    pub key: Option<String>,
    pub kind: ItemErrorKind,
    pub message: String,
    pub item: Item,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteReport {
    pub batches: usize,
    pub attempted: usize,
    pub succeeded: usize,
    pub errors: Vec<ItemError>,
}

impl WriteReport {
    pub fn failed(&self) -> usize {
        self.errors.len()
    }

    pub fn is_complete(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Splits `records` into consecutive batches of at most `size` items.
pub fn partition<T>(records: &[T], size: usize) -> std::slice::Chunks<'_, T> {
    records.chunks(size.max(1))
}

/// Writes `records` to `table` in batches of at most 25 items.
///
/// Every record is validated first. A failing record, an item the store
/// rejects, or a batch call that fails outright is recorded in the report
/// and logged with the offending item. Processing always continues with
/// the next item and the next batch. Nothing is retried.
pub async fn write_batches<S>(store: &S, table: &TableSpec, records: &[Record]) -> WriteReport
where
    S: ItemStore + ?Sized,
{
    let mut report = WriteReport::default();

    for (batch_no, batch) in partition(records, Settings::STORE_BATCH_LIMIT).enumerate() {
        let offset = batch_no * Settings::STORE_BATCH_LIMIT;
        report.batches += 1;
        report.attempted += batch.len();

        let mut indices = Vec::with_capacity(batch.len());
        let mut items = Vec::with_capacity(batch.len());
        for (i, record) in batch.iter().enumerate() {
            match record.validate(&table.key_attribute) {
                Ok(()) => {
                    indices.push(offset + i);
                    items.push(record.item().clone());
                }
                Err(e) => report.push_error(
                    offset + i,
                    record,
                    &table.key_attribute,
                    ItemErrorKind::Validation,
                    e.to_string(),
                ),
            }
        }

        if items.is_empty() {
            continue;
        }

        debug!(
            "Submitting batch {} with {} items to table {}",
            batch_no,
            items.len(),
            table.name
        );

        match store.batch_put(&table.name, &items).await {
            Ok(statuses) => {
                for (pos, &index) in indices.iter().enumerate() {
                    let record = &records[index];
                    match statuses.get(pos) {
                        Some(PutStatus::Written) => report.succeeded += 1,
                        Some(PutStatus::Rejected(msg)) => report.push_error(
                            index,
                            record,
                            &table.key_attribute,
                            ItemErrorKind::Rejected,
                            msg.clone(),
                        ),
                        None => report.push_error(
                            index,
                            record,
                            &table.key_attribute,
                            ItemErrorKind::Unavailable,
                            "store returned no status for item".to_string(),
                        ),
                    }
                }
            }
            Err(e) => {
                for &index in &indices {
                    report.push_error(
                        index,
                        &records[index],
                        &table.key_attribute,
                        ItemErrorKind::Unavailable,
                        e.to_string(),
                    );
                }
            }
        }
    }

    info!(
        "Put {}/{} items to table {} in {} batches",
        report.succeeded, report.attempted, table.name, report.batches
    );
    report
}

impl WriteReport {
    fn push_error(
        &mut self,
        index: usize,
        record: &Record,
        key_attribute: &str,
        kind: ItemErrorKind,
        message: String,
    ) {
        error!("Error writing item {:?}: {}", record.item(), message);
        self.errors.push(ItemError {
            index,
            key: record.id(key_attribute).map(str::to_string),
            kind,
            message,
            item: record.item().clone(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{AttributeValue, MemoryStore, StoreError};
    use async_trait::async_trait;
    use std::sync::Mutex;

    fn records(n: usize) -> Vec<Record> {
        (0..n)
            .map(|i| Record::new("id", i.to_string()).with("n", AttributeValue::n(i)))
            .collect()
    }

    #[test]
    fn test_partition_counts_and_order() {
        for len in [0usize, 1, 24, 25, 26, 50, 51, 1000] {
            let recs = records(len);
            let batches: Vec<&[Record]> = partition(&recs, 25).collect();
            assert_eq!(batches.len(), len.div_ceil(25));
            assert!(batches.iter().all(|b| b.len() <= 25));
            let joined: Vec<Record> = batches.concat();
            assert_eq!(joined, recs);
        }
    }

    #[tokio::test]
    async fn test_empty_input() {
        let store = MemoryStore::new();
        let report = write_batches(&store, &TableSpec::new("t", "id"), &[]).await;
        assert_eq!(report, WriteReport::default());
        assert_eq!(store.len("t"), 0);
    }

    #[tokio::test]
    async fn test_one_malformed_item_in_batch() {
        let store = MemoryStore::new();
        let mut recs = records(25);
        recs[7] = Record::new("id", "7").with("n", AttributeValue::N("seven".into()));

        let report = write_batches(&store, &TableSpec::new("t", "id"), &recs).await;

        assert_eq!(report.batches, 1);
        assert_eq!(report.attempted, 25);
        assert_eq!(report.succeeded, 24);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].index, 7);
        assert_eq!(report.errors[0].kind, ItemErrorKind::Validation);
        assert_eq!(report.errors[0].key.as_deref(), Some("7"));
        for i in (0..25).filter(|&i| i != 7) {
            assert!(store.get("t", &i.to_string()).is_some());
        }
        assert!(store.get("t", "7").is_none());
    }

    #[tokio::test]
    async fn test_store_rejection_does_not_abort_later_batches() {
        let store = MemoryStore::with_max_item_size(64);
        let mut recs = records(60);
        recs[3] = Record::new("id", "3").with("blob", AttributeValue::s("x".repeat(200)));

        let report = write_batches(&store, &TableSpec::new("t", "id"), &recs).await;

        assert_eq!(report.batches, 3);
        assert_eq!(report.succeeded, 59);
        assert_eq!(report.errors[0].kind, ItemErrorKind::Rejected);
        assert_eq!(store.len("t"), 59);
    }

    struct FlakyStore {
        calls: Mutex<usize>,
    }

    #[async_trait]
    impl ItemStore for FlakyStore {
        async fn batch_put(&self, _table: &str, items: &[Item]) -> Result<Vec<PutStatus>, StoreError> {
            let mut calls = self.calls.lock().unwrap();
            *calls += 1;
            if *calls == 1 {
                return Err(StoreError("throttled".into()));
            }
            Ok(vec![PutStatus::Written; items.len()])
        }
    }

    #[tokio::test]
    async fn test_failed_batch_call_marks_items_unavailable() {
        let store = FlakyStore {
            calls: Mutex::new(0),
        };
        let report = write_batches(&store, &TableSpec::new("t", "id"), &records(30)).await;

        assert_eq!(report.batches, 2);
        assert_eq!(report.succeeded, 5);
        assert_eq!(report.failed(), 25);
        assert!(report
            .errors
            .iter()
            .all(|e| e.kind == ItemErrorKind::Unavailable && e.message.contains("throttled")));
        assert_eq!(*store.calls.lock().unwrap(), 2);
    }
}

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use super::{Item, ItemStore, PutStatus, Record, StoreError};
use crate::Settings;

/// Item size limit applied by the store, 400 KB as on DynamoDB.
pub const DEFAULT_MAX_ITEM_SIZE: usize = 400 * 1024;

/// A process-local store with upsert-by-key semantics.
///
/// Items are keyed by the first string attribute named in `key_attributes`
/// (`id` and `metric_id` by default); anything else is rejected per item.
#[derive(Debug)]
pub struct MemoryStore {
    tables: Mutex<HashMap<String, HashMap<String, Item>>>,
    key_attributes: Vec<String>,
    max_item_size: usize,
}

impl Default for MemoryStore {
    fn default() -> Self {
        MemoryStore {
            tables: Mutex::new(HashMap::new()),
            key_attributes: vec!["id".to_string(), "metric_id".to_string()],
            max_item_size: DEFAULT_MAX_ITEM_SIZE,
        }
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_item_size(max_item_size: usize) -> Self {
        MemoryStore {
            max_item_size,
            ..Self::default()
        }
    }

    pub fn with_key_attribute(mut self, key_attribute: impl Into<String>) -> Self {
        self.key_attributes = vec![key_attribute.into()];
        self
    }

    pub fn len(&self, table: &str) -> usize {
        self.tables
            .lock()
            .map(|t| t.get(table).map_or(0, HashMap::len))
            .unwrap_or(0)
    }

    pub fn is_empty(&self, table: &str) -> bool {
        self.len(table) == 0
    }

    pub fn get(&self, table: &str, id: &str) -> Option<Item> {
        let tables = self.tables.lock().ok()?;
        tables.get(table)?.get(id).cloned()
    }

    fn key_of(&self, item: &Item) -> Option<String> {
        self.key_attributes
            .iter()
            .find_map(|k| item.get(k).and_then(|v| v.as_str()))
            .filter(|id| !id.is_empty())
            .map(str::to_string)
    }
}

#[async_trait]
impl ItemStore for MemoryStore {
    async fn batch_put(&self, table: &str, items: &[Item]) -> Result<Vec<PutStatus>, StoreError> {
        if items.len() > Settings::STORE_BATCH_LIMIT {
            return Err(StoreError(format!(
                "batch of {} items exceeds the limit of {}",
                items.len(),
                Settings::STORE_BATCH_LIMIT
            )));
        }

        let mut tables = self
            .tables
            .lock()
            .map_err(|_| StoreError("store lock poisoned".into()))?;
        let rows = tables.entry(table.to_string()).or_default();

        let statuses = items
            .iter()
            .map(|item| {
                let Some(id) = self.key_of(item) else {
                    return PutStatus::Rejected("One of the required keys was not given a value".into());
                };
                let size = Record::from_item(item.clone()).size();
                if size > self.max_item_size {
                    return PutStatus::Rejected(format!(
                        "Item size of {} bytes has exceeded the maximum allowed size of {}",
                        size, self.max_item_size
                    ));
                }
                rows.insert(id, item.clone());
                PutStatus::Written
            })
            .collect();

        Ok(statuses)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::AttributeValue;

    #[tokio::test]
    async fn test_last_write_wins() {
        let store = MemoryStore::new();
        let first = Record::new("id", "a").with("v", AttributeValue::n(1)).into_item();
        let second = Record::new("id", "a").with("v", AttributeValue::n(2)).into_item();

        let statuses = store.batch_put("t", &[first, second]).await.unwrap();

        assert_eq!(statuses, vec![PutStatus::Written, PutStatus::Written]);
        assert_eq!(store.len("t"), 1);
        assert_eq!(store.get("t", "a").unwrap()["v"], AttributeValue::n(2));
    }

    #[tokio::test]
    async fn test_rejects_item_without_key() {
        let store = MemoryStore::new().with_key_attribute("metric_id");
        let good = Record::new("metric_id", "1").into_item();
        let bad = Record::new("id", "2").into_item();

        let statuses = store.batch_put("t", &[good, bad]).await.unwrap();

        assert_eq!(statuses[0], PutStatus::Written);
        assert!(matches!(statuses[1], PutStatus::Rejected(_)));
        assert_eq!(store.len("t"), 1);
    }

    #[tokio::test]
    async fn test_oversized_batch_is_refused() {
        let store = MemoryStore::new();
        let items: Vec<Item> = (0..26).map(|i| Record::new("id", i.to_string()).into_item()).collect();
        assert!(store.batch_put("t", &items).await.is_err());
        assert!(store.is_empty("t"));
    }
}

pub mod batch;
pub mod export;
pub mod item;
pub mod memory;

use async_trait::async_trait;
use thiserror::Error;

pub use batch::{partition, write_batches, ItemError, ItemErrorKind, WriteReport};
pub use item::{AttributeValue, Item, Record};
pub use memory::MemoryStore;

/// Table name plus the attribute holding each record's unique id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSpec {
    pub name: String,
    pub key_attribute: String,
}

impl TableSpec {
    pub fn new(name: impl Into<String>, key_attribute: impl Into<String>) -> Self {
        TableSpec {
            name: name.into(),
            key_attribute: key_attribute.into(),
        }
    }
}

/// Outcome of one item inside an accepted batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PutStatus {
    Written,
    Rejected(String),
}

/// The whole batch call failed, none of its items are known to be written.
#[derive(Debug, Clone, Error)]
#[error("store unavailable: {0}")]
pub struct StoreError(pub String);

/// The key-value store as seen by the batch writer. Implementations own
/// transport and authentication.
#[async_trait]
pub trait ItemStore: Send + Sync {
    /// Conditionally puts up to [`crate::Settings::STORE_BATCH_LIMIT`] items.
    /// Returns one status per submitted item, in submission order.
    async fn batch_put(&self, table: &str, items: &[Item]) -> Result<Vec<PutStatus>, StoreError>;
}

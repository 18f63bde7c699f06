pub mod config;
pub mod error;
pub mod generator;
pub mod ingest;
pub mod logging;
pub mod proxy;
pub mod query;
pub mod remote_write;
pub mod scheduler;
pub mod store;

pub use config::AppConfig;
pub use error::{Error, Result};
pub use query::{DataPoint, QueryClient, QueryResult, RequestSigner};
pub use remote_write::{encode, transmit, RemoteWriter, TransmitResult};
pub use store::{write_batches, ItemStore, Record, TableSpec, WriteReport};

use std::time::Duration;

pub struct Settings {}

impl Settings {
    // Hard per-request item limit of the key-value store.
    pub const STORE_BATCH_LIMIT: usize = 25;
    // Metrics buffered before a stream ingest flush.
    pub const STREAM_BATCH_LIMIT: usize = 500;
    pub const REPLAY_DELAY: Duration = Duration::from_secs(1);

    pub const METRIC_NAME_LABEL: &str = "__name__";
    pub const ACCOUNT_LABEL: &str = "account";
    pub const MAX_METRIC_NAME_LENGTH: usize = 200;
    pub const MAX_DIMENSION_VALUE_LENGTH: usize = 100;

    pub const CONTENT_ENCODING: &str = "snappy";
    pub const CONTENT_TYPE: &str = "application/x-protobuf";
    pub const REMOTE_WRITE_VERSION: &str = "0.1.0";
    pub const USER_AGENT: &str = "metrics-worker";

    pub const INSTANT_QUERY_PATH: &str = "/api/v1/query";
    pub const RANGE_QUERY_PATH: &str = "/api/v1/query_range";
    pub const DEFAULT_REGION: &str = "us-east-1";
    pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
}

#[cfg(test)]
pub(crate) mod testutil;

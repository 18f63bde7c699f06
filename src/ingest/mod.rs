//! Metric stream deliveries into remote write.

pub mod processor;
pub mod stream;

pub use processor::{InputRecord, MetricSink, RecordResult, RecordStatus, StreamProcessor};
pub use stream::{parse_lines, parse_record, to_write_request, MetricStreamRecord, MetricValue};

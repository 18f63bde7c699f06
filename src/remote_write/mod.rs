pub mod encoder;
pub mod proto;
pub mod transmitter;

pub use encoder::{
    build_series, decode, encode, sanitize_label_name, sanitize_metric_name, utc_from_naive,
    WriteRequestBuilder,
};
pub use proto::{Label, MetricMetadata, MetricType, Sample, TimeSeries, WriteRequest};
pub use transmitter::{compress, decompress, transmit, RemoteWriter, TransmitResult};

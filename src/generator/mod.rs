pub mod records;
pub mod samples;

pub use records::{metric_record, metric_records, service_records};
pub use samples::{records_to_write_request, synthetic_sample, Observation};

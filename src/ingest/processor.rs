use async_trait::async_trait;
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};

use super::stream::{parse_lines, to_write_request, MetricStreamRecord};
use crate::error::Result;
use crate::remote_write::{RemoteWriter, TransmitResult, WriteRequest};
use crate::Settings;

/// Where flushed batches go.
#[async_trait]
pub trait MetricSink: Send + Sync {
    async fn send(&self, request: &WriteRequest) -> Result<TransmitResult>;
}

#[async_trait]
impl MetricSink for RemoteWriter {
    async fn send(&self, request: &WriteRequest) -> Result<TransmitResult> {
        RemoteWriter::send(self, request).await
    }
}

/// A delivery record: an id and newline-delimited metric stream lines.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputRecord {
    pub record_id: String,
    pub data: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecordStatus {
    Ok,
    Dropped,
    ProcessingFailed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordResult {
    pub record_id: String,
    pub result: RecordStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RecordResult {
    fn ok(record: &InputRecord) -> Self {
        RecordResult {
            record_id: record.record_id.clone(),
            result: RecordStatus::Ok,
            data: Some(record.data.clone()),
            error: None,
        }
    }

    fn dropped(record: &InputRecord) -> Self {
        RecordResult {
            record_id: record.record_id.clone(),
            result: RecordStatus::Dropped,
            data: None,
            error: None,
        }
    }

    fn failed(record: &InputRecord, message: impl Into<String>) -> Self {
        RecordResult {
            record_id: record.record_id.clone(),
            result: RecordStatus::ProcessingFailed,
            data: None,
            error: Some(message.into()),
        }
    }

    fn fail(&mut self, message: &str) {
        self.result = RecordStatus::ProcessingFailed;
        self.data = None;
        self.error = Some(message.to_string());
    }
}

const BATCH_FAILED: &str = "Batch failed to write.";

/// Buffers parsed metrics across records and flushes them to a sink in
/// batches of at most `batch_limit`.
///
/// Every buffered metric remembers which record of the delivery it came
/// from. When a batch cannot be written, each record that contributed to it
/// is reported `ProcessingFailed`, so the delivery retries it.
pub struct StreamProcessor<S: MetricSink> {
    sink: S,
    batch_limit: usize,
    buffer: Vec<MetricStreamRecord>,
    owners: Vec<usize>,
}

impl<S: MetricSink> StreamProcessor<S> {
    pub fn new(sink: S) -> Self {
        Self::with_batch_limit(sink, Settings::STREAM_BATCH_LIMIT)
    }

    pub fn with_batch_limit(sink: S, batch_limit: usize) -> Self {
        StreamProcessor {
            sink,
            batch_limit: batch_limit.max(1),
            buffer: Vec::new(),
            owners: Vec::new(),
        }
    }

    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Processes one delivery, returning a result per input record in order.
    ///
    /// Metrics left over after the last record are sent in a final flush.
    /// If it fails, the records it carried are downgraded to
    /// `ProcessingFailed`.
    pub async fn process(&mut self, records: &[InputRecord]) -> Vec<RecordResult> {
        let mut results: Vec<RecordResult> = Vec::with_capacity(records.len());
        for record in records {
            debug!("Received record {}", record.record_id);
            let result = self.process_record(record, &mut results).await;
            results.push(result);
        }

        if !self.buffer.is_empty() {
            info!(
                "Processed {} records, sending {} remaining metrics",
                results.len(),
                self.buffer.len()
            );
            match self.flush(&mut results).await {
                Ok(()) => info!("Successfully sent final batch"),
                Err(e) => error!("Failed to send final batch: {}", e),
            }
        }
        results
    }

    async fn process_record(
        &mut self,
        record: &InputRecord,
        results: &mut [RecordResult],
    ) -> RecordResult {
        if record.data.trim().is_empty() {
            return RecordResult::dropped(record);
        }

        let metrics = match parse_lines(&record.data) {
            Ok(metrics) => metrics,
            Err(e) => {
                warn!("Error processing record {}: {}", record.record_id, e);
                return RecordResult::failed(record, e.to_string());
            }
        };

        // Index this record's result will take once pushed.
        let owner = results.len();
        for metric in metrics {
            self.buffer.push(metric);
            self.owners.push(owner);
            if self.buffer.len() >= self.batch_limit {
                info!("Max batch size reached, sending {} metrics", self.buffer.len());
                if let Err(e) = self.flush(results).await {
                    warn!("Failed to send record {}: {}", record.record_id, e);
                    return RecordResult::failed(record, BATCH_FAILED);
                }
            }
        }
        debug!("Successfully processed record {}", record.record_id);
        RecordResult::ok(record)
    }

    /// Sends the buffer, which is empty afterwards either way. On failure,
    /// already reported records whose metrics were in the batch are marked
    /// failed; the record still being processed is left to the caller.
    async fn flush(&mut self, results: &mut [RecordResult]) -> std::result::Result<(), String> {
        let batch = std::mem::take(&mut self.buffer);
        let mut owners = std::mem::take(&mut self.owners);

        let outcome = match to_write_request(&batch) {
            Ok(request) => match self.sink.send(&request).await {
                Ok(result) if result.is_success() => Ok(()),
                Ok(result) => Err(format!(
                    "remote write returned {}: {}",
                    result.status, result.body
                )),
                Err(e) => Err(e.to_string()),
            },
            Err(e) => Err(e.to_string()),
        };

        if outcome.is_err() {
            owners.dedup();
            for owner in owners {
                if let Some(result) = results.get_mut(owner) {
                    result.fail(BATCH_FAILED);
                }
            }
        }
        outcome
    }
}

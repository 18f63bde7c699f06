use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{DateTime, NaiveDateTime, Utc};
use log::debug;
use prost::Message;

use super::proto::{Label, MetricMetadata, Sample, TimeSeries, WriteRequest};
use crate::error::{Error, Result};
use crate::Settings;

/// Encodes a single observation as a serialized, uncompressed `WriteRequest`.
///
/// The series carries `__name__ = metric_name` plus `labels`, and exactly one
/// sample stamped with `timestamp` in whole milliseconds.
pub fn encode(
    metric_name: &str,
    labels: &BTreeMap<String, String>,
    value: f64,
    timestamp: DateTime<Utc>,
) -> Result<Vec<u8>> {
    let series = build_series(metric_name, labels, vec![sample(value, timestamp)])?;
    let request = WriteRequest {
        timeseries: vec![series],
        metadata: Vec::new(),
    };
    Ok(request.encode_to_vec())
}

pub fn decode(bytes: &[u8]) -> Result<WriteRequest> {
    Ok(WriteRequest::decode(bytes)?)
}

pub fn sample(value: f64, timestamp: DateTime<Utc>) -> Sample {
    Sample {
        value,
        timestamp: timestamp.timestamp_millis(),
    }
}

/// Timestamps without a zone are read as UTC.
pub fn utc_from_naive(naive: NaiveDateTime) -> DateTime<Utc> {
    naive.and_utc()
}

/// Builds a validated series, labels sorted by name.
pub fn build_series(
    metric_name: &str,
    labels: &BTreeMap<String, String>,
    samples: Vec<Sample>,
) -> Result<TimeSeries> {
    if labels.contains_key(Settings::METRIC_NAME_LABEL) {
        return Err(Error::EncodingContract(format!(
            "label '{}' is reserved for the metric name",
            Settings::METRIC_NAME_LABEL
        )));
    }
    let series = TimeSeries {
        labels: label_set(metric_name, labels),
        samples,
    };
    validate_series(&series)?;
    Ok(series)
}

fn label_set(metric_name: &str, labels: &BTreeMap<String, String>) -> Vec<Label> {
    let mut set = Vec::with_capacity(labels.len() + 1);
    set.push(Label::new(Settings::METRIC_NAME_LABEL, metric_name));
    set.extend(labels.iter().map(|(k, v)| Label::new(k.as_str(), v.as_str())));
    set.sort_by(|a, b| a.name.cmp(&b.name));
    set
}

/// A series is transmittable when it holds exactly one non-empty `__name__`
/// label, unique label names and at least one sample.
pub fn validate_series(series: &TimeSeries) -> Result<()> {
    let mut names = HashSet::with_capacity(series.labels.len());
    for label in &series.labels {
        if label.name.is_empty() {
            return Err(Error::EncodingContract("empty label name".into()));
        }
        if !names.insert(label.name.as_str()) {
            return Err(Error::EncodingContract(format!(
                "duplicate label name '{}'",
                label.name
            )));
        }
    }

    match series
        .labels
        .iter()
        .find(|l| l.name == Settings::METRIC_NAME_LABEL)
    {
        Some(l) if !l.value.is_empty() => {}
        Some(_) => return Err(Error::EncodingContract("metric name is empty".into())),
        None => {
            return Err(Error::EncodingContract(format!(
                "series has no '{}' label",
                Settings::METRIC_NAME_LABEL
            )))
        }
    }

    if series.samples.is_empty() {
        return Err(Error::EncodingContract("series has no samples".into()));
    }
    Ok(())
}

/// Collects observations into one `WriteRequest`, one `TimeSeries` per
/// distinct label set. Samples keep their push order within a series.
#[derive(Debug, Default)]
pub struct WriteRequestBuilder {
    timeseries: Vec<TimeSeries>,
    index: HashMap<Vec<Label>, usize>,
    metadata: Vec<MetricMetadata>,
    samples: usize,
}

impl WriteRequestBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(
        &mut self,
        metric_name: &str,
        labels: &BTreeMap<String, String>,
        value: f64,
        timestamp: DateTime<Utc>,
    ) -> Result<()> {
        if labels.contains_key(Settings::METRIC_NAME_LABEL) {
            return Err(Error::EncodingContract(format!(
                "label '{}' is reserved for the metric name",
                Settings::METRIC_NAME_LABEL
            )));
        }
        self.push_labels(label_set(metric_name, labels), sample(value, timestamp))
    }

    /// Adds a sample under an already assembled label set. The set must
    /// contain the metric name label.
    pub fn push_labels(&mut self, mut labels: Vec<Label>, sample: Sample) -> Result<()> {
        labels.sort_by(|a, b| a.name.cmp(&b.name));
        if let Some(&pos) = self.index.get(&labels) {
            self.timeseries[pos].samples.push(sample);
        } else {
            let series = TimeSeries {
                labels: labels.clone(),
                samples: vec![sample],
            };
            validate_series(&series)?;
            self.index.insert(labels, self.timeseries.len());
            self.timeseries.push(series);
        }
        self.samples += 1;
        Ok(())
    }

    pub fn add_metadata(&mut self, metadata: MetricMetadata) {
        self.metadata.push(metadata);
    }

    pub fn series_count(&self) -> usize {
        self.timeseries.len()
    }

    pub fn sample_count(&self) -> usize {
        self.samples
    }

    pub fn is_empty(&self) -> bool {
        self.samples == 0
    }

    pub fn build(self) -> WriteRequest {
        debug!(
            "Built write request with {} series and {} samples",
            self.timeseries.len(),
            self.samples
        );
        WriteRequest {
            timeseries: self.timeseries,
            metadata: self.metadata,
        }
    }

    pub fn encode(self) -> Vec<u8> {
        self.build().encode_to_vec()
    }
}

/// Rewrites `name` into a valid metric name (`[a-zA-Z_:][a-zA-Z0-9_:]*`).
pub fn sanitize_metric_name(name: &str) -> String {
    sanitize(name, |c, first| c == ':' || is_label_char(c, first))
}

/// Rewrites `name` into a valid label name (`[a-zA-Z_][a-zA-Z0-9_]*`).
pub fn sanitize_label_name(name: &str) -> String {
    sanitize(name, is_label_char)
}

fn is_label_char(c: char, first: bool) -> bool {
    c.is_ascii_alphabetic() || c == '_' || (!first && c.is_ascii_digit())
}

fn sanitize(name: &str, valid: impl Fn(char, bool) -> bool) -> String {
    let already_valid =
        !name.is_empty() && name.chars().enumerate().all(|(i, c)| valid(c, i == 0));
    if already_valid {
        return name.to_string();
    }
    // Invalid names lose ':' as well, only [a-zA-Z0-9_] survives.
    let mut out: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    if out.starts_with(|c: char| c.is_ascii_digit()) {
        out.replace_range(..1, "_");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn new_year() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_encode_requests_total() {
        let labels = BTreeMap::from([("region".to_string(), "us-east-1".to_string())]);
        let bytes = encode("requests_total", &labels, 42.0, new_year()).unwrap();

        let request = decode(&bytes).unwrap();
        assert_eq!(request.timeseries.len(), 1);
        let series = &request.timeseries[0];
        assert_eq!(
            series.labels,
            vec![
                Label::new("__name__", "requests_total"),
                Label::new("region", "us-east-1"),
            ]
        );
        assert_eq!(series.samples, vec![Sample { value: 42.0, timestamp: 1704067200000 }]);
    }

    #[test]
    fn test_round_trip_keeps_values() {
        let labels = BTreeMap::from([
            ("instance".to_string(), "host-1".to_string()),
            ("job".to_string(), "loader".to_string()),
            ("zone".to_string(), "b".to_string()),
        ]);
        let ts = Utc.timestamp_millis_opt(1_700_000_123_456).unwrap();
        let bytes = encode("latency_seconds", &labels, -0.125, ts).unwrap();

        let series = decode(&bytes).unwrap().timeseries.remove(0);
        let decoded: BTreeMap<String, String> = series
            .labels
            .into_iter()
            .filter(|l| l.name != "__name__")
            .map(|l| (l.name, l.value))
            .collect();
        assert_eq!(decoded, labels);
        assert_eq!(series.samples[0].value, -0.125);
        assert_eq!(series.samples[0].timestamp, 1_700_000_123_456);
    }

    #[test]
    fn test_naive_timestamp_is_utc() {
        let naive = new_year().naive_utc();
        assert_eq!(utc_from_naive(naive).timestamp_millis(), 1704067200000);
    }

    #[test]
    fn test_missing_identity_fails() {
        assert!(matches!(
            encode("", &BTreeMap::new(), 1.0, new_year()),
            Err(Error::EncodingContract(_))
        ));

        let labels = BTreeMap::from([("__name__".to_string(), "other".to_string())]);
        assert!(matches!(
            encode("m", &labels, 1.0, new_year()),
            Err(Error::EncodingContract(_))
        ));

        let unnamed = TimeSeries {
            labels: vec![Label::new("job", "x")],
            samples: vec![sample(1.0, new_year())],
        };
        assert!(validate_series(&unnamed).is_err());
    }

    #[test]
    fn test_series_without_samples_fails() {
        assert!(build_series("m", &BTreeMap::new(), vec![]).is_err());
    }

    #[test]
    fn test_builder_groups_by_label_set() {
        let a = BTreeMap::from([("host".to_string(), "a".to_string())]);
        let b = BTreeMap::from([("host".to_string(), "b".to_string())]);
        let mut builder = WriteRequestBuilder::new();
        builder.push("cpu", &a, 1.0, new_year()).unwrap();
        builder.push("cpu", &b, 2.0, new_year()).unwrap();
        builder.push("cpu", &a, 3.0, new_year()).unwrap();
        builder.push("mem", &a, 4.0, new_year()).unwrap();

        assert_eq!(builder.series_count(), 3);
        assert_eq!(builder.sample_count(), 4);
        let request = builder.build();
        let values: Vec<f64> = request.timeseries[0].samples.iter().map(|s| s.value).collect();
        assert_eq!(values, vec![1.0, 3.0]);
    }

    #[test]
    fn test_sanitize() {
        assert_eq!(sanitize_metric_name("ConsumedReadCapacityUnits"), "ConsumedReadCapacityUnits");
        assert_eq!(sanitize_metric_name("node:cpu_seconds"), "node:cpu_seconds");
        assert_eq!(sanitize_metric_name("AWS/DynamoDB"), "AWS_DynamoDB");
        assert_eq!(sanitize_label_name("Table Name"), "Table_Name");
        assert_eq!(sanitize_label_name("a:b"), "a_b");
        assert_eq!(sanitize_label_name("5xx-errors"), "_xx_errors");
    }
}

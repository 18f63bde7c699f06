use std::collections::{BTreeMap, HashSet};

use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::remote_write::{
    sanitize_label_name, sanitize_metric_name, Label, MetricMetadata, MetricType, Sample,
    WriteRequest, WriteRequestBuilder,
};
use crate::Settings;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricValue {
    #[serde(default)]
    pub count: f64,
    #[serde(default)]
    pub sum: f64,
    #[serde(default)]
    pub max: f64,
    #[serde(default)]
    pub min: f64,
}

/// One line of a metric stream delivery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricStreamRecord {
    #[serde(default)]
    pub metric_stream_name: String,
    pub account_id: String,
    #[serde(default)]
    pub region: String,
    #[serde(default)]
    pub namespace: String,
    pub metric_name: String,
    #[serde(default)]
    pub dimensions: BTreeMap<String, String>,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
    pub value: MetricValue,
    #[serde(default)]
    pub unit: Option<String>,
}

impl MetricStreamRecord {
    pub fn validate(&self) -> Result<()> {
        if self.metric_name.trim().is_empty() {
            return Err(Error::InvalidRecord("metric_name is empty".into()));
        }
        if self.metric_name.chars().count() > Settings::MAX_METRIC_NAME_LENGTH {
            return Err(Error::InvalidRecord(format!(
                "metric_name longer than {} characters",
                Settings::MAX_METRIC_NAME_LENGTH
            )));
        }
        if self.account_id.trim().is_empty() {
            return Err(Error::InvalidRecord("account_id is empty".into()));
        }
        let mut label_names: HashSet<String> = HashSet::with_capacity(self.dimensions.len());
        for (name, value) in &self.dimensions {
            if value.chars().count() > Settings::MAX_DIMENSION_VALUE_LENGTH {
                return Err(Error::InvalidRecord(format!(
                    "dimension '{}' value longer than {} characters",
                    name,
                    Settings::MAX_DIMENSION_VALUE_LENGTH
                )));
            }
            // Dimensions become labels next to the name and account labels.
            let label = sanitize_label_name(name);
            if label.is_empty()
                || label == Settings::METRIC_NAME_LABEL
                || label == Settings::ACCOUNT_LABEL
                || !label_names.insert(label.clone())
            {
                return Err(Error::InvalidRecord(format!(
                    "dimension '{}' maps to reserved or duplicate label '{}'",
                    name, label
                )));
            }
        }
        Ok(())
    }

    pub fn is_count(&self) -> bool {
        self.unit.as_deref() == Some("Count")
    }

    /// Counts report `count`, every other unit reports `sum`.
    pub fn sample_value(&self) -> f64 {
        if self.is_count() {
            self.value.count
        } else {
            self.value.sum
        }
    }

    pub fn metric_type(&self) -> MetricType {
        if self.is_count() {
            MetricType::Counter
        } else {
            MetricType::Gauge
        }
    }
}

pub fn parse_record(line: &str) -> Result<MetricStreamRecord> {
    let record: MetricStreamRecord =
        serde_json::from_str(line.trim()).map_err(|e| Error::InvalidRecord(e.to_string()))?;
    record.validate()?;
    Ok(record)
}

/// Parses newline-delimited records, skipping blank lines. The first bad
/// line fails the whole input.
pub fn parse_lines(data: &str) -> Result<Vec<MetricStreamRecord>> {
    data.lines()
        .filter(|line| !line.trim().is_empty())
        .map(parse_record)
        .collect()
}

type SeriesKey<'a> = (&'a str, &'a str, &'a BTreeMap<String, String>);

/// One series per distinct (account, metric name, dimensions), each with
/// its metadata entry.
pub fn to_write_request(records: &[MetricStreamRecord]) -> Result<WriteRequest> {
    let mut groups: BTreeMap<SeriesKey, Vec<&MetricStreamRecord>> = BTreeMap::new();
    for record in records {
        groups
            .entry((record.account_id.as_str(), record.metric_name.as_str(), &record.dimensions))
            .or_default()
            .push(record);
    }

    let mut builder = WriteRequestBuilder::new();
    for ((account, metric_name, dimensions), group) in groups {
        debug!(
            "Aggregating {} samples for '{}' in account '{}'",
            group.len(),
            metric_name,
            account
        );
        let mut labels: Vec<Label> = dimensions
            .iter()
            .map(|(k, v)| Label::new(sanitize_label_name(k), v.as_str()))
            .collect();
        labels.push(Label::new(
            Settings::METRIC_NAME_LABEL,
            sanitize_metric_name(metric_name),
        ));
        labels.push(Label::new(Settings::ACCOUNT_LABEL, account));

        let mut metadata = MetricMetadata {
            metric_family_name: sanitize_metric_name(metric_name),
            ..Default::default()
        };
        for record in group {
            builder.push_labels(
                labels.clone(),
                Sample {
                    value: record.sample_value(),
                    timestamp: record.timestamp,
                },
            )?;
            if let Some(unit) = &record.unit {
                metadata.unit = unit.clone();
            }
            metadata.set_type(record.metric_type());
            if !record.namespace.is_empty() {
                metadata.metric_family_name = sanitize_label_name(&record.namespace);
            }
        }
        builder.add_metadata(metadata);
    }
    Ok(builder.build())
}

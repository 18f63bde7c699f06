use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDateTime, Utc};
use log::warn;
use rand::Rng;

use super::records::{OPERATIONS, REGIONS, TIMESTAMP_FORMAT};
use crate::error::{Error, Result};
use crate::remote_write::{sanitize_label_name, utc_from_naive, WriteRequest, WriteRequestBuilder};
use crate::store::{AttributeValue, Record};

const RECORD_LABELS: [&str; 3] = ["table_name", "region", "operation_type"];

/// Turns generated metric records into one write request: every entry of a
/// record's `metrics` map becomes a sample labelled with the record's table,
/// region and operation, stamped with the record's timestamp.
pub fn records_to_write_request(records: &[Record]) -> Result<WriteRequest> {
    let mut builder = WriteRequestBuilder::new();
    for record in records {
        let item = record.item();
        let timestamp = match item.get("timestamp").and_then(AttributeValue::as_str) {
            Some(text) => parse_timestamp(text)?,
            None => {
                warn!("Skipping record without a timestamp: {:?}", record.id("id"));
                continue;
            }
        };

        let labels: BTreeMap<String, String> = RECORD_LABELS
            .iter()
            .filter_map(|name| {
                item.get(*name)
                    .and_then(AttributeValue::as_str)
                    .map(|v| (sanitize_label_name(name), v.to_string()))
            })
            .collect();

        let Some(AttributeValue::M(metrics)) = item.get("metrics") else {
            continue;
        };
        for (name, value) in metrics {
            let AttributeValue::N(text) = value else {
                continue;
            };
            let value = text.parse::<f64>().map_err(|_| {
                Error::InvalidRecord(format!("metric '{}' has non-numeric value '{}'", name, text))
            })?;
            builder.push(name, &labels, value, timestamp)?;
        }
    }
    Ok(builder.build())
}

fn parse_timestamp(text: &str) -> Result<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(text, TIMESTAMP_FORMAT)
        .map(utc_from_naive)
        .map_err(|e| Error::InvalidRecord(format!("bad timestamp '{}': {}", text, e)))
}

#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub name: String,
    pub labels: BTreeMap<String, String>,
    pub value: f64,
    pub timestamp: DateTime<Utc>,
}

impl Observation {
    /// Adds `labels`, replacing generated values under the same name.
    pub fn with_labels<I>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        self.labels.extend(labels);
        self
    }
}

/// A random gauge reading for `metric_name` at `at`, labelled like the
/// generated table records.
pub fn synthetic_sample<R: Rng>(rng: &mut R, metric_name: &str, at: DateTime<Utc>) -> Observation {
    let labels = BTreeMap::from([
        ("region".to_string(), REGIONS[rng.gen_range(0..REGIONS.len())].to_string()),
        (
            "operation_type".to_string(),
            OPERATIONS[rng.gen_range(0..OPERATIONS.len())].to_string(),
        ),
    ]);
    Observation {
        name: metric_name.to_string(),
        labels,
        value: rng.gen_range(0.0..100.0),
        timestamp: at,
    }
}

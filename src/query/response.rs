use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// ----------------///
/// Wire envelope   ///
/// ----------------///
#[derive(Default, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryEnvelope {
    pub status: String,
    #[serde(default)]
    pub data: Option<QueryData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_type: Option<String>,
}

#[derive(Default, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryData {
    #[serde(default)]
    pub result_type: String,
    #[serde(default)]
    pub result: Vec<SeriesResult>,
}

/// One matched series. Instant queries fill `value`, range queries `values`.
#[derive(Default, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesResult {
    #[serde(default)]
    pub metric: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<(f64, String)>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<(f64, String)>,
}

/// ----------------///
/// Decoded result  ///
/// ----------------///
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DataPoint {
    /// Seconds since the epoch as reported by the backend, possibly fractional.
    pub timestamp: f64,
    pub time: DateTime<Utc>,
    pub value: f64,
}

impl fmt::Display for DataPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at time {}", self.value, self.time.format("%Y-%m-%d %H:%M:%S"))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueryResult {
    pub status: String,
    pub points: Vec<DataPoint>,
}

impl QueryResult {
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryKind {
    Instant,
    Range,
}

impl DataPoint {
    pub fn from_pair(timestamp: f64, value: &str) -> Result<Self> {
        let time = seconds_to_utc(timestamp)
            .ok_or_else(|| Error::QueryDecode(format!("timestamp {} out of range", timestamp)))?;
        let value = value
            .trim()
            .parse::<f64>()
            .map_err(|_| Error::QueryDecode(format!("sample value '{}' is not a number", value)))?;
        Ok(DataPoint {
            timestamp,
            time,
            value,
        })
    }
}

pub fn seconds_to_utc(seconds: f64) -> Option<DateTime<Utc>> {
    if !seconds.is_finite() {
        return None;
    }
    let whole = seconds.floor();
    let nanos = ((seconds - whole) * 1e9).round().min(999_999_999.0) as u32;
    DateTime::from_timestamp(whole as i64, nanos)
}

/// Parses a 2xx response body. A `status` other than `success` is returned
/// as [`Error::QueryBackend`] carrying the whole decoded body.
pub fn decode_envelope(body: &str) -> Result<QueryEnvelope> {
    let raw: serde_json::Value = serde_json::from_str(body)
        .map_err(|e| Error::QueryDecode(format!("response is not JSON: {}", e)))?;
    if raw.get("status").and_then(|s| s.as_str()) != Some("success") {
        return Err(Error::QueryBackend { body: raw });
    }
    serde_json::from_value(raw).map_err(|e| Error::QueryDecode(e.to_string()))
}

/// Points of the first result series; no series means no points.
pub fn decode_points(envelope: &QueryEnvelope, kind: QueryKind) -> Result<Vec<DataPoint>> {
    let Some(series) = envelope.data.as_ref().and_then(|d| d.result.first()) else {
        return Ok(Vec::new());
    };
    match (kind, &series.value) {
        (QueryKind::Instant, Some((ts, value))) => Ok(vec![DataPoint::from_pair(*ts, value)?]),
        _ => series
            .values
            .iter()
            .map(|(ts, value)| DataPoint::from_pair(*ts, value))
            .collect(),
    }
}

pub fn decode_result(body: &str, kind: QueryKind) -> Result<QueryResult> {
    let envelope = decode_envelope(body)?;
    let points = decode_points(&envelope, kind)?;
    Ok(QueryResult {
        status: envelope.status,
        points,
    })
}

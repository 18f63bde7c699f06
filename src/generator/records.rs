use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use rand::seq::SliceRandom;
use rand::Rng;
use uuid::Uuid;

use crate::store::{AttributeValue, Record};

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6f";

pub const REGIONS: [&str; 3] = ["us-east-1", "us-west-2", "eu-west-1"];
pub const OPERATIONS: [&str; 4] = ["read", "write", "query", "scan"];

pub const SERVICES: [&str; 12] = [
    "Adobe Photoshop",
    "Adobe Illustrator",
    "Adobe InDesign",
    "Adobe Premiere Pro",
    "Adobe After Effects",
    "Adobe Lightroom",
    "Adobe XD",
    "Adobe Spark",
    "Adobe Acrobat",
    "Adobe Dreamweaver",
    "Adobe Animate",
    "Adobe Audition",
];

#[derive(Debug, Clone, Copy)]
enum Range {
    Int(i64, i64),
    Float(f64, f64),
}

// Table-level metric names and the value ranges they are drawn from.
const TABLE_METRICS: [(&str, Range); 20] = [
    ("ConditionalCheckFailedRequests", Range::Int(0, 10)),
    ("ConsumedReadCapacityUnits", Range::Float(1.0, 100.0)),
    ("ConsumedWriteCapacityUnits", Range::Float(1.0, 100.0)),
    ("ReadThrottleEvents", Range::Int(0, 5)),
    ("ReturnedBytes", Range::Int(1000, 50000)),
    ("ReturnedItemCount", Range::Int(1, 100)),
    ("ReturnedRecordsCount", Range::Int(1, 100)),
    ("SuccessfulRequestLatency", Range::Float(0.1, 2.0)),
    ("SystemErrors", Range::Int(0, 3)),
    ("TimeToLiveDeletedItemCount", Range::Int(0, 50)),
    ("ThrottledRequests", Range::Int(0, 10)),
    ("UserErrors", Range::Int(0, 5)),
    ("WriteThrottleEvents", Range::Int(0, 5)),
    ("OnDemandMaxReadRequestUnits", Range::Int(100, 1000)),
    ("OnDemandMaxWriteRequestUnits", Range::Int(100, 1000)),
    ("AccountMaxReads", Range::Int(1000, 5000)),
    ("AccountMaxTableLevelReads", Range::Int(1000, 5000)),
    ("AccountMaxTableLevelWrites", Range::Int(1000, 5000)),
    ("AccountMaxWrites", Range::Int(1000, 5000)),
    ("ThrottledPutRecordCount", Range::Int(0, 10)),
];

/// One synthetic table-metrics row stamped within the hour before `now`.
pub fn metric_record<R: Rng>(rng: &mut R, table_name: &str, now: DateTime<Utc>) -> Record {
    let at = now - Duration::minutes(rng.gen_range(0..=60));

    let metrics: BTreeMap<String, AttributeValue> = TABLE_METRICS
        .iter()
        .map(|(name, range)| {
            let value = match *range {
                Range::Int(lo, hi) => AttributeValue::n(rng.gen_range(lo..=hi)),
                Range::Float(lo, hi) => AttributeValue::n(rng.gen_range(lo..hi)),
            };
            (name.to_string(), value)
        })
        .collect();

    Record::new("id", Uuid::new_v4().to_string())
        .with("timestamp", AttributeValue::s(at.format(TIMESTAMP_FORMAT).to_string()))
        .with("metrics", AttributeValue::M(metrics))
        .with("table_name", AttributeValue::s(table_name))
        .with("region", AttributeValue::s(*REGIONS.choose(rng).unwrap_or(&REGIONS[0])))
        .with(
            "operation_type",
            AttributeValue::s(*OPERATIONS.choose(rng).unwrap_or(&OPERATIONS[0])),
        )
}

pub fn metric_records(count: usize, table_name: &str) -> Vec<Record> {
    let mut rng = rand::thread_rng();
    let now = Utc::now();
    (0..count)
        .map(|_| metric_record(&mut rng, table_name, now))
        .collect()
}

/// Rows keyed by `metric_id` "1".."count", cycling through [`SERVICES`].
pub fn service_records(count: usize) -> Vec<Record> {
    (1..=count)
        .map(|i| {
            let service = SERVICES[(i - 1) % SERVICES.len()];
            let edition = i / SERVICES.len() + 1;
            Record::new("metric_id", i.to_string())
                .with("ServiceName", AttributeValue::s(format!("{} {}", service, edition)))
                .with(
                    "Description",
                    AttributeValue::s(format!("Description for {} {}", service, edition)),
                )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_metric_record_shape() {
        let mut rng = StdRng::seed_from_u64(7);
        let now = Utc::now();
        let record = metric_record(&mut rng, "metrics-dynamodb-table", now);

        assert!(record.validate("id").is_ok());
        let item = record.item();
        assert_eq!(item["table_name"], AttributeValue::s("metrics-dynamodb-table"));
        assert!(REGIONS.contains(&item["region"].as_str().unwrap()));
        assert!(OPERATIONS.contains(&item["operation_type"].as_str().unwrap()));
        match &item["metrics"] {
            AttributeValue::M(metrics) => {
                assert_eq!(metrics.len(), 20);
                assert!(metrics.contains_key("ConsumedWriteCapacityUnits"));
            }
            other => panic!("metrics should be a map, got {:?}", other),
        }
    }

    #[test]
    fn test_metric_ids_are_unique() {
        let records = metric_records(50, "t");
        let ids: std::collections::HashSet<_> = records.iter().filter_map(|r| r.id("id")).collect();
        assert_eq!(ids.len(), 50);
    }

    #[test]
    fn test_service_records() {
        let records = service_records(1000);
        assert_eq!(records.len(), 1000);
        assert_eq!(records[0].id("metric_id"), Some("1"));
        assert_eq!(records[0].item()["ServiceName"], AttributeValue::s("Adobe Photoshop 1"));
        assert_eq!(records[11].item()["ServiceName"], AttributeValue::s("Adobe Audition 2"));
        assert_eq!(
            records[12].item()["Description"],
            AttributeValue::s("Description for Adobe Photoshop 2")
        );
    }
}

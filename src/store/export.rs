use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use log::info;
use serde::{Deserialize, Serialize};

use super::{partition, Item, Record};
use crate::error::Result;
use crate::Settings;

pub const DATA_FILE: &str = "dynamodb_metrics_data.json";
pub const SCRIPT_FILE: &str = "load_metrics_data.sh";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct WriteEntry {
    pub put_request: PutRequest,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PutRequest {
    pub item: Item,
}

/// One `batch-write-item --request-items` document: table name to entries.
pub type RequestItems = BTreeMap<String, Vec<WriteEntry>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportSummary {
    pub records: usize,
    pub batches: usize,
    pub data_file: PathBuf,
    pub script_file: PathBuf,
}

pub fn request_batches(table: &str, records: &[Record]) -> Vec<RequestItems> {
    partition(records, Settings::STORE_BATCH_LIMIT)
        .map(|batch| {
            let entries = batch
                .iter()
                .map(|r| WriteEntry {
                    put_request: PutRequest {
                        item: r.item().clone(),
                    },
                })
                .collect();
            RequestItems::from([(table.to_string(), entries)])
        })
        .collect()
}

/// Shell script that replays every batch of `data_file` through the AWS CLI,
/// sleeping between batches to stay under the write throttle.
pub fn replay_script(batches: usize, data_file: &str) -> String {
    let last_batch = batches as i64 - 1;
    format!(
        r#"#!/bin/bash
# Load data using AWS CLI
for i in $(seq 0 {last_batch}); do
    aws dynamodb batch-write-item --request-items "$(cat {data_file} | jq ".[$i]")"
    echo "Processed batch $i"
    sleep {delay}  # Prevent throttling
done
"#,
        last_batch = last_batch,
        data_file = data_file,
        delay = Settings::REPLAY_DELAY.as_secs(),
    )
}

/// Writes the batch file and its replay script into `dir`.
pub fn export_batches(table: &str, records: &[Record], dir: &Path) -> Result<ExportSummary> {
    fs::create_dir_all(dir)?;
    let batches = request_batches(table, records);

    let data_file = dir.join(DATA_FILE);
    fs::write(&data_file, serde_json::to_string_pretty(&batches)?)?;

    let script_file = dir.join(SCRIPT_FILE);
    fs::write(&script_file, replay_script(batches.len(), DATA_FILE))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&script_file, fs::Permissions::from_mode(0o755))?;
    }

    info!("Generated {} records in {} batches", records.len(), batches.len());
    Ok(ExportSummary {
        records: records.len(),
        batches: batches.len(),
        data_file,
        script_file,
    })
}

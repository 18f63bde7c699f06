use clap::{Parser, Subcommand};
use serde::Deserialize;
use std::fs;
use std::{path::Path, time::Duration};

use crate::error::{Error, Result};
use crate::Settings;

#[derive(Deserialize, Debug, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub remote_write: RemoteWriteConfig,
    #[serde(default)]
    pub query: QueryConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Deserialize, Debug)]
pub struct StoreConfig {
    pub table: Option<String>,
    #[serde(default = "default_key_attribute")]
    pub key_attribute: String,
    #[serde(default = "default_records")]
    pub records: usize,
    #[serde(default = "default_export_dir")]
    pub export_dir: String,
}

#[derive(Deserialize, Debug)]
pub struct RemoteWriteConfig {
    #[serde(default = "default_remote_write_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_timeout", deserialize_with = "duration_deserialize")]
    pub timeout: Duration,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

#[derive(Deserialize, Debug)]
pub struct QueryConfig {
    pub endpoint: Option<String>,
    #[serde(default = "default_region")]
    pub region: String,
    #[serde(default = "default_timeout", deserialize_with = "duration_deserialize")]
    pub timeout: Duration,
    #[serde(default = "default_proxy_function")]
    pub proxy_function: String,
}

#[derive(Deserialize, Debug)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_key_attribute() -> String {
    String::from("id")
}
fn default_records() -> usize {
    100
}
fn default_export_dir() -> String {
    String::from(".")
}
fn default_remote_write_endpoint() -> String {
    String::from("http://localhost:9090/api/v1/write")
}
fn default_timeout() -> Duration {
    Settings::REQUEST_TIMEOUT
}
fn default_user_agent() -> String {
    String::from(Settings::USER_AGENT)
}
fn default_region() -> String {
    String::from(Settings::DEFAULT_REGION)
}
fn default_proxy_function() -> String {
    String::from("c2a-amp-query")
}
fn default_log_level() -> String {
    String::from("info")
}

fn duration_deserialize<'de, D>(deserializer: D) -> std::result::Result<Duration, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = u32::deserialize(deserializer)?;
    Ok(Duration::from_secs(s as u64))
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            table: None,
            key_attribute: default_key_attribute(),
            records: default_records(),
            export_dir: default_export_dir(),
        }
    }
}

impl Default for RemoteWriteConfig {
    fn default() -> Self {
        RemoteWriteConfig {
            endpoint: default_remote_write_endpoint(),
            timeout: default_timeout(),
            user_agent: default_user_agent(),
        }
    }
}

impl Default for QueryConfig {
    fn default() -> Self {
        QueryConfig {
            endpoint: None,
            region: default_region(),
            timeout: default_timeout(),
            proxy_function: default_proxy_function(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: default_log_level(),
        }
    }
}

#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
pub struct CliArgs {
    #[arg(short, long, default_value = "config.toml")]
    pub config: String,

    #[arg(long)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Generate records and write them to the store in batches of 25.
    Load {
        table: Option<String>,
        #[arg(long)]
        count: Option<usize>,
        /// Load service catalogue rows keyed by `metric_id` instead of metrics.
        #[arg(long)]
        services: bool,
        /// Repeat every N seconds until Ctrl-C.
        #[arg(long)]
        interval: Option<u64>,
        /// Also send the generated metrics over remote write.
        #[arg(long, conflicts_with = "services")]
        remote_write: bool,
    },
    /// Write the batch file and its replay script instead of loading.
    Export {
        table: Option<String>,
        #[arg(long)]
        count: Option<usize>,
        #[arg(long)]
        services: bool,
        #[arg(long)]
        out: Option<String>,
    },
    /// Send one sample over remote write.
    Write {
        #[arg(long)]
        name: String,
        /// Label as key=value, repeatable.
        #[arg(long = "label", value_parser = parse_label)]
        labels: Vec<(String, String)>,
        /// Without a value a random reading with region and operation labels is sent.
        #[arg(long)]
        value: Option<f64>,
    },
    /// Run a PromQL query and print the points.
    Query {
        promql: String,
        /// Turn the query into a range query over the last N minutes.
        #[arg(long)]
        range: Option<i64>,
        #[arg(long, default_value_t = 60)]
        step: u64,
        /// Go through the configured proxy function instead of the endpoint.
        #[arg(long)]
        relay: bool,
    },
    /// Forward a metric stream delivery (JSON array of records) to remote write.
    Ingest {
        /// Read from this file instead of stdin.
        file: Option<String>,
    },
}

fn parse_label(s: &str) -> std::result::Result<(String, String), String> {
    s.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| format!("label '{}' is not in key=value form", s))
}

/// Reads the TOML file at `path` when it exists, otherwise starts from defaults.
pub fn load_file(path: &str) -> Result<AppConfig> {
    if !Path::new(path).exists() {
        return Ok(AppConfig::default());
    }
    let contents = fs::read_to_string(path)?;
    parse(&contents)
}

pub fn parse(contents: &str) -> Result<AppConfig> {
    toml::from_str(contents).map_err(|e| Error::Config(format!("failed to parse config: {}", e)))
}

impl AppConfig {
    /// Environment overrides: `AMP_ENDPOINT`, `REGION`, `REMOTE_WRITE_URL`, `LOG_LEVEL`.
    pub fn apply_env<F>(&mut self, var: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| var(name).filter(|v| !v.trim().is_empty());
        if let Some(endpoint) = get("AMP_ENDPOINT") {
            self.query.endpoint = Some(endpoint);
        }
        if let Some(region) = get("REGION") {
            self.query.region = region;
        }
        if let Some(url) = get("REMOTE_WRITE_URL") {
            self.remote_write.endpoint = url;
        }
        if let Some(level) = get("LOG_LEVEL") {
            self.logging.level = level;
        }
    }
}

/// File, then environment, then command line.
pub fn load_config(cli_args: &CliArgs) -> Result<AppConfig> {
    let mut config = load_file(&cli_args.config)?;
    config.apply_env(|name| std::env::var(name).ok());

    if let Some(level) = &cli_args.log_level {
        config.logging.level = level.clone();
    }

    if let Some(endpoint) = &config.query.endpoint {
        if !endpoint.starts_with("http") {
            return Err(Error::Config(format!("query endpoint '{}' is not a URL", endpoint)));
        }
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.store.table, None);
        assert_eq!(config.store.key_attribute, "id");
        assert_eq!(config.query.region, "us-east-1");
        assert_eq!(config.remote_write.timeout, Duration::from_secs(30));
        assert_eq!(config.remote_write.user_agent, "metrics-worker");
    }

    #[test]
    fn test_parse_partial_file() {
        let config = parse(
            r#"
            [store]
            table = "adobe-aep-test-metrics"
            key_attribute = "metric_id"

            [query]
            endpoint = "https://aps-workspaces.us-west-2.amazonaws.com/workspaces/ws-1"
            timeout = 5
            "#,
        )
        .unwrap();
        assert_eq!(config.store.table.as_deref(), Some("adobe-aep-test-metrics"));
        assert_eq!(config.store.key_attribute, "metric_id");
        assert_eq!(config.store.records, 100);
        assert_eq!(config.query.timeout, Duration::from_secs(5));
        assert_eq!(config.query.region, "us-east-1");
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_env_overrides() {
        let env = HashMap::from([
            ("AMP_ENDPOINT", "https://amp.example/ws"),
            ("REGION", "eu-west-1"),
            ("LOG_LEVEL", " "),
        ]);
        let mut config = AppConfig::default();
        config.apply_env(|name| env.get(name).map(|v| v.to_string()));

        assert_eq!(config.query.endpoint.as_deref(), Some("https://amp.example/ws"));
        assert_eq!(config.query.region, "eu-west-1");
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_bad_file_is_config_error() {
        assert!(matches!(parse("[store\n"), Err(Error::Config(_))));
    }

    #[test]
    fn test_label_parser() {
        assert_eq!(parse_label("region=us-east-1"), Ok(("region".into(), "us-east-1".into())));
        assert!(parse_label("region").is_err());
    }
}

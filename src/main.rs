use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::{Duration as ChronoDuration, Utc};
use clap::Parser;
use log::{error, info};
use metrics_ingress::config::{load_config, AppConfig, CliArgs, Command};
use metrics_ingress::generator::{
    metric_records, records_to_write_request, service_records, synthetic_sample,
};
use metrics_ingress::ingest::{InputRecord, StreamProcessor};
use metrics_ingress::logging::logger;
use metrics_ingress::proxy::{relay_query, LocalInvoker, QueryProxy};
use metrics_ingress::query::{QueryClient, Unsigned};
use metrics_ingress::remote_write::{encode, RemoteWriter};
use metrics_ingress::scheduler::spawn_periodic_task;
use metrics_ingress::store::{export::export_batches, write_batches, MemoryStore, Record, TableSpec};
use tokio::time::Duration;

const DEFAULT_TABLE_NAME: &str = "metrics-dynamodb-table";

fn generate(services: bool, count: usize) -> Vec<Record> {
    if services {
        service_records(count)
    } else {
        metric_records(count, DEFAULT_TABLE_NAME)
    }
}

fn table_spec(config: &AppConfig, table: String, services: bool) -> TableSpec {
    let key_attribute = if services {
        "metric_id"
    } else {
        config.store.key_attribute.as_str()
    };
    TableSpec::new(table, key_attribute)
}

fn require_table(arg: Option<String>, config: &AppConfig) -> String {
    match arg.or_else(|| config.store.table.clone()) {
        Some(table) => table,
        None => {
            println!("Please provide a table name.");
            std::process::exit(1);
        }
    }
}

async fn load_once(
    store: &MemoryStore,
    table: &TableSpec,
    services: bool,
    count: usize,
    writer: Option<&RemoteWriter>,
) {
    let records = generate(services, count);
    let report = write_batches(store, table, &records).await;
    println!(
        "Put {} of {} items to table {} in {} batches, {} failed",
        report.succeeded,
        report.attempted,
        table.name,
        report.batches,
        report.errors.len()
    );

    if let Some(writer) = writer {
        if let Err(e) = forward_records(writer, &records).await {
            error!("Remote write of generated metrics failed: {}", e);
        }
    }
}

async fn forward_records(writer: &RemoteWriter, records: &[Record]) -> Result<()> {
    let request = records_to_write_request(records)?;
    let result = writer.send(&request).await?;
    println!(
        "Sent {} series to {}, returned {}",
        request.timeseries.len(),
        writer.endpoint(),
        result.status
    );
    if !result.is_success() {
        bail!("remote write returned {}: {}", result.status, result.body);
    }
    Ok(())
}

async fn run_load(
    config: &AppConfig,
    table: Option<String>,
    count: Option<usize>,
    services: bool,
    interval: Option<u64>,
    remote_write: bool,
) -> Result<()> {
    let table = table_spec(config, require_table(table, config), services);
    let count = count.unwrap_or(config.store.records);
    let store = Arc::new(MemoryStore::new());
    let writer = if remote_write {
        Some(Arc::new(RemoteWriter::from_config(&config.remote_write)?))
    } else {
        None
    };

    let Some(seconds) = interval else {
        load_once(&store, &table, services, count, writer.as_deref()).await;
        return Ok(());
    };

    println!("Metric generation is running. Hit CTRL-C to stop.");
    let (_tx, handle) = spawn_periodic_task(Duration::from_secs(seconds.max(1)), move |_| {
        let store = store.clone();
        let table = table.clone();
        let writer = writer.clone();
        async move { load_once(&store, &table, services, count, writer.as_deref()).await }
    });
    let runs = handle.await.context("periodic load task failed")?;
    println!("Metrics generation terminated after {} runs.", runs);
    Ok(())
}

fn run_export(
    config: &AppConfig,
    table: Option<String>,
    count: Option<usize>,
    services: bool,
    out: Option<String>,
) -> Result<()> {
    let table = require_table(table, config);
    let records = generate(services, count.unwrap_or(config.store.records));
    let dir = out.unwrap_or_else(|| config.store.export_dir.clone());

    let summary = export_batches(&table, &records, Path::new(&dir))?;
    println!("Generated {} records in {} batches", summary.records, summary.batches);
    println!("Files created:");
    println!("- {}: Contains the test data", summary.data_file.display());
    println!("- {}: Script to load the data", summary.script_file.display());
    Ok(())
}

async fn run_write(
    config: &AppConfig,
    name: &str,
    labels: Vec<(String, String)>,
    value: Option<f64>,
) -> Result<()> {
    let now = Utc::now();
    let (value, labels) = match value {
        Some(value) => (value, labels.into_iter().collect::<BTreeMap<_, _>>()),
        None => {
            let sample = synthetic_sample(&mut rand::thread_rng(), name, now).with_labels(labels);
            (sample.value, sample.labels)
        }
    };
    let payload = encode(name, &labels, value, now)?;
    let writer = RemoteWriter::from_config(&config.remote_write)?;

    info!("Writing data to {}", writer.endpoint());
    let result = writer.transmit(&payload).await?;
    println!("Returned {}: {}", result.status, result.body);
    if !result.is_success() {
        std::process::exit(1);
    }
    Ok(())
}

async fn run_query(
    config: &AppConfig,
    promql: &str,
    range: Option<i64>,
    step: u64,
    relay: bool,
) -> Result<()> {
    let client = QueryClient::from_config(&config.query, Arc::new(Unsigned))?;

    let points = if relay {
        let invoker = LocalInvoker::new(&config.query.proxy_function, QueryProxy::new(client));
        relay_query(&invoker, &config.query.proxy_function, promql).await?
    } else if let Some(minutes) = range {
        let end = Utc::now();
        let start = end - ChronoDuration::minutes(minutes);
        client
            .query_range(promql, start, end, Duration::from_secs(step.max(1)))
            .await?
            .points
    } else {
        client.query(promql).await?.points
    };

    if points.is_empty() {
        println!("No data points returned");
    }
    for point in points {
        println!("Got data point {}", point);
    }
    Ok(())
}

async fn run_ingest(config: &AppConfig, file: Option<String>) -> Result<()> {
    let raw = match file {
        Some(path) => std::fs::read_to_string(&path).with_context(|| format!("reading {}", path))?,
        None => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            buf
        }
    };
    let records: Vec<InputRecord> =
        serde_json::from_str(&raw).context("delivery must be a JSON array of records")?;

    let writer = RemoteWriter::from_config(&config.remote_write)?;
    let mut processor = StreamProcessor::new(writer);
    let results = processor.process(&records).await;
    println!("{}", serde_json::to_string_pretty(&results)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();
    let config = load_config(&cli_args)?;
    logger::setup_logging(&config.logging.level)?;

    match cli_args.command {
        Command::Load {
            table,
            count,
            services,
            interval,
            remote_write,
        } => run_load(&config, table, count, services, interval, remote_write).await,
        Command::Export {
            table,
            count,
            services,
            out,
        } => run_export(&config, table, count, services, out),
        Command::Write {
            name,
            labels,
            value,
        } => run_write(&config, &name, labels, value).await,
        Command::Query {
            promql,
            range,
            step,
            relay,
        } => {
            if config.query.endpoint.is_none() {
                bail!("no query endpoint configured, set AMP_ENDPOINT or [query].endpoint");
            }
            run_query(&config, &promql, range, step, relay).await
        }
        Command::Ingest { file } => run_ingest(&config, file).await,
    }
}

use std::io::Read;
use std::sync::Arc;

use anyhow::{Context, Result};
use log::error;
use metrics_ingress::logging::logger;
use metrics_ingress::proxy::{ProxyConfig, QueryProxy};
use metrics_ingress::query::Unsigned;
use serde_json::Value;

#[tokio::main]
async fn main() -> Result<()> {
    let level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| String::from("info"));
    logger::setup_logging(&level)?;

    let config = match ProxyConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    };

    let raw = match std::env::args().nth(1) {
        Some(arg) => arg,
        None => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            buf
        }
    };
    let event: Value = serde_json::from_str(&raw).context("event must be JSON")?;

    let proxy = QueryProxy::from_config(&config, Arc::new(Unsigned))?;
    let reply = proxy.handle(&event).await;
    println!("{}", reply);
    Ok(())
}

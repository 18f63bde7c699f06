use std::sync::Arc;
use std::time::Duration;

use log::{info, warn};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::query::{QueryClient, RequestSigner};
use crate::Settings;

pub const QUERY_PARAM: &str = "query";

/// Settings the proxy reads from its environment.
#[derive(Debug, Clone, PartialEq)]
pub struct ProxyConfig {
    pub endpoint: String,
    pub region: String,
    pub timeout: Duration,
}

impl ProxyConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_vars(|name| std::env::var(name).ok())
    }

    /// `AMP_ENDPOINT` is required, `REGION` defaults to us-east-1.
    pub fn from_vars<F>(var: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| var(name).filter(|v| !v.trim().is_empty());
        let endpoint = get("AMP_ENDPOINT")
            .ok_or_else(|| Error::Config("AMP_ENDPOINT environment variable not set".into()))?;
        Ok(ProxyConfig {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            region: get("REGION").unwrap_or_else(|| Settings::DEFAULT_REGION.to_string()),
            timeout: Settings::REQUEST_TIMEOUT,
        })
    }
}

/// Answers `{"query": "..."}` events with the backend's `data` object, or a
/// message string when the query cannot be answered.
pub struct QueryProxy {
    client: QueryClient,
}

impl QueryProxy {
    pub fn new(client: QueryClient) -> Self {
        QueryProxy { client }
    }

    pub fn from_config(config: &ProxyConfig, signer: Arc<dyn RequestSigner>) -> Result<Self> {
        let client = QueryClient::with_timeout(&config.endpoint, signer, config.timeout)?;
        Ok(QueryProxy::new(client))
    }

    pub async fn handle(&self, event: &Value) -> Value {
        let promql = match event.get(QUERY_PARAM).and_then(Value::as_str) {
            Some(q) if !q.trim().is_empty() => q,
            _ => return Value::String(format!("Missing '{}' in event payload", QUERY_PARAM)),
        };
        info!("PromQL query = '{}'", promql);

        match self.client.query_data(promql).await {
            Ok(data) => data,
            Err(Error::QueryBackend { body }) => {
                warn!("Backend rejected query: {}", body);
                Value::String(format!("AMP query returned: {}", body))
            }
            Err(e) => {
                warn!("{}: {}", e.kind(), e);
                Value::String(format!("Error querying AMP: {}", e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::Unsigned;
    use crate::testutil::serve_once;
    use serde_json::json;
    use std::collections::HashMap;

    async fn proxy_for(url: &str) -> QueryProxy {
        QueryProxy::new(QueryClient::new(url, Arc::new(Unsigned)).unwrap())
    }

    #[test]
    fn test_config_from_vars() {
        let env = HashMap::from([("AMP_ENDPOINT", "https://amp.example/workspaces/ws-1/")]);
        let config = ProxyConfig::from_vars(|n| env.get(n).map(|v| v.to_string())).unwrap();
        assert_eq!(config.endpoint, "https://amp.example/workspaces/ws-1");
        assert_eq!(config.region, "us-east-1");

        assert!(matches!(ProxyConfig::from_vars(|_| None), Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn test_missing_query() {
        let url = crate::testutil::closed_port_url().await;
        let proxy = proxy_for(&url).await;
        assert_eq!(
            proxy.handle(&json!({})).await,
            json!("Missing 'query' in event payload")
        );
        assert_eq!(
            proxy.handle(&json!({"query": ""})).await,
            json!("Missing 'query' in event payload")
        );
    }

    #[tokio::test]
    async fn test_relays_data() {
        let body = r#"{"status":"success","data":{"resultType":"matrix","result":[{"metric":{},"values":[[1700000000,"4"]]}]}}"#;
        let (url, server) = serve_once(200, body).await;
        let proxy = proxy_for(&url).await;

        let reply = proxy.handle(&json!({"query": "ConsumedWriteCapacityUnits[15m]"})).await;
        assert_eq!(reply["resultType"], "matrix");
        assert_eq!(reply["result"][0]["values"][0][1], "4");
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_backend_failure_message() {
        let (url, server) = serve_once(200, r#"{"status":"error","error":"bad"}"#).await;
        let reply = proxy_for(&url).await.handle(&json!({"query": "up"})).await;
        assert!(reply.as_str().unwrap().starts_with("AMP query returned: "));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_http_failure_message() {
        let (url, server) = serve_once(500, "down").await;
        let reply = proxy_for(&url).await.handle(&json!({"query": "up"})).await;
        assert!(reply.as_str().unwrap().starts_with("Error querying AMP: "));
        server.await.unwrap();
    }
}

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use log::{debug, info};

use super::response::{decode_result, QueryKind, QueryResult};
use super::signer::{RequestSigner, Unsigned};
use crate::config::QueryConfig;
use crate::error::{Error, Result};
use crate::Settings;

/// Issues PromQL queries against one managed query endpoint.
#[derive(Clone)]
pub struct QueryClient {
    client: reqwest::Client,
    endpoint_base: String,
    signer: Arc<dyn RequestSigner>,
}

impl QueryClient {
    pub fn new(endpoint_base: &str, signer: Arc<dyn RequestSigner>) -> Result<Self> {
        Self::with_timeout(endpoint_base, signer, Settings::REQUEST_TIMEOUT)
    }

    pub fn with_timeout(
        endpoint_base: &str,
        signer: Arc<dyn RequestSigner>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("cannot build HTTP client: {}", e)))?;
        Ok(QueryClient {
            client,
            endpoint_base: endpoint_base.trim_end_matches('/').to_string(),
            signer,
        })
    }

    pub fn from_config(config: &QueryConfig, signer: Arc<dyn RequestSigner>) -> Result<Self> {
        let endpoint = config
            .endpoint
            .as_deref()
            .ok_or_else(|| Error::Config("query endpoint is not set".into()))?;
        Self::with_timeout(endpoint, signer, config.timeout)
    }

    pub fn endpoint_base(&self) -> &str {
        &self.endpoint_base
    }

    /// Instant query evaluated at the time of the call.
    pub async fn query(&self, promql: &str) -> Result<QueryResult> {
        validate(promql)?;
        let time = rfc3339(Utc::now());
        let params = [("query", promql.to_string()), ("time", time)];
        self.execute(Settings::INSTANT_QUERY_PATH, &params, QueryKind::Instant)
            .await
    }

    pub async fn query_range(
        &self,
        promql: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        step: Duration,
    ) -> Result<QueryResult> {
        validate(promql)?;
        if end < start {
            return Err(Error::InvalidRange(format!("end {} precedes start {}", end, start)));
        }
        let params = [
            ("query", promql.to_string()),
            ("start", rfc3339(start)),
            ("end", rfc3339(end)),
            ("step", format!("{}s", step.as_secs_f64())),
        ];
        self.execute(Settings::RANGE_QUERY_PATH, &params, QueryKind::Range)
            .await
    }

    /// Instant query returning the backend's `data` object undecoded.
    pub async fn query_data(&self, promql: &str) -> Result<serde_json::Value> {
        validate(promql)?;
        let params = [("query", promql.to_string()), ("time", rfc3339(Utc::now()))];
        let body = self.fetch(Settings::INSTANT_QUERY_PATH, &params).await?;
        let mut raw: serde_json::Value = serde_json::from_str(&body)
            .map_err(|e| Error::QueryDecode(format!("response is not JSON: {}", e)))?;
        if raw.get("status").and_then(|s| s.as_str()) != Some("success") {
            return Err(Error::QueryBackend { body: raw });
        }
        Ok(raw
            .get_mut("data")
            .map(serde_json::Value::take)
            .unwrap_or(serde_json::Value::Null))
    }

    async fn execute(
        &self,
        path: &str,
        params: &[(&str, String)],
        kind: QueryKind,
    ) -> Result<QueryResult> {
        let body = self.fetch(path, params).await?;
        decode_result(&body, kind)
    }

    async fn fetch(&self, path: &str, params: &[(&str, String)]) -> Result<String> {
        let url = format!("{}{}", self.endpoint_base, path);
        info!("PromQL query = '{}'", params[0].1);
        debug!("query url = {}", url);

        let mut request = self
            .client
            .get(&url)
            .query(params)
            .build()
            .map_err(Error::QueryTransport)?;
        self.signer.sign(&mut request)?;

        let response = self
            .client
            .execute(request)
            .await
            .map_err(Error::QueryTransport)?;
        let status = response.status();
        let body = response.text().await.map_err(Error::QueryTransport)?;

        if !status.is_success() {
            return Err(Error::QueryHttp {
                status: status.as_u16(),
                body,
            });
        }
        Ok(body)
    }
}

fn validate(promql: &str) -> Result<()> {
    if promql.trim().is_empty() {
        return Err(Error::InvalidQuery);
    }
    Ok(())
}

fn rfc3339(time: DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// One-shot instant query with a fresh client.
pub async fn query(
    endpoint_base: &str,
    promql: &str,
    signer: Arc<dyn RequestSigner>,
) -> Result<QueryResult> {
    validate(promql)?;
    QueryClient::new(endpoint_base, signer)?.query(promql).await
}

/// Instant query against an endpoint that needs no authentication.
pub async fn query_unsigned(endpoint_base: &str, promql: &str) -> Result<QueryResult> {
    query(endpoint_base, promql, Arc::new(Unsigned)).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::HeaderSigner;
    use crate::testutil::serve_once;
    use chrono::TimeZone;

    const ONE_POINT: &str = r#"{"status":"success","data":{"result":[{"value":[1700000000,"3.14"]}]}}"#;

    #[tokio::test]
    async fn test_instant_query_request_shape() {
        let (url, server) = serve_once(200, ONE_POINT).await;
        let signer = Arc::new(HeaderSigner::bearer("abc"));

        let result = query(&format!("{}/workspaces/ws-1/", url), "up{job=\"x\"}", signer)
            .await
            .unwrap();
        assert_eq!(result.points.len(), 1);
        assert_eq!(result.points[0].value, 3.14);

        let request = server.await.unwrap();
        assert_eq!(request.method, "GET");
        assert!(request.target.starts_with("/workspaces/ws-1/api/v1/query?query="));
        assert!(request.target.contains("&time="));
        assert!(request.target.contains("Z"));
        assert_eq!(request.header("authorization"), Some("Bearer abc"));
    }

    #[tokio::test]
    async fn test_range_query_params() {
        let body = r#"{"status":"success","data":{"result":[{"values":[[1700000000,"1"],[1700000060,"2"]]}]}}"#;
        let (url, server) = serve_once(200, body).await;
        let client = QueryClient::new(&url, Arc::new(Unsigned)).unwrap();
        let start = Utc.timestamp_opt(1700000000, 0).unwrap();
        let end = Utc.timestamp_opt(1700000060, 0).unwrap();

        let result = client
            .query_range("rate(x[5m])", start, end, Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(result.points.len(), 2);

        let request = server.await.unwrap();
        assert!(request.target.starts_with("/api/v1/query_range?"));
        assert!(request.target.contains("step=60s"));
        assert!(request.target.contains("start=2023-11-14T22%3A13%3A20"));
    }

    #[tokio::test]
    async fn test_non_2xx_is_http_error() {
        let (url, server) = serve_once(403, "forbidden").await;
        let err = query_unsigned(&url, "up").await.unwrap_err();
        match err {
            Error::QueryHttp { status, body } => {
                assert_eq!(status, 403);
                assert_eq!(body, "forbidden");
            }
            other => panic!("unexpected error {:?}", other),
        }
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_backend_error_status() {
        let (url, server) = serve_once(200, r#"{"status":"error","error":"boom"}"#).await;
        let err = query_unsigned(&url, "up").await.unwrap_err();
        assert!(matches!(err, Error::QueryBackend { .. }));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_empty_query_makes_no_call() {
        // Nothing listens here, a network call would fail with a transport error.
        let url = crate::testutil::closed_port_url().await;
        assert!(matches!(query_unsigned(&url, "").await, Err(Error::InvalidQuery)));
        assert!(matches!(query_unsigned(&url, "   ").await, Err(Error::InvalidQuery)));
    }

    #[tokio::test]
    async fn test_reversed_range_is_rejected() {
        let url = crate::testutil::closed_port_url().await;
        let client = QueryClient::new(&url, Arc::new(Unsigned)).unwrap();
        let start = Utc.timestamp_opt(1700000060, 0).unwrap();
        let end = Utc.timestamp_opt(1700000000, 0).unwrap();

        let err = client
            .query_range("up", start, end, Duration::from_secs(60))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidRange(_)));
        assert_eq!(err.kind(), "InvalidRangeError");

        // An empty window is still a valid range.
        let (url, server) = serve_once(200, r#"{"status":"success","data":{"result":[]}}"#).await;
        let client = QueryClient::new(&url, Arc::new(Unsigned)).unwrap();
        let points = client
            .query_range("up", start, start, Duration::from_secs(60))
            .await
            .unwrap()
            .points;
        assert!(points.is_empty());
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_query_data_relays_data_object() {
        let body = r#"{"status":"success","data":{"resultType":"vector","result":[]}}"#;
        let (url, server) = serve_once(200, body).await;
        let client = QueryClient::new(&url, Arc::new(Unsigned)).unwrap();

        let data = client.query_data("up").await.unwrap();
        assert_eq!(data, serde_json::json!({"resultType": "vector", "result": []}));
        server.await.unwrap();
    }
}

use async_trait::async_trait;
use log::{debug, info};
use serde_json::Value;

use super::handler::{QueryProxy, QUERY_PARAM};
use crate::error::{Error, Result};
use crate::query::response::{decode_points, QueryData, QueryEnvelope, QueryKind};
use crate::query::DataPoint;

/// Synchronous request/response invocation of a named function.
#[async_trait]
pub trait FunctionInvoker: Send + Sync {
    async fn invoke(&self, function: &str, payload: Value) -> Result<Value>;
}

/// Runs a [`QueryProxy`] in-process under one function name.
pub struct LocalInvoker {
    function: String,
    proxy: QueryProxy,
}

impl LocalInvoker {
    pub fn new(function: impl Into<String>, proxy: QueryProxy) -> Self {
        LocalInvoker {
            function: function.into(),
            proxy,
        }
    }
}

#[async_trait]
impl FunctionInvoker for LocalInvoker {
    async fn invoke(&self, function: &str, payload: Value) -> Result<Value> {
        if function != self.function {
            return Err(Error::Config(format!("no function named '{}'", function)));
        }
        Ok(self.proxy.handle(&payload).await)
    }
}

/// Sends `query` through the proxy function and decodes the first result
/// series: its `values` for a matrix reply, its `value` otherwise.
pub async fn relay_query<I>(invoker: &I, function: &str, query: &str) -> Result<Vec<DataPoint>>
where
    I: FunctionInvoker + ?Sized,
{
    if query.trim().is_empty() {
        return Err(Error::InvalidQuery);
    }
    let mut payload = serde_json::Map::new();
    payload.insert(QUERY_PARAM.to_string(), Value::String(query.to_string()));
    let response = invoker.invoke(function, Value::Object(payload)).await?;
    debug!("Function response: {}", response);

    // The proxy answers failures with a plain message.
    if response.is_string() {
        return Err(Error::QueryBackend { body: response });
    }
    let data: QueryData =
        serde_json::from_value(response).map_err(|e| Error::QueryDecode(e.to_string()))?;
    let kind = if data.result_type == "matrix" {
        QueryKind::Range
    } else {
        QueryKind::Instant
    };
    let envelope = QueryEnvelope {
        status: "success".into(),
        data: Some(data),
        ..Default::default()
    };
    let points = decode_points(&envelope, kind)?;
    for point in &points {
        info!("Got data point {}", point);
    }
    Ok(points)
}

use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};
use prost::Message;

use super::proto::WriteRequest;
use crate::config::RemoteWriteConfig;
use crate::error::{Error, Result};
use crate::query::RequestSigner;
use crate::Settings;

/// Status and body of the remote-write response, as received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransmitResult {
    pub status: u16,
    pub body: String,
}

impl TransmitResult {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

pub fn compress(payload: &[u8]) -> Result<Vec<u8>> {
    Ok(snap::raw::Encoder::new().compress_vec(payload)?)
}

pub fn decompress(compressed: &[u8]) -> Result<Vec<u8>> {
    Ok(snap::raw::Decoder::new().decompress_vec(compressed)?)
}

/// Delivers encoded write requests to one remote-write endpoint.
#[derive(Clone)]
pub struct RemoteWriter {
    client: reqwest::Client,
    endpoint: String,
    user_agent: String,
    signer: Option<Arc<dyn RequestSigner>>,
}

impl RemoteWriter {
    pub fn new(endpoint: impl Into<String>) -> Result<Self> {
        Self::with_timeout(endpoint, Settings::REQUEST_TIMEOUT)
    }

    pub fn with_timeout(endpoint: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("cannot build HTTP client: {}", e)))?;
        Ok(RemoteWriter {
            client,
            endpoint: endpoint.into(),
            user_agent: Settings::USER_AGENT.to_string(),
            signer: None,
        })
    }

    pub fn from_config(config: &RemoteWriteConfig) -> Result<Self> {
        let mut writer = Self::with_timeout(config.endpoint.clone(), config.timeout)?;
        writer.user_agent = config.user_agent.clone();
        Ok(writer)
    }

    pub fn with_signer(mut self, signer: Arc<dyn RequestSigner>) -> Self {
        self.signer = Some(signer);
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Compresses `payload` and POSTs it once.
    ///
    /// Only a failure to get any response is an error. Non-2xx statuses are
    /// returned as they are so the caller can inspect the backend's body.
    pub async fn transmit(&self, payload: &[u8]) -> Result<TransmitResult> {
        let compressed = compress(payload)?;
        debug!(
            "Sending {} bytes ({} uncompressed) to {}",
            compressed.len(),
            payload.len(),
            self.endpoint
        );

        let mut request = self
            .client
            .post(&self.endpoint)
            .header(reqwest::header::CONTENT_ENCODING, Settings::CONTENT_ENCODING)
            .header(reqwest::header::CONTENT_TYPE, Settings::CONTENT_TYPE)
            .header("X-Remote-Write-Version", Settings::REMOTE_WRITE_VERSION)
            .header("X-Prometheus-Remote-Write-Version", Settings::REMOTE_WRITE_VERSION)
            .header(reqwest::header::USER_AGENT, self.user_agent.as_str())
            .body(compressed)
            .build()
            .map_err(Error::Transmission)?;

        if let Some(signer) = &self.signer {
            signer.sign(&mut request)?;
        }

        let response = self
            .client
            .execute(request)
            .await
            .map_err(Error::Transmission)?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(Error::Transmission)?;

        if !(200..300).contains(&status) {
            warn!("Remote write returned {}: {}", status, body);
        }
        Ok(TransmitResult { status, body })
    }

    pub async fn send(&self, request: &WriteRequest) -> Result<TransmitResult> {
        self.transmit(&request.encode_to_vec()).await
    }
}

/// One-shot transmit with a default client.
pub async fn transmit(endpoint_url: &str, payload: &[u8]) -> Result<TransmitResult> {
    RemoteWriter::new(endpoint_url)?.transmit(payload).await
}

use reqwest::header::{HeaderName, HeaderValue};

use crate::error::{Error, Result};

/// Attaches authentication to an outbound request just before it is sent.
///
/// Credential, service and region handling belong to the implementation;
/// the clients only call `sign` on a fully built request.
pub trait RequestSigner: Send + Sync {
    fn sign(&self, request: &mut reqwest::Request) -> Result<()>;
}

/// Leaves requests untouched, for endpoints without authentication.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unsigned;

impl RequestSigner for Unsigned {
    fn sign(&self, _request: &mut reqwest::Request) -> Result<()> {
        Ok(())
    }
}

/// Adds a fixed set of headers, such as a bearer token or an API key.
#[derive(Debug, Clone, Default)]
pub struct HeaderSigner {
    headers: Vec<(String, String)>,
}

impl HeaderSigner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bearer(token: &str) -> Self {
        Self::new().with_header("Authorization", format!("Bearer {}", token))
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

impl RequestSigner for HeaderSigner {
    fn sign(&self, request: &mut reqwest::Request) -> Result<()> {
        for (name, value) in &self.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| Error::Signing(format!("bad header name '{}': {}", name, e)))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| Error::Signing(format!("bad value for header '{}': {}", name, e)))?;
            request.headers_mut().insert(name, value);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> reqwest::Request {
        reqwest::Client::new()
            .get("http://localhost/api/v1/query")
            .build()
            .unwrap()
    }

    #[test]
    fn test_header_signer() {
        let mut req = request();
        HeaderSigner::bearer("t0k")
            .with_header("x-api-key", "k")
            .sign(&mut req)
            .unwrap();
        assert_eq!(req.headers()["authorization"], "Bearer t0k");
        assert_eq!(req.headers()["x-api-key"], "k");
    }

    #[test]
    fn test_invalid_header_is_signing_error() {
        let mut req = request();
        let err = HeaderSigner::new()
            .with_header("bad header", "v")
            .sign(&mut req)
            .unwrap_err();
        assert!(matches!(err, Error::Signing(_)));
    }

    #[test]
    fn test_unsigned_leaves_request() {
        let mut req = request();
        Unsigned.sign(&mut req).unwrap();
        assert!(!req.headers().contains_key("authorization"));
    }
}

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::body::Bytes;
use axum::http::{header, HeaderMap, Method, StatusCode, Uri};
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

#[derive(Debug)]
pub struct CapturedRequest {
    pub method: String,
    /// Path and query string as sent.
    pub target: String,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl CapturedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }
}

/// Serves every path with `status` and `body` and hands back the first
/// request received.
pub async fn serve_once(status: u16, body: &str) -> (String, JoinHandle<CapturedRequest>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let status = StatusCode::from_u16(status).unwrap();
    let reply = body.to_string();
    let (tx, rx) = oneshot::channel::<CapturedRequest>();
    let tx = Arc::new(Mutex::new(Some(tx)));

    let app = Router::new().fallback(
        move |method: Method, uri: Uri, headers: HeaderMap, body: Bytes| {
            let tx = tx.clone();
            let reply = reply.clone();
            async move {
                let captured = CapturedRequest {
                    method: method.to_string(),
                    target: uri.to_string(),
                    headers: headers
                        .iter()
                        .map(|(k, v)| {
                            (k.as_str().to_string(), v.to_str().unwrap_or_default().to_string())
                        })
                        .collect(),
                    body: body.to_vec(),
                };
                if let Some(tx) = tx.lock().unwrap().take() {
                    let _ = tx.send(captured);
                }
                (status, [(header::CONTENT_TYPE, "application/json")], reply)
            }
        },
    );

    // The server lives until the test's runtime shuts down.
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    let handle = tokio::spawn(async move { rx.await.unwrap() });

    (format!("http://{}", addr), handle)
}

/// An address nothing listens on.
pub async fn closed_port_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}", addr)
}

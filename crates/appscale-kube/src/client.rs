//! `RecordStore` over the cluster REST API.

use std::time::Duration;

use appscale_record::{JsonPatch, RecordError, RecordKey, RecordResult, RecordStore};
use bytes::Bytes;
use http::{Method, header};
use http_body_util::{BodyExt, Full};
use serde_json::Value;
use tracing::debug;

use crate::warnings::log_warnings;

const JSON_PATCH_CONTENT_TYPE: &str = "application/json-patch+json";
const USER_AGENT: &str = "appscale/0.1";

/// Reads and patches one record through an HTTP endpoint of the API
/// server (`host:port`), one connection per request.
#[derive(Debug, Clone)]
pub struct KubeRecordStore {
    api_server: String,
    key: RecordKey,
    request_timeout: Duration,
}

impl KubeRecordStore {
    pub fn new(api_server: impl Into<String>, key: RecordKey) -> Self {
        Self {
            api_server: api_server.into(),
            key,
            request_timeout: Duration::from_secs(30),
        }
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    async fn send(&self, method: Method, patch_body: Option<Vec<u8>>) -> RecordResult<Bytes> {
        let path = self.key.abs_path();
        let transport = |what: &str, e: &dyn std::fmt::Display| {
            RecordError::Transport(format!("{method} {path}: {what}: {e}"))
        };

        let exchange = async {
            let stream = tokio::net::TcpStream::connect(&self.api_server)
                .await
                .map_err(|e| transport("connect", &e))?;

            let io = hyper_util::rt::TokioIo::new(stream);
            let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
                .await
                .map_err(|e| transport("handshake", &e))?;

            // Drive the connection in the background.
            tokio::spawn(async move {
                let _ = conn.await;
            });

            let mut request = http::Request::builder()
                .method(method.clone())
                .uri(path.as_str())
                .header(header::HOST, self.api_server.as_str())
                .header(header::USER_AGENT, USER_AGENT)
                .header(header::ACCEPT, "application/json");
            let body = match patch_body {
                Some(body) => {
                    request = request.header(header::CONTENT_TYPE, JSON_PATCH_CONTENT_TYPE);
                    Full::new(Bytes::from(body))
                }
                None => Full::new(Bytes::new()),
            };
            let request = request.body(body).map_err(|e| transport("build request", &e))?;

            let response = sender
                .send_request(request)
                .await
                .map_err(|e| transport("request", &e))?;
            log_warnings(response.headers());

            let status = response.status();
            let bytes = response
                .into_body()
                .collect()
                .await
                .map_err(|e| transport("read body", &e))?
                .to_bytes();

            if !status.is_success() {
                let text = String::from_utf8_lossy(&bytes);
                let snippet: String = text.chars().take(512).collect();
                return Err(transport("unexpected status", &format!("{status}: {snippet}")));
            }

            debug!(%method, %path, %status, bytes = bytes.len(), "api request completed");
            Ok::<Bytes, RecordError>(bytes)
        };

        match tokio::time::timeout(self.request_timeout, exchange).await {
            Ok(result) => result,
            Err(_) => Err(transport("timed out", &format!("{:?}", self.request_timeout))),
        }
    }
}

impl RecordStore for KubeRecordStore {
    fn key(&self) -> &RecordKey {
        &self.key
    }

    async fn read_record(&self) -> RecordResult<Value> {
        let body = self.send(Method::GET, None).await?;
        serde_json::from_slice(&body)
            .map_err(|e| RecordError::Transport(format!("failed to decode record: {e}")))
    }

    async fn apply_patch(&self, patch: &JsonPatch) -> RecordResult<()> {
        let body = patch.to_body()?;
        debug!(body = %String::from_utf8_lossy(&body), "patching record");
        self.send(Method::PATCH, Some(body)).await?;
        Ok(())
    }
}

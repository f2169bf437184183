//! HTTP transport seam.
//!
//! Feed fetches, translation calls and notification sends all go through
//! [`HttpClient`], so tests can script responses without a network.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

/// Upper bound for any response body we are willing to buffer.
pub const MAX_BODY_BYTES: usize = 5 * 1024 * 1024;

const USER_AGENT: &str = "pubmed-notifier/0.1 (+https://pubmed.ncbi.nlm.nih.gov/)";

/// Status code and body of a completed request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// Every collaborator in this crate treats exactly 200 as success.
    pub fn is_ok(&self) -> bool {
        self.status == 200
    }
}

/// The request never produced a response (DNS, TLS, timeout, oversized body...).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct TransportError(pub String);

#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn get(&self, url: &str) -> Result<HttpResponse, TransportError>;

    async fn post(
        &self,
        url: &str,
        headers: &[(&str, &str)],
        body: String,
    ) -> Result<HttpResponse, TransportError>;
}

/// Production transport backed by `reqwest`.
#[derive(Clone)]
pub struct ReqwestClient {
    client: reqwest::Client,
}

impl ReqwestClient {
    pub fn new() -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(30))
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()?;
        Ok(Self { client })
    }

    async fn read(resp: reqwest::Response) -> Result<HttpResponse, TransportError> {
        let status = resp.status().as_u16();
        if let Some(len) = resp.content_length() {
            if len as usize > MAX_BODY_BYTES {
                return Err(TransportError(format!("body too large: {len} bytes")));
            }
        }
        let bytes = resp
            .bytes()
            .await
            .map_err(|e| TransportError(format!("reading body: {e}")))?;
        if bytes.len() > MAX_BODY_BYTES {
            return Err(TransportError(format!(
                "body too large: {} bytes",
                bytes.len()
            )));
        }
        Ok(HttpResponse {
            status,
            body: String::from_utf8_lossy(&bytes).into_owned(),
        })
    }
}

#[async_trait]
impl HttpClient for ReqwestClient {
    async fn get(&self, url: &str) -> Result<HttpResponse, TransportError> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| TransportError(e.to_string()))?;
        Self::read(resp).await
    }

    async fn post(
        &self,
        url: &str,
        headers: &[(&str, &str)],
        body: String,
    ) -> Result<HttpResponse, TransportError> {
        let mut req = self.client.post(url).body(body);
        for (name, value) in headers {
            req = req.header(*name, *value);
        }
        let resp = req.send().await.map_err(|e| TransportError(e.to_string()))?;
        Self::read(resp).await
    }
}

// src/ingest/mod.rs
pub mod pubmed_rss;
pub mod types;

use std::sync::Arc;

use async_trait::async_trait;
use metrics::counter;

use crate::error::FetchError;
use crate::http::{HttpClient, MAX_BODY_BYTES};
use crate::ingest::types::{FeedItem, FeedSource};

/// Collapse whitespace and trim. Markup is left alone; the formatter owns it.
pub fn normalize_field(s: &str) -> String {
    static RE_WS: once_cell::sync::OnceCell<regex::Regex> = once_cell::sync::OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"\s+").unwrap());
    let mut out = re_ws.replace_all(s, " ").trim().to_string();

    // Length cap: 1500 chars, without leaving half a tag behind
    if out.chars().count() > MAX_FIELD_CHARS {
        out = out.chars().take(MAX_FIELD_CHARS).collect();
        if let Some(open) = out.rfind('<') {
            if !out[open..].contains('>') {
                out.truncate(open);
            }
        }
    }
    out
}

const MAX_FIELD_CHARS: usize = 1500;

/// Only plain web URLs are fetched.
pub fn validate_feed_url(feed_url: &str) -> Result<(), FetchError> {
    let parsed =
        url::Url::parse(feed_url).map_err(|e| FetchError::InvalidUrl(format!("{feed_url}: {e}")))?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        other => Err(FetchError::InvalidUrl(format!("unsupported scheme `{other}`"))),
    }
}

/// Fetches a PubMed RSS feed over HTTP and returns its items oldest first.
#[derive(Clone)]
pub struct FeedClient {
    http: Arc<dyn HttpClient>,
}

impl FeedClient {
    pub fn new(http: Arc<dyn HttpClient>) -> Self {
        Self { http }
    }
}

#[async_trait]
impl FeedSource for FeedClient {
    async fn fetch(&self, feed_url: &str) -> Result<Vec<FeedItem>, FetchError> {
        validate_feed_url(feed_url)?;

        let resp = match self.http.get(feed_url).await {
            Ok(resp) => resp,
            Err(e) => {
                counter!("notifier_fetch_errors_total").increment(1);
                return Err(FetchError::Transport(e.0));
            }
        };
        if !resp.is_ok() {
            counter!("notifier_fetch_errors_total").increment(1);
            return Err(FetchError::HttpStatus(resp.status));
        }
        if resp.body.len() > MAX_BODY_BYTES {
            counter!("notifier_fetch_errors_total").increment(1);
            return Err(FetchError::TooLarge(resp.body.len()));
        }

        let mut items = pubmed_rss::parse_items(&resp.body).inspect_err(|_| {
            counter!("notifier_fetch_errors_total").increment(1);
        })?;
        // PubMed lists newest first; notifications go out in publication order.
        items.reverse();
        Ok(items)
    }
}

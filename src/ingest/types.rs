// src/ingest/types.rs
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::FetchError;

/// One PubMed article as announced by a feed.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct FeedItem {
    pub id: String,    // PMID, e.g. "39912345"
    pub title: String, // may still carry <i>/<sup> markup
    pub published_at: DateTime<Utc>,
    pub authors: Vec<String>,
    pub source_name: String, // journal, from dc:source
    pub source_date: String, // dc:date as published
}

/// Anything that can turn a feed URL into items, oldest first.
#[async_trait]
pub trait FeedSource: Send + Sync {
    async fn fetch(&self, feed_url: &str) -> Result<Vec<FeedItem>, FetchError>;
}

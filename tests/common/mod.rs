// tests/common/mod.rs
// Shared helpers: scripted HTTP transport, stub translators and fixtures.
#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use pubmed_notifier::config::translation::TranslationConfig;
use pubmed_notifier::config::ChannelConfig;
use pubmed_notifier::error::TranslationError;
use pubmed_notifier::http::{HttpClient, HttpResponse, TransportError};
use pubmed_notifier::ingest::FeedClient;
use pubmed_notifier::notify::{build_notifier, ProviderKind};
use pubmed_notifier::orchestrator::Orchestrator;
use pubmed_notifier::store::MemoryWorkbook;
use pubmed_notifier::translate::{DisabledTranslator, DynTranslator, Translator};

pub const FEED_URL: &str = "https://pubmed.ncbi.nlm.nih.gov/rss/search/1abc/?limit=15";
pub const SLACK_HOOK: &str = "https://hooks.slack.com/services/T000/B000/XXXX";
pub const LINE_TOKEN: &str = "line-token-123";

/// Ids in the fixture, oldest first.
pub const A: &str = "39000101";
pub const B: &str = "39000102";
pub const C: &str = "39000103";
pub const D: &str = "39000104";
pub const E: &str = "39000105";

pub fn fixture(name: &str) -> String {
    let path = format!("{}/tests/fixtures/{name}", env!("CARGO_MANIFEST_DIR"));
    std::fs::read_to_string(&path).unwrap_or_else(|e| panic!("fixture {path}: {e}"))
}

pub fn brca1_feed() -> String {
    fixture("pubmed_brca1.xml")
}

#[derive(Debug, Clone)]
pub struct Posted {
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl Posted {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// GETs answer from a per-URL table (unknown URL → transport error).
/// POSTs pop a status from the queue; an empty queue answers 200.
#[derive(Default)]
pub struct MockHttp {
    gets: Mutex<HashMap<String, HttpResponse>>,
    post_statuses: Mutex<VecDeque<u16>>,
    pub posts: Mutex<Vec<Posted>>,
    pub get_count: Mutex<usize>,
}

impl MockHttp {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_feed(self, url: &str, body: impl Into<String>) -> Self {
        self.with_get(url, HttpResponse::new(200, body))
    }

    pub fn with_get(self, url: &str, resp: HttpResponse) -> Self {
        self.gets.lock().unwrap().insert(url.to_string(), resp);
        self
    }

    pub fn with_post_statuses(self, statuses: &[u16]) -> Self {
        self.post_statuses.lock().unwrap().extend(statuses.iter().copied());
        self
    }

    pub fn posts(&self) -> Vec<Posted> {
        self.posts.lock().unwrap().clone()
    }

    pub fn clear_posts(&self) {
        self.posts.lock().unwrap().clear();
    }
}

#[async_trait]
impl HttpClient for MockHttp {
    async fn get(&self, url: &str) -> Result<HttpResponse, TransportError> {
        *self.get_count.lock().unwrap() += 1;
        self.gets
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or_else(|| TransportError(format!("no route to {url}")))
    }

    async fn post(
        &self,
        url: &str,
        headers: &[(&str, &str)],
        body: String,
    ) -> Result<HttpResponse, TransportError> {
        self.posts.lock().unwrap().push(Posted {
            url: url.to_string(),
            headers: headers
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            body,
        });
        let status = self.post_statuses.lock().unwrap().pop_front().unwrap_or(200);
        let body = if status == 200 { "ok" } else { "invalid_payload" };
        Ok(HttpResponse::new(status, body))
    }
}

/// Prefixes every title with `[ja]`.
pub struct TagTranslator;

#[async_trait]
impl Translator for TagTranslator {
    async fn translate(
        &self,
        text: &str,
        _from: &str,
        _to: &str,
    ) -> Result<Option<String>, TranslationError> {
        Ok(Some(format!("[ja] {text}")))
    }

    fn provider_name(&self) -> &'static str {
        "tag"
    }
}

pub struct DownTranslator;

#[async_trait]
impl Translator for DownTranslator {
    async fn translate(
        &self,
        _text: &str,
        _from: &str,
        _to: &str,
    ) -> Result<Option<String>, TranslationError> {
        Err(TranslationError::HttpStatus(503))
    }

    fn provider_name(&self) -> &'static str {
        "down"
    }
}

pub fn fixed_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 2, 8, 9, 0, 0).unwrap()
}

pub fn slack_channel() -> ChannelConfig {
    ChannelConfig::new("slack", ProviderKind::Slack)
}

pub fn line_channel() -> ChannelConfig {
    ChannelConfig::new("line", ProviderKind::Line)
}

pub fn orchestrator(channel: ChannelConfig, http: Arc<MockHttp>) -> Orchestrator {
    orchestrator_with(channel, http, Arc::new(DisabledTranslator), &TranslationConfig::default())
}

pub fn orchestrator_with(
    channel: ChannelConfig,
    http: Arc<MockHttp>,
    translator: DynTranslator,
    translation: &TranslationConfig,
) -> Orchestrator {
    let notifier = build_notifier(&channel, http.clone());
    Orchestrator::new(
        channel,
        Arc::new(FeedClient::new(http)),
        notifier,
        translator,
        translation,
    )
    .with_clock(Arc::new(fixed_now))
}

/// One subscription row pointing at [`FEED_URL`].
pub fn workbook(provider: ProviderKind, state: &str) -> MemoryWorkbook {
    let (sheet, credential) = match provider {
        ProviderKind::Slack => ("webhooks", SLACK_HOOK),
        ProviderKind::Line => ("tokens", LINE_TOKEN),
    };
    MemoryWorkbook::new()
        .with_sheet(
            "RSS",
            vec![
                vec!["keyword", "feed", "target", "state"],
                vec!["BRCA1", FEED_URL, "lab", state],
            ],
        )
        .with_sheet(sheet, vec![vec!["target", "credential"], vec!["lab", credential]])
}

pub fn state_cell(wb: &MemoryWorkbook) -> String {
    wb.snapshot("RSS").unwrap()[1][3].clone()
}

/// Seen-set cell as a sorted id list.
pub fn seen_ids(cell: &str) -> Vec<String> {
    let mut ids: Vec<String> = serde_json::from_str(cell).unwrap();
    ids.sort();
    ids
}

pub fn seen_cell(ids: &[&str]) -> String {
    serde_json::to_string(ids).unwrap()
}

//! Translation adapter: provider abstraction + in-memory cache + daily limit.
//!
//! Titles are translated once per run at most; a cached translation is reused
//! when a failed run retries the same items.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::config::translation::TranslationConfig;
use crate::error::TranslationError;
use crate::http::HttpClient;

/// `Ok(None)` means translation is switched off; the formatter then omits the line.
#[async_trait]
pub trait Translator: Send + Sync {
    async fn translate(
        &self,
        text: &str,
        from: &str,
        to: &str,
    ) -> Result<Option<String>, TranslationError>;

    /// Provider name for diagnostics.
    fn provider_name(&self) -> &'static str;
}

pub type DynTranslator = Arc<dyn Translator>;

/// Factory: build a translator according to config.
///
/// * `enabled == false` → [`DisabledTranslator`].
/// * otherwise an [`HttpTranslator`] wrapped with caching + daily limit.
pub fn build_translator(cfg: &TranslationConfig, http: Arc<dyn HttpClient>) -> DynTranslator {
    if !cfg.enabled {
        return Arc::new(DisabledTranslator);
    }
    let provider = HttpTranslator::new(http, cfg.endpoint.clone(), cfg.api_key.clone());
    Arc::new(CachingTranslator::new(provider, cfg.daily_limit))
}

/// Returns `Ok(None)` always; used when translation is disabled.
pub struct DisabledTranslator;

#[async_trait]
impl Translator for DisabledTranslator {
    async fn translate(
        &self,
        _text: &str,
        _from: &str,
        _to: &str,
    ) -> Result<Option<String>, TranslationError> {
        Ok(None)
    }

    fn provider_name(&self) -> &'static str {
        "disabled"
    }
}

/// LibreTranslate-compatible JSON API (`POST {q, source, target, format}`).
pub struct HttpTranslator {
    http: Arc<dyn HttpClient>,
    endpoint: String,
    api_key: Option<String>,
}

impl HttpTranslator {
    pub fn new(http: Arc<dyn HttpClient>, endpoint: String, api_key: Option<String>) -> Self {
        Self {
            http,
            endpoint,
            api_key,
        }
    }
}

#[async_trait]
impl Translator for HttpTranslator {
    async fn translate(
        &self,
        text: &str,
        from: &str,
        to: &str,
    ) -> Result<Option<String>, TranslationError> {
        #[derive(Serialize)]
        struct Req<'a> {
            q: &'a str,
            source: &'a str,
            target: &'a str,
            format: &'a str,
            #[serde(skip_serializing_if = "Option::is_none")]
            api_key: Option<&'a str>,
        }
        #[derive(Deserialize)]
        struct Resp {
            #[serde(rename = "translatedText")]
            translated_text: String,
        }

        let body = serde_json::to_string(&Req {
            q: text,
            source: from,
            target: to,
            format: "text",
            api_key: self.api_key.as_deref(),
        })
        .map_err(|e| TranslationError::BadResponse(e.to_string()))?;

        let resp = self
            .http
            .post(
                &self.endpoint,
                &[("Content-Type", "application/json")],
                body,
            )
            .await
            .map_err(|e| TranslationError::Transport(e.0))?;
        if !resp.is_ok() {
            return Err(TranslationError::HttpStatus(resp.status));
        }
        let parsed: Resp = serde_json::from_str(&resp.body)
            .map_err(|e| TranslationError::BadResponse(e.to_string()))?;
        let cleaned = parsed.translated_text.trim().to_string();
        if cleaned.is_empty() {
            return Err(TranslationError::BadResponse("empty translation".into()));
        }
        Ok(Some(cleaned))
    }

    fn provider_name(&self) -> &'static str {
        "libretranslate"
    }
}

// ------------------------------------------------------------
// Caching wrapper (memory cache + daily limit)
// ------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
struct DailyCounter {
    date: NaiveDate,
    count: u32,
}

impl DailyCounter {
    fn today() -> Self {
        Self {
            date: Utc::now().date_naive(),
            count: 0,
        }
    }
}

/// Cache hits do not count against the daily limit; only real calls do.
pub struct CachingTranslator<T: Translator> {
    inner: T,
    daily_limit: u32,
    cache: Mutex<HashMap<String, String>>,
    counter: Mutex<DailyCounter>,
}

impl<T: Translator> CachingTranslator<T> {
    pub fn new(inner: T, daily_limit: u32) -> Self {
        Self {
            inner,
            daily_limit,
            cache: Mutex::new(HashMap::new()),
            counter: Mutex::new(DailyCounter::today()),
        }
    }

    fn reserve_call(&self) -> Result<(), TranslationError> {
        let mut g = self.counter.lock().expect("poisoned counter");
        let today = Utc::now().date_naive();
        if g.date != today {
            *g = DailyCounter::today();
        }
        if g.count >= self.daily_limit {
            return Err(TranslationError::QuotaExhausted(self.daily_limit));
        }
        g.count = g.count.saturating_add(1);
        Ok(())
    }

    pub fn calls_today(&self) -> u32 {
        self.counter.lock().expect("poisoned counter").count
    }
}

#[async_trait]
impl<T: Translator> Translator for CachingTranslator<T> {
    async fn translate(
        &self,
        text: &str,
        from: &str,
        to: &str,
    ) -> Result<Option<String>, TranslationError> {
        let key = cache_key(text, from, to);
        if let Some(hit) = self.cache.lock().expect("poisoned cache").get(&key) {
            return Ok(Some(hit.clone()));
        }

        self.reserve_call()?;
        let fresh = self.inner.translate(text, from, to).await?;
        if let Some(t) = &fresh {
            self.cache
                .lock()
                .expect("poisoned cache")
                .insert(key, t.clone());
        }
        Ok(fresh)
    }

    fn provider_name(&self) -> &'static str {
        self.inner.provider_name()
    }
}

fn cache_key(text: &str, from: &str, to: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(from.as_bytes());
    hasher.update([0u8]);
    hasher.update(to.as_bytes());
    hasher.update([0u8]);
    hasher.update(text.as_bytes());
    let digest = hasher.finalize();
    let mut out = String::with_capacity(32);
    for b in digest.iter().take(16) {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

// src/config/translation.rs
use serde::{Deserialize, Serialize};
use std::env;

pub const ENV_TRANSLATE_API_KEY: &str = "TRANSLATE_API_KEY";

fn default_endpoint() -> String {
    "https://libretranslate.com/translate".to_string()
}
fn default_source_lang() -> String {
    "en".to_string()
}
fn default_target_lang() -> String {
    "ja".to_string()
}
fn default_daily_limit() -> u32 {
    500
}

/// What the formatter does when the translation call fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TranslationFailurePolicy {
    /// Abandon the subscription's run; its items are retried next run.
    #[default]
    Abort,
    /// Send the item without the translated line.
    Omit,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranslationConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// "ENV" means: read from TRANSLATE_API_KEY. Absent means no key is sent.
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_source_lang")]
    pub source_lang: String,
    #[serde(default = "default_target_lang")]
    pub target_lang: String,
    /// Real API calls allowed per UTC day; cache hits are free.
    #[serde(default = "default_daily_limit")]
    pub daily_limit: u32,
    #[serde(default)]
    pub on_failure: TranslationFailurePolicy,
}

impl Default for TranslationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: default_endpoint(),
            api_key: None,
            source_lang: default_source_lang(),
            target_lang: default_target_lang(),
            daily_limit: default_daily_limit(),
            on_failure: TranslationFailurePolicy::default(),
        }
    }
}

impl TranslationConfig {
    /// Resolve the "ENV" key placeholder and normalize language codes.
    pub fn resolve(mut self) -> anyhow::Result<Self> {
        if let Some(key) = &self.api_key {
            if key.trim().eq_ignore_ascii_case("env") {
                self.api_key = Some(env::var(ENV_TRANSLATE_API_KEY).map_err(|_| {
                    anyhow::anyhow!("Missing {ENV_TRANSLATE_API_KEY} env var")
                })?);
            } else if key.trim().is_empty() {
                self.api_key = None;
            }
        }
        self.source_lang = self.source_lang.trim().to_lowercase();
        self.target_lang = self.target_lang.trim().to_lowercase();
        if self.enabled && self.endpoint.trim().is_empty() {
            anyhow::bail!("translation is enabled but no endpoint is configured");
        }
        Ok(self)
    }
}

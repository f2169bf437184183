// src/config/mod.rs
//! Application configuration: where the workbook lives, how titles are
//! translated and which notification channels run.

pub mod translation;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use crate::dedup::DedupPolicy;
use crate::error::ConfigError;
use crate::notify::ProviderKind;
use translation::TranslationConfig;

pub const ENV_CONFIG_PATH: &str = "NOTIFIER_CONFIG_PATH";
pub const ENV_WORKBOOK_PATH: &str = "NOTIFIER_WORKBOOK_PATH";

pub const DEFAULT_CONFIG_TOML: &str = "config/notifier.toml";
pub const DEFAULT_CONFIG_JSON: &str = "config/notifier.json";

fn default_workbook_path() -> PathBuf {
    PathBuf::from("state/workbook.json")
}
fn default_subscriptions_sheet() -> String {
    "RSS".to_string()
}
fn default_max_seen_ids() -> usize {
    1000
}
fn default_header() -> String {
    "New PubMed articles: {keyword}".to_string()
}
fn default_char_budget() -> usize {
    crate::notify::batch::DEFAULT_CHAR_BUDGET
}
fn default_section_size() -> usize {
    crate::notify::batch::DEFAULT_SECTION_SIZE
}
fn default_true() -> bool {
    true
}

/// One pipeline: a provider, the sheets it reads, and its dedup rules.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelConfig {
    pub name: String,
    pub provider: ProviderKind,
    #[serde(default = "default_subscriptions_sheet")]
    pub subscriptions_sheet: String,
    /// Defaults to `webhooks` (Slack) or `tokens` (LINE).
    #[serde(default)]
    pub credentials_sheet: Option<String>,
    #[serde(default)]
    pub dedup: DedupPolicy,
    /// Seen-set cap; 0 keeps every id forever.
    #[serde(default = "default_max_seen_ids")]
    pub max_seen_ids: usize,
    /// Watermark policy only: move the watermark even when nothing was new.
    #[serde(default)]
    pub advance_watermark_on_empty: bool,
    /// `{keyword}` is replaced with the subscription keyword.
    #[serde(default = "default_header")]
    pub header: String,
    #[serde(default = "default_char_budget")]
    pub char_budget: usize,
    #[serde(default = "default_section_size")]
    pub section_size: usize,
    /// LINE only: mute every batch after the first of a run.
    #[serde(default = "default_true")]
    pub silent_after_first: bool,
}

impl ChannelConfig {
    pub fn new(name: impl Into<String>, provider: ProviderKind) -> Self {
        Self {
            name: name.into(),
            provider,
            subscriptions_sheet: default_subscriptions_sheet(),
            credentials_sheet: None,
            dedup: DedupPolicy::default(),
            max_seen_ids: default_max_seen_ids(),
            advance_watermark_on_empty: false,
            header: default_header(),
            char_budget: default_char_budget(),
            section_size: default_section_size(),
            silent_after_first: true,
        }
    }

    pub fn credentials_sheet(&self) -> &str {
        self.credentials_sheet
            .as_deref()
            .unwrap_or_else(|| self.provider.default_credentials_sheet())
    }

    pub fn header_for(&self, keyword: &str) -> String {
        self.header.replace("{keyword}", keyword)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_workbook_path")]
    pub workbook_path: PathBuf,
    #[serde(default)]
    pub translation: TranslationConfig,
    #[serde(default)]
    pub channels: Vec<ChannelConfig>,
}

impl AppConfig {
    /// Load from an explicit path. Supports TOML or JSON formats.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        let cfg = parse_config(&content, ext.as_str())
            .with_context(|| format!("parsing config {}", path.display()))?;
        cfg.finish()
    }

    /// Load using env var + fallbacks:
    /// 1) $NOTIFIER_CONFIG_PATH
    /// 2) config/notifier.toml
    /// 3) config/notifier.json
    pub fn load_default() -> Result<Self> {
        if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if pb.exists() {
                return Self::load_from(&pb);
            }
            return Err(anyhow!("{ENV_CONFIG_PATH} points to non-existent path"));
        }
        for candidate in [DEFAULT_CONFIG_TOML, DEFAULT_CONFIG_JSON] {
            let pb = PathBuf::from(candidate);
            if pb.exists() {
                return Self::load_from(&pb);
            }
        }
        Err(anyhow!(
            "no configuration found ({DEFAULT_CONFIG_TOML} or {DEFAULT_CONFIG_JSON})"
        ))
    }

    /// Environment overrides, secret resolution and validation.
    fn finish(mut self) -> Result<Self> {
        if let Ok(p) = std::env::var(ENV_WORKBOOK_PATH) {
            if !p.trim().is_empty() {
                self.workbook_path = PathBuf::from(p);
            }
        }
        self.translation = self.translation.resolve()?;
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.channels.is_empty() {
            return Err(ConfigError::Invalid("no channels configured".into()));
        }
        let mut names = HashSet::new();
        for ch in &self.channels {
            if ch.name.trim().is_empty() {
                return Err(ConfigError::Invalid("channel with empty name".into()));
            }
            if !names.insert(ch.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate channel name `{}`",
                    ch.name
                )));
            }
            if ch.char_budget == 0 {
                return Err(ConfigError::Invalid(format!(
                    "channel `{}`: char_budget must be positive",
                    ch.name
                )));
            }
            if ch.section_size == 0 {
                return Err(ConfigError::Invalid(format!(
                    "channel `{}`: section_size must be positive",
                    ch.name
                )));
            }
        }
        Ok(())
    }
}

fn parse_config(s: &str, hint_ext: &str) -> Result<AppConfig> {
    // Try TOML first if hinted, JSON otherwise; fall back to the other format.
    if hint_ext == "json" {
        return match serde_json::from_str(s) {
            Ok(v) => Ok(v),
            Err(json_err) => toml::from_str(s).map_err(|_| anyhow!(json_err)),
        };
    }
    match toml::from_str(s) {
        Ok(v) => Ok(v),
        Err(toml_err) => serde_json::from_str(s).map_err(|_| anyhow!(toml_err)),
    }
}

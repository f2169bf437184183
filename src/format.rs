//! Rendering of one feed item into a notification fragment.
//!
//! Slack mrkdwn and LINE plain text disagree about `&`, `<`, `>`: Slack wants
//! them as entities, LINE wants the literal characters. [`Markup`] carries that
//! choice together with the emphasis marker and the fragment layout.

use std::sync::Arc;

use once_cell::sync::OnceCell;
use regex::Regex;

use crate::config::translation::{TranslationConfig, TranslationFailurePolicy};
use crate::error::TranslationError;
use crate::ingest::types::FeedItem;
use crate::translate::Translator;

pub const PUBMED_BASE_URL: &str = "https://pubmed.ncbi.nlm.nih.gov/";
pub const NO_AUTHOR_PLACEHOLDER: &str = "No author listed";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Markup {
    /// Slack `mrkdwn`: entities escaped, `_italic_`, `<url|label>` links.
    SlackMrkdwn,
    /// LINE Notify: literal characters, no inline styling.
    PlainText,
}

impl Markup {
    pub fn emphasis_marker(self) -> &'static str {
        match self {
            Markup::SlackMrkdwn => "_",
            Markup::PlainText => "",
        }
    }

    /// Entities are decoded first so already-escaped input is not escaped twice.
    pub fn escape(self, s: &str) -> String {
        let decoded = html_escape::decode_html_entities(s);
        match self {
            Markup::SlackMrkdwn => html_escape::encode_text(&decoded).into_owned(),
            Markup::PlainText => decoded.into_owned(),
        }
    }
}

fn re_emphasis() -> &'static Regex {
    static RE: OnceCell<Regex> = OnceCell::new();
    RE.get_or_init(|| Regex::new(r"(?i)</?(?:i|em)(?:\s[^>]*)?>").unwrap())
}

fn re_dropped() -> &'static Regex {
    static RE: OnceCell<Regex> = OnceCell::new();
    RE.get_or_init(|| Regex::new(r"(?i)</?(?:sup|sub|b|strong|u)(?:\s[^>]*)?/?>").unwrap())
}

/// Replace italic tags with `marker` and drop sup/sub/bold tags, keeping their text.
pub fn strip_title_markup(title: &str, marker: &str) -> String {
    let out = re_emphasis().replace_all(title, marker);
    re_dropped().replace_all(&out, "").into_owned()
}

/// "Tanaka K et al." / "Tanaka K" / placeholder.
pub fn author_credit(authors: &[String]) -> String {
    match authors {
        [] => NO_AUTHOR_PLACEHOLDER.to_string(),
        [only] => only.clone(),
        [first, ..] => format!("{first} et al."),
    }
}

pub fn article_link(id: &str) -> String {
    format!("{PUBMED_BASE_URL}{id}/")
}

/// Renders items for one destination, translating titles on the way.
pub struct ItemFormatter {
    markup: Markup,
    translator: Arc<dyn Translator>,
    source_lang: String,
    target_lang: String,
    on_failure: TranslationFailurePolicy,
}

impl ItemFormatter {
    pub fn new(markup: Markup, translator: Arc<dyn Translator>, cfg: &TranslationConfig) -> Self {
        Self {
            markup,
            translator,
            source_lang: cfg.source_lang.clone(),
            target_lang: cfg.target_lang.clone(),
            on_failure: cfg.on_failure,
        }
    }

    pub fn markup(&self) -> Markup {
        self.markup
    }

    async fn translated_title(
        &self,
        item: &FeedItem,
        plain_title: &str,
    ) -> Result<Option<String>, TranslationError> {
        match self
            .translator
            .translate(plain_title, &self.source_lang, &self.target_lang)
            .await
        {
            Ok(t) => Ok(t),
            Err(e) if self.on_failure == TranslationFailurePolicy::Omit => {
                tracing::warn!(id = %item.id, error = %e, "translation failed; sending untranslated");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// One fragment per item. Fragments carry their own separators, so a batch
    /// is the plain concatenation of its fragments.
    pub async fn format(&self, item: &FeedItem) -> Result<String, TranslationError> {
        let plain_title = Markup::PlainText.escape(&strip_title_markup(&item.title, ""));
        let translated = self.translated_title(item, &plain_title).await?;

        let m = self.markup;
        let title = m.escape(&strip_title_markup(&item.title, m.emphasis_marker()));
        let credit = m.escape(&author_credit(&item.authors));
        let source = m.escape(&item.source_name);
        let date = m.escape(&item.source_date);
        let link = article_link(&item.id);

        let fragment = match m {
            Markup::SlackMrkdwn => {
                let mut s = format!("<{link}|{title}>\n");
                if let Some(t) = translated {
                    s.push_str(&m.escape(&t));
                    s.push('\n');
                }
                s.push_str(&format!("{credit}  _{source}_ {date}\n\n"));
                s
            }
            Markup::PlainText => {
                let mut s = format!("\n\n{title}\n");
                if let Some(t) = translated {
                    s.push_str(&m.escape(&t));
                    s.push('\n');
                }
                s.push_str(&format!("{credit} / {source} {date}\n{link}"));
                s
            }
        };
        Ok(fragment)
    }
}

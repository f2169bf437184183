// src/notify/mod.rs
//! Delivery side: how fragments are packed for a destination and how the
//! packed messages are sent.

pub mod batch;
pub mod line;
pub mod slack;

use std::sync::Arc;

use async_trait::async_trait;
use metrics::counter;
use serde::{Deserialize, Serialize};

use crate::config::ChannelConfig;
use crate::error::DeliveryError;
use crate::format::Markup;
use crate::http::HttpClient;

pub use line::LineNotifier;
pub use slack::SlackNotifier;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// Slack incoming webhook; the credential is the webhook URL.
    Slack,
    /// LINE Notify; the credential is a personal access token.
    Line,
}

impl ProviderKind {
    pub fn default_credentials_sheet(self) -> &'static str {
        match self {
            ProviderKind::Slack => "webhooks",
            ProviderKind::Line => "tokens",
        }
    }
}

/// One outbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageBatch {
    /// Plain text, already size-bounded.
    Text(String),
    /// Structured message. Only the first message of a run carries a title.
    Sections {
        title: Option<String>,
        sections: Vec<String>,
    },
}

/// A destination: its escaping rules, its packing strategy and its transport.
#[async_trait]
pub trait Notifier: Send + Sync {
    fn name(&self) -> &'static str;

    fn markup(&self) -> Markup;

    fn pack(&self, header: &str, fragments: &[String]) -> Vec<MessageBatch>;

    /// `position` is the batch's index within the run.
    async fn send(
        &self,
        credential: &str,
        batch: &MessageBatch,
        position: usize,
    ) -> Result<(), DeliveryError>;
}

pub type DynNotifier = Arc<dyn Notifier>;

pub fn build_notifier(channel: &ChannelConfig, http: Arc<dyn HttpClient>) -> DynNotifier {
    match channel.provider {
        ProviderKind::Slack => Arc::new(SlackNotifier::new(http).with_section_size(channel.section_size)),
        ProviderKind::Line => Arc::new(
            LineNotifier::new(http)
                .with_char_budget(channel.char_budget)
                .with_silent_after_first(channel.silent_after_first),
        ),
    }
}

/// Send batches in order; stop at the first failure.
/// Returns how many batches were confirmed, or the failing index and error.
pub async fn dispatch_all(
    notifier: &dyn Notifier,
    credential: &str,
    batches: &[MessageBatch],
) -> Result<usize, (usize, DeliveryError)> {
    for (i, batch) in batches.iter().enumerate() {
        if let Err(e) = notifier.send(credential, batch, i).await {
            counter!("notifier_batches_failed_total", "provider" => notifier.name()).increment(1);
            return Err((i, e));
        }
        counter!("notifier_batches_sent_total", "provider" => notifier.name()).increment(1);
    }
    Ok(batches.len())
}

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

use super::batch::{
    pack_by_groups, DEFAULT_SECTION_SIZE, MAX_SLACK_BLOCKS, MAX_SLACK_SECTION_CHARS,
};
use super::{MessageBatch, Notifier};
use crate::error::DeliveryError;
use crate::format::Markup;
use crate::http::HttpClient;

/// Slack incoming-webhook destination. The credential is the webhook URL.
pub struct SlackNotifier {
    http: Arc<dyn HttpClient>,
    section_size: usize,
}

impl SlackNotifier {
    pub fn new(http: Arc<dyn HttpClient>) -> Self {
        Self {
            http,
            section_size: DEFAULT_SECTION_SIZE,
        }
    }

    pub fn with_section_size(mut self, n: usize) -> Self {
        self.section_size = n.max(1);
        self
    }
}

#[derive(Debug, Serialize)]
struct SlackText<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    text: &'a str,
}

#[derive(Debug, Serialize)]
struct SlackBlock<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    text: SlackText<'a>,
}

#[derive(Debug, Serialize)]
struct SlackWebhookPayload<'a> {
    text: &'a str,
    blocks: Vec<SlackBlock<'a>>,
}

impl<'a> SlackWebhookPayload<'a> {
    fn sections(title: &'a str, bodies: &'a [String]) -> Self {
        Self {
            text: title,
            blocks: bodies
                .iter()
                .map(|b| SlackBlock {
                    kind: "section",
                    text: SlackText {
                        kind: "mrkdwn",
                        text: b.trim_end(),
                    },
                })
                .collect(),
        }
    }
}

#[async_trait]
impl Notifier for SlackNotifier {
    fn name(&self) -> &'static str {
        "slack"
    }

    fn markup(&self) -> Markup {
        Markup::SlackMrkdwn
    }

    fn pack(&self, header: &str, fragments: &[String]) -> Vec<MessageBatch> {
        let sections = pack_by_groups(fragments, self.section_size, MAX_SLACK_SECTION_CHARS);
        sections
            .chunks(MAX_SLACK_BLOCKS)
            .enumerate()
            .map(|(i, chunk)| MessageBatch::Sections {
                title: (i == 0).then(|| header.to_string()),
                sections: chunk.to_vec(),
            })
            .collect()
    }

    async fn send(
        &self,
        credential: &str,
        batch: &MessageBatch,
        _position: usize,
    ) -> Result<(), DeliveryError> {
        let payload = match batch {
            MessageBatch::Sections { title, sections } => {
                SlackWebhookPayload::sections(title.as_deref().unwrap_or_default(), sections)
            }
            MessageBatch::Text(_) => {
                return Err(DeliveryError::Encode(
                    "slack expects sectioned messages".into(),
                ))
            }
        };
        let body =
            serde_json::to_string(&payload).map_err(|e| DeliveryError::Encode(e.to_string()))?;

        let resp = self
            .http
            .post(credential, &[("Content-type", "application/json")], body)
            .await
            .map_err(|e| DeliveryError::Transport(e.0))?;
        if !resp.is_ok() {
            return Err(DeliveryError::HttpStatus {
                status: resp.status,
                body: resp.body,
            });
        }
        tracing::debug!(sections = payload.blocks.len(), "slack message delivered");
        Ok(())
    }
}

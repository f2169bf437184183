use std::sync::Arc;

use async_trait::async_trait;

use super::batch::{pack_by_size, DEFAULT_CHAR_BUDGET};
use super::{MessageBatch, Notifier};
use crate::error::DeliveryError;
use crate::format::Markup;
use crate::http::HttpClient;

pub const LINE_NOTIFY_URL: &str = "https://notify-api.line.me/api/notify";

/// LINE Notify destination. The credential is the access token.
pub struct LineNotifier {
    http: Arc<dyn HttpClient>,
    endpoint: String,
    char_budget: usize,
    silent_after_first: bool,
}

impl LineNotifier {
    pub fn new(http: Arc<dyn HttpClient>) -> Self {
        Self {
            http,
            endpoint: LINE_NOTIFY_URL.to_string(),
            char_budget: DEFAULT_CHAR_BUDGET,
            silent_after_first: true,
        }
    }

    pub fn with_char_budget(mut self, budget: usize) -> Self {
        self.char_budget = budget.max(1);
        self
    }

    pub fn with_silent_after_first(mut self, on: bool) -> Self {
        self.silent_after_first = on;
        self
    }

    /// Optional override for tests/tools
    pub fn with_endpoint(mut self, url: impl Into<String>) -> Self {
        self.endpoint = url.into();
        self
    }

    fn form_body(&self, message: &str, position: usize) -> String {
        let silent = self.silent_after_first && position > 0;
        url::form_urlencoded::Serializer::new(String::new())
            .append_pair("message", message)
            .append_pair("notificationDisabled", if silent { "true" } else { "false" })
            .finish()
    }
}

#[async_trait]
impl Notifier for LineNotifier {
    fn name(&self) -> &'static str {
        "line"
    }

    fn markup(&self) -> Markup {
        Markup::PlainText
    }

    fn pack(&self, header: &str, fragments: &[String]) -> Vec<MessageBatch> {
        pack_by_size(header, fragments, self.char_budget)
            .into_iter()
            .map(MessageBatch::Text)
            .collect()
    }

    async fn send(
        &self,
        credential: &str,
        batch: &MessageBatch,
        position: usize,
    ) -> Result<(), DeliveryError> {
        let message = match batch {
            MessageBatch::Text(t) => t.clone(),
            MessageBatch::Sections { title, sections } => {
                let mut t = title.clone().unwrap_or_default();
                sections.iter().for_each(|s| t.push_str(s));
                t
            }
        };
        let auth = format!("Bearer {credential}");
        let resp = self
            .http
            .post(
                &self.endpoint,
                &[
                    ("Authorization", auth.as_str()),
                    ("Content-Type", "application/x-www-form-urlencoded"),
                ],
                self.form_body(&message, position),
            )
            .await
            .map_err(|e| DeliveryError::Transport(e.0))?;
        if !resp.is_ok() {
            return Err(DeliveryError::HttpStatus {
                status: resp.status,
                body: resp.body,
            });
        }
        tracing::debug!(position, chars = message.chars().count(), "line message delivered");
        Ok(())
    }
}

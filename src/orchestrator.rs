//! # Check-and-notify run
//! For every subscription row: fetch the feed, keep what is new, render it,
//! deliver it, and only then move the stored dedup state forward.
//!
//! Commit rule: the new state is written only when every batch of the run was
//! confirmed. A failure anywhere leaves the row as it was, so the same items
//! are tried again next run (batches that did go out may be repeated).

use std::sync::Arc;

use chrono::{DateTime, Utc};
use metrics::{counter, gauge};
use tracing::{debug, info, warn};

use crate::config::translation::TranslationConfig;
use crate::config::ChannelConfig;
use crate::dedup::{classify, DedupPolicy, DedupState};
use crate::error::{ConfigError, DeliveryError, FetchError, TranslationError};
use crate::format::ItemFormatter;
use crate::ingest::types::FeedSource;
use crate::notify::{dispatch_all, DynNotifier};
use crate::store::{
    parse_credentials, parse_subscriptions, Credentials, Subscription, Workbook, STATE_COLUMN,
};
use crate::translate::DynTranslator;

pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// What happened to one subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckOutcome {
    MissingCredential,
    InvalidState(ConfigError),
    FetchFailed(FetchError),
    /// `advanced` is true when the watermark moved anyway.
    NoNewItems { advanced: bool },
    FormatFailed(TranslationError),
    DeliveryFailed {
        delivered: usize,
        total: usize,
        error: DeliveryError,
    },
    Delivered { items: usize, batches: usize },
}

impl CheckOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            CheckOutcome::MissingCredential => "missing_credential",
            CheckOutcome::InvalidState(_) => "invalid_state",
            CheckOutcome::FetchFailed(_) => "fetch_failed",
            CheckOutcome::NoNewItems { .. } => "no_new_items",
            CheckOutcome::FormatFailed(_) => "format_failed",
            CheckOutcome::DeliveryFailed { .. } => "delivery_failed",
            CheckOutcome::Delivered { .. } => "delivered",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckReport {
    pub row: usize,
    pub keyword: String,
    pub outcome: CheckOutcome,
    /// State cell to write back; equal to the input cell unless committed.
    pub state: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub checked: usize,
    pub delivered: usize,
    pub items_sent: usize,
    pub quiet: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl RunSummary {
    fn record(&mut self, outcome: &CheckOutcome) {
        self.checked += 1;
        match outcome {
            CheckOutcome::Delivered { items, .. } => {
                self.delivered += 1;
                self.items_sent += items;
            }
            CheckOutcome::NoNewItems { .. } => self.quiet += 1,
            CheckOutcome::MissingCredential | CheckOutcome::InvalidState(_) => self.skipped += 1,
            CheckOutcome::FetchFailed(_)
            | CheckOutcome::FormatFailed(_)
            | CheckOutcome::DeliveryFailed { .. } => self.failed += 1,
        }
    }
}

/// One channel's pipeline: feed → novelty → format → pack → deliver → commit.
pub struct Orchestrator {
    channel: ChannelConfig,
    feed: Arc<dyn FeedSource>,
    formatter: ItemFormatter,
    notifier: DynNotifier,
    clock: Clock,
}

impl Orchestrator {
    /// The formatter is built from the notifier's markup so escaping always
    /// matches the destination.
    pub fn new(
        channel: ChannelConfig,
        feed: Arc<dyn FeedSource>,
        notifier: DynNotifier,
        translator: DynTranslator,
        translation: &TranslationConfig,
    ) -> Self {
        let formatter = ItemFormatter::new(notifier.markup(), translator, translation);
        Self {
            channel,
            feed,
            formatter,
            notifier,
            clock: Arc::new(Utc::now),
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn channel(&self) -> &ChannelConfig {
        &self.channel
    }

    fn report(&self, sub: &Subscription, outcome: CheckOutcome, state: Option<String>) -> CheckReport {
        if !matches!(outcome, CheckOutcome::Delivered { .. } | CheckOutcome::NoNewItems { .. }) {
            counter!(
                "notifier_skipped_total",
                "channel" => self.channel.name.clone(),
                "reason" => outcome.label()
            )
            .increment(1);
        }
        CheckReport {
            row: sub.row,
            keyword: sub.keyword.clone(),
            outcome,
            state: state.unwrap_or_else(|| sub.state.clone()),
        }
    }

    /// Check one subscription. Never fails; every problem is an outcome.
    pub async fn check(&self, sub: &Subscription, credentials: &Credentials) -> CheckReport {
        let channel = self.channel.name.as_str();
        let keyword = sub.keyword.as_str();

        let Some(credential) = credentials.get(&sub.target_id) else {
            warn!(channel, keyword, target_id = %sub.target_id, "no credential for target; skipped");
            return self.report(sub, CheckOutcome::MissingCredential, None);
        };

        let state = match DedupState::parse(self.channel.dedup, &sub.state) {
            Ok(s) => s,
            Err(e) => {
                warn!(channel, keyword, error = %e, "stored state unreadable; skipped");
                return self.report(sub, CheckOutcome::InvalidState(e), None);
            }
        };

        let started = (self.clock)();
        let items = match self.feed.fetch(&sub.feed_url).await {
            Ok(items) => items,
            Err(e) => {
                warn!(channel, keyword, error = %e, "feed fetch failed; state kept");
                return self.report(sub, CheckOutcome::FetchFailed(e), None);
            }
        };

        let novelty = classify(&items, &state, self.channel.max_seen_ids, started);
        if novelty.new_items.is_empty() {
            let advance = self.channel.dedup == DedupPolicy::Watermark
                && self.channel.advance_watermark_on_empty;
            debug!(channel, keyword, pulled = items.len(), advance, "nothing new");
            let state = advance.then(|| novelty.next_state.encode());
            return self.report(sub, CheckOutcome::NoNewItems { advanced: advance }, state);
        }
        counter!("notifier_new_items_total", "channel" => self.channel.name.clone())
            .increment(novelty.new_items.len() as u64);

        let mut fragments = Vec::with_capacity(novelty.new_items.len());
        for item in &novelty.new_items {
            match self.formatter.format(item).await {
                Ok(f) => fragments.push(f),
                Err(e) => {
                    warn!(channel, keyword, id = %item.id, error = %e, "formatting failed; state kept");
                    return self.report(sub, CheckOutcome::FormatFailed(e), None);
                }
            }
        }

        let header = self.channel.header_for(keyword);
        let batches = self.notifier.pack(&header, &fragments);
        let total = batches.len();
        match dispatch_all(self.notifier.as_ref(), credential, &batches).await {
            Ok(sent) => {
                info!(channel, keyword, items = fragments.len(), batches = sent, "delivered");
                self.report(
                    sub,
                    CheckOutcome::Delivered {
                        items: fragments.len(),
                        batches: sent,
                    },
                    Some(novelty.next_state.encode()),
                )
            }
            Err((delivered, error)) => {
                warn!(channel, keyword, delivered, total, error = %error, "delivery failed; state kept");
                self.report(
                    sub,
                    CheckOutcome::DeliveryFailed {
                        delivered,
                        total,
                        error,
                    },
                    None,
                )
            }
        }
    }

    /// Run every subscription of this channel. Sheets are read once up front
    /// and the state column is written once at the end.
    pub async fn run(&self, workbook: &dyn Workbook) -> anyhow::Result<RunSummary> {
        let credentials = parse_credentials(&workbook.read_sheet(self.channel.credentials_sheet()).await?);
        let rows = workbook.read_sheet(&self.channel.subscriptions_sheet).await?;
        let subs = parse_subscriptions(&rows);

        let mut summary = RunSummary::default();
        let mut cells = Vec::with_capacity(subs.len());
        for sub in &subs {
            let report = self.check(sub, &credentials).await;
            summary.record(&report.outcome);
            cells.push((report.row, report.state));
        }

        if !cells.is_empty() {
            workbook
                .write_column(&self.channel.subscriptions_sheet, STATE_COLUMN, &cells)
                .await?;
        }
        gauge!("notifier_last_run_ts", "channel" => self.channel.name.clone())
            .set(Utc::now().timestamp() as f64);
        info!(
            channel = %self.channel.name,
            checked = summary.checked,
            delivered = summary.delivered,
            items = summary.items_sent,
            failed = summary.failed,
            skipped = summary.skipped,
            "channel run finished"
        );
        Ok(summary)
    }
}

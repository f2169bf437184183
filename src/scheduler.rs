// src/scheduler.rs
//! Wires configured channels into orchestrators and runs them, once or on a
//! fixed interval. Ticks never overlap: the next tick waits for the last run.

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info};

use crate::config::AppConfig;
use crate::http::HttpClient;
use crate::ingest::FeedClient;
use crate::metrics::ensure_metrics_described;
use crate::notify::build_notifier;
use crate::orchestrator::{Orchestrator, RunSummary};
use crate::store::{JsonWorkbook, Workbook};
use crate::translate::build_translator;

pub const ENV_INTERVAL_SECS: &str = "NOTIFIER_INTERVAL_SECS";

pub struct App {
    workbook: Arc<dyn Workbook>,
    channels: Vec<Orchestrator>,
}

impl App {
    pub fn new(workbook: Arc<dyn Workbook>, channels: Vec<Orchestrator>) -> Self {
        Self { workbook, channels }
    }

    /// Build every channel from config. One HTTP client and one translator
    /// (and so one translation cache/quota) are shared by all channels.
    pub fn from_config(cfg: &AppConfig, http: Arc<dyn HttpClient>) -> Self {
        let translator = build_translator(&cfg.translation, http.clone());
        let feed = Arc::new(FeedClient::new(http.clone()));
        let channels = cfg
            .channels
            .iter()
            .map(|ch| {
                Orchestrator::new(
                    ch.clone(),
                    feed.clone(),
                    build_notifier(ch, http.clone()),
                    translator.clone(),
                    &cfg.translation,
                )
            })
            .collect();
        info!(
            workbook = %cfg.workbook_path.display(),
            translator = translator.provider_name(),
            "notifier configured"
        );
        Self::new(Arc::new(JsonWorkbook::new(&cfg.workbook_path)), channels)
    }

    /// Run each channel once, in order. A broken channel is logged and the
    /// remaining channels still run.
    pub async fn run_once(&self) -> Vec<(String, anyhow::Result<RunSummary>)> {
        ensure_metrics_described();
        let mut out = Vec::with_capacity(self.channels.len());
        for orch in &self.channels {
            let name = orch.channel().name.clone();
            let res = orch.run(self.workbook.as_ref()).await;
            if let Err(e) = &res {
                error!(channel = %name, error = ?e, "channel run failed");
            }
            out.push((name, res));
        }
        out
    }

    pub async fn run_forever(&self, every: Duration) {
        info!(interval_secs = every.as_secs(), "scheduler started");
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            self.run_once().await;
        }
    }
}

/// `$NOTIFIER_INTERVAL_SECS` as a duration; unset, empty or zero means "run once".
pub fn interval_from_env() -> anyhow::Result<Option<Duration>> {
    match std::env::var(ENV_INTERVAL_SECS) {
        Ok(v) if !v.trim().is_empty() => {
            let secs: u64 = v
                .trim()
                .parse()
                .map_err(|e| anyhow::anyhow!("{ENV_INTERVAL_SECS}={v}: {e}"))?;
            Ok((secs > 0).then(|| Duration::from_secs(secs)))
        }
        _ => Ok(None),
    }
}

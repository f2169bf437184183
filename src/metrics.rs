use std::net::SocketAddr;

use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use once_cell::sync::OnceCell;

pub const ENV_METRICS_ADDR: &str = "METRICS_ADDR";

/// One-time metrics registration (so series show up on /metrics).
pub fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("notifier_feed_items_total", "Items parsed from feeds.");
        describe_counter!(
            "notifier_new_items_total",
            "Items classified as new and queued for delivery."
        );
        describe_counter!(
            "notifier_batches_sent_total",
            "Batches confirmed by the destination."
        );
        describe_counter!(
            "notifier_batches_failed_total",
            "Batches rejected by the destination or lost in transport."
        );
        describe_counter!("notifier_fetch_errors_total", "Feed fetch/parse errors.");
        describe_counter!(
            "notifier_skipped_total",
            "Subscriptions left unchanged, by reason."
        );
        describe_histogram!("notifier_feed_parse_ms", "Feed parse time in milliseconds.");
        describe_gauge!(
            "notifier_last_run_ts",
            "Unix ts when a channel run last finished."
        );
    });
}

/// Install the Prometheus recorder with its own HTTP listener when
/// `$METRICS_ADDR` is set. Returns the bound address, if any.
pub fn install_exporter_from_env() -> anyhow::Result<Option<SocketAddr>> {
    let Ok(raw) = std::env::var(ENV_METRICS_ADDR) else {
        return Ok(None);
    };
    let addr: SocketAddr = raw
        .parse()
        .map_err(|e| anyhow::anyhow!("{ENV_METRICS_ADDR}={raw}: {e}"))?;
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| anyhow::anyhow!("prometheus: install exporter: {e}"))?;
    ensure_metrics_described();
    Ok(Some(addr))
}

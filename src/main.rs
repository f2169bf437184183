//! PubMed notifier, binary entrypoint.
//! Loads config, wires the channels and runs them once (or on an interval
//! when `NOTIFIER_INTERVAL_SECS` is set).

use std::sync::Arc;

use pubmed_notifier::config::AppConfig;
use pubmed_notifier::http::ReqwestClient;
use pubmed_notifier::metrics::install_exporter_from_env;
use pubmed_notifier::scheduler::{interval_from_env, App};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// `LOG_FORMAT=json` switches to one JSON object per line.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("pubmed_notifier=info,warn"));
    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer().compact()).init();
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cfg = AppConfig::load_default()?;
    match install_exporter_from_env() {
        Ok(Some(addr)) => info!(%addr, "prometheus exporter listening"),
        Ok(None) => {}
        Err(e) => warn!(error = ?e, "metrics exporter disabled"),
    }

    let http = Arc::new(ReqwestClient::new()?);
    let app = App::from_config(&cfg, http);

    match interval_from_env()? {
        Some(every) => app.run_forever(every).await,
        None => {
            let results = app.run_once().await;
            if let Some((name, Err(e))) = results.into_iter().find(|(_, r)| r.is_err()) {
                return Err(e.context(format!("channel `{name}`")));
            }
        }
    }
    Ok(())
}

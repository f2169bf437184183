// tests/orchestrator_run.rs
mod common;

use std::sync::Arc;

use common::*;
use pubmed_notifier::config::translation::{TranslationConfig, TranslationFailurePolicy};
use pubmed_notifier::dedup::DedupPolicy;
use pubmed_notifier::error::{DeliveryError, FetchError, TranslationError};
use pubmed_notifier::http::HttpResponse;
use pubmed_notifier::notify::ProviderKind;
use pubmed_notifier::orchestrator::CheckOutcome;
use pubmed_notifier::store::{parse_credentials, parse_subscriptions, Workbook};

fn position(haystack: &str, needle: &str) -> usize {
    haystack
        .find(needle)
        .unwrap_or_else(|| panic!("`{needle}` missing from {haystack}"))
}

#[tokio::test]
async fn first_run_delivers_everything_oldest_first_and_commits() {
    let http = Arc::new(MockHttp::new().with_feed(FEED_URL, brca1_feed()));
    let orch = orchestrator(slack_channel(), http.clone());
    let wb = workbook(ProviderKind::Slack, "");

    let summary = orch.run(&wb).await.unwrap();
    assert_eq!(summary.delivered, 1);
    assert_eq!(summary.items_sent, 5);

    let posts = http.posts();
    assert_eq!(posts.len(), 1, "5 items fit in one Slack message");
    assert_eq!(posts[0].url, SLACK_HOOK);
    let body = &posts[0].body;
    let order: Vec<usize> = [A, B, C, D, E].iter().map(|id| position(body, id)).collect();
    assert!(order.windows(2).all(|w| w[0] < w[1]), "not chronological: {body}");

    assert_eq!(seen_ids(&state_cell(&wb)), vec![A, B, C, D, E]);
    assert_eq!(*wb.writes.lock().unwrap(), 1);
}

#[tokio::test]
async fn rerun_on_unchanged_feed_sends_nothing() {
    let http = Arc::new(MockHttp::new().with_feed(FEED_URL, brca1_feed()));
    let orch = orchestrator(slack_channel(), http.clone());
    let wb = workbook(ProviderKind::Slack, "");

    orch.run(&wb).await.unwrap();
    let committed = state_cell(&wb);
    http.clear_posts();

    let summary = orch.run(&wb).await.unwrap();
    assert_eq!(summary.quiet, 1);
    assert!(http.posts().is_empty());
    assert_eq!(state_cell(&wb), committed);
}

#[tokio::test]
async fn only_unseen_items_go_out() {
    let http = Arc::new(MockHttp::new().with_feed(FEED_URL, brca1_feed()));
    let orch = orchestrator(slack_channel(), http.clone());
    let wb = workbook(ProviderKind::Slack, &seen_cell(&[A, B]));

    let summary = orch.run(&wb).await.unwrap();
    assert_eq!(summary.items_sent, 3);

    let body = &http.posts()[0].body;
    assert!(!body.contains(A) && !body.contains(B));
    assert!(position(body, C) < position(body, D) && position(body, D) < position(body, E));
    assert_eq!(seen_ids(&state_cell(&wb)), vec![A, B, C, D, E]);
}

#[tokio::test]
async fn failed_batch_keeps_previous_state() {
    // budget 1: header and every item travel alone, so four LINE messages
    let mut channel = line_channel();
    channel.char_budget = 1;
    let http = Arc::new(
        MockHttp::new()
            .with_feed(FEED_URL, brca1_feed())
            .with_post_statuses(&[200, 500, 200, 500]),
    );
    let orch = orchestrator(channel, http.clone());
    let before = seen_cell(&[A, B]);
    let wb = workbook(ProviderKind::Line, &before);

    let subs = parse_subscriptions(&wb.read_sheet("RSS").await.unwrap());
    let creds = parse_credentials(&wb.read_sheet("tokens").await.unwrap());
    let report = orch.check(&subs[0], &creds).await;
    match &report.outcome {
        CheckOutcome::DeliveryFailed {
            delivered,
            total,
            error,
        } => {
            assert_eq!(*delivered, 1);
            assert_eq!(*total, 4);
            assert!(matches!(error, DeliveryError::HttpStatus { status: 500, .. }));
        }
        other => panic!("unexpected outcome {other:?}"),
    }
    assert_eq!(report.state, before);
    assert_eq!(http.posts().len(), 2, "dispatch stops at the first failure");

    // a full run that fails the same way writes the untouched cell back
    let summary = orch.run(&wb).await.unwrap();
    assert_eq!(summary.checked, 1);
    assert_eq!(state_cell(&wb), before);
}

#[tokio::test]
async fn retry_after_failure_sends_the_same_items() {
    let http = Arc::new(
        MockHttp::new()
            .with_feed(FEED_URL, brca1_feed())
            .with_post_statuses(&[404]),
    );
    let orch = orchestrator(slack_channel(), http.clone());
    let wb = workbook(ProviderKind::Slack, &seen_cell(&[A, B, C]));

    let first = orch.run(&wb).await.unwrap();
    assert_eq!(first.failed, 1);
    let failed_body = http.posts()[0].body.clone();
    http.clear_posts();

    let second = orch.run(&wb).await.unwrap();
    assert_eq!(second.delivered, 1);
    assert_eq!(http.posts()[0].body, failed_body);
    assert_eq!(seen_ids(&state_cell(&wb)), vec![A, B, C, D, E]);
}

#[tokio::test]
async fn missing_credential_skips_without_network() {
    let http = Arc::new(MockHttp::new().with_feed(FEED_URL, brca1_feed()));
    let orch = orchestrator(slack_channel(), http.clone());
    let wb = pubmed_notifier::store::MemoryWorkbook::new()
        .with_sheet(
            "RSS",
            vec![
                vec!["keyword", "feed", "target", "state"],
                vec!["BRCA1", FEED_URL, "ghost", "[\"1\"]"],
            ],
        )
        .with_sheet("webhooks", vec![vec!["target", "credential"]]);

    let summary = orch.run(&wb).await.unwrap();
    assert_eq!(summary.skipped, 1);
    assert_eq!(*http.get_count.lock().unwrap(), 0);
    assert!(http.posts().is_empty());
    assert_eq!(state_cell(&wb), "[\"1\"]");
}

#[tokio::test]
async fn fetch_failure_is_reported_and_state_kept() {
    let http = Arc::new(MockHttp::new().with_get(FEED_URL, HttpResponse::new(503, "busy")));
    let orch = orchestrator(slack_channel(), http.clone());
    let wb = workbook(ProviderKind::Slack, &seen_cell(&[A]));

    let subs = parse_subscriptions(&wb.read_sheet("RSS").await.unwrap());
    let creds = parse_credentials(&wb.read_sheet("webhooks").await.unwrap());
    let report = orch.check(&subs[0], &creds).await;
    assert_eq!(report.outcome, CheckOutcome::FetchFailed(FetchError::HttpStatus(503)));
    assert_eq!(report.state, seen_cell(&[A]));
    assert!(http.posts().is_empty());
}

#[tokio::test]
async fn unreadable_state_is_skipped() {
    let http = Arc::new(MockHttp::new().with_feed(FEED_URL, brca1_feed()));
    let mut channel = slack_channel();
    channel.dedup = DedupPolicy::Watermark;
    let orch = orchestrator(channel, http.clone());
    let wb = workbook(ProviderKind::Slack, "last tuesday");

    let summary = orch.run(&wb).await.unwrap();
    assert_eq!(summary.skipped, 1);
    assert!(http.posts().is_empty());
    assert_eq!(state_cell(&wb), "last tuesday");
}

#[tokio::test]
async fn watermark_sends_strictly_newer_items_and_commits_run_start() {
    let http = Arc::new(MockHttp::new().with_feed(FEED_URL, brca1_feed()));
    let mut channel = slack_channel();
    channel.dedup = DedupPolicy::Watermark;
    let orch = orchestrator(channel, http.clone());
    // C was published at exactly this instant, so it is not new
    let wb = workbook(ProviderKind::Slack, "2025-02-05T11:00:00Z");

    let summary = orch.run(&wb).await.unwrap();
    assert_eq!(summary.items_sent, 2);
    let body = &http.posts()[0].body;
    assert!(!body.contains(C));
    assert!(position(body, D) < position(body, E));
    assert_eq!(state_cell(&wb), "2025-02-08T09:00:00Z");
}

#[tokio::test]
async fn watermark_on_quiet_run_follows_policy() {
    let quiet = "2025-02-07T12:00:00Z";
    for (advance, expected) in [(false, quiet), (true, "2025-02-08T09:00:00Z")] {
        let http = Arc::new(MockHttp::new().with_feed(FEED_URL, brca1_feed()));
        let mut channel = slack_channel();
        channel.dedup = DedupPolicy::Watermark;
        channel.advance_watermark_on_empty = advance;
        let orch = orchestrator(channel, http.clone());
        let wb = workbook(ProviderKind::Slack, quiet);

        let summary = orch.run(&wb).await.unwrap();
        assert_eq!(summary.quiet, 1);
        assert!(http.posts().is_empty());
        assert_eq!(state_cell(&wb), expected, "advance = {advance}");
    }
}

#[tokio::test]
async fn line_messages_start_with_header_and_keep_literal_ampersands() {
    let http = Arc::new(MockHttp::new().with_feed(FEED_URL, brca1_feed()));
    let orch = orchestrator(line_channel(), http.clone());
    let wb = workbook(ProviderKind::Line, &seen_cell(&[A, B, C]));

    orch.run(&wb).await.unwrap();
    let posts = http.posts();
    assert_eq!(posts.len(), 1);
    assert_eq!(posts[0].header("Authorization"), Some("Bearer line-token-123"));

    let form: Vec<(String, String)> = url::form_urlencoded::parse(posts[0].body.as_bytes())
        .into_owned()
        .collect();
    let message = &form.iter().find(|(k, _)| k == "message").unwrap().1;
    assert!(message.starts_with("New PubMed articles: BRCA1"));
    assert!(message.contains("PARP inhibitors & resistance"));
    assert!(message.contains("Tanaka K et al. / Nature 2025-02-07"));
    assert!(message.contains("https://pubmed.ncbi.nlm.nih.gov/39000105/"));
    assert!(form.contains(&("notificationDisabled".into(), "false".into())));
}

#[tokio::test]
async fn translation_failure_aborts_or_is_omitted() {
    let abort = TranslationConfig {
        enabled: true,
        ..TranslationConfig::default()
    };
    let http = Arc::new(MockHttp::new().with_feed(FEED_URL, brca1_feed()));
    let orch = orchestrator_with(slack_channel(), http.clone(), Arc::new(DownTranslator), &abort);
    let wb = workbook(ProviderKind::Slack, &seen_cell(&[A, B, C, D]));
    let subs = parse_subscriptions(&wb.read_sheet("RSS").await.unwrap());
    let creds = parse_credentials(&wb.read_sheet("webhooks").await.unwrap());

    let report = orch.check(&subs[0], &creds).await;
    assert_eq!(
        report.outcome,
        CheckOutcome::FormatFailed(TranslationError::HttpStatus(503))
    );
    assert!(http.posts().is_empty());

    let omit = TranslationConfig {
        on_failure: TranslationFailurePolicy::Omit,
        ..abort
    };
    let orch = orchestrator_with(slack_channel(), http.clone(), Arc::new(DownTranslator), &omit);
    let report = orch.check(&subs[0], &creds).await;
    assert_eq!(
        report.outcome,
        CheckOutcome::Delivered {
            items: 1,
            batches: 1
        }
    );
}

#[tokio::test]
async fn translated_title_follows_the_original() {
    let cfg = TranslationConfig {
        enabled: true,
        ..TranslationConfig::default()
    };
    let http = Arc::new(MockHttp::new().with_feed(FEED_URL, brca1_feed()));
    let orch = orchestrator_with(slack_channel(), http.clone(), Arc::new(TagTranslator), &cfg);
    let wb = workbook(ProviderKind::Slack, &seen_cell(&[A, B, C, D]));

    orch.run(&wb).await.unwrap();
    let payload: serde_json::Value = serde_json::from_str(&http.posts()[0].body).unwrap();
    let section = payload["blocks"][0]["text"]["text"].as_str().unwrap();
    assert!(section.contains(
        "|E: Homologous recombination repair in _BRCA1_-deficient tumours>\n\
         [ja] E: Homologous recombination repair in BRCA1-deficient tumours\n"
    ));
}

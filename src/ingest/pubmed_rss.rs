// src/ingest/pubmed_rss.rs
use chrono::{DateTime, NaiveDate, Utc};
use metrics::{counter, histogram};
use quick_xml::de::from_str;
use serde::Deserialize;
use time::{format_description::well_known::Rfc2822, OffsetDateTime};

use crate::error::FetchError;
use crate::ingest::normalize_field;
use crate::ingest::types::FeedItem;

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}

#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    item: Vec<Item>,
}

#[derive(Debug, Deserialize)]
struct Item {
    title: Option<String>,
    guid: Option<Guid>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
    // quick-xml matches on the local name, so the `dc:` prefix is left off
    #[serde(rename = "creator", default)]
    creators: Vec<String>,
    source: Option<String>,
    date: Option<String>,
    #[serde(rename = "identifier", default)]
    identifiers: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct Guid {
    #[serde(rename = "$text", default)]
    value: String,
}

fn parse_rfc2822(ts: &str) -> Option<DateTime<Utc>> {
    let odt = OffsetDateTime::parse(ts.trim(), &Rfc2822).ok()?;
    DateTime::from_timestamp(odt.unix_timestamp(), odt.nanosecond())
}

fn parse_dc_date(d: &str) -> Option<DateTime<Utc>> {
    NaiveDate::parse_from_str(d.trim(), "%Y-%m-%d")
        .ok()?
        .and_hms_opt(0, 0, 0)
        .map(|naive| naive.and_utc())
}

/// `pubmed:39912345` → `39912345`; falls back to a `pmid:` identifier.
fn extract_id(guid: Option<&Guid>, identifiers: &[String]) -> Option<String> {
    let from_guid = guid
        .map(|g| g.value.trim())
        .filter(|v| !v.is_empty())
        .map(|v| v.rsplit(':').next().unwrap_or(v).trim().to_string())
        .filter(|v| !v.is_empty());
    if from_guid.is_some() {
        return from_guid;
    }
    identifiers.iter().find_map(|ident| {
        let (scheme, value) = ident.trim().split_once(':')?;
        (scheme.eq_ignore_ascii_case("pmid") && !value.trim().is_empty())
            .then(|| value.trim().to_string())
    })
}

/// Parse a PubMed RSS 2.0 document. Items come back in feed order (newest first).
pub fn parse_items(xml: &str) -> Result<Vec<FeedItem>, FetchError> {
    let t0 = std::time::Instant::now();
    let xml_clean = scrub_html_entities_for_xml(xml);
    let rss: Rss = from_str(&xml_clean).map_err(|e| FetchError::Parse(e.to_string()))?;

    let mut out = Vec::with_capacity(rss.channel.item.len());
    for it in rss.channel.item {
        let Some(id) = extract_id(it.guid.as_ref(), &it.identifiers) else {
            tracing::debug!(title = ?it.title, "feed item without identifier dropped");
            continue;
        };

        let published_at = it
            .pub_date
            .as_deref()
            .and_then(parse_rfc2822)
            .or_else(|| it.date.as_deref().and_then(parse_dc_date))
            .unwrap_or_else(|| {
                tracing::warn!(
                    %id,
                    pub_date = ?it.pub_date,
                    dc_date = ?it.date,
                    "feed item has no usable date; using the epoch, so a watermark never counts it as new"
                );
                DateTime::<Utc>::UNIX_EPOCH
            });

        out.push(FeedItem {
            id,
            title: normalize_field(it.title.as_deref().unwrap_or_default()),
            published_at,
            authors: it
                .creators
                .iter()
                .map(|c| normalize_field(c))
                .filter(|c| !c.is_empty())
                .collect(),
            source_name: normalize_field(it.source.as_deref().unwrap_or_default()),
            source_date: normalize_field(it.date.as_deref().unwrap_or_default()),
        });
    }

    let ms = t0.elapsed().as_secs_f64() * 1_000.0;
    histogram!("notifier_feed_parse_ms").record(ms);
    counter!("notifier_feed_items_total").increment(out.len() as u64);
    Ok(out)
}

/// HTML named entities are not XML entities; the XML reader rejects them.
fn scrub_html_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&ldquo;", "\"")
        .replace("&rdquo;", "\"")
        .replace("&lsquo;", "'")
        .replace("&rsquo;", "'")
}

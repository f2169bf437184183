//! # Novelty tracking
//! Decides which feed items have not been notified yet for a subscription.
//!
//! Two policies share one stored column:
//! - `SeenSet`: exact, keyed by PMID. Stored as a JSON array, oldest id first.
//! - `Watermark`: cut-off timestamp (RFC 3339). Cheaper, but cannot tell apart
//!   items sharing a timestamp and trusts the feed's clock.

use std::collections::HashSet;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::ingest::types::FeedItem;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DedupPolicy {
    #[default]
    SeenSet,
    Watermark,
}

/// Insertion-ordered set of notified item ids.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeenIds {
    order: Vec<String>,
    index: HashSet<String>,
}

impl SeenIds {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains(id)
    }

    /// Returns false when the id was already present.
    pub fn insert(&mut self, id: impl Into<String>) -> bool {
        let id = id.into();
        if self.index.contains(&id) {
            return false;
        }
        self.index.insert(id.clone());
        self.order.push(id);
        true
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    /// Move `ids` (already present) to the young end, keeping their relative order.
    fn refresh<'a>(&mut self, ids: impl IntoIterator<Item = &'a str>) {
        let fresh: Vec<&str> = ids.into_iter().filter(|id| self.contains(id)).collect();
        if fresh.is_empty() {
            return;
        }
        let fresh_set: HashSet<&str> = fresh.iter().copied().collect();
        self.order.retain(|id| !fresh_set.contains(id.as_str()));
        let mut pushed = HashSet::new();
        for id in fresh {
            if pushed.insert(id) {
                self.order.push(id.to_string());
            }
        }
    }

    /// Drop the oldest ids until at most `cap` remain. `cap == 0` means unbounded.
    pub fn retain_newest(&mut self, cap: usize) {
        if cap == 0 || self.order.len() <= cap {
            return;
        }
        let excess = self.order.len() - cap;
        for id in self.order.drain(0..excess) {
            self.index.remove(&id);
        }
    }
}

impl<S: Into<String>> FromIterator<S> for SeenIds {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut out = SeenIds::new();
        for id in iter {
            out.insert(id);
        }
        out
    }
}

/// Set policy: an item is new iff its id has not been seen. Ids are added to the
/// working set as they are classified, so a PMID repeated within one pull is
/// reported once. Output keeps input order.
pub fn filter_new_by_id(items: &[FeedItem], seen: &SeenIds) -> (Vec<FeedItem>, SeenIds) {
    let mut working = seen.clone();
    let mut fresh = Vec::new();
    for item in items {
        if working.insert(item.id.as_str()) {
            fresh.push(item.clone());
        }
    }
    (fresh, working)
}

/// Watermark policy: an item is new iff it was published after the watermark.
/// No watermark means nothing has been committed yet, so everything is new.
pub fn filter_new_by_watermark(items: &[FeedItem], last: Option<DateTime<Utc>>) -> Vec<FeedItem> {
    items
        .iter()
        .filter(|it| last.map_or(true, |ts| it.published_at > ts))
        .cloned()
        .collect()
}

/// Parsed form of the stored state column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DedupState {
    Seen(SeenIds),
    Watermark(Option<DateTime<Utc>>),
}

impl DedupState {
    /// Parse the stored column for `policy`. Empty means "nothing recorded yet".
    pub fn parse(policy: DedupPolicy, raw: &str) -> Result<Self, ConfigError> {
        let trimmed = raw.trim();
        match policy {
            DedupPolicy::SeenSet => {
                if trimmed.is_empty() {
                    return Ok(DedupState::Seen(SeenIds::new()));
                }
                if trimmed.starts_with('[') {
                    let ids: Vec<String> =
                        serde_json::from_str(trimmed).map_err(|e| ConfigError::InvalidState {
                            raw: raw.to_string(),
                            reason: e.to_string(),
                        })?;
                    return Ok(DedupState::Seen(
                        ids.into_iter()
                            .map(|id| id.trim().to_string())
                            .filter(|id| !id.is_empty())
                            .collect(),
                    ));
                }
                // Hand-edited cells: "123, 456 789"
                Ok(DedupState::Seen(
                    trimmed
                        .split(|c: char| c == ',' || c.is_whitespace())
                        .filter(|id| !id.is_empty())
                        .collect(),
                ))
            }
            DedupPolicy::Watermark => {
                if trimmed.is_empty() {
                    return Ok(DedupState::Watermark(None));
                }
                DateTime::parse_from_rfc3339(trimmed)
                    .map(|ts| DedupState::Watermark(Some(ts.with_timezone(&Utc))))
                    .map_err(|e| ConfigError::InvalidState {
                        raw: raw.to_string(),
                        reason: e.to_string(),
                    })
            }
        }
    }

    pub fn encode(&self) -> String {
        match self {
            DedupState::Seen(ids) => {
                let v: Vec<&str> = ids.iter().collect();
                serde_json::to_string(&v).unwrap_or_else(|_| "[]".to_string())
            }
            DedupState::Watermark(Some(ts)) => ts.to_rfc3339_opts(SecondsFormat::Secs, true),
            DedupState::Watermark(None) => String::new(),
        }
    }
}

/// Novelty decision for one pull plus the state to commit if delivery succeeds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Novelty {
    pub new_items: Vec<FeedItem>,
    pub next_state: DedupState,
}

/// Apply the policy carried by `state`.
///
/// For the seen set, ids still present in this pull are never evicted by
/// `max_seen_ids`, otherwise they would come back as new on the next run.
/// For the watermark, the next state is `now`.
pub fn classify(
    items: &[FeedItem],
    state: &DedupState,
    max_seen_ids: usize,
    now: DateTime<Utc>,
) -> Novelty {
    match state {
        DedupState::Seen(seen) => {
            let (new_items, mut next) = filter_new_by_id(items, seen);
            next.refresh(items.iter().map(|it| it.id.as_str()));
            let in_pull: HashSet<&str> = items.iter().map(|it| it.id.as_str()).collect();
            let cap = if max_seen_ids == 0 {
                0
            } else {
                max_seen_ids.max(in_pull.len())
            };
            next.retain_newest(cap);
            Novelty {
                new_items,
                next_state: DedupState::Seen(next),
            }
        }
        DedupState::Watermark(last) => Novelty {
            new_items: filter_new_by_watermark(items, *last),
            next_state: DedupState::Watermark(Some(now)),
        },
    }
}

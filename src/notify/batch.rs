// src/notify/batch.rs
//! Packing of rendered fragments into deliverable messages.

/// LINE Notify rejects messages longer than this many characters.
pub const DEFAULT_CHAR_BUDGET: usize = 1000;
/// Items per Slack section.
pub const DEFAULT_SECTION_SIZE: usize = 5;
/// Slack accepts at most 50 blocks per message.
pub const MAX_SLACK_BLOCKS: usize = 50;
/// Slack rejects a section block whose text is longer than this.
pub const MAX_SLACK_SECTION_CHARS: usize = 3000;

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Size-bounded concatenation. The first batch starts with `header`; a fragment
/// that would push the current batch over `budget` opens a new batch instead.
/// A fragment longer than `budget` on its own still gets a batch of its own.
pub fn pack_by_size(header: &str, fragments: &[String], budget: usize) -> Vec<String> {
    let mut batches = vec![header.to_string()];
    let mut current_len = char_len(header);
    for frag in fragments {
        let frag_len = char_len(frag);
        if current_len + frag_len > budget {
            batches.push(frag.clone());
            current_len = frag_len;
        } else if let Some(last) = batches.last_mut() {
            last.push_str(frag);
            current_len += frag_len;
        }
    }
    batches
}

/// Fixed-group sections: a new section opens at item ordinals 0, `group`,
/// 2*`group`, ... and also whenever the next fragment would push the current
/// section past `max_chars`. A single fragment longer than `max_chars` is cut
/// down to fit.
pub fn pack_by_groups(fragments: &[String], group: usize, max_chars: usize) -> Vec<String> {
    let group = group.max(1);
    let max_chars = max_chars.max(1);
    let mut sections: Vec<String> = Vec::with_capacity(fragments.len().div_ceil(group));
    let mut current_len = 0;
    for (i, frag) in fragments.iter().enumerate() {
        let frag = fit_section(frag, max_chars);
        let frag_len = char_len(&frag);
        if i % group == 0 || current_len + frag_len > max_chars {
            sections.push(String::new());
            current_len = 0;
        }
        if let Some(last) = sections.last_mut() {
            last.push_str(&frag);
            current_len += frag_len;
        }
    }
    sections
}

fn fit_section(frag: &str, max_chars: usize) -> String {
    let len = char_len(frag);
    if len <= max_chars {
        return frag.to_string();
    }
    tracing::warn!(chars = len, max_chars, "fragment longer than a section; truncated");
    let mut out: String = frag.chars().take(max_chars.saturating_sub(1)).collect();
    out.push('…');
    out
}

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::llm::{GroundingSupport, SourceDescriptor};

/// Prefix of the short identifiers handed to the model in place of real URLs.
pub const SHORT_URL_PREFIX: &str = "https://vertexaisearch.cloud.google.com/id/";

/// A source the answer may cite.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Citation {
    pub label: String,
    /// Stable stand-in for `url` while the text is in the model's hands.
    pub short_url: String,
    /// The full source URL.
    pub url: String,
}

/// Map raw sources to citations with short identifiers of the form
/// `<prefix><invocation_id>-<index>`.
///
/// A URL seen earlier in the same list reuses the identifier minted at its
/// first position. Nothing is shared between invocations.
pub fn resolve_urls(sources: &[SourceDescriptor], invocation_id: usize) -> Vec<Citation> {
    let mut seen: HashMap<&str, String> = HashMap::new();

    sources
        .iter()
        .enumerate()
        .map(|(i, source)| {
            let short_url = seen
                .entry(source.url.as_str())
                .or_insert_with(|| format!("{}{}-{}", SHORT_URL_PREFIX, invocation_id, i))
                .clone();

            Citation {
                label: source_label(source.title.as_deref(), i),
                short_url,
                url: source.url.clone(),
            }
        })
        .collect()
}

/// Title up to the first `.`, e.g. "wikipedia.org" -> "wikipedia".
///
/// Only a missing or empty title falls back to `Source <index>`; the part
/// before the dot is kept as is, even when empty.
fn source_label(title: Option<&str>, index: usize) -> String {
    match title.filter(|t| !t.is_empty()) {
        Some(t) => t.split('.').next().unwrap_or_default().to_string(),
        None => format!("Source {}", index),
    }
}

/// Insert ` [label](short_url)` markers after every grounded segment.
///
/// `citations` must be index-aligned with the chunk indices in `supports`.
pub fn insert_citation_markers(
    text: &str,
    supports: &[GroundingSupport],
    citations: &[Citation],
) -> String {
    let mut ordered: Vec<&GroundingSupport> = supports.iter().collect();
    // Highest offset first so earlier offsets stay valid.
    ordered.sort_by(|a, b| b.end_index.cmp(&a.end_index));

    let mut out = text.to_string();
    for support in ordered {
        let markers: String = support
            .chunk_indices
            .iter()
            .filter_map(|i| citations.get(*i))
            .map(|c| format!(" [{}]({})", c.label, c.short_url))
            .collect();
        if markers.is_empty() {
            continue;
        }

        let mut end = support.end_index.min(out.len());
        while !out.is_char_boundary(end) {
            end -= 1;
        }
        out.insert_str(end, &markers);
    }
    out
}

/// Citations referenced by at least one support, in source order.
/// Without supports every citation counts as referenced.
pub fn referenced_citations(supports: &[GroundingSupport], citations: &[Citation]) -> Vec<Citation> {
    if supports.is_empty() {
        return citations.to_vec();
    }

    let mut used = vec![false; citations.len()];
    for i in supports.iter().flat_map(|s| s.chunk_indices.iter()) {
        if let Some(flag) = used.get_mut(*i) {
            *flag = true;
        }
    }

    citations
        .iter()
        .zip(used)
        .filter(|(_, used)| *used)
        .map(|(c, _)| c.clone())
        .collect()
}

/// Swap short identifiers in `answer` back to full URLs.
///
/// Returns the rewritten answer and the citations that actually appeared in
/// it, each at most once. Citations the answer never mentions are dropped.
pub fn substitute_citations(answer: &str, citations: &[Citation]) -> (String, Vec<Citation>) {
    let mut text = answer.to_string();
    let mut used = Vec::new();

    for citation in citations {
        let (replaced, count) = replace_token(&text, &citation.short_url, &citation.url);
        if count > 0 {
            text = replaced;
            used.push(citation.clone());
        }
    }

    (text, used)
}

/// Replace `token` wherever it is not immediately followed by a digit, so
/// `.../id/1-1` leaves `.../id/1-10` alone.
fn replace_token(text: &str, token: &str, replacement: &str) -> (String, usize) {
    if token.is_empty() {
        return (text.to_string(), 0);
    }

    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    let mut count = 0;

    for (start, _) in text.match_indices(token) {
        let end = start + token.len();
        let followed_by_digit = text[end..]
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_digit());
        if followed_by_digit {
            continue;
        }

        out.push_str(&text[last..start]);
        out.push_str(replacement);
        last = end;
        count += 1;
    }
    out.push_str(&text[last..]);

    (out, count)
}

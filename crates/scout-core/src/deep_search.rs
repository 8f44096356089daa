//! Deep search: expands one raw query into suffixed variants to widen the match
//! surface of the platform's public directory search.

use std::collections::{BTreeSet, HashSet};

/// Expansion switches. Immutable for a run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DeepSearchConfig {
    pub enabled: bool,
    /// Append `" a"` .. `" z"`.
    pub letters: bool,
    /// Append `" 0"` .. `" 9"`.
    pub digits: bool,
    /// Queries shorter than this (in chars, after trimming) are not expanded.
    pub min_len_gate: usize,
}

impl Default for DeepSearchConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            letters: true,
            digits: true,
            min_len_gate: 2,
        }
    }
}

/// Expand one query.
///
/// The base query always comes first; the remaining variants follow in
/// lexicographic order (so digits sort before letters). Empty input yields
/// an empty list.
pub fn expand(query: &str, cfg: &DeepSearchConfig) -> Vec<String> {
    let base = query.trim();
    if base.is_empty() {
        return Vec::new();
    }
    if !cfg.enabled || base.chars().count() < cfg.min_len_gate {
        return vec![base.to_string()];
    }

    let mut rest = BTreeSet::new();
    if cfg.letters {
        rest.extend(('a'..='z').map(|c| format!("{base} {c}")));
    }
    if cfg.digits {
        rest.extend(('0'..='9').map(|d| format!("{base} {d}")));
    }
    rest.remove(base);

    let mut out = Vec::with_capacity(rest.len() + 1);
    out.push(base.to_string());
    out.extend(rest);
    out
}

/// Expand every query and concatenate, keeping only the first occurrence of
/// each variant across the whole list.
pub fn expand_all<S: AsRef<str>>(queries: &[S], cfg: &DeepSearchConfig) -> Vec<String> {
    let mut seen = HashSet::new();
    queries
        .iter()
        .flat_map(|q| expand(q.as_ref(), cfg))
        .filter(|v| seen.insert(v.clone()))
        .collect()
}

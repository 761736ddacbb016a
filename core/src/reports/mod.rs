//! One normalizer per response shape.
//!
//! Normalizers are pure: they take typed wire rows (already fetched) and build
//! a serializable report. Keyed aggregates use `BTreeMap` and every list is
//! sorted, so an unchanged upstream always yields identical output.

pub mod alerting;
pub mod billing;
pub mod governance;
pub mod inventory;
pub mod key_vault;
pub mod monitor;
pub mod network;
pub mod optimization;
pub mod security;

use std::collections::BTreeMap;

use serde::Serialize;

use crate::scoring::impact_weight;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CountEntry {
    pub name: String,
    pub count: usize,
}

pub fn count_by<I, S>(values: I) -> BTreeMap<String, usize>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut counts = BTreeMap::new();
    for value in values {
        let key = value.as_ref().trim();
        let key = if key.is_empty() { "Unknown" } else { key };
        *counts.entry(key.to_string()).or_insert(0) += 1;
    }
    counts
}

/// Most frequent first, ties by name.
pub fn top_counts<I, S>(values: I, limit: usize) -> Vec<CountEntry>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut entries: Vec<CountEntry> = count_by(values)
        .into_iter()
        .map(|(name, count)| CountEntry { name, count })
        .collect();
    entries.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.name.cmp(&b.name)));
    entries.truncate(limit);
    entries
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

pub fn average(values: impl IntoIterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values
        .into_iter()
        .fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    (count > 0).then(|| sum / count as f64)
}

/// Last path segment of an ARM resource ID.
pub fn name_from_id(resource_id: &str) -> &str {
    resource_id
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or(resource_id)
}

/// Recommendation merged from any source, ranked by impact weight.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedRecommendation {
    pub source: String,
    pub title: String,
    pub resource_id: String,
    pub impact: String,
    pub weight: u8,
    pub action: String,
}

impl RankedRecommendation {
    pub fn new(
        source: &str,
        title: impl Into<String>,
        resource_id: impl Into<String>,
        impact: &str,
        action: impl Into<String>,
    ) -> Self {
        Self {
            source: source.to_string(),
            title: title.into(),
            resource_id: resource_id.into(),
            impact: impact.to_string(),
            weight: impact_weight(impact),
            action: action.into(),
        }
    }
}

/// Weight descending, then source, title and resource ID.
pub fn rank_recommendations(mut items: Vec<RankedRecommendation>) -> Vec<RankedRecommendation> {
    items.sort_by(|a, b| {
        b.weight
            .cmp(&a.weight)
            .then_with(|| a.source.cmp(&b.source))
            .then_with(|| a.title.cmp(&b.title))
            .then_with(|| a.resource_id.cmp(&b.resource_id))
    });
    items
}

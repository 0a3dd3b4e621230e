use std::collections::BTreeMap;

use log::info;
use serde::{Deserialize, Serialize};

/// Any count below this value is suppressed before leaving the node
pub const PRIVACY_THRESHOLD: usize = 5;

/// Replacement for every proportion of a masked group set
pub const MASKED_PROPORTION: &str = "masked";

/// A count that may have been suppressed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MaskedCount {
    Count(u64),
    /// Suppressed count, e.g. `"<5"`
    Masked(String),
}

impl MaskedCount {
    pub fn is_masked(&self) -> bool {
        matches!(self, MaskedCount::Masked(_))
    }
}

/// A proportion that may have been suppressed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MaskedProportion {
    Proportion(f64),
    Masked(String),
}

/// Label reported in place of a count below `threshold`
pub fn masked_label(threshold: usize) -> String {
    format!("<{}", threshold)
}

/// Report a count, or its masked label when below `threshold`
pub fn mask_count(count: usize, threshold: usize) -> MaskedCount {
    if count < threshold {
        MaskedCount::Masked(masked_label(threshold))
    } else {
        MaskedCount::Count(count as u64)
    }
}

/// Mask all counts and proportions if any group has a count below the threshold.
pub fn safe_counts_and_proportions_groupwise(
    counts: &BTreeMap<String, usize>,
    threshold: usize,
) -> (BTreeMap<String, MaskedCount>, BTreeMap<String, MaskedProportion>) {
    if counts.values().any(|&v| v < threshold) {
        info!(
            "Privacy filter: masking {} groups (a group is below the threshold of {})",
            counts.len(),
            threshold
        );
        let label = masked_label(threshold);
        return (
            counts
                .keys()
                .map(|k| (k.clone(), MaskedCount::Masked(label.clone())))
                .collect(),
            counts
                .keys()
                .map(|k| (k.clone(), MaskedProportion::Masked(MASKED_PROPORTION.to_string())))
                .collect(),
        );
    }

    let total: usize = counts.values().sum();
    let safe_counts = counts
        .iter()
        .map(|(k, &v)| (k.clone(), MaskedCount::Count(v as u64)))
        .collect();
    let safe_proportions = counts
        .iter()
        .map(|(k, &v)| {
            let p = if total > 0 {
                crate::stats::round_to(v as f64 / total as f64, 3)
            } else {
                0.0
            };
            (k.clone(), MaskedProportion::Proportion(p))
        })
        .collect();
    (safe_counts, safe_proportions)
}

//! Outcome aggregation and statistics.
//!
//! Summaries over the specialist outcomes of a run, used by the console
//! summary and the report generator.

use crate::error::FailureKind;
use crate::models::SpecialistOutcome;
use std::collections::BTreeMap;
use std::time::Duration;

/// Counts over one run's specialist outcomes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutcomeSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub by_kind: BTreeMap<FailureKind, usize>,
    /// Slowest specialist, if any ran.
    pub slowest: Option<(String, Duration)>,
}

impl OutcomeSummary {
    pub fn from_outcomes(outcomes: &[SpecialistOutcome]) -> Self {
        let mut summary = Self {
            total: outcomes.len(),
            ..Self::default()
        };

        for outcome in outcomes {
            match outcome.failure_kind() {
                None => summary.succeeded += 1,
                Some(kind) => {
                    summary.failed += 1;
                    *summary.by_kind.entry(kind).or_default() += 1;
                }
            }
        }

        summary.slowest = outcomes
            .iter()
            .max_by_key(|o| o.elapsed)
            .map(|o| (o.name.clone(), o.elapsed));

        summary
    }
}

/// Names of the specialists that succeeded, in roster order.
pub fn succeeded_names(outcomes: &[SpecialistOutcome]) -> Vec<&str> {
    outcomes
        .iter()
        .filter(|o| o.is_success())
        .map(|o| o.name.as_str())
        .collect()
}

/// `(name, reason)` for every failed specialist, in roster order.
pub fn failure_reasons(outcomes: &[SpecialistOutcome]) -> Vec<(&str, String)> {
    outcomes
        .iter()
        .filter_map(|o| o.failure().map(|f| (o.name.as_str(), f.to_string())))
        .collect()
}

/// Generate a text summary of outcome statistics.
pub fn generate_summary_text(summary: &OutcomeSummary) -> String {
    let mut lines = Vec::new();

    lines.push(format!("Specialists: {}", summary.total));
    lines.push(format!("- ✅ Succeeded: {}", summary.succeeded));
    lines.push(format!("- ❌ Failed: {}", summary.failed));

    if !summary.by_kind.is_empty() {
        lines.push(String::new());
        lines.push("Failures by Reason:".to_string());

        let mut kinds: Vec<_> = summary.by_kind.iter().collect();
        kinds.sort_by_key(|(_, count)| std::cmp::Reverse(**count));

        for (kind, count) in kinds {
            lines.push(format!("- {}: {}", kind, count));
        }
    }

    if let Some((name, elapsed)) = &summary.slowest {
        lines.push(String::new());
        lines.push(format!("Slowest: {} ({:.1}s)", name, elapsed.as_secs_f64()));
    }

    lines.join("\n")
}

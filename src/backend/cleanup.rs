//! Repetition cleanup for generated text.
//!
//! Small instruction-tuned models sometimes loop on the same line or the
//! same hedge phrase. Cleanup keeps at most two consecutive copies of a
//! line and cuts runaway hedging.

use tracing::warn;

/// Consecutive identical lines kept before dropping the rest.
pub const MAX_REPEATED_LINES: usize = 2;

/// Length above which repeated hedging triggers truncation.
pub const MAX_CONTENT_LENGTH: usize = 2000;

/// Hedge phrase that marks a looping answer.
pub const REPETITION_PATTERN: &str = "However, given";

pub const TRUNCATION_NOTE: &str = "\n\n(Analysis truncated to prevent repetition)";

/// Collapse repeated lines, then truncate repetitive long answers.
pub fn clean_response(content: &str) -> String {
    let mut kept: Vec<&str> = Vec::new();
    let mut previous: Option<&str> = None;
    let mut run = 0;

    for line in content.split('\n') {
        let stripped = line.trim();
        if previous == Some(stripped) {
            run += 1;
            if run < MAX_REPEATED_LINES {
                kept.push(line);
            }
        } else {
            run = 0;
            previous = Some(stripped);
            kept.push(line);
        }
    }

    let cleaned = kept.join("\n");

    if cleaned.chars().count() > MAX_CONTENT_LENGTH && cleaned.matches(REPETITION_PATTERN).count() > 2 {
        let head = cleaned.split(REPETITION_PATTERN).next().unwrap_or_default();
        warn!("Response truncated due to repetition");
        return format!("{}{}", head, TRUNCATION_NOTE);
    }

    cleaned
}

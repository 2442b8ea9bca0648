//! Diagnosis report generation.
//!
//! Renders a pipeline run as Markdown, JSON or plain text.

use crate::analysis::{failure_reasons, generate_summary_text, succeeded_names, OutcomeSummary};
use crate::models::{PipelineState, SpecialistOutcome};
use crate::pipeline::PipelineRun;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::Path;

pub const DISCLAIMER: &str = "This report is generated by language models for research and \
educational purposes only. It is not medical advice and must not be used for diagnosis or \
treatment.";

/// Output format for the written report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    #[default]
    Markdown,
    Json,
    Text,
}

impl OutputFormat {
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Markdown => "md",
            OutputFormat::Json => "json",
            OutputFormat::Text => "txt",
        }
    }
}

/// Run context that is not part of the pipeline record.
#[derive(Debug, Clone, Serialize)]
pub struct ReportMetadata {
    pub source: String,
    pub backend: String,
    pub analysis_date: DateTime<Utc>,
    pub duration_seconds: f64,
}

#[derive(Serialize)]
struct JsonReport<'a> {
    metadata: &'a ReportMetadata,
    run: &'a PipelineRun,
}

/// Render `run` in the requested format.
pub fn render(run: &PipelineRun, metadata: &ReportMetadata, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Markdown => Ok(generate_markdown_report(run, metadata)),
        OutputFormat::Json => generate_json_report(run, metadata),
        OutputFormat::Text => Ok(generate_text_report(run)),
    }
}

/// Generate a complete Markdown report.
pub fn generate_markdown_report(run: &PipelineRun, metadata: &ReportMetadata) -> String {
    let mut output = String::new();

    output.push_str("# Medical Panel Report\n\n");
    output.push_str(&generate_metadata_section(run, metadata));
    output.push_str(&generate_diagnosis_section(run));
    output.push_str(&generate_summary_section(&run.outcomes));
    output.push_str(&generate_specialists_section(&run.outcomes));
    output.push_str(&generate_footer());

    output
}

fn generate_metadata_section(run: &PipelineRun, metadata: &ReportMetadata) -> String {
    let mut section = String::new();

    section.push_str("## Metadata\n\n");
    section.push_str(&format!("- **Report:** {}\n", metadata.source));
    section.push_str(&format!(
        "- **Analysis Date:** {}\n",
        metadata.analysis_date.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    section.push_str(&format!("- **Model Used:** `{}`\n", metadata.backend));
    section.push_str(&format!("- **Status:** {}\n", run.state));
    if let Some(ref result) = run.result {
        if result.partial {
            section.push_str(&format!(
                "- **Partial:** yes ({} of {} specialists contributed)\n",
                result.contributing_roles.len(),
                run.outcomes.len()
            ));
        }
    }
    section.push_str(&format!(
        "- **Analysis Duration:** {:.1}s\n",
        metadata.duration_seconds
    ));
    section.push('\n');

    section
}

fn generate_diagnosis_section(run: &PipelineRun) -> String {
    let mut section = String::new();

    section.push_str("## Final Diagnosis\n\n");
    match (&run.result, &run.error) {
        (Some(result), _) => {
            section.push_str(result.text.trim());
            section.push_str("\n\n");
        }
        (None, Some(err)) => {
            section.push_str(&format!("> ❌ **No diagnosis produced:** {}\n\n", err));
        }
        (None, None) => {
            section.push_str("> No diagnosis produced.\n\n");
        }
    }

    section
}

fn generate_summary_section(outcomes: &[SpecialistOutcome]) -> String {
    let summary = OutcomeSummary::from_outcomes(outcomes);
    let mut section = String::new();

    section.push_str("## Summary\n\n");
    section.push_str("| ✅ Succeeded | ❌ Failed | **Total** |\n");
    section.push_str("|:---:|:---:|:---:|\n");
    section.push_str(&format!(
        "| {} | {} | **{}** |\n\n",
        summary.succeeded, summary.failed, summary.total
    ));

    if !summary.by_kind.is_empty() {
        section.push_str("### Failures by Reason\n\n");
        section.push_str("| Reason | Count |\n");
        section.push_str("|:---|:---:|\n");
        for (kind, count) in &summary.by_kind {
            section.push_str(&format!("| {} | {} |\n", kind, count));
        }
        section.push('\n');
    }

    section
}

fn generate_specialists_section(outcomes: &[SpecialistOutcome]) -> String {
    let mut section = String::new();

    section.push_str("## Specialist Reports\n\n");
    for outcome in outcomes {
        section.push_str(&generate_outcome_block(outcome));
    }

    section
}

fn generate_outcome_block(outcome: &SpecialistOutcome) -> String {
    let mut block = String::new();

    block.push_str(&format!("### {}\n\n", outcome.name));
    block.push_str(&format!(
        "*Elapsed: {:.1}s*\n\n",
        outcome.elapsed.as_secs_f64()
    ));

    match (outcome.text(), outcome.failure()) {
        (Some(text), _) => {
            block.push_str(text.trim());
            block.push_str("\n\n");
        }
        (None, Some(reason)) => {
            block.push_str(&format!(
                "> ⚠️ **Failed ({}):** {}\n\n",
                reason.kind, reason.message
            ));
        }
        (None, None) => {}
    }

    block.push_str("---\n\n");
    block
}

fn generate_footer() -> String {
    format!("*{}*\n", DISCLAIMER)
}

/// Generate a JSON report.
pub fn generate_json_report(run: &PipelineRun, metadata: &ReportMetadata) -> Result<String> {
    serde_json::to_string_pretty(&JsonReport { metadata, run }).map_err(Into::into)
}

/// The plain diagnosis file.
pub fn generate_text_report(run: &PipelineRun) -> String {
    match (&run.result, &run.error) {
        (Some(result), _) => format!("### Final Diagnosis:\n\n{}", result.text),
        (None, Some(err)) => format!("### Final Diagnosis:\n\nNo diagnosis produced: {}\n", err),
        (None, None) => "### Final Diagnosis:\n\nNo diagnosis produced.\n".to_string(),
    }
}

/// Write rendered content, creating parent directories.
pub fn write_report(content: &str, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
    }
    std::fs::write(path, content)
        .with_context(|| format!("Failed to write report: {}", path.display()))
}

/// Console summary printed after a run.
pub fn console_summary(run: &PipelineRun) -> String {
    let mut lines = Vec::new();

    for name in succeeded_names(&run.outcomes) {
        lines.push(format!("  ✓ {}", name));
    }
    for (name, reason) in failure_reasons(&run.outcomes) {
        lines.push(format!("  ✗ {} ({})", name, reason));
    }
    lines.push(String::new());
    lines.push(generate_summary_text(&OutcomeSummary::from_outcomes(&run.outcomes)));

    if run.state == PipelineState::Failed {
        if let Some(ref err) = run.error {
            lines.push(String::new());
            lines.push(format!("Pipeline failed: {}", err));
        }
    }

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{BackendError, PipelineError};
    use crate::models::FinalResult;
    use std::time::Duration;
    use tempfile::TempDir;

    fn outcomes() -> Vec<SpecialistOutcome> {
        vec![
            SpecialistOutcome::succeeded("cardiologist", "Cardiologist", "No structural disease".to_string(), Duration::from_secs(4)),
            SpecialistOutcome::failed("psychologist", "Psychologist", BackendError::rate_limit("429"), Duration::from_secs(1)),
        ]
    }

    fn done_run() -> PipelineRun {
        PipelineRun {
            document_id: Some("case".to_string()),
            state: PipelineState::Done,
            barrier: None,
            outcomes: outcomes(),
            result: Some(FinalResult {
                document_id: Some("case".to_string()),
                text: "- Panic disorder".to_string(),
                contributing_roles: vec!["cardiologist".to_string()],
                status: PipelineState::Done,
                partial: true,
                backend: "openai/gpt-4-turbo".to_string(),
                completed_at: Utc::now(),
            }),
            error: None,
            history: vec![PipelineState::Init, PipelineState::Done],
        }
    }

    fn failed_run() -> PipelineRun {
        PipelineRun {
            result: None,
            state: PipelineState::Failed,
            error: Some(PipelineError::Synthesis {
                source: BackendError::auth("401"),
            }),
            ..done_run()
        }
    }

    fn metadata() -> ReportMetadata {
        ReportMetadata {
            source: "Medical Reports/case.txt".to_string(),
            backend: "openai/gpt-4-turbo".to_string(),
            analysis_date: Utc::now(),
            duration_seconds: 12.5,
        }
    }

    #[test]
    fn test_generate_markdown_report() {
        let markdown = generate_markdown_report(&done_run(), &metadata());

        assert!(markdown.contains("# Medical Panel Report"));
        assert!(markdown.contains("## Final Diagnosis\n\n- Panic disorder"));
        assert!(markdown.contains("**Partial:** yes (1 of 2 specialists contributed)"));
        assert!(markdown.contains("### Cardiologist"));
        assert!(markdown.contains("**Failed (rate_limit):** 429"));
        assert!(markdown.contains("| rate_limit | 1 |"));
        assert!(markdown.contains(DISCLAIMER));
    }

    #[test]
    fn test_markdown_for_failed_run() {
        let markdown = generate_markdown_report(&failed_run(), &metadata());
        assert!(markdown.contains("No diagnosis produced:** synthesis failed"));
        assert!(markdown.contains("**Status:** FAILED"));
    }

    #[test]
    fn test_text_report() {
        assert_eq!(
            generate_text_report(&done_run()),
            "### Final Diagnosis:\n\n- Panic disorder"
        );
        assert!(generate_text_report(&failed_run()).starts_with("### Final Diagnosis:\n\nNo diagnosis"));
    }

    #[test]
    fn test_generate_json_report() {
        let json = render(&done_run(), &metadata(), OutputFormat::Json).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["run"]["state"], "done");
        assert_eq!(value["run"]["outcomes"][1]["status"], "failed");
        assert_eq!(value["metadata"]["backend"], "openai/gpt-4-turbo");
    }

    #[test]
    fn test_write_report_creates_dirs() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("results").join("final_diagnosis.md");

        write_report("content", &path).unwrap();

        assert_eq!(std::fs::read_to_string(path).unwrap(), "content");
    }

    #[test]
    fn test_console_summary() {
        let summary = console_summary(&failed_run());
        assert!(summary.contains("✓ Cardiologist"));
        assert!(summary.contains("✗ Psychologist (rate_limit: 429)"));
        assert!(summary.contains("Pipeline failed: synthesis failed: auth: 401"));
    }
}

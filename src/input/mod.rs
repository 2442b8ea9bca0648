//! Report discovery, loading and quality checks.

use crate::models::Document;
use anyhow::{Context, Result};
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;

/// Reports shorter than this are likely missing details.
pub const MIN_REPORT_LENGTH: usize = 100;

/// Keyword check only applies above this length.
const KEYWORD_CHECK_LENGTH: usize = 50;

pub const MEDICAL_KEYWORDS: &[&str] = &[
    "patient",
    "medical",
    "diagnosis",
    "symptoms",
    "treatment",
    "health",
    "hospital",
    "doctor",
    "condition",
    "disease",
    "exam",
    "test",
    "report",
    "clinical",
    "history",
    "age",
    "complaint",
    "vital",
];

const REPORT_EXTENSION: &str = "txt";

/// A report file found in the reports directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportFile {
    pub path: PathBuf,
    /// File size in bytes
    pub size: u64,
}

impl ReportFile {
    pub fn name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default()
    }
}

/// List `*.txt` reports directly inside `dir`, sorted by file name.
pub fn discover_reports(dir: &Path) -> Result<Vec<ReportFile>> {
    if !dir.is_dir() {
        anyhow::bail!("Reports directory not found: {}", dir.display());
    }

    let mut reports: Vec<ReportFile> = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(e) => Some(e),
            Err(err) => {
                debug!("Skipping unreadable entry: {}", err);
                None
            }
        })
        .filter(|e| e.file_type().is_file())
        .filter(|e| !e.file_name().to_string_lossy().starts_with('.'))
        .filter(|e| {
            e.path()
                .extension()
                .map(|ext| ext.eq_ignore_ascii_case(REPORT_EXTENSION))
                .unwrap_or(false)
        })
        .map(|e| ReportFile {
            size: e.metadata().map(|m| m.len()).unwrap_or(0),
            path: e.into_path(),
        })
        .collect();

    reports.sort_by(|a, b| a.path.cmp(&b.path));
    debug!("Found {} reports in {}", reports.len(), dir.display());
    Ok(reports)
}

/// Resolve which report to analyze.
///
/// An explicit path wins; relative paths that do not exist are looked up
/// in `reports_dir`. Without a path the first discovered report is used.
pub fn resolve_report(requested: Option<&Path>, reports_dir: &Path) -> Result<PathBuf> {
    match requested {
        Some(path) if path.as_os_str() == "-" => Ok(path.to_path_buf()),
        Some(path) if path.exists() => Ok(path.to_path_buf()),
        Some(path) if path.is_relative() && reports_dir.join(path).exists() => {
            Ok(reports_dir.join(path))
        }
        Some(path) => anyhow::bail!("Report not found: {}", path.display()),
        None => {
            let reports = discover_reports(reports_dir)?;
            let first = reports.into_iter().next().with_context(|| {
                format!("No .txt reports found in {}", reports_dir.display())
            })?;
            info!("Using report {}", first.path.display());
            Ok(first.path)
        }
    }
}

/// Load a report into a document. `-` reads standard input.
pub fn load_report(path: &Path) -> Result<Document> {
    if path.as_os_str() == "-" {
        let mut text = String::new();
        std::io::stdin()
            .read_to_string(&mut text)
            .context("Failed to read report from stdin")?;
        return Ok(Document::new(text, None)?);
    }

    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read report: {}", path.display()))?;
    let id = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string());

    Document::new(text, id).with_context(|| format!("Invalid report: {}", path.display()))
}

/// Non-fatal warnings about report content.
pub fn assess_report(text: &str) -> Vec<String> {
    let mut warnings = Vec::new();
    let length = text.trim().chars().count();

    if length < MIN_REPORT_LENGTH {
        warnings.push(format!(
            "Report is very short ({} characters); the analysis may lack detail",
            length
        ));
    }

    if length > KEYWORD_CHECK_LENGTH {
        let lower = text.to_lowercase();
        if !MEDICAL_KEYWORDS.iter().any(|k| lower.contains(k)) {
            warnings.push(
                "Report does not look like a medical report (no medical keywords found)"
                    .to_string(),
            );
        }
    }

    warnings
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn reports_dir() -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("b_case.txt"), "Patient B report").unwrap();
        fs::write(dir.path().join("a_case.txt"), "Patient A report").unwrap();
        fs::write(dir.path().join("notes.md"), "not a report").unwrap();
        fs::write(dir.path().join(".hidden.txt"), "hidden").unwrap();
        fs::create_dir(dir.path().join("nested")).unwrap();
        fs::write(dir.path().join("nested").join("c_case.txt"), "nested").unwrap();
        dir
    }

    #[test]
    fn test_discover_reports_sorted_top_level_txt() {
        let dir = reports_dir();
        let names: Vec<String> = discover_reports(dir.path())
            .unwrap()
            .iter()
            .map(|r| r.name())
            .collect();
        assert_eq!(names, vec!["a_case.txt", "b_case.txt"]);
    }

    #[test]
    fn test_discover_missing_dir() {
        assert!(discover_reports(Path::new("/definitely/not/here")).is_err());
    }

    #[test]
    fn test_resolve_report() {
        let dir = reports_dir();

        let first = resolve_report(None, dir.path()).unwrap();
        assert_eq!(first, dir.path().join("a_case.txt"));

        let relative = resolve_report(Some(Path::new("b_case.txt")), dir.path()).unwrap();
        assert_eq!(relative, dir.path().join("b_case.txt"));

        assert!(resolve_report(Some(Path::new("missing.txt")), dir.path()).is_err());
        assert_eq!(
            resolve_report(Some(Path::new("-")), dir.path()).unwrap(),
            PathBuf::from("-")
        );
    }

    #[test]
    fn test_resolve_empty_dir() {
        let dir = TempDir::new().unwrap();
        assert!(resolve_report(None, dir.path()).is_err());
    }

    #[test]
    fn test_load_report_uses_file_stem() {
        let dir = reports_dir();
        let doc = load_report(&dir.path().join("a_case.txt")).unwrap();
        assert_eq!(doc.id(), Some("a_case"));
        assert_eq!(doc.text(), "Patient A report");
    }

    #[test]
    fn test_load_blank_report_fails() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("blank.txt");
        fs::write(&path, "  \n\t ").unwrap();
        assert!(load_report(&path).is_err());
    }

    #[test]
    fn test_assess_report() {
        assert_eq!(assess_report("Patient has a cough.").len(), 1);

        let unrelated = "The quarterly revenue grew across all regions and the board approved the budget for next year.";
        let warnings = assess_report(unrelated);
        assert_eq!(warnings.len(), 2);
        assert!(warnings[1].contains("medical keywords"));

        let good = "Patient: 45-year-old male. Symptoms: intermittent chest pain and palpitations for two weeks. \
                    ECG normal, Holter monitor pending, blood tests within range.";
        assert!(assess_report(good).is_empty());
    }

    #[test]
    fn test_clinical_vocabulary_is_recognized() {
        let text = "Chief complaint: chest tightness at rest. Vital signs stable, age 52, \
                    seen by the doctor at the hospital for a clinical review.";
        assert!(assess_report(text).is_empty());
    }
}

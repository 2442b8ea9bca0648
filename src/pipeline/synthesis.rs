//! Fan-in: combine the successful specialist analyses into one diagnosis.

use crate::backend::AnalysisBackend;
use crate::error::{BackendError, TemplateError};
use crate::models::SpecialistOutcome;
use crate::roster::{PromptTemplate, REPORTS_PLACEHOLDER, SPECIALISTS_PLACEHOLDER};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynthesisEntry {
    pub role: String,
    pub name: String,
    pub text: String,
}

/// The successful outcomes handed to synthesis, in roster order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynthesisInput {
    entries: Vec<SynthesisEntry>,
}

impl SynthesisInput {
    /// Keep only succeeded outcomes. Returns `None` when nothing succeeded.
    ///
    /// `outcomes` must already be in roster order; a role seen twice keeps
    /// its first outcome.
    pub fn from_outcomes(outcomes: &[SpecialistOutcome]) -> Option<Self> {
        let mut seen = HashSet::new();
        let entries: Vec<SynthesisEntry> = outcomes
            .iter()
            .filter_map(|o| o.text().map(|text| (o, text)))
            .filter(|(o, _)| seen.insert(o.role.clone()))
            .map(|(o, text)| SynthesisEntry {
                role: o.role.clone(),
                name: o.name.clone(),
                text: text.to_string(),
            })
            .collect();

        if entries.is_empty() {
            None
        } else {
            Some(Self { entries })
        }
    }

    pub fn roles(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.role.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// `"<Name> Report: <text>"` blocks separated by a blank line.
    pub fn labeled_reports(&self) -> String {
        self.entries
            .iter()
            .map(|e| format!("{} Report: {}", e.name, e.text))
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    pub fn names(&self) -> String {
        self.entries
            .iter()
            .map(|e| e.name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

pub struct SynthesisTask {
    template: PromptTemplate,
    backend: Arc<dyn AnalysisBackend>,
}

impl SynthesisTask {
    pub fn new(template: PromptTemplate, backend: Arc<dyn AnalysisBackend>) -> Self {
        Self { template, backend }
    }

    /// Deterministic for a given input.
    pub fn render_prompt(&self, input: &SynthesisInput) -> Result<String, TemplateError> {
        let reports = input.labeled_reports();
        let names = input.names();
        self.template.render(&[
            (REPORTS_PLACEHOLDER, reports.as_str()),
            (SPECIALISTS_PLACEHOLDER, names.as_str()),
        ])
    }

    /// One backend call over the combined analyses.
    pub async fn run(&self, input: &SynthesisInput) -> Result<String, BackendError> {
        debug_assert!(!input.is_empty());
        let prompt = self
            .render_prompt(input)
            .map_err(|e| BackendError::unknown(e.to_string()))?;

        info!("Synthesizing {} specialist reports", input.len());

        match self.backend.generate(&prompt).await {
            Ok(text) => Ok(text),
            Err(e) => {
                warn!("Synthesis failed: {}", e);
                Err(e)
            }
        }
    }
}

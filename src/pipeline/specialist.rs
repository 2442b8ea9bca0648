//! One specialist analysis.

use crate::backend::AnalysisBackend;
use crate::error::{BackendError, TemplateError};
use crate::models::{Document, SpecialistOutcome};
use crate::roster::{Specialist, REPORT_PLACEHOLDER};
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{info, warn};

/// A roster entry bound to the shared document and backend.
///
/// `run` always yields an outcome; backend failures become failed outcomes
/// instead of errors.
pub struct SpecialistTask {
    specialist: Specialist,
    document: Arc<Document>,
    backend: Arc<dyn AnalysisBackend>,
}

impl SpecialistTask {
    pub fn new(
        specialist: Specialist,
        document: Arc<Document>,
        backend: Arc<dyn AnalysisBackend>,
    ) -> Self {
        Self {
            specialist,
            document,
            backend,
        }
    }

    pub fn role(&self) -> &str {
        &self.specialist.id
    }

    pub fn name(&self) -> &str {
        &self.specialist.name
    }

    pub fn render_prompt(&self) -> Result<String, TemplateError> {
        self.specialist
            .template
            .render(&[(REPORT_PLACEHOLDER, self.document.text())])
    }

    /// Render the prompt and call the backend exactly once.
    pub async fn run(&self) -> SpecialistOutcome {
        let start = Instant::now();
        let name = self.name();

        let prompt = match self.render_prompt() {
            Ok(p) => p,
            Err(e) => {
                warn!("{} prompt could not be rendered: {}", name, e);
                return SpecialistOutcome::failed(
                    self.role(),
                    name,
                    BackendError::unknown(e.to_string()),
                    start.elapsed(),
                );
            }
        };

        info!("{} is running...", name);

        match self.backend.generate(&prompt).await {
            Ok(text) => {
                info!("{} completed in {:.1}s", name, start.elapsed().as_secs_f64());
                SpecialistOutcome::succeeded(self.role(), name, text, start.elapsed())
            }
            Err(e) => {
                warn!("{} failed: {}", name, e);
                SpecialistOutcome::failed(self.role(), name, e, start.elapsed())
            }
        }
    }
}

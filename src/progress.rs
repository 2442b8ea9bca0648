//! Terminal progress display driven by pipeline events.

use crate::pipeline::PipelineEvent;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;

const SPINNER_TEMPLATE: &str = "{spinner:.green} [{elapsed_precise}] {prefix:.bold} {msg}";

fn spinner(multi: &MultiProgress, prefix: &str) -> ProgressBar {
    let pb = multi.add(ProgressBar::new_spinner());
    pb.set_style(
        ProgressStyle::default_spinner()
            .template(SPINNER_TEMPLATE)
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_prefix(prefix.to_string());
    pb.set_message("analyzing...");
    pb.enable_steady_tick(Duration::from_millis(120));
    pb
}

/// Render spinners until the event channel closes.
///
/// `names` maps role ids to display names.
pub fn spawn(names: Vec<(String, String)>, mut rx: UnboundedReceiver<PipelineEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let names: HashMap<String, String> = names.into_iter().collect();
        let multi = MultiProgress::new();
        let mut bars: HashMap<String, ProgressBar> = HashMap::new();
        let mut synthesis: Option<ProgressBar> = None;

        while let Some(event) = rx.recv().await {
            match event {
                PipelineEvent::SpecialistStarted { role } => {
                    let name = names.get(&role).cloned().unwrap_or_else(|| role.clone());
                    bars.insert(role, spinner(&multi, &name));
                }
                PipelineEvent::SpecialistFinished {
                    role,
                    succeeded,
                    failure,
                    elapsed_ms,
                } => {
                    let pb = match bars.remove(&role) {
                        Some(pb) => pb,
                        None => spinner(&multi, names.get(&role).unwrap_or(&role)),
                    };
                    let secs = elapsed_ms as f64 / 1000.0;
                    match (succeeded, failure) {
                        (true, _) => pb.finish_with_message(format!("✓ done in {:.1}s", secs)),
                        (false, Some(kind)) => pb.finish_with_message(format!("✗ {}", kind)),
                        (false, None) => pb.finish_with_message("✗ failed"),
                    }
                }
                PipelineEvent::SynthesisStarted { contributors } => {
                    let pb = spinner(&multi, "Team");
                    pb.set_message(format!("combining {} reports...", contributors.len()));
                    synthesis = Some(pb);
                }
                PipelineEvent::SynthesisFinished { succeeded } => {
                    if let Some(pb) = synthesis.take() {
                        if succeeded {
                            pb.finish_with_message("✓ diagnosis ready");
                        } else {
                            pb.finish_with_message("✗ synthesis failed");
                        }
                    }
                }
                _ => {}
            }
        }

        for (_, pb) in bars.drain() {
            pb.abandon_with_message("✗ stopped");
        }
    })
}

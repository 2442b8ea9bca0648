//! The two-phase analysis pipeline.
//!
//! `Init -> RunningSpecialists -> Synthesizing -> Done`, with `Failed` as
//! the alternate terminal state. A run proceeds to synthesis when at least
//! one specialist succeeded and fails when none did.

pub mod coordinator;
pub mod events;
pub mod specialist;
pub mod synthesis;

pub use coordinator::{BarrierStatus, ConcurrencyCoordinator, CoordinatorSettings};
pub use events::{EventSink, PipelineEvent};
pub use synthesis::{SynthesisInput, SynthesisTask};

use crate::backend::AnalysisBackend;
use crate::error::{BackendError, FailureKind, PipelineError, RoleFailure};
use crate::models::{Document, FinalResult, PipelineState, SpecialistOutcome};
use crate::roster::{PromptTemplate, Roster};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Record of one pipeline run, successful or not.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineRun {
    pub document_id: Option<String>,
    pub state: PipelineState,
    pub barrier: Option<BarrierStatus>,
    /// Specialist outcomes in roster order; retained on failure.
    pub outcomes: Vec<SpecialistOutcome>,
    pub result: Option<FinalResult>,
    pub error: Option<PipelineError>,
    /// Every state the run passed through, starting with `Init`.
    pub history: Vec<PipelineState>,
}

impl PipelineRun {
    pub fn is_done(&self) -> bool {
        self.state == PipelineState::Done
    }

    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }
}

/// Current state plus the transitions taken so far.
struct StateTracker {
    current: PipelineState,
    history: Vec<PipelineState>,
    events: EventSink,
}

impl StateTracker {
    fn new(events: EventSink) -> Self {
        Self {
            current: PipelineState::Init,
            history: vec![PipelineState::Init],
            events,
        }
    }

    fn advance(&mut self, next: PipelineState) {
        debug_assert!(!self.current.is_terminal(), "run already finished");
        debug_assert!(
            self.current.can_transition_to(next),
            "invalid transition {} -> {}",
            self.current,
            next
        );
        info!("Pipeline {} -> {}", self.current, next);
        self.events.emit(PipelineEvent::StateChanged {
            from: self.current,
            to: next,
        });
        self.current = next;
        self.history.push(next);
    }
}

pub struct Pipeline {
    coordinator: ConcurrencyCoordinator,
    synthesis: PromptTemplate,
    backend: Arc<dyn AnalysisBackend>,
    task_timeout: Duration,
    events: EventSink,
}

impl Pipeline {
    pub fn new(
        roster: Roster,
        synthesis: PromptTemplate,
        backend: Arc<dyn AnalysisBackend>,
        settings: CoordinatorSettings,
    ) -> Result<Self, PipelineError> {
        let task_timeout = settings.task_timeout;
        let coordinator =
            ConcurrencyCoordinator::new(roster, backend.clone(), settings, EventSink::detached())?;

        Ok(Self {
            coordinator,
            synthesis,
            backend,
            task_timeout,
            events: EventSink::detached(),
        })
    }

    /// Send progress events to `events`.
    pub fn with_events(mut self, events: EventSink) -> Self {
        self.coordinator = self.coordinator.with_events(events.clone());
        self.events = events;
        self
    }

    pub fn roster(&self) -> &Roster {
        self.coordinator.roster()
    }

    /// Run the full pipeline over `document`.
    ///
    /// Never returns early with an error: every outcome lands in the
    /// returned run record.
    pub async fn run(&self, document: Document, cancel: CancellationToken) -> PipelineRun {
        let document = Arc::new(document);
        let document_id = document.id().map(str::to_string);
        let mut state = StateTracker::new(self.events.clone());

        self.events.emit(PipelineEvent::RunStarted {
            document_id: document_id.clone(),
            roles: self.roster().ids().iter().map(|s| s.to_string()).collect(),
        });

        state.advance(PipelineState::RunningSpecialists);
        let barrier = self.coordinator.run(document, &cancel).await;
        let outcomes = barrier.outcomes.clone();

        let mut run = PipelineRun {
            document_id: document_id.clone(),
            state: state.current,
            barrier: Some(barrier.status),
            outcomes,
            result: None,
            error: None,
            history: Vec::new(),
        };

        if barrier.status == BarrierStatus::Aborted {
            let completed = barrier
                .outcomes
                .iter()
                .filter(|o| o.failure_kind() != Some(FailureKind::Cancelled))
                .count();
            return self.fail(
                run,
                state,
                PipelineError::Aborted {
                    completed,
                    total: barrier.outcomes.len(),
                },
            );
        }

        let input = match SynthesisInput::from_outcomes(&barrier.outcomes) {
            Some(input) => input,
            None => {
                let failures = barrier
                    .outcomes
                    .iter()
                    .filter_map(|o| {
                        o.failure().map(|reason| RoleFailure {
                            role: o.role.clone(),
                            kind: reason.kind,
                            message: reason.message.clone(),
                        })
                    })
                    .collect();
                return self.fail(run, state, PipelineError::Aggregation { failures });
            }
        };

        state.advance(PipelineState::Synthesizing);
        let contributors = input.roles();
        self.events.emit(PipelineEvent::SynthesisStarted {
            contributors: contributors.clone(),
        });

        let task = SynthesisTask::new(self.synthesis.clone(), self.backend.clone());
        let synthesized = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(BackendError::cancelled("run aborted by caller during synthesis")),
            result = tokio::time::timeout(self.task_timeout, task.run(&input)) => match result {
                Ok(result) => result,
                Err(_) => Err(BackendError::timeout(format!(
                    "synthesis exceeded the {}s timeout",
                    self.task_timeout.as_secs()
                ))),
            },
        };

        self.events.emit(PipelineEvent::SynthesisFinished {
            succeeded: synthesized.is_ok(),
        });

        match synthesized {
            Ok(text) => {
                state.advance(PipelineState::Done);
                run.result = Some(FinalResult {
                    document_id,
                    text,
                    partial: contributors.len() < self.roster().len(),
                    contributing_roles: contributors,
                    status: PipelineState::Done,
                    backend: self.backend.label(),
                    completed_at: chrono::Utc::now(),
                });
                run.state = state.current;
                run.history = state.history;
                run
            }
            Err(source) => self.fail(run, state, PipelineError::Synthesis { source }),
        }
    }

    fn fail(&self, mut run: PipelineRun, mut state: StateTracker, err: PipelineError) -> PipelineRun {
        error!("Pipeline failed: {}", err);
        state.advance(PipelineState::Failed);
        run.state = state.current;
        run.history = state.history;
        run.error = Some(err);
        run
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::testing::{Reply, ScriptedBackend};
    use crate::roster::{synthesis_template, Specialist};

    const SYNTH: &str = "SYNTH {specialists}\n{specialist_reports}";

    fn roster(ids: &[&str]) -> Roster {
        Roster::new(
            ids.iter()
                .map(|id| Specialist::new(id, &format!("Dr {}", id), &format!("ROLE-{} {{medical_report}}", id)).unwrap())
                .collect(),
        )
        .unwrap()
    }

    fn pipeline(ids: &[&str], backend: Arc<ScriptedBackend>, timeout_secs: u64) -> Pipeline {
        let settings = CoordinatorSettings {
            task_timeout: Duration::from_secs(timeout_secs),
            ..CoordinatorSettings::default()
        };
        Pipeline::new(roster(ids), synthesis_template(Some(SYNTH)).unwrap(), backend, settings).unwrap()
    }

    fn document() -> Document {
        Document::new("Patient reports palpitations and shortness of breath.", Some("case-1".to_string()))
            .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_all_succeed() {
        let backend = Arc::new(
            ScriptedBackend::new()
                .on("ROLE-a", Reply::text("A says"))
                .on("ROLE-b", Reply::text("B says"))
                .on("ROLE-c", Reply::text("C says"))
                .on("SYNTH", Reply::text("team view")),
        );
        let p = pipeline(&["a", "b", "c"], backend.clone(), 60);

        let run = p.run(document(), CancellationToken::new()).await;

        assert!(run.is_done());
        let result = run.result.unwrap();
        assert_eq!(result.text, "team view");
        assert_eq!(result.contributing_roles, vec!["a", "b", "c"]);
        assert!(!result.partial);
        assert_eq!(result.document_id.as_deref(), Some("case-1"));
        assert_eq!(
            run.history,
            vec![
                PipelineState::Init,
                PipelineState::RunningSpecialists,
                PipelineState::Synthesizing,
                PipelineState::Done
            ]
        );

        let synth_prompt = backend
            .prompts()
            .into_iter()
            .find(|p| p.starts_with("SYNTH"))
            .unwrap();
        assert_eq!(
            synth_prompt,
            "SYNTH Dr a, Dr b, Dr c\nDr a Report: A says\n\nDr b Report: B says\n\nDr c Report: C says"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_timeout_gives_partial_result() {
        let backend = Arc::new(
            ScriptedBackend::new()
                .on("ROLE-a", Reply::text("A says"))
                .on("ROLE-b", Reply::text("B says"))
                .on("ROLE-c", Reply::hang())
                .on("SYNTH", Reply::text("team view")),
        );
        let p = pipeline(&["a", "b", "c"], backend.clone(), 30);

        let run = p.run(document(), CancellationToken::new()).await;

        assert_eq!(run.state, PipelineState::Done);
        assert_eq!(run.outcomes[2].failure_kind(), Some(FailureKind::Timeout));
        let result = run.result.unwrap();
        assert_eq!(result.contributing_roles, vec!["a", "b"]);
        assert!(result.partial);
        assert_eq!(backend.calls_matching("SYNTH"), 1);
        assert!(!backend.prompts().iter().any(|p| p.starts_with("SYNTH") && p.contains("Dr c")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_all_timeouts_fail_without_synthesis() {
        let backend = Arc::new(
            ScriptedBackend::new()
                .on("ROLE", Reply::hang())
                .on("SYNTH", Reply::text("never")),
        );
        let p = pipeline(&["a", "b", "c"], backend.clone(), 30);

        let run = p.run(document(), CancellationToken::new()).await;

        assert_eq!(run.state, PipelineState::Failed);
        assert!(run.result.is_none());
        assert_eq!(backend.calls_matching("SYNTH"), 0);
        match run.error {
            Some(PipelineError::Aggregation { failures }) => {
                assert_eq!(failures.len(), 3);
                assert!(failures.iter().all(|f| f.kind == FailureKind::Timeout));
            }
            other => panic!("expected aggregation error, got {:?}", other),
        }
        assert_eq!(run.outcomes.len(), 3);
        assert_eq!(
            run.history,
            vec![
                PipelineState::Init,
                PipelineState::RunningSpecialists,
                PipelineState::Failed
            ]
        );
    }

    #[tokio::test]
    async fn test_synthesis_failure() {
        let backend = Arc::new(
            ScriptedBackend::new()
                .on("ROLE", Reply::text("fine"))
                .on("SYNTH", Reply::fail(FailureKind::RateLimit)),
        );
        let p = pipeline(&["a", "b"], backend, 30);

        let run = p.run(document(), CancellationToken::new()).await;

        assert_eq!(run.state, PipelineState::Failed);
        assert_eq!(run.succeeded(), 2);
        assert!(matches!(
            run.error,
            Some(PipelineError::Synthesis { ref source }) if source.kind == FailureKind::RateLimit
        ));
    }

    #[tokio::test]
    async fn test_single_specialist_roster() {
        let backend = Arc::new(
            ScriptedBackend::new()
                .on("ROLE-solo", Reply::text("solo view"))
                .on("SYNTH", Reply::text("summary")),
        );
        let p = pipeline(&["solo"], backend, 30);

        let run = p.run(document(), CancellationToken::new()).await;

        let result = run.result.unwrap();
        assert_eq!(result.contributing_roles, vec!["solo"]);
        assert!(!result.partial);
    }

    #[tokio::test]
    async fn test_repeated_runs_give_identical_synthesis_prompts() {
        let backend = Arc::new(
            ScriptedBackend::new()
                .on("ROLE", Reply::text("same"))
                .on("SYNTH", Reply::text("summary")),
        );
        let p = pipeline(&["a", "b"], backend.clone(), 30);

        p.run(document(), CancellationToken::new()).await;
        p.run(document(), CancellationToken::new()).await;

        let synth: Vec<String> = backend
            .prompts()
            .into_iter()
            .filter(|p| p.starts_with("SYNTH"))
            .collect();
        assert_eq!(synth.len(), 2);
        assert_eq!(synth[0], synth[1]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_specialists_aborts() {
        let backend = Arc::new(
            ScriptedBackend::new()
                .on("ROLE-a", Reply::text("A says"))
                .on("ROLE-b", Reply::hang())
                .on("SYNTH", Reply::text("never")),
        );
        let p = pipeline(&["a", "b"], backend.clone(), 600);

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(2)).await;
            trigger.cancel();
        });

        let run = p.run(document(), cancel).await;

        assert_eq!(run.state, PipelineState::Failed);
        assert_eq!(run.barrier, Some(BarrierStatus::Aborted));
        assert!(matches!(
            run.error,
            Some(PipelineError::Aborted { completed: 1, total: 2 })
        ));
        assert_eq!(run.outcomes[0].text(), Some("A says"));
        assert_eq!(backend.calls_matching("SYNTH"), 0);
    }

    #[tokio::test]
    async fn test_event_sequence() {
        let backend = Arc::new(
            ScriptedBackend::new()
                .on("ROLE", Reply::text("fine"))
                .on("SYNTH", Reply::text("summary")),
        );
        let (sink, mut rx) = EventSink::channel();
        let p = pipeline(&["a"], backend, 30).with_events(sink);

        p.run(document(), CancellationToken::new()).await;
        drop(p);

        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }

        assert!(matches!(events.first(), Some(PipelineEvent::RunStarted { .. })));
        assert!(events.contains(&PipelineEvent::SpecialistStarted {
            role: "a".to_string()
        }));
        assert!(events.contains(&PipelineEvent::SynthesisStarted {
            contributors: vec!["a".to_string()]
        }));
        assert_eq!(
            events.last(),
            Some(&PipelineEvent::StateChanged {
                from: PipelineState::Synthesizing,
                to: PipelineState::Done
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_synthesis_timeout_fails_run() {
        let backend = Arc::new(
            ScriptedBackend::new()
                .on("ROLE", Reply::text("fine"))
                .on("SYNTH", Reply::hang()),
        );
        let p = pipeline(&["a", "b"], backend.clone(), 30);

        let start = tokio::time::Instant::now();
        let run = p.run(document(), CancellationToken::new()).await;

        assert!(start.elapsed() <= Duration::from_secs(31));
        assert_eq!(run.state, PipelineState::Failed);
        assert_eq!(run.barrier, Some(BarrierStatus::Complete));
        assert_eq!(run.succeeded(), 2);
        assert!(matches!(
            run.error,
            Some(PipelineError::Synthesis { ref source }) if source.kind == FailureKind::Timeout
        ));
        assert_eq!(
            run.history,
            vec![
                PipelineState::Init,
                PipelineState::RunningSpecialists,
                PipelineState::Synthesizing,
                PipelineState::Failed
            ]
        );
        assert_eq!(backend.calls_matching("SYNTH"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_synthesis() {
        let backend = Arc::new(
            ScriptedBackend::new()
                .on("ROLE", Reply::text("fine").after(Duration::from_secs(1)))
                .on("SYNTH", Reply::hang()),
        );
        let p = pipeline(&["a", "b"], backend, 600);

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            trigger.cancel();
        });

        let start = tokio::time::Instant::now();
        let run = p.run(document(), cancel).await;

        assert!(start.elapsed() < Duration::from_secs(6));
        assert_eq!(run.state, PipelineState::Failed);
        assert_eq!(run.barrier, Some(BarrierStatus::Complete));
        assert_eq!(run.succeeded(), 2);
        assert!(run.result.is_none());
        assert!(matches!(
            run.error,
            Some(PipelineError::Synthesis { ref source }) if source.kind == FailureKind::Cancelled
        ));
    }

    #[test]
    fn test_pool_config_error_surfaces() {
        let settings = CoordinatorSettings {
            pool_size: Some(1),
            ..CoordinatorSettings::default()
        };
        let result = Pipeline::new(
            roster(&["a", "b"]),
            synthesis_template(None).unwrap(),
            Arc::new(ScriptedBackend::new()),
            settings,
        );
        assert!(matches!(result, Err(PipelineError::Config { .. })));
    }
}

//! Concurrent specialist fan-out with a full-barrier join.
//!
//! All roster entries start together on a bounded pool. The coordinator
//! waits for every task to reach a terminal state, or for the overall
//! deadline, or for caller cancellation, whichever comes first. Outcomes
//! are returned in roster order regardless of completion order.

use super::events::{EventSink, PipelineEvent};
use super::specialist::SpecialistTask;
use crate::backend::AnalysisBackend;
use crate::error::{BackendError, PipelineError};
use crate::models::{Document, SpecialistOutcome};
use crate::roster::Roster;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// How the barrier ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BarrierStatus {
    /// Every task reached a terminal state on its own.
    Complete,
    /// The overall deadline cut unfinished tasks short.
    DeadlineExceeded,
    /// The caller cancelled the run.
    Aborted,
}

/// Timing and pool settings for one coordinator.
#[derive(Debug, Clone)]
pub struct CoordinatorSettings {
    pub task_timeout: Duration,
    pub deadline: Option<Duration>,
    /// Defaults to the roster size.
    pub pool_size: Option<usize>,
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        Self {
            task_timeout: Duration::from_secs(300),
            deadline: None,
            pool_size: None,
        }
    }
}

/// Outcomes of one barrier, in roster order.
#[derive(Debug, Clone)]
pub struct BarrierReport {
    pub status: BarrierStatus,
    pub outcomes: Vec<SpecialistOutcome>,
}

impl BarrierReport {
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }
}

/// One slot per roster entry, each filled at most once.
#[derive(Debug)]
struct OutcomeSlots {
    slots: Vec<Option<SpecialistOutcome>>,
}

impl OutcomeSlots {
    fn new(len: usize) -> Self {
        Self {
            slots: vec![None; len],
        }
    }

    /// Returns false if the slot was already filled or does not exist.
    fn fill(&mut self, index: usize, outcome: SpecialistOutcome) -> bool {
        match self.slots.get_mut(index) {
            Some(slot) if slot.is_none() => {
                *slot = Some(outcome);
                true
            }
            _ => false,
        }
    }

    fn filled(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    fn empty_indices(&self) -> Vec<usize> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, s)| s.is_none())
            .map(|(i, _)| i)
            .collect()
    }

    fn into_outcomes(self) -> Vec<SpecialistOutcome> {
        self.slots.into_iter().flatten().collect()
    }
}

pub struct ConcurrencyCoordinator {
    roster: Roster,
    backend: Arc<dyn AnalysisBackend>,
    task_timeout: Duration,
    deadline: Option<Duration>,
    pool_size: usize,
    events: EventSink,
}

impl ConcurrencyCoordinator {
    pub fn new(
        roster: Roster,
        backend: Arc<dyn AnalysisBackend>,
        settings: CoordinatorSettings,
        events: EventSink,
    ) -> Result<Self, PipelineError> {
        if roster.is_empty() {
            return Err(PipelineError::config("specialist roster is empty"));
        }
        let pool_size = settings.pool_size.unwrap_or(roster.len());
        if pool_size < roster.len() {
            return Err(PipelineError::config(format!(
                "pool size {} is smaller than the roster of {} specialists",
                pool_size,
                roster.len()
            )));
        }
        if settings.task_timeout.is_zero() {
            return Err(PipelineError::config("specialist timeout must be positive"));
        }

        Ok(Self {
            roster,
            backend,
            task_timeout: settings.task_timeout,
            deadline: settings.deadline,
            pool_size,
            events,
        })
    }

    pub fn with_events(mut self, events: EventSink) -> Self {
        self.events = events;
        self
    }

    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    /// Run every specialist against `document` and wait for all of them.
    pub async fn run(&self, document: Arc<Document>, cancel: &CancellationToken) -> BarrierReport {
        let total = self.roster.len();
        let started = Instant::now();
        let pool = Arc::new(Semaphore::new(self.pool_size));
        let mut slots = OutcomeSlots::new(total);
        let mut join_set = JoinSet::new();

        info!(
            "Running {} specialists in parallel (pool {}, timeout {}s)",
            total,
            self.pool_size,
            self.task_timeout.as_secs()
        );

        for (index, specialist) in self.roster.iter().enumerate() {
            let task = SpecialistTask::new(specialist.clone(), document.clone(), self.backend.clone());
            let pool = pool.clone();
            let events = self.events.clone();
            let timeout = self.task_timeout;

            join_set.spawn(async move {
                let bounded = async {
                    let _permit = match pool.acquire_owned().await {
                        Ok(permit) => permit,
                        Err(_) => {
                            return SpecialistOutcome::failed(
                                task.role(),
                                task.name(),
                                BackendError::unknown("worker pool closed"),
                                Duration::ZERO,
                            )
                        }
                    };
                    events.emit(PipelineEvent::SpecialistStarted {
                        role: task.role().to_string(),
                    });
                    task.run().await
                };

                let outcome = match tokio::time::timeout(timeout, bounded).await {
                    Ok(outcome) => outcome,
                    Err(_) => {
                        warn!("{} exceeded its {}s timeout", task.name(), timeout.as_secs());
                        SpecialistOutcome::failed(
                            task.role(),
                            task.name(),
                            BackendError::timeout(format!(
                                "exceeded the {}s specialist timeout",
                                timeout.as_secs()
                            )),
                            timeout,
                        )
                    }
                };
                (index, outcome)
            });
        }

        let deadline = self.deadline.map(|d| started + d);

        let status = loop {
            let deadline_reached = async {
                match deadline {
                    Some(at) => tokio::time::sleep_until(at).await,
                    None => std::future::pending::<()>().await,
                }
            };

            tokio::select! {
                biased;
                _ = cancel.cancelled() => break BarrierStatus::Aborted,
                _ = deadline_reached => break BarrierStatus::DeadlineExceeded,
                joined = join_set.join_next() => match joined {
                    None => break BarrierStatus::Complete,
                    Some(Ok((index, outcome))) => self.record(&mut slots, index, outcome),
                    Some(Err(e)) => warn!("Specialist task ended abnormally: {}", e),
                },
            }
        };

        if !join_set.is_empty() {
            debug!("Stopping {} unfinished specialists", join_set.len());
            join_set.abort_all();
            while let Some(joined) = join_set.join_next().await {
                // A task may finish between the barrier decision and the abort.
                if let Ok((index, outcome)) = joined {
                    self.record(&mut slots, index, outcome);
                }
            }
        }

        let elapsed = started.elapsed();
        for index in slots.empty_indices() {
            let Some(specialist) = self.roster.iter().nth(index) else {
                continue;
            };
            let reason = match status {
                BarrierStatus::Aborted => BackendError::cancelled("run aborted by caller"),
                BarrierStatus::DeadlineExceeded => BackendError::timeout(format!(
                    "cancelled at the {}s overall deadline",
                    self.deadline.map(|d| d.as_secs()).unwrap_or_default()
                )),
                BarrierStatus::Complete => {
                    BackendError::unknown("specialist task ended without an outcome")
                }
            };
            warn!("{} did not finish: {}", specialist.name, reason);
            let outcome = SpecialistOutcome::failed(&specialist.id, &specialist.name, reason, elapsed);
            self.record(&mut slots, index, outcome);
        }

        debug_assert_eq!(slots.filled(), total);
        let report = BarrierReport {
            status,
            outcomes: slots.into_outcomes(),
        };

        info!(
            "Specialists finished ({:?}): {} succeeded, {} failed in {:.1}s",
            report.status,
            report.succeeded(),
            report.failed(),
            elapsed.as_secs_f64()
        );
        self.events.emit(PipelineEvent::BarrierComplete {
            status: report.status,
            succeeded: report.succeeded(),
            failed: report.failed(),
        });

        report
    }

    fn record(&self, slots: &mut OutcomeSlots, index: usize, outcome: SpecialistOutcome) {
        let event = PipelineEvent::SpecialistFinished {
            role: outcome.role.clone(),
            succeeded: outcome.is_success(),
            failure: outcome.failure_kind(),
            elapsed_ms: outcome.elapsed.as_millis() as u64,
        };
        if slots.fill(index, outcome) {
            self.events.emit(event);
        } else {
            warn!("Ignoring duplicate outcome for specialist #{}", index);
        }
    }
}

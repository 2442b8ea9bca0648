//! Progress events for an optional external observer.
//!
//! Events are fire-and-forget: a missing or dropped receiver never affects
//! the run.

use super::coordinator::BarrierStatus;
use crate::error::FailureKind;
use crate::models::PipelineState;
use serde::Serialize;
use tokio::sync::mpsc;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PipelineEvent {
    RunStarted {
        document_id: Option<String>,
        roles: Vec<String>,
    },
    StateChanged {
        from: PipelineState,
        to: PipelineState,
    },
    SpecialistStarted {
        role: String,
    },
    SpecialistFinished {
        role: String,
        succeeded: bool,
        failure: Option<FailureKind>,
        elapsed_ms: u64,
    },
    BarrierComplete {
        status: BarrierStatus,
        succeeded: usize,
        failed: usize,
    },
    SynthesisStarted {
        contributors: Vec<String>,
    },
    SynthesisFinished {
        succeeded: bool,
    },
}

/// Sending half of the progress channel; a no-op when detached.
#[derive(Debug, Clone, Default)]
pub struct EventSink {
    tx: Option<mpsc::UnboundedSender<PipelineEvent>>,
}

impl EventSink {
    pub fn detached() -> Self {
        Self { tx: None }
    }

    pub fn channel() -> (Self, mpsc::UnboundedReceiver<PipelineEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx: Some(tx) }, rx)
    }

    pub fn emit(&self, event: PipelineEvent) {
        if let Some(ref tx) = self.tx {
            let _ = tx.send(event);
        }
    }
}

//! Adaptive ask/tell loop (the run engine for agent-driven experiments).
//!
//! # State Machine
//!
//! ```text
//!   Init ──run()──> Running ──budget spent──────────> Done(Success)
//!                      │    ──cancel requested──────> Done(Cancelled)
//!                      │    ──bad agent output──────> Done(Failed(AgentProtocol))
//!                      └─── ──acquisition failed x2─> Done(Failed(Measurement))
//! ```
//!
//! Each iteration asks the agent for a sample, measures it (retrying the same
//! sample once on failure), folds the result into that sample's
//! [`MeasurementRecord`], appends it to the trace, tells the agent, and spends
//! one shot of budget. Exactly one measurement is in flight at a time and
//! records change only after the acquisition call returns.
//!
//! `Done` is terminal. A finished loop cannot be restarted; build a new one.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, watch};
use tracing::{debug, error, info, info_span, Instrument};

use super::document::{Document, EventDoc, StartDoc, StopDoc};
use crate::agent::{Agent, AgentKind};
use crate::error::{AgentError, LoopError, RunFailure};
use crate::error_recovery::{measure_with_retry, RetryPolicy};
use crate::measurement::{
    Acquisition, ExperimentTrace, MeasurementRecord, Observation, Quality, SampleIndex,
};

const DOCUMENT_CHANNEL_CAPACITY: usize = 1024;

/// Lifecycle of an [`AdaptiveLoop`].
#[derive(Debug, Clone, PartialEq)]
pub enum LoopState {
    /// Constructed, `run()` not yet called.
    Init,
    /// Inside `run()`.
    Running,
    /// Terminal.
    Done(RunStatus),
}

/// How a run ended.
///
/// Serialized as `{"status": "failed", "reason": {...}}`, with `reason`
/// present only for failures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum RunStatus {
    /// The whole budget was spent.
    Success,
    /// Stopped through a [`CancelHandle`].
    Cancelled,
    /// Stopped by an agent or measurement failure.
    Failed(RunFailure),
}

impl RunStatus {
    /// Whether the run spent its whole budget.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, RunStatus::Success)
    }

    /// Exit status string used in the stop document.
    #[must_use]
    pub fn exit_status(&self) -> &'static str {
        match self {
            RunStatus::Success => "success",
            RunStatus::Cancelled => "abort",
            RunStatus::Failed(_) => "fail",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunStatus::Success => f.write_str("success"),
            RunStatus::Cancelled => f.write_str("cancelled"),
            RunStatus::Failed(reason) => write!(f, "failed: {reason}"),
        }
    }
}

/// Everything a finished run produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    /// Uid of the run's start document.
    pub run_uid: String,
    /// Terminal status.
    pub status: RunStatus,
    /// Every successful shot, in order.
    pub trace: ExperimentTrace,
    /// Per-sample bookkeeping at the end of the run.
    pub records: Vec<MeasurementRecord>,
}

/// Requests cooperative cancellation of a run.
///
/// Cancellation is honored at the next iteration boundary; a measurement
/// already in flight always completes and is recorded.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    sender: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    /// Ask the run to stop at the next iteration boundary.
    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }

    /// Whether cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.sender.borrow()
    }
}

/// Drives an agent against an acquisition backend until the budget is spent.
pub struct AdaptiveLoop<A, M> {
    agent: A,
    acquisition: M,
    sample_count: usize,
    max_shots: u64,
    remaining: u64,
    retry: RetryPolicy,
    records: Vec<MeasurementRecord>,
    trace: ExperimentTrace,
    state: LoopState,
    metadata: HashMap<String, String>,
    cancel: Arc<watch::Sender<bool>>,
    cancel_rx: watch::Receiver<bool>,
    documents: broadcast::Sender<Document>,
}

impl<A, M> fmt::Debug for AdaptiveLoop<A, M>
where
    A: Agent,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdaptiveLoop")
            .field("agent", &self.agent.kind())
            .field("sample_count", &self.sample_count)
            .field("max_shots", &self.max_shots)
            .field("remaining", &self.remaining)
            .field("state", &self.state)
            .finish()
    }
}

impl<A, M> AdaptiveLoop<A, M>
where
    A: Agent,
    M: Acquisition,
{
    /// Create a loop over `sample_count` samples with a budget of `max_shots`.
    pub fn new(
        agent: A,
        sample_count: usize,
        max_shots: u64,
        acquisition: M,
    ) -> Result<Self, LoopError> {
        if sample_count == 0 {
            return Err(LoopError::InvalidSampleCount);
        }
        let (cancel, cancel_rx) = watch::channel(false);
        let (documents, _) = broadcast::channel(DOCUMENT_CHANNEL_CAPACITY);
        Ok(Self {
            agent,
            acquisition,
            sample_count,
            max_shots,
            remaining: max_shots,
            retry: RetryPolicy::default(),
            records: vec![MeasurementRecord::default(); sample_count],
            trace: ExperimentTrace::new(),
            state: LoopState::Init,
            metadata: HashMap::new(),
            cancel: Arc::new(cancel),
            cancel_rx,
            documents,
        })
    }

    /// Replace the default single-retry policy.
    #[must_use]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Attach metadata to the run's start document.
    #[must_use]
    pub fn with_metadata(mut self, key: &str, value: &str) -> Self {
        self.metadata.insert(key.to_string(), value.to_string());
        self
    }

    /// Handle for cancelling the run from another task.
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            sender: Arc::clone(&self.cancel),
        }
    }

    /// Subscribe to the run's document stream. Subscribe before `run()` to
    /// see the start document.
    pub fn subscribe(&self) -> broadcast::Receiver<Document> {
        self.documents.subscribe()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> &LoopState {
        &self.state
    }

    /// Kind of the agent driving this loop.
    pub fn agent_kind(&self) -> AgentKind {
        self.agent.kind()
    }

    /// Samples on the changer.
    pub fn sample_count(&self) -> usize {
        self.sample_count
    }

    /// Budget the loop was built with.
    pub fn max_shots(&self) -> u64 {
        self.max_shots
    }

    /// Budget not yet spent.
    pub fn remaining_shots(&self) -> u64 {
        self.remaining
    }

    /// Per-sample records, indexed by sample.
    pub fn records(&self) -> &[MeasurementRecord] {
        &self.records
    }

    /// Successful shots per sample.
    pub fn shot_counts(&self) -> Vec<u64> {
        self.records.iter().map(|r| r.shot_count).collect()
    }

    /// Running mean quality per sample.
    pub fn quality_estimates(&self) -> Vec<Quality> {
        self.records.iter().map(|r| r.quality_estimate).collect()
    }

    /// Trace so far.
    pub fn trace(&self) -> &ExperimentTrace {
        &self.trace
    }

    /// The acquisition backend this loop drives.
    pub fn acquisition(&self) -> &M {
        &self.acquisition
    }

    /// Execute the run to a terminal state.
    ///
    /// Failures during the run are reported through [`RunReport::status`]
    /// together with the partial trace; the `Err` case is reserved for
    /// calling `run` on a loop that has already been started.
    pub async fn run(&mut self) -> Result<RunReport, LoopError> {
        if self.state != LoopState::Init {
            return Err(LoopError::AlreadyFinished);
        }
        self.state = LoopState::Running;

        let mut start = StartDoc::new(self.agent.kind(), self.sample_count, self.max_shots);
        start.metadata = self.metadata.clone();
        let run_uid = start.uid.clone();
        self.publish(Document::Start(start));

        let span = info_span!("adaptive_run", run_uid = %run_uid, agent = %self.agent.kind());
        info!(
            parent: &span,
            sample_count = self.sample_count,
            max_shots = self.max_shots,
            "Starting adaptive run"
        );

        let status = self.drive(&run_uid).instrument(span.clone()).await;

        let shots = self.trace.len() as u64;
        let reason = match &status {
            RunStatus::Success => String::new(),
            RunStatus::Cancelled => "cancelled".to_string(),
            RunStatus::Failed(reason) => reason.to_string(),
        };
        self.publish(Document::Stop(StopDoc::new(
            &run_uid,
            status.exit_status(),
            &reason,
            shots,
        )));

        match &status {
            RunStatus::Failed(reason) => {
                error!(parent: &span, shots, error = %reason, "Adaptive run failed")
            }
            _ => info!(parent: &span, shots, status = %status, "Adaptive run finished"),
        }

        self.state = LoopState::Done(status.clone());
        Ok(RunReport {
            run_uid,
            status,
            trace: self.trace.clone(),
            records: self.records.clone(),
        })
    }

    async fn drive(&mut self, run_uid: &str) -> RunStatus {
        let mut last: Option<Observation> = None;

        while self.remaining > 0 {
            if *self.cancel_rx.borrow() {
                info!(remaining = self.remaining, "Cancellation requested");
                return RunStatus::Cancelled;
            }

            let sample = match self.agent.ask(last) {
                Ok(sample) if sample < self.sample_count => sample,
                Ok(index) => {
                    return RunStatus::Failed(RunFailure::AgentProtocol(
                        AgentError::SampleOutOfRange {
                            index,
                            sample_count: self.sample_count,
                        },
                    ))
                }
                Err(err) => return RunStatus::Failed(RunFailure::AgentProtocol(err)),
            };

            let record = &mut self.records[sample];
            let measured = measure_with_retry(&mut self.acquisition, sample, &self.retry, |_| {
                record.record_failure()
            })
            .await;
            let quality = match measured {
                Ok(quality) => quality,
                Err(err) => {
                    // An abandoned shot still spends its budget.
                    self.remaining -= 1;
                    return RunStatus::Failed(RunFailure::Measurement(err));
                }
            };

            record.observe(quality);
            let shot_count = record.shot_count;
            let quality_estimate = record.quality_estimate;
            self.trace.push(sample, quality);
            self.agent.tell(sample, quality);
            self.remaining -= 1;

            debug!(
                sample,
                quality,
                shot_count,
                quality_estimate,
                remaining = self.remaining,
                "Shot complete"
            );
            self.publish(Document::Event(EventDoc {
                uid: super::document::new_uid(),
                run_uid: run_uid.to_string(),
                seq_num: self.trace.len() as u64 - 1,
                sample,
                quality,
                shot_count,
                quality_estimate,
                remaining_shots: self.remaining,
                time_ns: super::document::now_ns(),
            }));

            last = Some(Observation { sample, quality });
        }

        RunStatus::Success
    }

    fn publish(&self, doc: Document) {
        // No subscribers is fine.
        let _ = self.documents.send(doc);
    }
}

/// Convenience: run a configured agent to completion.
pub async fn run_to_completion<A, M>(
    agent: A,
    sample_count: usize,
    max_shots: u64,
    acquisition: M,
) -> Result<RunReport, LoopError>
where
    A: Agent,
    M: Acquisition,
{
    let mut adaptive = AdaptiveLoop::new(agent, sample_count, max_shots, acquisition)?;
    adaptive.run().await
}

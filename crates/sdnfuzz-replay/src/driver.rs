//! The replay driver.
//!
//! Walks a decoded superlog in file order and enacts each event against a
//! [`Simulation`]. The position in the log is the only ordering that
//! matters: times and dependency annotations are never consulted.
//!
//! Each event runs a small state machine driven entirely by this loop:
//!
//! ```text
//!            Pending (yield to network, retry)
//!              +----+
//!              v    |
//!   cursor --> attempt --Ready--> cursor + 1
//!                 |
//!                 +--Err--> ReplayError::EventFailed
//! ```
//!
//! The abort handle and the retry budget are checked before every attempt.
//! Neither moves the cursor, so a stopped run reports exactly where it was.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::time::{Duration, Instant};

use sdnfuzz_events::{
    CheckInvariants, Event, EventCodec, EventError, Progress, Replayable, Simulation,
};
use sdnfuzz_types::Label;

use crate::error::ReplayError;
use crate::policy::{AbortHandle, RetryPolicy};
use crate::summary::ReplaySummary;
use crate::superlog::read_superlog;

/// Result of a single [`Replayer::step`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// The event was enacted and the cursor moved past it.
    Advanced { label: Label },
    /// The event is not ready; the cursor stays on it.
    Retrying { label: Label, attempts: u32 },
    /// Every event has been enacted.
    Complete,
}

/// Drives one superlog through a simulation.
#[derive(Debug)]
pub struct Replayer {
    events: Vec<Event>,
    cursor: usize,

    /// Attempts spent on the event at the cursor.
    attempts: u32,
    first_attempt_at: Option<Instant>,

    policy: RetryPolicy,
    abort: AbortHandle,
    strict_invariants: bool,

    total_attempts: u64,
    retried: HashSet<usize>,
}

impl Replayer {
    /// Creates a replayer over events in replay order.
    pub fn new(events: Vec<Event>) -> Self {
        Self {
            events,
            cursor: 0,
            attempts: 0,
            first_attempt_at: None,
            policy: RetryPolicy::default(),
            abort: AbortHandle::new(),
            strict_invariants: false,
            total_attempts: 0,
            retried: HashSet::new(),
        }
    }

    /// Loads and decodes a superlog file.
    pub fn from_superlog(path: impl AsRef<Path>, codec: &EventCodec) -> Result<Self, ReplayError> {
        Ok(Self::new(read_superlog(path, codec)?))
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Shares an existing abort handle, e.g. one wired to Ctrl-C
    /// through [`AbortHandle::flag`].
    pub fn with_abort_handle(mut self, abort: AbortHandle) -> Self {
        self.abort = abort;
        self
    }

    /// Fails the run on any correctness violation, whatever the
    /// `fail_on_error` flag of the `CheckInvariants` event says.
    pub fn with_strict_invariants(mut self, strict: bool) -> Self {
        self.strict_invariants = strict;
        self
    }

    /// A handle that stops this replay before its next attempt.
    pub fn abort_handle(&self) -> AbortHandle {
        self.abort.clone()
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    /// Index of the next event to enact.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// The next event to enact, if any.
    pub fn current(&self) -> Option<&Event> {
        self.events.get(self.cursor)
    }

    pub fn is_complete(&self) -> bool {
        self.cursor >= self.events.len()
    }

    /// Attempts spent so far on the current event.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Makes one attempt at the current event.
    pub fn step(&mut self, sim: &mut Simulation) -> Result<StepOutcome, ReplayError> {
        let Some(event) = self.events.get(self.cursor) else {
            return Ok(StepOutcome::Complete);
        };

        if self.abort.is_aborted() {
            tracing::warn!(label = %event.label(), cursor = self.cursor, "replay aborted");
            return Err(ReplayError::Aborted {
                label: event.label().clone(),
                cursor: self.cursor,
                attempts: self.attempts,
            });
        }

        let started = *self.first_attempt_at.get_or_insert_with(Instant::now);
        let elapsed = started.elapsed();
        if self.policy.exhausted(self.attempts, elapsed) {
            tracing::warn!(
                label = %event.label(),
                class = event.class(),
                attempts = self.attempts,
                "retry budget exhausted"
            );
            return Err(ReplayError::RetryBudgetExhausted {
                label: event.label().clone(),
                class: event.class(),
                fingerprint: event.fingerprint(),
                attempts: self.attempts,
                elapsed,
            });
        }

        self.attempts = self.attempts.saturating_add(1);
        self.total_attempts = self.total_attempts.saturating_add(1);

        match attempt(event, self.strict_invariants, sim) {
            Ok(Progress::Ready) => {
                let label = event.label().clone();
                tracing::debug!(
                    label = %label,
                    class = event.class(),
                    attempts = self.attempts,
                    "enacted event"
                );
                self.cursor += 1;
                self.attempts = 0;
                self.first_attempt_at = None;
                Ok(StepOutcome::Advanced { label })
            }
            Ok(Progress::Pending) => {
                tracing::trace!(
                    label = %event.label(),
                    class = event.class(),
                    attempts = self.attempts,
                    "event not ready"
                );
                self.retried.insert(self.cursor);
                Ok(StepOutcome::Retrying {
                    label: event.label().clone(),
                    attempts: self.attempts,
                })
            }
            Err(source) => {
                tracing::error!(
                    label = %event.label(),
                    class = event.class(),
                    attempts = self.attempts,
                    error = %source,
                    "event failed"
                );
                Err(ReplayError::EventFailed {
                    label: event.label().clone(),
                    class: event.class(),
                    fingerprint: event.fingerprint(),
                    attempts: self.attempts,
                    source,
                })
            }
        }
    }

    /// Replays every remaining event, yielding to the network between
    /// attempts of a pending one.
    pub fn run(&mut self, sim: &mut Simulation) -> Result<ReplaySummary, ReplayError> {
        let started = Instant::now();
        tracing::info!(events = self.events.len(), cursor = self.cursor, "starting replay");

        loop {
            match self.step(sim)? {
                StepOutcome::Advanced { .. } => {}
                StepOutcome::Retrying { .. } => sim.yield_to_network(self.policy.retry_interval),
                StepOutcome::Complete => break,
            }
        }

        let summary = self.summary(started.elapsed());
        tracing::info!(
            events = summary.events_replayed,
            attempts = summary.total_attempts,
            retried = summary.retried_events,
            "replay complete"
        );
        Ok(summary)
    }

    fn summary(&self, elapsed: Duration) -> ReplaySummary {
        let mut per_class = BTreeMap::new();
        for event in &self.events[..self.cursor] {
            *per_class.entry(event.class()).or_default() += 1;
        }
        ReplaySummary {
            events_replayed: self.cursor,
            total_attempts: self.total_attempts,
            retried_events: self.retried.len(),
            per_class,
            elapsed,
        }
    }
}

fn attempt(
    event: &Event,
    strict_invariants: bool,
    sim: &mut Simulation,
) -> Result<Progress, EventError> {
    match event {
        Event::CheckInvariants(check) if strict_invariants && !check.fail_on_error => {
            let forced = CheckInvariants {
                fail_on_error: true,
                ..check.clone()
            };
            forced.proceed(sim)
        }
        _ => event.proceed(sim),
    }
}

//! Summaries of superlogs and replay runs.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use sdnfuzz_events::{Event, EventFamily};
use sdnfuzz_types::SyncTime;
use serde::Serialize;

/// What a finished replay run did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReplaySummary {
    pub events_replayed: usize,
    /// `proceed` calls across all events, including the successful ones.
    pub total_attempts: u64,
    /// Events that were pending at least once.
    pub retried_events: usize,
    pub per_class: BTreeMap<&'static str, usize>,
    pub elapsed: Duration,
}

impl fmt::Display for ReplaySummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "replayed {} event(s) in {:?} ({} attempt(s), {} retried)",
            self.events_replayed, self.elapsed, self.total_attempts, self.retried_events
        )?;
        for (class, count) in &self.per_class {
            writeln!(f, "  {class:<24} {count}")?;
        }
        Ok(())
    }
}

/// Static description of a superlog.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LogSummary {
    pub total: usize,
    pub inputs: usize,
    pub internals: usize,
    pub reports: usize,
    pub per_class: BTreeMap<&'static str, usize>,
    pub first_time: Option<SyncTime>,
    pub last_time: Option<SyncTime>,
    /// Events carrying a non-empty `dependent_labels`.
    pub with_dependencies: usize,
}

impl LogSummary {
    pub fn from_events(events: &[Event]) -> Self {
        let mut summary = Self {
            total: events.len(),
            ..Self::default()
        };

        for event in events {
            match event.family() {
                EventFamily::Input => summary.inputs += 1,
                EventFamily::Internal => summary.internals += 1,
                EventFamily::Report => summary.reports += 1,
            }
            *summary.per_class.entry(event.class()).or_default() += 1;
            if !event.dependent_labels().is_empty() {
                summary.with_dependencies += 1;
            }
        }

        summary.first_time = events.first().map(Event::time);
        summary.last_time = events.last().map(Event::time);
        summary
    }
}

impl fmt::Display for LogSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} event(s): {} input, {} internal, {} report",
            self.total, self.inputs, self.internals, self.reports
        )?;
        if let (Some(first), Some(last)) = (self.first_time, self.last_time) {
            writeln!(f, "time span: {first} .. {last}")?;
        }
        if self.with_dependencies > 0 {
            writeln!(f, "{} event(s) with dependencies", self.with_dependencies)?;
        }
        for (class, count) in &self.per_class {
            writeln!(f, "  {class:<24} {count}")?;
        }
        Ok(())
    }
}

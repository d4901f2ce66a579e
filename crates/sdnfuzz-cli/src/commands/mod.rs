//! CLI command implementations.

pub mod config;
pub mod dry_run;
pub mod prune;
pub mod show;
pub mod validate;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use sdnfuzz_events::{Event, EventCodec, LabelRegistry};

/// A codec with its own label registry, one per command invocation.
pub fn codec() -> EventCodec {
    EventCodec::new(Arc::new(LabelRegistry::new()))
}

pub fn load(superlog: &Path, codec: &EventCodec) -> Result<Vec<Event>> {
    sdnfuzz_replay::read_superlog(superlog, codec)
        .with_context(|| format!("Failed to load superlog {}", superlog.display()))
}

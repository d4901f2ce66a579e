//! # sdnfuzz-replay: Deterministic superlog replay
//!
//! Reads a superlog, rebuilds its events and drives them, one at a time and
//! in file order, through a live [`Simulation`](sdnfuzz_events::Simulation).
//!
//! - [`Replayer`]: the driver, with [`step`](Replayer::step) and [`run`](Replayer::run)
//! - [`RetryPolicy`] and [`AbortHandle`]: how long a pending event is retried
//! - [`read_superlog`] / [`SuperlogWriter`]: newline-delimited JSON I/O
//! - [`prune`] and [`DependencyIndex`]: dependency-checked trace minimization
//! - [`DryRun`]: a permissive stand-in network for checking a superlog offline
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//! use sdnfuzz_events::{EventCodec, LabelRegistry};
//! use sdnfuzz_replay::{DryRun, Replayer, parse_superlog};
//!
//! let superlog = concat!(
//!     r#"{"class":"SwitchFailure","label":"e1","time":[10,0],"dpid":3}"#, "\n",
//!     r#"{"class":"SwitchRecovery","label":"e2","time":[12,0],"dpid":3}"#, "\n",
//! );
//!
//! let codec = EventCodec::new(Arc::new(LabelRegistry::new()));
//! let events = parse_superlog(superlog.as_bytes(), &codec).unwrap();
//!
//! let dry_run = DryRun::new();
//! let summary = Replayer::new(events).run(&mut dry_run.simulation()).unwrap();
//! assert_eq!(summary.events_replayed, 2);
//! ```

mod driver;
mod dry_run;
mod error;
mod policy;
mod prune;
mod summary;
mod superlog;

pub use driver::{Replayer, StepOutcome};
pub use dry_run::{DryRun, DryRunReport};
pub use error::{EXIT_INVARIANT_VIOLATION, PruneError, ReplayError, SuperlogError};
pub use policy::{AbortHandle, RetryPolicy};
pub use prune::{DependencyIndex, prune};
pub use summary::{LogSummary, ReplaySummary};
pub use superlog::{SuperlogWriter, parse_superlog, read_superlog, write_superlog};

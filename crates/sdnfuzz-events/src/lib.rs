//! # sdnfuzz-events: Event model for `sdnfuzz`
//!
//! Everything a superlog can contain, and how each entry is enacted again:
//!
//! - [`LabelRegistry`]: unique `<prefix><n>` labels for live and reconstructed events
//! - [`Event`] and its variants, each implementing [`Replayable::proceed`]
//! - [`Simulation`]: the handle through which events reach the topology,
//!   controllers, god scheduler, patch panel and dataplane trace
//! - [`EventCodec`]: conversion to and from flat JSON records
//! - [`Invariant`]: the named correctness predicates `CheckInvariants` refers to
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//! use sdnfuzz_events::{Event, EventCodec, LabelRegistry, SwitchFailure};
//! use sdnfuzz_types::Dpid;
//!
//! let registry = Arc::new(LabelRegistry::new());
//! let codec = EventCodec::new(Arc::clone(&registry));
//!
//! let event = Event::from(SwitchFailure::new(&registry, Dpid::new(8)));
//! let line = codec.encode_line(&event).unwrap();
//! assert!(line.contains(r#""class":"SwitchFailure""#));
//!
//! let decoded = codec.decode_line(&line).unwrap();
//! assert_eq!(decoded, event);
//! ```

mod codec;
mod error;
mod event;
mod invariant;
mod label;
pub mod sim;

#[cfg(any(test, feature = "testkit"))]
pub mod testkit;


pub use codec::{CLASS_KEY, EventCodec, Record};
pub use error::{CodecError, CollaboratorError, EventError, LabelError};
pub use event::{
    CheckInvariants, ControlChannelBlock, ControlChannelUnblock, ControlMessageReceive,
    ControllerFailure, ControllerRecovery, ControllerStateChange, DataplaneDrop,
    DataplanePermit, DeterministicValue, Event, EventFamily, EventMeta, HostMigration,
    InvariantViolation, LinkEndpoints, LinkFailure, LinkRecovery, PolicyChange, Progress,
    Replayable, SwitchFailure, SwitchRecovery, TrafficInjection, WaitTime,
};
pub use invariant::{Invariant, InvariantChecker};
pub use label::{INPUT_PREFIX, INTERNAL_PREFIX, LabelRegistry};
pub use sim::{Simulation, resolve_link};

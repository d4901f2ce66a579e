//! The event taxonomy.
//!
//! Every occurrence in a superlog is one [`Event`]. Each variant is its own
//! struct implementing [`Replayable`]; the enum is closed and dispatches to
//! them. Events are immutable once built: live ones are issued a fresh label
//! from a [`LabelRegistry`], reconstructed ones carry the label read from the
//! log.
//!
//! # Proceed
//!
//! [`Replayable::proceed`] is a single, non-blocking attempt to enact the
//! event against a [`Simulation`]:
//!
//! - `Ok(Progress::Ready)`: the effect is enacted; move on.
//! - `Ok(Progress::Pending)`: a precondition is not true *yet*. Try the same
//!   event again later, and do not attempt anything after it meanwhile.
//! - `Err(_)`: fatal; the run must stop.

use std::fmt;
use std::hash::{Hash, Hasher};

use sdnfuzz_types::{Label, SyncTime, TaggedFingerprint};
use serde::{Deserialize, Serialize};

use crate::error::{EventError, LabelError};
use crate::label::{INPUT_PREFIX, INTERNAL_PREFIX, LabelRegistry};
use crate::sim::Simulation;

mod input;
mod internal;

pub use input::{
    CheckInvariants, ControlChannelBlock, ControlChannelUnblock, ControllerFailure,
    ControllerRecovery, DataplaneDrop, DataplanePermit, HostMigration, LinkEndpoints,
    LinkFailure, LinkRecovery, PolicyChange, SwitchFailure, SwitchRecovery, TrafficInjection,
    WaitTime,
};
pub use internal::{
    ControlMessageReceive, ControllerStateChange, DeterministicValue, InvariantViolation,
};

/// Outcome of one [`Replayable::proceed`] attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    /// The event's effect has been enacted.
    Ready,
    /// The precondition is not yet satisfied; retry in place.
    Pending,
}

/// Which family an event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventFamily {
    /// Injected by the harness.
    Input,
    /// Observed from the control plane.
    Internal,
    /// Terminal report, not part of the replay protocol.
    Report,
}

impl EventFamily {
    /// Prefix of labels issued to events of this family.
    pub fn label_prefix(self) -> &'static str {
        match self {
            EventFamily::Input | EventFamily::Report => INPUT_PREFIX,
            EventFamily::Internal => INTERNAL_PREFIX,
        }
    }
}

/// Identity shared by every event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventMeta {
    pub label: Label,
    pub time: SyncTime,
    /// Labels of input events this event causally depends on.
    ///
    /// The list points from the dependent event back to the events it
    /// needs: if `e5` lists `e2`, dropping `e2` would orphan `e5`. Pruning
    /// relies on this direction; replay never reads it.
    #[serde(default)]
    pub dependent_labels: Vec<Label>,
}

impl EventMeta {
    /// Fresh identity for a live event, stamped with the current time.
    pub fn issue(registry: &LabelRegistry, family: EventFamily) -> Self {
        Self {
            label: registry.next_label(family.label_prefix()),
            time: SyncTime::now(),
            dependent_labels: Vec::new(),
        }
    }
}

/// The execution contract every event implements.
pub trait Replayable: fmt::Debug {
    fn meta(&self) -> &EventMeta;

    /// Variant name, as written to the `class` key of a record.
    fn class(&self) -> &'static str;

    fn family(&self) -> EventFamily;

    /// Correlation key for effects observed later, if the event has one.
    fn fingerprint(&self) -> Option<TaggedFingerprint> {
        None
    }

    /// One attempt at enacting the event. See the module docs.
    fn proceed(&self, sim: &mut Simulation) -> Result<Progress, EventError>;
}

/// Expands to the identity methods of [`Replayable`] inside an impl block.
macro_rules! event_identity {
    ($family:ident) => {
        fn meta(&self) -> &$crate::event::EventMeta {
            &self.meta
        }

        fn class(&self) -> &'static str {
            Self::CLASS
        }

        fn family(&self) -> $crate::event::EventFamily {
            $crate::event::EventFamily::$family
        }
    };
}
pub(crate) use event_identity;

macro_rules! events {
    ($($variant:ident),+ $(,)?) => {
        /// Every kind of event that can appear in a superlog.
        ///
        /// Serializes as the flat record of the inner variant with a `class`
        /// key naming it.
        #[derive(Debug, Clone, Serialize)]
        #[serde(tag = "class")]
        pub enum Event {
            $($variant($variant),)+
        }

        impl Event {
            /// Every class name, in declaration order.
            pub const CLASSES: &'static [&'static str] = &[$(stringify!($variant)),+];

            pub fn as_replayable(&self) -> &dyn Replayable {
                match self {
                    $(Event::$variant(event) => event,)+
                }
            }

            fn meta_mut(&mut self) -> &mut EventMeta {
                match self {
                    $(Event::$variant(event) => &mut event.meta,)+
                }
            }
        }

        $(
            impl $variant {
                pub const CLASS: &'static str = stringify!($variant);

                pub fn with_time(mut self, time: SyncTime) -> Self {
                    self.meta.time = time;
                    self
                }

                pub fn with_dependent_labels(
                    mut self,
                    labels: impl IntoIterator<Item = Label>,
                ) -> Self {
                    self.meta.dependent_labels = labels.into_iter().collect();
                    self
                }

                /// Replaces the issued label with an explicit one, claiming it.
                pub fn with_label(
                    mut self,
                    registry: &LabelRegistry,
                    label: Label,
                ) -> Result<Self, LabelError> {
                    registry.claim(&label)?;
                    self.meta.label = label;
                    Ok(self)
                }
            }

            impl From<$variant> for Event {
                fn from(event: $variant) -> Self {
                    Event::$variant(event)
                }
            }

            impl PartialEq for $variant {
                fn eq(&self, other: &Self) -> bool {
                    self.meta.label == other.meta.label
                }
            }

            impl Eq for $variant {}

            impl Hash for $variant {
                fn hash<H: Hasher>(&self, state: &mut H) {
                    self.meta.label.hash(state);
                }
            }
        )+
    };
}

events! {
    SwitchFailure,
    SwitchRecovery,
    LinkFailure,
    LinkRecovery,
    ControllerFailure,
    ControllerRecovery,
    HostMigration,
    PolicyChange,
    TrafficInjection,
    WaitTime,
    CheckInvariants,
    ControlChannelBlock,
    ControlChannelUnblock,
    DataplaneDrop,
    DataplanePermit,
    ControlMessageReceive,
    ControllerStateChange,
    DeterministicValue,
    InvariantViolation,
}

impl Event {
    pub fn meta(&self) -> &EventMeta {
        self.as_replayable().meta()
    }

    pub fn label(&self) -> &Label {
        &self.meta().label
    }

    pub fn time(&self) -> SyncTime {
        self.meta().time
    }

    pub fn dependent_labels(&self) -> &[Label] {
        &self.meta().dependent_labels
    }

    pub fn class(&self) -> &'static str {
        self.as_replayable().class()
    }

    pub fn family(&self) -> EventFamily {
        self.as_replayable().family()
    }

    pub fn is_input(&self) -> bool {
        self.family() == EventFamily::Input
    }

    pub fn fingerprint(&self) -> Option<TaggedFingerprint> {
        self.as_replayable().fingerprint()
    }

    pub fn proceed(&self, sim: &mut Simulation) -> Result<Progress, EventError> {
        self.as_replayable().proceed(sim)
    }

    /// Replaces the dependency annotation.
    pub fn set_dependent_labels(&mut self, labels: Vec<Label>) {
        self.meta_mut().dependent_labels = labels;
    }
}

impl PartialEq for Event {
    fn eq(&self, other: &Self) -> bool {
        self.label() == other.label()
    }
}

impl Eq for Event {}

impl Hash for Event {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.label().hash(state);
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.class(), self.label())
    }
}

//! Internal events: what the control plane was observed doing.
//!
//! Replaying one of these never forces anything. It waits until the live
//! simulation has produced the same occurrence, then lets it through.

use sdnfuzz_types::{ControllerId, Dpid, Fingerprint, TaggedFingerprint};
use serde::{Deserialize, Serialize};

use super::{EventFamily, EventMeta, Progress, Replayable, event_identity};
use crate::error::EventError;
use crate::label::LabelRegistry;
use crate::sim::{PendingReceive, PendingStateChange, Simulation};

/// The god scheduler let a specific OpenFlow message through to a switch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlMessageReceive {
    #[serde(flatten)]
    pub meta: EventMeta,
    pub dpid: Dpid,
    pub controller_id: ControllerId,
    pub fingerprint: TaggedFingerprint,
}

impl ControlMessageReceive {
    pub fn new(
        registry: &LabelRegistry,
        dpid: Dpid,
        controller_id: ControllerId,
        fingerprint: Fingerprint,
    ) -> Self {
        Self {
            meta: EventMeta::issue(registry, EventFamily::Internal),
            dpid,
            controller_id,
            fingerprint: TaggedFingerprint::new(Self::CLASS, fingerprint),
        }
    }

    pub fn pending_receive(&self) -> PendingReceive {
        PendingReceive {
            dpid: self.dpid,
            controller_id: self.controller_id.clone(),
            fingerprint: self.fingerprint.fingerprint.clone(),
        }
    }
}

impl Replayable for ControlMessageReceive {
    event_identity!(Internal);

    fn fingerprint(&self) -> Option<TaggedFingerprint> {
        Some(self.fingerprint.clone())
    }

    fn proceed(&self, sim: &mut Simulation) -> Result<Progress, EventError> {
        let pending = self.pending_receive();
        let scheduler = sim.god_scheduler_mut()?;
        if !scheduler.message_waiting(&pending) {
            return Ok(Progress::Pending);
        }
        scheduler.schedule(&pending)?;
        tracing::trace!(dpid = %self.dpid, controller = %self.controller_id, "delivered message");
        Ok(Progress::Ready)
    }
}

/// A controller-visible state transition, such as a mastership change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerStateChange {
    #[serde(flatten)]
    pub meta: EventMeta,
    pub controller_id: ControllerId,
    pub fingerprint: TaggedFingerprint,
    pub name: String,
    pub value: serde_json::Value,
}

impl ControllerStateChange {
    pub fn new(
        registry: &LabelRegistry,
        controller_id: ControllerId,
        fingerprint: Fingerprint,
        name: impl Into<String>,
        value: serde_json::Value,
    ) -> Self {
        Self {
            meta: EventMeta::issue(registry, EventFamily::Internal),
            controller_id,
            fingerprint: TaggedFingerprint::new(Self::CLASS, fingerprint),
            name: name.into(),
            value,
        }
    }

    pub fn pending_state_change(&self) -> PendingStateChange {
        PendingStateChange {
            controller_id: self.controller_id.clone(),
            time: self.meta.time,
            fingerprint: self.fingerprint.clone(),
            name: self.name.clone(),
            value: self.value.clone(),
        }
    }
}

impl Replayable for ControllerStateChange {
    event_identity!(Internal);

    fn fingerprint(&self) -> Option<TaggedFingerprint> {
        Some(self.fingerprint.clone())
    }

    fn proceed(&self, sim: &mut Simulation) -> Result<Progress, EventError> {
        let change = self.pending_state_change();
        let sync = sim.controller_sync_mut()?;
        if !sync.state_change_pending(&change) {
            return Ok(Progress::Pending);
        }
        sync.gc_pending_state_change(&change);
        Ok(Progress::Ready)
    }
}

/// The controller asked for a value (e.g. the time of day) that replay must
/// make deterministic. Nothing to enact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeterministicValue {
    #[serde(flatten)]
    pub meta: EventMeta,
}

impl DeterministicValue {
    pub fn new(registry: &LabelRegistry) -> Self {
        Self {
            meta: EventMeta::issue(registry, EventFamily::Internal),
        }
    }
}

impl Replayable for DeterministicValue {
    event_identity!(Internal);

    fn proceed(&self, _sim: &mut Simulation) -> Result<Progress, EventError> {
        Ok(Progress::Ready)
    }
}

/// Terminal report of the correctness violations a run ended with.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvariantViolation {
    #[serde(flatten)]
    pub meta: EventMeta,
    pub violations: Vec<String>,
}

impl InvariantViolation {
    pub fn new<I>(registry: &LabelRegistry, violations: I) -> Self
    where
        I: IntoIterator,
        I::Item: ToString,
    {
        Self {
            meta: EventMeta::issue(registry, EventFamily::Report),
            violations: violations.into_iter().map(|v| v.to_string()).collect(),
        }
    }
}

impl Replayable for InvariantViolation {
    event_identity!(Report);

    fn proceed(&self, _sim: &mut Simulation) -> Result<Progress, EventError> {
        Ok(Progress::Ready)
    }
}

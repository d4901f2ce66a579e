//! Input events: perturbations the harness injects.

use std::time::Duration;

use sdnfuzz_types::{ControllerId, Dpid, Fingerprint, PortNo, TaggedFingerprint};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::{EventFamily, EventMeta, Progress, Replayable, event_identity};
use crate::error::{CollaboratorError, EventError};
use crate::invariant::Invariant;
use crate::label::LabelRegistry;
use crate::sim::{Simulation, resolve_link};

fn issue(registry: &LabelRegistry) -> EventMeta {
    EventMeta::issue(registry, EventFamily::Input)
}

fn tagged(
    class: &str,
    fields: impl IntoIterator<Item = (&'static str, serde_json::Value)>,
) -> TaggedFingerprint {
    TaggedFingerprint::new(class, Fingerprint::from_fields(fields))
}

// ============================================================================
// Switches
// ============================================================================

/// Crash a switch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwitchFailure {
    #[serde(flatten)]
    pub meta: EventMeta,
    pub dpid: Dpid,
}

impl SwitchFailure {
    pub fn new(registry: &LabelRegistry, dpid: Dpid) -> Self {
        Self {
            meta: issue(registry),
            dpid,
        }
    }
}

impl Replayable for SwitchFailure {
    event_identity!(Input);

    fn fingerprint(&self) -> Option<TaggedFingerprint> {
        Some(tagged(Self::CLASS, [("dpid", json!(self.dpid))]))
    }

    fn proceed(&self, sim: &mut Simulation) -> Result<Progress, EventError> {
        let topology = sim.topology_mut()?;
        let switch = topology.get_switch(self.dpid)?;
        topology.crash_switch(&switch)?;
        tracing::debug!(dpid = %self.dpid, "crashed switch");
        Ok(Progress::Ready)
    }
}

/// Recover a crashed switch.
///
/// A recovery that times out waiting for a controller is logged and still
/// counts as enacted; the control-flow events that follow will reveal
/// whether the switch reconnected.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwitchRecovery {
    #[serde(flatten)]
    pub meta: EventMeta,
    pub dpid: Dpid,
}

impl SwitchRecovery {
    pub fn new(registry: &LabelRegistry, dpid: Dpid) -> Self {
        Self {
            meta: issue(registry),
            dpid,
        }
    }
}

impl Replayable for SwitchRecovery {
    event_identity!(Input);

    fn fingerprint(&self) -> Option<TaggedFingerprint> {
        Some(tagged(Self::CLASS, [("dpid", json!(self.dpid))]))
    }

    fn proceed(&self, sim: &mut Simulation) -> Result<Progress, EventError> {
        let topology = sim.topology_mut()?;
        let switch = topology.get_switch(self.dpid)?;
        match topology.recover_switch(&switch) {
            Ok(()) => tracing::debug!(dpid = %self.dpid, "recovered switch"),
            Err(CollaboratorError::Timeout(reason)) => {
                tracing::warn!(dpid = %self.dpid, %reason, "switch recovery timed out");
            }
            Err(e) => return Err(e.into()),
        }
        Ok(Progress::Ready)
    }
}

// ============================================================================
// Links
// ============================================================================

/// Both ends of a link, as logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LinkEndpoints {
    pub start_dpid: Dpid,
    pub start_port_no: PortNo,
    pub end_dpid: Dpid,
    pub end_port_no: PortNo,
}

impl LinkEndpoints {
    pub fn new(
        start_dpid: Dpid,
        start_port_no: PortNo,
        end_dpid: Dpid,
        end_port_no: PortNo,
    ) -> Self {
        Self {
            start_dpid,
            start_port_no,
            end_dpid,
            end_port_no,
        }
    }

    fn fingerprint(&self, class: &str) -> TaggedFingerprint {
        tagged(
            class,
            [
                ("start_dpid", json!(self.start_dpid)),
                ("start_port_no", json!(self.start_port_no)),
                ("end_dpid", json!(self.end_dpid)),
                ("end_port_no", json!(self.end_port_no)),
            ],
        )
    }
}

/// Sever a link.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkFailure {
    #[serde(flatten)]
    pub meta: EventMeta,
    #[serde(flatten)]
    pub link: LinkEndpoints,
}

impl LinkFailure {
    pub fn new(registry: &LabelRegistry, link: LinkEndpoints) -> Self {
        Self {
            meta: issue(registry),
            link,
        }
    }
}

impl Replayable for LinkFailure {
    event_identity!(Input);

    fn fingerprint(&self) -> Option<TaggedFingerprint> {
        Some(self.link.fingerprint(Self::CLASS))
    }

    fn proceed(&self, sim: &mut Simulation) -> Result<Progress, EventError> {
        let topology = sim.topology_mut()?;
        let ends = &self.link;
        let link = resolve_link(
            ends.start_dpid,
            ends.start_port_no,
            ends.end_dpid,
            ends.end_port_no,
            &*topology,
        )?;
        topology.sever_link(&link)?;
        tracing::debug!(
            start = %ends.start_dpid,
            end = %ends.end_dpid,
            "severed link"
        );
        Ok(Progress::Ready)
    }
}

/// Repair a severed link.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkRecovery {
    #[serde(flatten)]
    pub meta: EventMeta,
    #[serde(flatten)]
    pub link: LinkEndpoints,
}

impl LinkRecovery {
    pub fn new(registry: &LabelRegistry, link: LinkEndpoints) -> Self {
        Self {
            meta: issue(registry),
            link,
        }
    }
}

impl Replayable for LinkRecovery {
    event_identity!(Input);

    fn fingerprint(&self) -> Option<TaggedFingerprint> {
        Some(self.link.fingerprint(Self::CLASS))
    }

    fn proceed(&self, sim: &mut Simulation) -> Result<Progress, EventError> {
        let topology = sim.topology_mut()?;
        let ends = &self.link;
        let link = resolve_link(
            ends.start_dpid,
            ends.start_port_no,
            ends.end_dpid,
            ends.end_port_no,
            &*topology,
        )?;
        topology.repair_link(&link)?;
        tracing::debug!(
            start = %ends.start_dpid,
            end = %ends.end_dpid,
            "repaired link"
        );
        Ok(Progress::Ready)
    }
}

// ============================================================================
// Controllers
// ============================================================================

/// Kill a controller process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerFailure {
    #[serde(flatten)]
    pub meta: EventMeta,
    pub controller_id: ControllerId,
}

impl ControllerFailure {
    pub fn new(registry: &LabelRegistry, controller_id: ControllerId) -> Self {
        Self {
            meta: issue(registry),
            controller_id,
        }
    }
}

impl Replayable for ControllerFailure {
    event_identity!(Input);

    fn fingerprint(&self) -> Option<TaggedFingerprint> {
        Some(tagged(Self::CLASS, [("controller_id", json!(self.controller_id))]))
    }

    fn proceed(&self, sim: &mut Simulation) -> Result<Progress, EventError> {
        let controllers = sim.controllers_mut()?;
        let controller = controllers.get_controller(&self.controller_id)?;
        controllers.kill_controller(&controller)?;
        tracing::debug!(controller = %self.controller_id, "killed controller");
        Ok(Progress::Ready)
    }
}

/// Reboot a killed controller process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerRecovery {
    #[serde(flatten)]
    pub meta: EventMeta,
    pub controller_id: ControllerId,
}

impl ControllerRecovery {
    pub fn new(registry: &LabelRegistry, controller_id: ControllerId) -> Self {
        Self {
            meta: issue(registry),
            controller_id,
        }
    }
}

impl Replayable for ControllerRecovery {
    event_identity!(Input);

    fn fingerprint(&self) -> Option<TaggedFingerprint> {
        Some(tagged(Self::CLASS, [("controller_id", json!(self.controller_id))]))
    }

    fn proceed(&self, sim: &mut Simulation) -> Result<Progress, EventError> {
        let controllers = sim.controllers_mut()?;
        let controller = controllers.get_controller(&self.controller_id)?;
        controllers.reboot_controller(&controller)?;
        tracing::debug!(controller = %self.controller_id, "rebooted controller");
        Ok(Progress::Ready)
    }
}

// ============================================================================
// Hosts
// ============================================================================

/// Move a host from one switch port to another.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostMigration {
    #[serde(flatten)]
    pub meta: EventMeta,
    pub old_ingress_dpid: Dpid,
    pub old_ingress_port_no: PortNo,
    pub new_ingress_dpid: Dpid,
    pub new_ingress_port_no: PortNo,
}

impl HostMigration {
    pub fn new(
        registry: &LabelRegistry,
        (old_ingress_dpid, old_ingress_port_no): (Dpid, PortNo),
        (new_ingress_dpid, new_ingress_port_no): (Dpid, PortNo),
    ) -> Self {
        Self {
            meta: issue(registry),
            old_ingress_dpid,
            old_ingress_port_no,
            new_ingress_dpid,
            new_ingress_port_no,
        }
    }
}

impl Replayable for HostMigration {
    event_identity!(Input);

    fn fingerprint(&self) -> Option<TaggedFingerprint> {
        Some(tagged(
            Self::CLASS,
            [
                ("old_ingress_dpid", json!(self.old_ingress_dpid)),
                ("old_ingress_port_no", json!(self.old_ingress_port_no)),
                ("new_ingress_dpid", json!(self.new_ingress_dpid)),
                ("new_ingress_port_no", json!(self.new_ingress_port_no)),
            ],
        ))
    }

    fn proceed(&self, sim: &mut Simulation) -> Result<Progress, EventError> {
        sim.topology_mut()?.migrate_host(
            self.old_ingress_dpid,
            self.old_ingress_port_no,
            self.new_ingress_dpid,
            self.new_ingress_port_no,
        )?;
        tracing::debug!(
            old_dpid = %self.old_ingress_dpid,
            old_port = %self.old_ingress_port_no,
            new_dpid = %self.new_ingress_dpid,
            new_port = %self.new_ingress_port_no,
            "migrated host"
        );
        Ok(Progress::Ready)
    }
}

// ============================================================================
// Policy, Traffic and Timing
// ============================================================================

/// Reserved for controller policy updates. Enacting it does nothing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyChange {
    #[serde(flatten)]
    pub meta: EventMeta,
    pub request_type: String,
}

impl PolicyChange {
    pub fn new(registry: &LabelRegistry, request_type: impl Into<String>) -> Self {
        Self {
            meta: issue(registry),
            request_type: request_type.into(),
        }
    }
}

impl Replayable for PolicyChange {
    event_identity!(Input);

    fn proceed(&self, _sim: &mut Simulation) -> Result<Progress, EventError> {
        tracing::warn!(
            label = %self.meta.label,
            request_type = %self.request_type,
            "policy changes are not enacted, skipping"
        );
        Ok(Progress::Ready)
    }
}

/// Inject the next packet of the pre-recorded dataplane trace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrafficInjection {
    #[serde(flatten)]
    pub meta: EventMeta,
}

impl TrafficInjection {
    pub fn new(registry: &LabelRegistry) -> Self {
        Self {
            meta: issue(registry),
        }
    }
}

impl Replayable for TrafficInjection {
    event_identity!(Input);

    fn proceed(&self, sim: &mut Simulation) -> Result<Progress, EventError> {
        sim.dataplane_trace_mut()?.inject_trace_event()?;
        Ok(Progress::Ready)
    }
}

/// Pause the whole replay for `wait_time` seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WaitTime {
    #[serde(flatten)]
    pub meta: EventMeta,
    pub wait_time: f64,
}

impl WaitTime {
    pub fn new(registry: &LabelRegistry, wait: Duration) -> Self {
        Self {
            meta: issue(registry),
            wait_time: wait.as_secs_f64(),
        }
    }

    /// The pause, or zero if `wait_time` is negative or not finite.
    pub fn duration(&self) -> Duration {
        Duration::try_from_secs_f64(self.wait_time).unwrap_or_default()
    }
}

impl Replayable for WaitTime {
    event_identity!(Input);

    fn proceed(&self, sim: &mut Simulation) -> Result<Progress, EventError> {
        tracing::info!(seconds = self.wait_time, "pausing replay");
        sim.sleep(self.duration());
        Ok(Progress::Ready)
    }
}

// ============================================================================
// Invariants
// ============================================================================

/// Evaluate a named correctness predicate against the simulation.
///
/// Violations are always logged. With `fail_on_error` they also fail the
/// event with [`EventError::CorrectnessViolation`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckInvariants {
    #[serde(flatten)]
    pub meta: EventMeta,
    #[serde(default)]
    pub fail_on_error: bool,
    #[serde(default, rename = "invariant_name")]
    pub invariant: Invariant,
}

impl CheckInvariants {
    pub fn new(registry: &LabelRegistry, invariant: Invariant, fail_on_error: bool) -> Self {
        Self {
            meta: issue(registry),
            fail_on_error,
            invariant,
        }
    }
}

impl Replayable for CheckInvariants {
    event_identity!(Input);

    fn proceed(&self, sim: &mut Simulation) -> Result<Progress, EventError> {
        let sim: &Simulation = sim;
        tracing::info!(invariant = %self.invariant, "checking invariant");
        let violations = sim.invariant_checker()?.check(self.invariant, sim);

        if violations.is_empty() {
            tracing::info!(invariant = %self.invariant, "no correctness violations");
            return Ok(Progress::Ready);
        }

        tracing::warn!(
            invariant = %self.invariant,
            count = violations.len(),
            ?violations,
            "correctness violations"
        );
        if self.fail_on_error {
            return Err(EventError::CorrectnessViolation {
                invariant: self.invariant,
                violations,
            });
        }
        Ok(Progress::Ready)
    }
}

// ============================================================================
// Control Channels
// ============================================================================

/// Block the control channel between a switch and a controller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlChannelBlock {
    #[serde(flatten)]
    pub meta: EventMeta,
    pub dpid: Dpid,
    pub controller_id: ControllerId,
}

impl ControlChannelBlock {
    pub fn new(registry: &LabelRegistry, dpid: Dpid, controller_id: ControllerId) -> Self {
        Self {
            meta: issue(registry),
            dpid,
            controller_id,
        }
    }
}

impl Replayable for ControlChannelBlock {
    event_identity!(Input);

    fn fingerprint(&self) -> Option<TaggedFingerprint> {
        Some(tagged(
            Self::CLASS,
            [("dpid", json!(self.dpid)), ("controller_id", json!(self.controller_id))],
        ))
    }

    fn proceed(&self, sim: &mut Simulation) -> Result<Progress, EventError> {
        let topology = sim.topology_mut()?;
        let switch = topology.get_switch(self.dpid)?;
        let mut channel = topology.control_channel(&switch, &self.controller_id)?;
        if channel.is_blocked() {
            return Err(EventError::ProtocolViolation(format!(
                "expected channel {} -> {} to not be blocked",
                self.dpid, self.controller_id
            )));
        }
        channel.block();
        Ok(Progress::Ready)
    }
}

/// Unblock a previously blocked control channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlChannelUnblock {
    #[serde(flatten)]
    pub meta: EventMeta,
    pub dpid: Dpid,
    pub controller_id: ControllerId,
}

impl ControlChannelUnblock {
    pub fn new(registry: &LabelRegistry, dpid: Dpid, controller_id: ControllerId) -> Self {
        Self {
            meta: issue(registry),
            dpid,
            controller_id,
        }
    }
}

impl Replayable for ControlChannelUnblock {
    event_identity!(Input);

    fn fingerprint(&self) -> Option<TaggedFingerprint> {
        Some(tagged(
            Self::CLASS,
            [("dpid", json!(self.dpid)), ("controller_id", json!(self.controller_id))],
        ))
    }

    fn proceed(&self, sim: &mut Simulation) -> Result<Progress, EventError> {
        let topology = sim.topology_mut()?;
        let switch = topology.get_switch(self.dpid)?;
        let mut channel = topology.control_channel(&switch, &self.controller_id)?;
        if !channel.is_blocked() {
            return Err(EventError::ProtocolViolation(format!(
                "expected channel {} -> {} to be blocked",
                self.dpid, self.controller_id
            )));
        }
        channel.unblock();
        Ok(Progress::Ready)
    }
}

// ============================================================================
// Dataplane
// ============================================================================

/// Drop a specific buffered dataplane packet once it is buffered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataplaneDrop {
    #[serde(flatten)]
    pub meta: EventMeta,
    pub fingerprint: TaggedFingerprint,
}

impl DataplaneDrop {
    pub fn new(registry: &LabelRegistry, fingerprint: Fingerprint) -> Self {
        Self {
            meta: issue(registry),
            fingerprint: TaggedFingerprint::new(Self::CLASS, fingerprint),
        }
    }
}

impl Replayable for DataplaneDrop {
    event_identity!(Input);

    fn fingerprint(&self) -> Option<TaggedFingerprint> {
        Some(self.fingerprint.clone())
    }

    fn proceed(&self, sim: &mut Simulation) -> Result<Progress, EventError> {
        let panel = sim.patch_panel_mut()?;
        let Some(buffered) = panel.get_buffered_dp_event(&self.fingerprint.fingerprint) else {
            return Ok(Progress::Pending);
        };
        panel.drop_dp_event(&buffered)?;
        Ok(Progress::Ready)
    }
}

/// Release a specific buffered dataplane packet once it is buffered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataplanePermit {
    #[serde(flatten)]
    pub meta: EventMeta,
    pub fingerprint: TaggedFingerprint,
}

impl DataplanePermit {
    pub fn new(registry: &LabelRegistry, fingerprint: Fingerprint) -> Self {
        Self {
            meta: issue(registry),
            fingerprint: TaggedFingerprint::new(Self::CLASS, fingerprint),
        }
    }
}

impl Replayable for DataplanePermit {
    event_identity!(Input);

    fn fingerprint(&self) -> Option<TaggedFingerprint> {
        Some(self.fingerprint.clone())
    }

    fn proceed(&self, sim: &mut Simulation) -> Result<Progress, EventError> {
        let panel = sim.patch_panel_mut()?;
        let Some(buffered) = panel.get_buffered_dp_event(&self.fingerprint.fingerprint) else {
            return Ok(Progress::Pending);
        };
        panel.permit_dp_event(&buffered)?;
        Ok(Progress::Ready)
    }
}

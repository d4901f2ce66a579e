//! The live simulation as seen by events.
//!
//! The topology, controller processes, god scheduler, patch panel and
//! dataplane trace are owned by the harness; events only reach them through
//! the traits below. A [`Simulation`] bundles one implementation of each.
//! Every collaborator is optional: an event that needs one that was not
//! configured fails with [`EventError::MissingCollaborator`] the first time
//! it runs.
//!
//! All collaborators are driven from a single thread, one `proceed` call at
//! a time, so none of the traits require `Send`.

use std::time::Duration;

use sdnfuzz_types::{ControllerId, Dpid, Fingerprint, PortNo, SyncTime, TaggedFingerprint};

use crate::error::{CollaboratorError, EventError};
use crate::invariant::{FnChecker, Invariant, InvariantChecker};

// ============================================================================
// Handles
// ============================================================================

/// A switch that the topology confirmed exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SwitchRef {
    pub dpid: Dpid,
}

impl SwitchRef {
    pub fn new(dpid: Dpid) -> Self {
        Self { dpid }
    }
}

/// A link between two resolved switch ports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Link {
    pub start: SwitchRef,
    pub start_port: PortNo,
    pub end: SwitchRef,
    pub end_port: PortNo,
}

/// Whatever is plugged into a switch port.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Endpoint {
    Host { name: String },
    Switch { switch: SwitchRef, port: PortNo },
}

/// A controller process the manager confirmed exists.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ControllerRef {
    pub id: ControllerId,
}

impl ControllerRef {
    pub fn new(id: ControllerId) -> Self {
        Self { id }
    }
}

/// A dataplane packet held by the patch panel.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BufferedDpEvent {
    pub id: u64,
    pub fingerprint: Fingerprint,
}

/// Correlation key for an OpenFlow message buffered by the god scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PendingReceive {
    pub dpid: Dpid,
    pub controller_id: ControllerId,
    pub fingerprint: Fingerprint,
}

/// Correlation key for a controller state transition awaiting replay.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingStateChange {
    pub controller_id: ControllerId,
    pub time: SyncTime,
    pub fingerprint: TaggedFingerprint,
    pub name: String,
    pub value: serde_json::Value,
}

// ============================================================================
// Collaborator Traits
// ============================================================================

/// Switches, links and hosts.
pub trait Topology {
    fn get_switch(&self, dpid: Dpid) -> Result<SwitchRef, CollaboratorError>;
    fn crash_switch(&mut self, switch: &SwitchRef) -> Result<(), CollaboratorError>;

    /// May fail with [`CollaboratorError::Timeout`] when no controller
    /// answers the reconnecting switch.
    fn recover_switch(&mut self, switch: &SwitchRef) -> Result<(), CollaboratorError>;

    fn sever_link(&mut self, link: &Link) -> Result<(), CollaboratorError>;
    fn repair_link(&mut self, link: &Link) -> Result<(), CollaboratorError>;

    fn migrate_host(
        &mut self,
        old_dpid: Dpid,
        old_port: PortNo,
        new_dpid: Dpid,
        new_port: PortNo,
    ) -> Result<(), CollaboratorError>;

    fn get_connected_port(
        &self,
        switch: &SwitchRef,
        port: PortNo,
    ) -> Result<Option<Endpoint>, CollaboratorError>;

    /// The control connection from `switch` to `controller`.
    fn control_channel<'a>(
        &'a mut self,
        switch: &SwitchRef,
        controller: &ControllerId,
    ) -> Result<Box<dyn ControlChannel + 'a>, CollaboratorError>;
}

/// One switch-to-controller connection.
pub trait ControlChannel {
    fn is_blocked(&self) -> bool;
    fn block(&mut self);
    fn unblock(&mut self);
}

/// Controller processes.
pub trait ControllerManager {
    fn get_controller(&self, id: &ControllerId) -> Result<ControllerRef, CollaboratorError>;
    fn kill_controller(&mut self, controller: &ControllerRef) -> Result<(), CollaboratorError>;
    fn reboot_controller(&mut self, controller: &ControllerRef) -> Result<(), CollaboratorError>;
}

/// Decides which buffered OpenFlow messages are delivered.
pub trait GodScheduler {
    fn message_waiting(&self, pending: &PendingReceive) -> bool;
    fn schedule(&mut self, pending: &PendingReceive) -> Result<(), CollaboratorError>;
}

/// Tracks controller state changes reported by the sync protocol.
pub trait ControllerSync {
    fn state_change_pending(&self, change: &PendingStateChange) -> bool;
    fn gc_pending_state_change(&mut self, change: &PendingStateChange);
}

/// Buffers in-flight dataplane packets.
pub trait PatchPanel {
    fn get_buffered_dp_event(&self, fingerprint: &Fingerprint) -> Option<BufferedDpEvent>;
    fn drop_dp_event(&mut self, event: &BufferedDpEvent) -> Result<(), CollaboratorError>;
    fn permit_dp_event(&mut self, event: &BufferedDpEvent) -> Result<(), CollaboratorError>;
}

/// Source of pre-recorded dataplane packets.
pub trait DataplaneTrace {
    /// Pops the next packet and injects it at its recorded ingress.
    fn inject_trace_event(&mut self) -> Result<(), CollaboratorError>;
}

/// Time source used for deliberate pauses.
pub trait ReplayClock {
    fn sleep(&mut self, duration: Duration);
}

/// One tick of the live network's event loop (switch deliveries, timers).
pub trait IoLoop {
    fn run_once(&mut self, budget: Duration);
}

/// [`ReplayClock`] backed by the OS clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl ReplayClock for SystemClock {
    fn sleep(&mut self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

// ============================================================================
// Simulation Handle
// ============================================================================

/// Handle to a running simulation and its collaborators.
pub struct Simulation {
    topology: Option<Box<dyn Topology>>,
    controllers: Option<Box<dyn ControllerManager>>,
    god_scheduler: Option<Box<dyn GodScheduler>>,
    controller_sync: Option<Box<dyn ControllerSync>>,
    patch_panel: Option<Box<dyn PatchPanel>>,
    dataplane_trace: Option<Box<dyn DataplaneTrace>>,
    invariant_checker: Option<Box<dyn InvariantChecker>>,
    io_loop: Option<Box<dyn IoLoop>>,
    clock: Box<dyn ReplayClock>,
}

impl Simulation {
    /// Creates a simulation with no collaborators and the system clock.
    pub fn new() -> Self {
        Self {
            topology: None,
            controllers: None,
            god_scheduler: None,
            controller_sync: None,
            patch_panel: None,
            dataplane_trace: None,
            invariant_checker: None,
            io_loop: None,
            clock: Box::new(SystemClock),
        }
    }

    pub fn with_topology(mut self, topology: impl Topology + 'static) -> Self {
        self.topology = Some(Box::new(topology));
        self
    }

    pub fn with_controllers(mut self, controllers: impl ControllerManager + 'static) -> Self {
        self.controllers = Some(Box::new(controllers));
        self
    }

    pub fn with_god_scheduler(mut self, scheduler: impl GodScheduler + 'static) -> Self {
        self.god_scheduler = Some(Box::new(scheduler));
        self
    }

    pub fn with_controller_sync(mut self, sync: impl ControllerSync + 'static) -> Self {
        self.controller_sync = Some(Box::new(sync));
        self
    }

    pub fn with_patch_panel(mut self, panel: impl PatchPanel + 'static) -> Self {
        self.patch_panel = Some(Box::new(panel));
        self
    }

    pub fn with_dataplane_trace(mut self, trace: impl DataplaneTrace + 'static) -> Self {
        self.dataplane_trace = Some(Box::new(trace));
        self
    }

    pub fn with_invariant_checker(mut self, checker: impl InvariantChecker + 'static) -> Self {
        self.invariant_checker = Some(Box::new(checker));
        self
    }

    /// Installs a closure as the invariant checker.
    pub fn with_invariant_check<F>(self, check: F) -> Self
    where
        F: Fn(Invariant, &Simulation) -> Vec<String> + 'static,
    {
        self.with_invariant_checker(FnChecker(check))
    }

    pub fn with_io_loop(mut self, io_loop: impl IoLoop + 'static) -> Self {
        self.io_loop = Some(Box::new(io_loop));
        self
    }

    pub fn with_clock(mut self, clock: impl ReplayClock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    pub fn topology(&self) -> Result<&dyn Topology, EventError> {
        match &self.topology {
            Some(topology) => Ok(topology.as_ref()),
            None => Err(EventError::MissingCollaborator("topology")),
        }
    }

    pub fn topology_mut(&mut self) -> Result<&mut dyn Topology, EventError> {
        match &mut self.topology {
            Some(topology) => Ok(topology.as_mut()),
            None => Err(EventError::MissingCollaborator("topology")),
        }
    }

    pub fn controllers_mut(&mut self) -> Result<&mut dyn ControllerManager, EventError> {
        match &mut self.controllers {
            Some(controllers) => Ok(controllers.as_mut()),
            None => Err(EventError::MissingCollaborator("controller manager")),
        }
    }

    pub fn god_scheduler_mut(&mut self) -> Result<&mut dyn GodScheduler, EventError> {
        match &mut self.god_scheduler {
            Some(scheduler) => Ok(scheduler.as_mut()),
            None => Err(EventError::MissingCollaborator("god scheduler")),
        }
    }

    pub fn controller_sync_mut(&mut self) -> Result<&mut dyn ControllerSync, EventError> {
        match &mut self.controller_sync {
            Some(sync) => Ok(sync.as_mut()),
            None => Err(EventError::MissingCollaborator("controller sync callback")),
        }
    }

    pub fn patch_panel_mut(&mut self) -> Result<&mut dyn PatchPanel, EventError> {
        match &mut self.patch_panel {
            Some(panel) => Ok(panel.as_mut()),
            None => Err(EventError::MissingCollaborator("patch panel")),
        }
    }

    pub fn dataplane_trace_mut(&mut self) -> Result<&mut dyn DataplaneTrace, EventError> {
        match &mut self.dataplane_trace {
            Some(trace) => Ok(trace.as_mut()),
            None => Err(EventError::MissingCollaborator("dataplane trace")),
        }
    }

    pub fn invariant_checker(&self) -> Result<&dyn InvariantChecker, EventError> {
        match &self.invariant_checker {
            Some(checker) => Ok(checker.as_ref()),
            None => Err(EventError::MissingCollaborator("invariant checker")),
        }
    }

    /// Pauses the replay clock.
    pub fn sleep(&mut self, duration: Duration) {
        self.clock.sleep(duration);
    }

    /// Lets the live network make progress between two attempts of a
    /// pending event: one I/O loop tick if configured, otherwise a sleep.
    pub fn yield_to_network(&mut self, budget: Duration) {
        match &mut self.io_loop {
            Some(io_loop) => io_loop.run_once(budget),
            None => self.clock.sleep(budget),
        }
    }
}

impl Default for Simulation {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Simulation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Simulation")
            .field("topology", &self.topology.is_some())
            .field("controllers", &self.controllers.is_some())
            .field("god_scheduler", &self.god_scheduler.is_some())
            .field("controller_sync", &self.controller_sync.is_some())
            .field("patch_panel", &self.patch_panel.is_some())
            .field("dataplane_trace", &self.dataplane_trace.is_some())
            .field("invariant_checker", &self.invariant_checker.is_some())
            .field("io_loop", &self.io_loop.is_some())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Link Resolution
// ============================================================================

/// Resolves logged link endpoints to a live [`Link`].
///
/// Pure lookup: both switches must exist, and the topology's "no such
/// switch" error is returned unchanged.
pub fn resolve_link(
    start_dpid: Dpid,
    start_port: PortNo,
    end_dpid: Dpid,
    end_port: PortNo,
    topology: &dyn Topology,
) -> Result<Link, CollaboratorError> {
    let start = topology.get_switch(start_dpid)?;
    let end = topology.get_switch(end_dpid)?;
    Ok(Link {
        start,
        start_port,
        end,
        end_port,
    })
}

//! Dry-run collaborators.
//!
//! A [`DryRun`] stands in for a live network when checking what a superlog
//! would do. Every action is accepted and counted; every message, state
//! change and dataplane packet is reported as already waiting; waits are
//! skipped and invariant checks find nothing. Control channel blocking is
//! still tracked, so a superlog that blocks the same channel twice fails
//! the same way it would against a real network.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::rc::Rc;
use std::time::Duration;

use sdnfuzz_events::sim::{
    BufferedDpEvent, ControlChannel, ControllerManager, ControllerRef, ControllerSync,
    DataplaneTrace, Endpoint, GodScheduler, IoLoop, Link, PatchPanel, PendingReceive,
    PendingStateChange, ReplayClock, SwitchRef, Topology,
};
use sdnfuzz_events::{CollaboratorError, Invariant, InvariantChecker, Simulation};
use sdnfuzz_types::{ControllerId, Dpid, Fingerprint, PortNo};
use serde::Serialize;

#[derive(Debug, Default)]
struct DryRunState {
    actions: BTreeMap<&'static str, usize>,
    blocked: HashSet<(Dpid, ControllerId)>,
    skipped_wait: Duration,
    next_dp_event_id: u64,
}

impl DryRunState {
    fn count(&mut self, action: &'static str) {
        *self.actions.entry(action).or_default() += 1;
    }
}

type Shared = Rc<RefCell<DryRunState>>;

fn count(state: &Shared, action: &'static str) {
    state.borrow_mut().count(action);
}

/// What a dry run would have done to the network.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DryRunReport {
    /// Collaborator action name to number of calls.
    pub actions: BTreeMap<&'static str, usize>,
    /// Total `WaitTime` pause that was skipped.
    pub skipped_wait: Duration,
    /// Channels still blocked at the end of the run.
    pub blocked_channels: usize,
}

impl fmt::Display for DryRunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (action, count) in &self.actions {
            writeln!(f, "  {action:<24} {count}")?;
        }
        if !self.skipped_wait.is_zero() {
            writeln!(f, "skipped {:?} of waiting", self.skipped_wait)?;
        }
        if self.blocked_channels > 0 {
            writeln!(f, "{} control channel(s) left blocked", self.blocked_channels)?;
        }
        Ok(())
    }
}

/// A permissive stand-in network.
#[derive(Debug, Clone, Default)]
pub struct DryRun {
    state: Shared,
}

impl DryRun {
    pub fn new() -> Self {
        Self::default()
    }

    /// A simulation where every collaborator is backed by this dry run.
    pub fn simulation(&self) -> Simulation {
        Simulation::new()
            .with_topology(DryTopology(Rc::clone(&self.state)))
            .with_controllers(DryControllers(Rc::clone(&self.state)))
            .with_god_scheduler(DryScheduler(Rc::clone(&self.state)))
            .with_controller_sync(DrySync(Rc::clone(&self.state)))
            .with_patch_panel(DryPatchPanel(Rc::clone(&self.state)))
            .with_dataplane_trace(DryTrace(Rc::clone(&self.state)))
            .with_invariant_checker(DryChecker(Rc::clone(&self.state)))
            .with_io_loop(DryIoLoop)
            .with_clock(DryClock(Rc::clone(&self.state)))
    }

    pub fn report(&self) -> DryRunReport {
        let state = self.state.borrow();
        DryRunReport {
            actions: state.actions.clone(),
            skipped_wait: state.skipped_wait,
            blocked_channels: state.blocked.len(),
        }
    }
}

struct DryTopology(Shared);

impl Topology for DryTopology {
    fn get_switch(&self, dpid: Dpid) -> Result<SwitchRef, CollaboratorError> {
        Ok(SwitchRef::new(dpid))
    }

    fn crash_switch(&mut self, switch: &SwitchRef) -> Result<(), CollaboratorError> {
        tracing::info!(dpid = %switch.dpid, "dry run: crash switch");
        count(&self.0, "crash_switch");
        Ok(())
    }

    fn recover_switch(&mut self, switch: &SwitchRef) -> Result<(), CollaboratorError> {
        tracing::info!(dpid = %switch.dpid, "dry run: recover switch");
        count(&self.0, "recover_switch");
        Ok(())
    }

    fn sever_link(&mut self, link: &Link) -> Result<(), CollaboratorError> {
        tracing::info!(
            start = %link.start.dpid,
            start_port = %link.start_port,
            end = %link.end.dpid,
            end_port = %link.end_port,
            "dry run: sever link"
        );
        count(&self.0, "sever_link");
        Ok(())
    }

    fn repair_link(&mut self, link: &Link) -> Result<(), CollaboratorError> {
        tracing::info!(
            start = %link.start.dpid,
            start_port = %link.start_port,
            end = %link.end.dpid,
            end_port = %link.end_port,
            "dry run: repair link"
        );
        count(&self.0, "repair_link");
        Ok(())
    }

    fn migrate_host(
        &mut self,
        old_dpid: Dpid,
        old_port: PortNo,
        new_dpid: Dpid,
        new_port: PortNo,
    ) -> Result<(), CollaboratorError> {
        tracing::info!(
            old_dpid = %old_dpid,
            old_port = %old_port,
            new_dpid = %new_dpid,
            new_port = %new_port,
            "dry run: migrate host"
        );
        count(&self.0, "migrate_host");
        Ok(())
    }

    fn get_connected_port(
        &self,
        _switch: &SwitchRef,
        _port: PortNo,
    ) -> Result<Option<Endpoint>, CollaboratorError> {
        Ok(None)
    }

    fn control_channel<'a>(
        &'a mut self,
        switch: &SwitchRef,
        controller: &ControllerId,
    ) -> Result<Box<dyn ControlChannel + 'a>, CollaboratorError> {
        Ok(Box::new(DryChannel {
            state: Rc::clone(&self.0),
            key: (switch.dpid, controller.clone()),
        }))
    }
}

struct DryChannel {
    state: Shared,
    key: (Dpid, ControllerId),
}

impl ControlChannel for DryChannel {
    fn is_blocked(&self) -> bool {
        self.state.borrow().blocked.contains(&self.key)
    }

    fn block(&mut self) {
        let mut state = self.state.borrow_mut();
        state.blocked.insert(self.key.clone());
        state.count("block_channel");
    }

    fn unblock(&mut self) {
        let mut state = self.state.borrow_mut();
        state.blocked.remove(&self.key);
        state.count("unblock_channel");
    }
}

struct DryControllers(Shared);

impl ControllerManager for DryControllers {
    fn get_controller(&self, id: &ControllerId) -> Result<ControllerRef, CollaboratorError> {
        Ok(ControllerRef::new(id.clone()))
    }

    fn kill_controller(&mut self, controller: &ControllerRef) -> Result<(), CollaboratorError> {
        tracing::info!(controller = %controller.id, "dry run: kill controller");
        count(&self.0, "kill_controller");
        Ok(())
    }

    fn reboot_controller(&mut self, controller: &ControllerRef) -> Result<(), CollaboratorError> {
        tracing::info!(controller = %controller.id, "dry run: reboot controller");
        count(&self.0, "reboot_controller");
        Ok(())
    }
}

struct DryScheduler(Shared);

impl GodScheduler for DryScheduler {
    fn message_waiting(&self, _pending: &PendingReceive) -> bool {
        true
    }

    fn schedule(&mut self, pending: &PendingReceive) -> Result<(), CollaboratorError> {
        tracing::debug!(dpid = %pending.dpid, controller = %pending.controller_id, "dry run: deliver message");
        count(&self.0, "schedule_message");
        Ok(())
    }
}

struct DrySync(Shared);

impl ControllerSync for DrySync {
    fn state_change_pending(&self, _change: &PendingStateChange) -> bool {
        true
    }

    fn gc_pending_state_change(&mut self, change: &PendingStateChange) {
        tracing::debug!(controller = %change.controller_id, name = %change.name, "dry run: state change");
        count(&self.0, "state_change");
    }
}

struct DryPatchPanel(Shared);

impl PatchPanel for DryPatchPanel {
    fn get_buffered_dp_event(&self, fingerprint: &Fingerprint) -> Option<BufferedDpEvent> {
        let mut state = self.0.borrow_mut();
        state.next_dp_event_id += 1;
        Some(BufferedDpEvent {
            id: state.next_dp_event_id,
            fingerprint: fingerprint.clone(),
        })
    }

    fn drop_dp_event(&mut self, event: &BufferedDpEvent) -> Result<(), CollaboratorError> {
        tracing::debug!(fingerprint = %event.fingerprint, "dry run: drop packet");
        count(&self.0, "drop_dp_event");
        Ok(())
    }

    fn permit_dp_event(&mut self, event: &BufferedDpEvent) -> Result<(), CollaboratorError> {
        tracing::debug!(fingerprint = %event.fingerprint, "dry run: permit packet");
        count(&self.0, "permit_dp_event");
        Ok(())
    }
}

struct DryTrace(Shared);

impl DataplaneTrace for DryTrace {
    fn inject_trace_event(&mut self) -> Result<(), CollaboratorError> {
        count(&self.0, "inject_trace_event");
        Ok(())
    }
}

struct DryChecker(Shared);

impl InvariantChecker for DryChecker {
    fn check(&self, invariant: Invariant, _sim: &Simulation) -> Vec<String> {
        tracing::debug!(%invariant, "dry run: invariant check skipped");
        count(&self.0, "check_invariant");
        Vec::new()
    }
}

struct DryIoLoop;

impl IoLoop for DryIoLoop {
    fn run_once(&mut self, _budget: Duration) {}
}

struct DryClock(Shared);

impl ReplayClock for DryClock {
    fn sleep(&mut self, duration: Duration) {
        self.0.borrow_mut().skipped_wait += duration;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ReplayError, Replayer};
    use sdnfuzz_events::{
        ControlChannelBlock, ControlChannelUnblock, ControlMessageReceive, DataplaneDrop, Event,
        EventError, LabelRegistry, SwitchFailure, WaitTime,
    };

    fn controller() -> ControllerId {
        ControllerId::new("127.0.0.1", 6633)
    }

    #[test]
    fn every_event_is_accepted_and_counted() {
        let registry = LabelRegistry::new();
        let events: Vec<Event> = vec![
            SwitchFailure::new(&registry, Dpid::new(4)).into(),
            ControlMessageReceive::new(
                &registry,
                Dpid::new(4),
                controller(),
                Fingerprint::new(serde_json::json!({"type": "echo"})),
            )
            .into(),
            DataplaneDrop::new(&registry, Fingerprint::new(serde_json::json!({"dl_dst": "ff"})))
                .into(),
            WaitTime::new(&registry, Duration::from_secs(3)).into(),
            ControlChannelBlock::new(&registry, Dpid::new(4), controller()).into(),
        ];

        let dry_run = DryRun::new();
        let summary = Replayer::new(events)
            .run(&mut dry_run.simulation())
            .unwrap();
        assert_eq!(summary.events_replayed, 5);
        assert_eq!(summary.retried_events, 0);

        let report = dry_run.report();
        assert_eq!(report.actions["crash_switch"], 1);
        assert_eq!(report.actions["schedule_message"], 1);
        assert_eq!(report.actions["drop_dp_event"], 1);
        assert_eq!(report.skipped_wait, Duration::from_secs(3));
        assert_eq!(report.blocked_channels, 1);
    }

    #[test]
    fn double_block_still_fails() {
        let registry = LabelRegistry::new();
        let events: Vec<Event> = vec![
            ControlChannelBlock::new(&registry, Dpid::new(1), controller()).into(),
            ControlChannelUnblock::new(&registry, Dpid::new(1), controller()).into(),
            ControlChannelBlock::new(&registry, Dpid::new(1), controller()).into(),
            ControlChannelBlock::new(&registry, Dpid::new(1), controller()).into(),
        ];

        let dry_run = DryRun::new();
        let mut replayer = Replayer::new(events);
        let err = replayer.run(&mut dry_run.simulation()).unwrap_err();
        assert!(matches!(
            err,
            ReplayError::EventFailed {
                source: EventError::ProtocolViolation(_),
                ..
            }
        ));
        assert_eq!(replayer.cursor(), 3);
    }
}

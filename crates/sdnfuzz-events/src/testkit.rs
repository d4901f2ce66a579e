//! In-memory simulation collaborators for tests.
//!
//! [`MockNetwork`] models just enough of a network (switches, links, hosts,
//! control channels, controllers, buffered messages and packets) for events
//! to be enacted against it, and records every collaborator call in order.
//! All handles produced by [`MockNetwork::simulation`] share one state, so a
//! test keeps the `MockNetwork` to inspect what replay did.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::rc::Rc;
use std::time::Duration;

use sdnfuzz_types::{ControllerId, Dpid, Fingerprint, PortNo};

use crate::error::CollaboratorError;
use crate::invariant::{Invariant, InvariantChecker};
use crate::sim::{
    BufferedDpEvent, ControlChannel, ControllerManager, ControllerRef, ControllerSync,
    DataplaneTrace, Endpoint, GodScheduler, IoLoop, Link, PatchPanel, PendingReceive,
    PendingStateChange, ReplayClock, Simulation, SwitchRef, Topology,
};

/// One collaborator call, in the order it happened.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    CrashSwitch(Dpid),
    RecoverSwitch(Dpid),
    SeverLink(Link),
    RepairLink(Link),
    MigrateHost {
        host: String,
        to: (Dpid, PortNo),
    },
    KillController(ControllerId),
    RebootController(ControllerId),
    BlockChannel(Dpid, ControllerId),
    UnblockChannel(Dpid, ControllerId),
    PollMessage(PendingReceive),
    Schedule(PendingReceive),
    PollStateChange(String),
    GcStateChange(String),
    PollDpEvent(Fingerprint),
    DropDpEvent(u64),
    PermitDpEvent(u64),
    InjectTraceEvent,
    CheckInvariant(Invariant),
    Sleep(Duration),
    IoTick,
}

impl Call {
    /// True for calls that change the network, as opposed to polls and
    /// the passage of time.
    pub fn is_effect(&self) -> bool {
        !matches!(
            self,
            Call::PollMessage(_)
                | Call::PollStateChange(_)
                | Call::PollDpEvent(_)
                | Call::CheckInvariant(_)
                | Call::Sleep(_)
                | Call::IoTick
        )
    }
}

type LinkKey = (Dpid, PortNo, Dpid, PortNo);

#[derive(Debug)]
struct Delayed<T> {
    item: T,
    polls_left: u32,
}

impl<T> Delayed<T> {
    /// Counts one poll; true once the item is visible.
    fn poll(&mut self) -> bool {
        if self.polls_left == 0 {
            return true;
        }
        self.polls_left -= 1;
        false
    }
}

#[derive(Debug, Default)]
struct MockState {
    /// dpid -> crashed
    switches: BTreeMap<Dpid, bool>,
    /// link -> up
    links: BTreeMap<LinkKey, bool>,
    hosts: BTreeMap<String, (Dpid, PortNo)>,
    /// (dpid, controller) -> blocked
    channels: HashMap<(Dpid, ControllerId), bool>,
    /// controller -> alive
    controllers: BTreeMap<ControllerId, bool>,
    recovery_timeouts: BTreeSet<Dpid>,
    messages: Vec<Delayed<PendingReceive>>,
    state_changes: Vec<Delayed<(ControllerId, String)>>,
    dp_events: Vec<Delayed<BufferedDpEvent>>,
    trace: Option<usize>,
    violations: BTreeMap<Invariant, Vec<String>>,
    next_dp_event_id: u64,
    calls: Vec<Call>,
}

type Shared = Rc<RefCell<MockState>>;

/// A scriptable in-memory network.
#[derive(Debug, Clone, Default)]
pub struct MockNetwork {
    state: Shared,
}

impl MockNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_switches(self, dpids: impl IntoIterator<Item = u64>) -> Self {
        {
            let mut state = self.state.borrow_mut();
            for dpid in dpids {
                state.switches.insert(Dpid::new(dpid), false);
            }
        }
        self
    }

    /// Adds an up link between two switch ports.
    pub fn with_link(self, start: (u64, u32), end: (u64, u32)) -> Self {
        let key = (
            Dpid::new(start.0),
            PortNo::new(start.1),
            Dpid::new(end.0),
            PortNo::new(end.1),
        );
        self.state.borrow_mut().links.insert(key, true);
        self
    }

    pub fn with_host(self, name: &str, dpid: u64, port: u32) -> Self {
        self.state
            .borrow_mut()
            .hosts
            .insert(name.to_string(), (Dpid::new(dpid), PortNo::new(port)));
        self
    }

    pub fn with_controller(self, id: ControllerId) -> Self {
        self.state.borrow_mut().controllers.insert(id, true);
        self
    }

    /// Adds an unblocked control channel.
    pub fn with_channel(self, dpid: u64, controller: ControllerId) -> Self {
        self.state
            .borrow_mut()
            .channels
            .insert((Dpid::new(dpid), controller), false);
        self
    }

    /// Makes recovering this switch time out.
    pub fn with_recovery_timeout(self, dpid: u64) -> Self {
        self.state.borrow_mut().recovery_timeouts.insert(Dpid::new(dpid));
        self
    }

    /// Buffers a message at the god scheduler that shows up as waiting only
    /// after `polls` unsuccessful polls.
    pub fn deliver_after(self, pending: PendingReceive, polls: u32) -> Self {
        self.state.borrow_mut().messages.push(Delayed {
            item: pending,
            polls_left: polls,
        });
        self
    }

    /// Reports a controller state change as pending after `polls` polls.
    pub fn state_change_after(self, controller: ControllerId, name: &str, polls: u32) -> Self {
        self.state.borrow_mut().state_changes.push(Delayed {
            item: (controller, name.to_string()),
            polls_left: polls,
        });
        self
    }

    /// Buffers a dataplane packet at the patch panel after `polls` polls.
    pub fn buffer_dp_event(self, fingerprint: Fingerprint, polls: u32) -> Self {
        {
            let mut state = self.state.borrow_mut();
            state.next_dp_event_id += 1;
            let id = state.next_dp_event_id;
            state.dp_events.push(Delayed {
                item: BufferedDpEvent { id, fingerprint },
                polls_left: polls,
            });
        }
        self
    }

    /// Configures a dataplane trace holding `packets` packets.
    pub fn with_trace(self, packets: usize) -> Self {
        self.state.borrow_mut().trace = Some(packets);
        self
    }

    pub fn with_violation(self, invariant: Invariant, violation: &str) -> Self {
        self.state
            .borrow_mut()
            .violations
            .entry(invariant)
            .or_default()
            .push(violation.to_string());
        self
    }

    /// A simulation wired to this network.
    ///
    /// The dataplane trace is only attached if one was configured.
    pub fn simulation(&self) -> Simulation {
        let sim = Simulation::new()
            .with_topology(MockTopology(Rc::clone(&self.state)))
            .with_controllers(MockControllers(Rc::clone(&self.state)))
            .with_god_scheduler(MockScheduler(Rc::clone(&self.state)))
            .with_controller_sync(MockSync(Rc::clone(&self.state)))
            .with_patch_panel(MockPatchPanel(Rc::clone(&self.state)))
            .with_invariant_checker(MockChecker(Rc::clone(&self.state)))
            .with_io_loop(MockIoLoop(Rc::clone(&self.state)))
            .with_clock(MockClock(Rc::clone(&self.state)));

        if self.state.borrow().trace.is_some() {
            sim.with_dataplane_trace(MockTrace(Rc::clone(&self.state)))
        } else {
            sim
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.borrow().calls.clone()
    }

    /// Calls that changed the network, in order.
    pub fn effects(&self) -> Vec<Call> {
        self.state
            .borrow()
            .calls
            .iter()
            .filter(|call| call.is_effect())
            .cloned()
            .collect()
    }

    pub fn host_location(&self, name: &str) -> Option<(Dpid, PortNo)> {
        self.state.borrow().hosts.get(name).copied()
    }

    pub fn is_crashed(&self, dpid: u64) -> bool {
        self.state
            .borrow()
            .switches
            .get(&Dpid::new(dpid))
            .copied()
            .unwrap_or(false)
    }

    pub fn is_link_up(&self, start: (u64, u32), end: (u64, u32)) -> bool {
        let key = (
            Dpid::new(start.0),
            PortNo::new(start.1),
            Dpid::new(end.0),
            PortNo::new(end.1),
        );
        self.state.borrow().links.get(&key).copied().unwrap_or(false)
    }

    pub fn is_alive(&self, controller: &ControllerId) -> bool {
        self.state
            .borrow()
            .controllers
            .get(controller)
            .copied()
            .unwrap_or(false)
    }

    pub fn is_blocked(&self, dpid: u64, controller: &ControllerId) -> bool {
        self.state
            .borrow()
            .channels
            .get(&(Dpid::new(dpid), controller.clone()))
            .copied()
            .unwrap_or(false)
    }

    /// Packets still left in the dataplane trace.
    pub fn trace_remaining(&self) -> Option<usize> {
        self.state.borrow().trace
    }

    /// Total time the replay clock was paused.
    pub fn slept(&self) -> Duration {
        self.state
            .borrow()
            .calls
            .iter()
            .filter_map(|call| match call {
                Call::Sleep(duration) => Some(*duration),
                _ => None,
            })
            .sum()
    }
}

fn record(state: &Shared, call: Call) {
    state.borrow_mut().calls.push(call);
}

fn link_key(link: &Link) -> LinkKey {
    (link.start.dpid, link.start_port, link.end.dpid, link.end_port)
}

fn no_such_link(link: &Link) -> CollaboratorError {
    CollaboratorError::NoSuchLink {
        start_dpid: link.start.dpid,
        start_port: link.start_port,
        end_dpid: link.end.dpid,
        end_port: link.end_port,
    }
}

struct MockTopology(Shared);

impl MockTopology {
    fn set_link(&mut self, link: &Link, up: bool) -> Result<(), CollaboratorError> {
        let mut state = self.0.borrow_mut();
        let slot = state
            .links
            .get_mut(&link_key(link))
            .ok_or_else(|| no_such_link(link))?;
        *slot = up;
        state
            .calls
            .push(if up { Call::RepairLink(*link) } else { Call::SeverLink(*link) });
        Ok(())
    }
}

impl Topology for MockTopology {
    fn get_switch(&self, dpid: Dpid) -> Result<SwitchRef, CollaboratorError> {
        if self.0.borrow().switches.contains_key(&dpid) {
            Ok(SwitchRef::new(dpid))
        } else {
            Err(CollaboratorError::NoSuchSwitch(dpid))
        }
    }

    fn crash_switch(&mut self, switch: &SwitchRef) -> Result<(), CollaboratorError> {
        let mut state = self.0.borrow_mut();
        state.switches.insert(switch.dpid, true);
        state.calls.push(Call::CrashSwitch(switch.dpid));
        Ok(())
    }

    fn recover_switch(&mut self, switch: &SwitchRef) -> Result<(), CollaboratorError> {
        let mut state = self.0.borrow_mut();
        state.calls.push(Call::RecoverSwitch(switch.dpid));
        state.switches.insert(switch.dpid, false);
        if state.recovery_timeouts.contains(&switch.dpid) {
            return Err(CollaboratorError::Timeout(format!(
                "no controller answered switch {}",
                switch.dpid
            )));
        }
        Ok(())
    }

    fn sever_link(&mut self, link: &Link) -> Result<(), CollaboratorError> {
        self.set_link(link, false)
    }

    fn repair_link(&mut self, link: &Link) -> Result<(), CollaboratorError> {
        self.set_link(link, true)
    }

    fn migrate_host(
        &mut self,
        old_dpid: Dpid,
        old_port: PortNo,
        new_dpid: Dpid,
        new_port: PortNo,
    ) -> Result<(), CollaboratorError> {
        let mut state = self.0.borrow_mut();
        if !state.switches.contains_key(&new_dpid) {
            return Err(CollaboratorError::NoSuchSwitch(new_dpid));
        }
        let host = state
            .hosts
            .iter()
            .find(|(_, location)| **location == (old_dpid, old_port))
            .map(|(name, _)| name.clone())
            .ok_or(CollaboratorError::NoSuchPort {
                dpid: old_dpid,
                port: old_port,
            })?;
        state.hosts.insert(host.clone(), (new_dpid, new_port));
        state.calls.push(Call::MigrateHost {
            host,
            to: (new_dpid, new_port),
        });
        Ok(())
    }

    fn get_connected_port(
        &self,
        switch: &SwitchRef,
        port: PortNo,
    ) -> Result<Option<Endpoint>, CollaboratorError> {
        let state = self.0.borrow();
        if let Some((name, _)) = state
            .hosts
            .iter()
            .find(|(_, location)| **location == (switch.dpid, port))
        {
            return Ok(Some(Endpoint::Host { name: name.clone() }));
        }
        let peer = state.links.iter().find_map(|(&(a, a_port, b, b_port), &up)| {
            if !up {
                None
            } else if (a, a_port) == (switch.dpid, port) {
                Some((b, b_port))
            } else if (b, b_port) == (switch.dpid, port) {
                Some((a, a_port))
            } else {
                None
            }
        });
        Ok(peer.map(|(dpid, port)| Endpoint::Switch {
            switch: SwitchRef::new(dpid),
            port,
        }))
    }

    fn control_channel<'a>(
        &'a mut self,
        switch: &SwitchRef,
        controller: &ControllerId,
    ) -> Result<Box<dyn ControlChannel + 'a>, CollaboratorError> {
        let key = (switch.dpid, controller.clone());
        if !self.0.borrow().channels.contains_key(&key) {
            return Err(CollaboratorError::NoSuchChannel {
                dpid: switch.dpid,
                controller: controller.clone(),
            });
        }
        Ok(Box::new(MockChannel {
            state: Rc::clone(&self.0),
            key,
        }))
    }
}

struct MockChannel {
    state: Shared,
    key: (Dpid, ControllerId),
}

impl MockChannel {
    fn set_blocked(&mut self, blocked: bool) {
        let mut state = self.state.borrow_mut();
        state.channels.insert(self.key.clone(), blocked);
        let (dpid, controller) = self.key.clone();
        state.calls.push(if blocked {
            Call::BlockChannel(dpid, controller)
        } else {
            Call::UnblockChannel(dpid, controller)
        });
    }
}

impl ControlChannel for MockChannel {
    fn is_blocked(&self) -> bool {
        self.state
            .borrow()
            .channels
            .get(&self.key)
            .copied()
            .unwrap_or(false)
    }

    fn block(&mut self) {
        self.set_blocked(true);
    }

    fn unblock(&mut self) {
        self.set_blocked(false);
    }
}

struct MockControllers(Shared);

impl MockControllers {
    fn set_alive(&mut self, controller: &ControllerRef, alive: bool) -> Result<(), CollaboratorError> {
        let mut state = self.0.borrow_mut();
        let slot = state
            .controllers
            .get_mut(&controller.id)
            .ok_or_else(|| CollaboratorError::NoSuchController(controller.id.clone()))?;
        *slot = alive;
        let id = controller.id.clone();
        state.calls.push(if alive {
            Call::RebootController(id)
        } else {
            Call::KillController(id)
        });
        Ok(())
    }
}

impl ControllerManager for MockControllers {
    fn get_controller(&self, id: &ControllerId) -> Result<ControllerRef, CollaboratorError> {
        if self.0.borrow().controllers.contains_key(id) {
            Ok(ControllerRef::new(id.clone()))
        } else {
            Err(CollaboratorError::NoSuchController(id.clone()))
        }
    }

    fn kill_controller(&mut self, controller: &ControllerRef) -> Result<(), CollaboratorError> {
        self.set_alive(controller, false)
    }

    fn reboot_controller(&mut self, controller: &ControllerRef) -> Result<(), CollaboratorError> {
        self.set_alive(controller, true)
    }
}

struct MockScheduler(Shared);

impl GodScheduler for MockScheduler {
    fn message_waiting(&self, pending: &PendingReceive) -> bool {
        let mut state = self.0.borrow_mut();
        state.calls.push(Call::PollMessage(pending.clone()));
        state
            .messages
            .iter_mut()
            .find(|delayed| delayed.item == *pending)
            .is_some_and(Delayed::poll)
    }

    fn schedule(&mut self, pending: &PendingReceive) -> Result<(), CollaboratorError> {
        let mut state = self.0.borrow_mut();
        let index = state
            .messages
            .iter()
            .position(|delayed| delayed.item == *pending)
            .ok_or_else(|| CollaboratorError::Failed(format!("no buffered message {}", pending.fingerprint)))?;
        state.messages.remove(index);
        state.calls.push(Call::Schedule(pending.clone()));
        Ok(())
    }
}

struct MockSync(Shared);

impl MockSync {
    fn matches(item: &(ControllerId, String), change: &PendingStateChange) -> bool {
        item.0 == change.controller_id && item.1 == change.name
    }
}

impl ControllerSync for MockSync {
    fn state_change_pending(&self, change: &PendingStateChange) -> bool {
        let mut state = self.0.borrow_mut();
        state.calls.push(Call::PollStateChange(change.name.clone()));
        state
            .state_changes
            .iter_mut()
            .find(|delayed| Self::matches(&delayed.item, change))
            .is_some_and(Delayed::poll)
    }

    fn gc_pending_state_change(&mut self, change: &PendingStateChange) {
        let mut state = self.0.borrow_mut();
        state
            .state_changes
            .retain(|delayed| !Self::matches(&delayed.item, change));
        state.calls.push(Call::GcStateChange(change.name.clone()));
    }
}

struct MockPatchPanel(Shared);

impl MockPatchPanel {
    fn release(&mut self, event: &BufferedDpEvent, call: Call) -> Result<(), CollaboratorError> {
        let mut state = self.0.borrow_mut();
        let index = state
            .dp_events
            .iter()
            .position(|delayed| delayed.item.id == event.id)
            .ok_or_else(|| CollaboratorError::Failed(format!("dataplane event {} not buffered", event.id)))?;
        state.dp_events.remove(index);
        state.calls.push(call);
        Ok(())
    }
}

impl PatchPanel for MockPatchPanel {
    fn get_buffered_dp_event(&self, fingerprint: &Fingerprint) -> Option<BufferedDpEvent> {
        let mut state = self.0.borrow_mut();
        state.calls.push(Call::PollDpEvent(fingerprint.clone()));
        let delayed = state
            .dp_events
            .iter_mut()
            .find(|delayed| delayed.item.fingerprint == *fingerprint)?;
        delayed.poll().then(|| delayed.item.clone())
    }

    fn drop_dp_event(&mut self, event: &BufferedDpEvent) -> Result<(), CollaboratorError> {
        self.release(event, Call::DropDpEvent(event.id))
    }

    fn permit_dp_event(&mut self, event: &BufferedDpEvent) -> Result<(), CollaboratorError> {
        self.release(event, Call::PermitDpEvent(event.id))
    }
}

struct MockTrace(Shared);

impl DataplaneTrace for MockTrace {
    fn inject_trace_event(&mut self) -> Result<(), CollaboratorError> {
        let mut state = self.0.borrow_mut();
        match state.trace {
            Some(remaining) if remaining > 0 => {
                state.trace = Some(remaining - 1);
                state.calls.push(Call::InjectTraceEvent);
                Ok(())
            }
            _ => Err(CollaboratorError::Failed("dataplane trace exhausted".to_string())),
        }
    }
}

struct MockChecker(Shared);

impl InvariantChecker for MockChecker {
    fn check(&self, invariant: Invariant, _sim: &Simulation) -> Vec<String> {
        let mut state = self.0.borrow_mut();
        state.calls.push(Call::CheckInvariant(invariant));
        state.violations.get(&invariant).cloned().unwrap_or_default()
    }
}

struct MockIoLoop(Shared);

impl IoLoop for MockIoLoop {
    fn run_once(&mut self, _budget: Duration) {
        record(&self.0, Call::IoTick);
    }
}

struct MockClock(Shared);

impl ReplayClock for MockClock {
    fn sleep(&mut self, duration: Duration) {
        record(&self.0, Call::Sleep(duration));
    }
}

//! Replay protocol tests.
//!
//! Drive superlogs through [`Replayer`] against the in-memory network and
//! check ordering, retry, abort and failure behavior from the outside.

use std::sync::Arc;
use std::time::Duration;

use sdnfuzz_events::sim::PendingReceive;
use sdnfuzz_events::testkit::{Call, MockNetwork};
use sdnfuzz_events::{
    CodecError, ControlChannelBlock, ControlMessageReceive, ControllerFailure, Event,
    EventCodec, EventError, LabelRegistry, SwitchFailure, SwitchRecovery, TrafficInjection,
};
use sdnfuzz_replay::{
    AbortHandle, ReplayError, Replayer, RetryPolicy, StepOutcome, SuperlogError, parse_superlog,
};
use sdnfuzz_types::{ControllerId, Dpid, Fingerprint};

fn controller() -> ControllerId {
    ControllerId::new("127.0.0.1", 6633)
}

fn hello() -> Fingerprint {
    Fingerprint::new(serde_json::json!({"type": "hello", "xid": 7}))
}

fn pending_hello(dpid: u64) -> PendingReceive {
    PendingReceive {
        dpid: Dpid::new(dpid),
        controller_id: controller(),
        fingerprint: hello(),
    }
}

// ============================================================================
// Ordering
// ============================================================================

#[test]
fn events_are_enacted_once_each_in_file_order() {
    let registry = LabelRegistry::new();
    let events: Vec<Event> = vec![
        SwitchFailure::new(&registry, Dpid::new(1)).into(),
        SwitchFailure::new(&registry, Dpid::new(2)).into(),
        ControllerFailure::new(&registry, controller()).into(),
        SwitchRecovery::new(&registry, Dpid::new(2)).into(),
        SwitchRecovery::new(&registry, Dpid::new(1)).into(),
    ];
    let network = MockNetwork::new()
        .with_switches([1, 2])
        .with_controller(controller());

    let summary = Replayer::new(events)
        .run(&mut network.simulation())
        .expect("replay failed");

    assert_eq!(summary.events_replayed, 5);
    assert_eq!(summary.total_attempts, 5);
    assert_eq!(
        network.effects(),
        [
            Call::CrashSwitch(Dpid::new(1)),
            Call::CrashSwitch(Dpid::new(2)),
            Call::KillController(controller()),
            Call::RecoverSwitch(Dpid::new(2)),
            Call::RecoverSwitch(Dpid::new(1)),
        ]
    );
}

#[test]
fn pending_event_is_retried_in_place() {
    let registry = LabelRegistry::new();
    let receive = ControlMessageReceive::new(&registry, Dpid::new(3), controller(), hello());
    let events: Vec<Event> = vec![
        receive.into(),
        SwitchFailure::new(&registry, Dpid::new(3)).into(),
    ];
    let network = MockNetwork::new()
        .with_switches([3])
        .deliver_after(pending_hello(3), 2);

    let summary = Replayer::new(events)
        .run(&mut network.simulation())
        .expect("replay failed");

    assert_eq!(summary.total_attempts, 4);
    assert_eq!(summary.retried_events, 1);

    // Two unsuccessful polls, each followed by a network tick, and nothing
    // from the next event until the message is delivered.
    assert_eq!(
        network.calls(),
        [
            Call::PollMessage(pending_hello(3)),
            Call::IoTick,
            Call::PollMessage(pending_hello(3)),
            Call::IoTick,
            Call::PollMessage(pending_hello(3)),
            Call::Schedule(pending_hello(3)),
            Call::CrashSwitch(Dpid::new(3)),
        ]
    );
}

// ============================================================================
// Failures
// ============================================================================

#[test]
fn protocol_violation_stops_the_run() {
    let registry = LabelRegistry::new();
    let events: Vec<Event> = vec![
        ControlChannelBlock::new(&registry, Dpid::new(5), controller()).into(),
        ControlChannelBlock::new(&registry, Dpid::new(5), controller()).into(),
        SwitchFailure::new(&registry, Dpid::new(5)).into(),
    ];
    let second = events[1].label().clone();
    let network = MockNetwork::new()
        .with_switches([5])
        .with_channel(5, controller());

    let mut replayer = Replayer::new(events);
    let err = replayer.run(&mut network.simulation()).unwrap_err();

    match err {
        ReplayError::EventFailed {
            label,
            class,
            fingerprint,
            attempts,
            source: EventError::ProtocolViolation(_),
        } => {
            assert_eq!(label, second);
            assert_eq!(class, "ControlChannelBlock");
            assert_eq!(attempts, 1);
            assert_eq!(fingerprint.map(|fp| fp.tag), Some("ControlChannelBlock".to_string()));
        }
        other => panic!("unexpected error: {other}"),
    }

    assert_eq!(replayer.cursor(), 1);
    assert!(!network.is_crashed(5));
    assert_eq!(
        network.effects(),
        [Call::BlockChannel(Dpid::new(5), controller())]
    );
}

#[test]
fn missing_trace_is_fatal_at_first_use() {
    let registry = LabelRegistry::new();
    let network = MockNetwork::new().with_switches([1]);
    let mut replayer = Replayer::new(vec![
        SwitchFailure::new(&registry, Dpid::new(1)).into(),
        TrafficInjection::new(&registry).into(),
    ]);

    let err = replayer.run(&mut network.simulation()).unwrap_err();
    assert!(matches!(
        err,
        ReplayError::EventFailed {
            class: "TrafficInjection",
            source: EventError::MissingCollaborator("dataplane trace"),
            ..
        }
    ));
    assert_eq!(err.exit_code(), 1);
}

#[test]
fn malformed_record_is_rejected_before_any_simulation_call() {
    let superlog = concat!(
        r#"{"class":"SwitchFailure","label":"e1","time":[1,0],"dpid":8}"#,
        "\n",
        r#"{"class":"LinkFailure","label":"e2","time":[2,0],"start_dpid":8,"start_port_no":3,"end_dpid":15}"#,
        "\n",
    );
    let network = MockNetwork::new().with_switches([8, 15]);
    let codec = EventCodec::new(Arc::new(LabelRegistry::new()));

    let err = parse_superlog(superlog.as_bytes(), &codec).unwrap_err();

    match &err {
        SuperlogError::Decode {
            line: 2,
            source: CodecError::MissingField { field, record },
        } => {
            assert_eq!(*field, "end_port_no");
            assert!(record.contains("LinkFailure"));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(err.to_string().contains("end_port_no"));
    assert!(network.calls().is_empty());
}

// ============================================================================
// Abort and Budget
// ============================================================================

#[test]
fn abort_stops_before_the_next_attempt() {
    let registry = LabelRegistry::new();
    let receive = ControlMessageReceive::new(&registry, Dpid::new(1), controller(), hello());
    let waiting_label = receive.meta.label.clone();
    let network = MockNetwork::new().with_switches([1]);
    let mut sim = network.simulation();

    let abort = AbortHandle::new();
    let mut replayer = Replayer::new(vec![
        SwitchFailure::new(&registry, Dpid::new(1)).into(),
        receive.into(),
    ])
    .with_abort_handle(abort.clone());

    assert!(matches!(
        replayer.step(&mut sim).unwrap(),
        StepOutcome::Advanced { .. }
    ));
    assert!(matches!(
        replayer.step(&mut sim).unwrap(),
        StepOutcome::Retrying { attempts: 1, .. }
    ));

    abort.abort();
    let err = replayer.step(&mut sim).unwrap_err();

    match err {
        ReplayError::Aborted {
            label,
            cursor,
            attempts,
        } => {
            assert_eq!(label, waiting_label);
            assert_eq!(cursor, 1);
            assert_eq!(attempts, 1);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(replayer.cursor(), 1);
    assert_eq!(replayer.current().map(Event::label), Some(&waiting_label));
}

#[test]
fn exhausted_budget_names_the_stuck_event() {
    let registry = LabelRegistry::new();
    let receive = ControlMessageReceive::new(&registry, Dpid::new(1), controller(), hello());
    let stuck = receive.meta.label.clone();
    let network = MockNetwork::new().with_switches([1]);

    let mut replayer = Replayer::new(vec![receive.into()]).with_policy(
        RetryPolicy::unbounded()
            .with_max_attempts(4)
            .with_retry_interval(Duration::from_millis(1)),
    );
    let err = replayer.run(&mut network.simulation()).unwrap_err();

    match &err {
        ReplayError::RetryBudgetExhausted {
            label,
            class,
            attempts,
            fingerprint,
            ..
        } => {
            assert_eq!(label, &stuck);
            assert_eq!(*class, "ControlMessageReceive");
            assert_eq!(*attempts, 4);
            assert!(fingerprint.is_some());
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(err.to_string().contains(stuck.as_str()));
    assert_eq!(replayer.cursor(), 0);
    assert_eq!(
        network
            .calls()
            .iter()
            .filter(|call| matches!(call, Call::PollMessage(_)))
            .count(),
        4
    );
}

#[test]
fn zero_attempt_cap_still_enacts_ready_events() {
    let registry = LabelRegistry::new();
    let events: Vec<Event> = vec![SwitchFailure::new(&registry, Dpid::new(1)).into()];
    let network = MockNetwork::new().with_switches([1]);

    let summary = Replayer::new(events)
        .with_policy(RetryPolicy::default().with_max_attempts(0))
        .run(&mut network.simulation())
        .expect("replay failed");

    assert_eq!(summary.events_replayed, 1);
    assert_eq!(network.effects(), [Call::CrashSwitch(Dpid::new(1))]);
}

#[test]
fn abort_from_another_thread() {
    let registry = LabelRegistry::new();
    let receive = ControlMessageReceive::new(&registry, Dpid::new(1), controller(), hello());
    let network = MockNetwork::new().with_switches([1]);

    let mut replayer = Replayer::new(vec![receive.into()]);
    let abort = replayer.abort_handle();
    std::thread::spawn(move || abort.abort())
        .join()
        .expect("abort thread panicked");

    let err = replayer.run(&mut network.simulation()).unwrap_err();
    assert!(matches!(err, ReplayError::Aborted { cursor: 0, attempts: 0, .. }));
    assert!(network.calls().is_empty());
}

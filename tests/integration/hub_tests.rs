//! Door service driving the snapshot hub, as the server wires them.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use doorlink::app::service::DoorService;
use doorlink::config::DoorConfig;
use doorlink::fsm::{CurrentState, DoorSnapshot, TargetState};
use doorlink::rpc::channels::{BroadcastSink, SessionHub, SharedHub, WriteSignal};

use crate::mock_hw::{MockDoor, MockTimers};

fn hub() -> SharedHub {
    Rc::new(RefCell::new(SessionHub::new(Rc::new(WriteSignal::new()))))
}

#[test]
fn every_client_sees_the_whole_transition() {
    let hub = hub();
    let a = SessionHub::subscribe(&hub, 1);
    let b = SessionHub::subscribe(&hub, 2);

    let mut svc = DoorService::new(&DoorConfig::default());
    let mut hw = MockDoor::simulated(Duration::from_secs(5));
    let mut timers = MockTimers::new();
    let mut sink = BroadcastSink::new(hub.clone());

    svc.request_target(TargetState::Open, &mut hw, &mut timers, &mut sink);
    let resolve = timers
        .take(doorlink::app::ports::TimerKind::SimResolve)
        .unwrap();
    svc.on_timer(resolve, &mut hw, &mut timers, &mut sink);

    let moving = DoorSnapshot {
        current: CurrentState::Opening,
        target: TargetState::Open,
    };
    let done = DoorSnapshot {
        current: CurrentState::Open,
        target: TargetState::Open,
    };
    for sub in [&a, &b] {
        let seen: Vec<_> = std::iter::from_fn(|| sub.try_next()).collect();
        assert_eq!(seen, vec![moving, moving, done]);
    }
}

#[test]
fn no_op_request_is_still_answered() {
    let hub = hub();
    let a = SessionHub::subscribe(&hub, 1);

    let mut svc = DoorService::new(&DoorConfig::default());
    let mut sink = BroadcastSink::new(hub.clone());
    svc.request_target(
        TargetState::Close,
        &mut MockDoor::closed(),
        &mut MockTimers::new(),
        &mut sink,
    );

    assert_eq!(a.try_next(), Some(svc.snapshot()));
    assert_eq!(a.try_next(), None);
}

#[test]
fn late_subscriber_sees_only_later_snapshots() {
    let hub = hub();
    let mut svc = DoorService::new(&DoorConfig::default());
    let mut hw = MockDoor::closed();
    let mut timers = MockTimers::new();
    let mut sink = BroadcastSink::new(hub.clone());

    svc.request_target(TargetState::Open, &mut hw, &mut timers, &mut sink);
    let late = SessionHub::subscribe(&hub, 9);
    assert_eq!(late.try_next(), None);

    hw.set_open();
    svc.poll(&mut hw, &mut timers, &mut sink);
    assert_eq!(late.try_next().map(|s| s.current), Some(CurrentState::Open));
}

#[test]
fn disconnected_clients_leave_the_hub() {
    let hub = hub();
    {
        let _a = SessionHub::subscribe(&hub, 1);
        let _b = SessionHub::subscribe(&hub, 2);
        assert_eq!(hub.borrow().subscriber_count(), 2);
    }
    assert_eq!(hub.borrow().subscriber_count(), 0);

    // Publishing with nobody listening is fine.
    hub.borrow_mut().publish(DoorSnapshot {
        current: CurrentState::Close,
        target: TargetState::Close,
    });
    assert!(hub.borrow_mut().take_overflowed().is_empty());
}

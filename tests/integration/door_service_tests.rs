//! End-to-end door service behavior against mock adapters.

use std::time::Duration;

use doorlink::app::commands::DoorCommand;
use doorlink::app::events::DoorEvent;
use doorlink::app::ports::TimerKind;
use doorlink::app::service::DoorService;
use doorlink::config::{DoorConfig, StoppedRecovery};
use doorlink::error::HardwareError;
use doorlink::fsm::{CurrentState, DoorSnapshot, TargetState};

use crate::mock_hw::{MockDoor, MockTimers, RecordingSink};

fn snap(current: CurrentState, target: TargetState) -> DoorSnapshot {
    DoorSnapshot { current, target }
}

fn rig(door: MockDoor) -> (DoorService, MockDoor, MockTimers, RecordingSink) {
    (
        DoorService::new(&DoorConfig::default()),
        door,
        MockTimers::new(),
        RecordingSink::new(),
    )
}

fn rig_with(config: DoorConfig, door: MockDoor) -> (DoorService, MockDoor, MockTimers, RecordingSink) {
    (
        DoorService::new(&config),
        door,
        MockTimers::new(),
        RecordingSink::new(),
    )
}

/// Fire the pending relay release, as the runtime does one pulse width
/// after engaging.
fn end_pulse(svc: &mut DoorService, hw: &mut MockDoor, t: &mut MockTimers, ev: &mut RecordingSink) {
    let release = t.take(TimerKind::RelayRelease).expect("no relay pulse pending");
    svc.on_timer(release, hw, t, ev);
}

// ── Normal motion ─────────────────────────────────────────────

#[test]
fn open_with_sensors_settles_and_cancels_stall() {
    let (mut svc, mut hw, mut t, mut ev) = rig(MockDoor::closed());

    svc.request_target(TargetState::Open, &mut hw, &mut t, &mut ev);
    assert_eq!(hw.pulse_count(), 1);
    assert!(hw.relay_on);
    assert_eq!(t.delay(TimerKind::RelayRelease), Some(Duration::from_millis(500)));
    assert_eq!(svc.snapshot(), snap(CurrentState::Opening, TargetState::Open));
    assert_eq!(t.delay(TimerKind::Stall), Some(Duration::from_secs(20)));
    assert!(t.pending(TimerKind::SimResolve).is_none());
    assert!(svc.stall_armed());

    end_pulse(&mut svc, &mut hw, &mut t, &mut ev);
    assert!(!hw.relay_on);
    assert!(!svc.relay_busy());

    hw.set_between();
    svc.poll(&mut hw, &mut t, &mut ev);
    assert_eq!(svc.snapshot().current, CurrentState::Opening);

    hw.set_open();
    svc.poll(&mut hw, &mut t, &mut ev);
    assert_eq!(svc.snapshot(), snap(CurrentState::Open, TargetState::Open));
    assert!(t.pending(TimerKind::Stall).is_none());
    assert!(!svc.stall_armed());
    assert_eq!(hw.pulse_count(), 1);
}

#[test]
fn change_events_carry_the_final_snapshot() {
    let (mut svc, mut hw, mut t, mut ev) = rig(MockDoor::closed());
    svc.request_target(TargetState::Open, &mut hw, &mut t, &mut ev);

    let moving = snap(CurrentState::Opening, TargetState::Open);
    assert_eq!(
        ev.events,
        vec![
            DoorEvent::TargetChanged {
                from: TargetState::Close,
                snapshot: moving
            },
            DoorEvent::CurrentChanged {
                from: CurrentState::Close,
                snapshot: moving
            },
        ]
    );
}

#[test]
fn simulated_door_resolves_on_travel_timer() {
    let (mut svc, mut hw, mut t, mut ev) =
        rig(MockDoor::simulated(Duration::from_millis(5200)));

    svc.request_target(TargetState::Open, &mut hw, &mut t, &mut ev);
    assert_eq!(t.delay(TimerKind::SimResolve), Some(Duration::from_millis(5200)));

    end_pulse(&mut svc, &mut hw, &mut t, &mut ev);
    let resolve = t.take(TimerKind::SimResolve).unwrap();
    svc.on_timer(resolve, &mut hw, &mut t, &mut ev);

    assert_eq!(svc.snapshot(), snap(CurrentState::Open, TargetState::Open));
    assert!(t.pending(TimerKind::Stall).is_none());
    assert_eq!(
        ev.broadcasts().last(),
        Some(&snap(CurrentState::Open, TargetState::Open))
    );
}

#[test]
fn request_for_current_position_is_a_no_op() {
    let (mut svc, mut hw, mut t, mut ev) = rig(MockDoor::closed());

    svc.request_target(TargetState::Close, &mut hw, &mut t, &mut ev);

    assert_eq!(hw.pulse_count(), 0);
    assert!(t.armed.is_empty());
    assert_eq!(
        ev.events,
        vec![DoorEvent::Unchanged(snap(
            CurrentState::Close,
            TargetState::Close
        ))]
    );
}

#[test]
fn repeated_target_is_a_no_op_even_when_not_reached() {
    let (mut svc, mut hw, mut t, mut ev) = rig(MockDoor::closed());

    svc.request_target(TargetState::Open, &mut hw, &mut t, &mut ev);
    end_pulse(&mut svc, &mut hw, &mut t, &mut ev);
    // Obstruction: the opener reversed and the door closed again.
    svc.poll(&mut hw, &mut t, &mut ev);
    let fell_back = snap(CurrentState::Close, TargetState::Open);
    assert_eq!(svc.snapshot(), fell_back);
    ev.clear();

    svc.request_target(TargetState::Open, &mut hw, &mut t, &mut ev);
    assert_eq!(hw.pulse_count(), 1);
    assert!(!svc.relay_busy());
    assert_eq!(svc.snapshot(), fell_back);
    assert_eq!(ev.events, vec![DoorEvent::Unchanged(fell_back)]);
}

// ── Interrupt and recovery ────────────────────────────────────

#[test]
fn request_while_moving_interrupts() {
    let (mut svc, mut hw, mut t, mut ev) =
        rig(MockDoor::simulated(Duration::from_secs(5)));

    svc.request_target(TargetState::Open, &mut hw, &mut t, &mut ev);
    end_pulse(&mut svc, &mut hw, &mut t, &mut ev);
    let epoch = svc.epoch();
    ev.clear();

    svc.request_target(TargetState::Close, &mut hw, &mut t, &mut ev);

    let stopped = snap(CurrentState::Stopped, TargetState::Open);
    assert_eq!(hw.pulse_count(), 2);
    assert_eq!(svc.snapshot(), stopped);
    assert!(svc.epoch() > epoch);
    assert!(t.pending(TimerKind::Stall).is_none());
    assert!(t.pending(TimerKind::SimResolve).is_none());
    assert!(t.pending(TimerKind::RelayRelease).is_some());
    assert!(!svc.stall_armed());
    assert_eq!(
        ev.events,
        vec![
            DoorEvent::Interrupted(stopped),
            DoorEvent::CurrentChanged {
                from: CurrentState::Opening,
                snapshot: stopped
            },
        ]
    );
}

#[test]
fn timers_from_an_interrupted_transition_are_stale() {
    let (mut svc, mut hw, mut t, mut ev) =
        rig(MockDoor::simulated(Duration::from_secs(5)));

    svc.request_target(TargetState::Open, &mut hw, &mut t, &mut ev);
    let old_stall = t.pending(TimerKind::Stall).unwrap();
    let old_resolve = t.pending(TimerKind::SimResolve).unwrap();
    end_pulse(&mut svc, &mut hw, &mut t, &mut ev);

    svc.request_target(TargetState::Close, &mut hw, &mut t, &mut ev);
    end_pulse(&mut svc, &mut hw, &mut t, &mut ev);
    ev.clear();

    svc.on_timer(old_resolve, &mut hw, &mut t, &mut ev);
    svc.on_timer(old_stall, &mut hw, &mut t, &mut ev);
    assert_eq!(svc.snapshot(), snap(CurrentState::Stopped, TargetState::Open));
    assert!(ev.events.is_empty());
}

#[test]
fn stopped_door_reverses_last_motion_by_default() {
    let (mut svc, mut hw, mut t, mut ev) =
        rig(MockDoor::simulated(Duration::from_secs(5)));

    svc.request_target(TargetState::Open, &mut hw, &mut t, &mut ev);
    end_pulse(&mut svc, &mut hw, &mut t, &mut ev);
    svc.request_target(TargetState::Open, &mut hw, &mut t, &mut ev);
    end_pulse(&mut svc, &mut hw, &mut t, &mut ev);
    assert_eq!(svc.snapshot().current, CurrentState::Stopped);

    svc.request_target(TargetState::Open, &mut hw, &mut t, &mut ev);
    assert_eq!(hw.pulse_count(), 3);
    assert_eq!(svc.snapshot(), snap(CurrentState::Closing, TargetState::Close));
    assert!(t.pending(TimerKind::Stall).is_some());
    assert!(t.pending(TimerKind::SimResolve).is_some());
    assert_eq!(svc.epoch(), 3);
}

#[test]
fn stopped_door_can_honor_the_request() {
    let config = DoorConfig {
        stopped_recovery: StoppedRecovery::HonorRequest,
        ..DoorConfig::default()
    };
    let (mut svc, mut hw, mut t, mut ev) =
        rig_with(config, MockDoor::simulated(Duration::from_secs(5)));

    svc.request_target(TargetState::Open, &mut hw, &mut t, &mut ev);
    end_pulse(&mut svc, &mut hw, &mut t, &mut ev);
    svc.request_target(TargetState::Close, &mut hw, &mut t, &mut ev);
    end_pulse(&mut svc, &mut hw, &mut t, &mut ev);

    svc.request_target(TargetState::Open, &mut hw, &mut t, &mut ev);
    assert_eq!(svc.snapshot(), snap(CurrentState::Opening, TargetState::Open));
}

#[test]
fn failed_interrupt_pulse_keeps_moving() {
    let (mut svc, mut hw, mut t, mut ev) = rig(MockDoor::closed());
    svc.request_target(TargetState::Open, &mut hw, &mut t, &mut ev);
    end_pulse(&mut svc, &mut hw, &mut t, &mut ev);
    hw.set_between();
    hw.fail_engage = true;
    ev.clear();

    svc.request_target(TargetState::Close, &mut hw, &mut t, &mut ev);
    assert_eq!(svc.snapshot(), snap(CurrentState::Opening, TargetState::Open));
    assert!(t.pending(TimerKind::Stall).is_some());
    assert_eq!(
        ev.events,
        vec![DoorEvent::HardwareFault(HardwareError::RelayWrite)]
    );
}

// ── Relay pulse ───────────────────────────────────────────────

#[test]
fn request_during_pulse_waits_for_release() {
    let (mut svc, mut hw, mut t, mut ev) =
        rig(MockDoor::simulated(Duration::from_secs(5)));

    svc.request_target(TargetState::Open, &mut hw, &mut t, &mut ev);
    ev.clear();
    svc.request_target(TargetState::Close, &mut hw, &mut t, &mut ev);

    assert_eq!(hw.pulse_count(), 1);
    assert!(svc.relay_busy());
    assert_eq!(svc.snapshot(), snap(CurrentState::Opening, TargetState::Open));
    assert!(ev.events.is_empty());

    end_pulse(&mut svc, &mut hw, &mut t, &mut ev);
    assert_eq!(hw.released, 1);
    assert_eq!(hw.pulse_count(), 2);
    assert_eq!(svc.snapshot(), snap(CurrentState::Stopped, TargetState::Open));
    assert!(t.pending(TimerKind::RelayRelease).is_some());
}

#[test]
fn latest_deferred_request_wins() {
    let config = DoorConfig {
        stopped_recovery: StoppedRecovery::HonorRequest,
        ..DoorConfig::default()
    };
    let (mut svc, mut hw, mut t, mut ev) =
        rig_with(config, MockDoor::simulated(Duration::from_secs(5)));

    svc.request_target(TargetState::Open, &mut hw, &mut t, &mut ev);
    end_pulse(&mut svc, &mut hw, &mut t, &mut ev);
    svc.request_target(TargetState::Open, &mut hw, &mut t, &mut ev); // interrupt
    svc.request_target(TargetState::Open, &mut hw, &mut t, &mut ev);
    svc.request_target(TargetState::Close, &mut hw, &mut t, &mut ev);

    end_pulse(&mut svc, &mut hw, &mut t, &mut ev);
    assert_eq!(hw.pulse_count(), 3);
    assert_eq!(svc.snapshot(), snap(CurrentState::Closing, TargetState::Close));
}

#[test]
fn failed_release_is_reported_and_frees_the_relay() {
    let (mut svc, mut hw, mut t, mut ev) = rig(MockDoor::closed());
    svc.request_target(TargetState::Open, &mut hw, &mut t, &mut ev);
    hw.fail_release = true;
    ev.clear();

    end_pulse(&mut svc, &mut hw, &mut t, &mut ev);
    assert!(!svc.relay_busy());
    assert_eq!(svc.snapshot(), snap(CurrentState::Opening, TargetState::Open));
    assert_eq!(
        ev.events,
        vec![DoorEvent::HardwareFault(HardwareError::RelayWrite)]
    );
}

// ── Stall ─────────────────────────────────────────────────────

#[test]
fn stall_timeout_forces_stopped() {
    let (mut svc, mut hw, mut t, mut ev) = rig(MockDoor::closed());
    svc.request_target(TargetState::Open, &mut hw, &mut t, &mut ev);
    end_pulse(&mut svc, &mut hw, &mut t, &mut ev);
    hw.set_between();
    svc.poll(&mut hw, &mut t, &mut ev);
    ev.clear();

    let stall = t.take(TimerKind::Stall).unwrap();
    svc.on_timer(stall, &mut hw, &mut t, &mut ev);

    let stopped = snap(CurrentState::Stopped, TargetState::Open);
    assert_eq!(svc.snapshot(), stopped);
    assert!(!svc.stall_armed());
    assert_eq!(
        ev.events,
        vec![
            DoorEvent::StallTimeout(stopped),
            DoorEvent::CurrentChanged {
                from: CurrentState::Opening,
                snapshot: stopped
            },
        ]
    );
}

#[test]
fn stall_after_arrival_is_harmless() {
    let (mut svc, mut hw, mut t, mut ev) = rig(MockDoor::closed());
    svc.request_target(TargetState::Open, &mut hw, &mut t, &mut ev);
    let stall = t.pending(TimerKind::Stall).unwrap();

    hw.set_open();
    svc.poll(&mut hw, &mut t, &mut ev);
    ev.clear();

    svc.on_timer(stall, &mut hw, &mut t, &mut ev);
    assert_eq!(svc.snapshot(), snap(CurrentState::Open, TargetState::Open));
    assert!(ev.events.is_empty());
}

#[test]
fn sensors_resolve_a_stopped_door() {
    let (mut svc, mut hw, mut t, mut ev) = rig(MockDoor::closed());
    svc.request_target(TargetState::Open, &mut hw, &mut t, &mut ev);
    end_pulse(&mut svc, &mut hw, &mut t, &mut ev);
    hw.set_between();
    let stall = t.take(TimerKind::Stall).unwrap();
    svc.on_timer(stall, &mut hw, &mut t, &mut ev);

    // Still between the switches: no inferred movement from STOPPED.
    svc.poll(&mut hw, &mut t, &mut ev);
    assert_eq!(svc.snapshot().current, CurrentState::Stopped);

    hw.set_open();
    svc.poll(&mut hw, &mut t, &mut ev);
    assert_eq!(svc.snapshot(), snap(CurrentState::Open, TargetState::Open));
}

// ── Manual override ───────────────────────────────────────────

#[test]
fn manual_movement_is_inferred_without_pulsing() {
    let (mut svc, mut hw, mut t, mut ev) = rig(MockDoor::closed());

    hw.set_between();
    svc.poll(&mut hw, &mut t, &mut ev);

    let moving = snap(CurrentState::Opening, TargetState::Open);
    assert_eq!(hw.pulse_count(), 0);
    assert_eq!(svc.snapshot(), moving);
    assert_eq!(svc.epoch(), 1);
    assert!(t.pending(TimerKind::Stall).is_some());
    assert_eq!(
        ev.events,
        vec![
            DoorEvent::ManualOverride {
                target: TargetState::Open
            },
            DoorEvent::TargetChanged {
                from: TargetState::Close,
                snapshot: moving
            },
            DoorEvent::CurrentChanged {
                from: CurrentState::Close,
                snapshot: moving
            },
        ]
    );

    hw.set_open();
    svc.poll(&mut hw, &mut t, &mut ev);
    assert_eq!(svc.snapshot(), snap(CurrentState::Open, TargetState::Open));
    assert!(t.pending(TimerKind::Stall).is_none());
}

#[test]
fn manual_movement_that_stalls_stops() {
    let (mut svc, mut hw, mut t, mut ev) = rig(MockDoor::closed());
    hw.set_between();
    svc.poll(&mut hw, &mut t, &mut ev);

    let stall = t.take(TimerKind::Stall).unwrap();
    svc.on_timer(stall, &mut hw, &mut t, &mut ev);
    assert_eq!(svc.snapshot(), snap(CurrentState::Stopped, TargetState::Open));
}

// ── Sensor faults ─────────────────────────────────────────────

#[test]
fn implausible_reading_latches_once_and_clears() {
    let (mut svc, mut hw, mut t, mut ev) = rig(MockDoor::closed());

    hw.set_both();
    svc.poll(&mut hw, &mut t, &mut ev);
    svc.poll(&mut hw, &mut t, &mut ev);
    assert!(svc.sensor_fault());
    assert_eq!(svc.snapshot(), snap(CurrentState::Close, TargetState::Close));
    assert_eq!(ev.count(|e| matches!(e, DoorEvent::SensorFault(_))), 1);

    hw.set_closed();
    svc.poll(&mut hw, &mut t, &mut ev);
    assert!(!svc.sensor_fault());
    assert_eq!(ev.count(|e| *e == DoorEvent::SensorFaultCleared), 1);
}

#[test]
fn implausible_reading_while_moving_holds_state() {
    let (mut svc, mut hw, mut t, mut ev) = rig(MockDoor::closed());
    svc.request_target(TargetState::Open, &mut hw, &mut t, &mut ev);

    hw.set_both();
    svc.poll(&mut hw, &mut t, &mut ev);
    assert_eq!(svc.snapshot(), snap(CurrentState::Opening, TargetState::Open));
    assert!(t.pending(TimerKind::Stall).is_some());
}

#[test]
fn sensor_read_failure_is_reported() {
    let (mut svc, mut hw, mut t, mut ev) = rig(MockDoor::closed());
    hw.fail_read = true;

    let snapshot = svc.get_state(&mut hw, &mut t, &mut ev);
    assert_eq!(snapshot, snap(CurrentState::Close, TargetState::Close));
    assert_eq!(
        ev.events,
        vec![DoorEvent::HardwareFault(HardwareError::SensorRead)]
    );
}

// ── Commands ──────────────────────────────────────────────────

#[test]
fn sync_reports_to_requester_only() {
    let (mut svc, mut hw, mut t, mut ev) = rig(MockDoor::closed());
    hw.set_open();

    let reply = svc.handle_command(DoorCommand::Sync, &mut hw, &mut t, &mut ev);
    assert_eq!(reply, Some(snap(CurrentState::Open, TargetState::Close)));
    assert_eq!(hw.pulse_count(), 0);
}

#[test]
fn set_replies_through_broadcasts() {
    let (mut svc, mut hw, mut t, mut ev) = rig(MockDoor::closed());
    let reply = svc.handle_command(
        DoorCommand::SetTarget(TargetState::Open),
        &mut hw,
        &mut t,
        &mut ev,
    );
    assert_eq!(reply, None);
    assert_eq!(ev.broadcasts().len(), 2);
}

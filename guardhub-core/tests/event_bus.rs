use std::sync::Arc;

use guardhub_core::bus::payload_from_value;
use guardhub_core::{AppEvent, EventBus, Payload};
use parking_lot::Mutex;
use serde_json::json;

#[test]
fn branch_change_reaches_a_subscriber_until_it_unsubscribes() {
    let bus = EventBus::new();
    let received: Arc<Mutex<Vec<Option<Payload>>>> = Arc::default();
    let log = received.clone();
    let sub = bus.subscribe(AppEvent::BranchChanged, move |payload| {
        log.lock().push(payload.cloned());
    });

    let payload = payload_from_value(json!({ "branchId": "B1", "branchName": "Mumbai" }));
    assert_eq!(bus.emit(AppEvent::BranchChanged, payload.as_ref()), 1);
    assert_eq!(*received.lock(), vec![payload.clone()]);

    sub.unsubscribe();
    assert_eq!(bus.emit(AppEvent::BranchChanged, payload.as_ref()), 0);
    assert_eq!(received.lock().len(), 1);
}

#[test]
fn wire_names_survive_a_parse_round_trip() {
    for &event in AppEvent::ALL {
        let parsed: AppEvent = event.as_str().parse().unwrap();
        assert_eq!(parsed, event);
        let json = serde_json::to_string(&event).unwrap();
        assert_eq!(json, format!("\"{}\"", event.as_str()));
    }
    assert!("branch:renamed".parse::<AppEvent>().is_err());
}

#[test]
fn one_panicking_listener_does_not_starve_the_rest() {
    let bus = EventBus::new();
    let hits = Arc::new(Mutex::new(Vec::new()));

    let first = hits.clone();
    let _a = bus.subscribe(AppEvent::LeaveApproved, move |_| first.lock().push("first"));
    let _b = bus.subscribe(AppEvent::LeaveApproved, |_| panic!("listener bug"));
    let third = hits.clone();
    let _c = bus.subscribe(AppEvent::LeaveApproved, move |_| third.lock().push("third"));

    bus.emit(AppEvent::LeaveApproved, None);

    assert_eq!(*hits.lock(), vec!["first", "third"]);
    assert_eq!(bus.diagnostics_snapshot().subscriber_panics, 1);
}

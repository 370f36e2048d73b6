//! Broker messages flowing through the connection manager into the orchestrator

mod common;

use common::*;
use health_monitor::{
    ConnectionManager, HealthEvent, HealthOrchestrator, HeartbeatStatus, StateSet, StateValue,
};
use std::sync::Arc;
use std::time::Duration;

const HEALTH_JSON: &str = r#"{
    "version": 3,
    "monitors": {
        "doorA": {
            "name": "Door A",
            "color": "white",
            "dock": "right",
            "entries": {
                "latch": { "masks": { "0x1": "On", "0x2": "Faulted" } }
            }
        }
    },
    "heartbeats": {
        "hb": { "name": "Bus", "retry_limit": 2, "time_limit": 5 }
    },
    "wdlms": { "name": "Seats", "color": "white", "dock": "left" }
}"#;

async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}

#[tokio::test(start_paused = true)]
async fn test_telemetry_reaches_monitors_and_seats() {
    init_logging();
    let health = Arc::new(HealthOrchestrator::from_json_str(HEALTH_JSON).unwrap());
    let mut updates = health.updates();

    let (broker, transport) = fake_broker();
    broker.script_connects(&[true]);
    let manager = ConnectionManager::new(test_config(3), transport);
    let events = manager.events();
    let runner = tokio::spawn({
        let health = Arc::clone(&health);
        async move { health.run(events).await }
    });

    manager.start().await;
    broker.publish("ppss/health", br#"{"cmd":"doorA","value":3}"#);
    broker.publish("ppss/health", b"not json");
    broker.publish("ppss/health", br#"{"cmd":"doorA","value":"0x0"}"#);
    broker.publish("ppss/health", br#"{"cmd":"WDLM","value":"10"}"#);

    let seen = collect_until(&mut updates, |e| matches!(e, HealthEvent::SeatsUpdated { .. })).await;
    let latch: Vec<StateSet> = seen
        .iter()
        .filter_map(|e| match e {
            HealthEvent::MonitorUpdated { states, .. } => Some(states["latch"].clone()),
            _ => None,
        })
        .collect();
    assert_eq!(
        latch,
        vec![
            StateSet::from([StateValue::On, StateValue::Faulted]),
            StateSet::from([StateValue::Off]),
        ]
    );

    let snapshot = health.snapshot();
    assert_eq!(snapshot.version, 3);
    assert_eq!(snapshot.seats.name, "Seats");
    assert_eq!(snapshot.seats.entries[0].state, StateValue::NotTalking);
    assert_eq!(snapshot.seats.entries[1].state, StateValue::Talking);

    manager.cancel().await;
    drop(manager);
    within(runner).await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_connection_drives_heartbeats() {
    let health = Arc::new(HealthOrchestrator::from_json_str(HEALTH_JSON).unwrap());
    let (broker, transport) = fake_broker();
    broker.script_connects(&[true, false, false]);
    let manager = ConnectionManager::new(test_config(3), transport);
    let events = manager.events();
    tokio::spawn({
        let health = Arc::clone(&health);
        async move { health.run(events).await }
    });

    manager.start().await;
    broker.publish("ppss/health", br#"{"cmd":"hb","value":41}"#);
    settle().await;

    let state = health.heartbeat("hb").unwrap().state();
    assert_eq!(state.status(), HeartbeatStatus::Running);
    assert_eq!(state.last_ping(), 41);

    broker.drop_session(4);
    settle().await;

    let state = health.heartbeat("hb").unwrap().state();
    assert_eq!(state.status(), HeartbeatStatus::Idle);
    assert_eq!(state.last_ping(), -1);
}

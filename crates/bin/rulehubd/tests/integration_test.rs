//! End-to-end tests for the full rulehubd stack.
//!
//! Each test loads a TOML configuration, wires it into a real hub with
//! virtual interfaces and drives it through inbound bus events. Time is
//! paused so timers fire deterministically.

use std::time::Duration;

use rulehub_adapter_virtual::VirtualInterface;
use rulehub_domain::command::Command;
use rulehub_domain::device::Address;
use rulehub_domain::event::EventType;
use rulehub_domain::machine::Outcome;
use rulehub_domain::state::State;
use rulehubd::config::{Config, ConfigError};
use rulehubd::{Daemon, StartError};

const EXAMPLE: &str = include_str!("../rulehub.example.toml");

async fn daemon(toml: &str) -> Daemon {
    let config = Config::from_toml(toml).expect("configuration should parse");
    rulehubd::start(&config)
        .await
        .expect("hub should start")
}

fn upb(daemon: &Daemon) -> &VirtualInterface {
    &daemon.interfaces["upb"]
}

/// Let outbound workers drain without advancing past any armed timer.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

// ---------------------------------------------------------------------------
// Startup
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn should_register_every_example_device() {
    let daemon = daemon(EXAMPLE).await;

    let names: Vec<String> = daemon
        .hub
        .list()
        .await
        .unwrap()
        .into_iter()
        .map(|device| device.name)
        .collect();
    assert_eq!(
        names,
        vec![
            "hall motion",
            "hall light",
            "porch",
            "front door",
            "entry light",
            "porch button",
            "porch toggle",
        ]
    );
    assert_eq!(daemon.devices.len(), 7);
}

#[tokio::test(start_paused = true)]
async fn should_apply_configured_initial_state() {
    let daemon = daemon(EXAMPLE).await;
    let hall = daemon.devices["hall light"];

    let snapshot = daemon.hub.snapshot(hall).await.unwrap();
    assert_eq!(snapshot.state, State::Off);
    assert!(upb(&daemon).calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn should_fail_to_start_on_invalid_device() {
    let config = Config::from_toml(
        r#"
        [[devices]]
        name = "door"
        kind = "door"
        initial = "on"
        "#,
    )
    .unwrap();

    let result = rulehubd::start(&config).await;
    assert!(matches!(
        result,
        Err(StartError::Config(ConfigError::Device { .. }))
    ));
}

// ---------------------------------------------------------------------------
// Propagation
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn should_turn_light_on_with_motion_and_off_when_idle() {
    let daemon = daemon(EXAMPLE).await;
    let bus = upb(&daemon);

    let outcomes = bus
        .report(&daemon.hub, &Address::new("M1"), Command::On)
        .await
        .unwrap();
    settle().await;

    assert!(matches!(outcomes[0].1, Outcome::Applied(t) if t.state == State::Motion));
    assert_eq!(bus.load(&Address::new("L1")), Some(State::On));
    assert_eq!(bus.load(&Address::new("M1")), None);

    tokio::time::sleep(Duration::from_secs(601)).await;
    assert_eq!(bus.load(&Address::new("L1")), Some(State::Off));
}

#[tokio::test(start_paused = true)]
async fn should_ignore_still_from_motion_sensor() {
    let daemon = daemon(EXAMPLE).await;
    let bus = upb(&daemon);

    bus.report(&daemon.hub, &Address::new("M1"), Command::On)
        .await
        .unwrap();
    bus.report(&daemon.hub, &Address::new("M1"), Command::Off)
        .await
        .unwrap();
    settle().await;

    let hall = daemon.hub.snapshot(daemon.devices["hall light"]).await.unwrap();
    assert_eq!(hall.state, State::On);
}

#[tokio::test(start_paused = true)]
async fn should_switch_entry_light_off_after_trigger() {
    let daemon = daemon(EXAMPLE).await;
    let bus = upb(&daemon);

    bus.report(&daemon.hub, &Address::new("D1"), Command::On)
        .await
        .unwrap();
    settle().await;
    assert_eq!(bus.load(&Address::new("E1")), Some(State::On));

    tokio::time::sleep(Duration::from_secs(299)).await;
    assert_eq!(bus.load(&Address::new("E1")), Some(State::On));

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(bus.load(&Address::new("E1")), Some(State::Off));
}

#[tokio::test(start_paused = true)]
async fn should_toggle_from_keypad() {
    let daemon = daemon(EXAMPLE).await;
    let bus = upb(&daemon);
    let toggle = daemon.devices["porch toggle"];

    bus.report(&daemon.hub, &Address::new("K1"), Command::On)
        .await
        .unwrap();
    settle().await;
    assert_eq!(daemon.hub.snapshot(toggle).await.unwrap().state, State::On);

    bus.report(&daemon.hub, &Address::new("K1"), Command::On)
        .await
        .unwrap();
    settle().await;
    assert_eq!(daemon.hub.snapshot(toggle).await.unwrap().state, State::Off);
    assert_eq!(bus.load(&Address::new("P1")), Some(State::Off));
}

#[tokio::test(start_paused = true)]
async fn should_publish_state_changes_on_the_bus() {
    let daemon = daemon(EXAMPLE).await;
    let mut events = daemon.bus.subscribe();

    upb(&daemon)
        .report(&daemon.hub, &Address::new("M1"), Command::On)
        .await
        .unwrap();

    let first = events.recv().await.unwrap();
    let second = events.recv().await.unwrap();
    assert_eq!(first.event_type, EventType::StateChanged);
    assert_eq!(first.device_name, "hall motion");
    assert_eq!(second.device_name, "hall light");
    assert_eq!(second.state, State::On);
}

#[tokio::test(start_paused = true)]
async fn should_stop_accepting_commands_after_shutdown() {
    let daemon = daemon(EXAMPLE).await;
    daemon.hub.shutdown().await.unwrap();

    let result = upb(&daemon)
        .report(&daemon.hub, &Address::new("M1"), Command::On)
        .await;
    assert!(result.is_err());
}

//! # rulehubd
//!
//! Composition root that turns a [`Config`] into a running hub.
//!
//! ## Responsibilities
//! - Spawn the hub actor and the in-process event bus
//! - Attach the configured interfaces
//! - Register devices in declaration order, resolving source names
//! - Log every published event
//!
//! ## Dependency rule
//! This is the **only** crate that depends on all other crates.
//! It is the wiring layer; no domain logic belongs here.

pub mod config;

use std::collections::HashMap;

use tokio::sync::broadcast;

use rulehub_adapter_virtual::VirtualInterface;
use rulehub_app::event_bus::InProcessEventBus;
use rulehub_app::hub::Hub;
use rulehub_domain::error::HubError;
use rulehub_domain::event::Event;
use rulehub_domain::id::DeviceId;

use crate::config::{Config, ConfigError, InterfaceKind};

/// Failure while bringing the hub up.
#[derive(Debug, thiserror::Error)]
pub enum StartError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("failed to wire the hub")]
    Hub(#[from] HubError),
}

/// A running hub together with the handles the daemon wired into it.
#[derive(Debug)]
pub struct Daemon {
    pub hub: Hub,
    pub bus: InProcessEventBus,
    /// Attached interfaces by name.
    pub interfaces: HashMap<String, VirtualInterface>,
    /// Registered devices by name.
    pub devices: HashMap<String, DeviceId>,
}

/// Spawn the hub, attach every interface and register every device.
///
/// # Errors
///
/// Returns [`StartError`] if a device fails to convert or the hub rejects
/// it. The hub is shut down before the error is returned.
pub async fn start(config: &Config) -> Result<Daemon, StartError> {
    let bus = InProcessEventBus::new(config.engine.event_capacity);
    tokio::spawn(log_events(bus.subscribe()));
    let hub = Hub::spawn(config.hub_config(), bus.clone());

    match wire(&hub, config).await {
        Ok((interfaces, devices)) => Ok(Daemon {
            hub,
            bus,
            interfaces,
            devices,
        }),
        Err(err) => {
            let _ = hub.shutdown().await;
            Err(err)
        }
    }
}

async fn wire(
    hub: &Hub,
    config: &Config,
) -> Result<(HashMap<String, VirtualInterface>, HashMap<String, DeviceId>), StartError> {
    let mut interfaces = HashMap::new();
    for section in &config.interfaces {
        let interface = match section.kind {
            InterfaceKind::Virtual => VirtualInterface::new(&section.name),
        };
        hub.attach_interface(interface.clone()).await?;
        tracing::info!(interface = %section.name, kind = ?section.kind, "interface attached");
        interfaces.insert(section.name.clone(), interface);
    }

    let mut devices = HashMap::new();
    for section in &config.devices {
        let device = section.to_device_config(&devices)?;
        let id = hub.add_device(device).await?;
        devices.insert(section.name.clone(), id);
    }
    Ok((interfaces, devices))
}

async fn log_events(mut events: broadcast::Receiver<Event>) {
    loop {
        match events.recv().await {
            Ok(event) => match serde_json::to_string(&event) {
                Ok(json) => tracing::debug!(target: "rulehubd::events", %json, "event"),
                Err(err) => tracing::warn!(error = %err, "failed to serialize event"),
            },
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "event logger lagged behind");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

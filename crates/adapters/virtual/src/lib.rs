//! # rulehub-adapter-virtual
//!
//! Virtual interface that stands in for real hardware during testing and
//! demonstration.
//!
//! ## Behaviour
//!
//! | Primitive | Effect on the simulated load |
//! |-----------|------------------------------|
//! | `on` | load at the address becomes `On` |
//! | `off` | load at the address becomes `Off` |
//! | `level` | load at the address becomes `Level(n)` |
//!
//! Every delivered command is also appended to a call log. The interface
//! can be switched offline to exercise failure handling, and can report
//! "heard" commands back to the hub as inbound events.
//!
//! ## Dependency rule
//!
//! Depends on `rulehub-app` (port traits) and `rulehub-domain` only.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use rulehub_app::hub::Hub;
use rulehub_app::ports::Interface;
use rulehub_domain::command::Command;
use rulehub_domain::device::Address;
use rulehub_domain::error::HubError;
use rulehub_domain::id::DeviceId;
use rulehub_domain::machine::Outcome;
use rulehub_domain::state::State;

/// Failures of the simulated bus.
#[derive(Debug, thiserror::Error)]
pub enum VirtualError {
    #[error("virtual interface {0:?} is offline")]
    Offline(String),
}

/// One command delivered to the virtual interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VirtualCall {
    pub address: Address,
    pub command: Command,
}

#[derive(Debug, Default)]
struct Bus {
    loads: HashMap<Address, State>,
    calls: Vec<VirtualCall>,
}

/// A simulated interface. Clones share the same bus.
#[derive(Debug, Clone)]
pub struct VirtualInterface {
    name: String,
    bus: Arc<Mutex<Bus>>,
    offline: Arc<AtomicBool>,
}

impl VirtualInterface {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            bus: Arc::default(),
            offline: Arc::default(),
        }
    }

    /// Current state of the simulated load at `address`, if it was ever
    /// commanded.
    #[must_use]
    pub fn load(&self, address: &Address) -> Option<State> {
        self.lock().loads.get(address).copied()
    }

    /// Every command delivered so far, oldest first.
    #[must_use]
    pub fn calls(&self) -> Vec<VirtualCall> {
        self.lock().calls.clone()
    }

    /// Make every subsequent delivery fail (or succeed again).
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::Relaxed);
    }

    /// Report a command heard on the bus at `address` to the hub.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::Unavailable`] if the hub has stopped.
    pub async fn report(
        &self,
        hub: &Hub,
        address: &Address,
        command: Command,
    ) -> Result<Vec<(DeviceId, Outcome)>, HubError> {
        tracing::debug!(interface = %self.name, %address, %command, "virtual bus event");
        hub.inbound(&self.name, address, command).await
    }

    fn lock(&self) -> MutexGuard<'_, Bus> {
        self.bus
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn deliver(&self, address: &Address, command: Command, state: State) -> Result<(), HubError> {
        if self.offline.load(Ordering::Relaxed) {
            return Err(HubError::Interface(Box::new(VirtualError::Offline(
                self.name.clone(),
            ))));
        }
        let mut bus = self.lock();
        bus.loads.insert(address.clone(), state);
        bus.calls.push(VirtualCall {
            address: address.clone(),
            command,
        });
        Ok(())
    }
}

impl Interface for VirtualInterface {
    fn name(&self) -> &str {
        &self.name
    }

    fn on(&self, address: &Address) -> impl Future<Output = Result<(), HubError>> + Send {
        let result = self.deliver(address, Command::On, State::On);
        async move { result }
    }

    fn off(&self, address: &Address) -> impl Future<Output = Result<(), HubError>> + Send {
        let result = self.deliver(address, Command::Off, State::Off);
        async move { result }
    }

    fn level(
        &self,
        address: &Address,
        level: u8,
    ) -> impl Future<Output = Result<(), HubError>> + Send {
        let result = self.deliver(address, Command::Level(level), State::Level(level));
        async move { result }
    }
}

//! The hub: owner of every device and the only place commands are routed.
//!
//! [`Hub`] is a cheap, cloneable handle. All device state lives inside a
//! single actor task fed by a bounded inbox; every command (API call,
//! inbound interface event, timer firing) becomes a message, so each
//! top-level command and everything it propagates to runs to completion
//! before the next one starts.

mod actor;
mod outbound;


use tokio::sync::{mpsc, oneshot};

use rulehub_domain::command::Command;
use rulehub_domain::device::{Address, DeviceConfig};
use rulehub_domain::error::HubError;
use rulehub_domain::id::DeviceId;
use rulehub_domain::machine::{DeviceSnapshot, Outcome, Request};
use rulehub_domain::rules::TimerSlot;
use rulehub_domain::source::Source;

use crate::ports::{EventPublisher, Interface};

use self::actor::Actor;
use self::outbound::OutboundCall;

/// Tuning knobs of the hub actor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HubConfig {
    /// Capacity of the actor inbox.
    pub inbox_capacity: usize,
    /// Capacity of each interface's outbound queue.
    pub outbound_capacity: usize,
    /// Maximum delegation depth walked for one top-level command.
    pub max_propagation_depth: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            inbox_capacity: 256,
            outbound_capacity: 64,
            max_propagation_depth: 16,
        }
    }
}

type Reply<T> = oneshot::Sender<Result<T, HubError>>;

pub(crate) enum Message {
    AddDevice {
        config: DeviceConfig,
        reply: Reply<DeviceId>,
    },
    RemoveDevice {
        id: DeviceId,
        reply: Reply<()>,
    },
    Command {
        device: DeviceId,
        request: Request,
        reply: Reply<Outcome>,
    },
    Inbound {
        interface: String,
        address: Address,
        command: Command,
        reply: Reply<Vec<(DeviceId, Outcome)>>,
    },
    AttachInterface {
        name: String,
        outbound: mpsc::Sender<OutboundCall>,
        reply: Reply<()>,
    },
    Link {
        source: DeviceId,
        delegate: DeviceId,
        reply: Reply<()>,
    },
    Snapshot {
        id: DeviceId,
        reply: Reply<DeviceSnapshot>,
    },
    List {
        reply: Reply<Vec<DeviceSnapshot>>,
    },
    Lookup {
        name: String,
        reply: Reply<DeviceId>,
    },
    Fire {
        device: DeviceId,
        slot: TimerSlot,
        generation: u64,
        command: Command,
    },
    Shutdown {
        reply: Reply<()>,
    },
}

/// Handle to a running hub actor.
#[derive(Debug, Clone)]
pub struct Hub {
    inbox: mpsc::Sender<Message>,
    config: HubConfig,
}

impl Hub {
    /// Spawn the hub actor on the current tokio runtime.
    #[must_use]
    pub fn spawn<P>(config: HubConfig, publisher: P) -> Self
    where
        P: EventPublisher + Send + Sync + 'static,
    {
        let (inbox, receiver) = mpsc::channel(config.inbox_capacity);
        let actor = Actor::new(config, publisher, inbox.downgrade());
        tokio::spawn(actor.run(receiver));
        Self { inbox, config }
    }

    /// Register a device, resolve its initial state from its sources and
    /// arm its schedules.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::Validation`] if the name is taken, or
    /// [`HubError::NotFound`] if a declared source does not exist.
    #[tracing::instrument(skip(self, config), fields(device_name = %config.name))]
    pub async fn add_device(&self, config: DeviceConfig) -> Result<DeviceId, HubError> {
        self.request(|reply| Message::AddDevice { config, reply })
            .await
    }

    /// Remove a device, cancelling all of its timers and unlinking it from
    /// the delegation graph.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::NotFound`] if the device does not exist.
    #[tracing::instrument(skip(self))]
    pub async fn remove_device(&self, id: DeviceId) -> Result<(), HubError> {
        self.request(|reply| Message::RemoveDevice { id, reply })
            .await
    }

    /// Issue `command` to a device and propagate it.
    ///
    /// Returns the outcome at the addressed device; outcomes further down
    /// the delegation graph are logged.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::NotFound`] if the device does not exist.
    #[tracing::instrument(skip(self))]
    pub async fn command(
        &self,
        device: DeviceId,
        command: Command,
        source: Option<Source>,
    ) -> Result<Outcome, HubError> {
        let request = Request::new(command).from_source(source);
        self.request(|reply| Message::Command {
            device,
            request,
            reply,
        })
        .await
    }

    /// Report a command heard by `interface` at `address`.
    ///
    /// Every device bound to the address receives it with
    /// `source = Interface(interface)`. Returns one outcome per device; an
    /// address nobody is bound to yields an empty list.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::Unavailable`] if the hub has stopped.
    #[tracing::instrument(skip(self))]
    pub async fn inbound(
        &self,
        interface: &str,
        address: &Address,
        command: Command,
    ) -> Result<Vec<(DeviceId, Outcome)>, HubError> {
        let interface = interface.to_string();
        let address = address.clone();
        self.request(|reply| Message::Inbound {
            interface,
            address,
            command,
            reply,
        })
        .await
    }

    /// Attach an interface adapter and start its outbound worker.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::Validation`] if an interface with the same name
    /// is already attached.
    #[tracing::instrument(skip_all, fields(interface = %interface.name()))]
    pub async fn attach_interface<I>(&self, interface: I) -> Result<(), HubError>
    where
        I: Interface + 'static,
    {
        let name = interface.name().to_string();
        let outbound = outbound::spawn_worker(interface, self.config.outbound_capacity);
        self.request(|reply| Message::AttachInterface {
            name,
            outbound,
            reply,
        })
        .await
    }

    /// Subscribe `delegate` to the accepted commands of `source` after
    /// both were added.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::NotFound`] if either device does not exist, or
    /// [`HubError::Validation`] if both are the same device.
    #[tracing::instrument(skip(self))]
    pub async fn link(&self, source: DeviceId, delegate: DeviceId) -> Result<(), HubError> {
        self.request(|reply| Message::Link {
            source,
            delegate,
            reply,
        })
        .await
    }

    /// Current view of one device.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::NotFound`] if the device does not exist.
    pub async fn snapshot(&self, id: DeviceId) -> Result<DeviceSnapshot, HubError> {
        self.request(|reply| Message::Snapshot { id, reply }).await
    }

    /// Every device, in registration order.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::Unavailable`] if the hub has stopped.
    pub async fn list(&self) -> Result<Vec<DeviceSnapshot>, HubError> {
        self.request(|reply| Message::List { reply }).await
    }

    /// Find a device by its unique name.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::NotFound`] if no device has that name.
    pub async fn find(&self, name: &str) -> Result<DeviceId, HubError> {
        let name = name.to_string();
        self.request(|reply| Message::Lookup { name, reply }).await
    }

    /// Stop the actor, cancelling every timer and closing every outbound
    /// worker.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::Unavailable`] if the hub had already stopped.
    #[tracing::instrument(skip(self))]
    pub async fn shutdown(&self) -> Result<(), HubError> {
        self.request(|reply| Message::Shutdown { reply }).await
    }

    async fn request<T>(
        &self,
        message: impl FnOnce(Reply<T>) -> Message,
    ) -> Result<T, HubError> {
        let (reply, response) = oneshot::channel();
        self.inbox
            .send(message(reply))
            .await
            .map_err(|_| HubError::Unavailable)?;
        response.await.map_err(|_| HubError::Unavailable)?
    }
}

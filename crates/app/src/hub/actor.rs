//! The hub actor: device registry, propagation queue and timer table.

use std::collections::{HashMap, HashSet, VecDeque};

use tokio::sync::mpsc;

use rulehub_domain::command::Command;
use rulehub_domain::device::{Address, Binding, DeviceConfig};
use rulehub_domain::error::{HubError, NotFoundError, ValidationError};
use rulehub_domain::event::Event;
use rulehub_domain::id::DeviceId;
use rulehub_domain::machine::{
    DeviceMachine, DeviceSnapshot, DropReason, Effect, Outcome, Request, Routed,
};
use rulehub_domain::rules::TimerSlot;
use rulehub_domain::source::Source;
use rulehub_domain::state::State;
use rulehub_domain::time::now;

use crate::ports::EventPublisher;
use crate::timer::{Interval, Timer};

use super::outbound::OutboundCall;
use super::{HubConfig, Message};

pub(super) struct Actor<P> {
    config: HubConfig,
    publisher: P,
    inbox: mpsc::WeakSender<Message>,
    devices: HashMap<DeviceId, DeviceMachine>,
    order: Vec<DeviceId>,
    names: HashMap<String, DeviceId>,
    routes: HashMap<Binding, Vec<DeviceId>>,
    timers: HashMap<(DeviceId, TimerSlot), Timer>,
    interfaces: HashMap<String, mpsc::Sender<OutboundCall>>,
}

fn not_found(id: DeviceId) -> HubError {
    NotFoundError {
        entity: "Device",
        id: id.to_string(),
    }
    .into()
}

impl<P> Actor<P>
where
    P: EventPublisher + Send + Sync + 'static,
{
    pub(super) fn new(config: HubConfig, publisher: P, inbox: mpsc::WeakSender<Message>) -> Self {
        Self {
            config,
            publisher,
            inbox,
            devices: HashMap::new(),
            order: Vec::new(),
            names: HashMap::new(),
            routes: HashMap::new(),
            timers: HashMap::new(),
            interfaces: HashMap::new(),
        }
    }

    pub(super) async fn run(mut self, mut receiver: mpsc::Receiver<Message>) {
        tracing::debug!("hub started");
        while let Some(message) = receiver.recv().await {
            match message {
                Message::AddDevice { config, reply } => {
                    let _ = reply.send(self.add_device(config).await);
                }
                Message::RemoveDevice { id, reply } => {
                    let _ = reply.send(self.remove_device(id).await);
                }
                Message::Command {
                    device,
                    request,
                    reply,
                } => {
                    let _ = reply.send(self.dispatch(device, request).await);
                }
                Message::Inbound {
                    interface,
                    address,
                    command,
                    reply,
                } => {
                    let _ = reply.send(Ok(self.inbound(&interface, address, command).await));
                }
                Message::AttachInterface {
                    name,
                    outbound,
                    reply,
                } => {
                    let _ = reply.send(self.attach_interface(name, outbound));
                }
                Message::Link {
                    source,
                    delegate,
                    reply,
                } => {
                    let _ = reply.send(self.link(source, delegate));
                }
                Message::Snapshot { id, reply } => {
                    let snapshot = self
                        .devices
                        .get(&id)
                        .map(DeviceMachine::snapshot)
                        .ok_or_else(|| not_found(id));
                    let _ = reply.send(snapshot);
                }
                Message::List { reply } => {
                    let _ = reply.send(Ok(self.list()));
                }
                Message::Lookup { name, reply } => {
                    let found = self.names.get(&name).copied().ok_or_else(|| {
                        HubError::from(NotFoundError {
                            entity: "Device",
                            id: name,
                        })
                    });
                    let _ = reply.send(found);
                }
                Message::Fire {
                    device,
                    slot,
                    generation,
                    command,
                } => self.fire(device, slot, generation, command).await,
                Message::Shutdown { reply } => {
                    self.timers.clear();
                    self.interfaces.clear();
                    tracing::info!(devices = self.devices.len(), "hub stopped");
                    let _ = reply.send(Ok(()));
                    return;
                }
            }
        }
        tracing::debug!("hub inbox closed");
    }

    async fn add_device(&mut self, config: DeviceConfig) -> Result<DeviceId, HubError> {
        if self.names.contains_key(&config.name) {
            return Err(ValidationError::DuplicateName(config.name).into());
        }
        if let Some(missing) = config
            .sources
            .iter()
            .find(|source| !self.devices.contains_key(*source))
        {
            return Err(not_found(*missing));
        }

        let id = DeviceId::new();
        let mut machine = DeviceMachine::new(id, config, now());

        // An explicit initial state wins; sources only resolve an unknown one.
        let resolve_from_sources = machine.state() == State::Unknown;
        for source in machine.sources().to_vec() {
            let upstream = self.devices.get_mut(&source).ok_or_else(|| not_found(source))?;
            upstream.add_delegate(id)?;
            if !resolve_from_sources {
                continue;
            }
            if let Some(command) = upstream.previous_command() {
                if let Some(state) = machine.adopt(command, &Source::Device(source), now()) {
                    tracing::debug!(
                        device = machine.name(),
                        source = %source,
                        %command,
                        %state,
                        "initial state adopted from source"
                    );
                }
            }
        }

        for binding in machine.bindings() {
            self.routes.entry(binding.clone()).or_default().push(id);
        }

        let schedules: Vec<(TimerSlot, Command, Interval)> = machine
            .schedules()
            .map(|(slot, rule)| (slot, rule.command, Interval::Schedule(rule.schedule.clone())))
            .collect();
        for (slot, command, interval) in schedules {
            self.arm(id, slot, interval, command);
        }

        tracing::info!(
            device = machine.name(),
            %id,
            state = %machine.state(),
            "device added"
        );
        let event = Event::device_added(id, machine.name(), machine.state());
        self.names.insert(machine.name().to_string(), id);
        self.order.push(id);
        self.devices.insert(id, machine);
        self.publish(event).await;
        Ok(id)
    }

    async fn remove_device(&mut self, id: DeviceId) -> Result<(), HubError> {
        let machine = self.devices.remove(&id).ok_or_else(|| not_found(id))?;
        self.timers.retain(|(device, _), _| *device != id);
        self.order.retain(|device| *device != id);
        self.names.remove(machine.name());
        for source in machine.sources() {
            if let Some(upstream) = self.devices.get_mut(source) {
                upstream.remove_delegate(id);
            }
        }
        for delegate in machine.delegates() {
            if let Some(downstream) = self.devices.get_mut(delegate) {
                downstream.remove_source(id);
            }
        }
        self.routes.retain(|_, devices| {
            devices.retain(|device| *device != id);
            !devices.is_empty()
        });
        tracing::info!(device = machine.name(), %id, "device removed");
        self.publish(Event::device_removed(id, machine.name(), machine.state()))
            .await;
        Ok(())
    }

    fn link(&mut self, source: DeviceId, delegate: DeviceId) -> Result<(), HubError> {
        if !self.devices.contains_key(&delegate) {
            return Err(not_found(delegate));
        }
        let upstream = self.devices.get_mut(&source).ok_or_else(|| not_found(source))?;
        upstream.add_delegate(delegate)?;
        if let Some(downstream) = self.devices.get_mut(&delegate) {
            downstream.add_source(source);
        }
        tracing::info!(%source, %delegate, "delegation linked");
        Ok(())
    }

    fn attach_interface(
        &mut self,
        name: String,
        outbound: mpsc::Sender<OutboundCall>,
    ) -> Result<(), HubError> {
        if self.interfaces.contains_key(&name) {
            return Err(ValidationError::DuplicateInterface(name).into());
        }
        tracing::info!(interface = %name, "interface attached");
        self.interfaces.insert(name, outbound);
        Ok(())
    }

    fn list(&self) -> Vec<DeviceSnapshot> {
        self.order
            .iter()
            .filter_map(|id| self.devices.get(id))
            .map(DeviceMachine::snapshot)
            .collect()
    }

    async fn inbound(
        &mut self,
        interface: &str,
        address: Address,
        command: Command,
    ) -> Vec<(DeviceId, Outcome)> {
        let binding = Binding {
            interface: interface.to_string(),
            address,
        };
        let targets = self.routes.get(&binding).cloned().unwrap_or_default();
        if targets.is_empty() {
            tracing::debug!(
                interface,
                address = %binding.address,
                %command,
                "no device bound to address"
            );
        }
        let mut outcomes = Vec::with_capacity(targets.len());
        for device in targets {
            let request = Request::new(command).from_source(Source::interface(interface));
            if let Ok(outcome) = self.dispatch(device, request).await {
                outcomes.push((device, outcome));
            }
        }
        outcomes
    }

    async fn fire(&mut self, device: DeviceId, slot: TimerSlot, generation: u64, command: Command) {
        let current = self
            .timers
            .get(&(device, slot))
            .map(Timer::generation);
        if current != Some(generation) {
            tracing::warn!(
                %device,
                %slot,
                generation,
                ?current,
                "stale timer firing dropped"
            );
            return;
        }
        let Some(machine) = self.devices.get(&device) else {
            return;
        };
        tracing::debug!(device = machine.name(), %slot, %command, "timer fired");
        let request = machine.timer_request(slot, command);
        if let Err(error) = self.dispatch(device, request).await {
            tracing::debug!(%device, %slot, %error, "timer firing not dispatched");
        }
    }

    /// Route `request` to `target` and walk the delegation graph breadth
    /// first. Each `(from, to)` edge is followed at most once, and nothing
    /// deeper than `max_propagation_depth` is delivered.
    async fn dispatch(&mut self, target: DeviceId, request: Request) -> Result<Outcome, HubError> {
        if !self.devices.contains_key(&target) {
            return Err(not_found(target));
        }
        let mut queue = VecDeque::from([(target, request, 0_usize)]);
        let mut visited: HashSet<(DeviceId, DeviceId)> = HashSet::new();
        let mut first = None;

        while let Some((id, request, depth)) = queue.pop_front() {
            let Some(machine) = self.devices.get_mut(&id) else {
                continue;
            };
            let routed = machine.route(&request, now());
            let name = machine.name().to_string();
            let delegates = machine.delegates().to_vec();
            log_outcome(&name, &request, &routed.outcome);
            if first.is_none() {
                first = Some(routed.outcome);
            }

            let Routed { outcome, effects } = routed;
            if let Outcome::Applied(transition) = outcome {
                self.publish(Event::state_changed(
                    id,
                    &name,
                    &transition,
                    request.source.clone(),
                ))
                .await;
            }

            for effect in effects {
                match effect {
                    Effect::ArmTimer {
                        slot,
                        delay,
                        command,
                    } => self.arm(id, slot, Interval::After(delay), command),
                    Effect::Send { binding, command } => self.send(&name, binding, command),
                    Effect::Delegate(command) => {
                        if depth >= self.config.max_propagation_depth {
                            tracing::warn!(
                                device = %name,
                                %command,
                                depth,
                                "propagation depth exceeded"
                            );
                            continue;
                        }
                        for delegate in &delegates {
                            if !visited.insert((id, *delegate)) {
                                tracing::warn!(
                                    device = %name,
                                    %delegate,
                                    %command,
                                    "delegation cycle cut"
                                );
                                continue;
                            }
                            let request = Request::new(command).from_source(Source::Device(id));
                            queue.push_back((*delegate, request, depth + 1));
                        }
                    }
                }
            }
        }

        first.ok_or_else(|| not_found(target))
    }

    fn arm(&mut self, device: DeviceId, slot: TimerSlot, interval: Interval, command: Command) {
        let inbox = self.inbox.clone();
        let timer = self
            .timers
            .entry((device, slot))
            .or_insert_with(|| Timer::new(interval.clone()));
        timer.set_interval(interval);
        timer.action(move |generation| {
            let inbox = inbox.clone();
            async move {
                if let Some(inbox) = inbox.upgrade() {
                    let _ = inbox
                        .send(Message::Fire {
                            device,
                            slot,
                            generation,
                            command,
                        })
                        .await;
                }
            }
        });
        let generation = timer.restart();
        tracing::debug!(%device, %slot, %command, generation, "timer armed");
    }

    fn send(&self, device: &str, binding: Binding, command: Command) {
        let Some(outbound) = self.interfaces.get(&binding.interface) else {
            tracing::debug!(
                device,
                interface = %binding.interface,
                "interface not attached, skipping outbound"
            );
            return;
        };
        let call = OutboundCall {
            device: device.to_string(),
            address: binding.address,
            command,
        };
        if let Err(error) = outbound.try_send(call) {
            tracing::warn!(
                device,
                interface = %binding.interface,
                %error,
                "outbound queue unavailable, command dropped"
            );
        }
    }

    async fn publish(&self, event: Event) {
        if let Err(error) = self.publisher.publish(event).await {
            tracing::warn!(%error, "failed to publish event");
        }
    }
}

fn log_outcome(device: &str, request: &Request, outcome: &Outcome) {
    let command = request.command;
    let source = request
        .source
        .as_ref()
        .map_or_else(|| "none".to_string(), ToString::to_string);
    match outcome {
        Outcome::Applied(transition) => tracing::info!(
            device,
            %command,
            %source,
            from = %transition.previous,
            to = %transition.state,
            "state changed"
        ),
        Outcome::Deferred => tracing::debug!(device, %command, %source, "command deferred"),
        Outcome::Ignored => tracing::debug!(device, %command, %source, "command ignored"),
        Outcome::Dropped(DropReason::Unresolvable) => {
            tracing::debug!(device, %command, %source, "command unresolvable, dropped");
        }
        Outcome::Dropped(DropReason::InvalidState(state)) => tracing::info!(
            device,
            %command,
            %source,
            %state,
            "resolved state not valid for device, dropped"
        ),
    }
}

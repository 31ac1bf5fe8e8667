//! The command router: a pure per-device state machine.
//!
//! [`DeviceMachine::route`] runs one command through the device's rule
//! tables in a fixed order (ignore, mapping, resolve, validity, delay,
//! apply, idle, delegate, trigger) and returns an [`Outcome`] together
//! with the [`Effect`]s the caller must carry out: arming timers, sending
//! the new state to bound interfaces and delegating to downstream devices.
//! Nothing here sleeps, spawns, or performs IO.

use std::time::Duration;

use serde::Serialize;

use crate::command::{Command, Resolution};
use crate::device::{Binding, DeviceConfig, DeviceKind};
use crate::error::{HubError, ValidationError};
use crate::id::DeviceId;
use crate::rules::{RuleTables, ScheduleRule, TimerSlot};
use crate::source::Source;
use crate::state::{State, StateKind};
use crate::time::{Timestamp, elapsed};

/// A command addressed to one device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub command: Command,
    pub source: Option<Source>,
    /// Set when the command was issued by one of the device's own timers.
    pub fired_by: Option<TimerSlot>,
}

impl Request {
    #[must_use]
    pub fn new(command: Command) -> Self {
        Self {
            command,
            source: None,
            fired_by: None,
        }
    }

    #[must_use]
    pub fn from_source(mut self, source: impl Into<Option<Source>>) -> Self {
        self.source = source.into();
        self
    }

    #[must_use]
    pub fn fired_by(mut self, slot: TimerSlot) -> Self {
        self.fired_by = Some(slot);
        self
    }
}

/// An accepted state change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub previous: State,
    pub state: State,
    pub command: Command,
}

/// Why a command was discarded after passing the ignore and mapping steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// The command could not be resolved to a state (e.g. `Previous` with
    /// no history).
    Unresolvable,
    /// The resolved state is not one the device accepts.
    InvalidState(State),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Applied(Transition),
    /// A timer was armed and will re-issue a command later.
    Deferred,
    Ignored,
    Dropped(DropReason),
}

/// Side effect requested by the router.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// (Re)start the timer of `slot` so it issues `command` after `delay`.
    ArmTimer {
        slot: TimerSlot,
        delay: Duration,
        command: Command,
    },
    /// Push the new state out to a bound interface address.
    Send { binding: Binding, command: Command },
    /// Forward `command` to every delegate, sourced from this device.
    Delegate(Command),
}

/// Result of routing one command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Routed {
    pub outcome: Outcome,
    pub effects: Vec<Effect>,
}

impl Routed {
    fn bare(outcome: Outcome) -> Self {
        Self {
            outcome,
            effects: Vec::new(),
        }
    }

    fn deferred(effects: Vec<Effect>) -> Self {
        Self {
            outcome: Outcome::Deferred,
            effects,
        }
    }
}

/// Point-in-time view of a device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceSnapshot {
    pub id: DeviceId,
    pub name: String,
    pub kind: DeviceKind,
    pub state: State,
    pub previous_state: State,
    pub previous_command: Option<Command>,
    pub last_changed: Timestamp,
    pub sources: Vec<DeviceId>,
    pub delegates: Vec<DeviceId>,
}

/// A device: its configuration plus live state.
#[derive(Debug, Clone)]
pub struct DeviceMachine {
    id: DeviceId,
    name: String,
    kind: DeviceKind,
    valid_states: Vec<StateKind>,
    sources: Vec<DeviceId>,
    delegates: Vec<DeviceId>,
    bindings: Vec<Binding>,
    rules: RuleTables,
    state: State,
    previous_state: State,
    previous_command: Option<Command>,
    last_changed: Timestamp,
}

enum Mapped {
    Command(Command),
    Deferred(Effect),
}

impl DeviceMachine {
    /// Create a device from its configuration, applying the configured
    /// initial state if any.
    #[must_use]
    pub fn new(id: DeviceId, config: DeviceConfig, now: Timestamp) -> Self {
        let mut machine = Self {
            id,
            name: config.name,
            kind: config.kind,
            valid_states: config.valid_states,
            sources: config.sources,
            delegates: Vec::new(),
            bindings: config.bindings,
            rules: config.rules,
            state: State::Unknown,
            previous_state: State::Unknown,
            previous_command: None,
            last_changed: now,
        };
        if let Some(initial) = config.initial {
            machine.state = initial;
            machine.previous_command = initial.command();
        }
        machine
    }

    #[must_use]
    pub fn id(&self) -> DeviceId {
        self.id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn state(&self) -> State {
        self.state
    }

    #[must_use]
    pub fn previous_state(&self) -> State {
        self.previous_state
    }

    #[must_use]
    pub fn previous_command(&self) -> Option<Command> {
        self.previous_command
    }

    #[must_use]
    pub fn last_changed(&self) -> Timestamp {
        self.last_changed
    }

    #[must_use]
    pub fn sources(&self) -> &[DeviceId] {
        &self.sources
    }

    #[must_use]
    pub fn delegates(&self) -> &[DeviceId] {
        &self.delegates
    }

    #[must_use]
    pub fn bindings(&self) -> &[Binding] {
        &self.bindings
    }

    #[must_use]
    pub fn accepts(&self, state: State) -> bool {
        self.valid_states.contains(&state.kind())
    }

    /// Time since the last accepted transition.
    #[must_use]
    pub fn idle_time(&self, now: Timestamp) -> Duration {
        elapsed(self.last_changed, now)
    }

    /// Schedule rules with the timer slot each one owns.
    pub fn schedules(&self) -> impl Iterator<Item = (TimerSlot, &ScheduleRule)> {
        self.rules
            .schedules
            .iter()
            .enumerate()
            .map(|(index, rule)| (TimerSlot::Schedule(index), rule))
    }

    /// Subscribe `delegate` to this device's accepted commands.
    ///
    /// Subscribing twice keeps the first position.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::SelfDelegation`] when `delegate` is this
    /// device.
    pub fn add_delegate(&mut self, delegate: DeviceId) -> Result<(), HubError> {
        if delegate == self.id {
            return Err(ValidationError::SelfDelegation.into());
        }
        if !self.delegates.contains(&delegate) {
            self.delegates.push(delegate);
        }
        Ok(())
    }

    pub fn remove_delegate(&mut self, delegate: DeviceId) {
        self.delegates.retain(|id| *id != delegate);
    }

    /// Record an upstream device linked after creation.
    pub fn add_source(&mut self, source: DeviceId) {
        if !self.sources.contains(&source) {
            self.sources.push(source);
        }
    }

    /// Forget an upstream device that was removed from the hub.
    pub fn remove_source(&mut self, source: DeviceId) {
        self.sources.retain(|id| *id != source);
    }

    /// Build the request a timer of this device issues when it expires.
    ///
    /// Schedule firings carry no source; every other timer fires as the
    /// device itself so that delay rules do not defer it again.
    #[must_use]
    pub fn timer_request(&self, slot: TimerSlot, command: Command) -> Request {
        let source = match slot {
            TimerSlot::Schedule(_) => None,
            _ => Some(Source::Device(self.id)),
        };
        Request::new(command).from_source(source).fired_by(slot)
    }

    /// Adopt the last command of an upstream device as this device's state.
    ///
    /// Runs the ignore check, immediate mappings, resolution and validity
    /// only; delayed mappings, delay rules, idle, delegation and triggers
    /// never fire here. Returns the adopted state when the command resolved.
    pub fn adopt(&mut self, command: Command, source: &Source, now: Timestamp) -> Option<State> {
        let source = Some(source);
        if self.rules.is_ignored(command, source) {
            return None;
        }
        let command = match self.rules.find_mapping(command, source) {
            Some((_, rule)) if rule.delay.is_some() => return None,
            Some((_, rule)) => rule.target,
            None => command,
        };
        let resolution = command.resolve(self.state, self.previous_state)?;
        if !self.accepts(resolution.state) {
            return None;
        }
        self.apply(resolution, now);
        Some(resolution.state)
    }

    /// Route one command through the rule tables.
    pub fn route(&mut self, request: &Request, now: Timestamp) -> Routed {
        let source = request.source.as_ref();
        let from_self = source.is_some_and(|s| s.is_device(self.id));

        if self.rules.is_ignored(request.command, source) {
            return Routed::bare(Outcome::Ignored);
        }

        let command = match self.map(request.command, source, from_self) {
            Mapped::Command(command) => command,
            Mapped::Deferred(effect) => return Routed::deferred(vec![effect]),
        };

        let Some(resolution) = command.resolve(self.state, self.previous_state) else {
            return Routed::bare(Outcome::Dropped(DropReason::Unresolvable));
        };
        if !self.accepts(resolution.state) {
            return Routed::bare(Outcome::Dropped(DropReason::InvalidState(
                resolution.state,
            )));
        }

        if !from_self {
            let delays: Vec<Effect> = self
                .rules
                .matching_delays(resolution.command, source)
                .map(|(index, rule)| Effect::ArmTimer {
                    slot: TimerSlot::Delay(index),
                    delay: rule.delay,
                    command: rule.fired_command(resolution.command),
                })
                .collect();
            if !delays.is_empty() {
                return Routed::deferred(delays);
            }
        }

        let transition = self.apply(resolution, now);
        let mut effects = Vec::new();

        let origin = match source {
            Some(Source::Interface(name)) => Some(name.as_str()),
            _ => None,
        };
        if let Some(command) = transition.state.command() {
            effects.extend(
                self.bindings
                    .iter()
                    .filter(|binding| origin != Some(binding.interface.as_str()))
                    .map(|binding| Effect::Send {
                        binding: binding.clone(),
                        command,
                    }),
            );
        }

        if let Some(idle) = &self.rules.idle {
            if request.fired_by != Some(TimerSlot::Idle) {
                effects.push(Effect::ArmTimer {
                    slot: TimerSlot::Idle,
                    delay: idle.delay,
                    command: idle.command,
                });
            }
        }

        if !self.delegates.is_empty() {
            effects.push(Effect::Delegate(transition.command));
        }

        effects.extend(
            self.rules
                .matching_triggers(transition.command, source)
                .map(|(index, rule)| Effect::ArmTimer {
                    slot: TimerSlot::Trigger(index),
                    delay: rule.delay,
                    command: rule.fired_command(transition.command),
                }),
        );

        Routed {
            outcome: Outcome::Applied(transition),
            effects,
        }
    }

    #[must_use]
    pub fn snapshot(&self) -> DeviceSnapshot {
        DeviceSnapshot {
            id: self.id,
            name: self.name.clone(),
            kind: self.kind,
            state: self.state,
            previous_state: self.previous_state,
            previous_command: self.previous_command,
            last_changed: self.last_changed,
            sources: self.sources.clone(),
            delegates: self.delegates.clone(),
        }
    }

    // A delayed mapping re-issues its target as the device itself; that
    // firing applies the target immediately instead of deferring again.
    fn map(&self, command: Command, source: Option<&Source>, from_self: bool) -> Mapped {
        match self.rules.find_mapping(command, source) {
            None => Mapped::Command(command),
            Some((index, rule)) => match rule.delay {
                Some(delay) if !from_self => Mapped::Deferred(Effect::ArmTimer {
                    slot: TimerSlot::Mapping(index),
                    delay,
                    command: rule.target,
                }),
                _ => Mapped::Command(rule.target),
            },
        }
    }

    fn apply(&mut self, resolution: Resolution, now: Timestamp) -> Transition {
        let transition = Transition {
            previous: self.state,
            state: resolution.state,
            command: resolution.command,
        };
        self.previous_state = self.state;
        self.state = resolution.state;
        self.last_changed = now;
        self.previous_command = Some(resolution.command);
        transition
    }
}

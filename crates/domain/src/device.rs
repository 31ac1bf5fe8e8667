//! Device configuration: everything needed to create a device in the hub.
//!
//! There is a single device core; what distinguishes a light from a door
//! is its [`DeviceKind`], which contributes a default valid-state set and a
//! handful of wildcard command aliases (ordinary mapping rules appended
//! after the user's own rules).

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::command::Command;
use crate::error::{HubError, ValidationError};
use crate::id::DeviceId;
use crate::rules::{IdleRule, IgnoreRule, MapRule, RuleTables, ScheduleRule, TimedRule};
use crate::schedule::ScheduleSpec;
use crate::state::{State, StateKind};

/// Capability tag of a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceKind {
    #[default]
    Generic,
    Light,
    Door,
    Motion,
    Photocell,
    Keypad,
}

impl DeviceKind {
    /// States a device of this kind may hold.
    #[must_use]
    pub fn valid_states(self) -> &'static [StateKind] {
        match self {
            Self::Generic | Self::Light | Self::Keypad => &[
                StateKind::Unknown,
                StateKind::On,
                StateKind::Off,
                StateKind::Level,
            ],
            Self::Door => &[StateKind::Unknown, StateKind::Open, StateKind::Closed],
            Self::Motion => &[StateKind::Unknown, StateKind::Motion, StateKind::Still],
            Self::Photocell => &[StateKind::Unknown, StateKind::Light, StateKind::Dark],
        }
    }

    /// Wildcard `(from, to)` command aliases applied after user mappings.
    #[must_use]
    pub fn aliases(self) -> &'static [(Command, Command)] {
        match self {
            Self::Generic | Self::Keypad => &[],
            Self::Light => &[
                (Command::Motion, Command::On),
                (Command::Open, Command::On),
                (Command::Dark, Command::On),
                (Command::Still, Command::Off),
                (Command::Close, Command::Off),
                (Command::Light, Command::Off),
            ],
            Self::Door => &[(Command::On, Command::Open), (Command::Off, Command::Close)],
            Self::Motion => &[(Command::On, Command::Motion), (Command::Off, Command::Still)],
            Self::Photocell => &[(Command::On, Command::Dark), (Command::Off, Command::Light)],
        }
    }
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Generic => "generic",
            Self::Light => "light",
            Self::Door => "door",
            Self::Motion => "motion",
            Self::Photocell => "photocell",
            Self::Keypad => "keypad",
        };
        f.write_str(name)
    }
}

/// Hardware address understood by one interface (`"49.3"`, `"19.05.7b"`, `"D1"`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(String);

impl Address {
    #[must_use]
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Address {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Ties a device to an address on a named interface: inbound events for
/// the address are routed to the device, and state changes are sent back
/// out to it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Binding {
    pub interface: String,
    pub address: Address,
}

impl Binding {
    #[must_use]
    pub fn new(interface: impl Into<String>, address: impl Into<Address>) -> Self {
        Self {
            interface: interface.into(),
            address: address.into(),
        }
    }
}

/// Validated configuration of a device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceConfig {
    pub name: String,
    pub kind: DeviceKind,
    pub valid_states: Vec<StateKind>,
    /// Upstream devices, in declaration order.
    pub sources: Vec<DeviceId>,
    pub bindings: Vec<Binding>,
    pub initial: Option<State>,
    pub rules: RuleTables,
}

impl DeviceConfig {
    #[must_use]
    pub fn builder() -> DeviceConfigBuilder {
        DeviceConfigBuilder::default()
    }

    #[must_use]
    pub fn accepts(&self, state: State) -> bool {
        self.valid_states.contains(&state.kind())
    }

    /// Check domain invariants.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::Validation`] when:
    /// - `name` is empty ([`ValidationError::EmptyName`])
    /// - no valid state is declared ([`ValidationError::NoValidStates`])
    /// - `initial` is not a valid state ([`ValidationError::InvalidInitialState`])
    /// - a rule reacts to no command ([`ValidationError::EmptyCommandSet`])
    pub fn validate(&self) -> Result<(), HubError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::EmptyName.into());
        }
        if self.valid_states.is_empty() {
            return Err(ValidationError::NoValidStates.into());
        }
        if let Some(initial) = self.initial {
            if !self.accepts(initial) {
                return Err(ValidationError::InvalidInitialState(initial).into());
            }
        }
        let rules = &self.rules;
        let command_sets = rules
            .ignores
            .iter()
            .map(|rule| ("ignore", &rule.commands))
            .chain(rules.mappings.iter().map(|rule| ("mapping", &rule.commands)))
            .chain(rules.delays.iter().map(|rule| ("delay", &rule.commands)))
            .chain(rules.triggers.iter().map(|rule| ("trigger", &rule.commands)));
        for (rule, commands) in command_sets {
            if commands.is_empty() {
                return Err(ValidationError::EmptyCommandSet(rule).into());
            }
        }
        Ok(())
    }
}

/// Step-by-step builder for [`DeviceConfig`].
#[derive(Debug, Default)]
pub struct DeviceConfigBuilder {
    name: Option<String>,
    kind: DeviceKind,
    valid_states: Option<Vec<StateKind>>,
    sources: Vec<DeviceId>,
    bindings: Vec<Binding>,
    initial: Option<State>,
    rules: RuleTables,
}

impl DeviceConfigBuilder {
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn kind(mut self, kind: DeviceKind) -> Self {
        self.kind = kind;
        self
    }

    /// Override the kind's default valid-state set.
    #[must_use]
    pub fn valid_states(mut self, states: impl IntoIterator<Item = StateKind>) -> Self {
        self.valid_states = Some(states.into_iter().collect());
        self
    }

    #[must_use]
    pub fn source(mut self, device: DeviceId) -> Self {
        if !self.sources.contains(&device) {
            self.sources.push(device);
        }
        self
    }

    #[must_use]
    pub fn binding(mut self, interface: impl Into<String>, address: impl Into<Address>) -> Self {
        self.bindings.push(Binding::new(interface, address));
        self
    }

    #[must_use]
    pub fn initial(mut self, state: State) -> Self {
        self.initial = Some(state);
        self
    }

    #[must_use]
    pub fn ignore(mut self, rule: IgnoreRule) -> Self {
        self.rules.ignores.push(rule);
        self
    }

    #[must_use]
    pub fn mapping(mut self, rule: MapRule) -> Self {
        self.rules.mappings.push(rule);
        self
    }

    #[must_use]
    pub fn delay(mut self, rule: TimedRule) -> Self {
        self.rules.delays.push(rule);
        self
    }

    #[must_use]
    pub fn trigger(mut self, rule: TimedRule) -> Self {
        self.rules.triggers.push(rule);
        self
    }

    /// Set the idle policy, replacing any previous one.
    #[must_use]
    pub fn idle(mut self, command: Command, delay: Duration) -> Self {
        self.rules.idle = Some(IdleRule { command, delay });
        self
    }

    #[must_use]
    pub fn schedule(mut self, schedule: ScheduleSpec, command: Command) -> Self {
        self.rules.schedules.push(ScheduleRule { schedule, command });
        self
    }

    /// Consume the builder, append the kind's aliases, validate, and return
    /// a [`DeviceConfig`].
    ///
    /// # Errors
    ///
    /// Returns [`HubError::Validation`] if invariants fail.
    pub fn build(self) -> Result<DeviceConfig, HubError> {
        let mut rules = self.rules;
        rules.mappings.extend(
            self.kind
                .aliases()
                .iter()
                .map(|&(from, to)| MapRule::new(from, to)),
        );
        let config = DeviceConfig {
            name: self.name.unwrap_or_default(),
            kind: self.kind,
            valid_states: self
                .valid_states
                .unwrap_or_else(|| self.kind.valid_states().to_vec()),
            sources: self.sources,
            bindings: self.bindings,
            initial: self.initial,
            rules,
        };
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_use_kind_defaults() {
        let config = DeviceConfig::builder()
            .name("front door")
            .kind(DeviceKind::Door)
            .build()
            .unwrap();
        assert!(config.accepts(State::Open));
        assert!(!config.accepts(State::On));
        assert_eq!(config.rules.mappings.len(), 2);
    }

    #[test]
    fn should_append_aliases_after_user_mappings() {
        let config = DeviceConfig::builder()
            .name("porch")
            .kind(DeviceKind::Light)
            .mapping(MapRule::new(Command::Motion, Command::Level(30)))
            .build()
            .unwrap();
        assert_eq!(config.rules.mappings[0].target, Command::Level(30));
        assert_eq!(config.rules.mappings.len(), 1 + DeviceKind::Light.aliases().len());
    }

    #[test]
    fn should_reject_empty_name() {
        let result = DeviceConfig::builder().build();
        assert!(matches!(
            result,
            Err(HubError::Validation(ValidationError::EmptyName))
        ));
    }

    #[test]
    fn should_reject_empty_state_set() {
        let result = DeviceConfig::builder()
            .name("nothing")
            .valid_states([])
            .build();
        assert!(matches!(
            result,
            Err(HubError::Validation(ValidationError::NoValidStates))
        ));
    }

    #[test]
    fn should_reject_initial_state_outside_valid_set() {
        let result = DeviceConfig::builder()
            .name("hall motion")
            .kind(DeviceKind::Motion)
            .initial(State::On)
            .build();
        assert!(matches!(
            result,
            Err(HubError::Validation(ValidationError::InvalidInitialState(
                State::On
            )))
        ));
    }

    #[test]
    fn should_reject_rule_without_commands() {
        let none = || std::iter::empty::<Command>().collect::<crate::rules::CommandSet>();

        let ignore = DeviceConfig::builder()
            .name("lamp")
            .ignore(IgnoreRule::new(none()))
            .build();
        assert!(matches!(
            ignore,
            Err(HubError::Validation(ValidationError::EmptyCommandSet("ignore")))
        ));

        let delay = DeviceConfig::builder()
            .name("lamp")
            .delay(TimedRule::new(none(), Duration::from_secs(5)))
            .build();
        assert!(matches!(
            delay,
            Err(HubError::Validation(ValidationError::EmptyCommandSet("delay")))
        ));
    }

    #[test]
    fn should_deduplicate_sources() {
        let upstream = DeviceId::new();
        let config = DeviceConfig::builder()
            .name("lamp")
            .source(upstream)
            .source(upstream)
            .build()
            .unwrap();
        assert_eq!(config.sources, vec![upstream]);
    }

    #[test]
    fn should_accept_any_level_when_level_declared() {
        let config = DeviceConfig::builder().name("dimmer").build().unwrap();
        assert!(config.accepts(State::Level(0)));
        assert!(config.accepts(State::Level(255)));
    }

    #[test]
    fn should_replace_idle_policy() {
        let config = DeviceConfig::builder()
            .name("fan")
            .idle(Command::Off, Duration::from_secs(5))
            .idle(Command::Off, Duration::from_secs(60))
            .build()
            .unwrap();
        assert_eq!(
            config.rules.idle.map(|rule| rule.delay),
            Some(Duration::from_secs(60))
        );
    }

    #[test]
    fn should_deserialize_kind_from_snake_case() {
        let kind: DeviceKind = serde_json::from_str("\"photocell\"").unwrap();
        assert_eq!(kind, DeviceKind::Photocell);
    }
}

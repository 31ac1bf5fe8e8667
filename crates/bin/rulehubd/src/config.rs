//! Configuration loading: TOML file with environment variable overrides.
//!
//! Looks for `rulehub.toml` in the working directory, or the file named by
//! `RULEHUB_CONFIG`. Every field has a default so the file is optional.
//! Environment variables take precedence over file values.
//!
//! Devices reference each other by name. A source must be declared before
//! the device that listens to it, which keeps the delegation graph acyclic
//! at load time; cycles can only be introduced deliberately through
//! [`Hub::link`](rulehub_app::hub::Hub::link).

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use serde::Deserialize;

use rulehub_app::hub::HubConfig;
use rulehub_domain::command::Command;
use rulehub_domain::device::{DeviceConfig, DeviceKind};
use rulehub_domain::error::HubError;
use rulehub_domain::id::DeviceId;
use rulehub_domain::rules::{CommandSet, IgnoreRule, MapRule, TimedRule};
use rulehub_domain::schedule::ScheduleSpec;
use rulehub_domain::source::{Source, SourceFilter};
use rulehub_domain::state::{State, StateKind};

const DEFAULT_PATH: &str = "rulehub.toml";

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Logging settings.
    pub logging: LoggingConfig,
    /// Hub actor tuning.
    pub engine: EngineConfig,
    /// Interfaces to attach, in order.
    pub interfaces: Vec<InterfaceConfig>,
    /// Devices to register, in declaration order.
    pub devices: Vec<DeviceSection>,
}

/// Logging configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive (`RUST_LOG` syntax).
    pub filter: String,
}

/// Hub actor and event bus capacities.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub inbox_capacity: usize,
    pub outbound_capacity: usize,
    pub event_capacity: usize,
    pub max_propagation_depth: usize,
}

/// Which adapter backs an interface.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterfaceKind {
    #[default]
    Virtual,
}

#[derive(Debug, Deserialize)]
pub struct InterfaceConfig {
    pub name: String,
    #[serde(default)]
    pub kind: InterfaceKind,
}

/// A single value or a list of values.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

impl<T> Default for OneOrMany<T> {
    fn default() -> Self {
        Self::Many(Vec::new())
    }
}

impl<T> OneOrMany<T> {
    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        match self {
            Self::One(value) => std::slice::from_ref(value).iter(),
            Self::Many(values) => values.iter(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct BindingSection {
    pub interface: String,
    pub address: String,
}

#[derive(Debug, Deserialize)]
pub struct IgnoreSection {
    pub command: OneOrMany<Command>,
    #[serde(default)]
    pub source: OneOrMany<String>,
}

#[derive(Debug, Deserialize)]
pub struct MappedSection {
    pub command: OneOrMany<Command>,
    pub mapped: Command,
    #[serde(default)]
    pub source: OneOrMany<String>,
    /// Debounce: apply the mapped command only after this many seconds.
    #[serde(default)]
    pub secs: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct TimedSection {
    pub command: OneOrMany<Command>,
    #[serde(default)]
    pub mapped: Option<Command>,
    #[serde(default)]
    pub source: OneOrMany<String>,
    pub secs: u64,
}

#[derive(Debug, Deserialize)]
pub struct IdleSection {
    pub command: Command,
    pub secs: u64,
}

#[derive(Debug, Deserialize)]
pub struct TimeSection {
    pub time: OneOrMany<ScheduleSpec>,
    pub command: Command,
}

/// One `[[devices]]` entry.
#[derive(Debug, Deserialize)]
pub struct DeviceSection {
    pub name: String,
    #[serde(default)]
    pub kind: DeviceKind,
    #[serde(default)]
    pub valid_states: Option<Vec<StateKind>>,
    /// Names of previously declared devices.
    #[serde(default)]
    pub sources: Vec<String>,
    #[serde(default)]
    pub bindings: Vec<BindingSection>,
    #[serde(default)]
    pub initial: Option<State>,
    #[serde(default)]
    pub ignore: Vec<IgnoreSection>,
    #[serde(default)]
    pub mapped: Vec<MappedSection>,
    #[serde(default)]
    pub delay: Vec<TimedSection>,
    #[serde(default)]
    pub trigger: Vec<TimedSection>,
    #[serde(default)]
    pub idle: Option<IdleSection>,
    #[serde(default)]
    pub time: Vec<TimeSection>,
}

impl Config {
    /// Load configuration from `RULEHUB_CONFIG` or `rulehub.toml` (if
    /// present), apply environment-variable overrides and validate.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed, or
    /// if the result fails validation.
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var("RULEHUB_CONFIG").unwrap_or_else(|_| DEFAULT_PATH.to_string());
        let mut config = Self::from_file(&path)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate a TOML document, without environment overrides.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] or [`ConfigError::Validation`].
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(ConfigError::Parse),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(ConfigError::Io(err)),
        }
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("RULEHUB_LOG") {
            self.logging.filter = val;
        }
        if let Ok(val) = std::env::var("RUST_LOG") {
            self.logging.filter = val;
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let engine = &self.engine;
        if engine.inbox_capacity == 0 || engine.outbound_capacity == 0 || engine.event_capacity == 0 {
            return Err(ConfigError::Validation(
                "engine capacities must be non-zero".to_string(),
            ));
        }
        if engine.max_propagation_depth == 0 {
            return Err(ConfigError::Validation(
                "max_propagation_depth must be non-zero".to_string(),
            ));
        }

        let mut interfaces = HashSet::new();
        for interface in &self.interfaces {
            if !interfaces.insert(interface.name.as_str()) {
                return Err(ConfigError::Validation(format!(
                    "interface {:?} is declared twice",
                    interface.name
                )));
            }
        }

        let mut declared = HashSet::new();
        for device in &self.devices {
            for binding in &device.bindings {
                if !interfaces.contains(binding.interface.as_str()) {
                    return Err(ConfigError::Validation(format!(
                        "device {:?} is bound to unknown interface {:?}",
                        device.name, binding.interface
                    )));
                }
            }
            for reference in device.source_references() {
                if parse_qualified(reference).is_none() && !declared.contains(reference) {
                    return Err(ConfigError::UnknownSource {
                        device: device.name.clone(),
                        reference: reference.to_string(),
                    });
                }
            }
            if !declared.insert(device.name.as_str()) {
                return Err(ConfigError::Validation(format!(
                    "device {:?} is declared twice",
                    device.name
                )));
            }
        }
        Ok(())
    }

    /// Hub tuning derived from the `[engine]` section.
    #[must_use]
    pub fn hub_config(&self) -> HubConfig {
        HubConfig {
            inbox_capacity: self.engine.inbox_capacity,
            outbound_capacity: self.engine.outbound_capacity,
            max_propagation_depth: self.engine.max_propagation_depth,
        }
    }
}

impl DeviceSection {
    /// Convert into a [`DeviceConfig`], resolving device names through
    /// `registered`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownSource`] for a name that was not
    /// registered yet, or [`ConfigError::Device`] if the device fails
    /// domain validation.
    pub fn to_device_config(
        &self,
        registered: &HashMap<String, DeviceId>,
    ) -> Result<DeviceConfig, ConfigError> {
        let resolve = |reference: &str| -> Result<Source, ConfigError> {
            if let Some(source) = parse_qualified(reference) {
                return Ok(source);
            }
            registered
                .get(reference)
                .map(|id| Source::Device(*id))
                .ok_or_else(|| ConfigError::UnknownSource {
                    device: self.name.clone(),
                    reference: reference.to_string(),
                })
        };
        let filter = |references: &OneOrMany<String>| -> Result<SourceFilter, ConfigError> {
            references
                .iter()
                .map(|reference| resolve(reference.as_str()))
                .collect::<Result<SourceFilter, _>>()
        };
        let commands =
            |commands: &OneOrMany<Command>| commands.iter().copied().collect::<CommandSet>();

        let mut builder = DeviceConfig::builder().name(&self.name).kind(self.kind);
        if let Some(states) = &self.valid_states {
            builder = builder.valid_states(states.iter().copied());
        }
        for reference in &self.sources {
            if let Source::Device(id) = resolve(reference.as_str())? {
                builder = builder.source(id);
            } else {
                return Err(ConfigError::Validation(format!(
                    "device {:?} lists {reference:?} as a source; only devices can be sources",
                    self.name
                )));
            }
        }
        for binding in &self.bindings {
            builder = builder.binding(&binding.interface, binding.address.as_str());
        }
        if let Some(initial) = self.initial {
            builder = builder.initial(initial);
        }
        for rule in &self.ignore {
            builder =
                builder.ignore(IgnoreRule::new(commands(&rule.command)).from_source(filter(&rule.source)?));
        }
        for rule in &self.mapped {
            let mut mapping =
                MapRule::new(commands(&rule.command), rule.mapped).from_source(filter(&rule.source)?);
            if let Some(secs) = rule.secs {
                mapping = mapping.after(Duration::from_secs(secs));
            }
            builder = builder.mapping(mapping);
        }
        for rule in &self.delay {
            builder = builder.delay(timed_rule(rule, filter(&rule.source)?, commands(&rule.command)));
        }
        for rule in &self.trigger {
            builder = builder.trigger(timed_rule(rule, filter(&rule.source)?, commands(&rule.command)));
        }
        if let Some(idle) = &self.idle {
            builder = builder.idle(idle.command, Duration::from_secs(idle.secs));
        }
        for rule in &self.time {
            for schedule in rule.time.iter() {
                builder = builder.schedule(schedule.clone(), rule.command);
            }
        }

        builder.build().map_err(|source| ConfigError::Device {
            device: self.name.clone(),
            source,
        })
    }

    fn source_references(&self) -> impl Iterator<Item = &str> {
        let rule_sources = self
            .ignore
            .iter()
            .flat_map(|rule| rule.source.iter())
            .chain(self.mapped.iter().flat_map(|rule| rule.source.iter()))
            .chain(self.delay.iter().flat_map(|rule| rule.source.iter()))
            .chain(self.trigger.iter().flat_map(|rule| rule.source.iter()));
        self.sources
            .iter()
            .chain(rule_sources)
            .map(String::as_str)
    }
}

fn timed_rule(section: &TimedSection, sources: SourceFilter, commands: CommandSet) -> TimedRule {
    let mut rule = TimedRule::new(commands, Duration::from_secs(section.secs)).from_source(sources);
    if let Some(mapped) = section.mapped {
        rule = rule.mapped(mapped);
    }
    rule
}

/// `interface:<name>` and `external:<token>` name non-device sources.
fn parse_qualified(reference: &str) -> Option<Source> {
    if let Some(name) = reference.strip_prefix("interface:") {
        return Some(Source::interface(name));
    }
    reference.strip_prefix("external:").map(Source::external)
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "rulehubd=info,rulehub_app=info".to_string(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        let hub = HubConfig::default();
        Self {
            inbox_capacity: hub.inbox_capacity,
            outbound_capacity: hub.outbound_capacity,
            event_capacity: 256,
            max_propagation_depth: hub.max_propagation_depth,
        }
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// TOML parse failure.
    #[error("failed to parse config file")]
    Parse(#[from] toml::de::Error),
    /// File I/O failure.
    #[error("failed to read config file")]
    Io(#[from] std::io::Error),
    /// Semantic validation failure.
    #[error("invalid configuration: {0}")]
    Validation(String),
    /// A source reference names no previously declared device.
    #[error("device {device:?} references unknown source {reference:?}")]
    UnknownSource { device: String, reference: String },
    /// A device failed domain validation.
    #[error("invalid device {device:?}")]
    Device {
        device: String,
        #[source]
        source: HubError,
    },
}

#[cfg(test)]
mod tests {
    use rulehub_domain::error::ValidationError;

    use super::*;

    #[test]
    fn should_produce_sensible_defaults() {
        let config = Config::default();
        assert_eq!(config.engine.inbox_capacity, 256);
        assert_eq!(config.engine.event_capacity, 256);
        assert_eq!(config.engine.max_propagation_depth, 16);
        assert!(config.interfaces.is_empty());
        assert!(config.devices.is_empty());
    }

    #[test]
    fn should_parse_minimal_toml() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config.hub_config(), HubConfig::default());
    }

    #[test]
    fn should_return_default_when_file_not_found() {
        let config = Config::from_file("nonexistent.toml").unwrap();
        assert!(config.devices.is_empty());
    }

    #[test]
    fn should_report_parse_error_for_invalid_toml() {
        let result = Config::from_toml("invalid {{{");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn should_parse_full_toml() {
        let toml = r#"
            [logging]
            filter = "debug"

            [engine]
            inbox_capacity = 32
            max_propagation_depth = 4

            [[interfaces]]
            name = "upb"

            [[devices]]
            name = "hall motion"
            kind = "motion"
            bindings = [{ interface = "upb", address = "M1" }]

            [[devices]]
            name = "hall light"
            kind = "light"
            sources = ["hall motion"]
            initial = "off"
            bindings = [{ interface = "upb", address = "L1" }]
            ignore = [{ command = "still" }]
            mapped = [{ command = ["motion", "on"], mapped = "level 60", source = "hall motion" }]
            delay = [{ command = "off", secs = 30 }]
            trigger = [{ command = "on", mapped = "off", secs = 600 }]
            idle = { command = "off", secs = 900 }
            time = [{ time = ["11:59pm", "0 30 6 * * Mon-Fri"], command = "off" }]
        "#;
        let config = Config::from_toml(toml).unwrap();
        assert_eq!(config.logging.filter, "debug");
        assert_eq!(config.engine.inbox_capacity, 32);
        assert_eq!(config.engine.outbound_capacity, 64);
        assert_eq!(config.interfaces[0].kind, InterfaceKind::Virtual);

        let light = &config.devices[1];
        assert_eq!(light.kind, DeviceKind::Light);
        assert_eq!(light.initial, Some(State::Off));
        assert_eq!(
            light.mapped[0].command,
            OneOrMany::Many(vec![Command::Motion, Command::On])
        );
        assert_eq!(light.mapped[0].mapped, Command::Level(60));
        assert_eq!(light.time[0].time.iter().count(), 2);
    }

    #[test]
    fn should_reject_zero_capacity() {
        let mut config = Config::default();
        config.engine.inbox_capacity = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn should_reject_zero_depth() {
        let mut config = Config::default();
        config.engine.max_propagation_depth = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn should_reject_duplicate_interface() {
        let toml = r#"
            [[interfaces]]
            name = "upb"
            [[interfaces]]
            name = "upb"
        "#;
        assert!(matches!(
            Config::from_toml(toml),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn should_reject_binding_to_unknown_interface() {
        let toml = r#"
            [[devices]]
            name = "lamp"
            bindings = [{ interface = "x10", address = "A1" }]
        "#;
        assert!(matches!(
            Config::from_toml(toml),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn should_reject_source_declared_later() {
        let toml = r#"
            [[devices]]
            name = "lamp"
            sources = ["switch"]

            [[devices]]
            name = "switch"
        "#;
        let result = Config::from_toml(toml);
        assert!(
            matches!(result, Err(ConfigError::UnknownSource { ref reference, .. }) if reference == "switch")
        );
    }

    #[test]
    fn should_reject_duplicate_device_name() {
        let toml = r#"
            [[devices]]
            name = "lamp"
            [[devices]]
            name = "lamp"
        "#;
        assert!(Config::from_toml(toml).is_err());
    }

    #[test]
    fn should_accept_qualified_rule_sources() {
        let toml = r#"
            [[devices]]
            name = "lamp"
            ignore = [{ command = "off", source = ["interface:upb", "external:web"] }]
        "#;
        let config = Config::from_toml(toml).unwrap();
        let device = config.devices[0].to_device_config(&HashMap::new()).unwrap();
        let rule = &device.rules.ignores[0];
        assert!(rule.matches(Command::Off, Some(&Source::interface("upb"))));
        assert!(rule.matches(Command::Off, Some(&Source::external("web"))));
        assert!(!rule.matches(Command::Off, None));
    }

    #[test]
    fn should_resolve_device_sources_by_name() {
        let toml = r#"
            [[devices]]
            name = "switch"

            [[devices]]
            name = "lamp"
            sources = ["switch"]
            delay = [{ command = "off", source = "switch", secs = 5 }]
        "#;
        let config = Config::from_toml(toml).unwrap();
        let switch = DeviceId::new();
        let registered = HashMap::from([("switch".to_string(), switch)]);

        let lamp = config.devices[1].to_device_config(&registered).unwrap();
        assert_eq!(lamp.sources, vec![switch]);
        assert!(lamp.rules.delays[0].matches(Command::Off, Some(&Source::Device(switch))));
        assert_eq!(lamp.rules.delays[0].delay, Duration::from_secs(5));
    }

    #[test]
    fn should_reject_non_device_in_sources_list() {
        let toml = r#"
            [[devices]]
            name = "lamp"
            sources = ["interface:upb"]
        "#;
        let config = Config::from_toml(toml).unwrap();
        let result = config.devices[0].to_device_config(&HashMap::new());
        assert!(matches!(result, Err(ConfigError::Validation(_))));
    }

    #[test]
    fn should_reject_rule_without_commands() {
        let toml = r#"
            [[devices]]
            name = "lamp"
            ignore = [{ command = [] }]
            delay = [{ command = [], secs = 5 }]
        "#;
        let config = Config::from_toml(toml).unwrap();
        let result = config.devices[0].to_device_config(&HashMap::new());
        assert!(matches!(
            result,
            Err(ConfigError::Device {
                source: HubError::Validation(ValidationError::EmptyCommandSet(_)),
                ..
            })
        ));
    }

    #[test]
    fn should_surface_domain_validation_errors() {
        let toml = r#"
            [[devices]]
            name = "door"
            kind = "door"
            initial = "on"
        "#;
        let config = Config::from_toml(toml).unwrap();
        let result = config.devices[0].to_device_config(&HashMap::new());
        assert!(matches!(
            result,
            Err(ConfigError::Device {
                source: HubError::Validation(ValidationError::InvalidInitialState(State::On)),
                ..
            })
        ));
    }

    #[test]
    fn should_reject_invalid_schedule() {
        let toml = r#"
            [[devices]]
            name = "porch"
            time = [{ time = "25:99", command = "on" }]
        "#;
        assert!(matches!(
            Config::from_toml(toml),
            Err(ConfigError::Parse(_))
        ));
    }
}

//! Rule tables: the declarative per-device policies consulted by the
//! command router.
//!
//! Every table is a `Vec`, so declaration order is preserved and is the
//! deterministic tiebreak between equally specific matches. Timing rules
//! do not hold timers themselves: each owns a [`TimerSlot`] that the hub
//! maps to a live timer.

mod idle;
mod ignore;
mod mapping;
mod timed;

pub use idle::{IdleRule, ScheduleRule};
pub use ignore::IgnoreRule;
pub use mapping::MapRule;
pub use timed::TimedRule;

use std::fmt;

use crate::command::Command;
use crate::source::Source;

/// The commands a rule reacts to. [`DeviceConfig::validate`] rejects an
/// empty set.
///
/// [`DeviceConfig::validate`]: crate::device::DeviceConfig::validate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSet(Vec<Command>);

impl CommandSet {
    #[must_use]
    pub fn contains(&self, command: Command) -> bool {
        self.0.contains(&command)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = Command> + '_ {
        self.0.iter().copied()
    }
}

impl From<Command> for CommandSet {
    fn from(command: Command) -> Self {
        Self(vec![command])
    }
}

impl<const N: usize> From<[Command; N]> for CommandSet {
    fn from(commands: [Command; N]) -> Self {
        Self(commands.to_vec())
    }
}

impl FromIterator<Command> for CommandSet {
    fn from_iter<T: IntoIterator<Item = Command>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Identifies the timer owned by one rule of a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerSlot {
    Mapping(usize),
    Delay(usize),
    Trigger(usize),
    Idle,
    Schedule(usize),
}

impl fmt::Display for TimerSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mapping(i) => write!(f, "mapping[{i}]"),
            Self::Delay(i) => write!(f, "delay[{i}]"),
            Self::Trigger(i) => write!(f, "trigger[{i}]"),
            Self::Idle => f.write_str("idle"),
            Self::Schedule(i) => write!(f, "schedule[{i}]"),
        }
    }
}

/// All rules configured for one device.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleTables {
    pub ignores: Vec<IgnoreRule>,
    pub mappings: Vec<MapRule>,
    pub delays: Vec<TimedRule>,
    pub triggers: Vec<TimedRule>,
    pub idle: Option<IdleRule>,
    pub schedules: Vec<ScheduleRule>,
}

impl RuleTables {
    #[must_use]
    pub fn is_ignored(&self, command: Command, source: Option<&Source>) -> bool {
        self.ignores.iter().any(|rule| rule.matches(command, source))
    }

    /// Find the mapping for `command` from `source`.
    ///
    /// Rules naming the source explicitly win over wildcard rules; within
    /// each group the first declared rule wins.
    #[must_use]
    pub fn find_mapping(&self, command: Command, source: Option<&Source>) -> Option<(usize, &MapRule)> {
        let candidates = || {
            self.mappings
                .iter()
                .enumerate()
                .filter(move |(_, rule)| rule.commands.contains(command))
        };
        candidates()
            .find(|(_, rule)| rule.sources.names(source))
            .or_else(|| candidates().find(|(_, rule)| rule.sources.is_wildcard()))
    }

    pub fn matching_delays<'a>(
        &'a self,
        command: Command,
        source: Option<&'a Source>,
    ) -> impl Iterator<Item = (usize, &'a TimedRule)> + 'a {
        matching(&self.delays, command, source)
    }

    pub fn matching_triggers<'a>(
        &'a self,
        command: Command,
        source: Option<&'a Source>,
    ) -> impl Iterator<Item = (usize, &'a TimedRule)> + 'a {
        matching(&self.triggers, command, source)
    }
}

fn matching<'a>(
    rules: &'a [TimedRule],
    command: Command,
    source: Option<&'a Source>,
) -> impl Iterator<Item = (usize, &'a TimedRule)> + 'a {
    rules
        .iter()
        .enumerate()
        .filter(move |(_, rule)| rule.matches(command, source))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::id::DeviceId;
    use crate::source::SourceFilter;

    fn sensor() -> Source {
        Source::Device(DeviceId::from_uuid(uuid::Uuid::nil()))
    }

    #[test]
    fn should_ignore_only_from_named_source() {
        let tables = RuleTables {
            ignores: vec![IgnoreRule::new(Command::On).from_source(sensor())],
            ..RuleTables::default()
        };
        assert!(tables.is_ignored(Command::On, Some(&sensor())));
        assert!(!tables.is_ignored(Command::On, Some(&Source::interface("upb"))));
        assert!(!tables.is_ignored(Command::Off, Some(&sensor())));
    }

    #[test]
    fn should_ignore_from_any_source_when_wildcard() {
        let tables = RuleTables {
            ignores: vec![IgnoreRule::new([Command::Dark, Command::Light])],
            ..RuleTables::default()
        };
        assert!(tables.is_ignored(Command::Dark, None));
        assert!(tables.is_ignored(Command::Light, Some(&sensor())));
    }

    #[test]
    fn should_prefer_specific_mapping_over_earlier_wildcard() {
        let tables = RuleTables {
            mappings: vec![
                MapRule::new(Command::Motion, Command::On),
                MapRule::new(Command::Motion, Command::Level(40)).from_source(sensor()),
            ],
            ..RuleTables::default()
        };
        let (index, rule) = tables.find_mapping(Command::Motion, Some(&sensor())).unwrap();
        assert_eq!(index, 1);
        assert_eq!(rule.target, Command::Level(40));

        let (index, _) = tables
            .find_mapping(Command::Motion, Some(&Source::interface("w800")))
            .unwrap();
        assert_eq!(index, 0);
    }

    #[test]
    fn should_pick_first_declared_mapping_among_equals() {
        let tables = RuleTables {
            mappings: vec![
                MapRule::new(Command::Open, Command::On),
                MapRule::new(Command::Open, Command::Off),
            ],
            ..RuleTables::default()
        };
        let (index, _) = tables.find_mapping(Command::Open, None).unwrap();
        assert_eq!(index, 0);
    }

    #[test]
    fn should_not_map_unlisted_command() {
        let tables = RuleTables {
            mappings: vec![MapRule::new(Command::Open, Command::On).from_source(sensor())],
            ..RuleTables::default()
        };
        assert!(tables.find_mapping(Command::Close, Some(&sensor())).is_none());
        assert!(tables.find_mapping(Command::Open, None).is_none());
    }

    #[test]
    fn should_yield_every_matching_delay() {
        let tables = RuleTables {
            delays: vec![
                TimedRule::new(Command::Off, Duration::from_secs(2)),
                TimedRule::new(Command::On, Duration::from_secs(5)),
                TimedRule::new(Command::Off, Duration::from_secs(9)).from_source(
                    SourceFilter::AnyOf(vec![sensor(), Source::interface("upb")]),
                ),
            ],
            ..RuleTables::default()
        };
        let upb = Source::interface("upb");
        let indices: Vec<usize> = tables
            .matching_delays(Command::Off, Some(&upb))
            .map(|(i, _)| i)
            .collect();
        assert_eq!(indices, vec![0, 2]);
    }

    #[test]
    fn should_fire_matched_command_when_trigger_has_no_target() {
        let rule = TimedRule::new(Command::On, Duration::from_secs(1));
        assert_eq!(rule.fired_command(Command::On), Command::On);
        let rule = rule.mapped(Command::Off);
        assert_eq!(rule.fired_command(Command::On), Command::Off);
    }

    #[test]
    fn should_display_timer_slots() {
        assert_eq!(TimerSlot::Delay(2).to_string(), "delay[2]");
        assert_eq!(TimerSlot::Idle.to_string(), "idle");
    }
}

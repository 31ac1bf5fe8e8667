//! Device state: the externally observable condition of a device.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::command::Command;

/// Discrete state of a device.
///
/// `Level` carries a payload whose range (0–100 or 0–255) follows the
/// convention of the interface that reports it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum State {
    #[default]
    Unknown,
    On,
    Off,
    Level(u8),
    Motion,
    Still,
    Open,
    Closed,
    Light,
    Dark,
}

/// The tag of a [`State`] without its payload.
///
/// Valid-state sets are declared in kinds so that declaring `Level`
/// admits every `Level(n)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StateKind {
    Unknown,
    On,
    Off,
    Level,
    Motion,
    Still,
    Open,
    Closed,
    Light,
    Dark,
}

impl State {
    #[must_use]
    pub fn kind(self) -> StateKind {
        match self {
            Self::Unknown => StateKind::Unknown,
            Self::On => StateKind::On,
            Self::Off => StateKind::Off,
            Self::Level(_) => StateKind::Level,
            Self::Motion => StateKind::Motion,
            Self::Still => StateKind::Still,
            Self::Open => StateKind::Open,
            Self::Closed => StateKind::Closed,
            Self::Light => StateKind::Light,
            Self::Dark => StateKind::Dark,
        }
    }

    /// The concrete command that produces this state, if any.
    ///
    /// `Unknown` has no command: nothing can ask a device to become unknown.
    #[must_use]
    pub fn command(self) -> Option<Command> {
        match self {
            Self::Unknown => None,
            Self::On => Some(Command::On),
            Self::Off => Some(Command::Off),
            Self::Level(n) => Some(Command::Level(n)),
            Self::Motion => Some(Command::Motion),
            Self::Still => Some(Command::Still),
            Self::Open => Some(Command::Open),
            Self::Closed => Some(Command::Close),
            Self::Light => Some(Command::Light),
            Self::Dark => Some(Command::Dark),
        }
    }

    /// Whether a toggle from this state should switch the device on.
    ///
    /// `Off` and a zero `Level` count as off; every other state, including
    /// `Unknown` and any non-zero level, counts as on.
    #[must_use]
    pub fn is_off_like(self) -> bool {
        matches!(self, Self::Off | Self::Level(0))
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Level(n) => write!(f, "level:{n}"),
            other => f.write_str(other.kind().as_str()),
        }
    }
}

impl StateKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::On => "on",
            Self::Off => "off",
            Self::Level => "level",
            Self::Motion => "motion",
            Self::Still => "still",
            Self::Open => "open",
            Self::Closed => "closed",
            Self::Light => "light",
            Self::Dark => "dark",
        }
    }
}

impl fmt::Display for StateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A state or command string could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unrecognised value {0:?}")]
pub struct ParseVocabularyError(pub String);

/// Split `"level:42"` / `"level 42"` into its numeric payload.
pub(crate) fn parse_level(input: &str) -> Option<Result<u8, ParseVocabularyError>> {
    let rest = input.strip_prefix("level")?;
    let digits = rest.trim_start_matches([':', ' ', '=']);
    if digits.is_empty() {
        return None;
    }
    Some(
        digits
            .parse()
            .map_err(|_| ParseVocabularyError(input.to_string())),
    )
}

impl FromStr for State {
    type Err = ParseVocabularyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        if let Some(level) = parse_level(&normalized) {
            return level.map(Self::Level);
        }
        match normalized.as_str() {
            "unknown" => Ok(Self::Unknown),
            "on" => Ok(Self::On),
            "off" => Ok(Self::Off),
            "motion" => Ok(Self::Motion),
            "still" => Ok(Self::Still),
            "open" => Ok(Self::Open),
            "closed" | "close" => Ok(Self::Closed),
            "light" => Ok(Self::Light),
            "dark" => Ok(Self::Dark),
            _ => Err(ParseVocabularyError(s.to_string())),
        }
    }
}

impl TryFrom<String> for State {
    type Error = ParseVocabularyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<State> for String {
    fn from(state: State) -> Self {
        state.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_default_to_unknown() {
        assert_eq!(State::default(), State::Unknown);
    }

    #[test]
    fn should_compare_level_payloads() {
        assert_eq!(State::Level(40), State::Level(40));
        assert_ne!(State::Level(40), State::Level(41));
        assert_eq!(State::Level(40).kind(), State::Level(41).kind());
    }

    #[test]
    fn should_map_closed_to_close_command() {
        assert_eq!(State::Closed.command(), Some(Command::Close));
        assert_eq!(State::Unknown.command(), None);
    }

    #[test]
    fn should_treat_off_and_zero_level_as_off_like() {
        assert!(State::Off.is_off_like());
        assert!(State::Level(0).is_off_like());
        assert!(!State::Level(1).is_off_like());
        assert!(!State::Unknown.is_off_like());
    }

    #[test]
    fn should_parse_level_with_either_separator() {
        assert_eq!("level:80".parse::<State>().unwrap(), State::Level(80));
        assert_eq!("Level 80".parse::<State>().unwrap(), State::Level(80));
    }

    #[test]
    fn should_reject_out_of_range_level() {
        assert!("level:300".parse::<State>().is_err());
    }

    #[test]
    fn should_serialize_as_display_string() {
        let json = serde_json::to_string(&State::Level(12)).unwrap();
        assert_eq!(json, "\"level:12\"");
        let parsed: State = serde_json::from_str("\"closed\"").unwrap();
        assert_eq!(parsed, State::Closed);
    }
}

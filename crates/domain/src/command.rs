//! Command: an instruction directed at a device.
//!
//! Concrete commands map 1:1 onto the identically-named [`State`]. The
//! meta-commands [`Previous`](Command::Previous), [`Toggle`](Command::Toggle)
//! and [`Initial`](Command::Initial) are resolved against the device's
//! current situation and are never stored as state.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::state::{ParseVocabularyError, State, parse_level};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Command {
    On,
    Off,
    Level(u8),
    Motion,
    Still,
    Open,
    Close,
    Light,
    Dark,
    Previous,
    Toggle,
    Initial,
}

/// A command resolved against a device: the state to enter and the
/// command recorded as `previous_command` and forwarded to delegates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    pub state: State,
    pub command: Command,
}

impl Command {
    /// The state this command names, for concrete commands only.
    #[must_use]
    pub fn target_state(self) -> Option<State> {
        match self {
            Self::On => Some(State::On),
            Self::Off => Some(State::Off),
            Self::Level(n) => Some(State::Level(n)),
            Self::Motion => Some(State::Motion),
            Self::Still => Some(State::Still),
            Self::Open => Some(State::Open),
            Self::Close => Some(State::Closed),
            Self::Light => Some(State::Light),
            Self::Dark => Some(State::Dark),
            Self::Previous | Self::Toggle | Self::Initial => None,
        }
    }

    #[must_use]
    pub fn is_meta(self) -> bool {
        matches!(self, Self::Previous | Self::Toggle | Self::Initial)
    }

    /// Resolve this command against a device's `current` and `previous` state.
    ///
    /// Returns `None` for `Previous` when the device has no previous state to
    /// return to. The resolved command is the concrete command of the
    /// resolved state; when that state is `Unknown` (which has no command)
    /// the original command is kept.
    #[must_use]
    pub fn resolve(self, current: State, previous: State) -> Option<Resolution> {
        let state = match self {
            Self::Toggle => {
                if current.is_off_like() {
                    State::On
                } else {
                    State::Off
                }
            }
            Self::Previous if previous == State::Unknown => return None,
            Self::Previous => previous,
            Self::Initial => current,
            concrete => concrete.target_state().unwrap_or(current),
        };
        Some(Resolution {
            state,
            command: state.command().unwrap_or(self),
        })
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Level(n) => return write!(f, "level:{n}"),
            Self::On => "on",
            Self::Off => "off",
            Self::Motion => "motion",
            Self::Still => "still",
            Self::Open => "open",
            Self::Close => "close",
            Self::Light => "light",
            Self::Dark => "dark",
            Self::Previous => "previous",
            Self::Toggle => "toggle",
            Self::Initial => "initial",
        };
        f.write_str(name)
    }
}

impl FromStr for Command {
    type Err = ParseVocabularyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        if let Some(level) = parse_level(&normalized) {
            return level.map(Self::Level);
        }
        match normalized.as_str() {
            "on" => Ok(Self::On),
            "off" => Ok(Self::Off),
            "motion" => Ok(Self::Motion),
            "still" => Ok(Self::Still),
            "open" => Ok(Self::Open),
            "close" | "closed" => Ok(Self::Close),
            "light" => Ok(Self::Light),
            "dark" => Ok(Self::Dark),
            "previous" => Ok(Self::Previous),
            "toggle" => Ok(Self::Toggle),
            "initial" => Ok(Self::Initial),
            _ => Err(ParseVocabularyError(s.to_string())),
        }
    }
}

impl TryFrom<String> for Command {
    type Error = ParseVocabularyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Command> for String {
    fn from(command: Command) -> Self {
        command.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_toggle_off_to_on() {
        let r = Command::Toggle.resolve(State::Off, State::Unknown).unwrap();
        assert_eq!(r.state, State::On);
        assert_eq!(r.command, Command::On);
    }

    #[test]
    fn should_toggle_on_to_off() {
        let r = Command::Toggle.resolve(State::On, State::Off).unwrap();
        assert_eq!(r.state, State::Off);
    }

    #[test]
    fn should_toggle_non_zero_level_to_off() {
        assert_eq!(
            Command::Toggle.resolve(State::Level(30), State::Off).unwrap().state,
            State::Off
        );
        assert_eq!(
            Command::Toggle.resolve(State::Level(0), State::Off).unwrap().state,
            State::On
        );
    }

    #[test]
    fn should_resolve_previous_to_previous_state() {
        let r = Command::Previous.resolve(State::Off, State::Level(70)).unwrap();
        assert_eq!(r.state, State::Level(70));
        assert_eq!(r.command, Command::Level(70));
    }

    #[test]
    fn should_keep_meta_command_when_resolving_to_unknown() {
        let r = Command::Initial.resolve(State::Unknown, State::Unknown).unwrap();
        assert_eq!(r.state, State::Unknown);
        assert_eq!(r.command, Command::Initial);
    }

    #[test]
    fn should_not_resolve_previous_without_history() {
        assert!(Command::Previous.resolve(State::On, State::Unknown).is_none());
    }

    #[test]
    fn should_resolve_close_to_closed() {
        let r = Command::Close.resolve(State::Open, State::Unknown).unwrap();
        assert_eq!(r.state, State::Closed);
        assert_eq!(r.command, Command::Close);
    }

    #[test]
    fn should_parse_commands_case_insensitively() {
        assert_eq!("TOGGLE".parse::<Command>().unwrap(), Command::Toggle);
        assert_eq!("level:5".parse::<Command>().unwrap(), Command::Level(5));
        assert!("heat".parse::<Command>().is_err());
    }
}

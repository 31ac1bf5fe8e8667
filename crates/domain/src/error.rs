//! Common error types used across the workspace.
//!
//! Each layer defines its own typed errors and converts into [`HubError`]
//! via `#[from]` (no `String` variants for structured failures).

use crate::schedule::ScheduleError;
use crate::state::State;

/// Top-level error for every fallible rulehub operation.
#[derive(Debug, thiserror::Error)]
pub enum HubError {
    #[error("validation error")]
    Validation(#[from] ValidationError),

    #[error("not found")]
    NotFound(#[from] NotFoundError),

    #[error("invalid schedule")]
    Schedule(#[from] ScheduleError),

    /// An interface adapter failed to deliver a command.
    #[error("interface error")]
    Interface(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// The hub actor is no longer running.
    #[error("hub is not running")]
    Unavailable,
}

/// A domain invariant was violated while building or wiring a device.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("name must not be empty")]
    EmptyName,

    #[error("device name {0:?} is already in use")]
    DuplicateName(String),

    #[error("a device must declare at least one valid state")]
    NoValidStates,

    #[error("initial state {0} is not a valid state for this device")]
    InvalidInitialState(State),

    #[error("{0} rule must react to at least one command")]
    EmptyCommandSet(&'static str),

    #[error("a device cannot delegate to itself")]
    SelfDelegation,

    #[error("interface {0:?} is already attached")]
    DuplicateInterface(String),

    #[error("command {command} is not supported by interface {interface:?}")]
    UnsupportedCommand { interface: String, command: String },
}

/// A referenced object does not exist.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("{entity} {id} not found")]
pub struct NotFoundError {
    pub entity: &'static str,
    pub id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_wrap_validation_error_via_from() {
        let err: HubError = ValidationError::EmptyName.into();
        assert!(matches!(err, HubError::Validation(ValidationError::EmptyName)));
    }

    #[test]
    fn should_display_not_found_with_entity_and_id() {
        let err = NotFoundError {
            entity: "Device",
            id: "porch".to_string(),
        };
        assert_eq!(err.to_string(), "Device porch not found");
    }

    #[test]
    fn should_display_invalid_initial_state() {
        let err = ValidationError::InvalidInitialState(State::Open);
        assert_eq!(
            err.to_string(),
            "initial state open is not a valid state for this device"
        );
    }
}

//! Idle and schedule rules: the per-device timing policies that are not
//! keyed on an incoming command.

use std::time::Duration;

use crate::command::Command;
use crate::schedule::ScheduleSpec;

/// Issue `command` once the device has gone `delay` without an accepted
/// command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdleRule {
    pub command: Command,
    pub delay: Duration,
}

/// Issue `command` on every occurrence of `schedule`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleRule {
    pub schedule: ScheduleSpec,
    pub command: Command,
}

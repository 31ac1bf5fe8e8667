//! Delay and trigger rules.
//!
//! Both share the same shape: match a resolved command and source, then
//! fire a (possibly different) command after a fixed delay. A delay rule
//! fires *instead of* applying the command; a trigger rule fires *in
//! addition to* it.

use std::time::Duration;

use crate::command::Command;
use crate::source::{Source, SourceFilter};

use super::CommandSet;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimedRule {
    pub commands: CommandSet,
    pub sources: SourceFilter,
    /// Command fired when the timer expires; `None` re-issues the matched
    /// command.
    pub target: Option<Command>,
    pub delay: Duration,
}

impl TimedRule {
    #[must_use]
    pub fn new(commands: impl Into<CommandSet>, delay: Duration) -> Self {
        Self {
            commands: commands.into(),
            sources: SourceFilter::Any,
            target: None,
            delay,
        }
    }

    #[must_use]
    pub fn mapped(mut self, target: Command) -> Self {
        self.target = Some(target);
        self
    }

    #[must_use]
    pub fn from_source(mut self, sources: impl Into<SourceFilter>) -> Self {
        self.sources = sources.into();
        self
    }

    #[must_use]
    pub fn matches(&self, command: Command, source: Option<&Source>) -> bool {
        self.commands.contains(command) && self.sources.matches(source)
    }

    /// The command to fire for a match on `matched`.
    #[must_use]
    pub fn fired_command(&self, matched: Command) -> Command {
        self.target.unwrap_or(matched)
    }
}

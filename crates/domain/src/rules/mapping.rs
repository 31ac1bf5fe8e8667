//! Mapping rule: rewrite an incoming command, optionally after a quiet
//! period.

use std::time::Duration;

use crate::command::Command;
use crate::source::SourceFilter;

use super::CommandSet;

/// Replace any of `commands` from `sources` by `target`.
///
/// With a `delay`, the target is not applied immediately: every matching
/// command restarts a countdown and `target` is applied once the burst has
/// been quiet for `delay`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapRule {
    pub commands: CommandSet,
    pub sources: SourceFilter,
    pub target: Command,
    pub delay: Option<Duration>,
}

impl MapRule {
    #[must_use]
    pub fn new(commands: impl Into<CommandSet>, target: Command) -> Self {
        Self {
            commands: commands.into(),
            sources: SourceFilter::Any,
            target,
            delay: None,
        }
    }

    #[must_use]
    pub fn from_source(mut self, sources: impl Into<SourceFilter>) -> Self {
        self.sources = sources.into();
        self
    }

    #[must_use]
    pub fn after(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

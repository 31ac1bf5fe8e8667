//! Ignore rule: drop matching commands before anything else happens.

use crate::command::Command;
use crate::source::{Source, SourceFilter};

use super::CommandSet;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IgnoreRule {
    pub commands: CommandSet,
    pub sources: SourceFilter,
}

impl IgnoreRule {
    /// Ignore `commands` from every source.
    #[must_use]
    pub fn new(commands: impl Into<CommandSet>) -> Self {
        Self {
            commands: commands.into(),
            sources: SourceFilter::Any,
        }
    }

    /// Restrict the rule to the given sources.
    #[must_use]
    pub fn from_source(mut self, sources: impl Into<SourceFilter>) -> Self {
        self.sources = sources.into();
        self
    }

    #[must_use]
    pub fn matches(&self, command: Command, source: Option<&Source>) -> bool {
        self.commands.contains(command) && self.sources.matches(source)
    }
}

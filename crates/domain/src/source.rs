//! Source: the originator of a command, used for rule matching.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::id::DeviceId;

/// Who issued a command.
///
/// A command with no source at all (e.g. issued by a schedule or by user
/// code) is represented as `Option::<Source>::None` at call sites.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum Source {
    /// Another device (or the device itself, for timer firings).
    Device(DeviceId),
    /// A hardware interface adapter, by its attached name.
    Interface(String),
    /// Any other token, e.g. a user-facing controller.
    External(String),
}

impl Source {
    #[must_use]
    pub fn interface(name: impl Into<String>) -> Self {
        Self::Interface(name.into())
    }

    #[must_use]
    pub fn external(token: impl Into<String>) -> Self {
        Self::External(token.into())
    }

    #[must_use]
    pub fn is_device(&self, id: DeviceId) -> bool {
        matches!(self, Self::Device(d) if *d == id)
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Device(id) => write!(f, "device:{id}"),
            Self::Interface(name) => write!(f, "interface:{name}"),
            Self::External(token) => write!(f, "external:{token}"),
        }
    }
}

/// Which sources a rule applies to.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "type", content = "sources", rename_all = "snake_case")]
pub enum SourceFilter {
    /// Wildcard: matches every source, including no source.
    #[default]
    Any,
    One(Source),
    AnyOf(Vec<Source>),
}

impl SourceFilter {
    #[must_use]
    pub fn is_wildcard(&self) -> bool {
        matches!(self, Self::Any)
    }

    /// Whether the filter names `source` explicitly (wildcards never do).
    #[must_use]
    pub fn names(&self, source: Option<&Source>) -> bool {
        let Some(source) = source else {
            return false;
        };
        match self {
            Self::Any => false,
            Self::One(s) => s == source,
            Self::AnyOf(sources) => sources.contains(source),
        }
    }

    #[must_use]
    pub fn matches(&self, source: Option<&Source>) -> bool {
        self.is_wildcard() || self.names(source)
    }
}

impl From<Source> for SourceFilter {
    fn from(source: Source) -> Self {
        Self::One(source)
    }
}

impl From<Option<Source>> for SourceFilter {
    fn from(source: Option<Source>) -> Self {
        source.map_or(Self::Any, Self::One)
    }
}

impl FromIterator<Source> for SourceFilter {
    fn from_iter<T: IntoIterator<Item = Source>>(iter: T) -> Self {
        let mut sources: Vec<Source> = iter.into_iter().collect();
        match sources.len() {
            0 => Self::Any,
            1 => Self::One(sources.remove(0)),
            _ => Self::AnyOf(sources),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_match_every_source_when_wildcard() {
        let filter = SourceFilter::Any;
        assert!(filter.matches(None));
        assert!(filter.matches(Some(&Source::interface("upb"))));
        assert!(!filter.names(Some(&Source::interface("upb"))));
    }

    #[test]
    fn should_match_only_named_source() {
        let sensor = Source::Device(DeviceId::new());
        let filter = SourceFilter::from(sensor.clone());
        assert!(filter.matches(Some(&sensor)));
        assert!(!filter.matches(Some(&Source::Device(DeviceId::new()))));
        assert!(!filter.matches(None));
    }

    #[test]
    fn should_match_any_member_of_a_set() {
        let filter: SourceFilter = [Source::interface("upb"), Source::external("panel")]
            .into_iter()
            .collect();
        assert!(filter.matches(Some(&Source::external("panel"))));
        assert!(!filter.matches(Some(&Source::interface("insteon"))));
    }

    #[test]
    fn should_collect_empty_set_into_wildcard() {
        let filter: SourceFilter = std::iter::empty().collect();
        assert!(filter.is_wildcard());
    }

    #[test]
    fn should_display_source_with_prefix() {
        assert_eq!(Source::interface("upb").to_string(), "interface:upb");
        assert_eq!(Source::external("web").to_string(), "external:web");
    }
}

//! Filters over event types, in their JSON wire form.
//!
//! The grammar accepts the wildcard string `"*"`, a single event type, a
//! list of types, or an object `{include, exclude?}` where `include` is
//! `"*"` or a list of types.

use serde::{Deserialize, Serialize};

/// The wildcard that matches every event type.
pub const WILDCARD: &str = "*";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Selector {
    /// `"*"` or one event type.
    Type(String),
    /// A list of event types.
    Types(Vec<String>),
    /// `{ include, exclude? }`.
    Filter(SelectorFilter),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SelectorFilter {
    pub include: IncludeSpec,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exclude: Option<Vec<String>>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IncludeSpec {
    /// `"*"`.
    Wildcard(String),
    Types(Vec<String>),
}

impl Selector {
    /// The selector that matches everything.
    pub fn all() -> Self {
        Selector::Type(WILDCARD.to_owned())
    }

    pub fn matches(&self, event_type: &str) -> bool {
        match self {
            Selector::Type(ty) => ty == WILDCARD || ty == event_type,
            Selector::Types(types) => types.iter().any(|ty| ty == event_type),
            Selector::Filter(filter) => filter.matches(event_type),
        }
    }
}

impl Default for Selector {
    fn default() -> Self {
        Selector::all()
    }
}

impl SelectorFilter {
    pub fn matches(&self, event_type: &str) -> bool {
        let included = match &self.include {
            IncludeSpec::Wildcard(ty) => ty == WILDCARD || ty == event_type,
            IncludeSpec::Types(types) => types.iter().any(|ty| ty == event_type),
        };
        let excluded = self
            .exclude
            .as_ref()
            .is_some_and(|types| types.iter().any(|ty| ty == event_type));
        included && !excluded
    }
}

impl From<&str> for Selector {
    fn from(ty: &str) -> Self {
        Selector::Type(ty.to_owned())
    }
}

impl<const N: usize> From<[&str; N]> for Selector {
    fn from(types: [&str; N]) -> Self {
        Selector::Types(types.iter().map(|ty| (*ty).to_owned()).collect())
    }
}

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub type Metadata = HashMap<String, serde_json::Value>;

/// Metadata key holding an item's location in the content tree
/// (e.g. `course/unit-3/lesson-2`), matched by `path_prefix` filters.
pub const PATH_METADATA_KEY: &str = "path";

/// Visibility scope an item or entity belongs to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum LayerKind {
    Personal,
    Tenant,
    Global,
}

impl LayerKind {
    /// Lower value wins ties. Never used to inflate scores.
    pub fn priority(&self) -> u8 {
        match self {
            Self::Personal => 0,
            Self::Tenant => 1,
            Self::Global => 2,
        }
    }
}

impl std::fmt::Display for LayerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Personal => write!(f, "personal"),
            Self::Tenant => write!(f, "tenant"),
            Self::Global => write!(f, "global"),
        }
    }
}

impl std::str::FromStr for LayerKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "personal" | "user" => Ok(Self::Personal),
            "tenant" | "organization" | "org" => Ok(Self::Tenant),
            "global" | "public" => Ok(Self::Global),
            _ => Err(format!("Unknown layer: {s}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct SearchFilters {
    #[serde(rename = "AND")]
    pub and: Option<Vec<FilterCondition>>,
    #[serde(rename = "OR")]
    pub or: Option<Vec<FilterCondition>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FilterCondition {
    pub key: String,
    pub value: String,
    pub negate: Option<bool>,
}

impl FilterCondition {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            negate: None,
        }
    }

    pub fn negated(mut self) -> Self {
        self.negate = Some(true);
        self
    }

    fn matches(&self, metadata: &Metadata) -> bool {
        let matches = metadata
            .get(&self.key)
            .and_then(|value| value.as_str())
            .is_some_and(|value| value == self.value);
        if self.negate.unwrap_or(false) {
            !matches
        } else {
            matches
        }
    }
}

impl SearchFilters {
    /// All `AND` conditions hold and, when present, at least one `OR` condition holds.
    pub fn matches(&self, metadata: &Metadata) -> bool {
        let matches_and = self
            .and
            .as_ref()
            .map_or(true, |conditions| conditions.iter().all(|c| c.matches(metadata)));
        let matches_or = self
            .or
            .as_ref()
            .map_or(true, |conditions| conditions.iter().any(|c| c.matches(metadata)));
        matches_and && matches_or
    }
}

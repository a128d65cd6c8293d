use serde::{Deserialize, Serialize};

use super::{LayerKind, Metadata};

/// An atomic retrievable unit: a base text chunk (level 0) or a summary node
/// (level N summarises level N-1).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Item {
    pub id: String,

    /// Owning user for personal items, or the creator otherwise.
    pub owner_id: String,

    /// Tenant the item belongs to. Required for tenant-layer items.
    #[serde(default)]
    pub tenant_id: Option<String>,

    pub layer: LayerKind,

    #[serde(default)]
    pub vector: Option<Vec<f32>>,

    #[serde(default)]
    pub content: String,

    #[serde(default)]
    pub metadata: Metadata,

    /// Hierarchy level. `None` and `Some(0)` both mean base content.
    #[serde(default)]
    pub level: Option<u32>,

    #[serde(default)]
    pub parent_id: Option<String>,

    #[serde(default)]
    pub children: Vec<String>,
}

impl Item {
    pub fn new(id: impl Into<String>, owner_id: impl Into<String>, layer: LayerKind) -> Self {
        Self {
            id: id.into(),
            owner_id: owner_id.into(),
            tenant_id: None,
            layer,
            vector: None,
            content: String::new(),
            metadata: Metadata::new(),
            level: None,
            parent_id: None,
            children: Vec::new(),
        }
    }

    pub fn with_tenant(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self
    }

    pub fn with_vector(mut self, vector: Vec<f32>) -> Self {
        self.vector = Some(vector);
        self
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = content.into();
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    pub fn as_summary(mut self, level: u32, children: Vec<String>) -> Self {
        self.level = Some(level);
        self.children = children;
        self
    }

    pub fn level(&self) -> u32 {
        self.level.unwrap_or(0)
    }

    pub fn is_summary(&self) -> bool {
        self.level() > 0
    }
}

/// Which hierarchy levels a similarity lookup may return.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LevelScope {
    /// Level 0 only.
    Base,
    /// Level > 0 only.
    Summaries,
}

impl LevelScope {
    pub fn admits(&self, item: &Item) -> bool {
        match self {
            Self::Base => !item.is_summary(),
            Self::Summaries => item.is_summary(),
        }
    }
}

use serde::{Deserialize, Serialize};

use super::LayerKind;

/// A node in the relation graph.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Entity {
    /// Unique identifier
    pub id: String,

    /// Entity type tag (concept, person, skill, ...)
    #[serde(rename = "type")]
    pub entity_type: String,

    pub owner_id: String,

    #[serde(default)]
    pub tenant_id: Option<String>,

    pub layer: LayerKind,

    #[serde(default)]
    pub vector: Option<Vec<f32>>,

    /// Descriptive text
    #[serde(default)]
    pub description: String,
}

impl Entity {
    pub fn new(
        id: impl Into<String>,
        entity_type: impl Into<String>,
        owner_id: impl Into<String>,
        layer: LayerKind,
    ) -> Self {
        Self {
            id: id.into(),
            entity_type: entity_type.into(),
            owner_id: owner_id.into(),
            tenant_id: None,
            layer,
            vector: None,
            description: String::new(),
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

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// A typed edge between two entities. Traversable in both directions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Relation {
    /// Source entity ID
    pub source: String,

    /// Target entity ID
    pub target: String,

    /// Relation label (prerequisite_of, part_of, ...)
    #[serde(rename = "type")]
    pub relation_type: String,
}

impl Relation {
    pub fn new(
        source: impl Into<String>,
        target: impl Into<String>,
        relation_type: impl Into<String>,
    ) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            relation_type: relation_type.into(),
        }
    }

    /// The endpoint opposite `entity_id`, if this relation touches it.
    pub fn other_end(&self, entity_id: &str) -> Option<&str> {
        if self.source == entity_id {
            Some(&self.target)
        } else if self.target == entity_id {
            Some(&self.source)
        } else {
            None
        }
    }
}

/// One hop reachable from an entity.
#[derive(Debug, Clone, PartialEq)]
pub struct Neighbor {
    pub entity_id: String,
    pub relation_type: String,
}

/// Filters applied during graph traversal.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct GraphFilters {
    /// Only entities of these types are seeded or reached.
    #[serde(default)]
    pub entity_types: Option<Vec<String>>,

    /// Only relations of these types are followed.
    #[serde(default)]
    pub relation_types: Option<Vec<String>>,
}

impl GraphFilters {
    pub fn admits_entity(&self, entity: &Entity) -> bool {
        self.entity_types
            .as_ref()
            .map_or(true, |types| types.iter().any(|t| t == &entity.entity_type))
    }

    pub fn admits_relation(&self, relation_type: &str) -> bool {
        self.relation_types
            .as_ref()
            .map_or(true, |types| types.iter().any(|t| t == relation_type))
    }
}

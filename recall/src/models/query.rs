use serde::{Deserialize, Serialize};

use super::{
    GraphFilters, Item, SearchFilters, StrategyKind, VisibilityContext, PATH_METADATA_KEY,
};

/// Item-level filters applied inside every item-returning strategy.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ItemFilters {
    #[serde(default)]
    pub metadata: Option<SearchFilters>,

    /// Only items whose `path` metadata starts with this prefix.
    #[serde(default)]
    pub path_prefix: Option<String>,
}

impl ItemFilters {
    pub fn matches(&self, item: &Item) -> bool {
        if let Some(ref filters) = self.metadata {
            if !filters.matches(&item.metadata) {
                return false;
            }
        }

        if let Some(ref prefix) = self.path_prefix {
            let in_subtree = item
                .metadata
                .get(PATH_METADATA_KEY)
                .and_then(|value| value.as_str())
                .is_some_and(|path| path.starts_with(prefix.as_str()));
            if !in_subtree {
                return false;
            }
        }

        true
    }
}

/// Graph traversal parameters. Unset values fall back to configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct GraphParams {
    #[serde(default)]
    pub max_hops: Option<u32>,
    /// Per-hop score multiplier. Clamped to `[0, 1]`.
    #[serde(default)]
    pub decay_factor: Option<f32>,
    #[serde(default, flatten)]
    pub filters: GraphFilters,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RetrievalQuery {
    #[serde(default)]
    pub text: Option<String>,

    /// Pre-computed query embedding. Must match the index dimensionality.
    #[serde(default)]
    pub vector: Option<Vec<f32>>,

    #[serde(default)]
    pub context: VisibilityContext,

    /// Minimum similarity (exclusive) in `[0, 1]`.
    #[serde(default)]
    pub threshold: Option<f32>,

    #[serde(default)]
    pub limit: Option<u32>,

    /// Strategies to run. `None` uses the configured defaults.
    #[serde(default)]
    pub strategies: Option<Vec<StrategyKind>>,

    #[serde(default)]
    pub filters: ItemFilters,

    #[serde(default)]
    pub graph: GraphParams,
}

impl RetrievalQuery {
    pub fn new(context: VisibilityContext) -> Self {
        Self {
            context,
            ..Self::default()
        }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn with_vector(mut self, vector: Vec<f32>) -> Self {
        self.vector = Some(vector);
        self
    }

    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = Some(threshold);
        self
    }

    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_strategies(mut self, strategies: Vec<StrategyKind>) -> Self {
        self.strategies = Some(strategies);
        self
    }

    pub fn with_graph(mut self, max_hops: u32, decay_factor: f32) -> Self {
        self.graph.max_hops = Some(max_hops);
        self.graph.decay_factor = Some(decay_factor);
        self
    }

    /// Query text with surrounding whitespace removed, if any remains.
    pub fn trimmed_text(&self) -> Option<&str> {
        self.text
            .as_deref()
            .map(str::trim)
            .filter(|text| !text.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FilterCondition, LayerKind};
    use serde_json::json;

    #[test]
    fn test_path_prefix_filter() {
        let filters = ItemFilters {
            metadata: None,
            path_prefix: Some("algebra/linear".to_string()),
        };
        let inside = Item::new("a", "u1", LayerKind::Global)
            .with_metadata("path", json!("algebra/linear/eigen"));
        let outside = Item::new("b", "u1", LayerKind::Global)
            .with_metadata("path", json!("geometry/triangles"));
        let untagged = Item::new("c", "u1", LayerKind::Global);

        assert!(filters.matches(&inside));
        assert!(!filters.matches(&outside));
        assert!(!filters.matches(&untagged));
    }

    #[test]
    fn test_metadata_filter_combines_with_path() {
        let filters = ItemFilters {
            metadata: Some(SearchFilters {
                and: Some(vec![FilterCondition::new("subject", "math")]),
                or: None,
            }),
            path_prefix: None,
        };
        let item = Item::new("a", "u1", LayerKind::Global).with_metadata("subject", json!("math"));
        assert!(filters.matches(&item));
        assert!(!filters.matches(&Item::new("b", "u1", LayerKind::Global)));
    }

    #[test]
    fn test_query_deserializes_graph_filters_flat() {
        let query: RetrievalQuery = serde_json::from_value(json!({
            "text": "photosynthesis",
            "context": {"tenant_id": "t1", "owner_id": "u1"},
            "graph": {"max_hops": 3, "relation_types": ["part_of"]}
        }))
        .unwrap();
        assert_eq!(query.graph.max_hops, Some(3));
        assert_eq!(
            query.graph.filters.relation_types,
            Some(vec!["part_of".to_string()])
        );
        assert_eq!(query.context.tenant_id.as_deref(), Some("t1"));
    }

    #[test]
    fn test_trimmed_text() {
        let query = RetrievalQuery::default().with_text("   ");
        assert_eq!(query.trimmed_text(), None);
        let query = RetrievalQuery::default().with_text(" cells ");
        assert_eq!(query.trimmed_text(), Some("cells"));
    }
}

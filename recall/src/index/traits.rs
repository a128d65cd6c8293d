use async_trait::async_trait;

use crate::error::Result;
use crate::models::{
    GraphFilters, Item, ItemFilters, LayerGrant, LayerSet, LevelScope, Neighbor, ScoredId,
};

use super::text::LexicalQuery;

// ---------------------------------------------------------------------------
// Leaf store traits
// ---------------------------------------------------------------------------

/// Approximate nearest-neighbour lookup over item vectors.
#[async_trait]
pub trait SimilarityIndex: Send + Sync {
    /// Items inside `grant` and `levels` whose cosine similarity to `vector`
    /// is strictly greater than `threshold`. Ordering is not guaranteed.
    async fn search_similar(
        &self,
        vector: &[f32],
        threshold: f32,
        limit: usize,
        grant: &LayerGrant,
        levels: LevelScope,
        filters: &ItemFilters,
    ) -> Result<Vec<ScoredId>>;
}

/// Ranked keyword search over item text.
#[async_trait]
pub trait LexicalIndex: Send + Sync {
    async fn search_text(
        &self,
        query: &LexicalQuery,
        limit: usize,
        grant: &LayerGrant,
        filters: &ItemFilters,
    ) -> Result<Vec<ScoredId>>;
}

/// Forest of summary nodes with parent/child links.
#[async_trait]
pub trait HierarchyStore: Send + Sync {
    /// Similarity lookup restricted to items with level > 0.
    async fn search_summaries(
        &self,
        vector: &[f32],
        threshold: f32,
        limit: usize,
        grant: &LayerGrant,
        filters: &ItemFilters,
    ) -> Result<Vec<ScoredId>>;

    async fn get_node(&self, id: &str) -> Result<Option<Item>>;

    /// Direct children in stored order. Empty for base items.
    async fn children(&self, id: &str) -> Result<Vec<String>>;
}

/// Typed relations between entities, traversable in both directions.
#[async_trait]
pub trait RelationGraph: Send + Sync {
    /// Visible entities whose similarity to `vector` is strictly greater than `threshold`.
    async fn seed_entities(
        &self,
        vector: &[f32],
        threshold: f32,
        limit: usize,
        layers: &LayerSet,
        filters: &GraphFilters,
    ) -> Result<Vec<ScoredId>>;

    /// Visible entities one relation away from `entity_id`, either direction.
    async fn neighbors(
        &self,
        entity_id: &str,
        layers: &LayerSet,
        filters: &GraphFilters,
    ) -> Result<Vec<Neighbor>>;
}

// ---------------------------------------------------------------------------
// Unified backend supertrait
// ---------------------------------------------------------------------------

/// A backend serving every leaf store from one datastore.
pub trait RetrievalBackend: SimilarityIndex + LexicalIndex + HierarchyStore + RelationGraph {}

impl<T> RetrievalBackend for T where T: SimilarityIndex + LexicalIndex + HierarchyStore + RelationGraph
{}

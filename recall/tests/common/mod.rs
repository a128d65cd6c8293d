// Common test utilities for integration tests
#![allow(dead_code)]

use std::sync::{Arc, Once};
use std::time::Duration;

use async_trait::async_trait;

use recall::config::{CacheConfig, Config, GraphConfig, RetrievalConfig};
use recall::embeddings::Embedder;
use recall::error::{RecallError, Result};
use recall::index::{InMemoryIndex, LexicalIndex, LexicalQuery, RelationGraph};
use recall::models::{
    Entity, GraphFilters, Item, ItemFilters, LayerGrant, LayerKind, LayerSet, Neighbor, Relation,
    ScoredId, VisibilityContext,
};

static INIT: Once = Once::new();

/// Initialize tracing subscriber once for tests
pub fn init_test_logger() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .try_init();
    });
}

pub const DIMS: usize = 2;

/// Deterministic configuration for two-dimensional test corpora.
pub fn test_config() -> Config {
    Config {
        retrieval: RetrievalConfig {
            dimensions: DIMS,
            ..RetrievalConfig::default()
        },
        graph: GraphConfig::default(),
        cache: CacheConfig::default(),
        embeddings: None,
    }
}

pub fn global_item(id: &str, vector: [f32; 2], content: &str) -> Item {
    Item::new(id, "author", LayerKind::Global)
        .with_vector(vector.to_vec())
        .with_content(content)
}

pub fn concept(id: &str, vector: Option<[f32; 2]>) -> Entity {
    let entity = Entity::new(id, "concept", "author", LayerKind::Global);
    match vector {
        Some(v) => entity.with_vector(v.to_vec()),
        None => entity,
    }
}

pub fn member(tenant: &str, owner: &str) -> VisibilityContext {
    VisibilityContext::new(Some(tenant), Some(owner))
}

/// Three global items arranged so vector search ranks A, B and lexical
/// search for "glycolysis pathway" ranks C, A.
pub fn fusion_corpus() -> Arc<InMemoryIndex> {
    let index = InMemoryIndex::new(DIMS);
    for item in [
        global_item("A", [1.0, 0.0], "Glycolysis splits glucose"),
        global_item("B", [0.9, 0.44], "Fermentation without oxygen"),
        global_item("C", [0.0, 1.0], "The glycolysis pathway has ten steps"),
    ] {
        index.upsert_item(item).expect("valid item");
    }
    Arc::new(index)
}

/// A relation graph that answers correctly, but only after `delay`.
pub struct SlowGraph {
    pub inner: Arc<InMemoryIndex>,
    pub delay: Duration,
}

#[async_trait]
impl RelationGraph for SlowGraph {
    async fn seed_entities(
        &self,
        vector: &[f32],
        threshold: f32,
        limit: usize,
        layers: &LayerSet,
        filters: &GraphFilters,
    ) -> Result<Vec<ScoredId>> {
        tokio::time::sleep(self.delay).await;
        self.inner
            .seed_entities(vector, threshold, limit, layers, filters)
            .await
    }

    async fn neighbors(
        &self,
        entity_id: &str,
        layers: &LayerSet,
        filters: &GraphFilters,
    ) -> Result<Vec<Neighbor>> {
        self.inner.neighbors(entity_id, layers, filters).await
    }
}

/// A lexical index whose backing store is down.
pub struct BrokenLexical;

#[async_trait]
impl LexicalIndex for BrokenLexical {
    async fn search_text(
        &self,
        _query: &LexicalQuery,
        _limit: usize,
        _grant: &LayerGrant,
        _filters: &ItemFilters,
    ) -> Result<Vec<ScoredId>> {
        Err(RecallError::Index("full-text index unavailable".to_string()))
    }
}

/// A lexical index that answers correctly, but only after `delay`.
pub struct SlowLexical {
    pub inner: Arc<InMemoryIndex>,
    pub delay: Duration,
}

#[async_trait]
impl LexicalIndex for SlowLexical {
    async fn search_text(
        &self,
        query: &LexicalQuery,
        limit: usize,
        grant: &LayerGrant,
        filters: &ItemFilters,
    ) -> Result<Vec<ScoredId>> {
        tokio::time::sleep(self.delay).await;
        self.inner.search_text(query, limit, grant, filters).await
    }
}

/// Embeds every query to the same vector.
pub struct FixedEmbedder(pub Vec<f32>);

#[async_trait]
impl Embedder for FixedEmbedder {
    async fn embed_query(&self, _text: &str) -> Result<Vec<f32>> {
        Ok(self.0.clone())
    }
}

/// An embedding model that takes `delay` to answer.
pub struct SlowEmbedder {
    pub vector: Vec<f32>,
    pub delay: Duration,
}

#[async_trait]
impl Embedder for SlowEmbedder {
    async fn embed_query(&self, _text: &str) -> Result<Vec<f32>> {
        tokio::time::sleep(self.delay).await;
        Ok(self.vector.clone())
    }
}

pub struct FailingEmbedder;

#[async_trait]
impl Embedder for FailingEmbedder {
    async fn embed_query(&self, _text: &str) -> Result<Vec<f32>> {
        Err(RecallError::Embedding("model offline".to_string()))
    }
}

/// Builds a graph with the given entities and undirected relations.
pub fn graph(entities: Vec<Entity>, relations: &[(&str, &str)]) -> Arc<InMemoryIndex> {
    let index = InMemoryIndex::new(DIMS);
    for entity in entities {
        index.upsert_entity(entity).expect("valid entity");
    }
    for (source, target) in relations {
        index
            .add_relation(Relation::new(*source, *target, "related_to"))
            .expect("valid relation");
    }
    Arc::new(index)
}

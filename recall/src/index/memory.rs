//! In-memory [`RetrievalBackend`](super::RetrievalBackend) used by the CLI and tests.
//!
//! All state lives behind one `RwLock`. Vector search is brute-force cosine
//! similarity; lexical search runs BM25 over tokens captured at ingestion.

use std::collections::{HashMap, HashSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{RecallError, Result};
use crate::models::{
    Entity, GraphFilters, Item, ItemFilters, LayerGrant, LayerKind, LayerSet, LevelScope,
    Neighbor, Relation, ScoredId,
};

use super::text::{self, CorpusStats, LexicalQuery};
use super::{cosine_similarity, HierarchyStore, LexicalIndex, RelationGraph, SimilarityIndex};

/// Serializable snapshot of everything an index holds.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Corpus {
    #[serde(default)]
    pub items: Vec<Item>,
    #[serde(default)]
    pub entities: Vec<Entity>,
    #[serde(default)]
    pub relations: Vec<Relation>,
}

#[derive(Debug)]
struct StoredItem {
    item: Item,
    tokens: Vec<String>,
}

#[derive(Debug, Default)]
struct IndexState {
    items: HashMap<String, StoredItem>,
    entities: HashMap<String, Entity>,
    relations: Vec<Relation>,
    /// entity id -> indices into `relations`, both directions
    adjacency: HashMap<String, Vec<usize>>,
    /// item id -> summaries listing it as a child, whether or not it exists yet
    parents: HashMap<String, HashSet<String>>,
}

#[derive(Debug)]
pub struct InMemoryIndex {
    dimensions: usize,
    state: RwLock<IndexState>,
}

impl InMemoryIndex {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            state: RwLock::new(IndexState::default()),
        }
    }

    /// Loads a snapshot, validating every record and the hierarchy as a whole.
    pub fn from_corpus(dimensions: usize, corpus: Corpus) -> Result<Self> {
        let index = Self::new(dimensions);
        for item in corpus.items {
            index.upsert_item(item)?;
        }
        for entity in corpus.entities {
            index.upsert_entity(entity)?;
        }
        for relation in corpus.relations {
            index.add_relation(relation)?;
        }
        index.validate_hierarchy()?;
        Ok(index)
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, IndexState>> {
        self.state
            .read()
            .map_err(|_| RecallError::Internal("index lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, IndexState>> {
        self.state
            .write()
            .map_err(|_| RecallError::Internal("index lock poisoned".to_string()))
    }

    fn check_vector(&self, id: &str, vector: Option<&[f32]>) -> Result<()> {
        let Some(vector) = vector else {
            return Ok(());
        };
        if vector.len() != self.dimensions {
            return Err(RecallError::Validation(format!(
                "Vector for '{id}' has {} dimensions, index expects {}",
                vector.len(),
                self.dimensions
            )));
        }
        if vector.iter().any(|v| !v.is_finite()) {
            return Err(RecallError::Validation(format!(
                "Vector for '{id}' contains non-finite values"
            )));
        }
        Ok(())
    }

    fn check_visibility(id: &str, layer: LayerKind, tenant_id: Option<&str>) -> Result<()> {
        if layer == LayerKind::Tenant && tenant_id.map_or(true, |t| t.trim().is_empty()) {
            return Err(RecallError::Validation(format!(
                "Tenant-layer record '{id}' has no tenant_id"
            )));
        }
        Ok(())
    }

    pub fn upsert_item(&self, item: Item) -> Result<()> {
        if item.id.trim().is_empty() {
            return Err(RecallError::Validation("Item id must not be empty".to_string()));
        }
        self.check_vector(&item.id, item.vector.as_deref())?;
        Self::check_visibility(&item.id, item.layer, item.tenant_id.as_deref())?;

        if item.is_summary() == item.children.is_empty() {
            return Err(RecallError::Validation(format!(
                "Item '{}' at level {} must have children iff its level is above 0",
                item.id,
                item.level()
            )));
        }

        let mut state = self.write()?;
        for child_id in &item.children {
            if let Some(child) = state.items.get(child_id) {
                if child.item.level() >= item.level() {
                    return Err(RecallError::Validation(format!(
                        "Child '{}' of '{}' is not below level {}",
                        child_id,
                        item.id,
                        item.level()
                    )));
                }
            }
        }
        if let Some(parent_ids) = state.parents.get(&item.id) {
            for parent_id in parent_ids {
                let Some(parent) = state.items.get(parent_id) else {
                    continue;
                };
                if item.level() >= parent.item.level() {
                    return Err(RecallError::Validation(format!(
                        "Child '{}' of '{}' is not below level {}",
                        item.id,
                        parent_id,
                        parent.item.level()
                    )));
                }
            }
        }

        let replaced = state.items.remove(&item.id);
        if let Some(old) = replaced {
            for child_id in &old.item.children {
                if let Some(parent_ids) = state.parents.get_mut(child_id) {
                    parent_ids.remove(&item.id);
                    if parent_ids.is_empty() {
                        state.parents.remove(child_id);
                    }
                }
            }
        }
        for child_id in &item.children {
            state
                .parents
                .entry(child_id.clone())
                .or_default()
                .insert(item.id.clone());
        }

        let tokens = text::tokenize(&item.content);
        state
            .items
            .insert(item.id.clone(), StoredItem { item, tokens });
        Ok(())
    }

    pub fn upsert_entity(&self, entity: Entity) -> Result<()> {
        if entity.id.trim().is_empty() {
            return Err(RecallError::Validation(
                "Entity id must not be empty".to_string(),
            ));
        }
        self.check_vector(&entity.id, entity.vector.as_deref())?;
        Self::check_visibility(&entity.id, entity.layer, entity.tenant_id.as_deref())?;

        let mut state = self.write()?;
        state.entities.insert(entity.id.clone(), entity);
        Ok(())
    }

    pub fn add_relation(&self, relation: Relation) -> Result<()> {
        if relation.source == relation.target {
            return Err(RecallError::Validation(format!(
                "Self-relation on '{}' is not a valid hop",
                relation.source
            )));
        }

        let mut state = self.write()?;
        for endpoint in [&relation.source, &relation.target] {
            if !state.entities.contains_key(endpoint) {
                return Err(RecallError::NotFound(format!("Entity '{endpoint}'")));
            }
        }

        let idx = state.relations.len();
        state
            .adjacency
            .entry(relation.source.clone())
            .or_default()
            .push(idx);
        state
            .adjacency
            .entry(relation.target.clone())
            .or_default()
            .push(idx);
        state.relations.push(relation);
        Ok(())
    }

    /// Every child exists and sits at a strictly lower level than its parent.
    pub fn validate_hierarchy(&self) -> Result<()> {
        let state = self.read()?;
        for stored in state.items.values() {
            let parent = &stored.item;
            for child_id in &parent.children {
                let Some(child) = state.items.get(child_id) else {
                    return Err(RecallError::Validation(format!(
                        "Summary '{}' references missing child '{}'",
                        parent.id, child_id
                    )));
                };
                if child.item.level() >= parent.level() {
                    return Err(RecallError::Validation(format!(
                        "Child '{}' of '{}' is not below level {}",
                        child_id,
                        parent.id,
                        parent.level()
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.read().map(|state| state.items.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn similar_items(
        &self,
        vector: &[f32],
        threshold: f32,
        limit: usize,
        grant: &LayerGrant,
        levels: LevelScope,
        filters: &ItemFilters,
    ) -> Result<Vec<ScoredId>> {
        let state = self.read()?;
        let mut hits: Vec<ScoredId> = state
            .items
            .values()
            .map(|stored| &stored.item)
            .filter(|item| grant.admits(item.layer, &item.owner_id, item.tenant_id.as_deref()))
            .filter(|item| levels.admits(item) && filters.matches(item))
            .filter_map(|item| {
                let score = cosine_similarity(vector, item.vector.as_deref()?);
                (score > threshold).then(|| ScoredId::new(item.id.clone(), score))
            })
            .collect();

        sort_hits(&mut hits);
        hits.truncate(limit);
        Ok(hits)
    }

    fn entity_visible(
        state: &IndexState,
        entity_id: &str,
        layers: &LayerSet,
        filters: &GraphFilters,
    ) -> bool {
        state.entities.get(entity_id).is_some_and(|entity| {
            layers.admits(entity.layer, &entity.owner_id, entity.tenant_id.as_deref())
                && filters.admits_entity(entity)
        })
    }
}

fn sort_hits(hits: &mut [ScoredId]) {
    hits.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.id.cmp(&b.id))
    });
}

#[async_trait]
impl SimilarityIndex for InMemoryIndex {
    async fn search_similar(
        &self,
        vector: &[f32],
        threshold: f32,
        limit: usize,
        grant: &LayerGrant,
        levels: LevelScope,
        filters: &ItemFilters,
    ) -> Result<Vec<ScoredId>> {
        self.similar_items(vector, threshold, limit, grant, levels, filters)
    }
}

#[async_trait]
impl LexicalIndex for InMemoryIndex {
    async fn search_text(
        &self,
        query: &LexicalQuery,
        limit: usize,
        grant: &LayerGrant,
        filters: &ItemFilters,
    ) -> Result<Vec<ScoredId>> {
        let state = self.read()?;
        // Term statistics come from the grant's own partition, so other
        // tenants' text never shifts this tenant's scores.
        let partition: Vec<&StoredItem> = state
            .items
            .values()
            .filter(|stored| {
                let item = &stored.item;
                grant.admits(item.layer, &item.owner_id, item.tenant_id.as_deref())
            })
            .collect();
        let stats = CorpusStats::from_documents(partition.iter().map(|s| s.tokens.as_slice()));

        let mut hits: Vec<ScoredId> = partition
            .into_iter()
            .filter(|stored| filters.matches(&stored.item))
            .filter_map(|stored| {
                text::rank(query, &stored.tokens, &stats)
                    .map(|score| ScoredId::new(stored.item.id.clone(), score))
            })
            .collect();

        sort_hits(&mut hits);
        hits.truncate(limit);
        Ok(hits)
    }
}

#[async_trait]
impl HierarchyStore for InMemoryIndex {
    async fn search_summaries(
        &self,
        vector: &[f32],
        threshold: f32,
        limit: usize,
        grant: &LayerGrant,
        filters: &ItemFilters,
    ) -> Result<Vec<ScoredId>> {
        self.similar_items(
            vector,
            threshold,
            limit,
            grant,
            LevelScope::Summaries,
            filters,
        )
    }

    async fn get_node(&self, id: &str) -> Result<Option<Item>> {
        let state = self.read()?;
        Ok(state.items.get(id).map(|stored| stored.item.clone()))
    }

    async fn children(&self, id: &str) -> Result<Vec<String>> {
        let state = self.read()?;
        Ok(state
            .items
            .get(id)
            .map(|stored| stored.item.children.clone())
            .unwrap_or_default())
    }
}

#[async_trait]
impl RelationGraph for InMemoryIndex {
    async fn seed_entities(
        &self,
        vector: &[f32],
        threshold: f32,
        limit: usize,
        layers: &LayerSet,
        filters: &GraphFilters,
    ) -> Result<Vec<ScoredId>> {
        let state = self.read()?;
        let mut hits: Vec<ScoredId> = state
            .entities
            .values()
            .filter(|entity| Self::entity_visible(&state, &entity.id, layers, filters))
            .filter_map(|entity| {
                let score = cosine_similarity(vector, entity.vector.as_deref()?);
                (score > threshold).then(|| ScoredId::new(entity.id.clone(), score))
            })
            .collect();

        sort_hits(&mut hits);
        hits.truncate(limit);
        Ok(hits)
    }

    async fn neighbors(
        &self,
        entity_id: &str,
        layers: &LayerSet,
        filters: &GraphFilters,
    ) -> Result<Vec<Neighbor>> {
        let state = self.read()?;
        let Some(edges) = state.adjacency.get(entity_id) else {
            return Ok(Vec::new());
        };

        let mut seen: HashSet<&str> = HashSet::new();
        let mut neighbors = Vec::new();
        for &idx in edges {
            let relation = &state.relations[idx];
            if !filters.admits_relation(&relation.relation_type) {
                continue;
            }
            let Some(other) = relation.other_end(entity_id) else {
                continue;
            };
            if !Self::entity_visible(&state, other, layers, filters) || !seen.insert(other) {
                continue;
            }
            neighbors.push(Neighbor {
                entity_id: other.to_string(),
                relation_type: relation.relation_type.clone(),
            });
        }
        Ok(neighbors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FilterCondition, SearchFilters};
    use serde_json::json;

    fn global_item(id: &str, vector: Vec<f32>, content: &str) -> Item {
        Item::new(id, "author", LayerKind::Global)
            .with_vector(vector)
            .with_content(content)
    }

    fn tenant_grant(tenant: &str) -> LayerGrant {
        LayerGrant::Tenant {
            tenant_id: tenant.to_string(),
        }
    }

    #[tokio::test]
    async fn test_rejects_wrong_dimensionality() {
        let index = InMemoryIndex::new(3);
        let err = index
            .upsert_item(global_item("a", vec![1.0, 0.0], "x"))
            .unwrap_err();
        assert!(matches!(err, RecallError::Validation(_)));
    }

    #[tokio::test]
    async fn test_rejects_summary_without_children_and_base_with_children() {
        let index = InMemoryIndex::new(2);
        let mut summary = global_item("s", vec![1.0, 0.0], "summary");
        summary.level = Some(1);
        assert!(index.upsert_item(summary).is_err());

        let mut base = global_item("b", vec![1.0, 0.0], "base");
        base.children = vec!["x".to_string()];
        assert!(index.upsert_item(base).is_err());
    }

    #[tokio::test]
    async fn test_rejects_child_at_same_level() {
        let index = InMemoryIndex::new(2);
        index
            .upsert_item(global_item("a", vec![1.0, 0.0], "a"))
            .unwrap();
        index
            .upsert_item(global_item("s1", vec![1.0, 0.0], "s1").as_summary(1, vec!["a".into()]))
            .unwrap();
        let err = index
            .upsert_item(global_item("s2", vec![1.0, 0.0], "s2").as_summary(1, vec!["s1".into()]))
            .unwrap_err();
        assert!(err.to_string().contains("not below level"));
    }

    #[tokio::test]
    async fn test_rejects_child_raised_to_parent_level() {
        let index = InMemoryIndex::new(2);
        index
            .upsert_item(global_item("a", vec![1.0, 0.0], "a"))
            .unwrap();
        index
            .upsert_item(global_item("s1", vec![1.0, 0.0], "s1").as_summary(1, vec!["a".into()]))
            .unwrap();

        // Re-upserting the child at the parent's level breaks the hierarchy.
        let raised = global_item("a", vec![1.0, 0.0], "a")
            .as_summary(1, vec!["b".into()]);
        let err = index.upsert_item(raised).unwrap_err();
        assert!(err.to_string().contains("not below level"));
    }

    #[tokio::test]
    async fn test_rejects_child_arriving_after_parent_at_wrong_level() {
        let index = InMemoryIndex::new(2);
        index
            .upsert_item(global_item("leaf", vec![1.0, 0.0], "leaf"))
            .unwrap();
        index
            .upsert_item(
                global_item("s1", vec![1.0, 0.0], "s1").as_summary(1, vec!["late".into()]),
            )
            .unwrap();

        let late = global_item("late", vec![1.0, 0.0], "late").as_summary(2, vec!["leaf".into()]);
        assert!(matches!(
            index.upsert_item(late),
            Err(RecallError::Validation(_))
        ));

        index
            .upsert_item(global_item("late", vec![1.0, 0.0], "late"))
            .unwrap();
        index.validate_hierarchy().unwrap();
    }

    #[tokio::test]
    async fn test_replacing_a_summary_drops_its_old_child_links() {
        let index = InMemoryIndex::new(2);
        index
            .upsert_item(global_item("a", vec![1.0, 0.0], "a"))
            .unwrap();
        index
            .upsert_item(global_item("b", vec![1.0, 0.0], "b"))
            .unwrap();
        index
            .upsert_item(global_item("s1", vec![1.0, 0.0], "s1").as_summary(1, vec!["a".into()]))
            .unwrap();
        index
            .upsert_item(global_item("s1", vec![1.0, 0.0], "s1").as_summary(1, vec!["b".into()]))
            .unwrap();

        // a is no longer under s1, so it may become a summary itself.
        index
            .upsert_item(global_item("a", vec![1.0, 0.0], "a").as_summary(1, vec!["b".into()]))
            .unwrap();
    }

    #[tokio::test]
    async fn test_tenant_item_requires_tenant_id() {
        let index = InMemoryIndex::new(2);
        let item = Item::new("t", "u1", LayerKind::Tenant).with_content("x");
        assert!(index.upsert_item(item).is_err());
    }

    #[tokio::test]
    async fn test_search_similar_scopes_by_grant_and_level() {
        let index = InMemoryIndex::new(2);
        index
            .upsert_item(
                Item::new("mine", "u1", LayerKind::Tenant)
                    .with_tenant("t1")
                    .with_vector(vec![1.0, 0.0]),
            )
            .unwrap();
        index
            .upsert_item(
                Item::new("theirs", "u2", LayerKind::Tenant)
                    .with_tenant("t2")
                    .with_vector(vec![1.0, 0.0]),
            )
            .unwrap();

        let hits = index
            .search_similar(
                &[1.0, 0.0],
                0.1,
                10,
                &tenant_grant("t1"),
                LevelScope::Base,
                &ItemFilters::default(),
            )
            .await
            .unwrap();
        assert_eq!(hits, vec![ScoredId::new("mine", 1.0)]);
    }

    #[tokio::test]
    async fn test_search_text_applies_metadata_filters() {
        let index = InMemoryIndex::new(2);
        index
            .upsert_item(
                global_item("bio", vec![1.0, 0.0], "cell membrane transport")
                    .with_metadata("subject", json!("biology")),
            )
            .unwrap();
        index
            .upsert_item(
                global_item("chem", vec![0.0, 1.0], "membrane chemistry")
                    .with_metadata("subject", json!("chemistry")),
            )
            .unwrap();

        let filters = ItemFilters {
            metadata: Some(SearchFilters {
                and: Some(vec![FilterCondition::new("subject", "biology")]),
                or: None,
            }),
            path_prefix: None,
        };
        let query = LexicalQuery::parse("membrane").unwrap();
        let hits = index
            .search_text(&query, 10, &LayerGrant::Global, &filters)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "bio");
    }

    #[tokio::test]
    async fn test_search_text_statistics_ignore_other_tenants() {
        let tenant_item = |id: &str, tenant: &str, content: &str| {
            Item::new(id, "author", LayerKind::Tenant)
                .with_tenant(tenant)
                .with_content(content)
        };

        let isolated = InMemoryIndex::new(2);
        isolated
            .upsert_item(tenant_item("mine", "t1", "enzyme kinetics"))
            .unwrap();

        let shared = InMemoryIndex::new(2);
        shared
            .upsert_item(tenant_item("mine", "t1", "enzyme kinetics"))
            .unwrap();
        for i in 0..5 {
            shared
                .upsert_item(tenant_item(&format!("other-{i}"), "t2", "enzyme enzyme enzyme"))
                .unwrap();
        }

        let query = LexicalQuery::parse("enzyme").unwrap();
        let filters = ItemFilters::default();
        let alone = isolated
            .search_text(&query, 10, &tenant_grant("t1"), &filters)
            .await
            .unwrap();
        let crowded = shared
            .search_text(&query, 10, &tenant_grant("t1"), &filters)
            .await
            .unwrap();
        assert_eq!(alone, crowded);
    }

    #[tokio::test]
    async fn test_relations_reject_self_loops_and_unknown_endpoints() {
        let index = InMemoryIndex::new(2);
        index
            .upsert_entity(Entity::new("a", "concept", "u1", LayerKind::Global))
            .unwrap();
        assert!(index.add_relation(Relation::new("a", "a", "loop")).is_err());
        assert!(matches!(
            index.add_relation(Relation::new("a", "zz", "rel")),
            Err(RecallError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_neighbors_are_bidirectional_and_visibility_scoped() {
        let index = InMemoryIndex::new(2);
        index
            .upsert_entity(Entity::new("a", "concept", "u1", LayerKind::Global))
            .unwrap();
        index
            .upsert_entity(Entity::new("b", "concept", "u1", LayerKind::Global))
            .unwrap();
        index
            .upsert_entity(
                Entity::new("secret", "concept", "u9", LayerKind::Tenant).with_tenant("other"),
            )
            .unwrap();
        index.add_relation(Relation::new("a", "b", "part_of")).unwrap();
        index
            .add_relation(Relation::new("secret", "b", "part_of"))
            .unwrap();

        let layers = LayerSet::from_grants([LayerGrant::Global]);
        let from_b = index
            .neighbors("b", &layers, &GraphFilters::default())
            .await
            .unwrap();
        let ids: Vec<&str> = from_b.iter().map(|n| n.entity_id.as_str()).collect();
        assert_eq!(ids, vec!["a"]);
    }

    #[tokio::test]
    async fn test_from_corpus_detects_missing_children() {
        let corpus = Corpus {
            items: vec![global_item("s", vec![1.0, 0.0], "s").as_summary(1, vec!["gone".into()])],
            ..Corpus::default()
        };
        assert!(InMemoryIndex::from_corpus(2, corpus).is_err());
    }
}

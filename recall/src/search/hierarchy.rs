//! Summary-level search plus on-demand drill-down through the summary tree.
//!
//! Ranking only ever touches level > 0 nodes; the base vector strategy covers
//! level 0, so both granularities compete in fusion. `expand` and `leaves` are
//! for consumers that want to walk from a summary down to its content.

use std::collections::HashSet;
use std::sync::Arc;

use futures::future::try_join_all;

use crate::error::{RecallError, Result};
use crate::index::HierarchyStore;
use crate::models::{Item, ItemFilters, LayerSet, RankedList, StrategyKind};

pub struct HierarchyNavigator {
    store: Arc<dyn HierarchyStore>,
    overfetch: usize,
}

impl HierarchyNavigator {
    pub fn new(store: Arc<dyn HierarchyStore>, overfetch: usize) -> Self {
        Self {
            store,
            overfetch: overfetch.max(1),
        }
    }

    pub async fn search(
        &self,
        vector: &[f32],
        threshold: f32,
        limit: usize,
        layers: &LayerSet,
        filters: &ItemFilters,
    ) -> Result<Vec<RankedList>> {
        let cap = limit.saturating_mul(self.overfetch);

        let per_layer = layers.iter().map(|grant| async move {
            let mut hits = self
                .store
                .search_summaries(vector, threshold, cap, grant, filters)
                .await?;
            hits.retain(|hit| hit.score > threshold);
            Ok::<_, RecallError>(RankedList::from_scored(
                StrategyKind::Hierarchical,
                Some(grant),
                hits,
                cap,
            ))
        });

        try_join_all(per_layer).await
    }

    /// Direct children of `id` in stored order, restricted to visible nodes.
    pub async fn expand(&self, id: &str, layers: &LayerSet) -> Result<Vec<String>> {
        self.visible_node(id, layers).await?;

        let mut children = Vec::new();
        for child_id in self.store.children(id).await? {
            if let Some(child) = self.store.get_node(&child_id).await? {
                if is_visible(&child, layers) {
                    children.push(child.id);
                }
            }
        }
        Ok(children)
    }

    /// Every visible level-0 descendant of `id`, depth-first in stored order.
    pub async fn leaves(&self, id: &str, layers: &LayerSet) -> Result<Vec<String>> {
        let root = self.visible_node(id, layers).await?;
        if !root.is_summary() {
            return Ok(Vec::new());
        }

        let mut leaves = Vec::new();
        let mut visited: HashSet<String> = HashSet::from([root.id.clone()]);
        let mut stack: Vec<String> = root.children.iter().rev().cloned().collect();

        while let Some(node_id) = stack.pop() {
            if !visited.insert(node_id.clone()) {
                continue;
            }
            let Some(node) = self.store.get_node(&node_id).await? else {
                continue;
            };
            if !is_visible(&node, layers) {
                continue;
            }
            if node.is_summary() {
                stack.extend(node.children.iter().rev().cloned());
            } else {
                leaves.push(node.id);
            }
        }
        Ok(leaves)
    }

    async fn visible_node(&self, id: &str, layers: &LayerSet) -> Result<Item> {
        // Invisible nodes are reported exactly like missing ones.
        match self.store.get_node(id).await? {
            Some(node) if is_visible(&node, layers) => Ok(node),
            _ => Err(RecallError::NotFound(format!("Summary node {id}"))),
        }
    }
}

fn is_visible(item: &Item, layers: &LayerSet) -> bool {
    layers.admits(item.layer, &item.owner_id, item.tenant_id.as_deref())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::InMemoryIndex;
    use crate::models::{LayerGrant, LayerKind};
    use pretty_assertions::assert_eq;

    fn ids(children: &[&str]) -> Vec<String> {
        children.iter().map(|c| c.to_string()).collect()
    }

    /// root(2) -> [chapter-a(1), chapter-b(1)]
    /// chapter-a -> [a1, a2], chapter-b -> [b1, private]
    fn navigator() -> HierarchyNavigator {
        let index = InMemoryIndex::new(2);
        for id in ["a1", "a2", "b1"] {
            index
                .upsert_item(
                    Item::new(id, "author", LayerKind::Global).with_vector(vec![0.0, 1.0]),
                )
                .unwrap();
        }
        index
            .upsert_item(Item::new("private", "u2", LayerKind::Personal).with_vector(vec![0.0, 1.0]))
            .unwrap();
        index
            .upsert_item(
                Item::new("chapter-a", "author", LayerKind::Global)
                    .with_vector(vec![1.0, 0.0])
                    .as_summary(1, ids(&["a1", "a2"])),
            )
            .unwrap();
        index
            .upsert_item(
                Item::new("chapter-b", "author", LayerKind::Global)
                    .with_vector(vec![0.8, 0.2])
                    .as_summary(1, ids(&["b1", "private"])),
            )
            .unwrap();
        index
            .upsert_item(
                Item::new("root", "author", LayerKind::Global)
                    .with_vector(vec![0.7, 0.7])
                    .as_summary(2, ids(&["chapter-a", "chapter-b"])),
            )
            .unwrap();
        HierarchyNavigator::new(Arc::new(index), 2)
    }

    fn global() -> LayerSet {
        LayerSet::from_grants([LayerGrant::Global])
    }

    #[tokio::test]
    async fn test_search_returns_only_summaries() {
        let lists = navigator()
            .search(&[1.0, 0.0], 0.5, 10, &global(), &ItemFilters::default())
            .await
            .unwrap();
        let found: Vec<&str> = lists[0].candidates.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(found, vec!["chapter-a", "chapter-b", "root"]);
        assert_eq!(lists[0].strategy, StrategyKind::Hierarchical);
    }

    #[tokio::test]
    async fn test_expand_returns_visible_children_in_order() {
        let navigator = navigator();
        assert_eq!(
            navigator.expand("root", &global()).await.unwrap(),
            ids(&["chapter-a", "chapter-b"])
        );
        assert_eq!(
            navigator.expand("chapter-b", &global()).await.unwrap(),
            ids(&["b1"])
        );
        assert!(navigator.expand("a1", &global()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_expand_unknown_or_invisible_is_not_found() {
        let navigator = navigator();
        assert!(matches!(
            navigator.expand("missing", &global()).await,
            Err(RecallError::NotFound(_))
        ));
        let tenant_only = LayerSet::from_grants([LayerGrant::Tenant {
            tenant_id: "t1".to_string(),
        }]);
        assert!(matches!(
            navigator.expand("root", &tenant_only).await,
            Err(RecallError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_leaves_walks_to_base_level() {
        let navigator = navigator();
        assert_eq!(
            navigator.leaves("root", &global()).await.unwrap(),
            ids(&["a1", "a2", "b1"])
        );

        let with_owner = LayerSet::from_grants([
            LayerGrant::Personal {
                owner_id: "u2".to_string(),
            },
            LayerGrant::Global,
        ]);
        assert_eq!(
            navigator.leaves("chapter-b", &with_owner).await.unwrap(),
            ids(&["b1", "private"])
        );
    }
}

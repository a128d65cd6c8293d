use std::sync::Arc;

use futures::future::try_join_all;

use crate::error::Result;
use crate::index::SimilarityIndex;
use crate::models::{ItemFilters, LayerSet, LevelScope, RankedList, StrategyKind};

/// Nearest-neighbour search over base items, one ranked list per layer.
pub struct VectorStrategy {
    index: Arc<dyn SimilarityIndex>,
    overfetch: usize,
}

impl VectorStrategy {
    pub fn new(index: Arc<dyn SimilarityIndex>, overfetch: usize) -> Self {
        Self {
            index,
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
                .index
                .search_similar(vector, threshold, cap, grant, LevelScope::Base, filters)
                .await?;
            // Backends may be inclusive at the boundary; the contract is strict.
            hits.retain(|hit| hit.score > threshold);
            Ok::<_, crate::error::RecallError>(RankedList::from_scored(
                StrategyKind::Vector,
                Some(grant),
                hits,
                cap,
            ))
        });

        let lists = try_join_all(per_layer).await?;
        tracing::debug!(
            layers = layers.len(),
            candidates = lists.iter().map(RankedList::len).sum::<usize>(),
            "Vector search complete"
        );
        Ok(lists)
    }
}

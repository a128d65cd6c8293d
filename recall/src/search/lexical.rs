use std::sync::Arc;

use futures::future::try_join_all;

use crate::error::{RecallError, Result};
use crate::index::{LexicalIndex, LexicalQuery};
use crate::models::{ItemFilters, LayerSet, RankedList, StrategyKind};

/// Keyword search over item text, one ranked list per layer.
pub struct LexicalStrategy {
    index: Arc<dyn LexicalIndex>,
    overfetch: usize,
}

impl LexicalStrategy {
    pub fn new(index: Arc<dyn LexicalIndex>, overfetch: usize) -> Self {
        Self {
            index,
            overfetch: overfetch.max(1),
        }
    }

    /// Empty when the text has no searchable terms.
    pub async fn search(
        &self,
        text: &str,
        limit: usize,
        layers: &LayerSet,
        filters: &ItemFilters,
    ) -> Result<Vec<RankedList>> {
        let Some(query) = LexicalQuery::parse(text) else {
            tracing::debug!("Lexical query has no searchable terms");
            return Ok(Vec::new());
        };
        let cap = limit.saturating_mul(self.overfetch);
        let query = &query;

        let per_layer = layers.iter().map(|grant| async move {
            let hits = self.index.search_text(query, cap, grant, filters).await?;
            Ok::<_, RecallError>(RankedList::from_scored(
                StrategyKind::Lexical,
                Some(grant),
                hits,
                cap,
            ))
        });

        try_join_all(per_layer).await
    }
}

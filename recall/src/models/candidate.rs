use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use super::{LayerGrant, LayerKind};

/// The independent ranking signals the coordinator can dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyKind {
    Vector,
    Lexical,
    Hierarchical,
    Graph,
}

impl StrategyKind {
    pub const ALL: [StrategyKind; 4] = [
        StrategyKind::Vector,
        StrategyKind::Lexical,
        StrategyKind::Hierarchical,
        StrategyKind::Graph,
    ];

    /// Strategies that cannot run without a query vector.
    pub fn needs_vector(&self) -> bool {
        !matches!(self, Self::Lexical)
    }
}

impl std::fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Vector => write!(f, "vector"),
            Self::Lexical => write!(f, "lexical"),
            Self::Hierarchical => write!(f, "hierarchical"),
            Self::Graph => write!(f, "graph"),
        }
    }
}

impl std::str::FromStr for StrategyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "vector" | "semantic" => Ok(Self::Vector),
            "lexical" | "keyword" | "fulltext" => Ok(Self::Lexical),
            "hierarchical" | "hierarchy" | "summary" => Ok(Self::Hierarchical),
            "graph" => Ok(Self::Graph),
            _ => Err(format!("Unknown strategy '{s}'")),
        }
    }
}

/// A raw hit returned by a leaf index before strategy-level ordering.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredId {
    pub id: String,
    pub score: f32,
}

impl ScoredId {
    pub fn new(id: impl Into<String>, score: f32) -> Self {
        Self {
            id: id.into(),
            score,
        }
    }
}

/// One entry of a strategy's ranked output.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Candidate {
    pub id: String,
    /// Strategy-specific scale: cosine similarity, lexical rank, decayed graph score.
    pub score: f32,
    /// 1-based position within its ranked list.
    pub rank: usize,
    /// Hop chain from seed to this entity (graph candidates only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<Vec<String>>,
}

/// One ranked list produced by a strategy, optionally for a single layer partition.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedList {
    pub strategy: StrategyKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub layer: Option<LayerKind>,
    pub candidates: Vec<Candidate>,
    /// Set when the producer stopped early and the list may be missing entries.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub truncated: bool,
}

impl RankedList {
    /// Sorts hits by score descending with identifier ascending as the
    /// tie-break, truncates to `cap`, and numbers ranks from 1.
    pub fn from_scored(
        strategy: StrategyKind,
        grant: Option<&LayerGrant>,
        mut hits: Vec<ScoredId>,
        cap: usize,
    ) -> Self {
        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        let mut seen: HashSet<String> = HashSet::new();
        hits.retain(|hit| seen.insert(hit.id.clone()));
        hits.truncate(cap);

        let candidates = hits
            .into_iter()
            .enumerate()
            .map(|(idx, hit)| Candidate {
                id: hit.id,
                score: hit.score,
                rank: idx + 1,
                path: None,
            })
            .collect();

        Self {
            strategy,
            layer: grant.map(LayerGrant::kind),
            candidates,
            truncated: false,
        }
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
}

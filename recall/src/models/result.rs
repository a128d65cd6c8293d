use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::{LayerGrant, LayerKind, StrategyKind};

/// One entry of the final fused ranking. Ephemeral, built per query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FusedResult {
    pub id: String,
    /// Sum of `1 / (k + rank)` over every list the id appears in.
    pub score: f64,
    /// Highest raw strategy score observed for this id (for display).
    pub best_score: f32,
    pub strategies: BTreeSet<StrategyKind>,
    /// Highest-priority layer any contribution came from.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub layer: Option<LayerKind>,
    /// Traversal path of the best graph contribution.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<Vec<String>>,
    /// 1-based final position.
    pub rank: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyStatus {
    Completed,
    TimedOut,
    Failed,
    /// Requested but could not run (e.g. no query vector available).
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StrategyReport {
    pub strategy: StrategyKind,
    pub status: StrategyStatus,
    /// Candidates contributed across all of the strategy's lists.
    pub candidates: usize,
    pub elapsed_ms: u64,
    /// Completed, but stopped at a work bound before covering everything.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub truncated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StrategyReport {
    pub fn contributed(&self) -> bool {
        self.status == StrategyStatus::Completed
    }

    /// Contributed everything it was asked for.
    pub fn is_complete(&self) -> bool {
        self.contributed() && !self.truncated
    }
}

/// Why a response may be empty or incomplete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Diagnostic {
    /// The visibility context resolved to no readable layer.
    NoEligibleLayers,
    /// Every strategy was disabled or skipped.
    NoStrategiesRan,
    /// Every dispatched strategy timed out or failed.
    AllStrategiesFailed,
    /// Some strategies did not contribute, or stopped short.
    PartialResults,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievalResponse {
    pub results: Vec<FusedResult>,
    pub total: u32,
    pub timing: u64,
    pub layers: Vec<LayerGrant>,
    pub strategies: Vec<StrategyReport>,
    pub degraded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostic: Option<Diagnostic>,
}

impl RetrievalResponse {
    pub fn empty(diagnostic: Diagnostic, timing: u64) -> Self {
        Self {
            results: Vec::new(),
            total: 0,
            timing,
            layers: Vec::new(),
            strategies: Vec::new(),
            degraded: diagnostic != Diagnostic::NoEligibleLayers,
            diagnostic: Some(diagnostic),
        }
    }

    pub fn report(&self, strategy: StrategyKind) -> Option<&StrategyReport> {
        self.strategies.iter().find(|r| r.strategy == strategy)
    }

    pub fn ids(&self) -> Vec<&str> {
        self.results.iter().map(|r| r.id.as_str()).collect()
    }
}

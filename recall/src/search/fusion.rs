//! Reciprocal Rank Fusion: score = Σ 1/(k + rank_i)
//!
//! Combines ranked lists from strategies with incomparable score scales
//! without normalisation. Rank is the 1-based position of a candidate within
//! its list, numbered independently per strategy and per layer partition.
//! A candidate repeated inside one list only counts at its first position.
//!
//! The function is pure: contributions for each id are summed in a canonical
//! order, so the output does not depend on the order lists are supplied in.

use std::collections::{BTreeSet, HashMap, HashSet};

use crate::models::{FusedResult, LayerKind, RankedList, StrategyKind};

pub const DEFAULT_RRF_K: u32 = 60;

#[derive(Default)]
struct Accumulator {
    contributions: Vec<f64>,
    best_score: f32,
    strategies: BTreeSet<StrategyKind>,
    layer: Option<LayerKind>,
    /// (score, path) of the strongest graph contribution
    path: Option<(f32, Vec<String>)>,
}

impl Accumulator {
    fn offer_layer(&mut self, layer: Option<LayerKind>) {
        let Some(layer) = layer else {
            return;
        };
        match self.layer {
            Some(current) if current.priority() <= layer.priority() => {}
            _ => self.layer = Some(layer),
        }
    }

    fn offer_path(&mut self, score: f32, path: &[String]) {
        let better = match &self.path {
            None => true,
            Some((best, best_path)) => {
                score > *best
                    || (score == *best
                        && (path.len(), path) < (best_path.len(), best_path.as_slice()))
            }
        };
        if better {
            self.path = Some((score, path.to_vec()));
        }
    }
}

fn layer_rank(layer: Option<LayerKind>) -> u8 {
    layer.map_or(u8::MAX, |l| l.priority())
}

/// Fuse ranked lists into at most `limit` results ordered by fused score
/// descending, then layer priority, then identifier ascending.
pub fn fuse(lists: &[RankedList], k: u32, limit: usize) -> Vec<FusedResult> {
    let mut merged: HashMap<&str, Accumulator> = HashMap::new();

    for list in lists {
        let mut seen: HashSet<&str> = HashSet::new();
        for (idx, candidate) in list.candidates.iter().enumerate() {
            if !seen.insert(candidate.id.as_str()) {
                continue;
            }
            let rank = (idx + 1) as f64;
            let acc = merged.entry(candidate.id.as_str()).or_default();

            acc.contributions.push(1.0 / (k as f64 + rank));
            if acc.strategies.is_empty() || candidate.score > acc.best_score {
                acc.best_score = candidate.score;
            }
            acc.strategies.insert(list.strategy);
            acc.offer_layer(list.layer);
            if let Some(ref path) = candidate.path {
                acc.offer_path(candidate.score, path);
            }
        }
    }

    let mut fused: Vec<FusedResult> = merged
        .into_iter()
        .map(|(id, mut acc)| {
            acc.contributions
                .sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
            FusedResult {
                id: id.to_string(),
                score: acc.contributions.iter().sum(),
                best_score: acc.best_score,
                strategies: acc.strategies,
                layer: acc.layer,
                path: acc.path.map(|(_, path)| path),
                rank: 0,
            }
        })
        .collect();

    fused.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| layer_rank(a.layer).cmp(&layer_rank(b.layer)))
            .then_with(|| a.id.cmp(&b.id))
    });
    fused.truncate(limit);

    for (idx, result) in fused.iter_mut().enumerate() {
        result.rank = idx + 1;
    }

    fused
}

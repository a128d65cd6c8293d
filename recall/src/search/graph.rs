//! Decayed multi-hop expansion over the relation graph.
//!
//! Seeds are the entities most similar to the query vector. Each hop
//! multiplies the predecessor's score by the decay factor, so distant
//! neighbours only surface when reached from strong seeds. Relation graphs
//! may contain cycles: every path carries its own guard and never revisits an
//! entity already on it. When an entity is reached more than once, the
//! strongest occurrence wins, then the shorter path, then the
//! lexicographically smaller path. Arrivals strictly weaker than one already
//! recorded are not expanded further.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::error::{RecallError, Result};
use crate::index::RelationGraph;
use crate::models::{Candidate, GraphFilters, LayerSet, Neighbor, RankedList, StrategyKind};

/// Clamp a caller-supplied decay factor to `[0, 1]`. NaN collapses to 0.
pub fn clamp_decay(decay_factor: f32) -> f32 {
    if decay_factor.is_nan() {
        0.0
    } else {
        decay_factor.clamp(0.0, 1.0)
    }
}

/// Parameters for one traversal.
#[derive(Debug, Clone, Copy)]
pub struct GraphSearch<'a> {
    pub vector: &'a [f32],
    pub threshold: f32,
    pub limit: usize,
    pub max_hops: u32,
    pub decay_factor: f32,
    pub layers: &'a LayerSet,
    pub filters: &'a GraphFilters,
}

#[derive(Debug, Clone)]
struct Reached {
    score: f32,
    path: Vec<String>,
}

impl Reached {
    fn id(&self) -> &str {
        self.path.last().map(String::as_str).unwrap_or_default()
    }

    fn beats(&self, other: &Reached) -> bool {
        if self.score != other.score {
            return self.score > other.score;
        }
        (self.path.len(), &self.path) < (other.path.len(), &other.path)
    }
}

pub struct GraphStrategy {
    graph: Arc<dyn RelationGraph>,
    overfetch: usize,
    max_paths: usize,
}

impl GraphStrategy {
    pub fn new(graph: Arc<dyn RelationGraph>, overfetch: usize, max_paths: usize) -> Self {
        Self {
            graph,
            overfetch: overfetch.max(1),
            max_paths,
        }
    }

    pub async fn search(
        &self,
        params: GraphSearch<'_>,
        cancel: &CancellationToken,
    ) -> Result<RankedList> {
        let decay = clamp_decay(params.decay_factor);
        let cap = params.limit.saturating_mul(self.overfetch);

        let mut seeds = self
            .graph
            .seed_entities(
                params.vector,
                params.threshold,
                params.limit,
                params.layers,
                params.filters,
            )
            .await?;
        seeds.retain(|seed| seed.score > params.threshold);
        seeds.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        seeds.truncate(params.limit);

        let mut best: HashMap<String, Reached> = HashMap::new();
        let mut frontier: Vec<Reached> = Vec::with_capacity(seeds.len());
        for seed in seeds {
            let reached = Reached {
                score: seed.score,
                path: vec![seed.id],
            };
            record(&mut best, &reached);
            frontier.push(reached);
        }

        let mut neighbor_cache: HashMap<String, Vec<Neighbor>> = HashMap::new();
        let mut expansions = 0usize;
        let mut truncated = false;

        'hops: for hop in 0..params.max_hops {
            if frontier.is_empty() || decay == 0.0 {
                break;
            }
            if cancel.is_cancelled() {
                return Err(RecallError::Cancelled);
            }

            // Strongest paths first, so a bounded budget goes where it matters.
            frontier.sort_by(|a, b| {
                if a.beats(b) {
                    Ordering::Less
                } else if b.beats(a) {
                    Ordering::Greater
                } else {
                    Ordering::Equal
                }
            });

            let mut next = Vec::new();
            for node in &frontier {
                let from = node.id().to_string();
                if !neighbor_cache.contains_key(&from) {
                    let found = self
                        .graph
                        .neighbors(&from, params.layers, params.filters)
                        .await?;
                    neighbor_cache.insert(from.clone(), found);
                }
                let neighbors = neighbor_cache.get(&from).map(Vec::as_slice).unwrap_or(&[]);

                for neighbor in neighbors {
                    if node.path.iter().any(|id| id == &neighbor.entity_id) {
                        continue;
                    }
                    let score = node.score * decay;
                    if score <= 0.0 {
                        continue;
                    }
                    // Hops are processed in order, so an earlier strictly
                    // stronger arrival is also no longer and dominates every
                    // extension of this one.
                    if best
                        .get(&neighbor.entity_id)
                        .is_some_and(|current| current.score > score)
                    {
                        continue;
                    }
                    if expansions >= self.max_paths {
                        tracing::warn!(
                            max_paths = self.max_paths,
                            hop = hop + 1,
                            "Graph expansion bound reached, returning partial traversal"
                        );
                        truncated = true;
                        break 'hops;
                    }
                    expansions += 1;

                    let mut path = node.path.clone();
                    path.push(neighbor.entity_id.clone());
                    let reached = Reached { score, path };
                    record(&mut best, &reached);
                    next.push(reached);
                }
            }
            frontier = next;
        }

        let mut ranked: Vec<Reached> = best.into_values().collect();
        ranked.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.id().cmp(b.id()))
        });
        ranked.truncate(cap);

        tracing::debug!(
            candidates = ranked.len(),
            expansions,
            truncated,
            "Graph traversal complete"
        );

        Ok(RankedList {
            strategy: StrategyKind::Graph,
            layer: None,
            candidates: ranked
                .into_iter()
                .enumerate()
                .map(|(idx, reached)| Candidate {
                    id: reached.id().to_string(),
                    score: reached.score,
                    rank: idx + 1,
                    path: Some(reached.path),
                })
                .collect(),
            truncated,
        })
    }
}

fn record(best: &mut HashMap<String, Reached>, reached: &Reached) {
    match best.get(reached.id()) {
        Some(current) if !reached.beats(current) => {}
        _ => {
            best.insert(reached.id().to_string(), reached.clone());
        }
    }
}

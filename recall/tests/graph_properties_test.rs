mod common;

use std::collections::HashSet;

use tokio_util::sync::CancellationToken;

use common::*;
use recall::models::{GraphFilters, LayerGrant, LayerSet, RankedList};
use recall::search::{GraphSearch, GraphStrategy};

/// Complete graph over `n` entities; only `e0` is similar to the query.
fn complete_graph(n: usize) -> std::sync::Arc<recall::index::InMemoryIndex> {
    let ids: Vec<String> = (0..n).map(|i| format!("e{i}")).collect();
    let entities = ids
        .iter()
        .enumerate()
        .map(|(i, id)| concept(id, Some(if i == 0 { [1.0, 0.0] } else { [0.0, 1.0] })))
        .collect();
    let mut relations = Vec::new();
    for i in 0..n {
        for j in (i + 1)..n {
            relations.push((ids[i].as_str(), ids[j].as_str()));
        }
    }
    graph(entities, &relations)
}

async fn traverse(strategy: &GraphStrategy, max_hops: u32, decay: f32) -> RankedList {
    let layers = LayerSet::from_grants([LayerGrant::Global]);
    let filters = GraphFilters::default();
    strategy
        .search(
            GraphSearch {
                vector: &[1.0, 0.0],
                threshold: 0.5,
                limit: 50,
                max_hops,
                decay_factor: decay,
                layers: &layers,
                filters: &filters,
            },
            &CancellationToken::new(),
        )
        .await
        .unwrap()
}

#[tokio::test]
async fn test_dense_cycles_never_repeat_entities() {
    let strategy = GraphStrategy::new(complete_graph(6), 2, 10_000);
    let list = traverse(&strategy, 4, 0.8).await;

    let ids: HashSet<&str> = list.candidates.iter().map(|c| c.id.as_str()).collect();
    assert_eq!(ids.len(), list.len());
    assert_eq!(list.len(), 6);

    for candidate in &list.candidates {
        let path = candidate.path.as_ref().unwrap();
        let unique: HashSet<&String> = path.iter().collect();
        assert_eq!(unique.len(), path.len(), "path revisits an entity: {path:?}");
        assert_eq!(path.first().map(String::as_str), Some("e0"));
        assert_eq!(path.last(), Some(&candidate.id));
    }
}

#[tokio::test]
async fn test_score_equals_seed_times_decay_per_hop() {
    let strategy = GraphStrategy::new(complete_graph(5), 2, 10_000);
    let decay = 0.6f32;
    let list = traverse(&strategy, 3, decay).await;

    for candidate in &list.candidates {
        let hops = candidate.path.as_ref().unwrap().len() - 1;
        let expected = decay.powi(hops as i32);
        assert!(
            (candidate.score - expected).abs() < 1e-6,
            "{} scored {} over {} hops",
            candidate.id,
            candidate.score,
            hops
        );
        // Every non-seed in a complete graph is one hop from the seed.
        assert!(hops <= 1);
    }
}

#[tokio::test]
async fn test_scores_are_non_increasing_and_ranks_contiguous() {
    let index = graph(
        vec![
            concept("a", Some([1.0, 0.0])),
            concept("b", None),
            concept("c", None),
            concept("d", None),
            concept("e", None),
        ],
        &[("a", "b"), ("b", "c"), ("c", "d"), ("d", "e"), ("e", "a")],
    );
    let strategy = GraphStrategy::new(index, 2, 10_000);
    let list = traverse(&strategy, 4, 0.5).await;

    let scores: Vec<f32> = list.candidates.iter().map(|c| c.score).collect();
    assert!(scores.windows(2).all(|w| w[0] >= w[1]), "{scores:?}");
    let ranks: Vec<usize> = list.candidates.iter().map(|c| c.rank).collect();
    assert_eq!(ranks, (1..=list.len()).collect::<Vec<_>>());

    // Around a five-cycle, c and d are each two hops from a.
    let c = list.candidates.iter().find(|c| c.id == "c").unwrap();
    assert_eq!(c.score, 0.25);
    assert_eq!(c.path.as_ref().unwrap().len(), 3);
}

#[tokio::test]
async fn test_more_hops_never_drops_results() {
    let strategy = GraphStrategy::new(complete_graph(4), 2, 10_000);
    let mut previous: HashSet<String> = HashSet::new();
    for hops in 0..=4 {
        let list = traverse(&strategy, hops, 0.5).await;
        let current: HashSet<String> = list.candidates.into_iter().map(|c| c.id).collect();
        assert!(previous.is_subset(&current), "hops {hops} lost results");
        previous = current;
    }
}

#[tokio::test]
async fn test_zero_hops_equals_seed_set() {
    let index = graph(
        vec![
            concept("s1", Some([1.0, 0.0])),
            concept("s2", Some([0.9, 0.1])),
            concept("n", None),
        ],
        &[("s1", "n"), ("s2", "n")],
    );
    let strategy = GraphStrategy::new(index, 2, 10_000);
    let list = traverse(&strategy, 0, 0.5).await;
    let ids: Vec<&str> = list.candidates.iter().map(|c| c.id.as_str()).collect();
    assert_eq!(ids, vec!["s1", "s2"]);
}

#[tokio::test]
async fn test_output_is_capped_at_limit_times_overfetch() {
    let strategy = GraphStrategy::new(complete_graph(10), 1, 10_000);
    let layers = LayerSet::from_grants([LayerGrant::Global]);
    let filters = GraphFilters::default();
    let list = strategy
        .search(
            GraphSearch {
                vector: &[1.0, 0.0],
                threshold: 0.5,
                limit: 3,
                max_hops: 2,
                decay_factor: 0.5,
                layers: &layers,
                filters: &filters,
            },
            &CancellationToken::new(),
        )
        .await
        .unwrap();
    assert_eq!(list.len(), 3);
    assert_eq!(list.candidates[0].id, "e0");
}

#[tokio::test]
async fn test_dense_neighbourhood_does_not_starve_other_seeds() {
    // s1 sits inside a 50-entity clique; s2 starts a short chain s2 - a - b.
    let mut entities = vec![concept("s1", Some([1.0, 0.0])), concept("s2", Some([1.0, 0.0]))];
    let clique: Vec<String> = (0..49).map(|i| format!("k{i:02}")).collect();
    entities.extend(clique.iter().map(|id| concept(id, None)));
    entities.extend([concept("a", None), concept("b", None)]);

    let mut members: Vec<&str> = vec!["s1"];
    members.extend(clique.iter().map(String::as_str));
    let mut relations = Vec::new();
    for i in 0..members.len() {
        for j in (i + 1)..members.len() {
            relations.push((members[i], members[j]));
        }
    }
    relations.extend([("s2", "a"), ("a", "b")]);

    let max_paths = recall::config::GraphConfig::default().max_paths;
    let strategy = GraphStrategy::new(graph(entities, &relations), 2, max_paths);
    let layers = LayerSet::from_grants([LayerGrant::Global]);
    let filters = GraphFilters::default();
    let list = strategy
        .search(
            GraphSearch {
                vector: &[1.0, 0.0],
                threshold: 0.5,
                limit: 100,
                max_hops: 2,
                decay_factor: 0.5,
                layers: &layers,
                filters: &filters,
            },
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert!(!list.truncated);
    assert_eq!(list.len(), 53);
    let b = list.candidates.iter().find(|c| c.id == "b").unwrap();
    assert_eq!(b.score, 0.25);
    assert_eq!(
        b.path,
        Some(vec!["s2".to_string(), "a".to_string(), "b".to_string()])
    );
}

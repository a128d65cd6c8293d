use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::{join_all, BoxFuture, FutureExt};
use tokio_util::sync::CancellationToken;

use crate::config::{Config, GraphConfig, RetrievalConfig};
use crate::embeddings::Embedder;
use crate::error::{RecallError, Result};
use crate::index::{HierarchyStore, LexicalIndex, RelationGraph, RetrievalBackend, SimilarityIndex};
use crate::layers::LayerResolver;
use crate::models::{
    Diagnostic, LayerSet, RankedList, RetrievalQuery, RetrievalResponse, StrategyKind,
    StrategyReport, StrategyStatus, VisibilityContext,
};
use crate::search::{
    clamp_decay, fuse, GraphSearch, GraphStrategy, HierarchyNavigator, LexicalStrategy,
    VectorStrategy,
};

/// The leaf stores a coordinator reads from.
#[derive(Clone)]
pub struct Indexes {
    pub similarity: Arc<dyn SimilarityIndex>,
    pub lexical: Arc<dyn LexicalIndex>,
    pub hierarchy: Arc<dyn HierarchyStore>,
    pub graph: Arc<dyn RelationGraph>,
}

impl Indexes {
    /// All four stores served by a single backend.
    pub fn from_backend<B: RetrievalBackend + 'static>(backend: Arc<B>) -> Self {
        Self {
            similarity: backend.clone(),
            lexical: backend.clone(),
            hierarchy: backend.clone(),
            graph: backend,
        }
    }
}

/// A query after validation and defaulting.
#[derive(Debug)]
struct Plan {
    text: Option<String>,
    vector: Option<Vec<f32>>,
    threshold: f32,
    limit: usize,
    strategies: Vec<StrategyKind>,
    max_hops: u32,
    decay_factor: f32,
}

/// Why a vector-based strategy could not be dispatched.
struct VectorUnavailable {
    status: StrategyStatus,
    reason: String,
}

type StrategyOutcome = (StrategyReport, Vec<RankedList>);

/// Runs every enabled strategy concurrently under per-strategy and per-query
/// deadlines, then fuses whatever completed.
///
/// A strategy that fails or times out only removes its own contribution; the
/// query as a whole fails only on invalid input or caller cancellation.
#[derive(Clone)]
pub struct RetrievalCoordinator {
    resolver: LayerResolver,
    vector: Arc<VectorStrategy>,
    lexical: Arc<LexicalStrategy>,
    hierarchy: Arc<HierarchyNavigator>,
    graph: Arc<GraphStrategy>,
    embedder: Option<Arc<dyn Embedder>>,
    retrieval: RetrievalConfig,
    graph_config: GraphConfig,
}

impl RetrievalCoordinator {
    pub fn new(indexes: Indexes, embedder: Option<Arc<dyn Embedder>>, config: &Config) -> Self {
        let overfetch = config.retrieval.overfetch.max(1) as usize;

        Self {
            resolver: LayerResolver::new(),
            vector: Arc::new(VectorStrategy::new(indexes.similarity, overfetch)),
            lexical: Arc::new(LexicalStrategy::new(indexes.lexical, overfetch)),
            hierarchy: Arc::new(HierarchyNavigator::new(indexes.hierarchy, overfetch)),
            graph: Arc::new(GraphStrategy::new(
                indexes.graph,
                overfetch,
                config.graph.max_paths,
            )),
            embedder,
            retrieval: config.retrieval.clone(),
            graph_config: config.graph.clone(),
        }
    }

    pub async fn retrieve(&self, query: RetrievalQuery) -> Result<RetrievalResponse> {
        self.retrieve_with_cancel(query, CancellationToken::new())
            .await
    }

    /// Like [`retrieve`](Self::retrieve), but abandons all in-flight work and
    /// returns [`RecallError::Cancelled`] once `cancel` fires.
    pub async fn retrieve_with_cancel(
        &self,
        query: RetrievalQuery,
        cancel: CancellationToken,
    ) -> Result<RetrievalResponse> {
        let start = Instant::now();
        let deadline =
            tokio::time::Instant::now() + Duration::from_millis(self.retrieval.query_timeout_ms);

        let plan = self.validate(&query)?;
        let layers = self.resolver.resolve(&query.context);

        if layers.is_empty() {
            tracing::debug!("No eligible layers, returning empty result");
            return Ok(RetrievalResponse::empty(
                Diagnostic::NoEligibleLayers,
                elapsed_ms(start),
            ));
        }

        if plan.strategies.is_empty() {
            tracing::debug!("No strategies enabled for query");
            let mut response =
                RetrievalResponse::empty(Diagnostic::NoStrategiesRan, elapsed_ms(start));
            response.layers = layers.grants().to_vec();
            return Ok(response);
        }

        let token = cancel.child_token();
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::debug!("Retrieval cancelled by caller");
                Err(RecallError::Cancelled)
            }
            response = self.run(&query, plan, &layers, deadline, &token, start) => response,
        }
    }

    /// Direct children of a summary node visible to `context`.
    pub async fn expand(&self, context: &VisibilityContext, id: &str) -> Result<Vec<String>> {
        let layers = self.resolver.resolve(context);
        self.hierarchy.expand(id, &layers).await
    }

    /// All visible base-level descendants of a summary node.
    pub async fn leaves(&self, context: &VisibilityContext, id: &str) -> Result<Vec<String>> {
        let layers = self.resolver.resolve(context);
        self.hierarchy.leaves(id, &layers).await
    }

    fn validate(&self, query: &RetrievalQuery) -> Result<Plan> {
        let text = query.trimmed_text().map(str::to_string);

        if let Some(ref vector) = query.vector {
            if vector.len() != self.retrieval.dimensions {
                return Err(RecallError::Validation(format!(
                    "Query vector has {} dimensions, expected {}",
                    vector.len(),
                    self.retrieval.dimensions
                )));
            }
            if vector.iter().any(|v| !v.is_finite()) {
                return Err(RecallError::Validation(
                    "Query vector contains non-finite values".to_string(),
                ));
            }
        }

        if text.is_none() && query.vector.is_none() {
            return Err(RecallError::Validation(
                "Query requires text or a vector".to_string(),
            ));
        }

        let threshold = query
            .threshold
            .unwrap_or(self.retrieval.default_threshold);
        if !(0.0..=1.0).contains(&threshold) {
            return Err(RecallError::Validation(format!(
                "Threshold must be within [0, 1], got {threshold}"
            )));
        }

        let limit = query.limit.unwrap_or(self.retrieval.default_limit);
        if limit == 0 {
            return Err(RecallError::Validation(
                "Limit must be at least 1".to_string(),
            ));
        }
        let limit = limit.min(self.retrieval.max_limit.max(1)) as usize;

        let max_hops = query.graph.max_hops.unwrap_or(self.graph_config.max_hops);
        if max_hops > self.graph_config.max_hops_limit {
            return Err(RecallError::Validation(format!(
                "max_hops {} exceeds the limit of {}",
                max_hops, self.graph_config.max_hops_limit
            )));
        }

        let decay_factor = clamp_decay(
            query
                .graph
                .decay_factor
                .unwrap_or(self.graph_config.decay_factor),
        );

        // A query may narrow the configured strategy set, never widen it.
        let requested = query
            .strategies
            .as_deref()
            .unwrap_or(self.retrieval.enabled_strategies.as_slice());
        let mut strategies: Vec<StrategyKind> = Vec::new();
        for kind in requested {
            if !self.retrieval.enabled_strategies.contains(kind) {
                tracing::debug!(strategy = %kind, "Strategy disabled by configuration");
                continue;
            }
            if !strategies.contains(kind) {
                strategies.push(*kind);
            }
        }
        strategies.sort();

        Ok(Plan {
            text,
            vector: query.vector.clone(),
            threshold,
            limit,
            strategies,
            max_hops,
            decay_factor,
        })
    }

    async fn query_vector(
        &self,
        plan: &Plan,
        deadline: tokio::time::Instant,
    ) -> std::result::Result<Option<Vec<f32>>, VectorUnavailable> {
        if let Some(ref vector) = plan.vector {
            return Ok(Some(vector.clone()));
        }
        if !plan.strategies.iter().any(StrategyKind::needs_vector) {
            return Ok(None);
        }
        let (Some(embedder), Some(text)) = (&self.embedder, plan.text.as_deref()) else {
            return Ok(None);
        };

        match tokio::time::timeout_at(deadline, embedder.embed_query(text)).await {
            Ok(Ok(vector)) if vector.len() == self.retrieval.dimensions => Ok(Some(vector)),
            Ok(Ok(vector)) => {
                let reason = format!(
                    "Embedding has {} dimensions, expected {}",
                    vector.len(),
                    self.retrieval.dimensions
                );
                tracing::warn!("{}", reason);
                Err(VectorUnavailable {
                    status: StrategyStatus::Failed,
                    reason,
                })
            }
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "Query embedding failed");
                Err(VectorUnavailable {
                    status: StrategyStatus::Failed,
                    reason: e.to_string(),
                })
            }
            Err(_) => {
                tracing::warn!("Query embedding timed out");
                Err(VectorUnavailable {
                    status: StrategyStatus::TimedOut,
                    reason: "Query embedding timed out".to_string(),
                })
            }
        }
    }

    async fn run(
        &self,
        query: &RetrievalQuery,
        plan: Plan,
        layers: &LayerSet,
        deadline: tokio::time::Instant,
        cancel: &CancellationToken,
        start: Instant,
    ) -> Result<RetrievalResponse> {
        let (vector_kinds, text_kinds): (Vec<StrategyKind>, Vec<StrategyKind>) = plan
            .strategies
            .iter()
            .copied()
            .partition(StrategyKind::needs_vector);

        // Lexical search does not wait on query embedding.
        let (text_outcomes, vector_outcomes) = futures::join!(
            self.run_text(&text_kinds, query, &plan, layers, deadline),
            self.run_vector(&vector_kinds, query, &plan, layers, deadline, cancel),
        );

        let mut reports: Vec<StrategyReport> = Vec::new();
        let mut lists: Vec<RankedList> = Vec::new();
        for (report, strategy_lists) in text_outcomes.into_iter().chain(vector_outcomes) {
            reports.push(report);
            lists.extend(strategy_lists);
        }
        reports.sort_by_key(|report| report.strategy);

        let results = fuse(&lists, self.retrieval.rrf_k, plan.limit);
        let diagnostic = diagnose(&reports);

        let response = RetrievalResponse {
            total: results.len() as u32,
            results,
            timing: elapsed_ms(start),
            layers: layers.grants().to_vec(),
            strategies: reports,
            degraded: diagnostic.is_some_and(|d| d != Diagnostic::NoEligibleLayers),
            diagnostic,
        };

        tracing::debug!(
            results = response.total,
            elapsed_ms = response.timing,
            degraded = response.degraded,
            "Retrieval complete"
        );
        Ok(response)
    }

    /// A strategy's own budget starts when it is dispatched and never
    /// outlives the query.
    fn strategy_deadline(&self, deadline: tokio::time::Instant) -> tokio::time::Instant {
        deadline.min(
            tokio::time::Instant::now() + Duration::from_millis(self.retrieval.strategy_timeout_ms),
        )
    }

    async fn run_text(
        &self,
        kinds: &[StrategyKind],
        query: &RetrievalQuery,
        plan: &Plan,
        layers: &LayerSet,
        deadline: tokio::time::Instant,
    ) -> Vec<StrategyOutcome> {
        let mut outcomes = Vec::with_capacity(kinds.len());
        for &kind in kinds {
            let Some(text) = plan.text.as_deref() else {
                outcomes.push(not_run(kind, StrategyStatus::Skipped, "No query text"));
                continue;
            };
            let search = self
                .lexical
                .search(text, plan.limit, layers, &query.filters)
                .boxed();
            outcomes.push(guarded(kind, self.strategy_deadline(deadline), search).await);
        }
        outcomes
    }

    /// Embeds the query text if needed, then runs every vector-based
    /// strategy concurrently.
    async fn run_vector(
        &self,
        kinds: &[StrategyKind],
        query: &RetrievalQuery,
        plan: &Plan,
        layers: &LayerSet,
        deadline: tokio::time::Instant,
        cancel: &CancellationToken,
    ) -> Vec<StrategyOutcome> {
        if kinds.is_empty() {
            return Vec::new();
        }

        let vector = match self.query_vector(plan, deadline).await {
            Ok(Some(vector)) => vector,
            Ok(None) => {
                return kinds
                    .iter()
                    .map(|&kind| not_run(kind, StrategyStatus::Skipped, "No query vector"))
                    .collect();
            }
            Err(unavailable) => {
                return kinds
                    .iter()
                    .map(|&kind| not_run(kind, unavailable.status, &unavailable.reason))
                    .collect();
            }
        };

        let strategy_deadline = self.strategy_deadline(deadline);
        let searches = kinds.iter().map(|&kind| {
            guarded(
                kind,
                strategy_deadline,
                self.dispatch(kind, query, plan, &vector, layers, cancel),
            )
        });
        join_all(searches).await
    }

    fn dispatch<'a>(
        &'a self,
        kind: StrategyKind,
        query: &'a RetrievalQuery,
        plan: &'a Plan,
        vector: &'a [f32],
        layers: &'a LayerSet,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<Vec<RankedList>>> {
        match kind {
            StrategyKind::Vector => self
                .vector
                .search(vector, plan.threshold, plan.limit, layers, &query.filters)
                .boxed(),
            StrategyKind::Hierarchical => self
                .hierarchy
                .search(vector, plan.threshold, plan.limit, layers, &query.filters)
                .boxed(),
            StrategyKind::Graph => {
                let params = GraphSearch {
                    vector,
                    threshold: plan.threshold,
                    limit: plan.limit,
                    max_hops: plan.max_hops,
                    decay_factor: plan.decay_factor,
                    layers,
                    filters: &query.graph.filters,
                };
                async move { self.graph.search(params, cancel).await.map(|list| vec![list]) }
                    .boxed()
            }
            StrategyKind::Lexical => async {
                Err(RecallError::Internal(
                    "Lexical search does not take a vector".to_string(),
                ))
            }
            .boxed(),
        }
    }
}

/// Bounds one strategy by `deadline` and turns its outcome into a report.
async fn guarded(
    kind: StrategyKind,
    deadline: tokio::time::Instant,
    search: BoxFuture<'_, Result<Vec<RankedList>>>,
) -> StrategyOutcome {
    let started = Instant::now();

    match tokio::time::timeout_at(deadline, search).await {
        Ok(Ok(lists)) => {
            let candidates = lists.iter().map(RankedList::len).sum();
            let truncated = lists.iter().any(|list| list.truncated);
            let elapsed = elapsed_ms(started);
            tracing::debug!(
                strategy = %kind,
                candidates,
                truncated,
                elapsed_ms = elapsed,
                "Strategy completed"
            );
            (
                StrategyReport {
                    strategy: kind,
                    status: StrategyStatus::Completed,
                    candidates,
                    elapsed_ms: elapsed,
                    truncated,
                    error: None,
                },
                lists,
            )
        }
        Ok(Err(e)) => {
            tracing::warn!(strategy = %kind, error = %e, "Strategy failed, continuing without it");
            (
                StrategyReport {
                    strategy: kind,
                    status: StrategyStatus::Failed,
                    candidates: 0,
                    elapsed_ms: elapsed_ms(started),
                    truncated: false,
                    error: Some(e.to_string()),
                },
                Vec::new(),
            )
        }
        Err(_) => {
            tracing::warn!(strategy = %kind, "Strategy timed out, continuing without it");
            (
                StrategyReport {
                    strategy: kind,
                    status: StrategyStatus::TimedOut,
                    candidates: 0,
                    elapsed_ms: elapsed_ms(started),
                    truncated: false,
                    error: None,
                },
                Vec::new(),
            )
        }
    }
}

fn not_run(kind: StrategyKind, status: StrategyStatus, reason: &str) -> StrategyOutcome {
    let report = StrategyReport {
        strategy: kind,
        status,
        candidates: 0,
        elapsed_ms: 0,
        truncated: false,
        error: Some(reason.to_string()),
    };
    (report, Vec::new())
}

fn diagnose(reports: &[StrategyReport]) -> Option<Diagnostic> {
    let attempted: Vec<&StrategyReport> = reports
        .iter()
        .filter(|r| r.status != StrategyStatus::Skipped)
        .collect();

    if attempted.is_empty() {
        return Some(Diagnostic::NoStrategiesRan);
    }
    if attempted.iter().all(|r| !r.contributed()) {
        return Some(Diagnostic::AllStrategiesFailed);
    }
    if attempted.iter().any(|r| !r.is_complete()) {
        return Some(Diagnostic::PartialResults);
    }
    None
}

fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}

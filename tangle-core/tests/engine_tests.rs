// Tests for the bounded two-level crawl engine

use async_trait::async_trait;
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tangle_core::{
    CancelFlag, CrawlEngine, CrawlError, CrawlLevel, CrawlOutcome, CrawlSpec, GraphDocument,
    ProgressEvent, ProgressSender, start,
};
use tangle_net::error::Result as FetchResult;
use tangle_net::{
    AttributeBag, AttributeSpec, AttributeType, Direction, FetchError, RelatedItem, RelatedPage,
    RelationSource, SourceSchema,
};

const PAGE_SIZE: usize = 10;

/// In-memory relation source scripted from adjacency lists.
#[derive(Default)]
struct ScriptedSource {
    outgoing: HashMap<String, Vec<String>>,
    incoming: HashMap<String, Vec<String>>,
    attributes: HashMap<String, AttributeBag>,
    item_attributes: HashMap<String, AttributeBag>,
    fail_related_for: HashSet<String>,
    fail_attributes_for: HashSet<String>,
    schema: SourceSchema,
    related_calls: AtomicUsize,
    attribute_calls: AtomicUsize,
    /// Trips the engine's cancellation flag after this many related()
    /// calls, for deterministic mid-crawl cancellation.
    cancel_after: Option<(usize, CancelFlag)>,
}

impl ScriptedSource {
    fn new() -> Self {
        Self::default()
    }

    fn outgoing(mut self, key: &str, related: &[&str]) -> Self {
        self.outgoing
            .insert(key.to_string(), related.iter().map(|s| s.to_string()).collect());
        self
    }

    fn incoming(mut self, key: &str, related: &[&str]) -> Self {
        self.incoming
            .insert(key.to_string(), related.iter().map(|s| s.to_string()).collect());
        self
    }

    fn attribute(mut self, key: &str, id: &str, value: serde_json::Value) -> Self {
        self.attributes
            .entry(key.to_string())
            .or_default()
            .insert(id.to_string(), value);
        self
    }

    /// Attribute bag carried inline on every related item for `key`.
    fn item_attribute(mut self, key: &str, id: &str, value: serde_json::Value) -> Self {
        self.item_attributes
            .entry(key.to_string())
            .or_default()
            .insert(id.to_string(), value);
        self
    }

    fn failing_related(mut self, key: &str) -> Self {
        self.fail_related_for.insert(key.to_string());
        self
    }

    fn failing_attributes(mut self, key: &str) -> Self {
        self.fail_attributes_for.insert(key.to_string());
        self
    }

    fn with_schema(mut self, base: Vec<AttributeSpec>, extra: Vec<AttributeSpec>) -> Self {
        self.schema = SourceSchema { base, extra };
        self
    }

    fn cancel_after(mut self, calls: usize, flag: CancelFlag) -> Self {
        self.cancel_after = Some((calls, flag));
        self
    }

    fn related_calls(&self) -> usize {
        self.related_calls.load(Ordering::SeqCst)
    }

    fn attribute_calls(&self) -> usize {
        self.attribute_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RelationSource for ScriptedSource {
    async fn related(&self, key: &str, direction: Direction, page: u32) -> FetchResult<RelatedPage> {
        let calls = self.related_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some((limit, flag)) = &self.cancel_after
            && calls >= *limit
        {
            flag.cancel();
        }

        if self.fail_related_for.contains(key) {
            return Err(FetchError::RemoteApi {
                message: format!("relation lookup for '{}' refused", key),
            });
        }

        let table = match direction {
            Direction::Outgoing => &self.outgoing,
            Direction::Incoming => &self.incoming,
        };
        let all = table.get(key).cloned().unwrap_or_default();

        let start = ((page - 1) as usize) * PAGE_SIZE;
        let end = (start + PAGE_SIZE).min(all.len());
        let items = all
            .get(start..end)
            .unwrap_or_default()
            .iter()
            .map(|related_key| RelatedItem {
                key: related_key.clone(),
                attributes: self
                    .item_attributes
                    .get(related_key)
                    .cloned()
                    .unwrap_or_default(),
            })
            .collect();

        Ok(RelatedPage {
            items,
            has_more: end < all.len(),
        })
    }

    async fn attributes(&self, key: &str) -> FetchResult<AttributeBag> {
        self.attribute_calls.fetch_add(1, Ordering::SeqCst);

        if self.fail_attributes_for.contains(key) {
            return Err(FetchError::RemoteApi {
                message: format!("attribute lookup for '{}' refused", key),
            });
        }

        Ok(self.attributes.get(key).cloned().unwrap_or_default())
    }

    fn schema(&self) -> SourceSchema {
        self.schema.clone()
    }
}

fn name_schema() -> Vec<AttributeSpec> {
    vec![AttributeSpec {
        id: "name".to_string(),
        display_name: "Name".to_string(),
        value_type: AttributeType::Text,
    }]
}

async fn run_crawl(spec: CrawlSpec, source: &ScriptedSource) -> CrawlOutcome {
    CrawlEngine::new(spec, source, CancelFlag::new(), ProgressSender::disabled())
        .run()
        .await
}

fn completed(outcome: CrawlOutcome) -> GraphDocument {
    match outcome {
        CrawlOutcome::Completed(graph) => graph,
        other => panic!("expected Completed, got {:?}", other),
    }
}

fn vertex_ids(graph: &GraphDocument) -> Vec<&str> {
    graph.vertices.iter().map(|v| v.id.as_str()).collect()
}

fn edge_pairs(graph: &GraphDocument) -> Vec<(&str, &str)> {
    graph
        .edges
        .iter()
        .map(|e| (e.source.as_str(), e.target.as_str()))
        .collect()
}

// ============================================================================
// Basic shape
// ============================================================================

#[tokio::test]
async fn test_seed_with_no_relations_yields_single_backfilled_vertex() {
    let source = ScriptedSource::new()
        .with_schema(name_schema(), vec![])
        .attribute("A", "name", json!("Alice"));

    let graph = completed(run_crawl(CrawlSpec::new("A"), &source).await);

    assert_eq!(vertex_ids(&graph), vec!["A"]);
    assert!(graph.edges.is_empty());
    // The relation endpoint never describes the seed itself; backfill
    // fills it in.
    assert_eq!(
        graph.vertex("A").unwrap().attributes["name"],
        tangle_core::AttributeValue::Text("Alice".to_string())
    );
    assert_eq!(source.attribute_calls(), 1);
}

#[tokio::test]
async fn test_level_one_builds_a_star_around_the_seed() {
    let source = ScriptedSource::new()
        .outgoing("A", &["B", "C"])
        .outgoing("B", &["A", "D"]);

    let spec = CrawlSpec::new("A").with_level(CrawlLevel::One);
    let graph = completed(run_crawl(spec, &source).await);

    assert_eq!(vertex_ids(&graph), vec!["A", "B", "C"]);
    assert_eq!(edge_pairs(&graph), vec![("A", "B"), ("A", "C")]);
    // No recursion at level one: B's relations were never requested.
    assert_eq!(source.related_calls(), 1);
}

// ============================================================================
// Worked example (seed A; A -> {B, C}, B -> {A, D}, C -> {})
// ============================================================================

#[tokio::test]
async fn test_worked_example_one_point_five() {
    let source = ScriptedSource::new()
        .outgoing("A", &["B", "C"])
        .outgoing("B", &["A", "D"]);

    let spec = CrawlSpec::new("A").with_level(CrawlLevel::OnePointFive);
    let graph = completed(run_crawl(spec, &source).await);

    assert_eq!(vertex_ids(&graph), vec!["A", "B", "C"]);
    // B->A and B->D are dropped: neither A (the seed) nor D is a
    // depth-1 neighbor.
    assert_eq!(edge_pairs(&graph), vec![("A", "B"), ("A", "C")]);
}

#[tokio::test]
async fn test_worked_example_level_two() {
    let source = ScriptedSource::new()
        .outgoing("A", &["B", "C"])
        .outgoing("B", &["A", "D"]);

    let spec = CrawlSpec::new("A").with_level(CrawlLevel::Two);
    let graph = completed(run_crawl(spec, &source).await);

    assert_eq!(vertex_ids(&graph), vec!["A", "B", "C", "D"]);
    assert_eq!(
        edge_pairs(&graph),
        vec![("A", "B"), ("A", "C"), ("B", "A"), ("B", "D")]
    );
}

// ============================================================================
// Level 1.5 ring semantics
// ============================================================================

#[tokio::test]
async fn test_one_point_five_keeps_edges_between_ring_members() {
    let source = ScriptedSource::new()
        .outgoing("A", &["B", "C"])
        .outgoing("B", &["C"])
        .outgoing("C", &["B", "X"]);

    let spec = CrawlSpec::new("A").with_level(CrawlLevel::OnePointFive);
    let graph = completed(run_crawl(spec, &source).await);

    assert_eq!(vertex_ids(&graph), vec!["A", "B", "C"]);
    assert!(graph.has_edge("B", "C"));
    assert!(graph.has_edge("C", "B"));
    assert!(!graph.vertices.iter().any(|v| v.id == "X"));
}

#[tokio::test]
async fn test_ring_is_complete_before_depth_two_expansion() {
    // B is enumerated from the seed before C, but B's edge to C must
    // still be admitted: the whole depth-1 ring is collected first.
    let source = ScriptedSource::new()
        .outgoing("A", &["B", "C"])
        .outgoing("B", &["C"]);

    let spec = CrawlSpec::new("A").with_level(CrawlLevel::OnePointFive);
    let graph = completed(run_crawl(spec, &source).await);

    assert!(graph.has_edge("B", "C"));
}

#[tokio::test]
async fn test_self_relating_seed_joins_its_own_ring() {
    let source = ScriptedSource::new()
        .outgoing("A", &["A", "B"])
        .outgoing("B", &["A"]);

    let spec = CrawlSpec::new("A").with_level(CrawlLevel::OnePointFive);
    let graph = completed(run_crawl(spec, &source).await);

    assert_eq!(vertex_ids(&graph), vec!["A", "B"]);
    // Self-relations are not filtered, and a seed that is its own
    // depth-1 neighbor is a valid edge target at depth 2.
    assert!(graph.has_edge("A", "A"));
    assert!(graph.has_edge("B", "A"));
}

// ============================================================================
// Dedup and termination
// ============================================================================

#[tokio::test]
async fn test_each_key_registered_at_most_once() {
    let source = ScriptedSource::new()
        .outgoing("A", &["B", "B", "C"])
        .outgoing("B", &["C", "A"])
        .outgoing("C", &["B"]);

    let spec = CrawlSpec::new("A").with_level(CrawlLevel::Two);
    let graph = completed(run_crawl(spec, &source).await);

    let mut seen = HashSet::new();
    for vertex in &graph.vertices {
        assert!(seen.insert(vertex.id.clone()), "duplicate vertex {}", vertex.id);
    }
    assert_eq!(vertex_ids(&graph), vec!["A", "B", "C"]);
    // The duplicate listing of B still produces both edges.
    assert_eq!(
        edge_pairs(&graph).iter().filter(|e| **e == ("A", "B")).count(),
        2
    );
}

#[tokio::test]
async fn test_duplicate_listings_do_not_cause_reexpansion() {
    let source = ScriptedSource::new()
        .outgoing("A", &["B", "B"])
        .outgoing("B", &["C"]);

    let spec = CrawlSpec::new("A").with_level(CrawlLevel::Two);
    completed(run_crawl(spec, &source).await);

    // One call for A, one for B. The second listing of B is an edge
    // only.
    assert_eq!(source.related_calls(), 2);
}

#[tokio::test]
async fn test_recursion_never_exceeds_depth_two() {
    // D is discovered at depth 2 and must never be expanded, even
    // though it has relations of its own.
    let source = ScriptedSource::new()
        .outgoing("A", &["B"])
        .outgoing("B", &["D"])
        .outgoing("D", &["E"]);

    let spec = CrawlSpec::new("A").with_level(CrawlLevel::Two);
    let graph = completed(run_crawl(spec, &source).await);

    assert_eq!(vertex_ids(&graph), vec!["A", "B", "D"]);
    assert!(!graph.vertices.iter().any(|v| v.id == "E"));
    assert_eq!(source.related_calls(), 2);
}

#[tokio::test]
async fn test_max_items_bounds_each_enumeration() {
    let source = ScriptedSource::new().outgoing("A", &["B", "C", "D", "E"]);

    let spec = CrawlSpec::new("A")
        .with_level(CrawlLevel::One)
        .with_max_items(2);
    let graph = completed(run_crawl(spec, &source).await);

    assert_eq!(vertex_ids(&graph), vec!["A", "B", "C"]);
}

// ============================================================================
// Directions
// ============================================================================

#[tokio::test]
async fn test_incoming_pass_reverses_edge_direction() {
    let source = ScriptedSource::new().incoming("A", &["B"]);

    let spec = CrawlSpec::new("A")
        .with_level(CrawlLevel::One)
        .with_directions(vec![Direction::Incoming]);
    let graph = completed(run_crawl(spec, &source).await);

    assert_eq!(edge_pairs(&graph), vec![("B", "A")]);
}

#[tokio::test]
async fn test_passes_share_one_registry() {
    let source = ScriptedSource::new()
        .outgoing("A", &["B"])
        .incoming("A", &["B"]);

    let spec = CrawlSpec::new("A")
        .with_level(CrawlLevel::One)
        .with_directions(vec![Direction::Outgoing, Direction::Incoming]);
    let graph = completed(run_crawl(spec, &source).await);

    assert_eq!(vertex_ids(&graph), vec!["A", "B"]);
    assert_eq!(edge_pairs(&graph), vec![("A", "B"), ("B", "A")]);
}

// ============================================================================
// Attributes and backfill
// ============================================================================

#[tokio::test]
async fn test_inline_attributes_skip_backfill_for_neighbors() {
    let source = ScriptedSource::new()
        .with_schema(name_schema(), vec![])
        .outgoing("A", &["B"])
        .item_attribute("B", "name", json!("Bob"))
        .attribute("A", "name", json!("Alice"));

    let spec = CrawlSpec::new("A").with_level(CrawlLevel::One);
    let graph = completed(run_crawl(spec, &source).await);

    assert_eq!(
        graph.vertex("B").unwrap().attributes["name"],
        tangle_core::AttributeValue::Text("Bob".to_string())
    );
    // Only the key-only seed needed a lookup.
    assert_eq!(source.attribute_calls(), 1);
}

#[tokio::test]
async fn test_backfill_failure_is_best_effort() {
    let source = ScriptedSource::new()
        .with_schema(name_schema(), vec![])
        .outgoing("A", &["B"])
        .failing_attributes("A")
        .attribute("B", "name", json!("Bob"));

    let spec = CrawlSpec::new("A").with_level(CrawlLevel::One);
    let outcome = run_crawl(spec, &source).await;

    // The crawl still completes; the failure lands in diagnostics
    // only, which a Completed outcome does not carry.
    let graph = completed(outcome);
    assert_eq!(vertex_ids(&graph), vec!["A", "B"]);
    assert_eq!(
        graph.vertex("B").unwrap().attributes["name"],
        tangle_core::AttributeValue::Text("Bob".to_string())
    );
}

#[tokio::test]
async fn test_extra_attributes_declared_only_on_request() {
    let extra = vec![AttributeSpec {
        id: "bio".to_string(),
        display_name: "Bio".to_string(),
        value_type: AttributeType::Text,
    }];
    let build = || {
        ScriptedSource::new()
            .with_schema(name_schema(), extra.clone())
            .outgoing("A", &["B"])
            .item_attribute("B", "name", json!("Bob"))
            .item_attribute("B", "bio", json!("crawls graphs"))
    };

    let plain = completed(
        run_crawl(CrawlSpec::new("A").with_level(CrawlLevel::One), &build()).await,
    );
    assert!(!plain.schema.iter().any(|s| s.id == "bio"));
    assert!(!plain.vertex("B").unwrap().attributes.contains_key("bio"));

    let extended = completed(
        run_crawl(
            CrawlSpec::new("A")
                .with_level(CrawlLevel::One)
                .with_extra_attributes(),
            &build(),
        )
        .await,
    );
    assert!(extended.schema.iter().any(|s| s.id == "bio"));
    assert_eq!(
        extended.vertex("B").unwrap().attributes["bio"],
        tangle_core::AttributeValue::Text("crawls graphs".to_string())
    );
}

// ============================================================================
// Partial failure
// ============================================================================

#[tokio::test]
async fn test_load_bearing_failure_yields_partial_graph() {
    let source = ScriptedSource::new()
        .outgoing("A", &["B", "C"])
        .failing_related("B");

    let spec = CrawlSpec::new("A").with_level(CrawlLevel::Two);
    let outcome = run_crawl(spec, &source).await;

    match outcome {
        CrawlOutcome::PartialFailure { graph, stats, cause } => {
            // The depth-1 ring survived the abort.
            assert_eq!(
                graph.vertices.iter().map(|v| v.id.as_str()).collect::<Vec<_>>(),
                vec!["A", "B", "C"]
            );
            assert!(graph.has_edge("A", "B"));
            assert!(graph.has_edge("A", "C"));
            assert_eq!(stats.failure_count, 1);
            assert_eq!(stats.success_count, 1);
            assert!(stats.last_error.as_deref().unwrap().contains("'B'"));
            assert!(matches!(cause, CrawlError::Fetch(FetchError::RemoteApi { .. })));
        }
        other => panic!("expected PartialFailure, got {:?}", other),
    }
}

#[tokio::test]
async fn test_seed_expansion_failure_yields_seed_only_graph() {
    let source = ScriptedSource::new().failing_related("A");

    let outcome = run_crawl(CrawlSpec::new("A"), &source).await;

    match outcome {
        CrawlOutcome::PartialFailure { graph, stats, .. } => {
            assert_eq!(graph.vertices.len(), 1);
            assert!(graph.edges.is_empty());
            assert_eq!(stats.success_count, 0);
            assert_eq!(stats.failure_count, 1);
        }
        other => panic!("expected PartialFailure, got {:?}", other),
    }
}

// ============================================================================
// Cancellation
// ============================================================================

#[tokio::test]
async fn test_cancel_before_first_suspension_point() {
    let source = ScriptedSource::new().outgoing("A", &["B"]);
    let cancel = CancelFlag::new();
    cancel.cancel();

    let outcome = CrawlEngine::new(
        CrawlSpec::new("A"),
        &source,
        cancel,
        ProgressSender::disabled(),
    )
    .run()
    .await;

    assert!(outcome.is_cancelled());
    // Cancellation is distinct from error: no partial graph, no fetch.
    assert!(outcome.graph().is_none());
    assert_eq!(source.related_calls(), 0);
}

#[tokio::test]
async fn test_cancel_mid_crawl_unwinds_to_cancelled() {
    let cancel = CancelFlag::new();
    let source = ScriptedSource::new()
        .outgoing("A", &["B", "C"])
        .outgoing("B", &["D"])
        .outgoing("C", &["E"])
        .cancel_after(2, cancel.clone());

    let spec = CrawlSpec::new("A").with_level(CrawlLevel::Two);
    let outcome = CrawlEngine::new(spec, &source, cancel, ProgressSender::disabled())
        .run()
        .await;

    assert!(outcome.is_cancelled());
    // C's expansion never ran: the flag was observed first.
    assert_eq!(source.related_calls(), 2);
}

// ============================================================================
// Progress and the background handle
// ============================================================================

#[tokio::test]
async fn test_progress_milestones_arrive_in_traversal_order() {
    let source = ScriptedSource::new()
        .with_schema(name_schema(), vec![])
        .outgoing("A", &["B"]);

    let (sender, mut receiver) = ProgressSender::channel();
    let spec = CrawlSpec::new("A").with_level(CrawlLevel::One);
    CrawlEngine::new(spec, &source, CancelFlag::new(), sender)
        .run()
        .await;

    let mut events = Vec::new();
    while let Ok(event) = receiver.try_recv() {
        events.push(event);
    }

    assert_eq!(
        events.first(),
        Some(&ProgressEvent::PassStarted {
            direction: Direction::Outgoing
        })
    );
    assert_eq!(events.last(), Some(&ProgressEvent::Finished));
    assert!(events.iter().any(|e| matches!(e, ProgressEvent::BackfillStarted { .. })));
}

#[tokio::test]
async fn test_start_runs_the_crawl_in_the_background() {
    let source = Arc::new(
        ScriptedSource::new()
            .outgoing("A", &["B", "C"])
            .outgoing("B", &["A", "D"]),
    );

    let spec = CrawlSpec::new("A").with_level(CrawlLevel::Two);
    let handle = start(spec, source).unwrap();

    let graph = match handle.join().await.unwrap() {
        CrawlOutcome::Completed(graph) => graph,
        other => panic!("expected Completed, got {:?}", other),
    };
    assert_eq!(graph.vertices.len(), 4);
}

#[tokio::test]
async fn test_start_rejects_invalid_spec() {
    let source = Arc::new(ScriptedSource::new());
    let spec = CrawlSpec::new("");

    assert!(matches!(
        start(spec, source),
        Err(CrawlError::InvalidSpec(_))
    ));
}

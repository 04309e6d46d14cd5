use crate::control::{CancelFlag, CrawlState, ProgressEvent, ProgressSender};
use crate::graph::GraphAccumulator;
use crate::policy::{Depth, EdgePolicy, expansion_rule};
use crate::result::{CrawlError, CrawlOutcome};
use crate::spec::CrawlSpec;
use crate::stats::RequestStatistics;
use std::collections::HashSet;
use std::sync::Arc;
use tangle_net::{
    AttributeBag, Direction, FetchError, PageEnumerator, RelatedItem, RelationSource,
};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Internal unwinding signal. Cancellation is not an error, but both
/// travel the same `?` path out of the recursion.
enum Interrupt {
    Cancelled,
    Failed(CrawlError),
}

impl From<FetchError> for Interrupt {
    fn from(error: FetchError) -> Self {
        Interrupt::Failed(error.into())
    }
}

impl From<crate::graph::GraphError> for Interrupt {
    fn from(error: crate::graph::GraphError) -> Self {
        Interrupt::Failed(error.into())
    }
}

/// Orchestrates one bounded two-level expansion over a relation
/// source. Owns the accumulator and statistics for exactly one crawl;
/// the graph is handed out only at terminal state.
pub struct CrawlEngine<'a> {
    spec: CrawlSpec,
    source: &'a dyn RelationSource,
    cancel: CancelFlag,
    progress: ProgressSender,
    graph: GraphAccumulator,
    stats: RequestStatistics,
    /// Keys admitted at depth 1, across all passes. The depth-2 edge
    /// condition at level 1.5 checks this ring, not the whole
    /// registry, so edges back to the seed are dropped unless the seed
    /// is its own depth-1 neighbor.
    first_ring: HashSet<String>,
    declared: HashSet<String>,
    state: CrawlState,
}

impl<'a> CrawlEngine<'a> {
    /// The spec is assumed valid; [`CrawlSpec::validate`] is the
    /// caller's gate (`start` applies it).
    pub fn new(
        spec: CrawlSpec,
        source: &'a dyn RelationSource,
        cancel: CancelFlag,
        progress: ProgressSender,
    ) -> Self {
        Self {
            spec,
            source,
            cancel,
            progress,
            graph: GraphAccumulator::new(),
            stats: RequestStatistics::new(),
            first_ring: HashSet::new(),
            declared: HashSet::new(),
            state: CrawlState::Idle,
        }
    }

    pub fn state(&self) -> CrawlState {
        self.state
    }

    pub async fn run(mut self) -> CrawlOutcome {
        info!(
            "starting crawl of '{}' at level {}",
            self.spec.seed_key,
            self.spec.level.as_str()
        );
        self.enter(CrawlState::Running);

        match self.crawl().await {
            Ok(()) => {
                self.enter(CrawlState::Completed);
                self.progress.send(ProgressEvent::Finished);
                info!(
                    "crawl complete: {} vertices, {} edges",
                    self.graph.vertex_count(),
                    self.graph.edge_count()
                );
                CrawlOutcome::Completed(self.graph.export())
            }
            Err(Interrupt::Cancelled) => {
                self.enter(CrawlState::Cancelled);
                info!("crawl cancelled");
                CrawlOutcome::Cancelled
            }
            Err(Interrupt::Failed(cause)) => {
                self.enter(CrawlState::Failed);
                warn!("crawl aborted: {}", cause);
                CrawlOutcome::PartialFailure {
                    graph: self.graph.export(),
                    stats: self.stats,
                    cause,
                }
            }
        }
    }

    fn enter(&mut self, next: CrawlState) {
        debug_assert!(
            self.state.can_transition(next),
            "illegal crawl state transition {} -> {}",
            self.state.as_str(),
            next.as_str()
        );
        debug!("crawl state: {} -> {}", self.state.as_str(), next.as_str());
        self.state = next;
    }

    /// Polled at every suspension point: before each page fetch,
    /// before each recursive expansion step, before each backfill
    /// lookup.
    fn checkpoint(&mut self) -> Result<(), Interrupt> {
        if self.cancel.is_cancelled() {
            if self.state == CrawlState::Running {
                self.enter(CrawlState::Cancelling);
            }
            return Err(Interrupt::Cancelled);
        }
        Ok(())
    }

    async fn crawl(&mut self) -> Result<(), Interrupt> {
        self.declare_schema()?;

        let seed = self.spec.seed_key.clone();
        self.graph.register_vertex(&seed);

        for direction in self.spec.directions.clone() {
            self.run_pass(&seed, direction).await?;
        }

        self.backfill().await
    }

    fn declare_schema(&mut self) -> Result<(), Interrupt> {
        let schema = self.source.schema();
        let mut specs = schema.base;
        if self.spec.include_extra_attributes {
            specs.extend(schema.extra);
        }
        for spec in specs {
            self.declared.insert(spec.id.clone());
            self.graph.define_attribute(spec)?;
        }
        Ok(())
    }

    /// One sequential pass for one direction, sharing the registry and
    /// first ring with every other pass.
    async fn run_pass(&mut self, seed: &str, direction: Direction) -> Result<(), Interrupt> {
        self.progress.send(ProgressEvent::PassStarted { direction });
        info!("{} pass from '{}'", direction.as_str(), seed);

        // The full depth-1 ring of this pass is collected before any
        // depth-2 expansion; the ring edge condition must see every
        // depth-1 neighbor, whatever the enumeration order.
        let ring = self.expand(seed, direction, Depth::One).await?;

        if expansion_rule(self.spec.level, Depth::One).recurse {
            for neighbor in ring {
                self.checkpoint()?;
                self.expand(&neighbor, direction, Depth::Two).await?;
            }
        }
        Ok(())
    }

    /// Enumerates one vertex's related items and admits them under the
    /// level/depth rule. Load-bearing: any fetch failure here aborts
    /// the crawl. Returns the keys newly registered at depth 1, which
    /// are the only candidates for depth-2 expansion.
    async fn expand(
        &mut self,
        parent: &str,
        direction: Direction,
        depth: Depth,
    ) -> Result<Vec<String>, Interrupt> {
        self.progress.send(ProgressEvent::ExpandingVertex {
            key: parent.to_string(),
            depth: depth.as_number(),
        });

        let rule = expansion_rule(self.spec.level, depth);
        let mut pager = PageEnumerator::new(
            self.source,
            parent,
            direction,
            self.spec.max_items_per_direction,
        );
        let mut newly_registered = Vec::new();

        loop {
            self.checkpoint()?;
            match pager.next().await {
                Ok(Some(item)) => {
                    self.admit(parent, &item, direction, depth, rule, &mut newly_registered)?
                }
                Ok(None) => break,
                Err(error) => {
                    self.stats.record_successes(pager.pages_fetched());
                    self.stats.record_failure(&error);
                    warn!("load-bearing expansion of '{}' failed: {}", parent, error);
                    return Err(error.into());
                }
            }
        }

        self.stats.record_successes(pager.pages_fetched());
        Ok(newly_registered)
    }

    fn admit(
        &mut self,
        parent: &str,
        item: &RelatedItem,
        direction: Direction,
        depth: Depth,
        rule: crate::policy::ExpansionRule,
        newly_registered: &mut Vec<String>,
    ) -> Result<(), Interrupt> {
        let key = item.key.as_str();
        if key.is_empty() {
            // Adapters skip these upstream; drop any that slip through.
            debug!("related item with empty key under '{}', skipped", parent);
            return Ok(());
        }

        if rule.add_vertex {
            let is_new = self.graph.register_vertex(key);
            if is_new {
                self.append_attributes(key, &item.attributes)?;
            }
            if depth == Depth::One {
                // Every depth-1 admission joins the ring, including a
                // seed that relates to itself. Only newly registered
                // keys are expanded further.
                self.first_ring.insert(key.to_string());
                if is_new {
                    newly_registered.push(key.to_string());
                }
            }
        }

        let admit_edge = match rule.edge {
            EdgePolicy::Always => true,
            EdgePolicy::IfFirstRing => self.first_ring.contains(key),
            EdgePolicy::Never => false,
        };
        if admit_edge {
            let (source, target) = match direction {
                Direction::Outgoing => (parent, key),
                Direction::Incoming => (key, parent),
            };
            self.graph.append_edge(source, target)?;
        }

        Ok(())
    }

    fn append_attributes(&mut self, key: &str, bag: &AttributeBag) -> Result<(), Interrupt> {
        for (id, value) in bag {
            // Undeclared ids include extras when the crawl did not ask
            // for them.
            if self.declared.contains(id) {
                self.graph.append_attribute_value(key, id, value.clone())?;
            }
        }
        Ok(())
    }

    /// One attribute lookup per key-only vertex, in first-seen order.
    /// Best-effort: failures land in the statistics and the crawl
    /// keeps going.
    async fn backfill(&mut self) -> Result<(), Interrupt> {
        let pending = self.graph.keys_without_attributes();
        if pending.is_empty() {
            return Ok(());
        }

        self.progress.send(ProgressEvent::BackfillStarted {
            pending: pending.len(),
        });
        info!("backfilling {} vertices", pending.len());

        for key in pending {
            self.checkpoint()?;
            self.progress
                .send(ProgressEvent::BackfillingVertex { key: key.clone() });

            match self.source.attributes(&key).await {
                Ok(bag) => {
                    self.stats.record_success();
                    if bag.is_empty() {
                        debug!("backfill for '{}' found no attributes", key);
                    } else {
                        self.append_attributes(&key, &bag)?;
                    }
                }
                Err(error) => {
                    warn!("backfill for '{}' failed: {}", key, error);
                    self.stats.record_failure(&error);
                }
            }
        }
        Ok(())
    }
}

/// Handle to a crawl running as a background task. The cancellation
/// flag and the progress channel are the only state crossing the task
/// boundary.
pub struct CrawlHandle {
    cancel: CancelFlag,
    pub progress: mpsc::UnboundedReceiver<ProgressEvent>,
    task: tokio::task::JoinHandle<CrawlOutcome>,
}

impl CrawlHandle {
    /// Requests cooperative cancellation. The crawl unwinds at its
    /// next suspension point.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    pub async fn join(self) -> Result<CrawlOutcome, CrawlError> {
        self.task.await.map_err(CrawlError::from)
    }
}

/// Validates the spec and spawns the crawl as a background task.
pub fn start(
    spec: CrawlSpec,
    source: Arc<dyn RelationSource>,
) -> Result<CrawlHandle, CrawlError> {
    spec.validate()?;

    let cancel = CancelFlag::new();
    let (progress_sender, progress) = ProgressSender::channel();
    let flag = cancel.clone();

    let task = tokio::spawn(async move {
        CrawlEngine::new(spec, source.as_ref(), flag, progress_sender)
            .run()
            .await
    });

    Ok(CrawlHandle {
        cancel,
        progress,
        task,
    })
}

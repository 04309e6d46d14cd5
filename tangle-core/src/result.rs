use crate::graph::{GraphDocument, GraphError};
use crate::stats::RequestStatistics;
use tangle_net::FetchError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CrawlError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error("invalid crawl spec: {0}")]
    InvalidSpec(String),

    #[error("crawl task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Terminal state of one crawl invocation.
///
/// `PartialFailure` is usable data: the graph accumulated before the
/// load-bearing failure, paired with request diagnostics. Callers must
/// not treat it as a bare error to discard.
#[derive(Debug)]
pub enum CrawlOutcome {
    Completed(GraphDocument),
    PartialFailure {
        graph: GraphDocument,
        stats: RequestStatistics,
        cause: CrawlError,
    },
    Cancelled,
}

impl CrawlOutcome {
    /// The graph, if this outcome carries one.
    pub fn graph(&self) -> Option<&GraphDocument> {
        match self {
            CrawlOutcome::Completed(graph) => Some(graph),
            CrawlOutcome::PartialFailure { graph, .. } => Some(graph),
            CrawlOutcome::Cancelled => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, CrawlOutcome::Cancelled)
    }
}

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tangle_net::Direction;
use tokio::sync::mpsc;

/// Cooperative stop signal. Written once by the caller, polled by the
/// engine at its suspension points; atomic visibility is the only
/// synchronization required.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Coarse, human-readable crawl milestones, emitted at least once each
/// in traversal order.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    PassStarted { direction: Direction },
    ExpandingVertex { key: String, depth: u8 },
    BackfillStarted { pending: usize },
    BackfillingVertex { key: String },
    Finished,
}

impl fmt::Display for ProgressEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProgressEvent::PassStarted { direction } => {
                write!(f, "Starting {} pass", direction.as_str())
            }
            ProgressEvent::ExpandingVertex { key, depth } => {
                write!(f, "Expanding '{}' (depth {})", key, depth)
            }
            ProgressEvent::BackfillStarted { pending } => {
                write!(f, "Backfilling attributes for {} vertices", pending)
            }
            ProgressEvent::BackfillingVertex { key } => {
                write!(f, "Looking up attributes for '{}'", key)
            }
            ProgressEvent::Finished => write!(f, "Crawl finished"),
        }
    }
}

/// Non-blocking progress handoff. A slow or dropped consumer must
/// never stall the crawl, so sends are fire-and-forget.
#[derive(Debug, Clone)]
pub struct ProgressSender(Option<mpsc::UnboundedSender<ProgressEvent>>);

impl ProgressSender {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ProgressEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self(Some(sender)), receiver)
    }

    /// A sender that discards every event, for callers that do not
    /// consume progress.
    pub fn disabled() -> Self {
        Self(None)
    }

    pub fn send(&self, event: ProgressEvent) {
        if let Some(sender) = &self.0 {
            // The receiver being gone is not our problem.
            let _ = sender.send(event);
        }
    }
}

/// Lifecycle of one crawl invocation:
/// `Idle → Running → {Completed | Failed | Cancelling → Cancelled}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrawlState {
    Idle,
    Running,
    Completed,
    Failed,
    Cancelling,
    Cancelled,
}

impl CrawlState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CrawlState::Idle => "idle",
            CrawlState::Running => "running",
            CrawlState::Completed => "completed",
            CrawlState::Failed => "failed",
            CrawlState::Cancelling => "cancelling",
            CrawlState::Cancelled => "cancelled",
        }
    }

    pub fn can_transition(self, next: CrawlState) -> bool {
        matches!(
            (self, next),
            (CrawlState::Idle, CrawlState::Running)
                | (CrawlState::Running, CrawlState::Completed)
                | (CrawlState::Running, CrawlState::Failed)
                | (CrawlState::Running, CrawlState::Cancelling)
                | (CrawlState::Cancelling, CrawlState::Cancelled)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            CrawlState::Completed | CrawlState::Failed | CrawlState::Cancelled
        )
    }
}

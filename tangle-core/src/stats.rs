use serde::{Deserialize, Serialize};

/// Success/failure counters for the network calls a single crawl
/// issued, plus the rendering of the most recent failure. Mutated by
/// the crawl engine only, so the engine decides which failures count.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestStatistics {
    pub success_count: usize,
    pub failure_count: usize,
    pub last_error: Option<String>,
}

impl RequestStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_success(&mut self) {
        self.success_count += 1;
    }

    pub fn record_successes(&mut self, count: usize) {
        self.success_count += count;
    }

    pub fn record_failure(&mut self, error: impl std::fmt::Display) {
        self.failure_count += 1;
        self.last_error = Some(error.to_string());
    }
}

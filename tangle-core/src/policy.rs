use serde::{Deserialize, Serialize};

/// Crawl-depth policy governing vertex/edge admission at each
/// recursion depth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CrawlLevel {
    One,
    OnePointFive,
    Two,
}

impl CrawlLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            CrawlLevel::One => "1",
            CrawlLevel::OnePointFive => "1.5",
            CrawlLevel::Two => "2",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "1" | "one" => Some(CrawlLevel::One),
            "1.5" | "onepointfive" => Some(CrawlLevel::OnePointFive),
            "2" | "two" => Some(CrawlLevel::Two),
            _ => None,
        }
    }
}

/// Recursion depth measured from the seed. The hard cap at two is what
/// guarantees termination; there is no depth three.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Depth {
    One,
    Two,
}

impl Depth {
    pub fn as_number(self) -> u8 {
        match self {
            Depth::One => 1,
            Depth::Two => 2,
        }
    }
}

/// Whether an edge to a related item is admitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgePolicy {
    Always,
    /// Only when the target is itself a depth-1 neighbor.
    IfFirstRing,
    Never,
}

/// What an expansion step at a given depth is allowed to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpansionRule {
    pub add_vertex: bool,
    pub edge: EdgePolicy,
    pub recurse: bool,
}

/// The single decision function behind all three levels. Every
/// admission choice the engine makes goes through this table; the
/// levels must never drift apart through scattered conditionals.
pub fn expansion_rule(level: CrawlLevel, depth: Depth) -> ExpansionRule {
    match (level, depth) {
        (CrawlLevel::One, Depth::One) => ExpansionRule {
            add_vertex: true,
            edge: EdgePolicy::Always,
            recurse: false,
        },
        // Unreachable in practice: level one never recurses.
        (CrawlLevel::One, Depth::Two) => ExpansionRule {
            add_vertex: false,
            edge: EdgePolicy::Never,
            recurse: false,
        },
        (CrawlLevel::OnePointFive, Depth::One) => ExpansionRule {
            add_vertex: true,
            edge: EdgePolicy::Always,
            recurse: true,
        },
        (CrawlLevel::OnePointFive, Depth::Two) => ExpansionRule {
            add_vertex: false,
            edge: EdgePolicy::IfFirstRing,
            recurse: false,
        },
        (CrawlLevel::Two, Depth::One) => ExpansionRule {
            add_vertex: true,
            edge: EdgePolicy::Always,
            recurse: true,
        },
        (CrawlLevel::Two, Depth::Two) => ExpansionRule {
            add_vertex: true,
            edge: EdgePolicy::Always,
            recurse: false,
        },
    }
}

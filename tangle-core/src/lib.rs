pub mod control;
pub mod engine;
pub mod graph;
pub mod policy;
pub mod result;
pub mod spec;
pub mod stats;

pub use control::{CancelFlag, CrawlState, ProgressEvent, ProgressSender};
pub use engine::{CrawlEngine, CrawlHandle, start};
pub use graph::{AttributeValue, EdgeRecord, GraphAccumulator, GraphDocument, GraphError, VertexRecord};
pub use policy::{CrawlLevel, Depth, EdgePolicy, ExpansionRule, expansion_rule};
pub use result::{CrawlError, CrawlOutcome};
pub use spec::CrawlSpec;
pub use stats::RequestStatistics;

use colored::Colorize;

/// Prints the startup banner used by the CLI.
pub fn print_banner() {
    println!("{}", "  tangle".bright_cyan().bold());
    println!("{}", "  bounded-depth relational graph crawler".bright_black());
    println!();
}

pub mod indexer;
pub mod poller;
pub mod ranges;
pub mod reconciler;

pub use indexer::{IndexMode, OwnershipIndexer};
pub use poller::{PollOutcome, PollWorker, PollerConfig, ScanSettings};
pub use ranges::plan_ranges;
pub use reconciler::TradeReconciler;

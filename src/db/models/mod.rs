mod checkpoint;
mod ownership;
mod trade;

pub use checkpoint::ScanCheckpoint;
pub use ownership::OwnershipInterval;
pub use trade::{TradeRequest, TradeStatus};

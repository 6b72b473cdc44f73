pub mod rpc;
pub mod source;

#[cfg(test)]
pub mod mock;

pub use rpc::RpcLogSource;
pub use source::{LogSource, SourceError, TransferEvent};

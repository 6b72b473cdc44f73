pub mod abis;
pub mod chain;
pub mod config;
pub mod cron;
pub mod db;
pub mod service;
pub mod utils;
pub mod worker;

pub use chain::RpcLogSource;
pub use config::Settings;
pub use cron::{CronScheduler, CronSettings};
pub use db::Database;
pub use service::OwnershipService;
pub use worker::{OwnershipIndexer, PollWorker, TradeReconciler};

mod config;

pub use config::{ChainSettings, PollerSettings, PostgresSettings, Settings};

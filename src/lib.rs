pub mod config;
pub mod covers;
pub mod drive;
pub mod error;
pub mod ingest;
pub mod netcache;
pub mod parser;
pub mod progress;
pub mod provider;
pub mod state;
pub mod store;

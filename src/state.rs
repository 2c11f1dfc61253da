use std::sync::Arc;

use crate::config::Config;
use crate::drive::{DriveClient, ProviderEndpoints};
use crate::ingest::BatchProcessor;
use crate::netcache::ResponseCache;
use crate::progress::ProgressChannel;
use crate::store::{DbPool, Store};

/// Everything a running instance needs, wired together once at startup.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Store,
    pub cache: Arc<ResponseCache>,
    pub drive: Arc<DriveClient>,
    pub progress: ProgressChannel,
    pub processor: BatchProcessor,
}

impl AppState {
    pub fn new(config: Config, pool: DbPool) -> Self {
        let client = reqwest::Client::new();
        let cache = Arc::new(ResponseCache::new(client.clone()));
        let drive = Arc::new(DriveClient::new(
            Arc::clone(&cache),
            ProviderEndpoints::from(&config.providers),
            config.cache.listing_ttl(),
            config.cache.identity_ttl(),
        ));
        let store = Store::new(pool);
        let progress = ProgressChannel::new();
        let processor = BatchProcessor::new(
            store.clone(),
            Arc::clone(&drive),
            client,
            progress.clone(),
            &config.ingest,
        );

        Self {
            config: Arc::new(config),
            store,
            cache,
            drive,
            progress,
            processor,
        }
    }
}

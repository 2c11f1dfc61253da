use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

const CHANNEL_CAPACITY: usize = 64;

/// Aggregate ingest progress. Counters are cumulative for the lifetime of
/// one scheduler instance: `total` keeps growing as batches arrive instead
/// of resetting between them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressState {
    pub processed: u64,
    pub total: u64,
    pub error_count: u64,
}

/// Message published on the channel, in the same tagged shape the UI
/// protocol uses on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ChannelMessage {
    Progress { progress: ProgressState },
}

/// Broadcast bus every open view of the app subscribes to. Each publish
/// carries the full current snapshot, never a delta, so a late subscriber
/// converges on the next publish without any replay.
#[derive(Clone)]
pub struct ProgressChannel {
    tx: broadcast::Sender<ChannelMessage>,
}

impl ProgressChannel {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChannelMessage> {
        self.tx.subscribe()
    }

    pub fn publish(&self, progress: ProgressState) {
        // No open views is fine
        let _ = self.tx.send(ChannelMessage::Progress { progress });
    }
}

impl Default for ProgressChannel {
    fn default() -> Self {
        Self::new()
    }
}

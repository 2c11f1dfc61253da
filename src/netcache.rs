use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde::de::DeserializeOwned;
use sha2::{Digest, Sha256};

/// Time-boxed cache for idempotent GET requests (identity lookups, folder
/// listings). Keyed by URL plus a normalized form of the request headers,
/// so the same URL fetched with different bearer tokens never aliases.
pub struct ResponseCache {
    client: reqwest::Client,
    entries: DashMap<String, Entry>,
}

struct Entry {
    status: reqwest::StatusCode,
    body: Vec<u8>,
    stored_at: Instant,
}

/// A response body reconstructed from cache or read off the wire.
#[derive(Debug, Clone)]
pub struct CachedResponse {
    pub status: reqwest::StatusCode,
    pub body: Vec<u8>,
}

impl CachedResponse {
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }
}

impl ResponseCache {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            entries: DashMap::new(),
        }
    }

    /// GET `url` with the given headers, serving from cache when a stored
    /// entry is younger than `ttl`. Only successful responses are stored;
    /// a transient failure must not be pinned for the whole window.
    pub async fn get_with_cache(
        &self,
        url: &str,
        headers: &[(String, String)],
        ttl: Duration,
    ) -> Result<CachedResponse, reqwest::Error> {
        let key = cache_key(url, headers);
        if let Some(hit) = self.lookup(&key, ttl) {
            return Ok(hit);
        }

        let mut req = self.client.get(url);
        for (name, value) in headers {
            req = req.header(name, value);
        }
        let resp = req.send().await?;
        let status = resp.status();
        let body = resp.bytes().await?.to_vec();

        if status.is_success() {
            self.entries.insert(
                key,
                Entry {
                    status,
                    body: body.clone(),
                    stored_at: Instant::now(),
                },
            );
        }

        Ok(CachedResponse { status, body })
    }

    /// Drop every stored entry. Used by forced refreshes.
    pub fn clear(&self) {
        self.entries.clear();
    }

    // The shard guard must be released before any await point.
    fn lookup(&self, key: &str, ttl: Duration) -> Option<CachedResponse> {
        let entry = self.entries.get(key)?;
        if entry.stored_at.elapsed() < ttl {
            Some(CachedResponse {
                status: entry.status,
                body: entry.body.clone(),
            })
        } else {
            None
        }
    }
}

fn cache_key(url: &str, headers: &[(String, String)]) -> String {
    let mut lines: Vec<String> = headers
        .iter()
        .map(|(name, value)| format!("{}:{}", name.to_ascii_lowercase(), value))
        .collect();
    lines.sort();

    let mut hasher = Sha256::new();
    hasher.update(url.as_bytes());
    for line in &lines {
        hasher.update(b"\n");
        hasher.update(line.as_bytes());
    }
    hex::encode(hasher.finalize())
}

use std::io::Cursor;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task;
use tracing::warn;

use crate::covers::{self, NormalizedCover};
use crate::drive::DriveClient;
use crate::parser::{BookMetadata, epub};
use crate::provider::Provider;

/// Job handed to one extraction worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase", rename_all_fields = "camelCase")]
pub enum WorkerRequest {
    Extract {
        provider: Provider,
        file_id: String,
        access_token: Option<String>,
    },
}

/// Structured replies a worker posts back. A cover reply, when present,
/// always precedes the final done reply; every run ends in exactly one
/// done or error.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase", rename_all_fields = "camelCase")]
pub enum WorkerReply {
    Cover {
        payload: Vec<u8>,
        width: u32,
        height: u32,
    },
    Done {
        metadata: BookMetadata,
    },
    Error {
        file_id: String,
        provider: Provider,
        error: String,
    },
}

#[derive(Debug, thiserror::Error)]
enum WorkerError {
    #[error("download failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("download failed with status {status}")]
    Download { status: reqwest::StatusCode },
    #[error("{0}")]
    Parse(#[from] epub::EpubError),
    #[error("task join error: {0}")]
    Join(#[from] task::JoinError),
}

/// One extraction: fetch bytes, parse, normalize the cover, report back.
/// The worker never touches the durable store; the scheduler applies every
/// reply, keeping a single writer.
pub(crate) async fn run(
    client: reqwest::Client,
    drive: Arc<DriveClient>,
    request: WorkerRequest,
    cover_quality: f32,
    replies: mpsc::Sender<WorkerReply>,
) {
    let WorkerRequest::Extract {
        provider,
        file_id,
        access_token,
    } = request;

    match extract(
        &client,
        &drive,
        provider,
        &file_id,
        access_token.as_deref(),
        cover_quality,
        &replies,
    )
    .await
    {
        Ok(metadata) => {
            let _ = replies.send(WorkerReply::Done { metadata }).await;
        }
        Err(e) => {
            let _ = replies
                .send(WorkerReply::Error {
                    file_id,
                    provider,
                    error: e.to_string(),
                })
                .await;
        }
    }
}

async fn extract(
    client: &reqwest::Client,
    drive: &DriveClient,
    provider: Provider,
    file_id: &str,
    token: Option<&str>,
    cover_quality: f32,
    replies: &mpsc::Sender<WorkerReply>,
) -> Result<BookMetadata, WorkerError> {
    let url = drive.content_url(provider, file_id);
    let mut req = client.get(&url);
    if let Some(token) = token {
        req = req.bearer_auth(token);
    }
    let resp = req.send().await?;
    let status = resp.status();
    if !status.is_success() {
        return Err(WorkerError::Download { status });
    }
    let bytes = resp.bytes().await?.to_vec();

    // Archive decompression, XML parsing and image re-encoding all happen
    // off the async threads.
    let (metadata, cover) = task::spawn_blocking(
        move || -> Result<(BookMetadata, Option<NormalizedCover>), WorkerError> {
            let parsed = epub::parse(Cursor::new(bytes))?;
            let cover = parsed.cover.and_then(|raw| {
                match covers::normalize(&raw.data, cover_quality) {
                    Ok(cover) => Some(cover),
                    Err(e) => {
                        // A broken cover image does not fail the book
                        warn!("cover normalization failed: {e}");
                        None
                    }
                }
            });
            Ok((parsed.metadata, cover))
        },
    )
    .await??;

    if let Some(cover) = cover {
        let _ = replies
            .send(WorkerReply::Cover {
                payload: cover.data,
                width: cover.width,
                height: cover.height,
            })
            .await;
    }

    Ok(metadata)
}

mod worker;

pub use worker::{WorkerReply, WorkerRequest};

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::{Mutex, Notify, RwLock, mpsc};
use tracing::{debug, warn};

use crate::config::IngestConfig;
use crate::drive::DriveClient;
use crate::parser::BookMetadata;
use crate::progress::{ProgressChannel, ProgressState};
use crate::provider::Provider;
use crate::store::models::{Cover, FilePatch, FileRecord, FileStatus};
use crate::store::{Store, now_millis};

/// Callback that resolves an access token for one provider, injected by
/// the auth layer. May refresh transparently; `None` means "no session".
pub type TokenProvider =
    Arc<dyn Fn(Provider) -> Pin<Box<dyn Future<Output = Option<String>> + Send>> + Send + Sync>;

struct QueuedJob {
    provider: Provider,
    file_id: String,
    file_name: String,
}

#[derive(Default)]
struct SchedulerState {
    queue: VecDeque<QueuedJob>,
    running: usize,
    progress: ProgressState,
}

struct Inner {
    store: Store,
    drive: Arc<DriveClient>,
    client: reqwest::Client,
    progress_channel: ProgressChannel,
    pool_size: usize,
    cover_quality: f32,
    token_provider: RwLock<Option<TokenProvider>>,
    state: Mutex<SchedulerState>,
    idle: Notify,
}

/// Batch scheduler: accepts file jobs, keeps at most `pool_size` extraction
/// workers in flight, applies every lifecycle write to the store itself and
/// publishes an aggregate snapshot after each change. Clones share one
/// scheduler.
#[derive(Clone)]
pub struct BatchProcessor {
    inner: Arc<Inner>,
}

impl BatchProcessor {
    pub fn new(
        store: Store,
        drive: Arc<DriveClient>,
        client: reqwest::Client,
        progress_channel: ProgressChannel,
        config: &IngestConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                drive,
                client,
                progress_channel,
                pool_size: config.pool_size,
                cover_quality: config.cover_quality,
                token_provider: RwLock::new(None),
                state: Mutex::new(SchedulerState::default()),
                idle: Notify::new(),
            }),
        }
    }

    pub async fn set_token_provider(&self, provider_fn: TokenProvider) {
        *self.inner.token_provider.write().await = Some(provider_fn);
    }

    /// Current aggregate snapshot.
    pub async fn progress(&self) -> ProgressState {
        self.inner.state.lock().await.progress
    }

    /// Enqueue files for extraction. Files already `ready` are skipped
    /// unless `force` re-processes them. Fire-and-forget: jobs run on
    /// background tasks and report through the store and the channel.
    pub async fn add_jobs(&self, files: &[FileRecord], force: bool) {
        let snapshot = {
            let mut state = self.inner.state.lock().await;
            let mut accepted: u64 = 0;
            for f in files {
                if !force && f.status == FileStatus::Ready {
                    continue;
                }
                state.queue.push_back(QueuedJob {
                    provider: f.provider,
                    file_id: f.id.clone(),
                    file_name: f.name.clone(),
                });
                accepted += 1;
            }
            if accepted == 0 {
                return;
            }
            state.progress.total += accepted;
            state.progress
        };
        debug!(total = snapshot.total, "jobs enqueued");
        self.inner.progress_channel.publish(snapshot);
        self.pump().await;
    }

    /// Resolve until the queue is drained and no worker is in flight.
    pub async fn wait_idle(&self) {
        loop {
            // Register interest before the check so a wakeup between the
            // two cannot be lost.
            let notified = self.inner.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            {
                let state = self.inner.state.lock().await;
                if state.running == 0 && state.queue.is_empty() {
                    return;
                }
            }
            notified.await;
        }
    }

    /// Fill every free pool slot from the front of the queue.
    ///
    /// Returns a boxed future because `pump -> run_job -> settle -> pump`
    /// recurses; the erased type keeps the spawned future's `Send` proof
    /// from being self-referential.
    fn pump(&self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(async move {
            loop {
                let job = {
                    let mut state = self.inner.state.lock().await;
                    if state.running >= self.inner.pool_size {
                        return;
                    }
                    match state.queue.pop_front() {
                        Some(job) => {
                            state.running += 1;
                            job
                        }
                        None => {
                            if state.running == 0 {
                                self.inner.idle.notify_waiters();
                            }
                            return;
                        }
                    }
                };
                let this = self.clone();
                tokio::spawn(async move { this.run_job(job).await });
            }
        })
    }

    async fn run_job(&self, job: QueuedJob) {
        // Persist the in-flight marker before any network traffic, so a
        // concurrent observer never sees a stale `pending`.
        let processing = FilePatch {
            status: Some(FileStatus::Processing),
            ..Default::default()
        };
        if let Err(e) = self
            .inner
            .store
            .update_file(job.provider, &job.file_id, &processing)
            .await
        {
            warn!(file = %job.file_id, "failed to mark processing: {e}");
        }

        let access_token = self.access_token(job.provider).await;
        let request = WorkerRequest::Extract {
            provider: job.provider,
            file_id: job.file_id.clone(),
            access_token,
        };

        let (tx, mut rx) = mpsc::channel(4);
        let handle = tokio::spawn(worker::run(
            self.inner.client.clone(),
            Arc::clone(&self.inner.drive),
            request,
            self.inner.cover_quality,
            tx,
        ));

        let mut cover_id: Option<String> = None;
        let mut done: Option<BookMetadata> = None;
        let mut failed: Option<String> = None;

        while let Some(reply) = rx.recv().await {
            match reply {
                WorkerReply::Cover {
                    payload,
                    width,
                    height,
                } => {
                    let cover = Cover {
                        id: job.file_id.clone(),
                        provider: job.provider,
                        data: payload,
                        width: i64::from(width),
                        height: i64::from(height),
                        cached_at: now_millis(),
                    };
                    match self.inner.store.put_cover(&cover).await {
                        Ok(()) => cover_id = Some(cover.id),
                        Err(e) => warn!(file = %job.file_id, "storing cover failed: {e}"),
                    }
                }
                WorkerReply::Done { metadata } => done = Some(metadata),
                WorkerReply::Error { error, .. } => failed = Some(error),
            }
        }
        let _ = handle.await;

        let errored = match (done, failed) {
            (Some(mut metadata), None) => {
                if metadata.title.is_empty() {
                    metadata.title = job.file_name.clone();
                }
                let patch = FilePatch {
                    status: Some(FileStatus::Ready),
                    metadata: Some(metadata),
                    cover_id,
                };
                if let Err(e) = self
                    .inner
                    .store
                    .update_file(job.provider, &job.file_id, &patch)
                    .await
                {
                    warn!(file = %job.file_id, "failed to mark ready: {e}");
                }
                false
            }
            (_, failure) => {
                match &failure {
                    Some(error) => warn!(file = %job.file_id, "extraction failed: {error}"),
                    // Worker ended without a verdict (panicked or was
                    // cancelled); counts as a failure too
                    None => warn!(file = %job.file_id, "extraction worker died"),
                }
                let patch = FilePatch {
                    status: Some(FileStatus::Error),
                    ..Default::default()
                };
                if let Err(e) = self
                    .inner
                    .store
                    .update_file(job.provider, &job.file_id, &patch)
                    .await
                {
                    warn!(file = %job.file_id, "failed to mark error: {e}");
                }
                true
            }
        };

        self.settle(errored).await;
    }

    /// One job finished: free its slot, bump the counters, publish, and
    /// immediately try to dispatch the next queued job.
    async fn settle(&self, errored: bool) {
        let snapshot = {
            let mut state = self.inner.state.lock().await;
            state.running -= 1;
            state.progress.processed += 1;
            if errored {
                state.progress.error_count += 1;
            }
            state.progress
        };
        self.inner.progress_channel.publish(snapshot);
        self.pump().await;
    }

    async fn access_token(&self, provider: Provider) -> Option<String> {
        let guard = self.inner.token_provider.read().await;
        match guard.as_ref() {
            Some(f) => f(provider).await,
            None => None,
        }
    }
}

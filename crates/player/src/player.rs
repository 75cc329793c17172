//! Async driver around [`PlaybackEngine`]
//!
//! Executes engine commands against a [`MediaBackend`], fetching chunk audio
//! through a [`ChunkFetcher`] and feeding backend events back into the
//! engine.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use narrator_config::PlaybackConfig;
use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use crate::engine::{MediaCommand, MediaEvent, PlaybackEngine, PlaybackSnapshot, PlaybackState, ResourceHandle};
use crate::error::{MediaFailure, PlayerError};
use crate::fetcher::{ChunkFetcher, FetchedChunk, PlaybackSource};

/// Channel backends report [`MediaEvent`]s on, tagged with the resource
pub type MediaEventSender = mpsc::UnboundedSender<(ResourceHandle, MediaEvent)>;

/// Decodes and plays one chunk at a time
///
/// Calls return immediately; outcomes are reported as events on the sender
/// passed to [`MediaBackend::load`].
#[async_trait]
pub trait MediaBackend: Send + Sync {
    async fn load(&self, handle: ResourceHandle, chunk: FetchedChunk, events: MediaEventSender);

    async fn play(&self, handle: ResourceHandle);

    async fn pause(&self, handle: ResourceHandle);

    async fn seek(&self, handle: ResourceHandle, offset: Duration);

    /// Stop playback and release everything held for the resource
    async fn teardown(&self, handle: ResourceHandle);
}

/// Notifications for UIs
#[derive(Debug, Clone, PartialEq)]
pub enum PlayerEvent {
    SourceResolved { total_chunks: usize },
    StateChanged { from: PlaybackState, to: PlaybackState },
    ChunkFailed { index: usize, failure: MediaFailure },
    /// The last chunk finished playing
    Finished,
}

/// Work for the backend task, executed strictly in order
enum Job {
    Command(MediaCommand),
    /// Fetched audio ready to hand to the backend
    Attach(ResourceHandle, FetchedChunk),
}

/// One-ahead prefetch slot
#[derive(Default)]
struct Prefetch {
    index: Option<usize>,
    chunk: Option<FetchedChunk>,
}

struct PlayerInner {
    config: PlaybackConfig,
    engine: Mutex<PlaybackEngine>,
    fetcher: Arc<dyn ChunkFetcher>,
    backend: Arc<dyn MediaBackend>,
    source: Mutex<Option<PlaybackSource>>,
    prefetch: Mutex<Prefetch>,
    media_tx: MediaEventSender,
    jobs: mpsc::UnboundedSender<Job>,
    event_tx: broadcast::Sender<PlayerEvent>,
}

/// Player for chunked narration audio
pub struct ChunkedPlayer {
    inner: Arc<PlayerInner>,
    tasks: Vec<JoinHandle<()>>,
}

impl ChunkedPlayer {
    /// Create a player; must be called within a tokio runtime
    pub fn new(
        fetcher: Arc<dyn ChunkFetcher>,
        backend: Arc<dyn MediaBackend>,
        config: PlaybackConfig,
    ) -> Self {
        let (media_tx, media_rx) = mpsc::unbounded_channel();
        let (jobs, job_rx) = mpsc::unbounded_channel();
        let (event_tx, _) = broadcast::channel(100);

        let inner = Arc::new(PlayerInner {
            engine: Mutex::new(PlaybackEngine::new(&config)),
            config,
            fetcher,
            backend,
            source: Mutex::new(None),
            prefetch: Mutex::new(Prefetch::default()),
            media_tx,
            jobs,
            event_tx,
        });

        let tasks = vec![
            tokio::spawn(run_media_events(inner.clone(), media_rx)),
            tokio::spawn(run_jobs(inner.clone(), job_rx)),
        ];
        Self { inner, tasks }
    }

    /// Subscribe to player events
    pub fn subscribe(&self) -> broadcast::Receiver<PlayerEvent> {
        self.inner.event_tx.subscribe()
    }

    pub fn snapshot(&self) -> PlaybackSnapshot {
        self.inner.engine.lock().snapshot()
    }

    /// Resolve a content id and start loading its first chunk
    pub async fn open(&self, content_id: &str, force: bool) -> Result<PlaybackSnapshot, PlayerError> {
        let source = self.inner.fetcher.resolve(content_id, force).await?;
        let total_chunks = source.total_chunks();

        tracing::info!(content_id, total_chunks, "Opening narration");
        *self.inner.source.lock() = Some(source);
        *self.inner.prefetch.lock() = Prefetch::default();

        let _ = self
            .inner
            .event_tx
            .send(PlayerEvent::SourceResolved { total_chunks });
        self.inner.apply(|engine| engine.load_source(total_chunks))?;
        Ok(self.snapshot())
    }

    pub fn play(&self) {
        self.inner.apply_infallible(PlaybackEngine::play);
    }

    pub fn pause(&self) {
        self.inner.apply_infallible(PlaybackEngine::pause);
    }

    /// Seek on the global timeline
    pub fn seek(&self, position: Duration) {
        self.inner.apply_infallible(|engine| engine.seek(position));
    }

    /// Jump ahead on the global timeline, crossing chunks as needed
    pub fn skip_forward(&self, by: Duration) {
        self.inner.apply_infallible(|engine| engine.skip_forward(by));
    }

    /// Jump back on the global timeline, crossing chunks as needed
    pub fn skip_backward(&self, by: Duration) {
        self.inner.apply_infallible(|engine| engine.skip_backward(by));
    }

    /// Reload a chunk that failed
    pub fn retry(&self) {
        self.inner.apply_infallible(PlaybackEngine::retry);
    }

    pub fn stop(&self) {
        self.inner.apply_infallible(PlaybackEngine::stop);
    }
}

impl Drop for ChunkedPlayer {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

impl PlayerInner {
    /// Run one engine operation and execute what it asks for
    fn apply<F>(self: &Arc<Self>, op: F) -> Result<(), PlayerError>
    where
        F: FnOnce(&mut PlaybackEngine) -> Result<Vec<MediaCommand>, PlayerError>,
    {
        let prefetch_from = {
            let mut engine = self.engine.lock();
            let from = engine.state();
            let commands = op(&mut engine)?;
            self.publish(&engine, from, commands)
        };
        if let Some(index) = prefetch_from {
            self.prefetch_after(index);
        }
        Ok(())
    }

    fn apply_infallible<F>(self: &Arc<Self>, op: F)
    where
        F: FnOnce(&mut PlaybackEngine) -> Vec<MediaCommand>,
    {
        let _ = self.apply(|engine| Ok(op(engine)));
    }

    /// Queue the engine's commands and announce its transition
    ///
    /// Must run while the engine lock is held so that command batches reach
    /// the job queue in the order the engine produced them. Returns the chunk
    /// to prefetch after, if any.
    fn publish(
        &self,
        engine: &PlaybackEngine,
        from: PlaybackState,
        commands: Vec<MediaCommand>,
    ) -> Option<usize> {
        for command in commands {
            let _ = self.jobs.send(Job::Command(command));
        }

        let to = engine.state();
        if from == to {
            return None;
        }
        tracing::debug!(?from, ?to, "Playback state changed");
        let _ = self.event_tx.send(PlayerEvent::StateChanged { from, to });

        match to {
            PlaybackState::Ended => {
                let _ = self.event_tx.send(PlayerEvent::Finished);
                None
            }
            PlaybackState::Ready | PlaybackState::Playing => engine.current_handle().map(|h| h.index),
            _ => None,
        }
    }

    fn is_current(&self, handle: ResourceHandle) -> bool {
        self.engine.lock().current_handle() == Some(handle)
    }

    fn chunk_url(&self, index: usize) -> Option<String> {
        match self.source.lock().as_ref()? {
            PlaybackSource::Chunked(manifest) => manifest.chunk_url(index).map(str::to_string),
            PlaybackSource::Single(_) => None,
        }
    }

    /// Fetch (or reuse) the chunk's audio, then queue it for the backend
    fn load(self: &Arc<Self>, handle: ResourceHandle) {
        let ready = match self.source.lock().as_ref() {
            Some(PlaybackSource::Single(chunk)) => Some(chunk.clone()),
            Some(PlaybackSource::Chunked(_)) => self.take_prefetched(handle.index),
            None => None,
        };

        let inner = self.clone();
        tokio::spawn(async move {
            let fetched = match ready {
                Some(chunk) => Ok(chunk),
                None => inner.fetch(handle.index).await,
            };

            match fetched {
                Ok(chunk) => {
                    let _ = inner.jobs.send(Job::Attach(handle, chunk));
                }
                Err(e) => {
                    tracing::warn!(index = handle.index, error = %e, "Chunk fetch failed");
                    let _ = inner
                        .media_tx
                        .send((handle, MediaEvent::Failed(e.failure())));
                }
            }
        });
    }

    async fn fetch(&self, index: usize) -> Result<FetchedChunk, PlayerError> {
        let url = self.chunk_url(index).ok_or(PlayerError::NoSource)?;
        let chunk = self.fetcher.fetch_chunk(&url).await?;
        if chunk.index != index {
            return Err(PlayerError::InvalidResponse(format!(
                "asked for chunk {} but got {}",
                index, chunk.index
            )));
        }
        Ok(chunk)
    }

    fn take_prefetched(&self, index: usize) -> Option<FetchedChunk> {
        let mut prefetch = self.prefetch.lock();
        if prefetch.index != Some(index) {
            return None;
        }
        let chunk = prefetch.chunk.take()?;
        prefetch.index = None;
        tracing::trace!(index, "Using prefetched chunk");
        Some(chunk)
    }

    /// Fetch the chunk after `index` in the background
    fn prefetch_after(self: &Arc<Self>, index: usize) {
        if !self.config.prefetch_next {
            return;
        }
        let next = index + 1;
        if self.chunk_url(next).is_none() {
            return;
        }
        {
            let mut prefetch = self.prefetch.lock();
            if prefetch.index == Some(next) {
                return;
            }
            prefetch.index = Some(next);
            prefetch.chunk = None;
        }

        let inner = self.clone();
        tokio::spawn(async move {
            match inner.fetch(next).await {
                Ok(chunk) => {
                    let mut prefetch = inner.prefetch.lock();
                    if prefetch.index == Some(next) {
                        prefetch.chunk = Some(chunk);
                    }
                }
                Err(e) => {
                    // The regular load will fetch it again
                    tracing::debug!(index = next, error = %e, "Prefetch failed");
                    let mut prefetch = inner.prefetch.lock();
                    if prefetch.index == Some(next) {
                        *prefetch = Prefetch::default();
                    }
                }
            }
        });
    }
}

async fn run_jobs(inner: Arc<PlayerInner>, mut jobs: mpsc::UnboundedReceiver<Job>) {
    while let Some(job) = jobs.recv().await {
        match job {
            Job::Command(MediaCommand::Load(handle)) => inner.load(handle),
            Job::Command(MediaCommand::Teardown(handle)) => inner.backend.teardown(handle).await,
            Job::Command(MediaCommand::Play(handle)) => inner.backend.play(handle).await,
            Job::Command(MediaCommand::Pause(handle)) => inner.backend.pause(handle).await,
            Job::Command(MediaCommand::Seek { handle, offset }) => {
                inner.backend.seek(handle, offset).await
            }
            Job::Attach(handle, chunk) => {
                // Superseded while fetching
                if !inner.is_current(handle) {
                    tracing::trace!(?handle, "Dropping fetched chunk for stale resource");
                    continue;
                }
                inner
                    .backend
                    .load(handle, chunk, inner.media_tx.clone())
                    .await;
            }
        }
    }
}

async fn run_media_events(
    inner: Arc<PlayerInner>,
    mut events: mpsc::UnboundedReceiver<(ResourceHandle, MediaEvent)>,
) {
    while let Some((handle, event)) = events.recv().await {
        let prefetch_from = {
            let mut engine = inner.engine.lock();
            let from = engine.state();
            let stale_before = engine.stale_events();
            let commands = engine.handle_event(handle, event);

            if engine.stale_events() == stale_before {
                if let MediaEvent::Failed(failure) = event {
                    let _ = inner.event_tx.send(PlayerEvent::ChunkFailed {
                        index: handle.index,
                        failure,
                    });
                }
            }
            inner.publish(&engine, from, commands)
        };

        if let Some(index) = prefetch_from {
            inner.prefetch_after(index);
        }
    }
}

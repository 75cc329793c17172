//! Player against a live narration server

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use narrator_config::{PlaybackConfig, Settings};
use narrator_core::ContentRecord;
use narrator_persistence::InMemoryContentStore;
use narrator_pipeline::{wav_duration, RateLimiter, StubProvider};
use narrator_player::{
    ChunkFetcher, ChunkedPlayer, FetchedChunk, HttpChunkFetcher, MediaBackend, MediaEvent,
    MediaEventSender, MediaFailure, PlaybackSource, PlaybackState, PlayerError, PlayerEvent,
    ResourceHandle,
};
use narrator_server::{create_router, AppState};
use parking_lot::Mutex;

const SENTENCE: &str = "Rust audio chunks keep each request below the provider cap.";

fn long_text() -> String {
    let mut parts = vec![SENTENCE; 8];
    parts.push("Thanks for the time.");
    parts.join(" ")
}

/// Start a server on an ephemeral port and return its base URL
async fn spawn_server(provider: StubProvider) -> String {
    let mut settings = Settings::default();
    settings.synthesis.retry.delay_ms = 10;

    let store = InMemoryContentStore::with_records([
        ContentRecord::new("short").with_summary("A short note that fits."),
        ContentRecord::new("long").with_summary(long_text()),
    ]);
    let state = AppState::new(
        settings,
        Arc::new(store),
        Arc::new(provider),
        Arc::new(RateLimiter::disabled()),
    );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = create_router(state);
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

fn fetcher(base_url: &str) -> Arc<HttpChunkFetcher> {
    Arc::new(HttpChunkFetcher::new(base_url, Duration::from_secs(10)).unwrap())
}

/// Probes WAV durations and otherwise waits for the test to script events
#[derive(Default)]
struct ScriptedBackend {
    log: Mutex<Vec<String>>,
    fail_decode: Mutex<Option<usize>>,
    events: Mutex<Option<MediaEventSender>>,
    last_load: Mutex<Option<ResourceHandle>>,
}

impl ScriptedBackend {
    fn fail_decode_of(&self, index: Option<usize>) {
        *self.fail_decode.lock() = index;
    }

    /// Report that the most recently loaded chunk played to its end
    fn finish_current(&self) {
        let handle = *self.last_load.lock();
        if let (Some(handle), Some(tx)) = (handle, self.events.lock().as_ref()) {
            let _ = tx.send((handle, MediaEvent::Ended));
        }
    }

    fn log(&self) -> Vec<String> {
        self.log.lock().clone()
    }
}

#[async_trait]
impl MediaBackend for ScriptedBackend {
    async fn load(&self, handle: ResourceHandle, chunk: FetchedChunk, events: MediaEventSender) {
        self.log.lock().push(format!("load {}", handle.index));
        *self.last_load.lock() = Some(handle);

        let event = match wav_duration(&chunk.bytes) {
            Some(_) if *self.fail_decode.lock() == Some(handle.index) => {
                MediaEvent::Failed(MediaFailure::Decode)
            }
            Some(duration) => MediaEvent::MetadataLoaded { duration },
            None => MediaEvent::Failed(MediaFailure::Decode),
        };
        let _ = events.send((handle, event));
        *self.events.lock() = Some(events);
    }

    async fn play(&self, handle: ResourceHandle) {
        self.log.lock().push(format!("play {}", handle.index));
    }

    async fn pause(&self, handle: ResourceHandle) {
        self.log.lock().push(format!("pause {}", handle.index));
    }

    async fn seek(&self, handle: ResourceHandle, offset: Duration) {
        self.log
            .lock()
            .push(format!("seek {} {}ms", handle.index, offset.as_millis()));
    }

    async fn teardown(&self, handle: ResourceHandle) {
        self.log.lock().push(format!("teardown {}", handle.index));
    }
}

async fn wait_until<F: Fn() -> bool>(condition: F) {
    tokio::time::timeout(Duration::from_secs(10), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

fn approx(actual: Duration, expected_secs: f64) -> bool {
    (actual.as_secs_f64() - expected_secs).abs() < 0.01
}

#[tokio::test]
async fn test_manifest_plays_through_with_seek() {
    let base = spawn_server(StubProvider::new(8000)).await;
    let backend = Arc::new(ScriptedBackend::default());
    let player = ChunkedPlayer::new(fetcher(&base), backend.clone(), PlaybackConfig::default());
    let mut events = player.subscribe();

    let snapshot = player.open("long", false).await.unwrap();
    assert_eq!(snapshot.total_chunks, 3);
    assert_eq!(
        events.recv().await.unwrap(),
        PlayerEvent::SourceResolved { total_chunks: 3 }
    );

    wait_until(|| player.snapshot().state == PlaybackState::Ready).await;
    // The stub speaks 50ms per character: 179 characters
    assert!(approx(player.snapshot().per_chunk_duration[0], 8.95));

    player.play();
    wait_until(|| player.snapshot().state == PlaybackState::Playing).await;

    backend.finish_current();
    wait_until(|| {
        let s = player.snapshot();
        s.current_chunk_index == 1 && s.state == PlaybackState::Playing
    })
    .await;
    assert!(player.snapshot().is_playing);

    // Chunk 2 starts at 17.9s
    player.seek(Duration::from_secs(19));
    wait_until(|| {
        let s = player.snapshot();
        s.current_chunk_index == 2 && s.state == PlaybackState::Playing
    })
    .await;

    let snapshot = player.snapshot();
    assert!(approx(snapshot.position, 19.0));
    assert!(approx(snapshot.total_duration, 8.95 + 8.95 + 7.0));
    assert!(backend.log().iter().any(|l| l.starts_with("seek 2 ")));

    backend.finish_current();
    wait_until(|| player.snapshot().state == PlaybackState::Ended).await;
    assert!(!player.snapshot().is_playing);

    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }
    assert!(seen.contains(&PlayerEvent::Finished));

    // Every load after the first follows a teardown
    let log = backend.log();
    for (i, line) in log.iter().enumerate().skip(1) {
        if line.starts_with("load ") {
            assert!(log[i - 1].starts_with("teardown "), "{:?}", log);
        }
    }
}

#[tokio::test]
async fn test_short_text_plays_as_single_source() {
    let base = spawn_server(StubProvider::new(8000)).await;
    let fetcher = fetcher(&base);

    match fetcher.resolve("short", false).await.unwrap() {
        PlaybackSource::Single(chunk) => {
            assert_eq!(chunk.content_type, "audio/wav");
            assert_eq!(chunk.total_chunks, 1);
        }
        PlaybackSource::Chunked(_) => panic!("short text should not be chunked"),
    }

    let backend = Arc::new(ScriptedBackend::default());
    let player = ChunkedPlayer::new(fetcher, backend.clone(), PlaybackConfig::default());
    player.open("short", false).await.unwrap();
    player.play();
    wait_until(|| player.snapshot().state == PlaybackState::Playing).await;
    assert!(approx(player.snapshot().total_duration, 23.0 * 0.05));

    backend.finish_current();
    wait_until(|| player.snapshot().state == PlaybackState::Ended).await;
}

#[tokio::test]
async fn test_failed_synthesis_served_as_silence() {
    let base = spawn_server(StubProvider::new(8000).failing_on(["Thanks"])).await;
    let fetcher = fetcher(&base);

    let manifest = match fetcher.resolve("long", false).await.unwrap() {
        PlaybackSource::Chunked(manifest) => manifest,
        PlaybackSource::Single(_) => panic!("expected a manifest"),
    };

    let last = fetcher.fetch_chunk(&manifest.chunk_urls[2]).await.unwrap();
    assert!(last.fallback);
    assert_eq!(last.index, 2);
    assert_eq!(wav_duration(&last.bytes), Some(Duration::from_millis(500)));

    let middle = fetcher.fetch_chunk(&manifest.chunk_urls[1]).await.unwrap();
    assert!(!middle.fallback);
    assert_eq!(middle.total_chunks, 3);
}

#[tokio::test]
async fn test_decode_failure_isolated_and_retried() {
    let base = spawn_server(StubProvider::new(8000)).await;
    let backend = Arc::new(ScriptedBackend::default());
    let player = ChunkedPlayer::new(fetcher(&base), backend.clone(), PlaybackConfig::default());

    backend.fail_decode_of(Some(1));
    player.open("long", false).await.unwrap();
    player.play();
    wait_until(|| player.snapshot().state == PlaybackState::Playing).await;

    backend.finish_current();
    wait_until(|| player.snapshot().state == PlaybackState::Error(1)).await;

    let snapshot = player.snapshot();
    assert_eq!(snapshot.error.as_deref(), Some(MediaFailure::Decode.user_message()));
    assert!(approx(snapshot.per_chunk_duration[0], 8.95));

    backend.fail_decode_of(None);
    player.retry();
    wait_until(|| player.snapshot().state == PlaybackState::Playing).await;
    assert_eq!(player.snapshot().current_chunk_index, 1);
    assert!(player.snapshot().error.is_none());
}

#[tokio::test]
async fn test_unknown_content_reported() {
    let base = spawn_server(StubProvider::new(8000)).await;
    let backend = Arc::new(ScriptedBackend::default());
    let player = ChunkedPlayer::new(fetcher(&base), backend, PlaybackConfig::default());

    match player.open("missing", false).await {
        Err(PlayerError::Status { status, message }) => {
            assert_eq!(status, 404);
            assert!(message.contains("missing"));
        }
        other => panic!("expected 404, got {:?}", other.map(|s| s.state)),
    }
    assert_eq!(player.snapshot().state, PlaybackState::Idle);
}

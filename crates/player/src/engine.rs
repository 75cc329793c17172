//! Playback state machine
//!
//! Presents N separately loaded audio chunks as one player. The engine never
//! touches a media API: it consumes named signals (user actions and
//! [`MediaEvent`]s from a backend) and answers with [`MediaCommand`]s for the
//! driver to execute.
//!
//! Every chunk switch tears down the old resource before loading the new one,
//! and every resource carries a generation number. Events from a resource that
//! is no longer current are dropped and counted, never applied.

use std::collections::BTreeMap;
use std::time::Duration;

use narrator_config::PlaybackConfig;

use crate::error::{MediaFailure, PlayerError};
use crate::timeline::Timeline;

/// Placeholder used when the configured estimate is unusable
const FALLBACK_PLACEHOLDER: Duration = Duration::from_secs(12);

/// Player state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    /// No source loaded
    Idle,
    /// Chunk `i` is being fetched and probed
    Loading(usize),
    /// Current chunk loaded, not playing
    Ready,
    Playing,
    Paused,
    /// Last chunk finished
    Ended,
    /// Chunk `i` failed to load or play
    Error(usize),
}

/// Identity of one loaded media resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResourceHandle {
    pub index: usize,
    pub generation: u64,
}

/// Instruction for the media backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaCommand {
    /// Fetch and load the chunk named by the handle
    Load(ResourceHandle),
    /// Stop and release a resource
    Teardown(ResourceHandle),
    Play(ResourceHandle),
    Pause(ResourceHandle),
    /// Move within the loaded chunk
    Seek { handle: ResourceHandle, offset: Duration },
}

impl MediaCommand {
    pub fn handle(&self) -> ResourceHandle {
        match self {
            MediaCommand::Load(h)
            | MediaCommand::Teardown(h)
            | MediaCommand::Play(h)
            | MediaCommand::Pause(h)
            | MediaCommand::Seek { handle: h, .. } => *h,
        }
    }
}

/// Signal reported by the media backend for one resource
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaEvent {
    /// The chunk is decoded and its duration known
    MetadataLoaded { duration: Duration },
    /// Playback position within the chunk
    TimeUpdate { position: Duration },
    /// The chunk played to its end
    Ended,
    Failed(MediaFailure),
}

/// Everything a UI needs to render the player
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackSnapshot {
    pub state: PlaybackState,
    pub current_chunk_index: usize,
    pub total_chunks: usize,
    /// Probed durations, with the placeholder for chunks not yet loaded
    pub per_chunk_duration: Vec<Duration>,
    /// Start of the current chunk on the global timeline
    pub cumulative_offset: Duration,
    /// Position on the global timeline
    pub position: Duration,
    pub total_duration: Duration,
    pub is_playing: bool,
    pub is_seekable: bool,
    /// User-facing message for the current chunk's failure
    pub error: Option<String>,
}

/// Chunked playback state machine
#[derive(Debug)]
pub struct PlaybackEngine {
    placeholder: Duration,
    max_auto_retries: u32,
    state: PlaybackState,
    timeline: Timeline,
    current: Option<ResourceHandle>,
    next_generation: u64,
    /// Position within the current chunk
    chunk_position: Duration,
    /// Playback should run whenever the current chunk is ready
    wants_play: bool,
    /// Offset to apply once the current chunk has loaded
    pending_seek: Option<Duration>,
    errors: BTreeMap<usize, MediaFailure>,
    auto_retries: u32,
    stale_events: u64,
}

impl PlaybackEngine {
    pub fn new(config: &PlaybackConfig) -> Self {
        let placeholder = Duration::try_from_secs_f64(config.placeholder_chunk_secs)
            .ok()
            .filter(|d| !d.is_zero())
            .unwrap_or(FALLBACK_PLACEHOLDER);

        Self {
            placeholder,
            max_auto_retries: config.max_auto_retries,
            state: PlaybackState::Idle,
            timeline: Timeline::new(0, placeholder),
            current: None,
            next_generation: 0,
            chunk_position: Duration::ZERO,
            wants_play: false,
            pending_seek: None,
            errors: BTreeMap::new(),
            auto_retries: 0,
            stale_events: 0,
        }
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn current_handle(&self) -> Option<ResourceHandle> {
        self.current
    }

    pub fn total_chunks(&self) -> usize {
        self.timeline.len()
    }

    pub fn timeline(&self) -> &Timeline {
        &self.timeline
    }

    /// Events discarded because their resource was no longer current
    pub fn stale_events(&self) -> u64 {
        self.stale_events
    }

    /// Automatic retries spent since the source was loaded
    pub fn auto_retries(&self) -> u32 {
        self.auto_retries
    }

    pub fn chunk_failure(&self, index: usize) -> Option<MediaFailure> {
        self.errors.get(&index).copied()
    }

    /// User-facing message for the current chunk's failure
    pub fn error(&self) -> Option<String> {
        match self.state {
            PlaybackState::Error(index) => self
                .errors
                .get(&index)
                .map(|f| f.user_message().to_string()),
            _ => None,
        }
    }

    pub fn is_playing(&self) -> bool {
        self.wants_play
            && matches!(
                self.state,
                PlaybackState::Playing | PlaybackState::Loading(_) | PlaybackState::Ready
            )
    }

    fn is_loaded(&self) -> bool {
        matches!(
            self.state,
            PlaybackState::Ready | PlaybackState::Playing | PlaybackState::Paused | PlaybackState::Ended
        )
    }

    /// Start a new source of `total_chunks` chunks at the beginning
    pub fn load_source(&mut self, total_chunks: usize) -> Result<Vec<MediaCommand>, PlayerError> {
        if total_chunks == 0 {
            return Err(PlayerError::NoSource);
        }

        let mut commands = Vec::new();
        if let Some(old) = self.current.take() {
            commands.push(MediaCommand::Teardown(old));
        }

        self.timeline = Timeline::new(total_chunks, self.placeholder);
        self.errors.clear();
        self.auto_retries = 0;
        self.wants_play = false;

        tracing::debug!(total_chunks, "Loading playback source");
        commands.extend(self.switch_to(0, None));
        Ok(commands)
    }

    /// Release the current resource and return to idle
    pub fn stop(&mut self) -> Vec<MediaCommand> {
        self.state = PlaybackState::Idle;
        self.wants_play = false;
        self.pending_seek = None;
        self.chunk_position = Duration::ZERO;
        self.current
            .take()
            .map(MediaCommand::Teardown)
            .into_iter()
            .collect()
    }

    pub fn play(&mut self) -> Vec<MediaCommand> {
        match self.state {
            PlaybackState::Idle => Vec::new(),
            PlaybackState::Loading(_) | PlaybackState::Error(_) => {
                // Starts once the chunk is ready
                self.wants_play = true;
                Vec::new()
            }
            PlaybackState::Ready | PlaybackState::Paused => {
                self.wants_play = true;
                self.state = PlaybackState::Playing;
                self.current.map(MediaCommand::Play).into_iter().collect()
            }
            PlaybackState::Playing => Vec::new(),
            PlaybackState::Ended => {
                self.wants_play = true;
                self.switch_to(0, None)
            }
        }
    }

    pub fn pause(&mut self) -> Vec<MediaCommand> {
        self.wants_play = false;
        match self.state {
            PlaybackState::Playing => {
                self.state = PlaybackState::Paused;
                self.current.map(MediaCommand::Pause).into_iter().collect()
            }
            _ => Vec::new(),
        }
    }

    /// Move to a position on the global timeline
    ///
    /// Within the loaded chunk this is a plain seek. Otherwise the owning
    /// chunk is loaded first and the offset applied once its real duration
    /// is known. A newer seek replaces any offset still pending.
    pub fn seek(&mut self, target: Duration) -> Vec<MediaCommand> {
        let Some(current) = self.current else {
            return Vec::new();
        };
        let Some((index, offset)) = self.timeline.locate(target) else {
            return Vec::new();
        };

        if index != current.index {
            tracing::debug!(from = current.index, to = index, ?offset, "Seek crosses chunks");
            return self.switch_to(index, Some(offset));
        }

        match self.state {
            PlaybackState::Loading(_) | PlaybackState::Error(_) => {
                self.pending_seek = Some(offset);
                Vec::new()
            }
            _ if self.is_loaded() => {
                let offset = offset.min(self.timeline.duration(index));
                self.pending_seek = None;
                self.chunk_position = offset;
                if self.state == PlaybackState::Ended {
                    self.state = PlaybackState::Paused;
                }
                vec![MediaCommand::Seek {
                    handle: current,
                    offset,
                }]
            }
            _ => Vec::new(),
        }
    }

    /// Jump ahead of the current position, stopping at the end
    pub fn skip_forward(&mut self, by: Duration) -> Vec<MediaCommand> {
        let target = self.position().saturating_add(by).min(self.timeline.total());
        self.seek(target)
    }

    /// Jump back from the current position, stopping at the start
    pub fn skip_backward(&mut self, by: Duration) -> Vec<MediaCommand> {
        let target = self.position().saturating_sub(by);
        self.seek(target)
    }

    /// Position on the global timeline
    fn position(&self) -> Duration {
        let index = self.current.map(|h| h.index).unwrap_or(0);
        self.timeline.offset_of(index) + self.chunk_position
    }

    /// Reload the failed chunk
    pub fn retry(&mut self) -> Vec<MediaCommand> {
        match self.state {
            PlaybackState::Error(index) => {
                tracing::info!(index, "Retrying chunk");
                self.errors.remove(&index);
                let seek = self.pending_seek.take();
                self.switch_to(index, seek)
            }
            _ => Vec::new(),
        }
    }

    /// Apply an event reported for `handle`
    pub fn handle_event(&mut self, handle: ResourceHandle, event: MediaEvent) -> Vec<MediaCommand> {
        if self.current != Some(handle) {
            self.stale_events += 1;
            tracing::trace!(?handle, ?event, "Discarding event from stale resource");
            return Vec::new();
        }

        match event {
            MediaEvent::MetadataLoaded { duration } => self.on_metadata(handle, duration),
            MediaEvent::TimeUpdate { position } => {
                if self.is_loaded() {
                    self.chunk_position = position.min(self.timeline.duration(handle.index));
                }
                Vec::new()
            }
            MediaEvent::Ended => self.on_ended(handle),
            MediaEvent::Failed(failure) => self.on_failed(handle, failure),
        }
    }

    fn on_metadata(&mut self, handle: ResourceHandle, duration: Duration) -> Vec<MediaCommand> {
        self.timeline.set_duration(handle.index, duration);
        if self.state != PlaybackState::Loading(handle.index) {
            return Vec::new();
        }

        self.errors.remove(&handle.index);
        self.state = PlaybackState::Ready;

        let mut commands = Vec::new();
        if let Some(offset) = self.pending_seek.take() {
            let offset = offset.min(duration);
            self.chunk_position = offset;
            if !offset.is_zero() {
                commands.push(MediaCommand::Seek { handle, offset });
            }
        }
        if self.wants_play {
            self.state = PlaybackState::Playing;
            commands.push(MediaCommand::Play(handle));
        }
        commands
    }

    fn on_ended(&mut self, handle: ResourceHandle) -> Vec<MediaCommand> {
        // Only a playing chunk advances
        if self.state != PlaybackState::Playing {
            tracing::trace!(?handle, state = ?self.state, "Ignoring end of chunk outside playback");
            return Vec::new();
        }

        let next = handle.index + 1;
        if next < self.total_chunks() {
            tracing::debug!(from = handle.index, to = next, "Advancing to next chunk");
            self.switch_to(next, None)
        } else {
            self.state = PlaybackState::Ended;
            self.wants_play = false;
            self.chunk_position = self.timeline.duration(handle.index);
            Vec::new()
        }
    }

    fn on_failed(&mut self, handle: ResourceHandle, failure: MediaFailure) -> Vec<MediaCommand> {
        let index = handle.index;
        self.errors.insert(index, failure);
        self.state = PlaybackState::Error(index);

        if failure.is_transient() && self.auto_retries < self.max_auto_retries {
            self.auto_retries += 1;
            tracing::warn!(
                index,
                %failure,
                attempt = self.auto_retries,
                max = self.max_auto_retries,
                "Chunk failed, retrying automatically"
            );
            let seek = self.pending_seek.take();
            return self.switch_to(index, seek);
        }

        tracing::warn!(index, %failure, "Chunk failed");
        Vec::new()
    }

    /// Tear down the current resource and load chunk `index`
    fn switch_to(&mut self, index: usize, seek: Option<Duration>) -> Vec<MediaCommand> {
        let mut commands = Vec::with_capacity(2);
        if let Some(old) = self.current.take() {
            commands.push(MediaCommand::Teardown(old));
        }

        let handle = ResourceHandle {
            index,
            generation: self.next_generation,
        };
        self.next_generation += 1;

        self.current = Some(handle);
        self.state = PlaybackState::Loading(index);
        self.pending_seek = seek;
        self.chunk_position = seek.unwrap_or(Duration::ZERO);
        commands.push(MediaCommand::Load(handle));
        commands
    }

    pub fn snapshot(&self) -> PlaybackSnapshot {
        let current_chunk_index = self.current.map(|h| h.index).unwrap_or(0);
        let cumulative_offset = self.timeline.offset_of(current_chunk_index);

        PlaybackSnapshot {
            state: self.state,
            current_chunk_index,
            total_chunks: self.total_chunks(),
            per_chunk_duration: self.timeline.durations(),
            cumulative_offset,
            position: cumulative_offset + self.chunk_position,
            total_duration: self.timeline.total(),
            is_playing: self.is_playing(),
            is_seekable: self.current.is_some(),
            error: self.error(),
        }
    }
}

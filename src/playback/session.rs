//! Playback session lifecycle
//!
//! [`Player`] is the single mount point: it owns at most one
//! [`PlaybackSession`] and the teardown handles of engines it released.
//! A new engine is only initialized after every earlier teardown completed.
//! All timers (retry backoff, buffer sampling) are deadlines checked from
//! [`Player::tick`], which the UI calls once per frame.

use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use super::classify::{classify, StreamKind};
use super::dependency::{DependencyState, LazyDependency};
use super::engine::{
    BufferingConfig, Capabilities, Engine, EngineEvent, EngineKind, EngineProvider, LaunchRequest,
    StreamQuality, Teardown, VideoFrame,
};
use super::error::{EngineError, ErrorClass, PlaybackError};
use super::retry::{RetryController, RetryPolicy};
use super::selector::{EngineChoice, EngineOverride, EngineTable};
use super::status::{project, ProjectionInput, SessionState, StreamMetrics, StreamStatus};
use crate::models::{Channel, PlayerSettings};

/// Teardowns still pending after this long are abandoned
const TEARDOWN_GRACE: Duration = Duration::from_secs(5);
pub const BUFFER_SAMPLE_INTERVAL: Duration = Duration::from_secs(1);

/// Policy knobs read when a session starts
#[derive(Debug, Clone)]
pub struct PlayerOptions {
    pub table: EngineTable,
    pub retry: RetryPolicy,
    pub buffering: BufferingConfig,
    pub quality: StreamQuality,
    pub user_agent: Option<String>,
    pub hw_accel: bool,
}

impl Default for PlayerOptions {
    fn default() -> Self {
        Self {
            table: EngineTable::default(),
            retry: RetryPolicy::default(),
            buffering: BufferingConfig::default(),
            quality: StreamQuality::Auto,
            user_agent: None,
            hw_accel: true,
        }
    }
}

/// Noteworthy lifecycle events surfaced to the UI
#[derive(Debug, Clone, PartialEq)]
pub enum PlayerNotice {
    Started {
        channel: String,
        engine: EngineKind,
        stream_kind: StreamKind,
    },
    RetryScheduled {
        attempt: u32,
        max_retries: u32,
        delay: Duration,
    },
    RetriesExhausted {
        channel: String,
    },
    ChannelEnded {
        channel: String,
    },
    EngineUnavailable {
        engine: EngineKind,
        reason: String,
        fallback: Option<EngineKind>,
    },
}

/// One attempt to play one channel through one engine
pub struct PlaybackSession {
    channel: Channel,
    stream_kind: StreamKind,
    choice: EngineChoice,
    state: SessionState,
    retry: RetryController,
    error: Option<PlaybackError>,
    metrics: StreamMetrics,
    buffering: bool,
    engine: Option<Box<dyn Engine>>,
    dependency: LazyDependency,
    pending_init: bool,
    next_buffer_sample: Option<Instant>,
}

/// Output side of session updates
struct Effects<'a> {
    teardowns: &'a mut Vec<Teardown>,
    notices: &'a mut Vec<PlayerNotice>,
}

impl PlaybackSession {
    fn new(
        channel: Channel,
        stream_kind: StreamKind,
        choice: EngineChoice,
        policy: RetryPolicy,
        dependency: LazyDependency,
    ) -> Self {
        Self {
            channel,
            stream_kind,
            choice,
            state: SessionState::Idle,
            retry: RetryController::new(policy),
            error: None,
            metrics: StreamMetrics::default(),
            buffering: false,
            engine: None,
            dependency,
            pending_init: true,
            next_buffer_sample: None,
        }
    }

    pub fn channel(&self) -> &Channel {
        &self.channel
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn stream_kind(&self) -> StreamKind {
        self.stream_kind
    }

    pub fn choice(&self) -> EngineChoice {
        self.choice
    }

    pub fn retry_attempts(&self) -> u32 {
        self.retry.attempts()
    }

    pub fn error(&self) -> Option<&PlaybackError> {
        self.error.as_ref()
    }

    pub fn metrics(&self) -> &StreamMetrics {
        &self.metrics
    }

    fn transition(&mut self, next: SessionState) -> bool {
        if self.state == next {
            return true;
        }
        if !self.state.can_transition_to(next) {
            debug!(from = ?self.state, to = ?next, channel = %self.channel.name, "ignoring invalid transition");
            return false;
        }
        debug!(from = ?self.state, to = ?next, channel = %self.channel.name, "session transition");
        self.state = next;
        true
    }

    fn release_engine(&mut self, fx: &mut Effects<'_>) {
        self.next_buffer_sample = None;
        self.buffering = false;
        if let Some(engine) = self.engine.take() {
            debug!(engine = ?engine.kind(), channel = %self.channel.name, "releasing engine");
            fx.teardowns.push(engine.destroy());
        }
    }

    fn apply(&mut self, event: EngineEvent, now: Instant, fx: &mut Effects<'_>) {
        match event {
            EngineEvent::Ready => {
                self.transition(SessionState::Ready);
            }
            EngineEvent::Playing => {
                if self.transition(SessionState::Playing) {
                    self.error = None;
                    self.buffering = false;
                    self.next_buffer_sample = Some(now);
                }
            }
            EngineEvent::Paused => {
                if self.transition(SessionState::Paused) {
                    self.buffering = false;
                    self.next_buffer_sample = None;
                }
            }
            EngineEvent::Buffering(buffering) => {
                self.buffering = buffering;
            }
            EngineEvent::Ended => {
                if self.transition(SessionState::Ended) {
                    self.buffering = false;
                    self.next_buffer_sample = None;
                    info!(channel = %self.channel.name, "stream ended");
                    fx.notices.push(PlayerNotice::ChannelEnded {
                        channel: self.channel.name.clone(),
                    });
                }
            }
            EngineEvent::Metrics(update) => {
                self.metrics.merge(&update);
            }
            EngineEvent::Error { message, fatal } => {
                if fatal {
                    warn!(channel = %self.channel.name, %message, "fatal engine error");
                    self.fail(PlaybackError::from_engine(&message), now, fx);
                } else {
                    debug!(channel = %self.channel.name, %message, "non-fatal engine error");
                }
            }
        }
    }

    /// Enter `Error`, release the engine and schedule a retry when the class allows it
    fn fail(&mut self, error: PlaybackError, now: Instant, fx: &mut Effects<'_>) {
        if !self.transition(SessionState::Error) {
            return;
        }
        self.release_engine(fx);

        if !error.is_retryable() {
            info!(channel = %self.channel.name, class = %error.class, error = %error, "playback failed");
            self.error = Some(error);
            return;
        }

        match self.retry.schedule(now) {
            Some(scheduled) => {
                let max_retries = self.retry.policy().max_retries;
                info!(
                    channel = %self.channel.name,
                    attempt = scheduled.attempt,
                    max_retries,
                    delay_ms = scheduled.delay.as_millis() as u64,
                    "scheduling retry"
                );
                self.error = Some(PlaybackError::new(
                    error.class,
                    format!("{} (Retry {}/{})", error.message, scheduled.attempt, max_retries),
                ));
                fx.notices.push(PlayerNotice::RetryScheduled {
                    attempt: scheduled.attempt,
                    max_retries,
                    delay: scheduled.delay,
                });
            }
            None => {
                warn!(channel = %self.channel.name, attempts = self.retry.attempts(), "retry budget exhausted");
                self.error = Some(PlaybackError::retries_exhausted());
                fx.notices.push(PlayerNotice::RetriesExhausted {
                    channel: self.channel.name.clone(),
                });
            }
        }
    }

    fn status(&self) -> StreamStatus {
        project(ProjectionInput {
            state: self.state,
            engine: self.choice.engine,
            stream_kind: self.stream_kind,
            buffering: self.buffering || self.pending_init,
            error: self.error.as_ref().map(|e| e.message.as_str()),
            metrics: &self.metrics,
            retry_attempt: self.retry.attempts(),
            max_retries: self.retry.policy().max_retries,
            retry_pending: self.retry.pending_deadline().is_some(),
        })
    }
}

/// The playback surface. Owns at most one live engine at a time.
pub struct Player<P: EngineProvider> {
    provider: P,
    options: PlayerOptions,
    settings: PlayerSettings,
    engine_override: EngineOverride,
    session: Option<PlaybackSession>,
    teardowns: Vec<Teardown>,
    notices: Vec<PlayerNotice>,
}

impl<P: EngineProvider> Player<P> {
    pub fn new(
        provider: P,
        options: PlayerOptions,
        settings: PlayerSettings,
        engine_override: EngineOverride,
    ) -> Self {
        Self {
            provider,
            options,
            settings,
            engine_override,
            session: None,
            teardowns: Vec::new(),
            notices: Vec::new(),
        }
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn settings(&self) -> &PlayerSettings {
        &self.settings
    }

    pub fn options(&self) -> &PlayerOptions {
        &self.options
    }

    pub fn engine_override(&self) -> EngineOverride {
        self.engine_override
    }

    pub fn session(&self) -> Option<&PlaybackSession> {
        self.session.as_ref()
    }

    pub fn current_channel(&self) -> Option<&Channel> {
        self.session.as_ref().map(|s| &s.channel)
    }

    /// Number of engines released but not yet confirmed gone
    pub fn pending_teardowns(&self) -> usize {
        self.teardowns.len()
    }

    pub fn status(&self) -> StreamStatus {
        self.session
            .as_ref()
            .map(PlaybackSession::status)
            .unwrap_or_else(StreamStatus::idle)
    }

    /// Commands the live engine honours; nothing while no engine runs
    pub fn capabilities(&self) -> Capabilities {
        self.session
            .as_ref()
            .and_then(|s| s.engine.as_ref())
            .map(|engine| engine.capabilities())
            .unwrap_or(Capabilities::NONE)
    }

    /// Playhead reported by the engine, when it reports one
    pub fn position(&self) -> Option<Duration> {
        self.session
            .as_ref()
            .and_then(|s| s.engine.as_ref())
            .and_then(|engine| engine.position())
    }

    /// Tear down the current session and start a fresh one for `channel`
    pub fn select_channel(&mut self, channel: Channel, now: Instant) {
        info!(channel = %channel.name, url = %channel.url, "channel selected");
        self.release();
        let session = self.open_session(channel);
        self.session = Some(session);
        self.start_pending(now);
    }

    /// Change the engine choice. An active session is rebuilt immediately.
    pub fn set_engine_override(&mut self, choice: EngineOverride, now: Instant) {
        if choice == self.engine_override {
            return;
        }
        info!(from = %self.engine_override, to = %choice, "engine override changed");
        self.engine_override = choice;

        if let Some(channel) = self.session.as_ref().map(|s| s.channel.clone()) {
            self.release();
            let session = self.open_session(channel);
            self.session = Some(session);
            self.start_pending(now);
        }
    }

    /// Pick another variant policy. An active session restarts with it.
    pub fn set_quality(&mut self, quality: StreamQuality, now: Instant) {
        if quality == self.options.quality {
            return;
        }
        info!(quality = quality.label(), "stream quality changed");
        self.options.quality = quality;

        if let Some(channel) = self.session.as_ref().map(|s| s.channel.clone()) {
            self.release();
            let session = self.open_session(channel);
            self.session = Some(session);
            self.start_pending(now);
        }
    }

    /// Replace policy knobs; they apply from the next initialization on
    pub fn set_options(&mut self, options: PlayerOptions) {
        self.options = options;
    }

    /// New buffering knobs; the running engine keeps its own until the next initialization
    pub fn update_buffering(&mut self, buffering: BufferingConfig) {
        debug!(cache_secs = buffering.cache_secs, "buffering updated");
        self.options.buffering = buffering;
    }

    /// User-triggered retry. Only meaningful after an error; never bounded.
    ///
    /// A pending automatic retry is fired early instead of counted twice. After a
    /// load failure the engine dependency is checked again.
    pub fn retry(&mut self, now: Instant) -> bool {
        let Some(session) = self.session.as_mut() else {
            return false;
        };
        if session.state != SessionState::Error {
            debug!(state = ?session.state, "manual retry ignored outside error state");
            return false;
        }
        let attempt = if session.retry.take_pending() {
            session.retry.attempts()
        } else {
            session.retry.record_manual()
        };
        if session.error.as_ref().is_some_and(|e| e.class == ErrorClass::Load)
            && session.dependency.reset_failed()
        {
            debug!(dependency = session.dependency.name(), "checking engine dependency again");
        }
        info!(channel = %session.channel.name, attempt, "manual retry");
        session.pending_init = true;
        self.start_pending(now);
        true
    }

    pub fn play(&mut self) {
        if self.capabilities().pause {
            self.with_engine("play", |engine| engine.play());
        }
    }

    pub fn pause(&mut self) {
        if self.capabilities().pause {
            self.with_engine("pause", |engine| engine.pause());
        }
    }

    pub fn toggle_pause(&mut self) {
        match self.session.as_ref().map(|s| s.state) {
            Some(SessionState::Playing) => self.pause(),
            Some(SessionState::Paused | SessionState::Ready) => self.play(),
            _ => {}
        }
    }

    pub fn seek(&mut self, position: Duration) {
        if self.capabilities().seek {
            self.with_engine("seek", |engine| engine.seek(position));
        }
    }

    /// Stored for the next launch; forwarded when the engine controls volume
    pub fn set_volume(&mut self, volume: f32) {
        self.settings.volume = volume.clamp(0.0, 1.0);
        self.apply_volume();
    }

    pub fn toggle_mute(&mut self) {
        self.settings.muted = !self.settings.muted;
        self.apply_volume();
    }

    fn apply_volume(&mut self) {
        if self.capabilities().volume {
            let (volume, muted) = (self.settings.volume, self.settings.muted);
            self.with_engine("set_volume", |engine| engine.set_volume(volume, muted));
        }
    }

    pub fn set_fullscreen(&mut self, fullscreen: bool) {
        self.settings.fullscreen = fullscreen;
    }

    pub fn set_picture_in_picture(&mut self, enabled: bool) {
        self.settings.picture_in_picture = enabled;
    }

    pub fn set_autoplay(&mut self, autoplay: bool) {
        self.settings.autoplay = autoplay;
    }

    pub fn take_frame(&mut self) -> Option<VideoFrame> {
        self.session
            .as_mut()
            .and_then(|s| s.engine.as_mut())
            .and_then(|engine| engine.take_frame())
    }

    /// Advance timers and drain engine events. Returns notices raised since the last tick.
    pub fn tick(&mut self, now: Instant) -> Vec<PlayerNotice> {
        self.start_pending(now);

        let Self {
            session,
            teardowns,
            notices,
            ..
        } = self;
        if let Some(session) = session.as_mut() {
            let mut fx = Effects {
                teardowns,
                notices,
            };

            let events = session
                .engine
                .as_mut()
                .map(|engine| engine.poll_events())
                .unwrap_or_default();
            for event in events {
                session.apply(event, now, &mut fx);
            }

            if session.state == SessionState::Error && session.retry.take_due(now) {
                debug!(channel = %session.channel.name, attempt = session.retry.attempts(), "retry timer fired");
                session.pending_init = true;
            }

            if session.state == SessionState::Playing {
                if let Some(due) = session.next_buffer_sample {
                    if now >= due {
                        if let Some(seconds) = session.engine.as_ref().and_then(|e| e.buffered_ahead()) {
                            session.metrics.buffer_seconds = Some(seconds);
                        }
                        session.next_buffer_sample = Some(now + BUFFER_SAMPLE_INTERVAL);
                    }
                }
            }
        }

        if self.session.as_ref().is_some_and(|s| s.pending_init) {
            self.start_pending(now);
        }

        std::mem::take(&mut self.notices)
    }

    /// Release the current session and cancel its timers
    pub fn shutdown(&mut self) {
        self.release();
    }

    fn with_engine<F>(&mut self, operation: &'static str, f: F)
    where
        F: FnOnce(&mut Box<dyn Engine>) -> Result<(), EngineError>,
    {
        let Some(engine) = self.session.as_mut().and_then(|s| s.engine.as_mut()) else {
            debug!(operation, "no active engine");
            return;
        };
        if let Err(e) = f(engine) {
            warn!(operation, error = %e, "engine command failed");
        }
    }

    fn open_session(&self, channel: Channel) -> PlaybackSession {
        let stream_kind = classify(&channel.url);
        let choice = self.options.table.select(stream_kind, self.engine_override);
        let dependency = self.provider.dependency(choice.engine);
        debug!(
            channel = %channel.name,
            stream_kind = ?stream_kind,
            engine = ?choice.engine,
            overridden = choice.overridden,
            "engine selected"
        );
        PlaybackSession::new(channel, stream_kind, choice, self.options.retry, dependency)
    }

    fn release(&mut self) {
        if let Some(mut session) = self.session.take() {
            session.retry.cancel();
            session.pending_init = false;
            let mut fx = Effects {
                teardowns: &mut self.teardowns,
                notices: &mut self.notices,
            };
            session.release_engine(&mut fx);
        }
    }

    fn teardowns_complete(&mut self, now: Instant) -> bool {
        self.teardowns.retain_mut(|teardown| {
            if teardown.is_complete() {
                false
            } else if teardown.age(now) > TEARDOWN_GRACE {
                warn!("engine teardown did not complete in time, continuing");
                false
            } else {
                true
            }
        });
        self.teardowns.is_empty()
    }

    fn launch_request(&self, session: &PlaybackSession) -> LaunchRequest {
        LaunchRequest {
            channel_name: session.channel.name.clone(),
            url: session.channel.url.clone(),
            stream_kind: session.stream_kind,
            autoplay: self.settings.autoplay,
            volume: self.settings.volume,
            muted: self.settings.muted,
            fullscreen: self.settings.fullscreen,
            picture_in_picture: self.settings.picture_in_picture,
            buffering: self.options.buffering.clone(),
            quality: self.options.quality,
            user_agent: self.options.user_agent.clone(),
            hw_accel: self.options.hw_accel,
        }
    }

    /// Initialize the session's engine once teardowns and the dependency allow it
    fn start_pending(&mut self, now: Instant) {
        if !self.session.as_ref().is_some_and(|s| s.pending_init) {
            return;
        }
        if !self.teardowns_complete(now) {
            return;
        }

        let dependency_state = match self.session.as_ref() {
            Some(session) => session.dependency.request(),
            None => return,
        };
        if matches!(dependency_state, DependencyState::NotRequested | DependencyState::Loading) {
            return;
        }

        let request = match self.session.as_ref() {
            Some(session) => self.launch_request(session),
            None => return,
        };
        let engine_kind = match self.session.as_ref() {
            Some(session) => session.choice.engine,
            None => return,
        };
        let engine = match dependency_state {
            DependencyState::Ready if engine_kind.supports(request.stream_kind) => {
                Some(self.provider.create(engine_kind))
            }
            _ => None,
        };

        let Self {
            session,
            teardowns,
            notices,
            ..
        } = self;
        let Some(session) = session.as_mut() else {
            return;
        };
        let mut fx = Effects {
            teardowns,
            notices,
        };

        if !session.transition(SessionState::Initializing) {
            session.pending_init = false;
            return;
        }
        session.pending_init = false;
        session.error = None;
        session.buffering = false;
        session.metrics = StreamMetrics::default();

        if let DependencyState::Failed(reason) = dependency_state {
            fx.notices.push(PlayerNotice::EngineUnavailable {
                engine: engine_kind,
                reason: reason.clone(),
                fallback: session.choice.fallback,
            });
            session.fail(PlaybackError::unavailable(engine_kind, &reason), now, &mut fx);
            return;
        }

        let Some(mut engine) = engine else {
            let error = PlaybackError::new(
                ErrorClass::Format,
                format!("{} streams require special player support", request.stream_kind.label()),
            );
            session.fail(error, now, &mut fx);
            return;
        };

        info!(
            channel = %request.channel_name,
            engine = ?engine_kind,
            stream_kind = ?request.stream_kind,
            attempt = session.retry.attempts(),
            "initializing engine"
        );
        match engine.init(&request) {
            Ok(()) => {
                session.engine = Some(engine);
                fx.notices.push(PlayerNotice::Started {
                    channel: request.channel_name,
                    engine: engine_kind,
                    stream_kind: request.stream_kind,
                });
            }
            Err(e) => {
                warn!(engine = ?engine_kind, error = %e, "engine initialization failed");
                fx.teardowns.push(engine.destroy());
                session.fail(e.into(), now, &mut fx);
            }
        }
    }
}

impl<P: EngineProvider> Drop for Player<P> {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod session_tests;

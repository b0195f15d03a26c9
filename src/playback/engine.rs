//! Engine capability interface
//!
//! Every playback backend (the built-in FFmpeg decoder or an external player
//! process) is driven through [`Engine`]. Sessions never look past this trait.

use std::sync::mpsc::{channel, Receiver, Sender, TryRecvError};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use super::classify::StreamKind;
use super::dependency::LazyDependency;
use super::error::EngineError;

/// Playback backends known to the player
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    Internal,
    Mpv,
    Vlc,
    Ffplay,
}

impl EngineKind {
    pub const ALL: [EngineKind; 4] = [
        EngineKind::Internal,
        EngineKind::Mpv,
        EngineKind::Vlc,
        EngineKind::Ffplay,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            EngineKind::Internal => "Internal",
            EngineKind::Mpv => "mpv",
            EngineKind::Vlc => "VLC",
            EngineKind::Ffplay => "ffplay",
        }
    }

    /// Default executable name for external engines
    pub fn program(&self) -> Option<&'static str> {
        match self {
            EngineKind::Internal => None,
            EngineKind::Mpv => Some("mpv"),
            EngineKind::Vlc => Some("vlc"),
            EngineKind::Ffplay => Some("ffplay"),
        }
    }

    /// None of the engines speak WebRTC signalling
    pub fn supports(&self, kind: StreamKind) -> bool {
        !matches!(kind, StreamKind::Webrtc)
    }
}

/// Buffering knobs forwarded verbatim to the engine
#[derive(Debug, Clone, PartialEq)]
pub struct BufferingConfig {
    /// Network cache depth
    pub cache_secs: u32,
    /// Live sync window behind the live edge
    pub live_sync_secs: u32,
    pub network_timeout: Duration,
    /// Per-resource reconnect attempts inside the engine
    pub resource_retries: u32,
}

impl Default for BufferingConfig {
    fn default() -> Self {
        Self {
            cache_secs: 5,
            live_sync_secs: 3,
            network_timeout: Duration::from_secs(15),
            resource_retries: 4,
        }
    }
}

/// Variant choice for adaptive streams
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamQuality {
    /// Let the engine adapt to bandwidth
    #[default]
    Auto,
    Highest,
    Lowest,
}

impl StreamQuality {
    pub const ALL: [StreamQuality; 3] = [StreamQuality::Auto, StreamQuality::Highest, StreamQuality::Lowest];

    pub fn label(&self) -> &'static str {
        match self {
            StreamQuality::Auto => "Auto",
            StreamQuality::Highest => "Highest",
            StreamQuality::Lowest => "Lowest",
        }
    }
}

/// Commands an engine honours while running
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub pause: bool,
    pub seek: bool,
    pub volume: bool,
    /// Frames are rendered inside the application window
    pub embedded_video: bool,
}

impl Capabilities {
    pub const ALL: Capabilities = Capabilities {
        pause: true,
        seek: true,
        volume: true,
        embedded_video: true,
    };

    pub const NONE: Capabilities = Capabilities {
        pause: false,
        seek: false,
        volume: false,
        embedded_video: false,
    };
}

/// Everything an engine needs to open one channel
#[derive(Debug, Clone)]
pub struct LaunchRequest {
    pub channel_name: String,
    pub url: String,
    pub stream_kind: StreamKind,
    pub autoplay: bool,
    pub volume: f32,
    pub muted: bool,
    pub fullscreen: bool,
    pub picture_in_picture: bool,
    pub buffering: BufferingConfig,
    pub quality: StreamQuality,
    pub user_agent: Option<String>,
    pub hw_accel: bool,
}

impl LaunchRequest {
    /// Window title with the stream filename appended
    pub fn title(&self) -> String {
        let stream_name = self
            .url
            .split('?')
            .next()
            .and_then(|path| path.rsplit('/').next())
            .filter(|name| !name.is_empty())
            .unwrap_or("stream");
        format!("{} - {}", self.channel_name, stream_name)
    }
}

/// Partial metrics report; `None` fields leave the previous value untouched
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricsUpdate {
    pub resolution: Option<(u32, u32)>,
    pub bitrate: Option<u64>,
    pub fps: Option<f32>,
    pub buffer_seconds: Option<f64>,
}

impl MetricsUpdate {
    pub fn is_empty(&self) -> bool {
        self == &MetricsUpdate::default()
    }
}

/// Events reported by an engine, drained by the session on every tick
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// Manifest or metadata loaded
    Ready,
    Playing,
    Paused,
    Buffering(bool),
    Ended,
    Metrics(MetricsUpdate),
    Error { message: String, fatal: bool },
}

/// RGB24 frame produced by engines that render inside the application window
pub struct VideoFrame {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
    /// Presentation time from the start of the stream
    pub position: Duration,
}

/// Capability interface implemented by every playback backend
pub trait Engine: Send {
    fn kind(&self) -> EngineKind;

    fn capabilities(&self) -> Capabilities {
        Capabilities::ALL
    }

    /// Open the stream. Errors here are fatal for this attempt.
    fn init(&mut self, request: &LaunchRequest) -> Result<(), EngineError>;

    fn play(&mut self) -> Result<(), EngineError>;

    fn pause(&mut self) -> Result<(), EngineError>;

    fn seek(&mut self, position: Duration) -> Result<(), EngineError>;

    fn set_volume(&mut self, volume: f32, muted: bool) -> Result<(), EngineError>;

    /// Drain pending events without blocking
    fn poll_events(&mut self) -> Vec<EngineEvent>;

    /// Seconds of media buffered ahead of the playhead, when the engine knows
    fn buffered_ahead(&self) -> Option<f64> {
        None
    }

    /// Playhead position, for engines that report it outside of frames
    fn position(&self) -> Option<Duration> {
        None
    }

    fn take_frame(&mut self) -> Option<VideoFrame> {
        None
    }

    /// Release the engine. The returned handle completes once the mount point
    /// and device resources are free again.
    fn destroy(self: Box<Self>) -> Teardown;
}

/// Source of engines and of the lazily loaded dependencies they need
pub trait EngineProvider {
    fn dependency(&self, kind: EngineKind) -> LazyDependency;

    fn create(&self, kind: EngineKind) -> Box<dyn Engine>;
}

/// Completion handle returned by [`Engine::destroy`]
pub struct Teardown {
    done: Option<Receiver<()>>,
    issued: Instant,
}

/// Completing side of a [`Teardown`]. Dropping it also completes the teardown.
pub struct TeardownSignal {
    sender: Sender<()>,
}

impl TeardownSignal {
    pub fn complete(self) {
        let _ = self.sender.send(());
    }
}

impl Teardown {
    pub fn completed() -> Self {
        Self {
            done: None,
            issued: Instant::now(),
        }
    }

    pub fn pending() -> (Self, TeardownSignal) {
        let (sender, receiver) = channel();
        (
            Self {
                done: Some(receiver),
                issued: Instant::now(),
            },
            TeardownSignal { sender },
        )
    }

    pub fn is_complete(&mut self) -> bool {
        let finished = match self.done {
            None => return true,
            Some(ref receiver) => match receiver.try_recv() {
                Ok(()) | Err(TryRecvError::Disconnected) => true,
                Err(TryRecvError::Empty) => false,
            },
        };
        if finished {
            self.done = None;
        }
        finished
    }

    /// Block until completion or timeout. Returns whether the teardown finished.
    pub fn wait(mut self, timeout: Duration) -> bool {
        match self.done.take() {
            None => true,
            Some(receiver) => !matches!(
                receiver.recv_timeout(timeout),
                Err(std::sync::mpsc::RecvTimeoutError::Timeout)
            ),
        }
    }

    pub fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.issued)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn request(url: &str) -> LaunchRequest {
        LaunchRequest {
            channel_name: "News".to_string(),
            url: url.to_string(),
            stream_kind: StreamKind::Hls,
            autoplay: true,
            volume: 1.0,
            muted: false,
            fullscreen: false,
            picture_in_picture: false,
            buffering: BufferingConfig::default(),
            quality: StreamQuality::Auto,
            user_agent: None,
            hw_accel: true,
        }
    }

    #[test]
    fn test_title_uses_stream_filename() {
        assert_eq!(request("http://example.com/live/index.m3u8?token=1").title(), "News - index.m3u8");
        assert_eq!(request("http://example.com/").title(), "News - stream");
    }

    #[test]
    fn test_completed_teardown() {
        let mut teardown = Teardown::completed();
        assert!(teardown.is_complete());
        assert!(Teardown::completed().wait(Duration::from_millis(1)));
    }

    #[test]
    fn test_pending_teardown_completes_on_signal() {
        let (mut teardown, signal) = Teardown::pending();
        assert!(!teardown.is_complete());
        signal.complete();
        assert!(teardown.is_complete());
        assert!(teardown.is_complete());
    }

    #[test]
    fn test_dropped_signal_completes_teardown() {
        let (teardown, signal) = Teardown::pending();
        let worker = thread::spawn(move || drop(signal));
        assert!(teardown.wait(Duration::from_secs(5)));
        worker.join().unwrap();
    }

    #[test]
    fn test_wait_times_out() {
        let (teardown, _signal) = Teardown::pending();
        assert!(!teardown.wait(Duration::from_millis(10)));
    }

    #[test]
    fn test_webrtc_is_unsupported() {
        for engine in EngineKind::ALL {
            assert!(engine.supports(StreamKind::Hls));
            assert!(!engine.supports(StreamKind::Webrtc));
        }
    }
}

//! Presentation-ready projection of a playback session

use super::classify::StreamKind;
use super::engine::{EngineKind, MetricsUpdate};

/// Coarse indicator derived from seconds buffered ahead of the playhead
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionQuality {
    Excellent,
    Good,
    Poor,
    Offline,
}

impl ConnectionQuality {
    pub fn from_buffer(seconds: f64) -> Self {
        if seconds > 8.0 {
            ConnectionQuality::Excellent
        } else if seconds > 5.0 {
            ConnectionQuality::Good
        } else if seconds > 2.0 {
            ConnectionQuality::Poor
        } else {
            ConnectionQuality::Offline
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ConnectionQuality::Excellent => "Excellent",
            ConnectionQuality::Good => "Good",
            ConnectionQuality::Poor => "Poor",
            ConnectionQuality::Offline => "Offline",
        }
    }
}

/// Last known engine-reported stream metrics
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamMetrics {
    pub resolution: Option<(u32, u32)>,
    /// Bits per second
    pub bitrate: Option<u64>,
    pub fps: Option<f32>,
    pub buffer_seconds: Option<f64>,
}

impl StreamMetrics {
    pub fn merge(&mut self, update: &MetricsUpdate) {
        if update.resolution.is_some() {
            self.resolution = update.resolution;
        }
        if update.bitrate.is_some() {
            self.bitrate = update.bitrate;
        }
        if update.fps.is_some() {
            self.fps = update.fps;
        }
        if update.buffer_seconds.is_some() {
            self.buffer_seconds = update.buffer_seconds;
        }
    }

    /// "720p" once the height is known
    pub fn quality_label(&self) -> String {
        match self.resolution {
            Some((_, height)) if height > 0 => format!("{}p", height),
            _ => "auto".to_string(),
        }
    }
}

/// Session lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Initializing,
    Ready,
    Playing,
    Paused,
    Ended,
    Error,
}

impl SessionState {
    pub fn can_transition_to(&self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (*self, next),
            (Idle, Initializing)
                | (Initializing, Ready)
                | (Ready, Playing)
                | (Playing, Paused)
                | (Paused, Playing)
                | (Playing, Ended)
                | (Paused, Ended)
                | (Initializing, Error)
                | (Ready, Error)
                | (Playing, Error)
                | (Paused, Error)
                | (Error, Initializing)
        )
    }

    pub fn label(&self) -> &'static str {
        match self {
            SessionState::Idle => "Idle",
            SessionState::Initializing => "Connecting",
            SessionState::Ready => "Ready",
            SessionState::Playing => "Live",
            SessionState::Paused => "Paused",
            SessionState::Ended => "Ended",
            SessionState::Error => "Error",
        }
    }
}

/// Everything the presentational layer renders about the current session
#[derive(Debug, Clone, PartialEq)]
pub struct StreamStatus {
    pub state: SessionState,
    pub engine: Option<EngineKind>,
    pub stream_kind: Option<StreamKind>,
    pub is_loading: bool,
    pub is_live: bool,
    pub error: Option<String>,
    pub quality: String,
    pub bitrate: Option<u64>,
    pub resolution: Option<(u32, u32)>,
    pub fps: Option<f32>,
    pub buffer_seconds: f64,
    pub connection_quality: ConnectionQuality,
    pub retry_attempt: u32,
    pub max_retries: u32,
    pub retry_pending: bool,
    pub can_auto_retry: bool,
}

impl StreamStatus {
    pub fn idle() -> Self {
        Self {
            state: SessionState::Idle,
            engine: None,
            stream_kind: None,
            is_loading: false,
            is_live: false,
            error: None,
            quality: "auto".to_string(),
            bitrate: None,
            resolution: None,
            fps: None,
            buffer_seconds: 0.0,
            connection_quality: ConnectionQuality::Offline,
            retry_attempt: 0,
            max_retries: 0,
            retry_pending: false,
            can_auto_retry: false,
        }
    }

    pub fn resolution_label(&self) -> Option<String> {
        self.resolution.map(|(w, h)| format!("{}x{}", w, h))
    }

    pub fn bitrate_label(&self) -> Option<String> {
        self.bitrate.map(|bps| {
            if bps >= 1_000_000 {
                format!("{:.1} Mbps", bps as f64 / 1_000_000.0)
            } else {
                format!("{} kbps", bps / 1000)
            }
        })
    }
}

/// Inputs for [`project`], borrowed from the session
pub struct ProjectionInput<'a> {
    pub state: SessionState,
    pub engine: EngineKind,
    pub stream_kind: StreamKind,
    pub buffering: bool,
    pub error: Option<&'a str>,
    pub metrics: &'a StreamMetrics,
    pub retry_attempt: u32,
    pub max_retries: u32,
    pub retry_pending: bool,
}

/// Derive the user-facing status from the session state and metrics
pub fn project(input: ProjectionInput<'_>) -> StreamStatus {
    let metrics = input.metrics;
    let connection_quality = match (input.state, metrics.buffer_seconds) {
        (SessionState::Error, _) => ConnectionQuality::Offline,
        (_, Some(seconds)) => ConnectionQuality::from_buffer(seconds),
        (SessionState::Ready | SessionState::Playing | SessionState::Paused, None) => {
            ConnectionQuality::Good
        }
        _ => ConnectionQuality::Offline,
    };

    let is_loading = match input.state {
        SessionState::Idle | SessionState::Initializing => true,
        SessionState::Error => input.retry_pending,
        SessionState::Playing => input.buffering,
        _ => false,
    };

    StreamStatus {
        state: input.state,
        engine: Some(input.engine),
        stream_kind: Some(input.stream_kind),
        is_loading,
        is_live: matches!(input.state, SessionState::Playing | SessionState::Paused)
            && input.stream_kind.is_live_hint(),
        error: input.error.map(str::to_string),
        quality: metrics.quality_label(),
        bitrate: metrics.bitrate,
        resolution: metrics.resolution,
        fps: metrics.fps,
        buffer_seconds: if input.state == SessionState::Error {
            0.0
        } else {
            metrics.buffer_seconds.unwrap_or(0.0)
        },
        connection_quality,
        retry_attempt: input.retry_attempt,
        max_retries: input.max_retries,
        retry_pending: input.retry_pending,
        can_auto_retry: input.retry_attempt < input.max_retries,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input<'a>(state: SessionState, metrics: &'a StreamMetrics) -> ProjectionInput<'a> {
        ProjectionInput {
            state,
            engine: EngineKind::Mpv,
            stream_kind: StreamKind::Hls,
            buffering: false,
            error: None,
            metrics,
            retry_attempt: 0,
            max_retries: 3,
            retry_pending: false,
        }
    }

    #[test]
    fn test_connection_quality_thresholds() {
        assert_eq!(ConnectionQuality::from_buffer(9.0), ConnectionQuality::Excellent);
        assert_eq!(ConnectionQuality::from_buffer(6.0), ConnectionQuality::Good);
        assert_eq!(ConnectionQuality::from_buffer(3.0), ConnectionQuality::Poor);
        assert_eq!(ConnectionQuality::from_buffer(1.0), ConnectionQuality::Offline);
    }

    #[test]
    fn test_connection_quality_boundaries_are_strict() {
        assert_eq!(ConnectionQuality::from_buffer(8.0), ConnectionQuality::Good);
        assert_eq!(ConnectionQuality::from_buffer(5.0), ConnectionQuality::Poor);
        assert_eq!(ConnectionQuality::from_buffer(2.0), ConnectionQuality::Offline);
        assert_eq!(ConnectionQuality::from_buffer(0.0), ConnectionQuality::Offline);
    }

    #[test]
    fn test_transitions() {
        use SessionState::*;
        assert!(Idle.can_transition_to(Initializing));
        assert!(Initializing.can_transition_to(Ready));
        assert!(Ready.can_transition_to(Playing));
        assert!(Playing.can_transition_to(Paused));
        assert!(Paused.can_transition_to(Playing));
        assert!(Paused.can_transition_to(Ended));
        assert!(Error.can_transition_to(Initializing));
        for from in [Initializing, Ready, Playing, Paused] {
            assert!(from.can_transition_to(Error));
        }

        assert!(!Idle.can_transition_to(Playing));
        assert!(!Ready.can_transition_to(Paused));
        assert!(!Ended.can_transition_to(Playing));
        assert!(!Idle.can_transition_to(Error));
        assert!(!Error.can_transition_to(Playing));
    }

    #[test]
    fn test_metrics_merge_keeps_known_values() {
        let mut metrics = StreamMetrics::default();
        metrics.merge(&MetricsUpdate {
            resolution: Some((1280, 720)),
            bitrate: Some(2_500_000),
            ..Default::default()
        });
        metrics.merge(&MetricsUpdate {
            fps: Some(25.0),
            ..Default::default()
        });
        assert_eq!(metrics.resolution, Some((1280, 720)));
        assert_eq!(metrics.bitrate, Some(2_500_000));
        assert_eq!(metrics.fps, Some(25.0));
        assert_eq!(metrics.quality_label(), "720p");
    }

    #[test]
    fn test_projection_while_playing() {
        let metrics = StreamMetrics {
            resolution: Some((1920, 1080)),
            bitrate: Some(4_800_000),
            fps: Some(50.0),
            buffer_seconds: Some(9.5),
        };
        let status = project(input(SessionState::Playing, &metrics));
        assert!(status.is_live);
        assert!(!status.is_loading);
        assert_eq!(status.quality, "1080p");
        assert_eq!(status.connection_quality, ConnectionQuality::Excellent);
        assert_eq!(status.resolution_label().as_deref(), Some("1920x1080"));
        assert_eq!(status.bitrate_label().as_deref(), Some("4.8 Mbps"));
    }

    #[test]
    fn test_projection_without_buffer_sample() {
        let metrics = StreamMetrics::default();
        assert_eq!(project(input(SessionState::Playing, &metrics)).connection_quality, ConnectionQuality::Good);
        assert_eq!(project(input(SessionState::Initializing, &metrics)).connection_quality, ConnectionQuality::Offline);
        assert!(project(input(SessionState::Initializing, &metrics)).is_loading);
    }

    #[test]
    fn test_error_is_worst_quality() {
        let metrics = StreamMetrics {
            buffer_seconds: Some(12.0),
            ..Default::default()
        };
        let mut projection = input(SessionState::Error, &metrics);
        projection.error = Some("Network timeout");
        let status = project(projection);
        assert_eq!(status.connection_quality, ConnectionQuality::Offline);
        assert_eq!(status.buffer_seconds, 0.0);
        assert!(!status.is_loading);
        assert!(!status.is_live);
        assert_eq!(status.error.as_deref(), Some("Network timeout"));
    }

    #[test]
    fn test_direct_files_are_not_live() {
        let metrics = StreamMetrics::default();
        let mut projection = input(SessionState::Playing, &metrics);
        projection.stream_kind = StreamKind::Direct;
        assert!(!project(projection).is_live);
    }
}

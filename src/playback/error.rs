//! Playback error taxonomy

use std::fmt;

use super::engine::EngineKind;

/// Errors raised by engine adapters
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("failed to launch {engine:?}: {source}")]
    Launch {
        engine: EngineKind,
        #[source]
        source: std::io::Error,
    },

    #[error("{engine:?} does not support {operation}")]
    Unsupported {
        engine: EngineKind,
        operation: &'static str,
    },

    #[error("{engine:?} control channel failed: {source}")]
    Ipc {
        engine: EngineKind,
        #[source]
        source: std::io::Error,
    },

    #[error("{engine:?} is not running")]
    NotRunning { engine: EngineKind },

    #[error("{0}")]
    Failed(String),
}

/// Where an error came from, which decides whether retrying can help
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Engine library or executable unavailable
    Load,
    Network,
    Format,
    Access,
    Other,
}

impl ErrorClass {
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorClass::Network)
    }
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorClass::Load => "load",
            ErrorClass::Network => "network",
            ErrorClass::Format => "format",
            ErrorClass::Access => "access",
            ErrorClass::Other => "other",
        };
        f.write_str(name)
    }
}

/// Normalized error shown to the user
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{message}")]
pub struct PlaybackError {
    pub class: ErrorClass,
    pub message: String,
}

impl PlaybackError {
    pub fn new(class: ErrorClass, message: impl Into<String>) -> Self {
        Self {
            class,
            message: message.into(),
        }
    }

    /// Normalize a raw engine error message
    pub fn from_engine(raw: &str) -> Self {
        if let Some(known) = Self::recognize(raw) {
            known
        } else if raw.trim().is_empty() {
            Self::new(ErrorClass::Other, "Stream playback failed")
        } else {
            Self::new(ErrorClass::Other, raw.trim())
        }
    }

    /// Map a message naming a known failure cause to its user-facing form
    pub fn recognize(raw: &str) -> Option<Self> {
        let lower = raw.to_lowercase();
        let has = |needles: &[&str]| needles.iter().any(|n| lower.contains(n));

        if has(&["network", "timeout", "timed out", "connection"]) {
            Some(Self::new(ErrorClass::Network, "Network timeout - Check your connection or try again"))
        } else if has(&["decode", "format", "codec", "invalid data"]) {
            Some(Self::new(ErrorClass::Format, "Stream format not supported - Try a different engine"))
        } else if has(&["404", "not found"]) {
            Some(Self::new(ErrorClass::Other, "Stream not found - URL may be invalid or offline"))
        } else if has(&["cors", "origin", "401", "403", "forbidden", "unauthorized"]) {
            Some(Self::new(ErrorClass::Access, "Access denied - Stream may require authentication"))
        } else {
            None
        }
    }

    pub fn unavailable(engine: EngineKind, reason: &str) -> Self {
        Self::new(
            ErrorClass::Load,
            format!("{} is unavailable: {}", engine.label(), reason),
        )
    }

    pub fn retries_exhausted() -> Self {
        Self::new(
            ErrorClass::Network,
            "Maximum retry attempts reached - Stream may be offline",
        )
    }

    pub fn is_retryable(&self) -> bool {
        self.class.is_retryable()
    }

    /// Static troubleshooting lines for the error overlay
    pub fn guidance(&self) -> &'static [&'static str] {
        match self.class {
            ErrorClass::Load => &[
                "Install the selected player or pick another engine",
                "Check the player path in settings",
            ],
            ErrorClass::Network => &[
                "Check your internet connection",
                "The stream may be temporarily offline",
                "Try a larger buffer profile",
            ],
            ErrorClass::Format => &[
                "Switch to a different engine",
                "The stream codec may not be supported",
            ],
            ErrorClass::Access => &[
                "The stream may require credentials",
                "The provider may block this region or user agent",
            ],
            ErrorClass::Other => &[
                "Verify the stream URL",
                "Try again later or pick another channel",
            ],
        }
    }
}

impl From<EngineError> for PlaybackError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Launch { engine, source } => {
                PlaybackError::unavailable(engine, &source.to_string())
            }
            EngineError::Failed(message) => PlaybackError::from_engine(&message),
            other => PlaybackError::new(ErrorClass::Other, other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_network_errors_are_retryable() {
        let err = PlaybackError::from_engine("Connection timed out");
        assert_eq!(err.class, ErrorClass::Network);
        assert!(err.is_retryable());

        let err = PlaybackError::from_engine("networkError: manifestLoadError");
        assert_eq!(err.class, ErrorClass::Network);
    }

    #[test]
    fn test_format_errors_are_not_retryable() {
        let err = PlaybackError::from_engine("Invalid data found when processing input");
        assert_eq!(err.class, ErrorClass::Format);
        assert!(!err.is_retryable());
        assert!(err.message.contains("different engine"));
    }

    #[test]
    fn test_access_errors() {
        let err = PlaybackError::from_engine("HTTP error 403 Forbidden");
        assert_eq!(err.class, ErrorClass::Access);
        assert!(!err.is_retryable());
        assert!(err.message.contains("authentication"));
    }

    #[test]
    fn test_not_found() {
        let err = PlaybackError::from_engine("Server returned 404 Not Found");
        assert_eq!(err.class, ErrorClass::Other);
        assert!(err.message.starts_with("Stream not found"));
    }

    #[test]
    fn test_unknown_is_verbatim() {
        let err = PlaybackError::from_engine("  something odd happened ");
        assert_eq!(err.class, ErrorClass::Other);
        assert_eq!(err.message, "something odd happened");
        assert_eq!(PlaybackError::from_engine("").message, "Stream playback failed");
    }

    #[test]
    fn test_recognize_skips_generic_lines() {
        assert!(PlaybackError::recognize("Exiting... (Errors when loading file)").is_none());
        let known = PlaybackError::recognize("[ffmpeg] tcp: Connection refused").unwrap();
        assert_eq!(known.class, ErrorClass::Network);
    }

    #[test]
    fn test_launch_failure_is_load_class() {
        let err: PlaybackError = EngineError::Launch {
            engine: EngineKind::Mpv,
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "No such file or directory"),
        }
        .into();
        assert_eq!(err.class, ErrorClass::Load);
        assert!(!err.is_retryable());
        assert!(err.message.starts_with("mpv is unavailable"));
    }

    #[test]
    fn test_every_class_has_guidance() {
        for class in [
            ErrorClass::Load,
            ErrorClass::Network,
            ErrorClass::Format,
            ErrorClass::Access,
            ErrorClass::Other,
        ] {
            assert!(!PlaybackError::new(class, "x").guidance().is_empty());
        }
    }
}

//! Playback core: stream classification, engine selection, session lifecycle

pub mod classify;
pub mod dependency;
pub mod engine;
pub mod error;
pub mod retry;
pub mod selector;
pub mod session;
pub mod status;

#[cfg(test)]
pub mod mock;

pub use classify::{classify, StreamKind};
pub use dependency::{DependencyState, LazyDependency};
pub use engine::{
    BufferingConfig, Capabilities, Engine, EngineEvent, EngineKind, EngineProvider,
    LaunchRequest, MetricsUpdate, StreamQuality, Teardown, TeardownSignal, VideoFrame,
};
pub use error::{EngineError, ErrorClass, PlaybackError};
pub use retry::{RetryController, RetryPolicy};
pub use selector::{EngineChoice, EngineOverride, EngineTable};
pub use session::{PlaybackSession, Player, PlayerNotice, PlayerOptions};
pub use status::{ConnectionQuality, SessionState, StreamMetrics, StreamStatus};

//! Scripted engine used by session tests

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use super::dependency::LazyDependency;
use super::engine::{
    Capabilities, Engine, EngineEvent, EngineKind, EngineProvider, LaunchRequest, Teardown,
    TeardownSignal,
};
use super::error::EngineError;

#[derive(Default)]
struct Shared {
    log: Vec<String>,
    outbox: VecDeque<EngineEvent>,
    created: usize,
    init_errors: VecDeque<String>,
    buffered: Option<f64>,
    position: Option<Duration>,
    capabilities: Option<Capabilities>,
    hold_teardowns: bool,
    held: Vec<TeardownSignal>,
    requests: Vec<LaunchRequest>,
}

/// Provider handing out [`MockEngine`]s that share one call log and event outbox
#[derive(Clone, Default)]
pub struct MockProvider {
    shared: Arc<Mutex<Shared>>,
    dependencies: Arc<Mutex<HashMap<EngineKind, LazyDependency>>>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_dependency(self, kind: EngineKind, dependency: LazyDependency) -> Self {
        self.dependencies.lock().insert(kind, dependency);
        self
    }

    /// Queue an event for the live engine
    pub fn emit(&self, event: EngineEvent) {
        self.shared.lock().outbox.push_back(event);
    }

    pub fn emit_error(&self, message: &str) {
        self.emit(EngineEvent::Error {
            message: message.to_string(),
            fatal: true,
        });
    }

    pub fn fail_next_init(&self, message: &str) {
        self.shared.lock().init_errors.push_back(message.to_string());
    }

    pub fn set_buffered(&self, seconds: Option<f64>) {
        self.shared.lock().buffered = seconds;
    }

    pub fn set_position(&self, position: Option<Duration>) {
        self.shared.lock().position = position;
    }

    /// Capabilities reported by every engine; all commands by default
    pub fn set_capabilities(&self, capabilities: Capabilities) {
        self.shared.lock().capabilities = Some(capabilities);
    }

    /// Keep teardowns pending until [`MockProvider::release_teardowns`]
    pub fn hold_teardowns(&self, hold: bool) {
        self.shared.lock().hold_teardowns = hold;
    }

    pub fn release_teardowns(&self) {
        let held = std::mem::take(&mut self.shared.lock().held);
        for signal in held {
            signal.complete();
        }
    }

    pub fn log(&self) -> Vec<String> {
        self.shared.lock().log.clone()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.shared.lock().log.iter().filter(|line| line.starts_with(prefix)).count()
    }

    /// Engines initialized and not yet destroyed
    pub fn live_engines(&self) -> usize {
        self.count("init") - self.count("destroy")
    }

    pub fn last_request(&self) -> Option<LaunchRequest> {
        self.shared.lock().requests.last().cloned()
    }
}

impl EngineProvider for MockProvider {
    fn dependency(&self, kind: EngineKind) -> LazyDependency {
        self.dependencies
            .lock()
            .get(&kind)
            .cloned()
            .unwrap_or_else(|| LazyDependency::ready(kind.label()))
    }

    fn create(&self, kind: EngineKind) -> Box<dyn Engine> {
        let id = {
            let mut shared = self.shared.lock();
            shared.created += 1;
            shared.created
        };
        Box::new(MockEngine {
            kind,
            id,
            shared: Arc::clone(&self.shared),
        })
    }
}

pub struct MockEngine {
    kind: EngineKind,
    id: usize,
    shared: Arc<Mutex<Shared>>,
}

impl MockEngine {
    fn record(&self, call: &str) {
        let line = format!("{}:{}#{}", call, self.kind.label(), self.id);
        self.shared.lock().log.push(line);
    }
}

impl Engine for MockEngine {
    fn kind(&self) -> EngineKind {
        self.kind
    }

    fn capabilities(&self) -> Capabilities {
        self.shared.lock().capabilities.unwrap_or(Capabilities::ALL)
    }

    fn init(&mut self, request: &LaunchRequest) -> Result<(), EngineError> {
        self.record("init");
        let mut shared = self.shared.lock();
        shared.requests.push(request.clone());
        match shared.init_errors.pop_front() {
            Some(message) => Err(EngineError::Failed(message)),
            None => Ok(()),
        }
    }

    fn play(&mut self) -> Result<(), EngineError> {
        self.record("play");
        self.shared.lock().outbox.push_back(EngineEvent::Playing);
        Ok(())
    }

    fn pause(&mut self) -> Result<(), EngineError> {
        self.record("pause");
        self.shared.lock().outbox.push_back(EngineEvent::Paused);
        Ok(())
    }

    fn seek(&mut self, position: Duration) -> Result<(), EngineError> {
        self.record(&format!("seek({})", position.as_secs()));
        Ok(())
    }

    fn set_volume(&mut self, volume: f32, muted: bool) -> Result<(), EngineError> {
        self.record(&format!("volume({:.1},{})", volume, muted));
        Ok(())
    }

    fn poll_events(&mut self) -> Vec<EngineEvent> {
        self.shared.lock().outbox.drain(..).collect()
    }

    fn buffered_ahead(&self) -> Option<f64> {
        self.shared.lock().buffered
    }

    fn position(&self) -> Option<Duration> {
        self.shared.lock().position
    }

    fn destroy(self: Box<Self>) -> Teardown {
        self.record("destroy");
        let mut shared = self.shared.lock();
        // Events queued for a dead engine never reach the next one
        shared.outbox.clear();
        if shared.hold_teardowns {
            let (teardown, signal) = Teardown::pending();
            shared.held.push(signal);
            teardown
        } else {
            Teardown::completed()
        }
    }
}

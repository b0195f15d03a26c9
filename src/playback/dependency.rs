//! Lazily loaded engine dependencies
//!
//! An executable version check or library initialization runs at most once, on a
//! background thread. Every session that needs the dependency observes the
//! same cached outcome.

use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::Arc;
use std::thread;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DependencyState {
    NotRequested,
    Loading,
    Ready,
    Failed(String),
}

impl DependencyState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, DependencyState::Ready | DependencyState::Failed(_))
    }
}

type Loader = dyn Fn() -> Result<(), String> + Send + Sync;

struct Shared {
    state: DependencyState,
    waiters: Vec<Sender<DependencyState>>,
}

#[derive(Clone)]
pub struct LazyDependency {
    name: Arc<str>,
    shared: Arc<Mutex<Shared>>,
    loader: Arc<Loader>,
}

impl LazyDependency {
    pub fn new<F>(name: &str, loader: F) -> Self
    where
        F: Fn() -> Result<(), String> + Send + Sync + 'static,
    {
        Self {
            name: Arc::from(name),
            shared: Arc::new(Mutex::new(Shared {
                state: DependencyState::NotRequested,
                waiters: Vec::new(),
            })),
            loader: Arc::new(loader),
        }
    }

    /// Already available, nothing to load
    pub fn ready(name: &str) -> Self {
        let dep = Self::new(name, || Ok(()));
        dep.shared.lock().state = DependencyState::Ready;
        dep
    }

    pub fn failed(name: &str, reason: &str) -> Self {
        let reason = reason.to_string();
        let dep = Self::new(name, || Err(String::new()));
        dep.shared.lock().state = DependencyState::Failed(reason);
        dep
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> DependencyState {
        self.shared.lock().state.clone()
    }

    /// Start loading if nobody has asked yet. Returns the state after the call.
    pub fn request(&self) -> DependencyState {
        {
            let mut shared = self.shared.lock();
            if shared.state != DependencyState::NotRequested {
                return shared.state.clone();
            }
            shared.state = DependencyState::Loading;
        }

        debug!(dependency = %self.name, "loading dependency");
        let name = Arc::clone(&self.name);
        let shared = Arc::clone(&self.shared);
        let loader = Arc::clone(&self.loader);
        let spawned = thread::Builder::new()
            .name(format!("dep-{}", self.name))
            .spawn(move || {
                let outcome = loader();
                Self::finish(&name, &shared, outcome);
            });

        if let Err(e) = spawned {
            Self::finish(&self.name, &self.shared, Err(format!("failed to spawn loader: {}", e)));
        }
        self.state()
    }

    /// Forget a failed load so the next request runs the loader again
    pub fn reset_failed(&self) -> bool {
        let mut shared = self.shared.lock();
        if !matches!(shared.state, DependencyState::Failed(_)) {
            return false;
        }
        debug!(dependency = %self.name, "clearing failed load");
        shared.state = DependencyState::NotRequested;
        true
    }

    /// Receiver yielding the terminal state. Requests the dependency if needed.
    pub fn subscribe(&self) -> Receiver<DependencyState> {
        let (tx, rx) = channel();
        {
            let mut shared = self.shared.lock();
            if shared.state.is_terminal() {
                let _ = tx.send(shared.state.clone());
                return rx;
            }
            shared.waiters.push(tx);
        }
        self.request();
        rx
    }

    fn finish(name: &str, shared: &Mutex<Shared>, outcome: Result<(), String>) {
        let state = match outcome {
            Ok(()) => {
                info!(dependency = %name, "dependency ready");
                DependencyState::Ready
            }
            Err(reason) => {
                warn!(dependency = %name, %reason, "dependency failed to load");
                DependencyState::Failed(reason)
            }
        };

        let waiters = {
            let mut shared = shared.lock();
            shared.state = state.clone();
            std::mem::take(&mut shared.waiters)
        };
        for waiter in waiters {
            let _ = waiter.send(state.clone());
        }
    }
}

impl std::fmt::Debug for LazyDependency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LazyDependency")
            .field("name", &self.name)
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[test]
    fn test_loader_runs_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let dep = LazyDependency::new("mpv", move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        assert_eq!(dep.state(), DependencyState::NotRequested);

        let first = dep.subscribe();
        let second = dep.clone().subscribe();
        dep.request();

        let timeout = Duration::from_secs(5);
        assert_eq!(first.recv_timeout(timeout).unwrap(), DependencyState::Ready);
        assert_eq!(second.recv_timeout(timeout).unwrap(), DependencyState::Ready);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(dep.request(), DependencyState::Ready);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_loading_is_observable() {
        let (release_tx, release_rx) = channel::<()>();
        let release_rx = Mutex::new(release_rx);
        let dep = LazyDependency::new("vlc", move || {
            let _ = release_rx.lock().recv();
            Err("vlc: command not found".to_string())
        });

        assert_eq!(dep.request(), DependencyState::Loading);
        assert_eq!(dep.state(), DependencyState::Loading);

        let done = dep.subscribe();
        release_tx.send(()).unwrap();
        assert_eq!(
            done.recv_timeout(Duration::from_secs(5)).unwrap(),
            DependencyState::Failed("vlc: command not found".to_string())
        );
    }

    #[test]
    fn test_subscribe_after_completion_answers_immediately() {
        let dep = LazyDependency::ready("internal");
        assert_eq!(dep.subscribe().try_recv().unwrap(), DependencyState::Ready);

        let dep = LazyDependency::failed("internal", "not built");
        assert_eq!(
            dep.subscribe().try_recv().unwrap(),
            DependencyState::Failed("not built".to_string())
        );
        assert_eq!(dep.request(), DependencyState::Failed("not built".to_string()));
    }

    #[test]
    fn test_reset_failed_loads_again() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let dep = LazyDependency::new("mpv", move || {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                Err("mpv: command not found".to_string())
            } else {
                Ok(())
            }
        });
        let timeout = Duration::from_secs(5);
        assert!(matches!(dep.subscribe().recv_timeout(timeout).unwrap(), DependencyState::Failed(_)));

        assert!(dep.reset_failed());
        assert_eq!(dep.state(), DependencyState::NotRequested);
        assert_eq!(dep.subscribe().recv_timeout(timeout).unwrap(), DependencyState::Ready);
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        // Only failures are cleared
        assert!(!dep.reset_failed());
        assert_eq!(dep.state(), DependencyState::Ready);
    }
}

//! Concrete playback engines and the provider that hands them out

mod internal;
pub mod process;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use parking_lot::Mutex;
use tracing::debug;

use crate::playback::{Engine, EngineKind, EngineProvider, LazyDependency};

pub use internal::InternalEngine;
pub use process::ProcessEngine;

/// Well-known install locations checked before falling back to `PATH`
#[cfg(target_os = "windows")]
fn well_known_paths(kind: EngineKind) -> &'static [&'static str] {
    match kind {
        EngineKind::Vlc => &[
            r"C:\Program Files\VideoLAN\VLC\vlc.exe",
            r"C:\Program Files (x86)\VideoLAN\VLC\vlc.exe",
        ],
        EngineKind::Mpv => &[
            r"C:\Program Files\mpv\mpv.exe",
            r"C:\Program Files (x86)\mpv\mpv.exe",
            r"C:\mpv\mpv.exe",
        ],
        EngineKind::Ffplay => &[
            r"C:\ffmpeg\bin\ffplay.exe",
            r"C:\Program Files\ffmpeg\bin\ffplay.exe",
        ],
        EngineKind::Internal => &[],
    }
}

#[cfg(not(target_os = "windows"))]
fn well_known_paths(_kind: EngineKind) -> &'static [&'static str] {
    &[]
}

/// Executable for an external engine: custom path, then install locations, then `PATH`
pub fn resolve_program(kind: EngineKind, custom: Option<&Path>) -> PathBuf {
    if let Some(path) = custom.filter(|p| !p.as_os_str().is_empty()) {
        return path.to_path_buf();
    }
    well_known_paths(kind)
        .iter()
        .map(Path::new)
        .find(|path| path.exists())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(kind.program().unwrap_or_default()))
}

/// Check that a player executable runs at all
fn check_version(kind: EngineKind, program: &Path) -> Result<(), String> {
    let flag = if kind == EngineKind::Ffplay { "-version" } else { "--version" };
    let status = Command::new(program)
        .arg(flag)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => {
                format!("{} not found in PATH or configured location", program.display())
            }
            _ => format!("{}: {}", program.display(), e),
        })?;
    if status.success() {
        Ok(())
    } else {
        Err(format!("{} {} exited with {}", program.display(), flag, status))
    }
}

/// Engines backed by the local system: external players and the built-in decoder
pub struct SystemEngines {
    player_paths: Mutex<HashMap<EngineKind, PathBuf>>,
    dependencies: Mutex<HashMap<EngineKind, LazyDependency>>,
}

impl SystemEngines {
    pub fn new(player_paths: HashMap<EngineKind, PathBuf>) -> Self {
        Self {
            player_paths: Mutex::new(player_paths),
            dependencies: Mutex::new(HashMap::new()),
        }
    }

    /// Replace custom executable paths; engines whose path changed are checked again
    pub fn set_player_paths(&self, player_paths: HashMap<EngineKind, PathBuf>) {
        let mut current = self.player_paths.lock();
        let mut dependencies = self.dependencies.lock();
        for kind in EngineKind::ALL {
            if current.get(&kind) != player_paths.get(&kind) {
                debug!(engine = ?kind, "player path changed");
                dependencies.remove(&kind);
            }
        }
        *current = player_paths;
    }

    fn program(&self, kind: EngineKind) -> PathBuf {
        let paths = self.player_paths.lock();
        resolve_program(kind, paths.get(&kind).map(PathBuf::as_path))
    }
}

impl EngineProvider for SystemEngines {
    fn dependency(&self, kind: EngineKind) -> LazyDependency {
        let program = self.program(kind);
        self.dependencies
            .lock()
            .entry(kind)
            .or_insert_with(|| match kind {
                EngineKind::Internal => LazyDependency::new(kind.label(), internal::load),
                _ => LazyDependency::new(kind.label(), move || check_version(kind, &program)),
            })
            .clone()
    }

    fn create(&self, kind: EngineKind) -> Box<dyn Engine> {
        match kind {
            EngineKind::Internal => Box::new(InternalEngine::new()),
            _ => Box::new(ProcessEngine::new(kind, self.program(kind))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::playback::DependencyState;
    use std::time::Duration;

    #[test]
    fn test_custom_path_wins() {
        let custom = PathBuf::from("/opt/players/mpv");
        assert_eq!(resolve_program(EngineKind::Mpv, Some(&custom)), custom);
        assert_eq!(
            resolve_program(EngineKind::Mpv, Some(Path::new(""))),
            resolve_program(EngineKind::Mpv, None)
        );
    }

    #[cfg(not(target_os = "windows"))]
    #[test]
    fn test_default_program_names() {
        assert_eq!(resolve_program(EngineKind::Vlc, None), PathBuf::from("vlc"));
        assert_eq!(resolve_program(EngineKind::Ffplay, None), PathBuf::from("ffplay"));
    }

    #[test]
    fn test_missing_player_fails_dependency() {
        let mut paths = HashMap::new();
        paths.insert(EngineKind::Vlc, PathBuf::from("/nonexistent/iptv-deck/vlc"));
        let engines = SystemEngines::new(paths);

        let dependency = engines.dependency(EngineKind::Vlc);
        let state = dependency
            .subscribe()
            .recv_timeout(Duration::from_secs(5))
            .unwrap();
        match state {
            DependencyState::Failed(reason) => assert!(reason.contains("not found")),
            other => panic!("unexpected state {:?}", other),
        }

        // Cached until the path changes
        assert!(matches!(engines.dependency(EngineKind::Vlc).state(), DependencyState::Failed(_)));
        engines.set_player_paths(HashMap::new());
        assert_eq!(engines.dependency(EngineKind::Vlc).state(), DependencyState::NotRequested);
    }

    #[cfg(not(feature = "internal-player"))]
    #[test]
    fn test_internal_engine_requires_feature() {
        let engines = SystemEngines::new(HashMap::new());
        let state = engines
            .dependency(EngineKind::Internal)
            .subscribe()
            .recv_timeout(Duration::from_secs(5))
            .unwrap();
        assert_eq!(
            state,
            DependencyState::Failed("Internal player not enabled. Build with --features internal-player".to_string())
        );
    }

    #[test]
    fn test_create_matches_kind() {
        let engines = SystemEngines::new(HashMap::new());
        for kind in EngineKind::ALL {
            assert_eq!(engines.create(kind).kind(), kind);
        }
    }
}

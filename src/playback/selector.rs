//! Engine selection table

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::classify::StreamKind;
use super::engine::EngineKind;

/// User choice in the engine selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineOverride {
    #[default]
    Auto,
    Engine(EngineKind),
}

impl fmt::Display for EngineOverride {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineOverride::Auto => f.write_str("Auto"),
            EngineOverride::Engine(kind) => f.write_str(kind.label()),
        }
    }
}

/// Result of a selection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineChoice {
    pub engine: EngineKind,
    /// Weak secondary candidate the UI may suggest when the engine fails
    pub fallback: Option<EngineKind>,
    pub overridden: bool,
}

/// `{classification -> engine}` routing with a default column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineTable {
    pub preferred: EngineKind,
    #[serde(default)]
    pub routes: BTreeMap<StreamKind, EngineKind>,
    #[serde(default)]
    pub direct_fallback: Option<EngineKind>,
}

impl Default for EngineTable {
    fn default() -> Self {
        Self {
            preferred: EngineKind::Mpv,
            routes: BTreeMap::new(),
            direct_fallback: Some(EngineKind::Internal),
        }
    }
}

impl EngineTable {
    pub fn route(&self, kind: StreamKind) -> EngineKind {
        self.routes.get(&kind).copied().unwrap_or(self.preferred)
    }

    pub fn select(&self, kind: StreamKind, choice: EngineOverride) -> EngineChoice {
        match choice {
            EngineOverride::Engine(engine) => EngineChoice {
                engine,
                fallback: None,
                overridden: true,
            },
            EngineOverride::Auto => {
                let engine = self.route(kind);
                let fallback = match kind {
                    StreamKind::Direct => self.direct_fallback.filter(|f| *f != engine),
                    _ => None,
                };
                EngineChoice {
                    engine,
                    fallback,
                    overridden: false,
                }
            }
        }
    }
}

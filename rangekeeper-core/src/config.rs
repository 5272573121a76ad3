//! Engine configuration.
//!
//! Loaded from a JSON settings file, with environment overrides applied on
//! top. The universe is fixed for the lifetime of a [`Store`](crate::Store).

use crate::error::{RangeError, Result};
use crate::range::Universe;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

/// How documents are rewritten at commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommitMode {
    /// Write `<name>.tmp`, fsync, then rename over the document.
    #[default]
    AtomicRename,
    /// Truncate and rewrite the document in place.
    ///
    /// A crash between truncate and write leaves the document empty; the
    /// next load reports it as `CorruptState`.
    Truncate,
}

/// Configuration for a reservation store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Units are drawn from `[min_id, max_id)`.
    pub universe: Universe,

    /// Directory holding every document and the lock file.
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,

    /// Reserved-space document, relative to `state_dir`.
    #[serde(default = "default_reserved_document")]
    pub reserved_document: String,

    /// Advisory lock file, relative to `state_dir`.
    #[serde(default = "default_lock_file")]
    pub lock_file: String,

    /// Give up waiting for the lock after this many milliseconds.
    /// Waits indefinitely when unset.
    #[serde(default)]
    pub lock_timeout_ms: Option<u64>,

    /// How documents are written at commit.
    #[serde(default)]
    pub commit_mode: CommitMode,

    /// Units allocated to every published project.
    #[serde(default = "default_units_per_project")]
    pub units_per_project: u32,

    /// Host name used in project links. No links are printed when unset.
    #[serde(default)]
    pub servername: Option<String>,
}

fn default_state_dir() -> PathBuf {
    PathBuf::from("/var/lib/rangekeeper")
}
fn default_reserved_document() -> String {
    "reserved.json".to_string()
}
fn default_lock_file() -> String {
    "lock.lock".to_string()
}
fn default_units_per_project() -> u32 {
    6
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            universe: Universe::default(),
            state_dir: default_state_dir(),
            reserved_document: default_reserved_document(),
            lock_file: default_lock_file(),
            lock_timeout_ms: None,
            commit_mode: CommitMode::default(),
            units_per_project: default_units_per_project(),
            servername: None,
        }
    }
}

impl EngineConfig {
    /// Configuration rooted in a fresh directory under the system temp dir.
    pub fn in_memory() -> Self {
        Self {
            state_dir: env::temp_dir().join(format!("rangekeeper_{}", uuid::Uuid::new_v4())),
            ..Self::default()
        }
    }

    /// Load configuration from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| RangeError::ConfigParse {
            path: path.to_path_buf(),
            cause: e.to_string(),
        })?;
        let config: Self = serde_json::from_str(&json).map_err(|e| RangeError::ConfigParse {
            path: path.to_path_buf(),
            cause: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Create configuration from environment variables.
    ///
    /// Environment variables:
    /// - `RANGEKEEPER_CONFIG`: JSON settings file to start from
    /// - `RANGEKEEPER_STATE_DIR`: overrides `state_dir`
    /// - `RANGEKEEPER_LOCK_TIMEOUT_MS`: overrides `lock_timeout_ms`
    pub fn from_env() -> Result<Self> {
        let config = match env::var("RANGEKEEPER_CONFIG") {
            Ok(path) => Self::load(path)?,
            Err(_) => Self::default(),
        };
        config.with_env_overrides()
    }

    /// Apply `RANGEKEEPER_STATE_DIR` and `RANGEKEEPER_LOCK_TIMEOUT_MS`.
    pub fn with_env_overrides(mut self) -> Result<Self> {
        if let Ok(dir) = env::var("RANGEKEEPER_STATE_DIR") {
            self.state_dir = PathBuf::from(dir);
        }
        if let Ok(timeout) = env::var("RANGEKEEPER_LOCK_TIMEOUT_MS") {
            let ms = timeout.parse().map_err(|e| RangeError::ConfigValue {
                field: "RANGEKEEPER_LOCK_TIMEOUT_MS".to_string(),
                cause: format!("{}", e),
            })?;
            self.lock_timeout_ms = Some(ms);
        }
        self.validate()?;
        Ok(self)
    }

    /// Set the state directory.
    pub fn with_state_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.state_dir = dir.into();
        self
    }

    /// Set the universe.
    pub fn with_universe(mut self, universe: Universe) -> Self {
        self.universe = universe;
        self
    }

    /// Set the lock timeout.
    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    /// Set the commit mode.
    pub fn with_commit_mode(mut self, mode: CommitMode) -> Self {
        self.commit_mode = mode;
        self
    }

    /// Set the host name used in project links.
    pub fn with_servername(mut self, servername: impl Into<String>) -> Self {
        self.servername = Some(servername.into());
        self
    }

    /// Lock timeout as a `Duration`.
    pub fn lock_timeout(&self) -> Option<Duration> {
        self.lock_timeout_ms.map(Duration::from_millis)
    }

    /// Absolute path of the reserved-space document.
    pub fn reserved_path(&self) -> PathBuf {
        self.state_dir.join(&self.reserved_document)
    }

    /// Absolute path of the lock file.
    pub fn lock_path(&self) -> PathBuf {
        self.state_dir.join(&self.lock_file)
    }

    /// Check cross-field constraints.
    pub fn validate(&self) -> Result<()> {
        if self.units_per_project == 0 {
            return Err(RangeError::ConfigValue {
                field: "units_per_project".to_string(),
                cause: "must be at least 1".to_string(),
            });
        }
        for (field, name) in [
            ("reserved_document", &self.reserved_document),
            ("lock_file", &self.lock_file),
        ] {
            if !is_relative_document(name) {
                return Err(RangeError::ConfigValue {
                    field: field.to_string(),
                    cause: format!("'{}' must be a relative path inside state_dir", name),
                });
            }
        }
        if self.reserved_document == self.lock_file {
            return Err(RangeError::ConfigValue {
                field: "lock_file".to_string(),
                cause: "must differ from reserved_document".to_string(),
            });
        }
        Ok(())
    }
}

/// Whether `name` is a non-empty relative path that stays inside its root.
pub(crate) fn is_relative_document(name: &str) -> bool {
    let path = Path::new(name);
    !name.is_empty()
        && path
            .components()
            .all(|component| matches!(component, Component::Normal(_)))
}

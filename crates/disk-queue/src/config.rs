//! Queue configuration, selection disciplines and backend capability detection.

use crate::error::ConfigurationError;
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// File name used when no storage location is configured
pub const DEFAULT_QUEUE_FILE: &str = "queue.db";

/// Suffix appended to the storage location when the flat-file backend is active,
/// so it never collides with a SQLite store of the same base name.
pub const FLAT_FILE_SUFFIX: &str = ".notrans";

/// Oldest SQLite library release the transactional backend is used with.
pub const MIN_SQLITE_VERSION: i32 = 3_007_011;

/// Which stored item `poll` removes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", try_from = "String")]
pub enum Discipline {
    /// Remove the item with the smallest sequence id (earliest appended).
    OldestFirst,
    /// Remove the item with the largest sequence id (latest appended).
    NewestFirst,
}

impl Discipline {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OldestFirst => "oldest-first",
            Self::NewestFirst => "newest-first",
        }
    }

    /// SQL sort direction that puts the item to remove first
    pub fn sql_order(&self) -> &'static str {
        match self {
            Self::OldestFirst => "ASC",
            Self::NewestFirst => "DESC",
        }
    }
}

impl fmt::Display for Discipline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Discipline {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "oldest-first" | "oldest_first" => Ok(Self::OldestFirst),
            "newest-first" | "newest_first" => Ok(Self::NewestFirst),
            other => Err(ConfigurationError::UnknownDiscipline {
                value: other.to_string(),
            }),
        }
    }
}

impl TryFrom<String> for Discipline {
    type Error = ConfigurationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Storage backend variants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackendKind {
    /// SQLite store with exclusive transactions
    Transactional,
    /// Line-oriented file guarded by an advisory lock
    FlatFile,
}

impl BackendKind {
    /// Determine which backend this build and runtime can support.
    pub fn detect() -> Self {
        if transactional_support_available() {
            Self::Transactional
        } else {
            Self::FlatFile
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Transactional => "transactional",
            Self::FlatFile => "flat-file",
        }
    }

    /// Map a base storage location to the file this backend actually uses
    pub fn storage_location(&self, base: &Path) -> PathBuf {
        match self {
            Self::Transactional => base.to_path_buf(),
            Self::FlatFile => with_suffix(base, FLAT_FILE_SUFFIX),
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(feature = "sqlite")]
fn transactional_support_available() -> bool {
    rusqlite::version_number() >= MIN_SQLITE_VERSION
}

#[cfg(not(feature = "sqlite"))]
fn transactional_support_available() -> bool {
    false
}

/// Configuration for queue construction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Storage location; `None` means `queue.db` beside the executable
    #[serde(default)]
    pub path: Option<PathBuf>,

    /// Selection discipline
    pub discipline: Discipline,

    /// How long the SQLite connection waits on a competing lock, in milliseconds
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

fn default_busy_timeout_ms() -> u64 {
    60_000
}

impl QueueConfig {
    pub fn new(discipline: Discipline) -> Self {
        Self {
            path: None,
            discipline,
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_busy_timeout_ms(mut self, millis: u64) -> Self {
        self.busy_timeout_ms = millis;
        self
    }

    /// Resolve the base storage location, before any backend suffix is applied.
    pub fn base_location(&self) -> Result<PathBuf, ConfigurationError> {
        match &self.path {
            Some(path) => Ok(path.clone()),
            None => default_location(),
        }
    }
}

fn default_location() -> Result<PathBuf, ConfigurationError> {
    let beside_executable = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf));

    let dir = match beside_executable {
        Some(dir) => dir,
        None => std::env::current_dir().map_err(|e| ConfigurationError::DefaultLocation {
            message: e.to_string(),
        })?,
    };

    Ok(dir.join(DEFAULT_QUEUE_FILE))
}

/// Append `suffix` to the full file name of `path` (`queue.db` -> `queue.db.lock`).
pub(crate) fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;

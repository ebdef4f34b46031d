use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::LibraryError;

pub const DEFAULT_BASE_URL: &str = "http://localhost:3001";

/// What a batch `move` does when the target category already holds the id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MoveConflictPolicy {
    /// Replace the record already in the target category
    #[default]
    Overwrite,
    /// Fail the batch item and leave both categories untouched
    Reject,
}

impl FromStr for MoveConflictPolicy {
    type Err = LibraryError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_lowercase().as_str() {
            "overwrite" => Ok(MoveConflictPolicy::Overwrite),
            "reject" => Ok(MoveConflictPolicy::Reject),
            other => Err(LibraryError::Validation(format!(
                "unknown move conflict policy: {}",
                other
            ))),
        }
    }
}

/// Filesystem layout and behavior switches for the library
#[derive(Debug, Clone)]
pub struct LibraryConfig {
    /// Root of stored media (`images/`, `videos/`, `audio/`, `documents/`)
    pub resources_dir: PathBuf,
    /// Root of category documents (`<category>/data.json`)
    pub knowledge_dir: PathBuf,
    /// Public origin used when building media URLs
    pub base_url: String,
    pub move_conflict: MoveConflictPolicy,
}

impl LibraryConfig {
    pub fn new<P: AsRef<Path>>(resources_dir: P) -> Self {
        let resources_dir = resources_dir.as_ref().to_path_buf();
        Self {
            knowledge_dir: resources_dir.join("knowledge"),
            resources_dir,
            base_url: DEFAULT_BASE_URL.to_string(),
            move_conflict: MoveConflictPolicy::default(),
        }
    }

    /// Build from `RESOURCES_DIR`, `KNOWLEDGE_DIR`, `BASE_URL` and `MOVE_CONFLICT`
    pub fn from_env() -> Result<Self, LibraryError> {
        let resources_dir =
            std::env::var("RESOURCES_DIR").unwrap_or_else(|_| "./resources".to_string());
        let mut config = Self::new(resources_dir);

        if let Ok(knowledge_dir) = std::env::var("KNOWLEDGE_DIR") {
            config.knowledge_dir = PathBuf::from(knowledge_dir);
        }
        if let Ok(base_url) = std::env::var("BASE_URL") {
            config = config.with_base_url(base_url);
        }
        if let Ok(policy) = std::env::var("MOVE_CONFLICT") {
            config.move_conflict = policy.parse()?;
        }

        Ok(config)
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_move_conflict(mut self, policy: MoveConflictPolicy) -> Self {
        self.move_conflict = policy;
        self
    }
}

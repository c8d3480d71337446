//! Persisted set of users who pressed /start.

use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

#[derive(Debug)]
pub enum RegistryError {
    Read { path: PathBuf, source: std::io::Error },
    Parse { path: PathBuf, source: serde_json::Error },
    Write { path: PathBuf, source: std::io::Error },
    Serialize { path: PathBuf, source: serde_json::Error },
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Read { path, source } => {
                write!(f, "failed to read users file '{}': {}", path.display(), source)
            }
            Self::Parse { path, source } => {
                write!(f, "failed to parse users file '{}': {}", path.display(), source)
            }
            Self::Write { path, source } => {
                write!(f, "failed to write users file '{}': {}", path.display(), source)
            }
            Self::Serialize { path, source } => {
                write!(f, "failed to serialize users for '{}': {}", path.display(), source)
            }
        }
    }
}

impl std::error::Error for RegistryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Read { source, .. } | Self::Write { source, .. } => Some(source),
            Self::Parse { source, .. } | Self::Serialize { source, .. } => Some(source),
        }
    }
}

/// Result of registering a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    New { total: usize },
    Known { total: usize },
}

impl Registration {
    pub fn total(&self) -> usize {
        match *self {
            Registration::New { total } | Registration::Known { total } => total,
        }
    }
}

/// User IDs stored as a sorted JSON array.
pub struct UserRegistry {
    path: PathBuf,
    users: BTreeSet<u64>,
}

impl UserRegistry {
    pub fn load(path: &Path) -> Result<Self, RegistryError> {
        let json = std::fs::read_to_string(path)
            .map_err(|e| RegistryError::Read { path: path.to_path_buf(), source: e })?;
        let users: BTreeSet<u64> = serde_json::from_str(&json)
            .map_err(|e| RegistryError::Parse { path: path.to_path_buf(), source: e })?;

        info!("Loaded users from {:?} ({} users)", path, users.len());
        Ok(Self { path: path.to_path_buf(), users })
    }

    pub fn load_or_new(path: &Path) -> Self {
        if path.exists() {
            match Self::load(path) {
                Ok(registry) => registry,
                Err(e) => {
                    warn!("Failed to load users: {e}");
                    Self::empty(path)
                }
            }
        } else {
            info!("No users file at {:?}, starting fresh", path);
            Self::empty(path)
        }
    }

    fn empty(path: &Path) -> Self {
        Self { path: path.to_path_buf(), users: BTreeSet::new() }
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    pub fn contains(&self, user_id: u64) -> bool {
        self.users.contains(&user_id)
    }

    /// Add a user and persist if new.
    ///
    /// On write failure the user stays registered in memory.
    pub fn register(&mut self, user_id: u64) -> Result<Registration, RegistryError> {
        if !self.users.insert(user_id) {
            return Ok(Registration::Known { total: self.users.len() });
        }
        self.save()?;
        Ok(Registration::New { total: self.users.len() })
    }

    pub fn save(&self) -> Result<(), RegistryError> {
        let write_err = |e| RegistryError::Write { path: self.path.clone(), source: e };

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(write_err)?;
        }
        // BTreeSet serializes as an ascending array
        let json = serde_json::to_string(&self.users).map_err(|e| RegistryError::Serialize {
            path: self.path.clone(),
            source: e,
        })?;
        std::fs::write(&self.path, json).map_err(write_err)?;

        info!("💾 Saved users ({} total)", self.users.len());
        Ok(())
    }
}

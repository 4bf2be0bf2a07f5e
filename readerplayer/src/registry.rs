//! Tag to folder assignments.
//!
//! Every tag gets the next free folder the first time it is scanned. The
//! assignments are appended to a store as JSON lines so they survive a
//! restart; when the store fails the registry keeps working from memory.

use alloc::string::String;
use alloc::vec::Vec;

use log::{info, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::token::{FolderIndex, TokenId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    pub token: TokenId,
    pub folder: FolderIndex,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage unavailable")]
    Unavailable,
    #[error("storage I/O failed: {0}")]
    Io(String),
    #[error("registry data is not valid UTF-8")]
    InvalidUtf8,
    #[error("failed to encode registry entry")]
    Encode,
}

/// Durable backing for the registry.
pub trait RegistryStore {
    /// All assignments persisted so far, in the order they were made.
    fn load(&mut self) -> Result<Vec<Assignment>, StoreError>;

    fn append(&mut self, assignment: &Assignment) -> Result<(), StoreError>;
}

pub fn encode_line(assignment: &Assignment) -> Result<String, StoreError> {
    let mut line = serde_json::to_string(assignment).map_err(|_| StoreError::Encode)?;
    line.push('\n');
    Ok(line)
}

/// Parses the stored JSON lines, skipping the ones that cannot be read.
pub fn parse_lines(text: &str) -> Vec<Assignment> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter_map(|line| match serde_json::from_str::<Assignment>(line) {
            Ok(assignment) => Some(assignment),
            Err(err) => {
                warn!("Skipping malformed registry line {:?}: {}", line, err);
                None
            }
        })
        .collect()
}

/// Keeps the JSON lines in RAM. Used when no card is available and in tests.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    text: String,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_text(text: &str) -> Self {
        Self {
            text: text.into(),
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}

impl RegistryStore for MemoryStore {
    fn load(&mut self) -> Result<Vec<Assignment>, StoreError> {
        Ok(parse_lines(&self.text))
    }

    fn append(&mut self, assignment: &Assignment) -> Result<(), StoreError> {
        self.text.push_str(&encode_line(assignment)?);
        Ok(())
    }
}

pub struct TagRegistry<S> {
    assignments: Vec<Assignment>,
    store: S,
    degraded: bool,
}

impl<S: RegistryStore> TagRegistry<S> {
    /// Loads the persisted assignments. A store that cannot be read leaves the
    /// registry empty and memory-only for the rest of the session.
    pub fn open(store: S) -> Self {
        let mut registry = Self {
            assignments: Vec::new(),
            store,
            degraded: false,
        };

        match registry.store.load() {
            Ok(stored) => {
                for assignment in stored {
                    if registry.lookup(&assignment.token).is_some() {
                        warn!(
                            "Ignoring duplicate assignment for tag {}",
                            assignment.token
                        );
                        continue;
                    }
                    registry.assignments.push(assignment);
                }
                info!("Loaded {} tag assignments", registry.assignments.len());
            }
            Err(err) => {
                warn!(
                    "Failed to load tag assignments, continuing in memory only: {}",
                    err
                );
                registry.degraded = true;
            }
        }

        registry
    }

    /// Returns the folder of `token`, assigning and persisting the next free
    /// one if the tag has never been seen.
    pub fn folder_for(&mut self, token: &TokenId) -> FolderIndex {
        if let Some(folder) = self.lookup(token) {
            return folder;
        }

        let assignment = Assignment {
            token: token.clone(),
            folder: self.preview_next_unassigned_folder(),
        };
        info!("Assigning folder {} to tag {}", assignment.folder, token);

        if !self.degraded {
            if let Err(err) = self.store.append(&assignment) {
                warn!(
                    "Failed to persist tag assignment, continuing in memory only: {}",
                    err
                );
                self.degraded = true;
            }
        }

        let folder = assignment.folder;
        self.assignments.push(assignment);
        folder
    }

    /// The folder the next unseen tag would get. Does not assign anything.
    pub fn preview_next_unassigned_folder(&self) -> FolderIndex {
        self.assignments
            .iter()
            .map(|a| a.folder)
            .max()
            .map_or(FolderIndex(0), FolderIndex::next)
    }

    pub fn lookup(&self, token: &TokenId) -> Option<FolderIndex> {
        self.assignments
            .iter()
            .find(|a| &a.token == token)
            .map(|a| a.folder)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Assignment> {
        self.assignments.iter()
    }

    pub fn len(&self) -> usize {
        self.assignments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assignments.is_empty()
    }

    /// True once the store failed and assignments are kept in memory only.
    pub fn is_degraded(&self) -> bool {
        self.degraded
    }

    pub fn store(&self) -> &S {
        &self.store
    }
}

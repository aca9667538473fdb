/// Story persistence for save/load.
///
/// A [`StorySnapshot`] is the complete resumable state of a story;
/// [`StateManager`] writes snapshots to a save directory as versioned JSON
/// files and handles the auto-save cadence.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

use crate::core::engine::StoryLoop;
use crate::core::graph::StoryGraph;
use crate::core::history::HistoryTracker;
use crate::schema::node::NodeId;
use crate::schema::player::Player;

/// Errors from persistence operations.
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u32, found: u32 },
}

/// Current save file version.
pub const SAVE_VERSION: u32 = 1;

/// Everything needed to resume a story.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorySnapshot {
    pub story_graph: StoryGraph,
    pub current_node_id: NodeId,
    pub player: Player,
    pub history: HistoryTracker,
    #[serde(default)]
    pub paradox_count: u32,
    #[serde(default)]
    pub rewrite_count: u32,
}

impl StorySnapshot {
    pub fn to_json(&self) -> Result<String, PersistError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn to_json_pretty(&self) -> Result<String, PersistError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(input: &str) -> Result<Self, PersistError> {
        Ok(serde_json::from_str(input)?)
    }
}

/// On-disk envelope around a snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaveFile {
    /// Save format version for compatibility checking.
    pub version: u32,
    /// When the save was created.
    pub saved_at: DateTime<Utc>,
    pub game_state: StorySnapshot,
}

/// Summary of one save file, as listed by [`StateManager::list_saves`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaveInfo {
    pub filename: String,
    pub saved_at: DateTime<Utc>,
    pub version: u32,
}

/// Reads and writes save files in one directory.
#[derive(Debug, Clone)]
pub struct StateManager {
    save_directory: PathBuf,
    auto_save_enabled: bool,
    auto_save_interval: u32,
    action_count: u32,
}

impl Default for StateManager {
    fn default() -> Self {
        Self::new("saves")
    }
}

fn with_extension(filename: &str) -> String {
    if filename.ends_with(".json") {
        filename.to_string()
    } else {
        format!("{}.json", filename)
    }
}

impl StateManager {
    pub fn new(save_directory: impl Into<PathBuf>) -> Self {
        Self {
            save_directory: save_directory.into(),
            auto_save_enabled: true,
            auto_save_interval: 10,
            action_count: 0,
        }
    }

    /// Configure auto-save. An interval of 0 is treated as 1.
    pub fn with_auto_save(mut self, enabled: bool, interval: u32) -> Self {
        self.auto_save_enabled = enabled;
        self.auto_save_interval = interval.max(1);
        self
    }

    pub fn save_directory(&self) -> &Path {
        &self.save_directory
    }

    fn path_for(&self, filename: &str) -> PathBuf {
        self.save_directory.join(with_extension(filename))
    }

    /// Write a snapshot. Without a filename one is made from the current
    /// time; `.json` is appended when missing. Returns the written path.
    pub fn save(
        &self,
        snapshot: &StorySnapshot,
        filename: Option<&str>,
    ) -> Result<PathBuf, PersistError> {
        fs::create_dir_all(&self.save_directory)?;
        let saved_at = Utc::now();
        let filename = match filename {
            Some(name) => name.to_string(),
            None => format!("save_{}", saved_at.format("%Y%m%d_%H%M%S")),
        };
        let path = self.path_for(&filename);

        let envelope = SaveFile {
            version: SAVE_VERSION,
            saved_at,
            game_state: snapshot.clone(),
        };
        fs::write(&path, serde_json::to_string_pretty(&envelope)?)?;
        info!(path = %path.display(), "story saved");
        Ok(path)
    }

    /// Read a snapshot, reporting why it failed.
    pub fn try_load(&self, filename: &str) -> Result<StorySnapshot, PersistError> {
        let content = fs::read_to_string(self.path_for(filename))?;
        let saved: SaveFile = serde_json::from_str(&content)?;
        if saved.version != SAVE_VERSION {
            return Err(PersistError::VersionMismatch {
                expected: SAVE_VERSION,
                found: saved.version,
            });
        }
        Ok(saved.game_state)
    }

    /// Read a snapshot. Missing or malformed files give `None`.
    pub fn load(&self, filename: &str) -> Option<StorySnapshot> {
        match self.try_load(filename) {
            Ok(snapshot) => Some(snapshot),
            Err(err) => {
                warn!(filename, error = %err, "load failed");
                None
            }
        }
    }

    /// Every readable save, newest first. Unreadable files are skipped.
    pub fn list_saves(&self) -> Vec<SaveInfo> {
        #[derive(Deserialize)]
        struct Header {
            version: u32,
            saved_at: DateTime<Utc>,
        }

        let Ok(entries) = fs::read_dir(&self.save_directory) else {
            return Vec::new();
        };
        let mut saves: Vec<SaveInfo> = entries
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
            .filter_map(|path| {
                let content = fs::read_to_string(&path).ok()?;
                let header: Header = serde_json::from_str(&content).ok()?;
                let filename = path.file_name()?.to_string_lossy().into_owned();
                Some(SaveInfo {
                    filename,
                    saved_at: header.saved_at,
                    version: header.version,
                })
            })
            .collect();
        saves.sort_by(|a, b| b.saved_at.cmp(&a.saved_at));
        saves
    }

    /// Delete a save. Returns whether a file was removed.
    pub fn delete_save(&self, filename: &str) -> bool {
        fs::remove_file(self.path_for(filename)).is_ok()
    }

    /// Count one action and save to `autosave.json` on every Nth call.
    pub fn auto_save(&mut self, game: &StoryLoop) -> Option<PathBuf> {
        if !self.auto_save_enabled {
            return None;
        }
        self.action_count += 1;
        if self.action_count % self.auto_save_interval != 0 {
            return None;
        }
        match self.save(&game.snapshot(), Some("autosave")) {
            Ok(path) => Some(path),
            Err(err) => {
                warn!(error = %err, "auto-save failed");
                None
            }
        }
    }
}

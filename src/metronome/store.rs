//! Rhythm persistence
//!
//! Rhythms are stored as a small JSON document with the divisions kept as a
//! comma-separated string:
//!
//! ```json
//! { "bpm": 123, "div": "3,2,2" }
//! ```
//!
//! Missing keys fall back to the default rhythm, the same way a missing
//! configuration file falls back to the default configuration.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{log_store_error, StoreError};

use super::rhythm::RhythmModel;

/// Storage for the user's rhythm.
pub trait RhythmStore {
    /// Validate and persist `rhythm`.
    fn save(&self, rhythm: &RhythmModel) -> Result<(), StoreError>;

    /// Read the stored rhythm, or the default one if nothing was saved yet.
    fn load(&self) -> Result<RhythmModel, StoreError>;

    /// `load`, logging any failure and falling back to the default rhythm.
    fn load_or_default(&self) -> RhythmModel {
        match self.load() {
            Ok(rhythm) => rhythm,
            Err(err) => {
                log_store_error(&err, "load_or_default");
                RhythmModel::default()
            }
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredRhythm {
    #[serde(default = "default_bpm")]
    bpm: u32,
    #[serde(default = "default_divisions")]
    div: String,
}

fn default_bpm() -> u32 {
    RhythmModel::default().bpm
}

fn default_divisions() -> String {
    serialize_divisions(&RhythmModel::default().divisions)
}

/// `[4, 2, 3]` → `"4,2,3"`
pub fn serialize_divisions(divisions: &[i32]) -> String {
    divisions
        .iter()
        .map(|beats| beats.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

/// `"4,2,3"` → `[4, 2, 3]`
pub fn parse_divisions(serialized: &str) -> Result<Vec<i32>, StoreError> {
    serialized
        .split(',')
        .map(|part| {
            part.trim().parse::<i32>().map_err(|err| StoreError::Format {
                reason: format!("division '{}': {}", part, err),
            })
        })
        .collect()
}

fn check_rhythm(rhythm: &RhythmModel) -> Result<(), StoreError> {
    if rhythm.divisions.is_empty() {
        return Err(StoreError::InvalidRhythm {
            reason: "divisions cannot be empty".to_string(),
        });
    }
    if rhythm.bpm == 0 {
        return Err(StoreError::InvalidRhythm {
            reason: "bpm must be positive".to_string(),
        });
    }
    Ok(())
}

/// [`RhythmStore`] backed by a JSON file.
#[derive(Debug, Clone)]
pub struct JsonRhythmStore {
    path: PathBuf,
}

impl JsonRhythmStore {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, err: std::io::Error) -> StoreError {
        StoreError::Io {
            path: self.path.display().to_string(),
            reason: err.to_string(),
        }
    }
}

impl RhythmStore for JsonRhythmStore {
    fn save(&self, rhythm: &RhythmModel) -> Result<(), StoreError> {
        check_rhythm(rhythm)?;

        let stored = StoredRhythm {
            bpm: rhythm.bpm,
            div: serialize_divisions(&rhythm.divisions),
        };
        let json = serde_json::to_string_pretty(&stored).map_err(|err| StoreError::Format {
            reason: err.to_string(),
        })?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|err| self.io_error(err))?;
        }
        fs::write(&self.path, json).map_err(|err| self.io_error(err))?;

        log::info!("[RhythmStore] Saved rhythm to {:?}", self.path);
        Ok(())
    }

    fn load(&self) -> Result<RhythmModel, StoreError> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                log::info!(
                    "[RhythmStore] No rhythm at {:?}, using the default",
                    self.path
                );
                return Ok(RhythmModel::default());
            }
            Err(err) => return Err(self.io_error(err)),
        };

        let stored: StoredRhythm =
            serde_json::from_str(&contents).map_err(|err| StoreError::Format {
                reason: err.to_string(),
            })?;
        let rhythm = RhythmModel {
            bpm: stored.bpm,
            divisions: parse_divisions(&stored.div)?,
        };
        check_rhythm(&rhythm)?;
        Ok(rhythm)
    }
}

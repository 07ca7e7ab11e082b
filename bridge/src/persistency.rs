use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Resume state of the two event streams: the last fully processed tfchain
/// block and the horizon paging token of the last handled stellar transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeight {
    #[serde(rename = "lastHeight")]
    pub last_height: u32,
    #[serde(rename = "stellarCursor", default)]
    pub stellar_cursor: String,
}

pub struct ChainPersistency {
    location: PathBuf,
}

impl ChainPersistency {
    pub fn new(location: impl Into<PathBuf>) -> Self {
        Self {
            location: location.into(),
        }
    }

    pub fn save_height(&self, height: u32) -> Result<()> {
        let mut state = self.get_height()?;
        state.last_height = height;
        self.save(&state)
    }

    pub fn save_stellar_cursor(&self, cursor: &str) -> Result<()> {
        let mut state = self.get_height()?;
        state.stellar_cursor = cursor.to_string();
        self.save(&state)
    }

    /// Missing file means a fresh node: zero values.
    pub fn get_height(&self) -> Result<BlockHeight> {
        let data = match fs::read(&self.location) {
            Ok(data) => data,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(BlockHeight::default()),
            Err(err) => {
                return Err(err).with_context(|| {
                    format!("failed to read persistency file {}", self.location.display())
                })
            }
        };
        serde_json::from_slice(&data).with_context(|| {
            format!(
                "failed to decode persistency file {}",
                self.location.display()
            )
        })
    }

    /// Write the whole record to a temp file, fsync and rename it over the
    /// target so a crash mid-write never leaves a torn state behind.
    fn save(&self, state: &BlockHeight) -> Result<()> {
        let data = serde_json::to_vec(state)?;
        let tmp = self.location.with_extension("tmp");
        {
            let mut file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .mode(0o644)
                .open(&tmp)
                .with_context(|| format!("failed to open temp file {}", tmp.display()))?;
            file.write_all(&data)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &self.location).with_context(|| {
            format!(
                "failed to move state into place at {}",
                self.location.display()
            )
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, ChainPersistency) {
        let dir = tempfile::tempdir().unwrap();
        let persistency = ChainPersistency::new(dir.path().join("node.json"));
        (dir, persistency)
    }

    #[test]
    fn absent_file_reads_as_zero_values() {
        let (_dir, persistency) = store();
        let state = persistency.get_height().unwrap();
        assert_eq!(state, BlockHeight::default());
    }

    #[test]
    fn saving_one_field_keeps_the_other() {
        let (_dir, persistency) = store();
        persistency.save_stellar_cursor("1287312").unwrap();
        persistency.save_height(512).unwrap();

        let state = persistency.get_height().unwrap();
        assert_eq!(state.last_height, 512);
        assert_eq!(state.stellar_cursor, "1287312");
    }

    #[test]
    fn file_format_is_stable() {
        let (dir, persistency) = store();
        persistency.save_height(7).unwrap();
        let raw = fs::read_to_string(dir.path().join("node.json")).unwrap();
        assert_eq!(raw, r#"{"lastHeight":7,"stellarCursor":""}"#);
    }

    #[test]
    fn garbage_on_disk_surfaces_as_error() {
        let (dir, persistency) = store();
        fs::write(dir.path().join("node.json"), b"{not json").unwrap();
        assert!(persistency.get_height().is_err());
    }
}

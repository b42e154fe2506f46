use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::{ClientError, Result};
use crate::store::StoreSnapshot;

/// On-device storage for signed-out users. The whole snapshot is rewritten
/// after every mutation.
#[derive(Debug, Clone)]
pub struct GuestStorage {
    path: PathBuf,
}

impl GuestStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Missing files load as an empty snapshot. Unreadable JSON is reported
    /// so it is never silently overwritten.
    pub fn load(&self) -> Result<StoreSnapshot> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("No guest data at {}", self.path.display());
                return Ok(StoreSnapshot::default());
            }
            Err(e) => return Err(e.into()),
        };
        serde_json::from_str(&raw).map_err(|e| {
            warn!("Corrupt guest data at {}: {}", self.path.display(), e);
            ClientError::Storage(e.to_string())
        })
    }

    pub fn save(&self, snapshot: &StoreSnapshot) -> Result<()> {
        let json =
            serde_json::to_string(snapshot).map_err(|e| ClientError::Storage(e.to_string()))?;
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    pub fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::LocalBookmark;

    #[test]
    fn missing_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let storage = GuestStorage::new(dir.path().join("guest.json"));
        assert_eq!(storage.load().unwrap(), StoreSnapshot::default());
    }

    #[test]
    fn snapshot_survives_reload() {
        let dir = tempfile::tempdir().unwrap();
        let storage = GuestStorage::new(dir.path().join("nested").join("guest.json"));

        let mut snapshot = StoreSnapshot::default();
        snapshot.category_order = vec!["Work".into(), "Reading".into()];
        snapshot.categories.insert(
            "Work".into(),
            vec![LocalBookmark::new("Docs", "https://docs.rs")],
        );
        snapshot.categories.insert("Reading".into(), vec![]);
        snapshot.category_emojis.insert("Work".into(), "💼".into());
        snapshot.category_public_status.insert("Work".into(), true);
        snapshot.category_public_status.insert("Reading".into(), false);

        storage.save(&snapshot).unwrap();
        assert_eq!(storage.load().unwrap(), snapshot);

        storage.clear().unwrap();
        assert!(!storage.path().exists());
        storage.clear().unwrap();
    }

    #[test]
    fn corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("guest.json");
        fs::write(&path, "{not json").unwrap();
        assert!(matches!(
            GuestStorage::new(path).load(),
            Err(ClientError::Storage(_))
        ));
    }
}

//! Durable table of every device the collection has ever seen.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use medley_core::{DeviceId, Location};

use crate::error::DeviceError;
use crate::handler::DeviceKind;

/// One row of the device table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceRecord {
    pub id: DeviceId,
    pub kind: DeviceKind,
    pub label: Option<String>,
    /// Durable identity: volume UUID, or `protocol://server/share`.
    pub identity: String,
    /// Where the device was mounted the last time it was seen.
    pub last_mount_point: Option<PathBuf>,
    pub last_seen: DateTime<Utc>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct TableData {
    next_id: i64,
    devices: Vec<DeviceRecord>,
    #[serde(default)]
    collection_folders: Vec<Location>,
}

/// Device table, kept in memory and optionally mirrored to a JSON file on
/// every change.
#[derive(Debug)]
pub struct DeviceTable {
    data: Mutex<TableData>,
    path: Option<PathBuf>,
}

impl DeviceTable {
    /// Create a table that is never written to disk.
    pub fn in_memory() -> Self {
        Self {
            data: Mutex::new(TableData::default()),
            path: None,
        }
    }

    /// Open the table stored at `path`, creating an empty one if the file
    /// does not exist yet.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, DeviceError> {
        let path = path.into();
        let data = if path.exists() {
            let bytes = std::fs::read(&path).map_err(|source| DeviceError::Io {
                path: path.clone(),
                source,
            })?;
            serde_json::from_slice(&bytes)?
        } else {
            TableData::default()
        };
        Ok(Self {
            data: Mutex::new(data),
            path: Some(path),
        })
    }

    fn lock(&self) -> MutexGuard<'_, TableData> {
        self.data.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn persist(&self, data: &TableData) -> Result<(), DeviceError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let json = serde_json::to_vec_pretty(data)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| DeviceError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        std::fs::write(path, json).map_err(|source| DeviceError::Io {
            path: path.clone(),
            source,
        })
    }

    /// Find a device by kind and durable identity.
    pub fn find(&self, kind: DeviceKind, identity: &str) -> Option<DeviceRecord> {
        self.lock()
            .devices
            .iter()
            .find(|d| d.kind == kind && d.identity == identity)
            .cloned()
    }

    /// Look up a device by id.
    pub fn record(&self, id: DeviceId) -> Option<DeviceRecord> {
        self.lock().devices.iter().find(|d| d.id == id).cloned()
    }

    /// Every known device, ordered by id.
    pub fn records(&self) -> Vec<DeviceRecord> {
        let mut records = self.lock().devices.clone();
        records.sort_by_key(|d| d.id);
        records
    }

    /// Record that a device is mounted at `mount_point`, registering it with
    /// a fresh id if it was never seen before.
    pub fn register(
        &self,
        kind: DeviceKind,
        identity: &str,
        label: Option<String>,
        mount_point: Option<&Path>,
    ) -> Result<DeviceRecord, DeviceError> {
        let mut data = self.lock();
        let now = Utc::now();

        let record = match data
            .devices
            .iter_mut()
            .find(|d| d.kind == kind && d.identity == identity)
        {
            Some(existing) => {
                if let Some(mount) = mount_point {
                    existing.last_mount_point = Some(mount.to_path_buf());
                }
                if label.is_some() {
                    existing.label = label;
                }
                existing.last_seen = now;
                existing.clone()
            }
            None => {
                let id = DeviceId::new(data.next_id.max(1));
                data.next_id = id.0 + 1;
                debug!(device_id = %id, %identity, %kind, "Registering new device");
                let record = DeviceRecord {
                    id,
                    kind,
                    label,
                    identity: identity.to_string(),
                    last_mount_point: mount_point.map(Path::to_path_buf),
                    last_seen: now,
                };
                data.devices.push(record.clone());
                record
            }
        };

        self.persist(&data)?;
        Ok(record)
    }

    /// Mount point a device had the last time it was seen.
    pub fn last_mount_point(&self, id: DeviceId) -> Option<PathBuf> {
        self.lock()
            .devices
            .iter()
            .find(|d| d.id == id)
            .and_then(|d| d.last_mount_point.clone())
    }

    /// Stored collection folders, in the order they were set.
    pub fn collection_folders(&self) -> Vec<Location> {
        self.lock().collection_folders.clone()
    }

    /// Replace the stored collection folders.
    pub fn set_collection_folders(&self, folders: Vec<Location>) -> Result<(), DeviceError> {
        let mut data = self.lock();
        data.collection_folders = folders;
        self.persist(&data)
    }
}

impl Default for DeviceTable {
    fn default() -> Self {
        Self::in_memory()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_assigns_stable_ids() {
        let table = DeviceTable::in_memory();
        let a = table
            .register(DeviceKind::MassStorage, "uuid-a", None, Some(Path::new("/media/a")))
            .unwrap();
        let b = table
            .register(DeviceKind::MassStorage, "uuid-b", None, Some(Path::new("/media/b")))
            .unwrap();
        assert_ne!(a.id, b.id);
        assert!(!a.id.is_none());

        let again = table
            .register(DeviceKind::MassStorage, "uuid-a", None, Some(Path::new("/media/a2")))
            .unwrap();
        assert_eq!(again.id, a.id);
        assert_eq!(table.last_mount_point(a.id), Some(PathBuf::from("/media/a2")));
    }

    #[test]
    fn test_same_identity_different_kind() {
        let table = DeviceTable::in_memory();
        let a = table.register(DeviceKind::Nfs, "x", None, None).unwrap();
        let b = table.register(DeviceKind::Smb, "x", None, None).unwrap();
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_table_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("devices.json");

        let id = {
            let table = DeviceTable::open(&path).unwrap();
            table
                .set_collection_folders(vec![Location::new(DeviceId::NONE, "music")])
                .unwrap();
            table
                .register(DeviceKind::MassStorage, "uuid-a", Some("USB".into()), Some(Path::new("/media/a")))
                .unwrap()
                .id
        };

        let table = DeviceTable::open(&path).unwrap();
        let record = table.record(id).unwrap();
        assert_eq!(record.label.as_deref(), Some("USB"));
        assert_eq!(table.collection_folders().len(), 1);
    }
}

//! Translation between absolute paths and device-relative locations.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use indexmap::IndexSet;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use medley_core::{DeviceId, Location};

use crate::error::DeviceError;
use crate::factory::{DeviceHandlerFactory, default_factories};
use crate::handler::{DeviceDescriptor, DeviceHandler};
use crate::table::{DeviceRecord, DeviceTable};

/// Change in the set of live devices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceEvent {
    Added(DeviceId),
    Removed(DeviceId),
}

/// A device from the device table together with its live status.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceStatus {
    pub record: DeviceRecord,
    /// Current mount point when the device is live.
    pub mount_path: Option<PathBuf>,
}

impl DeviceStatus {
    pub fn is_live(&self) -> bool {
        self.mount_path.is_some()
    }
}

/// Lexically normalize a path: drop `.` components and fold `..` into
/// their parent. Never touches the filesystem.
pub fn clean_path(path: &Path) -> PathBuf {
    let mut cleaned = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !cleaned.pop() && !cleaned.has_root() {
                    cleaned.push("..");
                }
            }
            other => cleaned.push(other),
        }
    }
    cleaned
}

fn root() -> &'static Path {
    Path::new("/")
}

/// Maps paths to `(device id, relative path)` pairs and back, tracking which
/// devices are currently mounted.
///
/// The live handler map sits behind a single mutex; handlers are built
/// outside of it since building one may write the device table.
#[derive(Debug)]
pub struct DeviceResolver {
    table: Arc<DeviceTable>,
    factories: Vec<Box<dyn DeviceHandlerFactory>>,
    handlers: Mutex<BTreeMap<DeviceId, Arc<dyn DeviceHandler>>>,
    events_tx: broadcast::Sender<DeviceEvent>,
}

impl DeviceResolver {
    /// Create a resolver with the built-in factories.
    pub fn new(table: Arc<DeviceTable>) -> Self {
        Self::with_factories(table, default_factories())
    }

    /// Create a resolver trying `factories` in order.
    pub fn with_factories(
        table: Arc<DeviceTable>,
        factories: Vec<Box<dyn DeviceHandlerFactory>>,
    ) -> Self {
        let (events_tx, _) = broadcast::channel(32);
        Self {
            table,
            factories,
            handlers: Mutex::new(BTreeMap::new()),
            events_tx,
        }
    }

    fn handlers(&self) -> MutexGuard<'_, BTreeMap<DeviceId, Arc<dyn DeviceHandler>>> {
        self.handlers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn handler(&self, id: DeviceId) -> Option<Arc<dyn DeviceHandler>> {
        self.handlers().get(&id).cloned()
    }

    /// The durable device table.
    pub fn table(&self) -> &DeviceTable {
        &self.table
    }

    /// Subscribe to device changes.
    pub fn subscribe(&self) -> broadcast::Receiver<DeviceEvent> {
        self.events_tx.subscribe()
    }

    /// Absolute path of `relative` on device `device_id`.
    ///
    /// Absolute input is returned unchanged (cleaned). Offline devices
    /// resolve against their last known mount point; unknown devices
    /// resolve against the filesystem root.
    pub fn resolve_absolute(&self, device_id: DeviceId, relative: &Path) -> PathBuf {
        if relative.has_root() {
            return clean_path(relative);
        }
        if device_id.is_none() {
            return clean_path(&root().join(relative));
        }
        if let Some(handler) = self.handler(device_id) {
            return clean_path(&handler.absolute_path(relative));
        }
        match self.table.last_mount_point(device_id) {
            Some(mount) => clean_path(&mount.join(relative)),
            None => {
                warn!(%device_id, path = %relative.display(), "Unknown device, resolving against /");
                clean_path(&root().join(relative))
            }
        }
    }

    /// Path of `absolute` relative to the mount point of `device_id`, or to
    /// the filesystem root when the device is not live.
    pub fn resolve_relative(&self, device_id: DeviceId, absolute: &Path) -> PathBuf {
        let absolute = clean_path(absolute);
        if !device_id.is_none() {
            if let Some(handler) = self.handler(device_id) {
                return handler.relative_path(&absolute);
            }
        }
        absolute
            .strip_prefix(root())
            .map(Path::to_path_buf)
            .unwrap_or(absolute)
    }

    /// Device whose mount point is the longest prefix of `absolute`.
    pub fn device_id_for(&self, absolute: &Path) -> DeviceId {
        let absolute = clean_path(absolute);
        self.handlers()
            .values()
            .filter(|h| absolute.starts_with(h.mount_path()))
            .max_by_key(|h| h.mount_path().components().count())
            .map(|h| h.device_id())
            .unwrap_or(DeviceId::NONE)
    }

    /// Device-independent location of an absolute path.
    pub fn locate(&self, absolute: &Path) -> Location {
        let device_id = self.device_id_for(absolute);
        Location::new(device_id, self.resolve_relative(device_id, absolute))
    }

    /// Ids of all mounted devices, always including [`DeviceId::NONE`].
    pub fn live_device_ids(&self) -> BTreeSet<DeviceId> {
        let mut ids: BTreeSet<DeviceId> = self.handlers().keys().copied().collect();
        ids.insert(DeviceId::NONE);
        ids
    }

    /// Register a device that was just mounted. Returns its id, or `None`
    /// when no factory handles it.
    pub fn on_device_appeared(&self, descriptor: &DeviceDescriptor) -> Option<DeviceId> {
        let factory = self.factories.iter().find(|f| f.can_handle(descriptor))?;

        let handler = match factory.create_handler(descriptor, &self.table) {
            Ok(handler) => handler,
            Err(err) => {
                warn!(identity = %descriptor.identity, error = %err, "Failed to create device handler");
                return None;
            }
        };
        let id = handler.device_id();

        if let Some(previous) = self.handlers().insert(id, Arc::clone(&handler)) {
            debug!(device_id = %id, old_mount = %previous.mount_path().display(), "Replacing device handler");
        }
        info!(device_id = %id, kind = %handler.kind(), mount = %handler.mount_path().display(), "Device added");
        let _ = self.events_tx.send(DeviceEvent::Added(id));
        Some(id)
    }

    /// Forget the handler of a device that was unmounted.
    pub fn on_device_disappeared(&self, identity: &str) -> Option<DeviceId> {
        let id = {
            let mut handlers = self.handlers();
            let id = handlers
                .iter()
                .find(|(_, h)| h.matches_identity(identity))
                .map(|(id, _)| *id)?;
            handlers.remove(&id);
            id
        };
        info!(device_id = %id, %identity, "Device removed");
        let _ = self.events_tx.send(DeviceEvent::Removed(id));
        Some(id)
    }

    /// Store the collection folders, each against the device it lives on.
    pub fn set_collection_folders(&self, folders: &[PathBuf]) -> Result<(), DeviceError> {
        let locations = folders.iter().map(|f| self.locate(f)).collect();
        self.table.set_collection_folders(locations)
    }

    /// Absolute paths of the collection folders on live devices, without
    /// duplicates, in the order they were set.
    pub fn collection_folders(&self) -> Vec<PathBuf> {
        let live = self.live_device_ids();
        self.table
            .collection_folders()
            .into_iter()
            .filter(|loc| live.contains(&loc.device_id))
            .map(|loc| self.resolve_absolute(loc.device_id, &loc.rpath))
            .collect::<IndexSet<_>>()
            .into_iter()
            .collect()
    }

    /// Whether `path` is one of the collection folders or below one.
    pub fn is_dir_in_collection(&self, path: &Path) -> bool {
        let path = clean_path(path);
        self.collection_folders()
            .iter()
            .any(|folder| path.starts_with(folder))
    }

    /// Every device in the device table with its live status.
    pub fn devices(&self) -> Vec<DeviceStatus> {
        let handlers = self.handlers().clone();
        self.table
            .records()
            .into_iter()
            .map(|record| DeviceStatus {
                mount_path: handlers
                    .get(&record.id)
                    .map(|h| h.mount_path().to_path_buf()),
                record,
            })
            .collect()
    }
}

//! Device handlers: the live view of one mounted storage device.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use medley_core::DeviceId;

/// Family of a storage device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[strum(serialize_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum DeviceKind {
    MassStorage,
    Nfs,
    Smb,
}

/// Protocol of a network share.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[strum(serialize_all = "lowercase")]
pub enum ShareProtocol {
    Nfs,
    Smb,
}

/// What a device is, as reported by the hardware layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceMedium {
    /// A local or removable volume with a filesystem UUID.
    Volume { uuid: String, label: Option<String> },
    /// A mounted network share.
    NetworkShare {
        protocol: ShareProtocol,
        server: String,
        share: String,
    },
}

/// A device that just appeared, as delivered by the device event source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceDescriptor {
    /// Identifier the event source uses for this device; the same value
    /// arrives when the device disappears.
    pub identity: String,
    /// Where the device is mounted, if it is.
    pub mount_path: Option<PathBuf>,
    pub medium: DeviceMedium,
}

impl DeviceDescriptor {
    /// Describe a mounted volume.
    pub fn volume(
        identity: impl Into<String>,
        uuid: impl Into<String>,
        mount_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            identity: identity.into(),
            mount_path: Some(mount_path.into()),
            medium: DeviceMedium::Volume {
                uuid: uuid.into(),
                label: None,
            },
        }
    }

    /// Describe a mounted network share.
    pub fn share(
        identity: impl Into<String>,
        protocol: ShareProtocol,
        server: impl Into<String>,
        share: impl Into<String>,
        mount_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            identity: identity.into(),
            mount_path: Some(mount_path.into()),
            medium: DeviceMedium::NetworkShare {
                protocol,
                server: server.into(),
                share: share.into(),
            },
        }
    }

    /// Set the volume label (builder style).
    pub fn with_label(mut self, new_label: impl Into<String>) -> Self {
        if let DeviceMedium::Volume { ref mut label, .. } = self.medium {
            *label = Some(new_label.into());
        }
        self
    }

    /// Key under which the device is stored in the device table. Stable
    /// across mounts, unlike `identity`.
    pub fn durable_key(&self) -> String {
        match &self.medium {
            DeviceMedium::Volume { uuid, .. } => uuid.clone(),
            DeviceMedium::NetworkShare {
                protocol,
                server,
                share,
            } => format!("{protocol}://{server}/{}", share.trim_start_matches('/')),
        }
    }

    /// Human readable label.
    pub fn label(&self) -> Option<String> {
        match &self.medium {
            DeviceMedium::Volume { label, .. } => label.clone(),
            DeviceMedium::NetworkShare { server, share, .. } => Some(format!("{server}:{share}")),
        }
    }
}

/// Live capabilities of one mounted device.
pub trait DeviceHandler: Send + Sync + fmt::Debug {
    /// Durable id of the device.
    fn device_id(&self) -> DeviceId;

    fn kind(&self) -> DeviceKind;

    /// Current mount point.
    fn mount_path(&self) -> &Path;

    /// Compose an absolute path from a device-relative one.
    fn absolute_path(&self, relative: &Path) -> PathBuf {
        self.mount_path().join(relative)
    }

    /// Express an absolute path on this device relative to its mount point.
    fn relative_path(&self, absolute: &Path) -> PathBuf {
        absolute
            .strip_prefix(self.mount_path())
            .map(Path::to_path_buf)
            .unwrap_or_else(|_| absolute.to_path_buf())
    }

    /// Whether this handler belongs to the device the event source calls
    /// `identity`.
    fn matches_identity(&self, identity: &str) -> bool;
}

/// Handler shared by every built-in device kind: a device id and where the
/// device is mounted.
#[derive(Debug, Clone)]
pub struct MountedDevice {
    id: DeviceId,
    kind: DeviceKind,
    identity: String,
    mount_path: PathBuf,
}

impl MountedDevice {
    /// Create a new handler.
    pub fn new(
        id: DeviceId,
        kind: DeviceKind,
        identity: impl Into<String>,
        mount_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            id,
            kind,
            identity: identity.into(),
            mount_path: mount_path.into(),
        }
    }
}

impl DeviceHandler for MountedDevice {
    fn device_id(&self) -> DeviceId {
        self.id
    }

    fn kind(&self) -> DeviceKind {
        self.kind
    }

    fn mount_path(&self) -> &Path {
        &self.mount_path
    }

    fn matches_identity(&self, identity: &str) -> bool {
        self.identity == identity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_durable_key() {
        let volume = DeviceDescriptor::volume("/dev/sdb1", "1234-ABCD", "/media/usb");
        assert_eq!(volume.durable_key(), "1234-ABCD");

        let share = DeviceDescriptor::share(
            "nfs-1",
            ShareProtocol::Nfs,
            "nas",
            "/export/music",
            "/mnt/nas",
        );
        assert_eq!(share.durable_key(), "nfs://nas/export/music");
        assert_eq!(share.label().as_deref(), Some("nas:/export/music"));
    }

    #[test]
    fn test_mounted_device_paths() {
        let handler = MountedDevice::new(DeviceId::new(1), DeviceKind::MassStorage, "usb", "/media/usb");
        assert_eq!(
            handler.absolute_path(Path::new("music/a.mp3")),
            PathBuf::from("/media/usb/music/a.mp3")
        );
        assert_eq!(
            handler.relative_path(Path::new("/media/usb/music")),
            PathBuf::from("music")
        );
        assert!(handler.matches_identity("usb"));
        assert!(!handler.matches_identity("other"));
    }
}

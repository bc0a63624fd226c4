//! Identifier types shared by the catalog, the device layer and the scanner.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Stable numeric identifier of a storage device.
///
/// [`DeviceId::NONE`] stands for "no device": paths stored against it are
/// relative to the filesystem root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DeviceId(pub i64);

impl DeviceId {
    /// The "no device" sentinel.
    pub const NONE: DeviceId = DeviceId(-1);

    /// Create a new DeviceId.
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    /// Whether this is the "no device" sentinel.
    pub fn is_none(self) -> bool {
        self == Self::NONE
    }
}

impl Default for DeviceId {
    fn default() -> Self {
        Self::NONE
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Catalog-assigned identifier of a directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DirectoryId(pub u64);

impl DirectoryId {
    /// Create a new DirectoryId.
    pub fn new(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for DirectoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Catalog-assigned identifier of a track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TrackId(pub u64);

impl TrackId {
    /// Create a new TrackId.
    pub fn new(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

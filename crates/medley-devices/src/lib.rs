//! Device resolution for medley.
//!
//! Tracks are stored against a device id and a path relative to that
//! device's mount point, so a removable drive mounted somewhere else still
//! resolves to the same catalog entries.
//!
//! # Example
//!
//! ```rust
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! use medley_devices::{DeviceDescriptor, DeviceResolver, DeviceTable};
//!
//! let resolver = DeviceResolver::new(Arc::new(DeviceTable::in_memory()));
//! let usb = DeviceDescriptor::volume("/dev/sdb1", "1234-ABCD", "/media/usb");
//! let id = resolver.on_device_appeared(&usb).unwrap();
//!
//! assert_eq!(resolver.device_id_for(Path::new("/media/usb/music")), id);
//! assert_eq!(
//!     resolver.resolve_absolute(id, Path::new("music")),
//!     Path::new("/media/usb/music")
//! );
//! ```

mod error;
mod factory;
mod handler;
mod resolver;
mod table;

pub use error::DeviceError;
pub use factory::{DeviceHandlerFactory, MassStorageFactory, NetworkShareFactory, default_factories};
pub use handler::{
    DeviceDescriptor, DeviceHandler, DeviceKind, DeviceMedium, MountedDevice, ShareProtocol,
};
pub use resolver::{DeviceEvent, DeviceResolver, DeviceStatus, clean_path};
pub use table::{DeviceRecord, DeviceTable};

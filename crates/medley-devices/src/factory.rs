//! Factories that turn device descriptors into handlers.

use std::fmt;
use std::sync::Arc;

use crate::error::DeviceError;
use crate::handler::{DeviceDescriptor, DeviceHandler, DeviceKind, DeviceMedium, MountedDevice, ShareProtocol};
use crate::table::DeviceTable;

/// Builds handlers for one family of devices.
pub trait DeviceHandlerFactory: Send + Sync + fmt::Debug {
    fn kind(&self) -> DeviceKind;

    /// Whether this factory handles the described device.
    fn can_handle(&self, descriptor: &DeviceDescriptor) -> bool;

    /// Create a handler, registering the device in `table` if needed.
    fn create_handler(
        &self,
        descriptor: &DeviceDescriptor,
        table: &DeviceTable,
    ) -> Result<Arc<dyn DeviceHandler>, DeviceError>;
}

/// The built-in factories in the order they are tried.
pub fn default_factories() -> Vec<Box<dyn DeviceHandlerFactory>> {
    vec![
        Box::new(MassStorageFactory),
        Box::new(NetworkShareFactory::nfs()),
        Box::new(NetworkShareFactory::smb()),
    ]
}

fn register(
    kind: DeviceKind,
    descriptor: &DeviceDescriptor,
    table: &DeviceTable,
) -> Result<Arc<dyn DeviceHandler>, DeviceError> {
    let mount = descriptor
        .mount_path
        .as_deref()
        .ok_or_else(|| DeviceError::Unsupported {
            kind: kind.to_string(),
            identity: descriptor.identity.clone(),
        })?;
    let record = table.register(
        kind,
        &descriptor.durable_key(),
        descriptor.label(),
        Some(mount),
    )?;
    Ok(Arc::new(MountedDevice::new(
        record.id,
        kind,
        descriptor.identity.clone(),
        mount,
    )))
}

/// Local and removable volumes.
#[derive(Debug, Default, Clone, Copy)]
pub struct MassStorageFactory;

impl DeviceHandlerFactory for MassStorageFactory {
    fn kind(&self) -> DeviceKind {
        DeviceKind::MassStorage
    }

    fn can_handle(&self, descriptor: &DeviceDescriptor) -> bool {
        matches!(descriptor.medium, DeviceMedium::Volume { ref uuid, .. } if !uuid.is_empty())
            && descriptor.mount_path.is_some()
    }

    fn create_handler(
        &self,
        descriptor: &DeviceDescriptor,
        table: &DeviceTable,
    ) -> Result<Arc<dyn DeviceHandler>, DeviceError> {
        register(self.kind(), descriptor, table)
    }
}

/// Mounted NFS or SMB shares.
#[derive(Debug, Clone, Copy)]
pub struct NetworkShareFactory {
    protocol: ShareProtocol,
}

impl NetworkShareFactory {
    pub fn nfs() -> Self {
        Self {
            protocol: ShareProtocol::Nfs,
        }
    }

    pub fn smb() -> Self {
        Self {
            protocol: ShareProtocol::Smb,
        }
    }
}

impl DeviceHandlerFactory for NetworkShareFactory {
    fn kind(&self) -> DeviceKind {
        match self.protocol {
            ShareProtocol::Nfs => DeviceKind::Nfs,
            ShareProtocol::Smb => DeviceKind::Smb,
        }
    }

    fn can_handle(&self, descriptor: &DeviceDescriptor) -> bool {
        matches!(descriptor.medium, DeviceMedium::NetworkShare { protocol, .. } if protocol == self.protocol)
            && descriptor.mount_path.is_some()
    }

    fn create_handler(
        &self,
        descriptor: &DeviceDescriptor,
        table: &DeviceTable,
    ) -> Result<Arc<dyn DeviceHandler>, DeviceError> {
        register(self.kind(), descriptor, table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_factories_pick_by_medium() {
        let volume = DeviceDescriptor::volume("sdb1", "uuid", "/media/usb");
        let smb = DeviceDescriptor::share("smb-1", ShareProtocol::Smb, "nas", "music", "/mnt/nas");

        let factories = default_factories();
        let picked: Vec<_> = factories
            .iter()
            .filter(|f| f.can_handle(&volume))
            .map(|f| f.kind())
            .collect();
        assert_eq!(picked, vec![DeviceKind::MassStorage]);

        let picked: Vec<_> = factories
            .iter()
            .filter(|f| f.can_handle(&smb))
            .map(|f| f.kind())
            .collect();
        assert_eq!(picked, vec![DeviceKind::Smb]);
    }

    #[test]
    fn test_unmounted_volume_is_not_handled() {
        let mut volume = DeviceDescriptor::volume("sdb1", "uuid", "/media/usb");
        volume.mount_path = None;
        assert!(!MassStorageFactory.can_handle(&volume));
    }

    #[test]
    fn test_create_handler_registers_device() {
        let table = DeviceTable::in_memory();
        let volume = DeviceDescriptor::volume("sdb1", "uuid", "/media/usb");
        let handler = MassStorageFactory.create_handler(&volume, &table).unwrap();

        let record = table.find(DeviceKind::MassStorage, "uuid").unwrap();
        assert_eq!(handler.device_id(), record.id);
        assert_eq!(handler.mount_path(), std::path::Path::new("/media/usb"));
    }
}

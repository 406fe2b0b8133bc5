use crate::DeviceHandle;
use joycon_wire::SubcommandId;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum HubError {
    /// A match event for a product id outside the supported set. The device
    /// is ignored; never fatal.
    #[error("unsupported device {vendor_id:04x}:{product_id:04x}")]
    UnknownDeviceIdentity { vendor_id: u16, product_id: u16 },

    /// The device could not be opened or seized. Fatal for that device only.
    #[error("failed to open {handle}")]
    TransportOpenFailure {
        handle: DeviceHandle,
        #[source]
        source: anyhow::Error,
    },

    /// No matching reply after the retry budget was exhausted. The
    /// initialization sequence degrades instead of aborting.
    #[error("{handle}: no reply to {opcode:?} after {attempts} attempts")]
    SubcommandTimeout {
        handle: DeviceHandle,
        opcode: SubcommandId,
        attempts: u8,
    },
}

// Protocol constants for the Thrustmaster wheel init handshake

use std::time::Duration;

/// Thrustmaster vendor id
pub const VID: u16 = 0x044F;

/// Product id every wheel reports while it is still a generic "Thrustmaster FFB Wheel"
pub const PID: u16 = 0xB65D;

/// Devices a session should be attached to, as (vendor id, product id)
pub const DEVICE_TABLE: &[(u16, u16)] = &[(VID, PID)];

/// HID interface claimed for the handshake
pub const DEFAULT_INTERFACE: u8 = 0;

/// Vendor request asking the wheel for its model
pub const IDENTIFY_REQUEST: u8 = 73;

/// Vendor request switching the wheel into its full-capability mode
pub const SWITCH_REQUEST: u8 = 83;

/// Size of the identify response buffer, the largest response shape
pub const IDENTIFY_RESPONSE_LEN: usize = 16;

/// Packet type of the 7-word identify response
pub const PACKET_TYPE_LONG: u16 = 0x0049;

/// Packet type of the 3-word identify response
pub const PACKET_TYPE_SHORT: u16 = 0x0047;

/// Word index of the model code inside either response shape
pub const MODEL_WORD_INDEX: usize = 2;

/// Fewest response bytes that still carry the model code
pub const MIN_IDENTIFY_RESPONSE_LEN: usize = 2 + (MODEL_WORD_INDEX + 1) * 2;

/// Size of a control setup packet (8 bytes)
pub const SETUP_PACKET_SIZE: usize = 8;

/// The priming sequences go to the second endpoint of the interface
pub const PRIMING_ENDPOINT_INDEX: usize = 1;

/// Per-step timeout for priming transfers, same as the kernel's USB_CTRL_SET_TIMEOUT
pub const DEFAULT_PRIMING_TIMEOUT: Duration = Duration::from_millis(5000);

/// Returns true when the ids belong to a device this crate initializes.
pub fn is_supported(vendor_id: u16, product_id: u16) -> bool {
    DEVICE_TABLE
        .iter()
        .any(|&(vid, pid)| vid == vendor_id && pid == product_id)
}

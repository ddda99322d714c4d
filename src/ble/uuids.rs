//! BLE Service and Characteristic UUIDs.
//!
//! Contains the identifiers the mask firmware advertises and serves.

use uuid::Uuid;

/// Advertised name of the mask.
pub const DEVICE_NAME: &str = "SMART_MassageMask";

/// Name fragments that identify a mask when the exact name is not advertised.
pub const NAME_HINTS: [&str; 3] = ["SMART", "MASSAGE", "MASK"];

/// Mask serial service UUID (common BLE serial service, 16-bit `FFE0`).
pub const SERVICE_UUID: Uuid = Uuid::from_u128(0x0000_ffe0_0000_1000_8000_00805f9b34fb);

/// Command/response characteristic UUID (Read, Write, Notify).
pub const CHARACTERISTIC_UUID: Uuid = Uuid::from_u128(0x0000_ffe1_0000_1000_8000_00805f9b34fb);

/// 16-bit short code of [`SERVICE_UUID`], uppercase.
pub const SERVICE_SHORT_CODE: &str = "FFE0";

/// Check if a service UUID is the mask service.
pub fn is_mask_service(uuid: &Uuid) -> bool {
    *uuid == SERVICE_UUID
}

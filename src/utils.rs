//! Utility functions for the smart-mask-ble crate.

/// Normalize a service identifier for comparison.
///
/// Strips hyphens and surrounding whitespace and uppercases the result, so
/// `0000ffe0-0000-1000-8000-00805f9b34fb` and `0000FFE000001000800000805F9B34FB`
/// compare equal.
///
/// # Example
///
/// ```
/// use smart_mask_ble::normalize_service_id;
///
/// assert_eq!(normalize_service_id(" ffe0 "), "FFE0");
/// ```
pub fn normalize_service_id(id: &str) -> String {
    id.trim()
        .chars()
        .filter(|c| *c != '-')
        .flat_map(char::to_uppercase)
        .collect()
}

/// Format a remaining-time value in seconds as `M:SS`.
///
/// # Example
///
/// ```
/// use smart_mask_ble::format_time_left;
///
/// assert_eq!(format_time_left(905), "15:05");
/// ```
pub fn format_time_left(seconds: u32) -> String {
    format!("{}:{:02}", seconds / 60, seconds % 60)
}

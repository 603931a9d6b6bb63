//! Device registry - known scanner VID/PIDs
//!
//! The FM430 enumerates with several product IDs depending on the interface
//! mode selected on the scanner. Only the HID-POS mode exposes the vendor
//! command channel this driver talks to.

/// Newland Auto-ID vendor ID
pub const VENDOR_ID: u16 = 0x1EAB;

/// Product IDs of the HID-POS interface
pub const HID_POS_PIDS: &[u16] = &[
    0x8003, // FM430 HID-POS
    0x8203, // FM430 HID-POS (later firmware)
];

/// Product IDs of the keyboard-wedge interface (no command channel)
pub const KEYBOARD_WEDGE_PIDS: &[u16] = &[
    0x0C06, // FM430 USB HID-KBW
];

/// Check if PID represents a scanner in HID-POS mode
#[inline]
pub fn is_hid_pos_pid(pid: u16) -> bool {
    HID_POS_PIDS.contains(&pid)
}

/// Check if PID represents a scanner in keyboard-wedge mode
///
/// Such a scanner types barcodes as keystrokes and cannot be configured over
/// this transport until it is switched to HID-POS.
#[inline]
pub fn is_keyboard_wedge_pid(pid: u16) -> bool {
    KEYBOARD_WEDGE_PIDS.contains(&pid)
}

//! HID report framing and timing constants
//!
//! The scanner protocol itself lives above this crate; here a logical frame is
//! just bytes that have to be packed into (or unpacked from) one HID report.

use crate::error::TransportError;
use crate::types::ReportFormat;

/// Default HID report payload size (excluding report ID)
pub const REPORT_SIZE: usize = 64;

/// HID communication timing constants
pub mod timing {
    /// Input read timeout; bounds how often the reader checks for shutdown
    pub const READ_TIMEOUT_MS: i32 = 10;
    /// Sleep after a failed read before trying again
    pub const ERROR_SLEEP_MS: u64 = 100;
    /// Read errors in a row before the device is treated as unplugged
    pub const MAX_CONSECUTIVE_READ_ERRORS: u32 = 5;
    /// Number of attempts for a single output report write
    pub const WRITE_RETRIES: usize = 3;
    /// Delay between write attempts (ms)
    pub const WRITE_RETRY_DELAY_MS: u64 = 20;
}

/// Pack a logical frame into an output report buffer for `HidDevice::write`
///
/// Format: `[report_id] [len]? [frame...] [zero padding]`
pub fn build_output_report(frame: &[u8], format: &ReportFormat) -> Result<Vec<u8>, TransportError> {
    let capacity = format.max_frame_len();
    if frame.len() > capacity {
        return Err(TransportError::FrameTooLarge {
            len: frame.len(),
            capacity,
        });
    }

    let mut buf = vec![0u8; format.report_size + 1];
    buf[0] = format.output_report_id;
    let start = if format.length_prefixed {
        buf[1] = frame.len() as u8;
        2
    } else {
        1
    };
    buf[start..start + frame.len()].copy_from_slice(frame);
    Ok(buf)
}

/// Unpack an input report into the logical frame it carries
///
/// Strips the report ID when the device numbers its input reports and honours
/// the length byte in length-prefixed mode. Zero padding is left in place;
/// whether trailing zeros are padding is a protocol decision.
pub fn parse_input_report(raw: &[u8], format: &ReportFormat) -> Vec<u8> {
    let body = match (format.input_report_id, raw.first()) {
        (Some(id), Some(&first)) if first == id => &raw[1..],
        _ => raw,
    };

    if format.length_prefixed {
        match body.split_first() {
            Some((&len, rest)) => rest[..(len as usize).min(rest.len())].to_vec(),
            None => Vec::new(),
        }
    } else {
        body.to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_report_unnumbered() {
        let format = ReportFormat::default();
        let buf = build_output_report(&[0x7E, 0x01, 0x03], &format).unwrap();
        assert_eq!(buf.len(), REPORT_SIZE + 1);
        assert_eq!(&buf[..4], &[0x00, 0x7E, 0x01, 0x03]);
        assert!(buf[4..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_output_report_length_prefixed() {
        let format = ReportFormat {
            output_report_id: 0x04,
            length_prefixed: true,
            ..ReportFormat::default()
        };
        let buf = build_output_report(&[0x01, 0x54, 0x04], &format).unwrap();
        assert_eq!(&buf[..5], &[0x04, 0x03, 0x01, 0x54, 0x04]);
    }

    #[test]
    fn test_output_report_too_large() {
        let format = ReportFormat::default();
        let frame = vec![0x30; REPORT_SIZE + 1];
        assert_eq!(
            build_output_report(&frame, &format),
            Err(TransportError::FrameTooLarge {
                len: REPORT_SIZE + 1,
                capacity: REPORT_SIZE,
            })
        );
    }

    #[test]
    fn test_input_report_strips_id_and_length() {
        let format = ReportFormat {
            input_report_id: Some(0x02),
            length_prefixed: true,
            ..ReportFormat::default()
        };
        let frame = parse_input_report(&[0x02, 0x03, b'A', b'B', b'C', 0x00, 0x00], &format);
        assert_eq!(frame, b"ABC");
    }

    #[test]
    fn test_input_report_length_clamped() {
        let format = ReportFormat {
            length_prefixed: true,
            ..ReportFormat::default()
        };
        // Length byte claims more than the report holds
        assert_eq!(parse_input_report(&[0x09, b'X', b'Y'], &format), b"XY");
        assert!(parse_input_report(&[], &format).is_empty());
    }

    #[test]
    fn test_input_report_passthrough() {
        let format = ReportFormat::default();
        assert_eq!(
            parse_input_report(&[0x02, 0x01, 0x30], &format),
            vec![0x02, 0x01, 0x30]
        );
    }
}

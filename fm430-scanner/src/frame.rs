//! Outbound frame codec
//!
//! Command frame layout:
//!
//! ```text
//! ~ SOH 0 0 0 0 <storage> ; TAG SUB [payload] , SUB [payload] ; TAG SUB [payload] ; ETX
//! ```
//!
//! Consecutive entries that share a tag are grouped: only the first entry of
//! a run writes the tag, the rest write `,` plus their subtag. Grouping looks
//! at the immediately preceding entry only, so a tag that reappears later in
//! the path starts a new group.
//!
//! The trigger frame is a separate three-byte shape with no tags at all.

use std::fmt;
use std::str::FromStr;

use crate::error::ValidationError;
use crate::protocol::{frame, storage, trigger, TAG_LEN};

// =============================================================================
// Tag / Subtag
// =============================================================================

fn parse_code(s: &str) -> Result<[u8; TAG_LEN], ValidationError> {
    let bytes = s.as_bytes();
    if bytes.len() != TAG_LEN || !bytes.iter().all(|b| b.is_ascii_graphic()) {
        return Err(ValidationError::InvalidCode(s.to_string()));
    }
    Ok([bytes[0], bytes[1], bytes[2]])
}

/// 3-byte setting group identifier (e.g. `SCN`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Tag([u8; TAG_LEN]);

impl Tag {
    pub const fn new(bytes: [u8; TAG_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; TAG_LEN] {
        &self.0
    }
}

impl FromStr for Tag {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_code(s).map(Self)
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from_utf8_lossy(&self.0))
    }
}

/// 3-byte setting identifier within a tag (e.g. `MOD`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Subtag([u8; TAG_LEN]);

impl Subtag {
    pub const fn new(bytes: [u8; TAG_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; TAG_LEN] {
        &self.0
    }
}

impl FromStr for Subtag {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_code(s).map(Self)
    }
}

impl fmt::Display for Subtag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from_utf8_lossy(&self.0))
    }
}

// =============================================================================
// TagPath
// =============================================================================

/// One addressed setting: tag + subtag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TagPathEntry {
    pub tag: Tag,
    pub subtag: Subtag,
}

impl TagPathEntry {
    pub const fn new(tag: Tag, subtag: Subtag) -> Self {
        Self { tag, subtag }
    }
}

impl FromStr for TagPathEntry {
    type Err = ValidationError;

    /// Parse a 6-character code such as `SCNMOD`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != 2 * TAG_LEN || !s.is_ascii() {
            return Err(ValidationError::InvalidCode(s.to_string()));
        }
        let (tag, subtag) = s.split_at(TAG_LEN);
        Ok(Self {
            tag: tag.parse()?,
            subtag: subtag.parse()?,
        })
    }
}

impl fmt::Display for TagPathEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.tag, self.subtag)
    }
}

/// Non-empty ordered list of settings addressed by one frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagPath(Vec<TagPathEntry>);

impl TagPath {
    pub fn new(entries: Vec<TagPathEntry>) -> Result<Self, ValidationError> {
        if entries.is_empty() {
            return Err(ValidationError::EmptyTagPath);
        }
        Ok(Self(entries))
    }

    pub fn single(entry: TagPathEntry) -> Self {
        Self(vec![entry])
    }

    pub fn entries(&self) -> &[TagPathEntry] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// A tag path always holds at least one entry
    pub fn is_empty(&self) -> bool {
        false
    }
}

impl fmt::Display for TagPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, entry) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{}", entry)?;
        }
        Ok(())
    }
}

// =============================================================================
// Payload / StorageType
// =============================================================================

/// Data written for one tag path entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayloadEntry {
    Byte(u8),
    Bytes(Vec<u8>),
}

impl PayloadEntry {
    fn append_to(&self, buf: &mut Vec<u8>) {
        match self {
            PayloadEntry::Byte(b) => buf.push(*b),
            PayloadEntry::Bytes(bytes) => buf.extend_from_slice(bytes),
        }
    }
}

impl From<u8> for PayloadEntry {
    fn from(b: u8) -> Self {
        PayloadEntry::Byte(b)
    }
}

impl From<Vec<u8>> for PayloadEntry {
    fn from(bytes: Vec<u8>) -> Self {
        PayloadEntry::Bytes(bytes)
    }
}

impl From<&[u8]> for PayloadEntry {
    fn from(bytes: &[u8]) -> Self {
        PayloadEntry::Bytes(bytes.to_vec())
    }
}

/// Persistence scope of a write
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum StorageType {
    /// Lost at power-off
    #[default]
    Volatile = storage::VOLATILE,
    /// Saved to flash
    Permanent = storage::PERMANENT,
}

impl StorageType {
    pub fn as_byte(self) -> u8 {
        self as u8
    }

    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            storage::VOLATILE => Some(Self::Volatile),
            storage::PERMANENT => Some(Self::Permanent),
            _ => None,
        }
    }
}

impl fmt::Display for StorageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageType::Volatile => f.write_str("volatile"),
            StorageType::Permanent => f.write_str("permanent"),
        }
    }
}

impl FromStr for StorageType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "volatile" | "temporary" | "#" => Ok(Self::Volatile),
            "permanent" | "flash" | "@" => Ok(Self::Permanent),
            _ => Err(format!(
                "unknown storage type: \"{s}\". Use volatile or permanent"
            )),
        }
    }
}

// =============================================================================
// Frame
// =============================================================================

/// One complete, self-delimited protocol unit
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Frame(Vec<u8>);

impl Frame {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.0
    }
}

impl From<Vec<u8>> for Frame {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for Frame {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, b) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{:02X}", b)?;
        }
        Ok(())
    }
}

// =============================================================================
// Builders
// =============================================================================

/// Serialize a tag path and optional payload into a command frame.
///
/// `payload`, when given, holds one entry per tag path entry; callers check
/// that before getting here (see [`Command::new`]).
pub fn build_command_frame(
    storage_type: StorageType,
    path: &TagPath,
    payload: Option<&[PayloadEntry]>,
) -> Frame {
    debug_assert!(payload.map_or(true, |p| p.len() == path.len()));

    let mut buf = Vec::with_capacity(8 + path.len() * 8 + 2);
    buf.push(frame::SEND_MARKER);
    buf.extend_from_slice(&frame::PREFIX);
    buf.push(storage_type.as_byte());

    let mut previous: Option<&Tag> = None;
    for (i, entry) in path.entries().iter().enumerate() {
        if previous == Some(&entry.tag) {
            buf.push(frame::SUBTAG_DELIMITER);
        } else {
            buf.push(frame::TAG_DELIMITER);
            buf.extend_from_slice(entry.tag.as_bytes());
        }
        buf.extend_from_slice(entry.subtag.as_bytes());

        if let Some(data) = payload.and_then(|p| p.get(i)) {
            data.append_to(&mut buf);
        }
        previous = Some(&entry.tag);
    }

    buf.push(frame::TAG_DELIMITER);
    buf.push(frame::END_MARKER);
    Frame(buf)
}

/// Build the three-byte start/stop scanning frame
pub fn build_trigger_frame(start_scanning: bool) -> Frame {
    let action = if start_scanning {
        trigger::START_BYTE
    } else {
        trigger::STOP_BYTE
    };
    Frame(vec![
        trigger::START_MARKER,
        action,
        trigger::END_OF_TRANSMISSION,
    ])
}

// =============================================================================
// Command
// =============================================================================

/// A validated command: storage scope, addressed settings and their data
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    storage: StorageType,
    path: TagPath,
    payload: Option<Vec<PayloadEntry>>,
}

impl Command {
    /// Create a command, checking that payload and path line up
    pub fn new(
        storage: StorageType,
        path: TagPath,
        payload: Option<Vec<PayloadEntry>>,
    ) -> Result<Self, ValidationError> {
        if let Some(ref p) = payload {
            if p.len() != path.len() {
                return Err(ValidationError::PayloadLength {
                    path: path.len(),
                    payload: p.len(),
                });
            }
        }
        Ok(Self {
            storage,
            path,
            payload,
        })
    }

    /// Command without data (query or action)
    pub fn query(storage: StorageType, path: TagPath) -> Self {
        Self {
            storage,
            path,
            payload: None,
        }
    }

    /// Single-entry command writing one value
    pub fn write(storage: StorageType, entry: TagPathEntry, value: PayloadEntry) -> Self {
        Self {
            storage,
            path: TagPath::single(entry),
            payload: Some(vec![value]),
        }
    }

    pub fn storage(&self) -> StorageType {
        self.storage
    }

    pub fn path(&self) -> &TagPath {
        &self.path
    }

    pub fn payload(&self) -> Option<&[PayloadEntry]> {
        self.payload.as_deref()
    }

    /// Serialize into a wire frame
    pub fn frame(&self) -> Frame {
        build_command_frame(self.storage, &self.path, self.payload())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(code: &str) -> TagPathEntry {
        code.parse().unwrap()
    }

    const HEADER: [u8; 6] = [0x7E, 0x01, 0x30, 0x30, 0x30, 0x30];

    #[test]
    fn test_single_entry_with_byte_payload() {
        let path = TagPath::single(entry("SCNENA"));
        let payload = [PayloadEntry::Byte(0x01)];
        let frame = build_command_frame(StorageType::Volatile, &path, Some(&payload[..]));

        let mut expected = HEADER.to_vec();
        expected.push(b'#');
        expected.extend_from_slice(&[0x3B, b'S', b'C', b'N', b'E', b'N', b'A', 0x01, 0x3B, 0x03]);
        assert_eq!(frame.as_bytes(), expected.as_slice());
    }

    #[test]
    fn test_header_and_trailer_for_every_shape() {
        let paths = [
            vec![entry("SCNMOD")],
            vec![entry("SCNMOD"), entry("SCNTRG")],
            vec![entry("GRBENA"), entry("SCNMOD"), entry("GRBVLL")],
        ];
        for storage in [StorageType::Volatile, StorageType::Permanent] {
            for entries in &paths {
                let path = TagPath::new(entries.clone()).unwrap();
                for payload in [None, Some(vec![PayloadEntry::Byte(b'1'); entries.len()])] {
                    let frame = build_command_frame(storage, &path, payload.as_deref());
                    let bytes = frame.as_bytes();
                    assert_eq!(&bytes[..6], &HEADER);
                    assert_eq!(bytes[6], storage.as_byte());
                    assert_eq!(&bytes[bytes.len() - 2..], &[0x3B, 0x03]);
                }
            }
        }
    }

    #[test]
    fn test_adjacent_tags_are_grouped() {
        let path = TagPath::new(vec![entry("AAAB01"), entry("AAAB02"), entry("CCCB03")]).unwrap();
        let frame = build_command_frame(StorageType::Volatile, &path, None);

        let body = &frame.as_bytes()[7..];
        assert_eq!(body, b";AAAB01,B02;CCCB03;\x03");
        let occurrences = body.windows(3).filter(|w| *w == b"AAA").count();
        assert_eq!(occurrences, 1);
    }

    #[test]
    fn test_non_adjacent_tag_starts_new_group() {
        let path = TagPath::new(vec![entry("AAAB01"), entry("CCCB02"), entry("AAAB03")]).unwrap();
        let frame = build_command_frame(StorageType::Volatile, &path, None);
        assert_eq!(&frame.as_bytes()[7..], b";AAAB01;CCCB02;AAAB03;\x03");
    }

    #[test]
    fn test_multi_byte_payload_is_flattened() {
        let path = TagPath::new(vec![entry("PRESTR"), entry("PREENA")]).unwrap();
        let payload = [PayloadEntry::from(b"AB".as_slice()), PayloadEntry::Byte(b'1')];
        let frame = build_command_frame(StorageType::Permanent, &path, Some(&payload));
        assert_eq!(frame.as_bytes()[6], b'@');
        assert_eq!(&frame.as_bytes()[7..], b";PRESTRAB,ENA1;\x03");
    }

    #[test]
    fn test_trigger_frames() {
        let start = build_trigger_frame(true);
        let stop = build_trigger_frame(false);
        assert_eq!(start.as_bytes(), &[0x01, 0x54, 0x04]);
        assert_eq!(stop.as_bytes(), &[0x01, 0x50, 0x04]);
        assert_eq!(start.as_bytes()[0], stop.as_bytes()[0]);
        assert_eq!(start.as_bytes()[2], stop.as_bytes()[2]);
    }

    #[test]
    fn test_command_rejects_payload_length_mismatch() {
        let path = TagPath::new(vec![entry("SCNMOD"), entry("SCNTRG")]).unwrap();
        let payload = vec![PayloadEntry::Byte(b'0')];
        let err = Command::new(StorageType::Volatile, path, Some(payload)).unwrap_err();
        assert_eq!(err, ValidationError::PayloadLength { path: 2, payload: 1 });
    }

    #[test]
    fn test_empty_tag_path_rejected() {
        assert_eq!(TagPath::new(Vec::new()), Err(ValidationError::EmptyTagPath));
    }

    #[test]
    fn test_code_parsing() {
        let e = entry("SCNTRG");
        assert_eq!(e.tag, Tag::new(*b"SCN"));
        assert_eq!(e.subtag, Subtag::new(*b"TRG"));
        assert_eq!(e.to_string(), "SCNTRG");
        assert!("SCNTR".parse::<TagPathEntry>().is_err());
        assert!("SC TRG".parse::<TagPathEntry>().is_err());
    }

    #[test]
    fn test_storage_type_parse() {
        assert_eq!("permanent".parse::<StorageType>(), Ok(StorageType::Permanent));
        assert_eq!("#".parse::<StorageType>(), Ok(StorageType::Volatile));
        assert!("ram".parse::<StorageType>().is_err());
        assert_eq!(StorageType::from_byte(b'@'), Some(StorageType::Permanent));
    }

    #[test]
    fn test_frame_display_hex() {
        assert_eq!(build_trigger_frame(true).to_string(), "01 54 04");
    }
}

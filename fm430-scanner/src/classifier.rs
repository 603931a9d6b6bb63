//! Inbound frame classification and decoding
//!
//! The scanner sends two kinds of input reports over the same endpoint:
//!
//! - response frames, replying to the command currently in flight:
//!   `STX SOH 0 0 0 0 <storage> <entries> ; ETX`
//! - data frames, carrying a decoded barcode, sent whenever a scan succeeds
//!   and unrelated to any command
//!
//! Classification only looks at header byte positions. Queue state plays no
//! part: a data frame can arrive while a command is outstanding.

use std::fmt;

use thiserror::Error;

use crate::frame::{StorageType, Subtag, Tag, TagPathEntry};
use crate::protocol::{frame, response, TAG_LEN};

/// A data frame that carried nothing but padding
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("data frame carried no payload")]
pub struct NoData;

/// Why a response-shaped frame could not be decoded
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Malformed {
    #[error("missing response header")]
    Header,

    #[error("unknown storage type 0x{0:02X}")]
    StorageType(u8),

    #[error("response too short ({0} bytes)")]
    TooShort(usize),

    #[error("response not terminated by ';' ETX")]
    Unterminated,

    #[error("malformed response entry {0:?}")]
    Entry(String),
}

/// Per-entry status byte at the end of each response entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResponseStatus {
    /// Accepted
    Ack,
    /// Parameter out of range for the setting
    Nak,
    /// Setting not recognised
    Enq,
}

impl ResponseStatus {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            response::ACK => Some(Self::Ack),
            response::NAK => Some(Self::Nak),
            response::ENQ => Some(Self::Enq),
            _ => None,
        }
    }
}

impl fmt::Display for ResponseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResponseStatus::Ack => f.write_str("ACK"),
            ResponseStatus::Nak => f.write_str("NAK (invalid parameter)"),
            ResponseStatus::Enq => f.write_str("ENQ (unknown command)"),
        }
    }
}

/// Decoded barcode payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanData {
    bytes: Vec<u8>,
}

impl ScanData {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// Barcode as text with the terminating CR/LF removed
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.bytes)
            .trim_end_matches(['\r', '\n'])
            .to_string()
    }
}

/// One `tag subtag data status` entry of a response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseEntry {
    pub entry: TagPathEntry,
    pub data: Vec<u8>,
    pub status: ResponseStatus,
}

/// Decoded reply to a command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    storage: StorageType,
    body: Vec<u8>,
}

impl Response {
    /// Storage type echoed by the scanner
    pub fn storage(&self) -> StorageType {
        self.storage
    }

    /// Everything between the storage byte and the closing `; ETX`
    pub fn payload(&self) -> &[u8] {
        &self.body
    }

    /// Split the payload into per-setting entries.
    ///
    /// Entries are `;`-separated; inside one group the scanner repeats the
    /// command's `,` grouping, so only the first entry of a group carries the
    /// tag.
    pub fn entries(&self) -> Result<Vec<ResponseEntry>, Malformed> {
        let mut entries = Vec::new();
        for group in self.body.split(|&b| b == frame::TAG_DELIMITER) {
            let mut tag: Option<Tag> = None;
            for item in group.split(|&b| b == frame::SUBTAG_DELIMITER) {
                let (current_tag, rest) = match tag {
                    Some(t) => (t, item),
                    None if item.len() > TAG_LEN => {
                        (Tag::new([item[0], item[1], item[2]]), &item[TAG_LEN..])
                    }
                    None => return Err(malformed_entry(item)),
                };
                // subtag + status at minimum
                if rest.len() < TAG_LEN + 1 {
                    return Err(malformed_entry(item));
                }
                let (&status_byte, head) =
                    rest.split_last().ok_or_else(|| malformed_entry(item))?;
                let status =
                    ResponseStatus::from_byte(status_byte).ok_or_else(|| malformed_entry(item))?;
                entries.push(ResponseEntry {
                    entry: TagPathEntry::new(
                        current_tag,
                        Subtag::new([head[0], head[1], head[2]]),
                    ),
                    data: head[TAG_LEN..].to_vec(),
                    status,
                });
                tag = Some(current_tag);
            }
        }
        Ok(entries)
    }

    /// True when every entry parsed and was acknowledged
    pub fn is_acknowledged(&self) -> bool {
        self.entries()
            .map(|e| e.iter().all(|e| e.status == ResponseStatus::Ack))
            .unwrap_or(false)
    }

    /// First entry that was not acknowledged
    pub fn first_rejection(&self) -> Option<ResponseEntry> {
        self.entries()
            .ok()?
            .into_iter()
            .find(|e| e.status != ResponseStatus::Ack)
    }
}

fn malformed_entry(item: &[u8]) -> Malformed {
    Malformed::Entry(String::from_utf8_lossy(item).into_owned())
}

/// Drop trailing zero bytes left by fixed-size HID reports
fn strip_padding(frame: &[u8]) -> &[u8] {
    let end = frame.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
    &frame[..end]
}

/// Does the frame have a response header (`STX` + command prefix)?
fn has_response_header(frame: &[u8]) -> bool {
    frame.len() >= response::STORAGE_OFFSET
        && frame[0] == response::MARKER
        && frame[1..response::STORAGE_OFFSET] == frame::PREFIX
}

/// True when the frame is unsolicited scan data rather than a command reply
pub fn is_data_frame(frame: &[u8]) -> bool {
    !has_response_header(frame)
}

/// Extract the barcode payload from a data frame
pub fn decode_data_frame(frame: &[u8]) -> Result<ScanData, NoData> {
    let data = strip_padding(frame);
    if data.is_empty() {
        return Err(NoData);
    }
    Ok(ScanData::new(data.to_vec()))
}

/// Decode a response frame for the command in flight
pub fn decode_response_frame(frame: &[u8]) -> Result<Response, Malformed> {
    let data = strip_padding(frame);
    if !has_response_header(data) {
        return Err(Malformed::Header);
    }

    // header + storage + at least one body byte + ';' ETX
    let min_len = response::STORAGE_OFFSET + 1 + 1 + 2;
    if data.len() < min_len {
        return Err(Malformed::TooShort(data.len()));
    }

    let storage_byte = data[response::STORAGE_OFFSET];
    let storage =
        StorageType::from_byte(storage_byte).ok_or(Malformed::StorageType(storage_byte))?;

    let body = data
        .strip_suffix(&[frame::TAG_DELIMITER, frame::END_MARKER])
        .ok_or(Malformed::Unterminated)?;

    Ok(Response {
        storage,
        body: body[response::STORAGE_OFFSET + 1..].to_vec(),
    })
}

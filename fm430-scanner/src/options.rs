// Option table for FM430 settings
// Every configurable setting is one row: its tag/subtag address and the kind
// of argument it takes. Validation and payload encoding are driven by the row.

use std::collections::HashMap;
use std::fmt;
use std::sync::OnceLock;

use crate::error::ValidationError;
use crate::frame::{Command, PayloadEntry, StorageType, Subtag, Tag, TagPath, TagPathEntry};
use crate::protocol::{self, query};

/// One sanctioned value of an enumerated setting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Choice {
    pub label: &'static str,
    /// Byte sent on the wire
    pub code: u8,
}

impl Choice {
    pub const fn new(label: &'static str, code: u8) -> Self {
        Self { label, code }
    }
}

/// Argument accepted by a setting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgKind {
    /// No argument; sending the code performs the action
    Action,
    /// Decimal number, sent as ASCII digits
    Range { min: u32, max: u32 },
    /// One of a closed set of values, sent as its code byte
    Choice(&'static [Choice]),
    /// Printable ASCII string
    Text { max_len: usize },
}

impl fmt::Display for ArgKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgKind::Action => f.write_str("-"),
            ArgKind::Range { min, max } => write!(f, "{min}..={max}"),
            ArgKind::Choice(choices) => {
                let labels: Vec<&str> = choices.iter().map(|c| c.label).collect();
                f.write_str(&labels.join("|"))
            }
            ArgKind::Text { max_len } => write!(f, "text (max {max_len})"),
        }
    }
}

/// Static description of one setting
#[derive(Debug, Clone, Copy)]
pub struct OptionSpec {
    pub name: &'static str,
    pub entry: TagPathEntry,
    pub kind: ArgKind,
    pub summary: &'static str,
}

const fn code(tag: &[u8; 3], subtag: &[u8; 3]) -> TagPathEntry {
    TagPathEntry::new(Tag::new(*tag), Subtag::new(*subtag))
}

const OFF_ON: &[Choice] = &[Choice::new("off", b'0'), Choice::new("on", b'1')];

const SCAN_MODES: &[Choice] = &[
    Choice::new("level", b'0'),
    Choice::new("sense", b'2'),
    Choice::new("continuous", b'3'),
];

const TRIGGER_STATES: &[Choice] = &[Choice::new("stop", b'0'), Choice::new("start", b'1')];

const ILLUMINATION: &[Choice] = &[
    Choice::new("off", b'0'),
    Choice::new("normal", b'1'),
    Choice::new("always", b'2'),
];

const BEEP_VOLUME: &[Choice] = &[
    Choice::new("loud", b'0'),
    Choice::new("medium", b'1'),
    Choice::new("low", b'2'),
];

/// Longest prefix/suffix the scanner stores
const AFFIX_MAX_LEN: usize = 10;

/// Bytes that would split a text value into extra tag or subtag groups
const RESERVED_TEXT_BYTES: [u8; 3] = [
    protocol::frame::TAG_DELIMITER,
    protocol::frame::SUBTAG_DELIMITER,
    protocol::frame::END_MARKER,
];

/// All known settings
pub const OPTIONS: &[OptionSpec] = &[
    // Scanning
    OptionSpec {
        name: "scan-mode",
        entry: code(b"SCN", b"MOD"),
        kind: ArgKind::Choice(SCAN_MODES),
        summary: "How a scan session starts",
    },
    OptionSpec {
        name: "trigger",
        entry: code(b"SCN", b"TRG"),
        kind: ArgKind::Choice(TRIGGER_STATES),
        summary: "Software trigger",
    },
    OptionSpec {
        name: "read-timeout",
        entry: code(b"ORT", b"SET"),
        kind: ArgKind::Range { min: 0, max: 3_600_000 },
        summary: "Decode session timeout in ms (0 = unlimited)",
    },
    OptionSpec {
        name: "reread-delay-enabled",
        entry: code(b"RRD", b"ENA"),
        kind: ArgKind::Choice(OFF_ON),
        summary: "Suppress rereading the same barcode",
    },
    OptionSpec {
        name: "reread-delay",
        entry: code(b"RRD", b"DUR"),
        kind: ArgKind::Range { min: 0, max: 3_600_000 },
        summary: "Same-barcode reread delay in ms",
    },
    // Illumination / aiming
    OptionSpec {
        name: "illumination",
        entry: code(b"ILL", b"SCN"),
        kind: ArgKind::Choice(ILLUMINATION),
        summary: "Illumination LED behaviour",
    },
    OptionSpec {
        name: "aiming",
        entry: code(b"AML", b"ENA"),
        kind: ArgKind::Choice(ILLUMINATION),
        summary: "Aiming pattern behaviour",
    },
    // Notification
    OptionSpec {
        name: "good-read-beep",
        entry: code(b"GRB", b"ENA"),
        kind: ArgKind::Choice(OFF_ON),
        summary: "Beep on successful decode",
    },
    OptionSpec {
        name: "beep-volume",
        entry: code(b"GRB", b"VLL"),
        kind: ArgKind::Choice(BEEP_VOLUME),
        summary: "Good read beep volume",
    },
    OptionSpec {
        name: "good-read-led",
        entry: code(b"GRL", b"ENA"),
        kind: ArgKind::Choice(OFF_ON),
        summary: "Flash LED on successful decode",
    },
    // Data formatting
    OptionSpec {
        name: "prefix-enabled",
        entry: code(b"APP", b"PEX"),
        kind: ArgKind::Choice(OFF_ON),
        summary: "Prepend the custom prefix",
    },
    OptionSpec {
        name: "prefix",
        entry: code(b"CPR", b"SET"),
        kind: ArgKind::Text {
            max_len: AFFIX_MAX_LEN,
        },
        summary: "Custom prefix",
    },
    OptionSpec {
        name: "suffix-enabled",
        entry: code(b"APP", b"SEX"),
        kind: ArgKind::Choice(OFF_ON),
        summary: "Append the custom suffix",
    },
    OptionSpec {
        name: "suffix",
        entry: code(b"CSU", b"SET"),
        kind: ArgKind::Text {
            max_len: AFFIX_MAX_LEN,
        },
        summary: "Custom suffix",
    },
    OptionSpec {
        name: "code-id",
        entry: code(b"CID", b"ENA"),
        kind: ArgKind::Choice(OFF_ON),
        summary: "Prepend the symbology code ID",
    },
    OptionSpec {
        name: "terminator",
        entry: code(b"TSU", b"ENA"),
        kind: ArgKind::Choice(OFF_ON),
        summary: "Append CR terminator",
    },
    // Symbologies
    OptionSpec {
        name: "qr",
        entry: code(b"QRC", b"ENA"),
        kind: ArgKind::Choice(OFF_ON),
        summary: "Decode QR Code",
    },
    OptionSpec {
        name: "ean13",
        entry: code(b"E13", b"ENA"),
        kind: ArgKind::Choice(OFF_ON),
        summary: "Decode EAN-13",
    },
    OptionSpec {
        name: "code128",
        entry: code(b"128", b"ENA"),
        kind: ArgKind::Choice(OFF_ON),
        summary: "Decode Code 128",
    },
    OptionSpec {
        name: "datamatrix",
        entry: code(b"DMC", b"ENA"),
        kind: ArgKind::Choice(OFF_ON),
        summary: "Decode Data Matrix",
    },
    // System
    OptionSpec {
        name: "factory-defaults",
        entry: code(b"FAC", b"DEF"),
        kind: ArgKind::Action,
        summary: "Restore factory defaults",
    },
    OptionSpec {
        name: "product-name",
        entry: code(b"QRY", b"PDN"),
        kind: ArgKind::Action,
        summary: "Query product name",
    },
    OptionSpec {
        name: "firmware-version",
        entry: code(b"QRY", b"FWV"),
        kind: ArgKind::Action,
        summary: "Query firmware version",
    },
    OptionSpec {
        name: "serial-number",
        entry: code(b"QRY", b"SER"),
        kind: ArgKind::Action,
        summary: "Query serial number",
    },
];

struct OptionIndex {
    by_name: HashMap<&'static str, &'static OptionSpec>,
    by_code: HashMap<TagPathEntry, &'static OptionSpec>,
}

static INDEX: OnceLock<OptionIndex> = OnceLock::new();

fn option_index() -> &'static OptionIndex {
    INDEX.get_or_init(|| OptionIndex {
        by_name: OPTIONS.iter().map(|o| (o.name, o)).collect(),
        by_code: OPTIONS.iter().map(|o| (o.entry, o)).collect(),
    })
}

/// Look up a setting by name (`scan-mode`) or 6-character code (`SCNMOD`)
pub fn find_option(key: &str) -> Option<&'static OptionSpec> {
    let index = option_index();
    if let Some(spec) = index.by_name.get(key.to_ascii_lowercase().as_str()) {
        return Some(*spec);
    }
    let entry: TagPathEntry = key.to_ascii_uppercase().parse().ok()?;
    index.by_code.get(&entry).copied()
}

/// Look up a setting by its tag/subtag address
pub fn option_by_code(entry: &TagPathEntry) -> Option<&'static OptionSpec> {
    option_index().by_code.get(entry).copied()
}

impl OptionSpec {
    /// Validate `value` and turn it into the payload for this setting.
    ///
    /// Actions take no value and encode to an empty payload so they can share
    /// a grouped frame with valued settings.
    pub fn encode(&self, value: Option<&str>) -> Result<PayloadEntry, ValidationError> {
        match self.kind {
            ArgKind::Action => match value {
                None => Ok(PayloadEntry::Bytes(Vec::new())),
                Some(_) => Err(ValidationError::UnexpectedArgument(self.name.to_string())),
            },
            ArgKind::Range { min, max } => {
                let value = self.require(value)?;
                let n: u32 = value
                    .trim()
                    .parse()
                    .map_err(|_| ValidationError::NotANumber {
                        option: self.name.to_string(),
                        value: value.to_string(),
                    })?;
                if n < min || n > max {
                    return Err(ValidationError::OutOfRange {
                        option: self.name.to_string(),
                        value: n,
                        min,
                        max,
                    });
                }
                Ok(PayloadEntry::Bytes(n.to_string().into_bytes()))
            }
            ArgKind::Choice(choices) => {
                let value = self.require(value)?;
                choices
                    .iter()
                    .find(|c| {
                        c.label.eq_ignore_ascii_case(value)
                            || (value.len() == 1 && value.as_bytes()[0] == c.code)
                    })
                    .map(|c| PayloadEntry::Byte(c.code))
                    .ok_or_else(|| ValidationError::NotSanctioned {
                        option: self.name.to_string(),
                        value: value.to_string(),
                        allowed: self.kind.to_string(),
                    })
            }
            ArgKind::Text { max_len } => {
                let value = self.require(value)?;
                if value.len() > max_len {
                    return Err(ValidationError::TooLong {
                        option: self.name.to_string(),
                        len: value.len(),
                        max: max_len,
                    });
                }
                let unprintable = value.bytes().find(|b| !(b' '..=b'~').contains(b));
                if let Some(byte) = unprintable {
                    return Err(ValidationError::NotPrintable {
                        option: self.name.to_string(),
                        byte,
                    });
                }
                let reserved = value.bytes().find(|b| RESERVED_TEXT_BYTES.contains(b));
                if let Some(byte) = reserved {
                    return Err(ValidationError::ReservedByte {
                        option: self.name.to_string(),
                        byte,
                    });
                }
                Ok(PayloadEntry::Bytes(value.as_bytes().to_vec()))
            }
        }
    }

    fn require<'a>(&self, value: Option<&'a str>) -> Result<&'a str, ValidationError> {
        value.ok_or_else(|| ValidationError::MissingArgument(self.name.to_string()))
    }

    /// Command writing `value` to this setting
    pub fn write_command(
        &self,
        value: Option<&str>,
        storage: StorageType,
    ) -> Result<Command, ValidationError> {
        Ok(Command::write(storage, self.entry, self.encode(value)?))
    }

    /// Command reading this setting back.
    ///
    /// Actions are sent bare (they are queries themselves); everything else
    /// gets the current-value suffix.
    pub fn query_command(&self) -> Command {
        match self.kind {
            ArgKind::Action => Command::query(StorageType::Volatile, TagPath::single(self.entry)),
            _ => Command::write(
                StorageType::Volatile,
                self.entry,
                PayloadEntry::Byte(query::CURRENT),
            ),
        }
    }

    /// Render response data for this setting, mapping choice codes to labels
    pub fn describe_value(&self, data: &[u8]) -> String {
        if let ArgKind::Choice(choices) = self.kind {
            if let [b] = data {
                if let Some(choice) = choices.iter().find(|c| c.code == *b) {
                    return choice.label.to_string();
                }
            }
        }
        String::from_utf8_lossy(data).into_owned()
    }
}

/// One grouped command writing several settings at once.
///
/// Settings are framed in the order given; adjacent settings sharing a tag
/// are grouped by the frame codec.
pub fn build_write_command(
    settings: &[(&OptionSpec, Option<&str>)],
    storage: StorageType,
) -> Result<Command, ValidationError> {
    let mut entries = Vec::with_capacity(settings.len());
    let mut payload = Vec::with_capacity(settings.len());
    for (spec, value) in settings {
        payload.push(spec.encode(*value)?);
        entries.push(spec.entry);
    }
    Command::new(storage, TagPath::new(entries)?, Some(payload))
}

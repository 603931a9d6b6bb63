//! Command protocol engine for Newland FM430 barcode scanners
//!
//! This crate sits on top of any [`fm430_transport::Transport`] and provides:
//!
//! - the frame codec for command and trigger frames
//! - classification of inbound reports into scan data and command responses
//! - a FIFO command queue with one command in flight and a response timeout
//! - data subscriptions for unsolicited scan results
//! - a table-driven `set_option` surface over the scanner's settings

pub mod classifier;
pub mod device;
pub mod engine;
pub mod error;
pub mod frame;
pub mod options;
pub mod protocol;
pub mod queue;
pub mod subscription;

pub use classifier::{
    decode_data_frame, decode_response_frame, is_data_frame, Malformed, NoData, Response,
    ResponseEntry, ResponseStatus, ScanData,
};
pub use device::{ScannerConfig, ScannerDevice, DEFAULT_RESPONSE_TIMEOUT};
pub use engine::{ProtocolEngine, QueueStatus};
pub use error::{ScannerError, ValidationError};
pub use frame::{
    build_command_frame, build_trigger_frame, Command, Frame, PayloadEntry, StorageType, Subtag,
    Tag, TagPath, TagPathEntry,
};
pub use options::{
    build_write_command, find_option, option_by_code, ArgKind, Choice, OptionSpec, OPTIONS,
};
pub use queue::{CommandResult, PendingResponse};
pub use subscription::{ScanReceiver, ScanResult, SubscriptionMode};

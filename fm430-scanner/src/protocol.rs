//! Protocol constants for the FM430 command channel

/// Command frame framing bytes
pub mod frame {
    /// Leads every command frame ('~')
    pub const SEND_MARKER: u8 = 0x7E;
    /// Fixed command-frame prefix: SOH followed by "0000"
    pub const PREFIX: [u8; 5] = [0x01, 0x30, 0x30, 0x30, 0x30];
    /// Separates distinct tag groups (';')
    pub const TAG_DELIMITER: u8 = 0x3B;
    /// Separates subtags within a grouped tag (',')
    pub const SUBTAG_DELIMITER: u8 = 0x2C;
    /// Terminates a command frame (ETX)
    pub const END_MARKER: u8 = 0x03;
}

/// Minimal trigger frame bytes
pub mod trigger {
    /// Leads a trigger frame (SOH)
    pub const START_MARKER: u8 = 0x01;
    /// Start scanning ('T')
    pub const START_BYTE: u8 = 0x54;
    /// Stop scanning ('P')
    pub const STOP_BYTE: u8 = 0x50;
    /// Terminates a trigger frame (EOT)
    pub const END_OF_TRANSMISSION: u8 = 0x04;
}

/// Response frame bytes
pub mod response {
    /// Leads every response frame (STX); followed by the command prefix
    pub const MARKER: u8 = 0x02;
    /// Byte offset of the storage type in a response frame
    pub const STORAGE_OFFSET: usize = 1 + super::frame::PREFIX.len();

    /// Command accepted
    pub const ACK: u8 = 0x06;
    /// Command understood, parameter rejected
    pub const NAK: u8 = 0x15;
    /// Command not recognised
    pub const ENQ: u8 = 0x05;
}

/// Storage type bytes
pub mod storage {
    /// Setting applies until power-off
    pub const VOLATILE: u8 = b'#';
    /// Setting is written to flash
    pub const PERMANENT: u8 = b'@';
}

/// Length of a tag or subtag in bytes
pub const TAG_LEN: usize = 3;

/// Tag/subtag of the general-path trigger command (`SCNTRG`)
pub mod scan {
    pub const TAG: [u8; 3] = *b"SCN";
    pub const TRIGGER_SUBTAG: [u8; 3] = *b"TRG";
    /// Payload starting a software-triggered scan
    pub const TRIGGER_START: u8 = b'1';
    /// Payload stopping a software-triggered scan
    pub const TRIGGER_STOP: u8 = b'0';
}

/// Payload suffixes understood by every setting
pub mod query {
    /// Report the current value
    pub const CURRENT: u8 = b'*';
}

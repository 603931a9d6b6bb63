// Newland FM430 Linux Driver - Shared Library
// Driver configuration plus re-exports of the transport and protocol crates

pub mod config;

pub use config::{DriverConfig, TriggerMode};

pub use fm430_scanner as scanner;
pub use fm430_transport as transport;

use nusb::transfer::TransferError;
use std::path::PathBuf;
use thiserror::Error;

/// The primary error type for the `daqboard-lib` library.
#[derive(Error, Debug)]
pub enum DaqError {
    #[error("USB device not found. Is the DAQ board connected?")]
    DeviceNotFound,

    #[error("USB error: {0}")]
    Usb(#[from] nusb::Error),

    #[error("USB transfer error: {0}")]
    Transfer(#[from] TransferError),

    #[error("Timeout during USB operation: {0}")]
    Timeout(#[from] tokio::time::error::Elapsed),

    #[error("Short transfer: expected {expected} bytes, got {actual}")]
    ShortTransfer { expected: usize, actual: usize },

    #[error("Oversized transfer: expected {expected} bytes, got {actual}")]
    OversizedTransfer { expected: usize, actual: usize },

    #[error("Value {value} for field {field} out of range [{min}, {max}]")]
    OutOfRange {
        field: String,
        value: u32,
        min: u32,
        max: u32,
    },

    #[error("Unknown field: {0}")]
    UnknownField(String),

    #[error("Field index {index} out of bounds for register {register} ({len} fields)")]
    FieldIndex {
        register: &'static str,
        index: usize,
        len: usize,
    },

    #[error("Register {0} has no fields")]
    EmptyRegister(&'static str),

    #[error("Field name {name} already declared (in register {register})")]
    DuplicateField { name: String, register: String },

    #[error("Invalid register {register}: {reason}")]
    InvalidRegister { register: &'static str, reason: String },

    #[error("Stream format error: {0}")]
    Format(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse TOML: {0}")]
    Toml(#[from] toml::de::Error),
}

impl DaqError {
    /// True for the failures that abort a transaction on the wire.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            DaqError::DeviceNotFound
                | DaqError::Usb(_)
                | DaqError::Transfer(_)
                | DaqError::Timeout(_)
                | DaqError::ShortTransfer { .. }
                | DaqError::OversizedTransfer { .. }
        )
    }
}

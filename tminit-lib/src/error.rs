use crate::transport::TransferStatus;
use thiserror::Error;

/// The primary error type for the `tminit-lib` library.
#[derive(Error, Debug)]
pub enum TmError {
    #[error("USB device not found. Is a Thrustmaster FFB wheel connected?")]
    DeviceNotFound,

    #[error("USB error: {0}")]
    Usb(#[from] nusb::Error),

    #[error("Session setup failed: {0}")]
    Setup(String),

    #[error("Transfer rejected by the transport: {0}")]
    Submit(String),

    #[error("Transfer completed with {0}")]
    Transfer(TransferStatus),

    #[error("Unknown packet type {0:#06x}")]
    UnrecognizedPacket(u16),

    #[error("Unknown wheel model id {0:#06x}")]
    UnknownModel(u16),

    #[error("Priming sequence {step} could not be sent: {source}")]
    Priming {
        step: usize,
        #[source]
        source: Box<TmError>,
    },

    #[error("Timeout during USB operation: {0}")]
    Timeout(#[from] tokio::time::error::Elapsed),

    #[error("Insufficient data: expected at least {expected} bytes, got {actual}")]
    InsufficientData { expected: usize, actual: usize },

    #[error("Cannot handle {event} while {from}")]
    InvalidTransition { from: String, event: &'static str },
}

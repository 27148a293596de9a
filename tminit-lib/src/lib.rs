pub mod catalog;
pub mod config;
pub mod constants;
pub mod error;
pub mod handshake;
pub mod packet;
pub mod priming;
pub mod session;
pub mod transport;

// Re-export the types a host needs to drive one wheel
pub use config::{PrimingPolicy, SessionConfig};
pub use error::TmError;
pub use handshake::State;
pub use session::Session;
pub use transport::{Transport, UsbTransport};

use crate::constants::{DEFAULT_INTERFACE, DEFAULT_PRIMING_TIMEOUT};
use std::time::Duration;

/// What a session does about the priming sequences.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, strum_macros::Display)]
pub enum PrimingPolicy {
    /// Prime, and go on with identification even if a sequence fails.
    #[default]
    #[strum(serialize = "continue")]
    Continue,
    /// Prime, and fail the attach if a sequence fails.
    #[strum(serialize = "abort")]
    Abort,
    /// Don't prime at all.
    #[strum(serialize = "skip")]
    Skip,
}

/// Per-device session settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    pub interface: u8,
    pub priming: PrimingPolicy,
    pub priming_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            interface: DEFAULT_INTERFACE,
            priming: PrimingPolicy::default(),
            priming_timeout: DEFAULT_PRIMING_TIMEOUT,
        }
    }
}

impl SessionConfig {
    pub fn with_interface(mut self, interface: u8) -> Self {
        self.interface = interface;
        self
    }

    pub fn with_priming(mut self, priming: PrimingPolicy) -> Self {
        self.priming = priming;
        self
    }

    pub fn with_priming_timeout(mut self, timeout: Duration) -> Self {
        self.priming_timeout = timeout;
        self
    }
}

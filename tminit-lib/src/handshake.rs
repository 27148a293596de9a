//! Identification and mode switch state machine.
//!
//! ```text
//! Idle -> IdentifyPending -> Identified -> SwitchPending -> SwitchAcked
//!                        \-> IdentifyFailed             \-> SwitchIgnored
//! ```
//!
//! The machine only moves when a submission is made or a completion is
//! delivered; it never polls. Every failure is terminal for the attach and
//! nothing is retried.

use crate::catalog::{self, ModelEntry, Support};
use crate::constants::{DEFAULT_INTERFACE, IDENTIFY_RESPONSE_LEN, MIN_IDENTIFY_RESPONSE_LEN};
use crate::error::TmError;
use crate::packet::{ControlRequest, IdentifyResponse};
use crate::transport::{Completion, TransferStatus};
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
pub enum State {
    Idle,
    IdentifyPending,
    Identified(&'static ModelEntry),
    IdentifyFailed,
    SwitchPending(&'static ModelEntry),
    SwitchAcked(&'static ModelEntry),
    SwitchIgnored(&'static ModelEntry),
}

impl State {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            State::IdentifyFailed | State::SwitchAcked(_) | State::SwitchIgnored(_)
        )
    }

    pub fn model(&self) -> Option<&'static ModelEntry> {
        match *self {
            State::Identified(entry)
            | State::SwitchPending(entry)
            | State::SwitchAcked(entry)
            | State::SwitchIgnored(entry) => Some(entry),
            State::Idle | State::IdentifyPending | State::IdentifyFailed => None,
        }
    }
}

/// Per-session handshake state with its own request copies and response buffer.
#[derive(Debug)]
pub struct Handshake {
    state: State,
    identify_request: ControlRequest,
    response: [u8; IDENTIFY_RESPONSE_LEN],
    response_len: usize,
    switch_request: ControlRequest,
}

impl Default for Handshake {
    fn default() -> Self {
        Self::new()
    }
}

impl Handshake {
    pub fn new() -> Self {
        Self::for_interface(DEFAULT_INTERFACE)
    }

    /// Handshake whose requests are addressed to `interface`.
    pub fn for_interface(interface: u8) -> Self {
        let index = u16::from(interface);
        Self {
            state: State::Idle,
            identify_request: ControlRequest::identify().with_index(index),
            response: [0; IDENTIFY_RESPONSE_LEN],
            response_len: 0,
            switch_request: ControlRequest::switch(0).with_index(index),
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn model(&self) -> Option<&'static ModelEntry> {
        self.state.model()
    }

    /// The identify response, once it has been read successfully.
    pub fn response(&self) -> Option<&[u8]> {
        self.model().map(|_| &self.response[..self.response_len])
    }

    pub fn identify_request(&self) -> &ControlRequest {
        &self.identify_request
    }

    pub fn switch_request(&self) -> &ControlRequest {
        &self.switch_request
    }

    fn invalid(&self, event: &'static str) -> TmError {
        TmError::InvalidTransition {
            from: self.state.to_string(),
            event,
        }
    }

    /// `Idle -> IdentifyPending`. Returns the request to submit.
    pub fn begin_identify(&mut self) -> Result<ControlRequest, TmError> {
        if self.state != State::Idle {
            return Err(self.invalid("identify submission"));
        }
        self.state = State::IdentifyPending;
        info!("--- Requesting Wheel Model ---");
        Ok(self.identify_request)
    }

    /// `IdentifyPending -> Identified | IdentifyFailed`.
    pub fn on_identify_complete(
        &mut self,
        completion: Completion<Vec<u8>>,
    ) -> Result<&'static ModelEntry, TmError> {
        if self.state != State::IdentifyPending {
            return Err(self.invalid("identify completion"));
        }
        match self.identify(completion) {
            Ok(entry) => {
                info!("Wheel with model id {:#06x} is a {}", entry.model_code, entry.name);
                if entry.support == Support::Partial {
                    warn!(
                        "{} needs more than one switch command, only the first one is known. Initialization may be incomplete.",
                        entry.name
                    );
                }
                self.state = State::Identified(entry);
                Ok(entry)
            }
            Err(err) => {
                error!("{err}, unable to proceed further with wheel init");
                self.state = State::IdentifyFailed;
                Err(err)
            }
        }
    }

    fn identify(
        &mut self,
        completion: Completion<Vec<u8>>,
    ) -> Result<&'static ModelEntry, TmError> {
        let data = completion.into_result()?;
        let len = data.len().min(IDENTIFY_RESPONSE_LEN);
        self.response[..len].copy_from_slice(&data[..len]);
        self.response_len = len;
        debug!(bytes = hex::encode(&self.response[..len]), "Identify response");

        if len < MIN_IDENTIFY_RESPONSE_LEN {
            return Err(TmError::InsufficientData {
                expected: MIN_IDENTIFY_RESPONSE_LEN,
                actual: len,
            });
        }
        // Bytes the wheel did not send read as zero
        let response = IdentifyResponse::try_from(&self.response[..])?;
        debug!(
            packet_type = ?response.packet_type(),
            words = ?response.words(),
            "Decoded identify response"
        );
        catalog::lookup(response.model_code())
    }

    /// `Identified -> SwitchPending`. Returns the request to submit.
    pub fn begin_switch(&mut self) -> Result<ControlRequest, TmError> {
        let State::Identified(entry) = self.state else {
            return Err(self.invalid("switch submission"));
        };
        self.switch_request = self.switch_request.with_value(entry.switch_value);
        self.state = State::SwitchPending(entry);
        info!("--- Switching {} With Value {:#06x} ---", entry.name, entry.switch_value);
        Ok(self.switch_request)
    }

    /// `SwitchPending -> SwitchAcked | SwitchIgnored`.
    ///
    /// The wheel drops off the bus right after accepting the switch, so a
    /// protocol error or a stall counts as success.
    pub fn on_switch_complete(&mut self, status: TransferStatus) -> Result<State, TmError> {
        let State::SwitchPending(entry) = self.state else {
            return Err(self.invalid("switch completion"));
        };
        self.state = match status {
            TransferStatus::Completed | TransferStatus::Protocol | TransferStatus::Stall => {
                info!(%status, "Success?! The wheel should have been initialized!");
                State::SwitchAcked(entry)
            }
            other => {
                warn!("Request to change wheel mode seems to have failed with {other}");
                State::SwitchIgnored(entry)
            }
        };
        Ok(self.state)
    }

    /// Records that the transport rejected the pending submission.
    pub fn abort(&mut self, err: &TmError) {
        match self.state {
            State::IdentifyPending => {
                error!("Identify request rejected: {err}. Unable to initialize this wheel.");
                self.state = State::IdentifyFailed;
            }
            State::SwitchPending(entry) => {
                error!("Switch request rejected: {err}. Unable to initialize this wheel.");
                self.state = State::SwitchIgnored(entry);
            }
            other => debug!(state = %other, "Nothing pending to abort"),
        }
    }
}

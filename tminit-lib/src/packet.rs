//! # Thrustmaster init handshake packets
//!
//! The handshake uses two vendor control requests on the default pipe and
//! one response shape chosen by the wheel:
//!
//! - **identify** (`0xC1`, request 73): device-to-host, 16 byte data stage.
//!   The wheel answers with an [`IdentifyResponse`].
//! - **switch** (`0x41`, request 83): host-to-device, no data stage. The
//!   value field carries the model specific switch value.
//!
//! The identify response starts with a 16-bit packet type that selects the
//! layout of the words that follow:
//!
//! | Type     | Words after the type | Model code |
//! |----------|----------------------|------------|
//! | `0x0049` | 7                    | word 3     |
//! | `0x0047` | 3                    | word 3     |
//!
//! Everything on the wire is little-endian.

use crate::constants::{
    IDENTIFY_REQUEST, IDENTIFY_RESPONSE_LEN, MODEL_WORD_INDEX, SETUP_PACKET_SIZE, SWITCH_REQUEST,
};
use crate::error::TmError;
use bytes::{Buf, BufMut};
use modular_bitfield::prelude::*;
use num_enum::{FromPrimitive, IntoPrimitive};

/// `bmRequestType` of a control setup packet.
#[bitfield(bytes = 1)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestType {
    pub recipient: B5,
    pub kind: B2,
    pub device_to_host: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, FromPrimitive)]
#[repr(u8)]
pub enum RequestKind {
    Standard = 0,
    Class = 1,
    Vendor = 2,

    #[num_enum(catch_all)]
    Reserved(u8),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, FromPrimitive)]
#[repr(u8)]
pub enum RequestRecipient {
    Device = 0,
    Interface = 1,
    Endpoint = 2,
    Other = 3,

    #[num_enum(catch_all)]
    Reserved(u8),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    HostToDevice,
    DeviceToHost,
}

/// A control setup packet, fields in host byte order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlRequest {
    pub request_type: RequestType,
    pub request: u8,
    pub value: u16,
    pub index: u16,
    pub length: u16,
}

impl ControlRequest {
    /// The "who are you" request.
    pub fn identify() -> Self {
        Self {
            request_type: vendor_interface(Direction::DeviceToHost),
            request: IDENTIFY_REQUEST,
            value: 0,
            index: 0,
            length: IDENTIFY_RESPONSE_LEN as u16,
        }
    }

    /// The mode switch request for the given switch value.
    pub fn switch(value: u16) -> Self {
        Self {
            request_type: vendor_interface(Direction::HostToDevice),
            request: SWITCH_REQUEST,
            value: 0,
            index: 0,
            length: 0,
        }
        .with_value(value)
    }

    pub fn with_value(mut self, value: u16) -> Self {
        self.value = value;
        self
    }

    /// Addresses the request to another interface.
    pub fn with_index(mut self, index: u16) -> Self {
        self.index = index;
        self
    }

    pub fn direction(&self) -> Direction {
        if self.request_type.device_to_host() {
            Direction::DeviceToHost
        } else {
            Direction::HostToDevice
        }
    }

    pub fn kind(&self) -> RequestKind {
        RequestKind::from_primitive(self.request_type.kind())
    }

    pub fn recipient(&self) -> RequestRecipient {
        RequestRecipient::from_primitive(self.request_type.recipient())
    }

    /// Serializes the request into the 8-byte setup packet.
    pub fn to_bytes(&self) -> [u8; SETUP_PACKET_SIZE] {
        let mut out = [0u8; SETUP_PACKET_SIZE];
        let mut buf = &mut out[..];
        buf.put_u8(self.request_type.into_bytes()[0]);
        buf.put_u8(self.request);
        buf.put_u16_le(self.value);
        buf.put_u16_le(self.index);
        buf.put_u16_le(self.length);
        out
    }
}

fn vendor_interface(direction: Direction) -> RequestType {
    RequestType::new()
        .with_recipient(RequestRecipient::Interface.into())
        .with_kind(RequestKind::Vendor.into())
        .with_device_to_host(direction == Direction::DeviceToHost)
}

impl TryFrom<&[u8]> for ControlRequest {
    type Error = TmError;

    fn try_from(mut bytes: &[u8]) -> Result<Self, Self::Error> {
        if bytes.remaining() < SETUP_PACKET_SIZE {
            return Err(TmError::InsufficientData {
                expected: SETUP_PACKET_SIZE,
                actual: bytes.remaining(),
            });
        }
        Ok(Self {
            request_type: RequestType::from_bytes([bytes.get_u8()]),
            request: bytes.get_u8(),
            value: bytes.get_u16_le(),
            index: bytes.get_u16_le(),
            length: bytes.get_u16_le(),
        })
    }
}

/// The packet type word at the start of an identify response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, FromPrimitive)]
#[repr(u16)]
pub enum ResponseType {
    Long = 0x0049,
    Short = 0x0047,

    #[num_enum(catch_all)]
    Unknown(u16),
}

/// The wheel's answer to the identify request.
///
/// Only the model code has a known meaning; the remaining words are kept
/// as-is for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentifyResponse {
    /// Packet type `0x0049`.
    Long { words: [u16; 7] },
    /// Packet type `0x0047`.
    Short { words: [u16; 3] },
}

impl IdentifyResponse {
    pub fn packet_type(&self) -> ResponseType {
        match self {
            IdentifyResponse::Long { .. } => ResponseType::Long,
            IdentifyResponse::Short { .. } => ResponseType::Short,
        }
    }

    pub fn words(&self) -> &[u16] {
        match self {
            IdentifyResponse::Long { words } => words,
            IdentifyResponse::Short { words } => words,
        }
    }

    pub fn model_code(&self) -> u16 {
        self.words()[MODEL_WORD_INDEX]
    }
}

fn read_words<const N: usize>(buf: &mut &[u8]) -> Result<[u16; N], TmError> {
    if buf.remaining() < N * 2 {
        return Err(TmError::InsufficientData {
            expected: 2 + N * 2,
            actual: 2 + buf.remaining(),
        });
    }
    let mut words = [0u16; N];
    for word in words.iter_mut() {
        *word = buf.get_u16_le();
    }
    Ok(words)
}

impl TryFrom<&[u8]> for IdentifyResponse {
    type Error = TmError;

    fn try_from(mut bytes: &[u8]) -> Result<Self, Self::Error> {
        if bytes.remaining() < 2 {
            return Err(TmError::InsufficientData {
                expected: 2,
                actual: bytes.remaining(),
            });
        }
        match ResponseType::from_primitive(bytes.get_u16_le()) {
            ResponseType::Long => Ok(IdentifyResponse::Long {
                words: read_words(&mut bytes)?,
            }),
            ResponseType::Short => Ok(IdentifyResponse::Short {
                words: read_words(&mut bytes)?,
            }),
            ResponseType::Unknown(tag) => Err(TmError::UnrecognizedPacket(tag)),
        }
    }
}

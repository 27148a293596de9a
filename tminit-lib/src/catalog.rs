//! Known Thrustmaster wheel models.
//!
//! While in generic mode every wheel answers the identify request with a
//! model code. The catalog maps that code to the value that has to be sent
//! back with the switch request, plus a display name for the logs.

use crate::error::TmError;
use serde::Serialize;
use std::slice;

/// How well a model is handled by the single switch command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum_macros::Display)]
#[serde(rename_all = "lowercase")]
pub enum Support {
    /// One switch command fully initializes the wheel.
    #[strum(serialize = "full")]
    Full,
    /// The wheel needs more than one control packet; only the first is known.
    #[strum(serialize = "partial")]
    Partial,
}

/// One row of the model catalog. Values are in host byte order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ModelEntry {
    pub model_code: u16,
    pub switch_value: u16,
    pub name: &'static str,
    pub support: Support,
}

impl ModelEntry {
    /// The switch values to send, in order.
    ///
    /// Every supported model needs exactly one, so this is a one-element
    /// slice today.
    pub fn switch_values(&'static self) -> &'static [u16] {
        slice::from_ref(&self.switch_value)
    }
}

pub const MODELS: &[ModelEntry] = &[
    ModelEntry {
        model_code: 0x0306,
        switch_value: 0x0006,
        name: "Thrustmaster T150RS",
        support: Support::Full,
    },
    ModelEntry {
        model_code: 0x0206,
        switch_value: 0x0005,
        name: "Thrustmaster T300RS",
        support: Support::Full,
    },
    ModelEntry {
        model_code: 0x0204,
        switch_value: 0x0005,
        name: "Thrustmaster T300 Ferrari Alcantara Edition",
        support: Support::Full,
    },
    ModelEntry {
        model_code: 0x0002,
        switch_value: 0x0002,
        name: "Thrustmaster T500RS",
        support: Support::Full,
    },
    // TMX needs a second control packet that has not been figured out yet
    ModelEntry {
        model_code: 0x0407,
        switch_value: 0x0001,
        name: "Thrustmaster TMX",
        support: Support::Partial,
    },
];

/// Finds the catalog entry for a model code. First match wins.
pub fn lookup(model_code: u16) -> Result<&'static ModelEntry, TmError> {
    MODELS
        .iter()
        .find(|entry| entry.model_code == model_code)
        .ok_or(TmError::UnknownModel(model_code))
}

//! Interrupt writes sent before the identify request.
//!
//! Without them initializing a T300RS can crash the host. They have not
//! shown adverse effects on other wheels, so every session sends them.

use crate::error::TmError;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, info};

use crate::transport::Transport;

#[rustfmt::skip]
pub const PRIMING_SEQUENCES: [&[u8]; 5] = [
    &[0x42, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00],
    &[0x0a, 0x04, 0x90, 0x03, 0x00, 0x00, 0x00, 0x00],
    &[0x0a, 0x04, 0x00, 0x0c, 0x00, 0x00, 0x00, 0x00],
    &[0x0a, 0x04, 0x12, 0x10, 0x00, 0x00, 0x00, 0x00],
    &[0x0a, 0x04, 0x00, 0x06, 0x00, 0x00, 0x00, 0x00],
];

/// Sends every priming sequence to `endpoint`, in order, one at a time.
///
/// Each write has to finish within `step_timeout`. The first failing step
/// stops the sequence; later steps are never sent.
pub async fn prime<T: Transport + ?Sized>(
    transport: &T,
    endpoint: u8,
    step_timeout: Duration,
) -> Result<(), TmError> {
    info!("--- Sending Priming Sequences ---");
    for (step, sequence) in PRIMING_SEQUENCES.iter().enumerate() {
        send_step(transport, endpoint, sequence, step_timeout)
            .await
            .map_err(|source| TmError::Priming {
                step,
                source: Box::new(source),
            })?;
        debug!(step, "Priming sequence sent");
    }
    info!("--- Priming Complete ---");
    Ok(())
}

async fn send_step<T: Transport + ?Sized>(
    transport: &T,
    endpoint: u8,
    sequence: &[u8],
    step_timeout: Duration,
) -> Result<usize, TmError> {
    let pending = transport.interrupt_out(endpoint, sequence.to_vec())?;
    let completion = timeout(step_timeout, pending).await?;
    completion.into_result()
}

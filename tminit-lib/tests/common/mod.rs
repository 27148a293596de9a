//! Common test utilities and shared imports

// Allow unused imports and dead code since this is a shared module
// used across multiple test files - not all items are used in every test file
#[allow(unused_imports)]
pub use hex;
#[allow(unused_imports)]
pub use tminit_lib::catalog::{self, MODELS, ModelEntry, Support};
#[allow(unused_imports)]
pub use tminit_lib::error::TmError;
#[allow(unused_imports)]
pub use tminit_lib::handshake::{Handshake, State};
#[allow(unused_imports)]
pub use tminit_lib::packet::{ControlRequest, Direction, IdentifyResponse, ResponseType};
#[allow(unused_imports)]
pub use tminit_lib::transport::{Completion, Pending, TransferStatus, Transport};

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Decode hex string to bytes for testing
#[allow(dead_code)]
pub fn hex_to_bytes(hex_data: &str) -> Vec<u8> {
    hex::decode(hex_data.replace(' ', "")).expect("Failed to decode hex")
}

/// T150RS answering with the 7-word response
#[allow(dead_code)]
pub const T150_RESPONSE: &str = "49 00 00 00 00 00 06 03 00 00 00 00 00 00 00 00";

/// T500RS answering with the 3-word response
#[allow(dead_code)]
pub const T500_RESPONSE: &str = "47 00 00 00 00 00 02 00";

/// Route library logs to the test harness; RUST_LOG picks the level.
#[allow(dead_code)]
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[allow(dead_code)]
pub const PRIMING_ENDPOINT: u8 = 0x01;

#[allow(dead_code)]
pub fn completed(data: Vec<u8>) -> Completion<Vec<u8>> {
    Completion {
        data,
        status: TransferStatus::Completed,
    }
}

#[derive(Default)]
struct MockState {
    identify: Mutex<Option<Completion<Vec<u8>>>>,
    switch_status: Mutex<TransferStatus>,
    fail_priming_at: Mutex<Option<usize>>,
    reject_identify: AtomicBool,
    reject_switch: AtomicBool,
    no_priming_endpoint: AtomicBool,
    interrupts: Mutex<Vec<(u8, Vec<u8>)>>,
    control_in: Mutex<Vec<ControlRequest>>,
    control_out: Mutex<Vec<ControlRequest>>,
    dropped_transfers: AtomicUsize,
}

/// Scripted in-memory transport. Clones share the same script and records.
///
/// Without a scripted identify completion the identify transfer never
/// completes, like a wheel that doesn't answer.
#[derive(Clone, Default)]
#[allow(dead_code)]
pub struct MockTransport {
    state: Arc<MockState>,
}

/// Counts pending transfers dropped before they completed.
struct DropGuard {
    state: Arc<MockState>,
    completed: bool,
}

impl Drop for DropGuard {
    fn drop(&mut self) {
        if !self.completed {
            self.state.dropped_transfers.fetch_add(1, Ordering::SeqCst);
        }
    }
}

#[allow(dead_code)]
impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// The identify transfer completes successfully with these bytes.
    pub fn responding(hex_data: &str) -> Self {
        Self::new().with_identify(completed(hex_to_bytes(hex_data)))
    }

    pub fn with_identify(self, completion: Completion<Vec<u8>>) -> Self {
        *self.state.identify.lock().unwrap() = Some(completion);
        self
    }

    pub fn with_switch_status(self, status: TransferStatus) -> Self {
        *self.state.switch_status.lock().unwrap() = status;
        self
    }

    pub fn failing_priming_at(self, step: usize) -> Self {
        *self.state.fail_priming_at.lock().unwrap() = Some(step);
        self
    }

    pub fn rejecting_identify(self) -> Self {
        self.state.reject_identify.store(true, Ordering::SeqCst);
        self
    }

    pub fn rejecting_switch(self) -> Self {
        self.state.reject_switch.store(true, Ordering::SeqCst);
        self
    }

    pub fn without_priming_endpoint(self) -> Self {
        self.state.no_priming_endpoint.store(true, Ordering::SeqCst);
        self
    }

    pub fn interrupts(&self) -> Vec<(u8, Vec<u8>)> {
        self.state.interrupts.lock().unwrap().clone()
    }

    pub fn control_in_requests(&self) -> Vec<ControlRequest> {
        self.state.control_in.lock().unwrap().clone()
    }

    pub fn control_out_requests(&self) -> Vec<ControlRequest> {
        self.state.control_out.lock().unwrap().clone()
    }

    pub fn dropped_transfers(&self) -> usize {
        self.state.dropped_transfers.load(Ordering::SeqCst)
    }

    fn resolve<T: Send + 'static>(&self, completion: Option<Completion<T>>) -> Pending<T> {
        let guard = DropGuard {
            state: Arc::clone(&self.state),
            completed: false,
        };
        Box::pin(async move {
            // Bind the whole guard; a field assignment alone would only capture `completed`
            let mut guard = guard;
            let completion = match completion {
                Some(completion) => completion,
                None => std::future::pending().await,
            };
            guard.completed = true;
            completion
        })
    }
}

impl Transport for MockTransport {
    fn control_in(&self, request: &ControlRequest) -> Result<Pending<Vec<u8>>, TmError> {
        if self.state.reject_identify.load(Ordering::SeqCst) {
            return Err(TmError::Submit("identify rejected".to_string()));
        }
        self.state.control_in.lock().unwrap().push(*request);
        let completion = self.state.identify.lock().unwrap().clone();
        Ok(self.resolve(completion))
    }

    fn control_out(
        &self,
        request: &ControlRequest,
        data: Vec<u8>,
    ) -> Result<Pending<usize>, TmError> {
        if self.state.reject_switch.load(Ordering::SeqCst) {
            return Err(TmError::Submit("switch rejected".to_string()));
        }
        self.state.control_out.lock().unwrap().push(*request);
        let status = *self.state.switch_status.lock().unwrap();
        Ok(self.resolve(Some(Completion {
            data: data.len(),
            status,
        })))
    }

    fn interrupt_out(&self, endpoint: u8, data: Vec<u8>) -> Result<Pending<usize>, TmError> {
        let step = {
            let mut interrupts = self.state.interrupts.lock().unwrap();
            interrupts.push((endpoint, data.clone()));
            interrupts.len() - 1
        };
        let status = if *self.state.fail_priming_at.lock().unwrap() == Some(step) {
            TransferStatus::Stall
        } else {
            TransferStatus::Completed
        };
        Ok(self.resolve(Some(Completion {
            data: data.len(),
            status,
        })))
    }

    fn priming_endpoint(&self) -> Result<u8, TmError> {
        if self.state.no_priming_endpoint.load(Ordering::SeqCst) {
            return Err(TmError::Setup("no second endpoint".to_string()));
        }
        Ok(PRIMING_ENDPOINT)
    }
}

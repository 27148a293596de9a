//! One attached wheel, from attach to detach.

use crate::config::{PrimingPolicy, SessionConfig};
use crate::error::TmError;
use crate::handshake::{Handshake, State};
use crate::priming;
use crate::transport::{Pending, Transport};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{Instrument, Span, debug, error, info, warn};

/// A running handshake for one device.
///
/// The handshake, its buffers and the transport live inside a spawned task.
/// [`Session::detach`] aborts that task and waits for it, so no completion
/// runs against a session that has been released.
pub struct Session {
    task: Option<JoinHandle<State>>,
    state: watch::Receiver<State>,
}

impl Session {
    /// Primes the device according to the policy, submits the identify
    /// request and hands the rest of the handshake to a background task.
    ///
    /// Fails if the identify request is rejected, or if priming fails under
    /// [`PrimingPolicy::Abort`]. Anything already set up is released on the
    /// way out.
    pub async fn attach<T: Transport>(
        transport: T,
        config: SessionConfig,
    ) -> Result<Self, TmError> {
        let mut handshake = Handshake::for_interface(config.interface);

        match config.priming {
            PrimingPolicy::Skip => debug!("Priming skipped"),
            policy => {
                if let Err(err) = prime(&transport, &config).await {
                    if policy == PrimingPolicy::Abort {
                        error!("Priming failed, aborting attach: {err}");
                        return Err(err);
                    }
                    warn!("Priming failed, continuing with identification anyway: {err}");
                }
            }
        }

        let request = handshake.begin_identify()?;
        let pending = match transport.control_in(&request) {
            Ok(pending) => pending,
            Err(err) => {
                handshake.abort(&err);
                return Err(err);
            }
        };

        let (tx, rx) = watch::channel(handshake.state());
        let task =
            tokio::spawn(drive(handshake, transport, pending, tx).instrument(Span::current()));

        Ok(Self {
            task: Some(task),
            state: rx,
        })
    }

    /// The most recent state of the handshake.
    pub fn state(&self) -> State {
        *self.state.borrow()
    }

    /// Waits for the handshake to reach a terminal state.
    ///
    /// If the session is torn down first, returns the last state it reached.
    pub async fn wait(&self) -> State {
        let mut rx = self.state.clone();
        let terminal = rx.wait_for(State::is_terminal).await.map(|state| *state);
        terminal.unwrap_or_else(|_| *rx.borrow())
    }

    /// Cancels any transfer in flight and releases the session.
    ///
    /// Returns once a completion handler that is already running has returned
    /// and every buffer has been dropped.
    pub async fn detach(mut self) -> State {
        if let Some(task) = self.task.take() {
            task.abort();
            match task.await {
                Ok(state) => return state,
                Err(err) if err.is_cancelled() => debug!("Handshake cancelled by detach"),
                Err(err) => error!("Handshake task failed: {err}"),
            }
        }
        let state = self.state();
        info!(%state, "Session detached");
        state
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

async fn prime<T: Transport>(transport: &T, config: &SessionConfig) -> Result<(), TmError> {
    let endpoint = transport.priming_endpoint()?;
    priming::prime(transport, endpoint, config.priming_timeout).await
}

/// Runs the handshake from the identify completion to a terminal state,
/// publishing every transition.
async fn drive<T: Transport>(
    mut handshake: Handshake,
    transport: T,
    identify: Pending<Vec<u8>>,
    tx: watch::Sender<State>,
) -> State {
    let completion = identify.await;
    let identified = handshake.on_identify_complete(completion);
    tx.send_replace(handshake.state());
    if identified.is_err() {
        return handshake.state();
    }

    let request = match handshake.begin_switch() {
        Ok(request) => request,
        Err(err) => {
            error!("{err}");
            return handshake.state();
        }
    };
    tx.send_replace(handshake.state());

    // We do not expect any response from the wheel
    let switch = match transport.control_out(&request, Vec::new()) {
        Ok(pending) => pending,
        Err(err) => {
            handshake.abort(&err);
            tx.send_replace(handshake.state());
            return handshake.state();
        }
    };

    let completion = switch.await;
    if let Err(err) = handshake.on_switch_complete(completion.status) {
        error!("{err}");
    }
    tx.send_replace(handshake.state());
    handshake.state()
}

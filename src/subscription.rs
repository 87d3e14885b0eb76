use crate::error::{PianobarError, RecvError, Result};
use crate::state::StateDelta;
use crate::types::ConnectionState;
use tokio::sync::broadcast;

/// Change notification
///
/// Notifications carry no state; read the current snapshot from the
/// coordinator when one arrives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateUpdate {
    /// Player state changed
    State(StateDelta),

    /// Connection moved to a new state
    Connection(ConnectionState),
}

/// Receiver for state updates
pub struct StateReceiver {
    rx: broadcast::Receiver<StateUpdate>,
}

impl StateReceiver {
    pub(crate) fn new(rx: broadcast::Receiver<StateUpdate>) -> Self {
        Self { rx }
    }

    /// Receive the next state update
    ///
    /// Fails with `Recv(Closed)` once the coordinator is dropped. If this
    /// receiver fell behind, the missed updates are skipped and the next
    /// one is returned.
    pub async fn recv(&mut self) -> Result<StateUpdate> {
        loop {
            match self.rx.recv().await {
                Ok(update) => return Ok(update),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!("State receiver lagged by {} updates", n);
                }
                Err(broadcast::error::RecvError::Closed) => {
                    return Err(PianobarError::Recv(RecvError::Closed))
                }
            }
        }
    }

    /// Try to receive a state update without blocking
    ///
    /// Returns `None` if no update is available.
    pub fn try_recv(&mut self) -> Result<Option<StateUpdate>> {
        loop {
            match self.rx.try_recv() {
                Ok(update) => return Ok(Some(update)),
                Err(broadcast::error::TryRecvError::Empty) => return Ok(None),
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    tracing::warn!("State receiver lagged by {} updates", n);
                }
                Err(broadcast::error::TryRecvError::Closed) => {
                    return Err(PianobarError::Recv(RecvError::Closed))
                }
            }
        }
    }
}

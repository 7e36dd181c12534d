//! One-shot readiness gate
//!
//! Starts `Pending`, then settles exactly once into `Ready` or `Failed`.
//! Every waiter observes the settled state; later settle attempts are
//! ignored.

use crate::error::{Result, StoreError};
use tokio::sync::watch;

/// Observable state of a readiness gate
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadyState {
    Pending,
    Ready,
    Failed(StoreError),
}

impl ReadyState {
    pub fn is_pending(&self) -> bool {
        matches!(self, ReadyState::Pending)
    }
}

/// Single-fire gate that async tasks can wait on
#[derive(Debug)]
pub struct Readiness {
    tx: watch::Sender<ReadyState>,
}

impl Readiness {
    /// A gate that blocks until settled
    pub fn pending() -> Self {
        let (tx, _rx) = watch::channel(ReadyState::Pending);
        Self { tx }
    }

    /// A gate that is already open
    pub fn ready() -> Self {
        let (tx, _rx) = watch::channel(ReadyState::Ready);
        Self { tx }
    }

    /// Open the gate. Returns false if it was already settled.
    pub fn resolve(&self) -> bool {
        self.settle(ReadyState::Ready)
    }

    /// Fail the gate. Returns false if it was already settled.
    pub fn reject(&self, error: StoreError) -> bool {
        self.settle(ReadyState::Failed(error))
    }

    fn settle(&self, state: ReadyState) -> bool {
        self.tx.send_if_modified(|current| {
            if current.is_pending() {
                *current = state;
                true
            } else {
                false
            }
        })
    }

    /// Current state without waiting
    pub fn state(&self) -> ReadyState {
        self.tx.borrow().clone()
    }

    pub fn is_ready(&self) -> bool {
        matches!(*self.tx.borrow(), ReadyState::Ready)
    }

    /// Wait until settled; a failed gate yields its error to every caller
    pub async fn wait(&self) -> Result<()> {
        let mut rx = self.tx.subscribe();
        let state = rx
            .wait_for(|state| !state.is_pending())
            .await
            .map_err(|_| StoreError::Other("readiness gate closed".to_string()))?
            .clone();

        match state {
            ReadyState::Ready => Ok(()),
            ReadyState::Failed(error) => Err(error),
            ReadyState::Pending => unreachable!("wait_for only returns settled states"),
        }
    }
}

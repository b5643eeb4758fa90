//! Per-user live state.
//!
//! A [`User`] owns its connection set and subscription set behind a single
//! lock. Everything that reads or mutates them goes through
//! [`User::with_lock`]; the registry adds its global gate on top for
//! creation and removal.

use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use uuid::Uuid;

use crate::bus::ConsumerHandle;

/// Unique id of one live connection.
pub type ConnectionId = Uuid;

/// Write-capable handle onto one live connection.
///
/// Writing never blocks: frames go into the connection's bounded outbound
/// queue, which the transport drains.
#[derive(Debug, Clone)]
pub struct Connection {
    id: ConnectionId,
    tx: mpsc::Sender<Bytes>,
}

impl Connection {
    pub fn new(tx: mpsc::Sender<Bytes>) -> Self {
        Self {
            id: Uuid::new_v4(),
            tx,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Queue a frame. Returns `false` if the connection is full or gone.
    ///
    /// Failures are counted, not retried.
    pub fn write(&self, frame: Bytes) -> bool {
        match self.tx.try_send(frame) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                tracing::debug!(connection = %self.id, "Outbound queue full, frame dropped");
                crate::metrics::record_write_failure("full");
                false
            }
            Err(TrySendError::Closed(_)) => {
                crate::metrics::record_write_failure("closed");
                false
            }
        }
    }
}

/// The two bus registrations every live user holds.
#[derive(Debug)]
pub struct UserConsumers {
    pub private: ConsumerHandle,
    pub update: ConsumerHandle,
}

/// State guarded by the per-user lock.
#[derive(Debug, Default)]
pub struct UserState {
    pub(crate) connections: HashMap<ConnectionId, Connection>,
    pub(crate) channels: HashSet<String>,
    pub(crate) consumers: Option<UserConsumers>,
    pub(crate) removed: bool,
}

impl UserState {
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub fn has_connections(&self) -> bool {
        !self.connections.is_empty()
    }

    /// Add a connection. Returns `false` if it was already present.
    pub fn attach(&mut self, connection: Connection) -> bool {
        self.connections.insert(connection.id(), connection).is_none()
    }

    /// Remove a connection. Returns `false` if it was not present.
    pub fn detach(&mut self, id: ConnectionId) -> bool {
        self.connections.remove(&id).is_some()
    }
}

/// One user's live record.
#[derive(Debug)]
pub struct User {
    id: String,
    state: Mutex<UserState>,
}

impl User {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            state: Mutex::new(UserState::default()),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Run `f` with exclusive access to this user's state.
    ///
    /// The lock is released on every exit path, including unwinding.
    pub fn with_lock<R>(&self, f: impl FnOnce(&mut UserState) -> R) -> R {
        let mut state = self.state.lock();
        f(&mut state)
    }

    /// Snapshot of the live connections, taken under the lock.
    pub fn connections(&self) -> Vec<Connection> {
        self.with_lock(|state| state.connections.values().cloned().collect())
    }

    /// Snapshot of the subscribed channels, taken under the lock.
    #[cfg(test)]
    pub fn channels(&self) -> HashSet<String> {
        self.with_lock(|state| state.channels.clone())
    }
}

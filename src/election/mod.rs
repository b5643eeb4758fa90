//! Bridge leadership election.
//!
//! Exactly one process in the cluster mirrors channels to the external
//! bridge: the one holding the election lock. Everyone else stays a
//! follower and retries on a fixed interval. There is no demotion path for
//! a running leader; the lock is released when the holder goes away.
//!
//! ```text
//!            try_acquire ok
//!  FOLLOWER ─────────────────► LEADER
//!     │  ▲                        (consumers registered,
//!     └──┘ held elsewhere:         retry timer cancelled)
//!          arm retry timer once
//! ```

mod lock;

pub use lock::{LocalLockService, LockGuard, LockService};

use async_trait::async_trait;
use parking_lot::Mutex;
use relay_proto::{ChatMessage, channel_address};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::bridge::{BridgeAdapter, Delivery};
use crate::bus::{Bus, BusHandler, ConsumerHandle, Payload};

/// Election state of this process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Follower,
    Leader,
}

struct ElectorState {
    role: Role,
    guard: Option<LockGuard>,
    retry: Option<CancellationToken>,
    consumers: Vec<ConsumerHandle>,
}

/// Drives the FOLLOWER/LEADER state machine for the bridge.
pub struct LeaderElector {
    locks: Arc<dyn LockService>,
    bus: Arc<dyn Bus>,
    bridge: Arc<dyn BridgeAdapter>,
    lock_name: String,
    retry_interval: Duration,
    state: Mutex<ElectorState>,
    /// Serializes whole activation attempts.
    activation: tokio::sync::Mutex<()>,
    weak: Weak<LeaderElector>,
}

impl LeaderElector {
    pub fn new(
        locks: Arc<dyn LockService>,
        bus: Arc<dyn Bus>,
        bridge: Arc<dyn BridgeAdapter>,
        lock_name: impl Into<String>,
        retry_interval: Duration,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak: &Weak<LeaderElector>| Self {
            locks,
            bus,
            bridge,
            lock_name: lock_name.into(),
            retry_interval,
            state: Mutex::new(ElectorState {
                role: Role::Follower,
                guard: None,
                retry: None,
                consumers: Vec::new(),
            }),
            activation: tokio::sync::Mutex::new(()),
            weak: weak.clone(),
        })
    }

    pub fn role(&self) -> Role {
        self.state.lock().role
    }

    /// Whether a retry timer is currently armed.
    #[cfg(test)]
    pub fn retry_armed(&self) -> bool {
        self.state.lock().retry.is_some()
    }

    /// Try to become leader.
    ///
    /// Does nothing if the bridge has no outgoing configuration or this
    /// process already leads. On failure arms the retry timer, at most once.
    pub async fn activate(&self) {
        if !self.bridge.can_send_outgoing() {
            trace!("Bridge has no outgoing configuration, skipping election");
            return;
        }
        let _activation = self.activation.lock().await;
        if self.role() == Role::Leader {
            return;
        }

        match self.locks.try_acquire(&self.lock_name).await {
            Ok(Some(guard)) => self.become_leader(guard),
            Ok(None) => {
                debug!(lock = %self.lock_name, "Bridge lock held elsewhere");
                self.arm_retry();
            }
            Err(e) => {
                warn!(lock = %self.lock_name, error = %e, "Bridge lock acquisition failed");
                self.arm_retry();
            }
        }
    }

    fn become_leader(&self, guard: LockGuard) {
        let mut state = self.state.lock();
        if let Some(token) = state.retry.take() {
            token.cancel();
        }

        for channel in self.bridge.outgoing_channels() {
            let relay = OutgoingRelay {
                channel: channel.clone(),
                bridge: Arc::clone(&self.bridge),
            };
            match self.bus.register(&channel_address(&channel), Arc::new(relay)) {
                Ok(handle) => state.consumers.push(handle),
                Err(e) => warn!(%channel, error = %e, "Failed to register bridge consumer"),
            }
        }

        info!(lock = %guard.name(), channels = state.consumers.len(), "Became bridge leader");
        state.guard = Some(guard);
        state.role = Role::Leader;
        crate::metrics::set_leader(true);
    }

    fn arm_retry(&self) {
        let mut state = self.state.lock();
        if state.retry.is_some() {
            return;
        }
        let token = CancellationToken::new();
        state.retry = Some(token.clone());

        let elector = self.weak.clone();
        let period = self.retry_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        let Some(elector) = elector.upgrade() else { break };
                        elector.activate().await;
                    }
                }
            }
            trace!("Election retry timer stopped");
        });
        debug!(interval = ?period, "Armed election retry timer");
    }

    /// Stop the retry timer, drop bridge consumers and release the lock.
    pub fn shutdown(&self) {
        let mut state = self.state.lock();
        if let Some(token) = state.retry.take() {
            token.cancel();
        }
        for handle in state.consumers.drain(..) {
            self.bus.unregister(&handle);
        }
        if state.guard.take().is_some() {
            info!(lock = %self.lock_name, "Released bridge leadership");
        }
        state.role = Role::Follower;
        crate::metrics::set_leader(false);
    }
}

/// Consumer on a mirrored `channel.<name>`: forwards to the bridge.
struct OutgoingRelay {
    channel: String,
    bridge: Arc<dyn BridgeAdapter>,
}

impl OutgoingRelay {
    async fn forward(&self, message: &ChatMessage) {
        if message.text.is_none() {
            return;
        }
        if message.is_from_bridge() {
            trace!(channel = %self.channel, "Not mirroring message that came from the bridge");
            return;
        }
        match self.bridge.deliver_outgoing(&self.channel, message).await {
            Ok(Delivery::Sent) => crate::metrics::record_bridge_forwarded(),
            Ok(Delivery::Skipped) => {}
            Err(e) => {
                warn!(channel = %self.channel, error = %e, "Bridge delivery failed");
                crate::metrics::record_bridge_failed(e.error_code());
            }
        }
    }
}

#[async_trait]
impl BusHandler for OutgoingRelay {
    async fn handle(&self, payload: Payload) {
        if let Payload::Chat(message) = payload {
            self.forward(&message).await;
        }
    }

    fn name(&self) -> &'static str {
        "outgoing_relay"
    }
}

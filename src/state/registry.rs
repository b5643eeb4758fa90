//! User registry: the only place a [`User`] is created or destroyed.
//!
//! Lock ordering is always global gate, then per-user lock, then the
//! channel table. Bus registration happens under those locks; it is
//! bounded and never waits on a consumer.

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use relay_proto::{channel_address, private_address, user_update_address};
use std::collections::HashSet;
use std::sync::{Arc, Weak};
use tracing::{debug, info, warn};

use super::dashmap_ext::DashMapExt;
use super::{ChannelTable, Connection, ConnectionId, User, UserConsumers, UserState};
use crate::bus::{Bus, BusHandler, ConsumerHandle, Payload};
use crate::error::{BusError, RelayError};
use crate::router::{ChannelDelivery, MessageRouter, PrivateDelivery};

/// Tracks every user with live state on this process.
pub struct UserRegistry {
    users: DashMap<String, Arc<User>>,
    /// Serializes creation and removal as compound operations.
    gate: Mutex<()>,
    channels: Arc<ChannelTable>,
    bus: Arc<dyn Bus>,
    router: MessageRouter,
    weak: Weak<UserRegistry>,
}

impl UserRegistry {
    pub fn new(bus: Arc<dyn Bus>, channels: Arc<ChannelTable>) -> Arc<Self> {
        Arc::new_cyclic(|weak: &Weak<UserRegistry>| Self {
            users: DashMap::new(),
            gate: Mutex::new(()),
            router: MessageRouter::new(weak.clone(), Arc::clone(&channels)),
            channels,
            bus,
            weak: weak.clone(),
        })
    }

    #[cfg(test)]
    pub fn router(&self) -> &MessageRouter {
        &self.router
    }

    pub fn channels(&self) -> &ChannelTable {
        &self.channels
    }

    /// Look up a live user without creating it.
    pub fn get(&self, user_id: &str) -> Option<Arc<User>> {
        self.users.get_cloned(user_id)
    }

    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    /// Return the live user for `user_id`, creating it if needed.
    ///
    /// Creation registers the private and update consumers and inserts the
    /// record under the global gate, so concurrent callers for the same id
    /// always get the same instance.
    pub fn get_or_create_user(&self, user_id: &str) -> Result<Arc<User>, RelayError> {
        if let Some(user) = self.get(user_id) {
            return Ok(user);
        }

        let _gate = self.gate.lock();
        if let Some(user) = self.get(user_id) {
            return Ok(user);
        }

        let user = Arc::new(User::new(user_id));
        let consumers = self.register_user_consumers(&user)?;
        user.with_lock(|state| state.consumers = Some(consumers));
        self.users.insert(user_id.to_string(), Arc::clone(&user));

        crate::metrics::set_connected_users(self.users.len());
        debug!(user = %user_id, "Created user");
        Ok(user)
    }

    fn register_user_consumers(&self, user: &Arc<User>) -> Result<UserConsumers, BusError> {
        let private = self.bus.register(
            &private_address(user.id()),
            Arc::new(PrivateDelivery::new(user.id(), self.router.clone())),
        )?;
        let update = self.bus.register(
            &user_update_address(user.id()),
            Arc::new(SubscriptionUpdate {
                registry: self.weak.clone(),
                user: Arc::downgrade(user),
            }),
        );
        match update {
            Ok(update) => Ok(UserConsumers { private, update }),
            Err(e) => {
                self.bus.unregister(&private);
                Err(e)
            }
        }
    }

    /// Remove `user` if `predicate` holds over its locked state.
    ///
    /// The predicate is evaluated under the global gate and the user's lock,
    /// atomically with the teardown. Returns `false` without side effects if
    /// the predicate fails or the user has no live record.
    pub fn remove_user_if(
        &self,
        user: &Arc<User>,
        predicate: impl FnOnce(&UserState) -> bool,
    ) -> bool {
        let _gate = self.gate.lock();
        let is_current = self
            .users
            .get(user.id())
            .is_some_and(|current| Arc::ptr_eq(current.value(), user));
        if !is_current {
            return false;
        }

        let removed = user.with_lock(|state| {
            if state.removed || !predicate(state) {
                return false;
            }
            for channel in std::mem::take(&mut state.channels) {
                self.leave_channel(&channel, user.id());
            }
            if let Some(consumers) = state.consumers.take() {
                self.bus.unregister(&consumers.private);
                self.bus.unregister(&consumers.update);
            }
            state.removed = true;
            true
        });

        if removed {
            self.users.remove_if(user.id(), |_, current| Arc::ptr_eq(current, user));
            crate::metrics::set_connected_users(self.users.len());
            crate::metrics::set_active_channels(self.channels.len());
            info!(user = %user.id(), "Removed user");
        }
        removed
    }

    /// Bring `user`'s subscriptions to exactly `target`.
    ///
    /// The diff is computed and applied under the user's lock. Returns the
    /// number of channels joined plus left.
    pub fn update_subscriptions(&self, user: &User, target: &[String]) -> usize {
        let changes = user.with_lock(|state| {
            if state.removed {
                return 0;
            }
            let target: HashSet<&str> = target
                .iter()
                .map(String::as_str)
                .filter(|c| !c.is_empty())
                .collect();

            let leaving: Vec<String> = state
                .channels
                .iter()
                .filter(|c| !target.contains(c.as_str()))
                .cloned()
                .collect();
            let mut changes = 0;
            for channel in leaving {
                state.channels.remove(&channel);
                self.leave_channel(&channel, user.id());
                changes += 1;
            }

            for channel in target {
                if state.channels.contains(channel) {
                    continue;
                }
                match self.join_channel(channel, user.id()) {
                    Ok(()) => {
                        state.channels.insert(channel.to_string());
                        changes += 1;
                    }
                    Err(e) => {
                        warn!(user = %user.id(), %channel, error = %e, "Failed to subscribe");
                    }
                }
            }
            changes
        });

        if changes > 0 {
            crate::metrics::set_active_channels(self.channels.len());
            debug!(user = %user.id(), changes, "Updated subscriptions");
        }
        changes
    }

    fn join_channel(&self, channel: &str, user_id: &str) -> Result<(), BusError> {
        self.channels.subscribe(channel, user_id, || {
            self.bus.register(
                &channel_address(channel),
                Arc::new(ChannelDelivery::new(channel, self.router.clone())),
            )
        })?;
        Ok(())
    }

    fn leave_channel(&self, channel: &str, user_id: &str) {
        self.channels
            .unsubscribe(channel, user_id, |consumer: ConsumerHandle| {
                self.bus.unregister(&consumer)
            });
    }

    /// Attach a live connection to `user_id`, creating the user if needed.
    ///
    /// Retries if the record it found was torn down before the connection
    /// could be added, so the connection never lands on a removed user.
    pub fn attach_connection(
        &self,
        user_id: &str,
        connection: Connection,
    ) -> Result<Arc<User>, RelayError> {
        loop {
            let user = self.get_or_create_user(user_id)?;
            let attached = user.with_lock(|state| {
                if state.removed {
                    return false;
                }
                state.attach(connection.clone());
                true
            });
            if attached {
                crate::metrics::inc_connections();
                debug!(user = %user_id, connection = %connection.id(), "Attached connection");
                return Ok(user);
            }
        }
    }

    /// Detach a connection and remove the user once it has none left.
    ///
    /// Returns whether the user was removed.
    pub fn detach_connection(&self, user: &Arc<User>, connection: ConnectionId) -> bool {
        let (detached, remaining) =
            user.with_lock(|state| (state.detach(connection), state.connection_count()));
        if detached {
            crate::metrics::dec_connections();
            debug!(user = %user.id(), %connection, remaining, "Detached connection");
        }
        self.remove_user_if(user, |state| !state.has_connections())
    }
}

/// Consumer on `user.update.<id>`: applies a full desired subscription list.
struct SubscriptionUpdate {
    registry: Weak<UserRegistry>,
    user: Weak<User>,
}

#[async_trait]
impl BusHandler for SubscriptionUpdate {
    async fn handle(&self, payload: Payload) {
        let (Some(registry), Some(user)) = (self.registry.upgrade(), self.user.upgrade()) else {
            return;
        };
        let channels = match payload {
            Payload::Channels(channels) => channels,
            other => {
                warn!(user = %user.id(), kind = other.kind(), "Unexpected payload on update address");
                return;
            }
        };
        registry.update_subscriptions(&user, &channels);
    }

    fn name(&self) -> &'static str {
        "subscription_update"
    }
}

//! Channel name to subscriber set.
//!
//! A single table-wide lock guards every mutation. Each entry also carries
//! the one bus consumer this process keeps for the channel: the hook passed
//! to [`ChannelTable::subscribe`] runs only for the first local subscriber,
//! and the hook passed to [`ChannelTable::unsubscribe`] only for the last.
//! Both hooks run inside the lock so consumer existence and membership never
//! disagree.

use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};

use crate::bus::ConsumerHandle;

struct ChannelEntry {
    subscribers: HashSet<String>,
    consumer: ConsumerHandle,
}

/// Maps channel names to the users subscribed on this process.
#[derive(Default)]
pub struct ChannelTable {
    inner: Mutex<HashMap<String, ChannelEntry>>,
}

impl ChannelTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `user_id` to `channel`. Idempotent.
    ///
    /// `on_first` is called when the channel has no entry yet; its handle is
    /// stored with the entry. If it fails the table is left untouched.
    /// Returns whether the user was newly added.
    pub fn subscribe<E>(
        &self,
        channel: &str,
        user_id: &str,
        on_first: impl FnOnce() -> Result<ConsumerHandle, E>,
    ) -> Result<bool, E> {
        let mut table = self.inner.lock();
        if let Some(entry) = table.get_mut(channel) {
            return Ok(entry.subscribers.insert(user_id.to_string()));
        }

        let consumer = on_first()?;
        let subscribers = HashSet::from([user_id.to_string()]);
        table.insert(channel.to_string(), ChannelEntry { subscribers, consumer });
        Ok(true)
    }

    /// Remove `user_id` from `channel`. Idempotent.
    ///
    /// When the last subscriber leaves, the entry is dropped and `on_last`
    /// receives its consumer handle. Returns whether the user was removed.
    pub fn unsubscribe(
        &self,
        channel: &str,
        user_id: &str,
        on_last: impl FnOnce(ConsumerHandle),
    ) -> bool {
        let mut table = self.inner.lock();
        let Some(entry) = table.get_mut(channel) else {
            return false;
        };
        let removed = entry.subscribers.remove(user_id);
        if entry.subscribers.is_empty()
            && let Some(entry) = table.remove(channel)
        {
            on_last(entry.consumer);
        }
        removed
    }

    /// Snapshot of the subscribers of `channel`.
    ///
    /// May be briefly stale relative to in-flight subscription changes.
    pub fn subscribers_of(&self, channel: &str) -> Vec<String> {
        self.inner
            .lock()
            .get(channel)
            .map(|entry| entry.subscribers.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of channels with at least one local subscriber.
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

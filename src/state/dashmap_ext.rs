use dashmap::DashMap;
use std::borrow::Borrow;
use std::hash::Hash;

/// Lookups that release the shard guard before returning.
///
/// A `dashmap::mapref::one::Ref` held while taking a per-user lock (or
/// across an `.await`) would invert the registry's lock order, so the
/// registry only ever reads through these helpers.
pub trait DashMapExt<K, V> {
    /// Clone the value for `key`.
    fn get_cloned<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
        V: Clone;
}

impl<K, V> DashMapExt<K, V> for DashMap<K, V>
where
    K: Eq + Hash,
{
    fn get_cloned<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
        V: Clone,
    {
        self.get(key).map(|r| r.value().clone())
    }
}

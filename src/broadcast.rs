//! Fan-out of messages to a group of running connections.
//!
//! `BroadcastGroup` keeps non-owning weak references to each member's shared
//! driver state, so membership never keeps a finished connection alive.
//! Entries for drivers that ended without leaving, such as after a panic,
//! are pruned lazily.

use std::sync::{Arc, Weak};

use dashmap::DashMap;

use crate::driver::{ConnectionId, DriverHandle, Shared};

/// A set of connections that receive the same messages.
///
/// Cloning yields another reference to the same group. Every method may be
/// called from any thread.
pub struct BroadcastGroup<M>(Arc<DashMap<ConnectionId, Weak<Shared<M>>>>);

impl<M> Clone for BroadcastGroup<M> {
    fn clone(&self) -> Self { Self(self.0.clone()) }
}

impl<M> Default for BroadcastGroup<M> {
    fn default() -> Self { Self(Arc::new(DashMap::new())) }
}

impl<M> std::fmt::Debug for BroadcastGroup<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BroadcastGroup")
            .field("members", &self.0.len())
            .finish()
    }
}

impl<M: Clone + Send + 'static> BroadcastGroup<M> {
    /// Create an empty group.
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Queue `message` for every open member and wake each of them.
    ///
    /// Returns how many members accepted the message. Members that are
    /// already closing are skipped.
    pub fn post(&self, message: M) -> usize {
        let mut delivered = 0;
        self.0.retain(|_, weak| match weak.upgrade() {
            Some(shared) => {
                if shared.deliver(message.clone()) {
                    delivered += 1;
                }
                true
            }
            None => false,
        });
        delivered
    }

    /// Wake the member `id` without queueing anything.
    ///
    /// Returns `false` if `id` is not a live member.
    pub fn wakeup(&self, id: ConnectionId) -> bool {
        let shared = self.0.get(&id).and_then(|weak| weak.upgrade());
        match shared {
            Some(shared) => {
                shared.wakeup();
                true
            }
            None => {
                self.0.remove_if(&id, |_, weak| weak.strong_count() == 0);
                false
            }
        }
    }

    /// Number of live members.
    ///
    /// Prunes stale entries first, taking per-bucket write locks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.prune();
        self.0.len()
    }

    /// Returns `true` when no live member remains.
    #[must_use]
    pub fn is_empty(&self) -> bool { self.len() == 0 }

    /// Returns `true` if `id` is a live member.
    #[must_use]
    pub fn contains(&self, id: ConnectionId) -> bool {
        self.0
            .get(&id)
            .is_some_and(|weak| weak.strong_count() > 0)
    }

    /// Remove entries whose driver has been dropped.
    pub fn prune(&self) { self.0.retain(|_, weak| weak.strong_count() > 0); }

    pub(crate) fn join(&self, handle: &DriverHandle<M>) {
        self.0.insert(handle.id(), handle.downgrade());
    }

    pub(crate) fn leave(&self, id: ConnectionId) { self.0.remove(&id); }
}

#[cfg(test)]
mod tests {
    use rstest::{fixture, rstest};

    use super::*;

    fn open_member() -> DriverHandle<String> {
        let handle = DriverHandle::new(ConnectionId::next());
        handle.set_enabled(true);
        handle
    }

    #[fixture]
    fn group() -> BroadcastGroup<String> { BroadcastGroup::new() }

    #[rstest]
    fn post_reaches_every_open_member(group: BroadcastGroup<String>) {
        let a = open_member();
        let b = open_member();
        group.join(&a);
        group.join(&b);

        assert_eq!(group.post("hello".to_owned()), 2);
        assert_eq!(a.take_broadcasts(), vec!["hello".to_owned()]);
        assert_eq!(b.take_broadcasts(), vec!["hello".to_owned()]);
    }

    #[rstest]
    fn closing_members_are_skipped(group: BroadcastGroup<String>) {
        let a = open_member();
        let b = open_member();
        group.join(&a);
        group.join(&b);
        b.set_enabled(false);

        assert_eq!(group.post("x".to_owned()), 1);
        assert!(b.take_broadcasts().is_empty());
        assert_eq!(group.len(), 2);
    }

    #[rstest]
    fn dropped_members_are_pruned(group: BroadcastGroup<String>) {
        let a = open_member();
        let id = a.id();
        group.join(&a);
        assert!(group.contains(id));

        drop(a);
        assert!(!group.contains(id));
        assert!(!group.wakeup(id));
        assert!(group.is_empty());
        assert_eq!(group.post("gone".to_owned()), 0);
    }

    #[rstest]
    fn leave_removes_member(group: BroadcastGroup<String>) {
        let a = open_member();
        group.join(&a);
        assert!(group.wakeup(a.id()));
        group.leave(a.id());
        assert!(!group.contains(a.id()));
        assert_eq!(group.len(), 0);
    }
}

// Subscription registry: id allocation, lookup, and subject matching.
use courier_common::subject_matches;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::client::subscription::Subscription;

/// Owns every live subscription of one connection.
///
/// Ids start at 1 and are never reused while the registry lives. Mutations
/// take the write lock, so a dispatcher lookup sees a subscription either
/// fully registered or fully removed.
pub(crate) struct SubscriptionRegistry {
    next_id: AtomicU64,
    subscriptions: RwLock<BTreeMap<u64, Arc<Subscription>>>,
}

impl SubscriptionRegistry {
    pub(crate) fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            subscriptions: RwLock::new(BTreeMap::new()),
        }
    }

    pub(crate) fn allocate_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    pub(crate) fn register(&self, subscription: Arc<Subscription>) -> u64 {
        let id = subscription.id();
        self.subscriptions.write().insert(id, subscription);
        id
    }

    pub(crate) fn lookup(&self, id: u64) -> Option<Arc<Subscription>> {
        self.subscriptions.read().get(&id).cloned()
    }

    /// Subscriptions whose pattern matches `subject`, in id order.
    pub(crate) fn match_subject(&self, subject: &str) -> Vec<Arc<Subscription>> {
        self.subscriptions
            .read()
            .values()
            .filter(|subscription| subject_matches(subscription.subject(), subject))
            .cloned()
            .collect()
    }

    /// Unregister and unsubscribe. Returns `None` if the id is unknown.
    pub(crate) fn remove(&self, id: u64) -> Option<Arc<Subscription>> {
        let removed = self.subscriptions.write().remove(&id);
        if let Some(subscription) = &removed {
            subscription.unsubscribe();
        }
        removed
    }

    /// Remove every subscription, unsubscribing each.
    pub(crate) fn remove_all(&self) -> Vec<Arc<Subscription>> {
        let drained = std::mem::take(&mut *self.subscriptions.write());
        drained
            .into_values()
            .inspect(|subscription| {
                subscription.unsubscribe();
            })
            .collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.subscriptions.read().len()
    }
}

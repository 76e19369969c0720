//! Subscription manager for broadcasting head-of-feed snapshots.

use crate::error::{FeedError, Result};
use crate::types::Post;
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, warn};

use super::types::{
    DropReason, FeedEvent, Snapshot, SubscriptionConfig, SubscriptionHandle, SubscriptionId,
};

/// Internal subscription state.
struct Subscription {
    config: SubscriptionConfig,
    sender: Sender<FeedEvent>,
    /// Second receiver on the same channel, used to discard superseded
    /// snapshots when the subscriber falls behind.
    backlog: Receiver<FeedEvent>,
    /// Stall flag shared with the handle. Dead once the handle is dropped.
    stalled: Weak<AtomicBool>,
    /// Window contents as of the last delivered snapshot.
    /// None until the initial snapshot is delivered.
    last_window: Option<Vec<Post>>,
    /// Number of snapshots delivered so far.
    delivered: u64,
}

impl Subscription {
    /// Queue a snapshot, discarding the oldest pending ones if the buffer is
    /// full. Each snapshot replaces the whole window, so a subscriber that
    /// falls behind still ends on the newest one. The last channel slot
    /// stays free for the drop notice.
    fn try_send(&self, snapshot: Snapshot) -> std::result::Result<(), DropReason> {
        if self.stalled.strong_count() == 0 {
            return Err(DropReason::Disconnected);
        }

        let mut superseded = 0;
        while self.sender.len() >= self.config.buffer_size && self.backlog.try_recv().is_ok() {
            superseded += 1;
        }
        if superseded > 0 {
            debug!(superseded, sequence = snapshot.sequence, "discarded superseded snapshots");
        }

        match self.sender.try_send(FeedEvent::Snapshot { snapshot }) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(DropReason::BufferOverflow),
            Err(TrySendError::Disconnected(_)) => Err(DropReason::Disconnected),
        }
    }

    /// Tell the subscriber why it was dropped (best effort).
    fn notify_dropped(&self, reason: DropReason) {
        let _ = self.sender.try_send(FeedEvent::Dropped { reason });
    }

    /// Deliver `window` if it differs from what the subscriber last saw.
    fn offer(&mut self, window: &[Post]) -> std::result::Result<bool, DropReason> {
        if self.last_window.as_deref() == Some(window) {
            return Ok(false);
        }
        self.try_send(Snapshot::new(self.delivered + 1, window.to_vec()))?;
        self.delivered += 1;
        self.last_window = Some(window.to_vec());
        Ok(true)
    }
}

/// Manages subscriptions and broadcasts snapshots.
pub struct SubscriptionManager {
    /// Active subscriptions by ID.
    subscriptions: RwLock<HashMap<SubscriptionId, Subscription>>,
    /// Counter for generating subscription IDs.
    next_id: AtomicU64,
}

impl SubscriptionManager {
    /// Create a new subscription manager.
    pub fn new() -> Self {
        Self {
            subscriptions: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Create a new subscription.
    ///
    /// Returns a handle for receiving events. Nothing is delivered until
    /// `deliver_initial` is called with the current window.
    pub fn subscribe(&self, config: SubscriptionConfig) -> SubscriptionHandle {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let (sender, receiver) = bounded(config.buffer_size + 1);
        let stalled = Arc::new(AtomicBool::new(false));

        let subscription = Subscription {
            config,
            sender,
            backlog: receiver.clone(),
            stalled: Arc::downgrade(&stalled),
            last_window: None,
            delivered: 0,
        };

        self.subscriptions.write().insert(id, subscription);
        debug!(subscription = id.0, "subscribed");

        SubscriptionHandle {
            id,
            receiver,
            stalled,
        }
    }

    /// Unsubscribe and clean up.
    pub fn unsubscribe(&self, id: SubscriptionId) {
        let mut subs = self.subscriptions.write();
        if let Some(sub) = subs.remove(&id) {
            // The receiver is usually gone already.
            sub.notify_dropped(DropReason::Unsubscribed);
            debug!(subscription = id.0, "unsubscribed");
        }
    }

    /// Deliver the first snapshot to a fresh subscription.
    pub fn deliver_initial(&self, id: SubscriptionId, window: Vec<Post>) -> Result<()> {
        let mut subs = self.subscriptions.write();
        let sub = match subs.get_mut(&id) {
            Some(sub) => sub,
            None => return Err(FeedError::SubscriptionDropped(DropReason::Unsubscribed)),
        };

        if let Err(reason) = sub.try_send(Snapshot::new(1, window.clone())) {
            sub.notify_dropped(reason.clone());
            subs.remove(&id);
            return Err(FeedError::SubscriptionDropped(reason));
        }
        sub.delivered = 1;
        sub.last_window = Some(window);
        Ok(())
    }

    /// Get subscription count.
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.read().len()
    }

    // --- Broadcasting ---

    /// Recompute every live window and deliver the ones that changed.
    ///
    /// `window_for` returns the current head of the feed for a page size.
    /// Returns the number of snapshots delivered. Subscribers that fail to
    /// receive are dropped.
    pub fn broadcast_windows<F>(&self, window_for: F) -> usize
    where
        F: Fn(usize) -> Vec<Post>,
    {
        let mut windows: HashMap<usize, Vec<Post>> = HashMap::new();
        let mut delivered = 0;
        let mut to_remove = Vec::new();

        let mut subs = self.subscriptions.write();
        for (id, sub) in subs.iter_mut() {
            // Not yet initialized; deliver_initial will catch it up.
            if sub.last_window.is_none() {
                continue;
            }
            let page_size = sub.config.page_size;
            let window = windows
                .entry(page_size)
                .or_insert_with(|| window_for(page_size));
            match sub.offer(window) {
                Ok(true) => delivered += 1,
                Ok(false) => {}
                Err(reason) => to_remove.push((*id, reason)),
            }
        }

        // Remove dropped subscriptions
        for (id, reason) in to_remove {
            if let Some(sub) = subs.remove(&id) {
                warn!(subscription = id.0, ?reason, "dropping subscriber");
                sub.notify_dropped(reason);
            }
        }

        delivered
    }

    /// Mark every subscription as stalled (source unreachable) or resumed.
    pub fn set_stalled(&self, stalled: bool) {
        for sub in self.subscriptions.read().values() {
            if let Some(flag) = sub.stalled.upgrade() {
                flag.store(stalled, Ordering::SeqCst);
            }
        }
    }

    /// Drop every subscription with the given reason.
    pub fn drop_all(&self, reason: DropReason) -> usize {
        let mut subs = self.subscriptions.write();
        let count = subs.len();
        for (_, sub) in subs.drain() {
            sub.notify_dropped(reason.clone());
        }
        count
    }
}

impl Default for SubscriptionManager {
    fn default() -> Self {
        Self::new()
    }
}

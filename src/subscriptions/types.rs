//! Subscription types for live head-of-feed updates.

use crate::cursor::PaginationCursor;
use crate::types::Post;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Configuration for a subscription.
#[derive(Clone, Debug)]
pub struct SubscriptionConfig {
    /// Number of posts in the live window.
    pub page_size: usize,

    /// Max buffered snapshots. Once full, the oldest pending snapshot is
    /// discarded in favor of the newest.
    /// Default: 64
    pub buffer_size: usize,
}

impl Default for SubscriptionConfig {
    fn default() -> Self {
        Self {
            page_size: 5,
            buffer_size: 64,
        }
    }
}

/// Full replacement of the live-tracked head page.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Per-subscription delivery counter, starting at 1.
    pub sequence: u64,
    /// Head page in feed order.
    pub posts: Vec<Post>,
    /// Cursor at the last post of `posts`.
    pub cursor: Option<PaginationCursor>,
}

impl Snapshot {
    pub fn new(sequence: u64, posts: Vec<Post>) -> Self {
        let cursor = PaginationCursor::after_page(&posts);
        Self {
            sequence,
            posts,
            cursor,
        }
    }

    pub fn len(&self) -> usize {
        self.posts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.posts.is_empty()
    }
}

/// Events emitted by subscriptions.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FeedEvent {
    /// The live window changed.
    Snapshot { snapshot: Snapshot },

    /// Subscription was dropped.
    Dropped { reason: DropReason },
}

/// Why a subscription was dropped.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    /// Queue still full after discarding superseded snapshots.
    BufferOverflow,
    /// Receiving side went away without unsubscribing.
    Disconnected,
    /// The document source was closed.
    SourceClosed,
    /// Explicitly unsubscribed.
    Unsubscribed,
}

/// Unique identifier for a subscription.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

/// Receiving end of a subscription.
pub struct SubscriptionHandle {
    pub id: SubscriptionId,
    /// Channel to receive events.
    pub receiver: crossbeam_channel::Receiver<FeedEvent>,
    /// Set while the source cannot push updates.
    pub(crate) stalled: Arc<AtomicBool>,
}

impl SubscriptionHandle {
    /// True while the source is unreachable and no snapshots can arrive.
    pub fn is_stalled(&self) -> bool {
        self.stalled.load(Ordering::SeqCst)
    }

    /// Receive the next event (blocking).
    pub fn recv(&self) -> Result<FeedEvent, crossbeam_channel::RecvError> {
        self.receiver.recv()
    }

    /// Try to receive an event (non-blocking).
    pub fn try_recv(&self) -> Result<FeedEvent, crossbeam_channel::TryRecvError> {
        self.receiver.try_recv()
    }

    /// Receive with timeout.
    pub fn recv_timeout(
        &self,
        timeout: std::time::Duration,
    ) -> Result<FeedEvent, crossbeam_channel::RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }
}

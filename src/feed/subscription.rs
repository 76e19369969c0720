//! Live head-of-feed subscription as a stream of snapshots.

use crate::error::{FeedError, Result};
use crate::source::{DocumentSource, HeadQuery};
use crate::subscriptions::{DropReason, FeedEvent, Snapshot, SubscriptionHandle, SubscriptionId};
use crossbeam_channel::{Receiver, RecvTimeoutError, TryRecvError};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// A live subscription to the newest `page_size` posts.
///
/// Iterating yields each snapshot in delivery order; the sequence is lazy,
/// unbounded and cannot be restarted. Stopping (explicitly or by drop)
/// releases the live query on the source exactly once.
pub struct FeedSubscription {
    source: Arc<dyn DocumentSource>,
    handle: Option<SubscriptionHandle>,
    id: SubscriptionId,
    page_size: usize,
    /// Sequence of the last snapshot handed out.
    last_sequence: u64,
}

impl FeedSubscription {
    /// Begin listening for the top `page_size` posts.
    pub fn start(source: Arc<dyn DocumentSource>, page_size: usize) -> Result<Self> {
        if page_size == 0 {
            return Err(FeedError::InvalidPageSize(page_size));
        }
        let handle = source.subscribe_head(HeadQuery { limit: page_size })?;
        let id = handle.id;
        debug!(subscription = id.0, page_size, "feed subscription started");

        Ok(Self {
            source,
            handle: Some(handle),
            id,
            page_size,
            last_sequence: 0,
        })
    }

    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// True until stopped or dropped by the source.
    pub fn is_active(&self) -> bool {
        self.handle.is_some()
    }

    /// True while the source is unreachable. The subscription stays open and
    /// resumes with a fresh snapshot once the source is back.
    pub fn is_stalled(&self) -> bool {
        self.handle.as_ref().map_or(false, |h| h.is_stalled())
    }

    /// Release the subscription. No snapshot is returned after this.
    /// Stopping twice is a no-op.
    pub fn stop(&mut self) {
        if self.handle.take().is_some() {
            self.source.unsubscribe(self.id);
            debug!(subscription = self.id.0, "feed subscription stopped");
        }
    }

    /// Next pending snapshot without blocking.
    pub fn try_next(&mut self) -> Result<Option<Snapshot>> {
        loop {
            let event = match &self.handle {
                Some(handle) => handle.try_recv(),
                None => return Ok(None),
            };
            match event {
                Ok(event) => {
                    if let Some(snapshot) = self.accept(event)? {
                        return Ok(Some(snapshot));
                    }
                }
                Err(TryRecvError::Empty) => return Ok(None),
                Err(TryRecvError::Disconnected) => {
                    return Err(self.lost(DropReason::Disconnected))
                }
            }
        }
    }

    /// Next snapshot, waiting up to `timeout`. `Ok(None)` on timeout.
    pub fn next_timeout(&mut self, timeout: Duration) -> Result<Option<Snapshot>> {
        loop {
            let event = match &self.handle {
                Some(handle) => handle.recv_timeout(timeout),
                None => return Ok(None),
            };
            match event {
                Ok(event) => {
                    if let Some(snapshot) = self.accept(event)? {
                        return Ok(Some(snapshot));
                    }
                }
                Err(RecvTimeoutError::Timeout) => return Ok(None),
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(self.lost(DropReason::Disconnected))
                }
            }
        }
    }

    /// A second receiver on the event channel, for waiting without holding
    /// the subscription. Events taken from it go through [`accept`](Self::accept).
    pub(crate) fn receiver(&self) -> Option<Receiver<FeedEvent>> {
        self.handle.as_ref().map(|h| h.receiver.clone())
    }

    /// Turn a received event into a snapshot. A snapshot no newer than one
    /// already handed out yields `Ok(None)`.
    pub(crate) fn accept(&mut self, event: FeedEvent) -> Result<Option<Snapshot>> {
        match event {
            FeedEvent::Snapshot { snapshot } if snapshot.sequence <= self.last_sequence => {
                debug!(
                    subscription = self.id.0,
                    sequence = snapshot.sequence,
                    "skipping stale snapshot"
                );
                Ok(None)
            }
            FeedEvent::Snapshot { snapshot } => {
                self.last_sequence = snapshot.sequence;
                Ok(Some(snapshot))
            }
            FeedEvent::Dropped { reason } => Err(self.lost(reason)),
        }
    }

    /// The source dropped us; release the handle and report why.
    pub(crate) fn lost(&mut self, reason: DropReason) -> FeedError {
        if self.handle.take().is_some() {
            warn!(subscription = self.id.0, ?reason, "feed subscription lost");
            self.source.unsubscribe(self.id);
        }
        FeedError::SubscriptionDropped(reason)
    }
}

impl Iterator for FeedSubscription {
    type Item = Result<Snapshot>;

    /// Blocks until the next snapshot. Ends after `stop`, or after yielding
    /// the error that reports a dropped subscription.
    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let event = self.handle.as_ref()?.recv();
            match event {
                Ok(event) => match self.accept(event) {
                    Ok(Some(snapshot)) => return Some(Ok(snapshot)),
                    Ok(None) => {}
                    Err(e) => return Some(Err(e)),
                },
                Err(_) => return Some(Err(self.lost(DropReason::Disconnected))),
            }
        }
    }
}

impl Drop for FeedSubscription {
    fn drop(&mut self) {
        self.stop();
    }
}

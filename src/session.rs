//! Main Feed struct tying the subscription, store and source together.

use crate::cursor::{self, PaginationCursor};
use crate::error::{FeedError, Result};
use crate::feed::{CursorPolicy, FeedState, FeedStore, FeedSubscription};
use crate::source::DocumentSource;
use crate::subscriptions::DropReason;
use crate::types::Post;
use crossbeam_channel::RecvTimeoutError;
use parking_lot::Mutex;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Feed configuration.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    /// Posts per live window and per appended page.
    pub page_size: usize,

    /// Cursor handling for snapshots that arrive after pages were appended.
    pub cursor_policy: CursorPolicy,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            page_size: 5,
            cursor_policy: CursorPolicy::default(),
        }
    }
}

impl FeedConfig {
    /// Parse from JSON; missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.page_size == 0 {
            return Err(FeedError::InvalidConfig("page_size must be at least 1".into()));
        }
        Ok(())
    }
}

/// A live, paginated feed of posts.
///
/// Opening a feed starts the live subscription. Snapshots are applied when
/// the owner calls [`poll`](Self::poll) or
/// [`wait_for_snapshot`](Self::wait_for_snapshot); older pages are pulled
/// with [`load_more`](Self::load_more), one request at a time.
pub struct Feed {
    config: FeedConfig,

    source: Arc<dyn DocumentSource>,

    store: Mutex<FeedStore>,

    /// None once closed or lost.
    subscription: Mutex<Option<FeedSubscription>>,
}

impl Feed {
    /// Start a feed over `source`.
    ///
    /// Fails if the source cannot start the live query; nothing is left
    /// running in that case.
    pub fn open(source: Arc<dyn DocumentSource>, config: FeedConfig) -> Result<Self> {
        config.validate()?;

        let mut store = FeedStore::with_policy(config.page_size, config.cursor_policy)?;
        store.begin_initial()?;
        let subscription = FeedSubscription::start(Arc::clone(&source), config.page_size)?;
        info!(
            subscription = subscription.id().0,
            page_size = config.page_size,
            "opened feed"
        );

        Ok(Self {
            config,
            source,
            store: Mutex::new(store),
            subscription: Mutex::new(Some(subscription)),
        })
    }

    /// Apply every snapshot already delivered, without blocking.
    /// Returns how many were applied.
    ///
    /// A lost subscription is reported as
    /// [`FeedError::SubscriptionDropped`]; feed contents are kept. While the
    /// source is unreachable this returns [`FeedError::Unavailable`] after
    /// applying whatever was already delivered.
    pub fn poll(&self) -> Result<usize> {
        let mut guard = self.subscription.lock();
        let subscription = match guard.as_mut() {
            Some(s) => s,
            None => return Ok(0),
        };

        let mut applied = 0;
        loop {
            match subscription.try_next() {
                Ok(Some(snapshot)) => {
                    self.store.lock().apply_snapshot(snapshot)?;
                    applied += 1;
                }
                Ok(None) => break,
                Err(e) => {
                    *guard = None;
                    warn!(error = %e, "live updates stopped; keeping current feed");
                    return Err(e);
                }
            }
        }

        if subscription.is_stalled() {
            debug!(applied, "live updates stalled");
            return Err(stalled());
        }
        Ok(applied)
    }

    /// Block up to `timeout` for the next snapshot and apply it, then apply
    /// any others already queued. Returns false on timeout or if the feed is
    /// closed meanwhile. Fails with [`FeedError::Unavailable`] while the
    /// source is unreachable.
    pub fn wait_for_snapshot(&self, timeout: Duration) -> Result<bool> {
        let receiver = {
            let guard = self.subscription.lock();
            match guard.as_ref() {
                Some(s) if s.is_stalled() => return Err(stalled()),
                Some(s) => s.receiver(),
                None => None,
            }
        };
        let receiver = match receiver {
            Some(r) => r,
            None => return Ok(false),
        };

        // Blocks without the subscription lock so close() is never held up.
        let event = receiver.recv_timeout(timeout);

        {
            let mut guard = self.subscription.lock();
            let subscription = match guard.as_mut() {
                Some(s) => s,
                None => return Ok(false),
            };
            let accepted = match event {
                Ok(event) => subscription.accept(event),
                Err(RecvTimeoutError::Timeout) => return Ok(false),
                Err(RecvTimeoutError::Disconnected) => {
                    Err(subscription.lost(DropReason::Disconnected))
                }
            };
            match accepted {
                Ok(Some(snapshot)) => self.store.lock().apply_snapshot(snapshot)?,
                Ok(None) => {}
                Err(e) => {
                    *guard = None;
                    warn!(error = %e, "live updates stopped; keeping current feed");
                    return Err(e);
                }
            }
        }
        self.poll()?;
        Ok(true)
    }

    /// Fetch the next page after the current cursor and append it.
    ///
    /// Returns the appended posts; empty at end-of-feed. Rejected with
    /// [`FeedError::NoCursor`] before the first non-empty snapshot and with
    /// [`FeedError::LoadInFlight`] while another request is outstanding.
    /// On a failed fetch the feed is unchanged.
    pub fn load_more(&self) -> Result<Vec<Post>> {
        let ticket = self.store.lock().begin_load_more()?;

        let fetched = cursor::load_more(
            &*self.source,
            Some(ticket.cursor()),
            self.config.page_size,
        );

        let mut store = self.store.lock();
        match fetched {
            Ok(page) => {
                let posts = page.posts.clone();
                store.complete_load_more(ticket, page)?;
                debug!(appended = posts.len(), total = store.len(), "load more finished");
                Ok(posts)
            }
            Err(e) => {
                store.abort_load_more(ticket)?;
                warn!(error = %e, "load more failed");
                Err(e)
            }
        }
    }

    /// Stop live updates. Feed contents stay readable; calling again is a
    /// no-op.
    pub fn close(&self) {
        if let Some(mut subscription) = self.subscription.lock().take() {
            subscription.stop();
            info!(subscription = subscription.id().0, "closed feed");
        }
    }

    /// True while live updates are flowing: subscribed and not stalled.
    pub fn is_live(&self) -> bool {
        self.subscription
            .lock()
            .as_ref()
            .map_or(false, |s| !s.is_stalled())
    }

    // --- Accessors ---

    /// Copy of the current posts in display order.
    pub fn posts(&self) -> Vec<Post> {
        self.store.lock().posts().to_vec()
    }

    pub fn len(&self) -> usize {
        self.store.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.lock().is_empty()
    }

    pub fn cursor(&self) -> Option<PaginationCursor> {
        self.store.lock().cursor().cloned()
    }

    pub fn state(&self) -> FeedState {
        self.store.lock().state()
    }

    pub fn is_end_of_feed(&self) -> bool {
        self.store.lock().is_end_of_feed()
    }

    pub fn config(&self) -> &FeedConfig {
        &self.config
    }

    /// Run `f` against the store under its lock.
    pub fn with_store<R>(&self, f: impl FnOnce(&FeedStore) -> R) -> R {
        f(&self.store.lock())
    }
}

fn stalled() -> FeedError {
    FeedError::Unavailable("live updates stalled: document source unreachable".into())
}

impl Drop for Feed {
    fn drop(&mut self) {
        self.close();
    }
}

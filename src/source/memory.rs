//! In-process document source.

use crate::error::{FeedError, Result};
use crate::subscriptions::{
    DropReason, SubscriptionConfig, SubscriptionHandle, SubscriptionId, SubscriptionManager,
};
use crate::types::{NewPost, Post, PostId, Timestamp, UserProfile};
use parking_lot::{Mutex, RwLock};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tracing::{debug, info, warn};

use super::collection::PostCollection;
use super::{DocumentSource, HeadQuery, PageQuery};

/// Backend configuration.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Snapshots buffered per subscription. Older pending snapshots are
    /// discarded once it fills.
    pub subscription_buffer: usize,

    /// Largest `limit` accepted by head and page queries.
    pub max_page_size: usize,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            subscription_buffer: 64,
            max_page_size: 500,
        }
    }
}

impl BackendConfig {
    /// Parse from JSON; missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.subscription_buffer == 0 {
            return Err(FeedError::InvalidConfig(
                "subscription_buffer must be at least 1".into(),
            ));
        }
        if self.max_page_size == 0 {
            return Err(FeedError::InvalidConfig(
                "max_page_size must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Backend statistics.
#[derive(Clone, Debug, Default)]
pub struct BackendStats {
    pub post_count: u64,
    pub user_count: u64,
    pub subscription_count: u64,
    /// One-shot page queries served.
    pub page_queries: u64,
    /// Live head queries started.
    pub head_subscriptions: u64,
    /// Successful writes (inserts, updates, deletes).
    pub writes: u64,
}

/// An in-memory `posts`/`users` document store with live head queries.
///
/// Owned by the application's composition root; explicit `open`/`close`
/// lifecycle. After `close` every call fails with [`FeedError::Closed`].
pub struct MemoryBackend {
    config: BackendConfig,

    posts: RwLock<PostCollection>,

    users: RwLock<HashMap<String, UserProfile>>,

    subscriptions: SubscriptionManager,

    /// Serializes writes so snapshot emission follows write order.
    write_lock: Mutex<()>,

    /// Source of id entropy and monotonic creation times.
    next_sequence: AtomicU64,
    last_created: Mutex<Timestamp>,

    reachable: AtomicBool,
    closed: AtomicBool,

    page_queries: AtomicU64,
    head_subscriptions: AtomicU64,
    writes: AtomicU64,
}

impl MemoryBackend {
    /// Open an empty backend.
    pub fn open(config: BackendConfig) -> Result<Self> {
        config.validate()?;
        info!(
            subscription_buffer = config.subscription_buffer,
            max_page_size = config.max_page_size,
            "opening document source"
        );

        Ok(Self {
            config,
            posts: RwLock::new(PostCollection::new()),
            users: RwLock::new(HashMap::new()),
            subscriptions: SubscriptionManager::new(),
            write_lock: Mutex::new(()),
            next_sequence: AtomicU64::new(1),
            last_created: Mutex::new(Timestamp::default()),
            reachable: AtomicBool::new(true),
            closed: AtomicBool::new(false),
            page_queries: AtomicU64::new(0),
            head_subscriptions: AtomicU64::new(0),
            writes: AtomicU64::new(0),
        })
    }

    /// Close the backend, dropping every live subscription.
    pub fn close(&self) {
        let _lock = self.write_lock.lock();
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let dropped = self.subscriptions.drop_all(DropReason::SourceClosed);
        info!(dropped_subscriptions = dropped, "closed document source");
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Simulate losing or regaining connectivity.
    ///
    /// While unreachable, calls fail with [`FeedError::Unavailable`] and live
    /// subscriptions are marked stalled. On reconnect the stall is cleared
    /// and windows that changed in the meantime are delivered.
    pub fn set_reachable(&self, reachable: bool) {
        let _lock = self.write_lock.lock();
        let was = self.reachable.swap(reachable, Ordering::SeqCst);
        if reachable && !was && !self.is_closed() {
            debug!("document source reachable again; resyncing subscribers");
            self.subscriptions.set_stalled(false);
            self.publish();
        } else if !reachable && was {
            warn!("document source unreachable");
            self.subscriptions.set_stalled(true);
        }
    }

    /// Bulk-insert fully formed posts, keeping their ids and timestamps.
    ///
    /// Seeding models server-side writes, so it ignores reachability.
    pub fn seed(&self, posts: impl IntoIterator<Item = Post>) -> Result<usize> {
        let _lock = self.write_lock.lock();
        self.check_closed()?;

        let mut count = 0;
        {
            let mut collection = self.posts.write();
            let mut last = self.last_created.lock();
            for post in posts {
                if post.created_at > *last {
                    *last = post.created_at;
                }
                collection.insert(post);
                count += 1;
            }
        }
        self.writes.fetch_add(count as u64, Ordering::Relaxed);
        debug!(count, "seeded posts");

        self.publish();
        Ok(count)
    }

    /// Increment the view counter of a post.
    pub fn record_view(&self, id: &PostId) -> Result<Post> {
        let _lock = self.write_lock.lock();
        self.check_available()?;

        let updated = self
            .posts
            .write()
            .update(id, |p| p.views += 1)
            .ok_or_else(|| FeedError::PostNotFound(id.clone()))?;
        self.writes.fetch_add(1, Ordering::Relaxed);

        self.publish();
        Ok(updated)
    }

    /// Delete a post.
    pub fn delete_post(&self, id: &PostId) -> Result<Post> {
        let _lock = self.write_lock.lock();
        self.check_available()?;

        let removed = self
            .posts
            .write()
            .remove(id)
            .ok_or_else(|| FeedError::PostNotFound(id.clone()))?;
        self.writes.fetch_add(1, Ordering::Relaxed);
        debug!(post = %id, "deleted post");

        self.publish();
        Ok(removed)
    }

    /// Store a profile document under `key`.
    pub fn put_user(&self, key: &str, profile: UserProfile) -> Result<()> {
        let _lock = self.write_lock.lock();
        self.check_available()?;
        self.users.write().insert(key.to_string(), profile);
        self.writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    pub fn stats(&self) -> BackendStats {
        BackendStats {
            post_count: self.posts.read().len() as u64,
            user_count: self.users.read().len() as u64,
            subscription_count: self.subscriptions.subscription_count() as u64,
            page_queries: self.page_queries.load(Ordering::Relaxed),
            head_subscriptions: self.head_subscriptions.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
        }
    }

    pub fn config(&self) -> &BackendConfig {
        &self.config
    }

    // --- Internal ---

    fn check_closed(&self) -> Result<()> {
        if self.is_closed() {
            return Err(FeedError::Closed);
        }
        Ok(())
    }

    fn check_available(&self) -> Result<()> {
        self.check_closed()?;
        if !self.reachable.load(Ordering::SeqCst) {
            return Err(FeedError::Unavailable("document source unreachable".into()));
        }
        Ok(())
    }

    fn check_limit(&self, limit: usize) -> Result<()> {
        if limit == 0 || limit > self.config.max_page_size {
            return Err(FeedError::InvalidPageSize(limit));
        }
        Ok(())
    }

    /// Next creation time, strictly after every existing post.
    fn next_timestamp(&self) -> Result<Timestamp> {
        let mut last = self.last_created.lock();
        let now = Timestamp::now();
        let next = if now > *last {
            now
        } else {
            last.0.checked_add(1).map(Timestamp).ok_or_else(|| {
                FeedError::InvalidPost(format!(
                    "no creation time left after newest post ({:?})",
                    *last
                ))
            })?
        };
        *last = next;
        Ok(next)
    }

    /// Push changed windows to subscribers. Caller holds `write_lock`.
    fn publish(&self) {
        if !self.reachable.load(Ordering::SeqCst) {
            return;
        }
        let posts = self.posts.read();
        let delivered = self.subscriptions.broadcast_windows(|limit| posts.head(limit));
        if delivered > 0 {
            debug!(delivered, "published snapshots");
        }
    }
}

impl DocumentSource for MemoryBackend {
    fn subscribe_head(&self, query: HeadQuery) -> Result<SubscriptionHandle> {
        let _lock = self.write_lock.lock();
        self.check_available()?;
        self.check_limit(query.limit)?;

        let handle = self.subscriptions.subscribe(SubscriptionConfig {
            page_size: query.limit,
            buffer_size: self.config.subscription_buffer,
        });
        let window = self.posts.read().head(query.limit);
        self.subscriptions.deliver_initial(handle.id, window)?;
        self.head_subscriptions.fetch_add(1, Ordering::Relaxed);

        debug!(subscription = handle.id.0, limit = query.limit, "live head query started");
        Ok(handle)
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        self.subscriptions.unsubscribe(id);
    }

    fn query_page(&self, query: PageQuery) -> Result<Vec<Post>> {
        self.check_available()?;
        self.check_limit(query.limit)?;
        self.page_queries.fetch_add(1, Ordering::Relaxed);
        Ok(self.posts.read().after(&query.start_after, query.limit))
    }

    fn insert_post(&self, post: NewPost) -> Result<Post> {
        post.validate()?;
        let _lock = self.write_lock.lock();
        self.check_available()?;

        let created_at = self.next_timestamp()?;
        let sequence = self.next_sequence.fetch_add(1, Ordering::SeqCst);
        let id = PostId::generate(sequence, created_at, &post);
        let post = post.into_post(id, created_at);

        self.posts.write().insert(post.clone());
        self.writes.fetch_add(1, Ordering::Relaxed);
        info!(post = %post.id, username = %post.username, "created post");

        self.publish();
        Ok(post)
    }

    fn posts_by_username(&self, username: &str) -> Result<Vec<Post>> {
        self.check_available()?;
        Ok(self.posts.read().by_username(username))
    }

    fn get_user(&self, key: &str) -> Result<Option<UserProfile>> {
        self.check_available()?;
        Ok(self.users.read().get(key).cloned())
    }
}

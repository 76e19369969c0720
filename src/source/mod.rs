//! Document sources: the query service the feed reads from.
//!
//! The feed only talks to a source through [`DocumentSource`]. The
//! application constructs one (usually a [`MemoryBackend`]) at its
//! composition root and shares it as `Arc<dyn DocumentSource>`.

mod collection;
mod memory;

pub use collection::PostCollection;
pub use memory::{BackendConfig, BackendStats, MemoryBackend};

use crate::cursor::PaginationCursor;
use crate::error::Result;
use crate::subscriptions::{SubscriptionHandle, SubscriptionId};
use crate::types::{NewPost, Post, UserProfile};

/// Live query over the newest `limit` posts in feed order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HeadQuery {
    pub limit: usize,
}

/// One-shot query for the page strictly after `start_after`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PageQuery {
    pub start_after: PaginationCursor,
    pub limit: usize,
}

/// A managed document-query service holding the `posts` collection.
pub trait DocumentSource: Send + Sync {
    /// Start a live query. The current window is delivered as the first
    /// snapshot before this returns.
    fn subscribe_head(&self, query: HeadQuery) -> Result<SubscriptionHandle>;

    /// Release a live query. Unknown ids are ignored.
    fn unsubscribe(&self, id: SubscriptionId);

    /// One-shot read of a page in feed order.
    fn query_page(&self, query: PageQuery) -> Result<Vec<Post>>;

    /// Create a post; the source assigns id and creation time.
    fn insert_post(&self, post: NewPost) -> Result<Post>;

    /// All posts by `username`, in feed order.
    fn posts_by_username(&self, username: &str) -> Result<Vec<Post>>;

    /// Profile document stored under `key`.
    fn get_user(&self, key: &str) -> Result<Option<UserProfile>>;
}

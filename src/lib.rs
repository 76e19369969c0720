//! # Feed Sync
//!
//! A live-updating, cursor-paginated feed of posts over a document-query
//! service.
//!
//! ## Core Concepts
//!
//! - **Snapshots**: Full replacements of the newest `page_size` posts,
//!   pushed whenever that window changes
//! - **Cursors**: Opaque "last seen" markers; the next page starts strictly
//!   after them
//! - **Feed store**: The caller's post list; snapshots overwrite its head,
//!   pages append to its tail
//! - **Document sources**: The injected query service, with an in-memory
//!   implementation
//!
//! ## Example
//!
//! ```ignore
//! use feedsync::{BackendConfig, Feed, FeedConfig, MemoryBackend, NewPost};
//! use std::sync::Arc;
//!
//! let source = Arc::new(MemoryBackend::open(BackendConfig::default())?);
//! source.insert_post(NewPost::new("Cloudy Sky", "https://picsum.photos/600/400"))?;
//!
//! let feed = Feed::open(source.clone(), FeedConfig::default())?;
//! feed.poll()?;              // apply the first snapshot
//! let older = feed.load_more()?;
//!
//! feed.close();
//! source.close();
//! ```

pub mod cursor;
pub mod error;
pub mod feed;
pub mod session;
pub mod source;
pub mod subscriptions;
pub mod types;

// Re-exports
pub use cursor::{load_more, PageResult, PaginationCursor};
pub use error::{FeedError, Result};
pub use feed::{CursorPolicy, FeedState, FeedStore, FeedSubscription, LoadTicket};
pub use session::{Feed, FeedConfig};
pub use source::{
    BackendConfig, BackendStats, DocumentSource, HeadQuery, MemoryBackend, PageQuery,
    PostCollection,
};
pub use subscriptions::{
    DropReason, FeedEvent, Snapshot, SubscriptionConfig, SubscriptionHandle, SubscriptionId,
    SubscriptionManager,
};
pub use types::*;

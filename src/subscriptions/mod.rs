//! Subscription system for live head-of-feed updates.
//!
//! Each subscription tracks the newest `page_size` posts. Whenever a write
//! changes that window the subscriber receives a full [`Snapshot`] of it,
//! never a diff.
//!
//! Subscriptions support:
//! - An initial snapshot delivered on subscribe
//! - Suppression of writes that leave the window unchanged
//! - Bounded buffers; a lagging subscriber keeps only the newest snapshots
//! - A stall flag raised while the source is unreachable
//!
//! # Example
//!
//! ```ignore
//! let manager = SubscriptionManager::new();
//! let handle = manager.subscribe(SubscriptionConfig { page_size: 5, ..Default::default() });
//! manager.deliver_initial(handle.id, collection.head(5))?;
//!
//! loop {
//!     match handle.recv() {
//!         Ok(FeedEvent::Snapshot { snapshot }) => render(&snapshot.posts),
//!         Ok(FeedEvent::Dropped { reason }) => break,
//!         Err(_) => break,
//!     }
//! }
//! ```

mod manager;
mod types;

pub use manager::SubscriptionManager;
pub use types::{
    DropReason, FeedEvent, Snapshot, SubscriptionConfig, SubscriptionHandle, SubscriptionId,
};

//! Feed-side components: the live subscription stream and the caller-owned
//! post list it feeds.

mod store;
mod subscription;

pub use store::{CursorPolicy, FeedState, FeedStore, LoadTicket};
pub use subscription::FeedSubscription;

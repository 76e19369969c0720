//! Pagination cursors and one-shot page fetches.

use crate::error::{FeedError, Result};
use crate::source::{DocumentSource, PageQuery};
use crate::types::{FeedKey, Post, PostId, Timestamp};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Opaque marker for the last post materialized by a fetch.
///
/// Used as an exclusive lower bound in feed order: the next page starts
/// strictly after the post it names.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaginationCursor {
    created_at: Timestamp,
    post_id: PostId,
}

impl PaginationCursor {
    /// Cursor positioned at `post`.
    pub fn from_post(post: &Post) -> Self {
        Self {
            created_at: post.created_at,
            post_id: post.id.clone(),
        }
    }

    /// Cursor positioned at the last post of a page, if any.
    pub fn after_page(posts: &[Post]) -> Option<Self> {
        posts.last().map(Self::from_post)
    }

    pub fn post_id(&self) -> &PostId {
        &self.post_id
    }

    pub fn created_at(&self) -> Timestamp {
        self.created_at
    }

    /// Encode as an opaque token.
    pub fn encode(&self) -> String {
        hex::encode(format!("{}:{}", self.created_at.0, self.post_id))
    }

    /// Decode a token produced by [`encode`](Self::encode).
    pub fn decode(token: &str) -> Result<Self> {
        let bytes = hex::decode(token).map_err(|e| FeedError::InvalidCursor(e.to_string()))?;
        let raw = String::from_utf8(bytes)
            .map_err(|_| FeedError::InvalidCursor("token is not valid UTF-8".into()))?;
        let (micros, id) = raw
            .split_once(':')
            .ok_or_else(|| FeedError::InvalidCursor("missing separator".into()))?;
        let micros: i64 = micros
            .parse()
            .map_err(|_| FeedError::InvalidCursor(format!("bad timestamp {:?}", micros)))?;
        if id.is_empty() {
            return Err(FeedError::InvalidCursor("empty post id".into()));
        }
        Ok(Self {
            created_at: Timestamp(micros),
            post_id: PostId::new(id),
        })
    }

    pub(crate) fn feed_key(&self) -> FeedKey {
        FeedKey {
            created_at: self.created_at,
            id: self.post_id.clone(),
        }
    }
}

/// Result of a one-shot page fetch.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PageResult {
    /// Posts strictly after the request cursor, in feed order.
    pub posts: Vec<Post>,
    /// Cursor for the following request. Unchanged from the request when
    /// the page is empty.
    pub cursor: Option<PaginationCursor>,
}

impl PageResult {
    /// An empty page signals end-of-feed.
    pub fn is_end_of_feed(&self) -> bool {
        self.posts.is_empty()
    }
}

/// Fetch one page strictly after `cursor`.
///
/// Without a cursor this is a no-op: nothing is queried and an empty page is
/// returned.
pub fn load_more(
    source: &dyn DocumentSource,
    cursor: Option<&PaginationCursor>,
    page_size: usize,
) -> Result<PageResult> {
    if page_size == 0 {
        return Err(FeedError::InvalidPageSize(page_size));
    }

    let cursor = match cursor {
        Some(c) => c,
        None => {
            debug!("load_more without cursor; skipping query");
            return Ok(PageResult::default());
        }
    };

    let posts = source.query_page(PageQuery {
        start_after: cursor.clone(),
        limit: page_size,
    })?;

    let next = PaginationCursor::after_page(&posts).unwrap_or_else(|| cursor.clone());
    debug!(
        fetched = posts.len(),
        after = %cursor.post_id(),
        "loaded page"
    );

    Ok(PageResult {
        posts,
        cursor: Some(next),
    })
}

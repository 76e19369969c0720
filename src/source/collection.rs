//! Ordered post collection with id lookup.

use crate::cursor::PaginationCursor;
use crate::types::{FeedKey, Post, PostId};
use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;

/// Posts kept in feed order, newest first.
#[derive(Default)]
pub struct PostCollection {
    /// Feed position -> post.
    ordered: BTreeMap<FeedKey, Post>,

    /// Post ID -> feed position.
    positions: HashMap<PostId, FeedKey>,
}

impl PostCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a post. Returns the previous version, if any.
    pub fn insert(&mut self, post: Post) -> Option<Post> {
        let previous = self.remove(&post.id);
        let key = post.feed_key();
        self.positions.insert(post.id.clone(), key.clone());
        self.ordered.insert(key, post);
        previous
    }

    /// Remove a post by id.
    pub fn remove(&mut self, id: &PostId) -> Option<Post> {
        let key = self.positions.remove(id)?;
        self.ordered.remove(&key)
    }

    pub fn get(&self, id: &PostId) -> Option<&Post> {
        self.positions.get(id).and_then(|key| self.ordered.get(key))
    }

    /// Apply `f` to a post in place. The ordering key must not change.
    pub fn update<F>(&mut self, id: &PostId, f: F) -> Option<Post>
    where
        F: FnOnce(&mut Post),
    {
        let key = self.positions.get(id)?;
        let post = self.ordered.get_mut(key)?;
        f(post);
        debug_assert_eq!(&post.feed_key(), key);
        Some(post.clone())
    }

    /// The newest `limit` posts.
    pub fn head(&self, limit: usize) -> Vec<Post> {
        self.ordered.values().take(limit).cloned().collect()
    }

    /// Up to `limit` posts strictly after `cursor` in feed order.
    ///
    /// The cursor's post need not still exist; its position is enough.
    pub fn after(&self, cursor: &PaginationCursor, limit: usize) -> Vec<Post> {
        self.ordered
            .range((Bound::Excluded(cursor.feed_key()), Bound::Unbounded))
            .take(limit)
            .map(|(_, post)| post.clone())
            .collect()
    }

    /// Posts by `username`, in feed order.
    pub fn by_username(&self, username: &str) -> Vec<Post> {
        self.ordered
            .values()
            .filter(|p| p.username == username)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }
}

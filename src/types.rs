//! Core types for the feed.

use crate::error::{FeedError, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::cmp::Ordering;
use std::collections::HashSet;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Username assigned to posts created without one.
pub const ANONYMOUS_USERNAME: &str = "Anonymous";

/// Location assigned to posts created without one.
pub const UNKNOWN_LOCATION: &str = "Unknown";

/// Length of generated post ids (hex characters).
const GENERATED_ID_LEN: usize = 20;

/// Unique, opaque identifier for a post.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PostId(pub String);

impl PostId {
    pub fn new(id: impl Into<String>) -> Self {
        PostId(id.into())
    }

    /// Derive a fresh id from the post content and a source-local sequence.
    pub fn generate(sequence: u64, created_at: Timestamp, post: &NewPost) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(sequence.to_be_bytes());
        hasher.update(created_at.0.to_be_bytes());
        hasher.update(post.username.as_bytes());
        hasher.update(post.title.as_bytes());
        hasher.update(post.image.as_bytes());
        let digest = hex::encode(hasher.finalize());
        PostId(digest[..GENERATED_ID_LEN].to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for PostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PostId({})", self.0)
    }
}

impl fmt::Display for PostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for PostId {
    fn from(s: &str) -> Self {
        PostId(s.to_string())
    }
}

/// Microseconds since Unix epoch.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(pub i64);

impl Timestamp {
    /// Current time.
    pub fn now() -> Self {
        let micros = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_micros() as i64)
            .unwrap_or_default();
        Timestamp(micros)
    }

    /// Day-level display string, e.g. `Sat Oct 18 2026`.
    pub fn display_date(&self) -> String {
        let secs = self.0.div_euclid(1_000_000);
        let nanos = (self.0.rem_euclid(1_000_000) * 1_000) as u32;
        chrono::DateTime::<chrono::Utc>::from_timestamp(secs, nanos)
            .map(|dt| dt.format("%a %b %d %Y").to_string())
            .unwrap_or_default()
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timestamp({})", self.0)
    }
}

/// A post document.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: PostId,
    pub username: String,
    pub title: String,
    /// Image URI.
    pub image: String,
    /// Display date, not used for ordering.
    pub date: String,
    pub views: u64,
    /// Display location.
    pub location: String,
    #[serde(default)]
    pub category: String,
    /// Ordering key.
    pub created_at: Timestamp,
}

impl Post {
    /// Text handed to the platform share sheet.
    pub fn share_message(&self) -> String {
        format!("{}\n{}", self.title, self.image)
    }

    pub(crate) fn feed_key(&self) -> FeedKey {
        FeedKey {
            created_at: self.created_at,
            id: self.id.clone(),
        }
    }
}

/// Input for creating a new post (before id and timestamp assigned).
#[derive(Clone, Debug, Default)]
pub struct NewPost {
    pub username: String,
    pub title: String,
    pub image: String,
    pub category: String,
    pub location: String,
    /// Explicit display date; derived from the creation time when absent.
    pub date: Option<String>,
}

impl NewPost {
    pub fn new(title: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            image: image.into(),
            ..Default::default()
        }
    }

    pub fn by(mut self, username: impl Into<String>) -> Self {
        self.username = username.into();
        self
    }

    pub fn at(mut self, location: impl Into<String>) -> Self {
        self.location = location.into();
        self
    }

    pub fn in_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    pub fn with_date(mut self, date: impl Into<String>) -> Self {
        self.date = Some(date.into());
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.title.trim().is_empty() {
            return Err(FeedError::InvalidPost("title must not be empty".into()));
        }
        Ok(())
    }

    /// Materialize into a stored post, filling in defaults for blank fields.
    pub fn into_post(self, id: PostId, created_at: Timestamp) -> Post {
        let username = if self.username.trim().is_empty() {
            ANONYMOUS_USERNAME.to_string()
        } else {
            self.username
        };
        let location = if self.location.trim().is_empty() {
            UNKNOWN_LOCATION.to_string()
        } else {
            self.location
        };
        Post {
            id,
            username,
            title: self.title,
            image: self.image,
            date: self.date.unwrap_or_else(|| created_at.display_date()),
            views: 0,
            location,
            category: self.category,
            created_at,
        }
    }
}

/// Position of a post in feed order: newest first, ties broken by id
/// (descending) so every post has a unique position.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub(crate) struct FeedKey {
    pub created_at: Timestamp,
    pub id: PostId,
}

impl Ord for FeedKey {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .created_at
            .cmp(&self.created_at)
            .then_with(|| other.id.cmp(&self.id))
    }
}

impl PartialOrd for FeedKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Profile document shown on the profile screen.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserProfile {
    pub name: String,
    pub role: String,
    pub bio: String,
    /// Avatar URI.
    pub avatar: String,
    pub followers: u64,
    pub following: u64,
    pub posts: u64,
    pub blocked: u64,
}

/// Session-local set of liked posts. Not persisted.
#[derive(Clone, Debug, Default)]
pub struct LikeSet {
    liked: HashSet<PostId>,
}

impl LikeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Flip the liked state of a post. Returns true if it is now liked.
    pub fn toggle(&mut self, id: &PostId) -> bool {
        if self.liked.remove(id) {
            false
        } else {
            self.liked.insert(id.clone());
            true
        }
    }

    pub fn is_liked(&self, id: &PostId) -> bool {
        self.liked.contains(id)
    }

    pub fn len(&self) -> usize {
        self.liked.len()
    }

    pub fn is_empty(&self) -> bool {
        self.liked.is_empty()
    }
}

//! Caller-side feed state: snapshot replacement and page appends.

use crate::cursor::{PageResult, PaginationCursor};
use crate::error::{FeedError, Result};
use crate::subscriptions::Snapshot;
use crate::types::{Post, PostId};
use serde::Deserialize;
use std::collections::HashSet;
use std::fmt;
use tracing::{debug, warn};

/// Lifecycle of a feed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FeedState {
    /// Nothing started.
    Idle,
    /// Subscription started, first snapshot pending.
    LoadingInitial,
    /// Head page loaded, no page request outstanding.
    Ready,
    /// A page request is outstanding.
    LoadingMore,
}

impl fmt::Display for FeedState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FeedState::Idle => "idle",
            FeedState::LoadingInitial => "loading_initial",
            FeedState::Ready => "ready",
            FeedState::LoadingMore => "loading_more",
        };
        f.write_str(name)
    }
}

/// Where the cursor goes when a snapshot arrives after pages were appended.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CursorPolicy {
    /// Cursor moves to the snapshot's last post, even if older pages were
    /// already appended. The next page may then repeat appended posts.
    #[default]
    FollowSnapshot,
    /// While appended pages exist, the cursor stays at the last appended
    /// post.
    PreserveTail,
}

/// Proof that a page request was admitted. Must be handed back to
/// `complete_load_more` or `abort_load_more`.
#[derive(Debug)]
pub struct LoadTicket {
    id: u64,
    cursor: PaginationCursor,
}

impl LoadTicket {
    /// Cursor the page must be fetched after.
    pub fn cursor(&self) -> &PaginationCursor {
        &self.cursor
    }
}

/// Ordered posts of one feed: a live head page followed by appended pages.
#[derive(Debug)]
pub struct FeedStore {
    page_size: usize,
    policy: CursorPolicy,
    state: FeedState,
    posts: Vec<Post>,
    /// Number of leading posts owned by the last snapshot.
    head_len: usize,
    cursor: Option<PaginationCursor>,
    end_of_feed: bool,
    snapshots_applied: u64,
    pages_appended: u64,
    next_ticket: u64,
    outstanding: Option<u64>,
}

impl FeedStore {
    pub fn new(page_size: usize) -> Result<Self> {
        Self::with_policy(page_size, CursorPolicy::default())
    }

    pub fn with_policy(page_size: usize, policy: CursorPolicy) -> Result<Self> {
        if page_size == 0 {
            return Err(FeedError::InvalidPageSize(page_size));
        }
        Ok(Self {
            page_size,
            policy,
            state: FeedState::Idle,
            posts: Vec::new(),
            head_len: 0,
            cursor: None,
            end_of_feed: false,
            snapshots_applied: 0,
            pages_appended: 0,
            next_ticket: 1,
            outstanding: None,
        })
    }

    // --- Transitions ---

    /// Idle -> LoadingInitial.
    pub fn begin_initial(&mut self) -> Result<()> {
        self.expect_state(FeedState::Idle)?;
        self.state = FeedState::LoadingInitial;
        Ok(())
    }

    /// Apply a live snapshot.
    ///
    /// The first snapshot becomes the whole feed. Later ones overwrite the
    /// head page in place; appended pages are kept behind it.
    pub fn apply_snapshot(&mut self, snapshot: Snapshot) -> Result<()> {
        if self.state == FeedState::Idle {
            return Err(FeedError::InvalidState {
                expected: "started feed".into(),
                got: self.state.to_string(),
            });
        }

        let tail_len = self.posts.len() - self.head_len;
        let new_head_len = snapshot.posts.len();
        let tail = self.posts.split_off(self.head_len);
        self.posts = snapshot.posts;
        self.posts.extend(tail);
        self.head_len = new_head_len;

        let move_cursor = tail_len == 0 || self.policy == CursorPolicy::FollowSnapshot;
        if move_cursor && self.cursor != snapshot.cursor {
            self.cursor = snapshot.cursor;
            self.end_of_feed = false;
        }

        if self.state == FeedState::LoadingInitial {
            self.state = FeedState::Ready;
        }
        self.snapshots_applied += 1;

        debug!(
            sequence = snapshot.sequence,
            head = self.head_len,
            tail = tail_len,
            "applied snapshot"
        );
        Ok(())
    }

    /// Ready -> LoadingMore. Rejects when no cursor exists or a request is
    /// already outstanding.
    pub fn begin_load_more(&mut self) -> Result<LoadTicket> {
        if self.state == FeedState::LoadingMore {
            return Err(FeedError::LoadInFlight);
        }
        let cursor = self.cursor.clone().ok_or(FeedError::NoCursor)?;
        self.expect_state(FeedState::Ready)?;

        let id = self.next_ticket;
        self.next_ticket += 1;
        self.outstanding = Some(id);
        self.state = FeedState::LoadingMore;
        Ok(LoadTicket { id, cursor })
    }

    /// LoadingMore -> Ready, appending the fetched page.
    /// Returns the number of posts appended.
    pub fn complete_load_more(&mut self, ticket: LoadTicket, page: PageResult) -> Result<usize> {
        self.redeem(&ticket)?;

        if page.posts.is_empty() {
            self.end_of_feed = true;
            debug!("reached end of feed");
            return Ok(0);
        }

        let seen: HashSet<&PostId> = self.posts.iter().map(|p| &p.id).collect();
        let duplicates = page.posts.iter().filter(|p| seen.contains(&p.id)).count();
        if duplicates > 0 {
            warn!(duplicates, "appended page repeats posts already in the feed");
        }

        let appended = page.posts.len();
        self.cursor = page
            .cursor
            .or_else(|| PaginationCursor::after_page(&page.posts));
        self.posts.extend(page.posts);
        self.end_of_feed = false;
        self.pages_appended += 1;
        Ok(appended)
    }

    /// LoadingMore -> Ready, leaving the feed untouched.
    pub fn abort_load_more(&mut self, ticket: LoadTicket) -> Result<()> {
        self.redeem(&ticket)
    }

    fn redeem(&mut self, ticket: &LoadTicket) -> Result<()> {
        if self.state != FeedState::LoadingMore || self.outstanding != Some(ticket.id) {
            return Err(FeedError::InvalidState {
                expected: format!("{} with ticket {}", FeedState::LoadingMore, ticket.id),
                got: self.state.to_string(),
            });
        }
        self.outstanding = None;
        self.state = FeedState::Ready;
        Ok(())
    }

    fn expect_state(&self, expected: FeedState) -> Result<()> {
        if self.state != expected {
            return Err(FeedError::InvalidState {
                expected: expected.to_string(),
                got: self.state.to_string(),
            });
        }
        Ok(())
    }

    // --- Accessors ---

    pub fn state(&self) -> FeedState {
        self.state
    }

    pub fn posts(&self) -> &[Post] {
        &self.posts
    }

    /// Posts owned by the live snapshot.
    pub fn head(&self) -> &[Post] {
        &self.posts[..self.head_len]
    }

    /// Posts appended by page loads.
    pub fn tail(&self) -> &[Post] {
        &self.posts[self.head_len..]
    }

    pub fn cursor(&self) -> Option<&PaginationCursor> {
        self.cursor.as_ref()
    }

    /// True once a page load came back empty, until the cursor moves.
    pub fn is_end_of_feed(&self) -> bool {
        self.end_of_feed
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn policy(&self) -> CursorPolicy {
        self.policy
    }

    pub fn len(&self) -> usize {
        self.posts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.posts.is_empty()
    }

    pub fn snapshots_applied(&self) -> u64 {
        self.snapshots_applied
    }

    pub fn pages_appended(&self) -> u64 {
        self.pages_appended
    }
}

//! Pagination tests: snapshots, cursors and appended pages.

use feedsync::{
    load_more, BackendConfig, Feed, FeedConfig, FeedState, MemoryBackend, NewPost,
    PaginationCursor, Post, PostId, Timestamp,
};
use proptest::prelude::*;
use std::collections::HashSet;
use std::sync::Arc;

/// Backend holding p1..=pN, where a larger N means a newer post.
fn seeded_backend(n: usize) -> Arc<MemoryBackend> {
    let backend = Arc::new(MemoryBackend::open(BackendConfig::default()).unwrap());
    backend
        .seed((1..=n as i64).map(|i| {
            let id = format!("p{}", i);
            NewPost::new(format!("Post {}", i), format!("https://picsum.photos/seed/{}/600/400", i))
                .by("TravelerX")
                .into_post(PostId::new(id), Timestamp(i * 1_000))
        }))
        .unwrap();
    backend
}

fn open_feed(backend: &Arc<MemoryBackend>, page_size: usize) -> Feed {
    let feed = Feed::open(
        backend.clone(),
        FeedConfig {
            page_size,
            ..Default::default()
        },
    )
    .unwrap();
    feed.poll().unwrap();
    feed
}

fn ids(posts: &[Post]) -> Vec<String> {
    posts.iter().map(|p| p.id.to_string()).collect()
}

// --- Worked Example ---

#[test]
fn test_twelve_posts_page_size_five() {
    let backend = seeded_backend(12);
    let feed = open_feed(&backend, 5);

    assert_eq!(ids(&feed.posts()), vec!["p12", "p11", "p10", "p9", "p8"]);
    assert_eq!(feed.cursor().unwrap().post_id().as_str(), "p8");

    let page = feed.load_more().unwrap();
    assert_eq!(ids(&page), vec!["p7", "p6", "p5", "p4", "p3"]);
    assert_eq!(feed.cursor().unwrap().post_id().as_str(), "p3");

    let page = feed.load_more().unwrap();
    assert_eq!(ids(&page), vec!["p2", "p1"]);
    assert_eq!(feed.cursor().unwrap().post_id().as_str(), "p1");

    let page = feed.load_more().unwrap();
    assert!(page.is_empty());
    assert_eq!(feed.cursor().unwrap().post_id().as_str(), "p1");
    assert!(feed.is_end_of_feed());
    assert_eq!(feed.len(), 12);
    assert_eq!(feed.state(), FeedState::Ready);
}

#[test]
fn test_end_of_feed_is_idempotent() {
    let backend = seeded_backend(3);
    let feed = open_feed(&backend, 5);
    assert_eq!(feed.len(), 3);

    for _ in 0..3 {
        assert!(feed.load_more().unwrap().is_empty());
        assert_eq!(feed.cursor().unwrap().post_id().as_str(), "p1");
        assert_eq!(feed.len(), 3);
    }
}

#[test]
fn test_empty_collection_never_queries() {
    let backend = seeded_backend(0);
    let feed = open_feed(&backend, 5);

    assert_eq!(feed.state(), FeedState::Ready);
    assert!(feed.cursor().is_none());
    assert!(feed.load_more().is_err());
    assert_eq!(backend.stats().page_queries, 0);
}

// --- Free-standing load_more ---

#[test]
fn test_load_more_without_cursor_is_noop() {
    let backend = seeded_backend(5);
    let page = load_more(&*backend, None, 5).unwrap();
    assert!(page.is_end_of_feed());
    assert!(page.cursor.is_none());
    assert_eq!(backend.stats().page_queries, 0);
}

#[test]
fn test_load_more_with_decoded_cursor() {
    let backend = seeded_backend(6);
    let feed = open_feed(&backend, 3);
    let token = feed.cursor().unwrap().encode();

    // A cursor that crossed a process boundary picks up where it left off.
    let cursor = PaginationCursor::decode(&token).unwrap();
    let page = load_more(&*backend, Some(&cursor), 3).unwrap();
    assert_eq!(ids(&page.posts), vec!["p3", "p2", "p1"]);
    assert_eq!(page.cursor.unwrap().post_id().as_str(), "p1");
}

#[test]
fn test_pages_skip_deleted_cursor_post() {
    let backend = seeded_backend(10);
    let feed = open_feed(&backend, 5);
    let cursor = feed.cursor().unwrap();

    backend.delete_post(cursor.post_id()).unwrap();
    let page = load_more(&*backend, Some(&cursor), 5).unwrap();
    assert_eq!(ids(&page.posts), vec!["p5", "p4", "p3", "p2", "p1"]);
}

// --- Properties ---

proptest! {
    #[test]
    fn prop_initial_snapshot_is_bounded_and_ordered(total in 0usize..40, page_size in 1usize..12) {
        let backend = seeded_backend(total);
        let feed = open_feed(&backend, page_size);
        let posts = feed.posts();

        prop_assert_eq!(posts.len(), total.min(page_size));
        for pair in posts.windows(2) {
            prop_assert!(pair[0].created_at > pair[1].created_at);
        }
    }

    #[test]
    fn prop_short_snapshot_means_end_of_feed(total in 1usize..10, extra in 1usize..5) {
        let page_size = total + extra;
        let backend = seeded_backend(total);
        let feed = open_feed(&backend, page_size);

        for _ in 0..3 {
            prop_assert!(feed.load_more().unwrap().is_empty());
            prop_assert_eq!(feed.len(), total);
        }
    }

    #[test]
    fn prop_paging_covers_everything_once(total in 1usize..60, page_size in 1usize..9) {
        let backend = seeded_backend(total);
        let feed = open_feed(&backend, page_size);

        let mut expected_len = feed.len();
        loop {
            let page = feed.load_more().unwrap();
            if page.is_empty() {
                break;
            }
            prop_assert!(page.len() <= page_size);
            expected_len += page.len();
            prop_assert_eq!(feed.len(), expected_len);
        }

        let posts = feed.posts();
        prop_assert_eq!(posts.len(), total);
        let unique: HashSet<_> = posts.iter().map(|p| p.id.clone()).collect();
        prop_assert_eq!(unique.len(), total);
        for pair in posts.windows(2) {
            prop_assert!(pair[0].created_at > pair[1].created_at);
        }

        // One query per non-empty page plus the empty one that ends the feed.
        let remaining = total - total.min(page_size);
        prop_assert_eq!(
            backend.stats().page_queries as usize,
            remaining.div_ceil(page_size) + 1
        );
    }
}

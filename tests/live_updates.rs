//! Live snapshot tests: head replacement, merge with appended pages, and
//! the supplemented write paths that drive snapshots.

use feedsync::{
    BackendConfig, CursorPolicy, DocumentSource, Feed, FeedConfig, FeedSubscription, LikeSet,
    MemoryBackend, NewPost, Post, PostId, Timestamp, UserProfile,
};
use parking_lot::Mutex;
use std::io;
use std::sync::Arc;
use std::time::Duration;

fn seeded_backend(n: i64) -> Arc<MemoryBackend> {
    let backend = Arc::new(MemoryBackend::open(BackendConfig::default()).unwrap());
    backend
        .seed((1..=n).map(|i| {
            let id = format!("p{}", i);
            NewPost::new(format!("Post {}", i), "https://picsum.photos/600/400")
                .into_post(PostId::new(id), Timestamp(i))
        }))
        .unwrap();
    backend
}

fn ids(posts: &[Post]) -> Vec<String> {
    posts.iter().map(|p| p.id.to_string()).collect()
}

/// Collects formatted log output.
#[derive(Clone, Default)]
struct LogCapture(Arc<Mutex<Vec<u8>>>);

impl LogCapture {
    fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock()).into_owned()
    }
}

impl io::Write for LogCapture {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

// --- Head Replacement ---

#[test]
fn test_new_post_replaces_head_and_keeps_tail() {
    let backend = seeded_backend(12);
    let feed = Feed::open(backend.clone(), FeedConfig::default()).unwrap();
    feed.poll().unwrap();
    feed.load_more().unwrap();
    assert_eq!(feed.len(), 10);

    let created = backend
        .insert_post(NewPost::new("Hidden Waterfall", "https://picsum.photos/seed/2/600/400"))
        .unwrap();
    assert_eq!(feed.poll().unwrap(), 1);

    let posts = feed.posts();
    assert_eq!(posts[0].id, created.id);
    assert_eq!(
        ids(&posts[1..]),
        vec!["p12", "p11", "p10", "p9", "p7", "p6", "p5", "p4", "p3"]
    );
    feed.with_store(|store| {
        assert_eq!(store.head().len(), 5);
        assert_eq!(store.tail().len(), 5);
    });
}

#[test]
fn test_follow_snapshot_cursor_can_repeat_posts() {
    let backend = seeded_backend(12);
    let feed = Feed::open(backend.clone(), FeedConfig::default()).unwrap();
    feed.poll().unwrap();
    feed.load_more().unwrap();

    backend.insert_post(NewPost::new("fresh", "img")).unwrap();
    feed.poll().unwrap();

    // The cursor moved back to the end of the new head (p9), so the next
    // page overlaps what was already appended.
    assert_eq!(feed.cursor().unwrap().post_id().as_str(), "p9");
    let page = feed.load_more().unwrap();
    assert_eq!(ids(&page), vec!["p8", "p7", "p6", "p5", "p4"]);
}

#[test]
fn test_overlapping_page_is_logged() {
    let backend = seeded_backend(12);
    let feed = Feed::open(backend.clone(), FeedConfig::default()).unwrap();
    feed.poll().unwrap();
    feed.load_more().unwrap();
    backend.insert_post(NewPost::new("fresh", "img")).unwrap();
    feed.poll().unwrap();

    let logs = LogCapture::default();
    let writer = logs.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || writer.clone())
        .with_ansi(false)
        .with_max_level(tracing::Level::WARN)
        .finish();

    // p7..p4 are already in the appended tail.
    let page = tracing::subscriber::with_default(subscriber, || feed.load_more().unwrap());
    assert_eq!(page.len(), 5);

    let output = logs.contents();
    assert!(output.contains("appended page repeats posts already in the feed"));
    assert!(output.contains("duplicates=4"));
    assert_eq!(feed.len(), 15);
}

#[test]
fn test_preserve_tail_cursor_continues_after_tail() {
    let backend = seeded_backend(12);
    let feed = Feed::open(
        backend.clone(),
        FeedConfig {
            cursor_policy: CursorPolicy::PreserveTail,
            ..Default::default()
        },
    )
    .unwrap();
    feed.poll().unwrap();
    feed.load_more().unwrap();

    backend.insert_post(NewPost::new("fresh", "img")).unwrap();
    feed.poll().unwrap();

    assert_eq!(feed.cursor().unwrap().post_id().as_str(), "p3");
    assert_eq!(ids(&feed.load_more().unwrap()), vec!["p2", "p1"]);
}

#[test]
fn test_view_count_change_in_window_is_pushed() {
    let backend = seeded_backend(3);
    let feed = Feed::open(backend.clone(), FeedConfig::default()).unwrap();
    feed.poll().unwrap();

    backend.record_view(&PostId::from("p2")).unwrap();
    assert!(feed.wait_for_snapshot(Duration::from_millis(200)).unwrap());

    let viewed = feed.posts().into_iter().find(|p| p.id.as_str() == "p2").unwrap();
    assert_eq!(viewed.views, 1);
}

#[test]
fn test_wait_times_out_without_changes() {
    let backend = seeded_backend(3);
    let feed = Feed::open(backend.clone(), FeedConfig::default()).unwrap();
    feed.poll().unwrap();

    assert!(!feed.wait_for_snapshot(Duration::from_millis(20)).unwrap());
}

#[test]
fn test_delete_shrinks_head() {
    let backend = seeded_backend(3);
    let feed = Feed::open(backend.clone(), FeedConfig::default()).unwrap();
    feed.poll().unwrap();

    backend.delete_post(&PostId::from("p1")).unwrap();
    feed.poll().unwrap();
    assert_eq!(ids(&feed.posts()), vec!["p3", "p2"]);
    assert_eq!(feed.cursor().unwrap().post_id().as_str(), "p2");
}

#[test]
fn test_snapshots_arrive_in_write_order() {
    let backend = seeded_backend(0);
    let mut sub = FeedSubscription::start(backend.clone(), 5).unwrap();

    for i in 0..4 {
        backend
            .insert_post(NewPost::new(format!("post {}", i), "img"))
            .unwrap();
    }

    let sequences: Vec<u64> = (0..5)
        .map(|_| sub.try_next().unwrap().unwrap().sequence)
        .collect();
    assert_eq!(sequences, vec![1, 2, 3, 4, 5]);
    assert!(sub.try_next().unwrap().is_none());
}

#[test]
fn test_subscriptions_with_different_page_sizes() {
    let backend = seeded_backend(10);
    let small = Feed::open(
        backend.clone(),
        FeedConfig {
            page_size: 2,
            ..Default::default()
        },
    )
    .unwrap();
    let large = Feed::open(backend.clone(), FeedConfig::default()).unwrap();
    small.poll().unwrap();
    large.poll().unwrap();
    assert_eq!(small.len(), 2);
    assert_eq!(large.len(), 5);

    // Only the larger window contains p7.
    backend.record_view(&PostId::from("p7")).unwrap();
    assert_eq!(small.poll().unwrap(), 0);
    assert_eq!(large.poll().unwrap(), 1);
}

// --- Supplemented Features ---

#[test]
fn test_create_post_fills_defaults() {
    let backend = seeded_backend(0);
    let post = backend
        .insert_post(NewPost::new("Delicious Pasta Recipe", "https://picsum.photos/seed/3/600/400"))
        .unwrap();

    assert_eq!(post.username, "Anonymous");
    assert_eq!(post.location, "Unknown");
    assert_eq!(post.views, 0);
    assert_eq!(post.date, post.created_at.display_date());
    assert_eq!(post.id.as_str().len(), 20);
}

#[test]
fn test_profile_screen_flow() {
    let backend = seeded_backend(2);
    backend
        .put_user(
            "abhinav",
            UserProfile {
                name: "Chef101".into(),
                role: "Creator".into(),
                followers: 12,
                ..Default::default()
            },
        )
        .unwrap();

    let user = backend.get_user("abhinav").unwrap().unwrap();
    backend
        .insert_post(
            NewPost::new("Delicious Pasta Recipe", "img")
                .by(user.name.clone())
                .at("New Delhi, India")
                .in_category("Food"),
        )
        .unwrap();
    backend
        .insert_post(NewPost::new("Second dish", "img").by(user.name.clone()))
        .unwrap();

    let mine = backend.posts_by_username(&user.name).unwrap();
    assert_eq!(mine.len(), 2);
    assert_eq!(mine[0].title, "Second dish");
    assert_eq!(mine[1].location, "New Delhi, India");
    assert_eq!(mine[1].category, "Food");
}

#[test]
fn test_likes_and_share() {
    let backend = seeded_backend(3);
    let feed = Feed::open(backend.clone(), FeedConfig::default()).unwrap();
    feed.poll().unwrap();

    let mut likes = LikeSet::new();
    let posts = feed.posts();
    let first = &posts[0];
    assert!(likes.toggle(&first.id));
    assert!(likes.is_liked(&first.id));
    assert_eq!(first.share_message(), "Post 3\nhttps://picsum.photos/600/400");
}

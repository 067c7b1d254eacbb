use mcpchat::client_wrapper::Message;
use mcpchat::session_store::{SessionStore, DEFAULT_MAX_SESSIONS};

#[tokio::test]
async fn test_unknown_session_reads_as_empty_without_being_created() {
    let store = SessionStore::new();

    assert!(store.get("nobody").await.is_empty());
    assert!(!store.contains("nobody").await);
    assert!(store.is_empty().await);
    assert_eq!(store.capacity(), DEFAULT_MAX_SESSIONS);
}

#[tokio::test]
async fn test_commit_turn_appends_user_then_assistant() {
    let store = SessionStore::new();

    store.commit_turn("s1", "Look up X", "Found result-X").await;
    store.commit_turn("s1", "Thanks", "You're welcome").await;

    assert_eq!(
        store.get("s1").await,
        vec![
            Message::user("Look up X"),
            Message::assistant_text("Found result-X"),
            Message::user("Thanks"),
            Message::assistant_text("You're welcome"),
        ]
    );
    assert!(store.last_active("s1").await.is_some());
}

#[tokio::test]
async fn test_clear_empties_history_but_keeps_session() {
    let store = SessionStore::new();
    store.append("s1", Message::user("hello")).await;
    store.append("s1", Message::assistant_text("hi")).await;

    store.clear("s1").await;

    assert!(store.get("s1").await.is_empty());
    assert!(store.contains("s1").await);
}

#[tokio::test]
async fn test_clear_on_unknown_session_creates_it_empty() {
    let store = SessionStore::new();
    store.clear("fresh").await;

    assert!(store.contains("fresh").await);
    assert!(store.get("fresh").await.is_empty());
}

#[tokio::test]
async fn test_drop_session_removes_it() {
    let store = SessionStore::new();
    store.append("s1", Message::user("hello")).await;

    assert!(store.drop_session("s1").await);
    assert!(!store.contains("s1").await);
    assert!(store.get("s1").await.is_empty());
    assert!(!store.drop_session("s1").await);
}

#[tokio::test]
async fn test_replace_overwrites_history() {
    let store = SessionStore::new();
    store.append("s1", Message::user("old")).await;

    store
        .replace("s1", vec![Message::user("new"), Message::assistant_text("reply")])
        .await;

    assert_eq!(store.get("s1").await.len(), 2);
    assert_eq!(store.get("s1").await[0], Message::user("new"));
}

#[tokio::test]
async fn test_sessions_are_isolated() {
    let store = SessionStore::new();
    store.commit_turn("a", "from a", "to a").await;
    store.commit_turn("b", "from b", "to b").await;

    store.clear("a").await;

    assert!(store.get("a").await.is_empty());
    assert_eq!(store.get("b").await.len(), 2);
    assert_eq!(store.len().await, 2);
}

#[tokio::test]
async fn test_least_recently_active_session_is_evicted_at_capacity() {
    let store = SessionStore::with_capacity_limit(2);
    store.append("first", Message::user("1")).await;
    store.append("second", Message::user("2")).await;
    // Touch "first" so "second" becomes the stalest.
    store.append("first", Message::user("1b")).await;

    store.append("third", Message::user("3")).await;

    assert_eq!(store.len().await, 2);
    assert!(store.contains("first").await);
    assert!(store.contains("third").await);
    assert!(!store.contains("second").await);
}

#[tokio::test]
async fn test_writes_to_existing_sessions_never_evict() {
    let store = SessionStore::with_capacity_limit(2);
    store.append("a", Message::user("1")).await;
    store.append("b", Message::user("2")).await;

    for i in 0..10 {
        store.append("a", Message::user(format!("more {}", i))).await;
    }

    assert!(store.contains("b").await);
    assert_eq!(store.get("a").await.len(), 11);
}

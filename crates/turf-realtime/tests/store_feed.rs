use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::timeout;
use uuid::Uuid;

use turf_db::{DEFAULT_TOPIC_ID, Database};
use turf_realtime::{ChangeFeed, FeedFilter, ReactionToggle, Store};
use turf_types::events::{ChangeKind, Row, Table};
use turf_types::models::{NewMessage, NewNotification, NotificationKind};

fn setup() -> (Store, Uuid, Uuid) {
    let db = Arc::new(Database::open_in_memory().unwrap());
    let user = Uuid::new_v4();
    db.create_profile(&user.to_string(), "alice", "hash").unwrap();
    let store = Store::new(db, ChangeFeed::new());
    (store, DEFAULT_TOPIC_ID.parse().unwrap(), user)
}

fn new_message(topic_id: Uuid, author_id: Uuid, content: &str) -> NewMessage {
    NewMessage {
        topic_id,
        author_id,
        content: content.into(),
        parent_id: None,
        is_moderator: false,
    }
}

#[tokio::test]
async fn writes_are_echoed_on_the_feed() {
    let (store, topic, user) = setup();
    let mut rx = store.feed().subscribe(FeedFilter::topic(topic));

    let record = store.insert_message(new_message(topic, user, "hello")).await.unwrap();
    let event = timeout(Duration::from_secs(1), rx.recv()).await.unwrap().unwrap();
    assert_eq!(event.kind, ChangeKind::Insert);
    assert_eq!(event.row, Row::Messages(record.clone()));

    let changed = store.pin_message(topic, record.id).await.unwrap();
    assert_eq!(changed.len(), 1);
    let event = timeout(Duration::from_secs(1), rx.recv()).await.unwrap().unwrap();
    assert_eq!(event.kind, ChangeKind::Update);
    match event.row {
        Row::Messages(m) => assert!(m.is_pinned),
        other => panic!("unexpected row {:?}", other),
    }

    let toggled = store
        .toggle_reaction(record.id, user, "upvote".into())
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(toggled, ReactionToggle::Added(_)));
    let event = timeout(Duration::from_secs(1), rx.recv()).await.unwrap().unwrap();
    assert_eq!((event.table(), event.kind), (Table::Reactions, ChangeKind::Insert));
}

#[tokio::test]
async fn channel_callbacks_are_keyed_by_table_and_kind() {
    let (store, topic, user) = setup();
    let (tx, mut rx) = mpsc::unbounded_channel();

    let inserts = tx.clone();
    let notes = tx;
    let mut filter = FeedFilter::topic(topic);
    filter.recipient = Some(user);
    let channel = store
        .feed()
        .channel(filter)
        .on(Table::Messages, ChangeKind::Insert, move |event| {
            let _ = inserts.send(("message", event.clone()));
        })
        .on(Table::Notifications, ChangeKind::Insert, move |event| {
            let _ = notes.send(("notification", event.clone()));
        })
        .subscribe();

    let record = store.insert_message(new_message(topic, user, "hi")).await.unwrap();
    // Updates have no handler registered
    store.pin_message(topic, record.id).await.unwrap();
    store
        .create_notification(NewNotification {
            user_id: user,
            kind: NotificationKind::General,
            message: "welcome".into(),
        })
        .await
        .unwrap();

    let (label, _) = timeout(Duration::from_secs(1), rx.recv()).await.unwrap().unwrap();
    assert_eq!(label, "message");
    let (label, event) = timeout(Duration::from_secs(1), rx.recv()).await.unwrap().unwrap();
    assert_eq!(label, "notification");
    assert_eq!(event.recipient_id(), Some(user));

    drop(channel);
    store.insert_message(new_message(topic, user, "after")).await.unwrap();
    // Closing the channel dropped both senders held by the handlers
    assert!(timeout(Duration::from_secs(1), rx.recv()).await.unwrap().is_none());
}

#[tokio::test]
async fn deleting_a_root_publishes_replies_first() {
    let (store, topic, user) = setup();
    let root = store.insert_message(new_message(topic, user, "root")).await.unwrap();
    let reply = store
        .insert_message(NewMessage {
            parent_id: Some(root.id),
            ..new_message(topic, user, "reply")
        })
        .await
        .unwrap();

    let mut rx = store.feed().subscribe(FeedFilter::topic(topic));
    store.delete_message(root.id).await.unwrap();

    let first = rx.recv().await.unwrap();
    let second = rx.recv().await.unwrap();
    assert_eq!(first.kind, ChangeKind::Delete);
    assert_eq!(first.row, Row::Messages(reply));
    assert_eq!(second.row, Row::Messages(root));
}

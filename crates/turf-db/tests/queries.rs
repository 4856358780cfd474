use turf_db::{DEFAULT_TOPIC_ID, Database, MODERATOR_PROFILE_ID};
use turf_types::models::{MODERATOR_ID, NewMessage, NewNotification, NotificationKind};
use uuid::Uuid;

fn topic() -> Uuid {
    DEFAULT_TOPIC_ID.parse().unwrap()
}

fn user(db: &Database, name: &str) -> Uuid {
    let id = Uuid::new_v4();
    db.create_profile(&id.to_string(), name, "hash").unwrap();
    id
}

fn post(db: &Database, author: Uuid, content: &str, parent: Option<Uuid>) -> Uuid {
    db.insert_message(&NewMessage {
        topic_id: topic(),
        author_id: author,
        content: content.into(),
        parent_id: parent,
        is_moderator: false,
    })
    .unwrap()
    .id
}

#[test]
fn migrations_seed_topic_and_moderator() {
    let db = Database::open_in_memory().unwrap();

    let topics = db.active_topics().unwrap();
    assert_eq!(topics.len(), 1);
    assert_eq!(topics[0].id, topic());

    let wizard = db.get_profile_by_id(MODERATOR_PROFILE_ID).unwrap().unwrap();
    assert_eq!(wizard.username, "wizard_of_mods");
    assert_eq!(wizard.into_profile().id, MODERATOR_ID);
}

#[test]
fn duplicate_usernames_are_reported_not_raised() {
    let db = Database::open_in_memory().unwrap();
    assert!(db.create_profile(&Uuid::new_v4().to_string(), "alice", "hash").unwrap());
    assert!(!db.create_profile(&Uuid::new_v4().to_string(), "alice", "other").unwrap());
    assert!(!db.create_profile(&Uuid::new_v4().to_string(), "wizard_of_mods", "x").unwrap());
}

/// RFC3339 with exactly six fractional digits and a `Z` suffix.
fn is_micros_utc(ts: &str) -> bool {
    ts.len() == "2024-01-01T00:00:00.000000Z".len()
        && ts.ends_with('Z')
        && ts[20..26].chars().all(|c| c.is_ascii_digit())
}

#[test]
fn every_table_uses_the_same_timestamp_format() {
    let db = Database::open_in_memory().unwrap();
    let alice = user(&db, "alice");
    let message = post(&db, alice, "hi", None);
    db.toggle_reaction(&message.to_string(), &alice.to_string(), "upvote")
        .unwrap();
    db.insert_notification(&NewNotification {
        user_id: alice,
        kind: NotificationKind::General,
        message: "hello".into(),
    })
    .unwrap();

    for table in ["profiles", "topics", "messages", "reactions", "notifications"] {
        let stamps: Vec<String> = db
            .with_conn(|conn| {
                let mut stmt = conn.prepare(&format!("SELECT created_at FROM {}", table))?;
                let rows = stmt
                    .query_map([], |row| row.get(0))?
                    .collect::<Result<Vec<String>, _>>()?;
                Ok(rows)
            })
            .unwrap();
        assert!(!stamps.is_empty(), "{table} has no rows");
        for ts in stamps {
            assert!(is_micros_utc(&ts), "{table}.created_at = {ts}");
        }
    }
}

#[test]
fn load_thread_nests_replies_and_reactions_in_order() {
    let db = Database::open_in_memory().unwrap();
    let alice = user(&db, "alice");
    let bob = user(&db, "bob");

    let first = post(&db, alice, "first", None);
    let second = post(&db, bob, "second", None);
    let reply = post(&db, bob, "re: first", Some(first));
    db.toggle_reaction(&first.to_string(), &bob.to_string(), "upvote").unwrap();
    db.toggle_reaction(&reply.to_string(), &alice.to_string(), "🔥").unwrap();

    let thread = db.load_thread(DEFAULT_TOPIC_ID).unwrap();
    assert_eq!(thread.len(), 2);
    assert_eq!(thread[0].id, first);
    assert_eq!(thread[0].author_username, "alice");
    assert_eq!(thread[0].reactions.len(), 1);
    assert_eq!(thread[0].replies.len(), 1);
    assert_eq!(thread[0].replies[0].id, reply);
    assert_eq!(thread[0].replies[0].reactions[0].kind, "🔥");
    assert_eq!(thread[1].id, second);
    assert!(thread[1].replies.is_empty());
}

#[test]
fn pinning_keeps_one_pin_per_topic() {
    let db = Database::open_in_memory().unwrap();
    let alice = user(&db, "alice");
    let a = post(&db, alice, "a", None);
    let b = post(&db, alice, "b", None);

    let changed = db.pin_message(DEFAULT_TOPIC_ID, &a.to_string()).unwrap();
    assert_eq!(changed.len(), 1);
    assert!(changed[0].is_pinned);

    let changed = db.pin_message(DEFAULT_TOPIC_ID, &b.to_string()).unwrap();
    assert_eq!(changed.len(), 2);
    assert_eq!(changed[0].id, a);
    assert!(!changed[0].is_pinned);
    assert_eq!(changed[1].id, b);
    assert!(changed[1].is_pinned);

    // Pinning the already pinned message changes nothing
    assert!(db.pin_message(DEFAULT_TOPIC_ID, &b.to_string()).unwrap().is_empty());

    let changed = db.unpin_topic(DEFAULT_TOPIC_ID).unwrap();
    assert_eq!(changed.len(), 1);
    assert!(db.unpin_topic(DEFAULT_TOPIC_ID).unwrap().is_empty());
}

#[test]
fn toggle_reaction_adds_then_removes() {
    let db = Database::open_in_memory().unwrap();
    let alice = user(&db, "alice");
    let msg = post(&db, alice, "hello", None);

    let (added, reaction) = db
        .toggle_reaction(&msg.to_string(), &alice.to_string(), "upvote")
        .unwrap()
        .unwrap();
    assert!(added);
    assert_eq!(reaction.topic_id, topic());

    let (added, removed) = db
        .toggle_reaction(&msg.to_string(), &alice.to_string(), "upvote")
        .unwrap()
        .unwrap();
    assert!(!added);
    assert_eq!(removed.id, reaction.id);

    let missing = db
        .toggle_reaction(&Uuid::new_v4().to_string(), &alice.to_string(), "upvote")
        .unwrap();
    assert!(missing.is_none());
}

#[test]
fn delete_cascades_to_replies() {
    let db = Database::open_in_memory().unwrap();
    let alice = user(&db, "alice");
    let root = post(&db, alice, "root", None);
    let reply = post(&db, alice, "reply", Some(root));

    let removed = db.delete_message(&root.to_string()).unwrap();
    let ids: Vec<Uuid> = removed.iter().map(|m| m.id).collect();
    assert_eq!(ids, vec![reply, root]);
    assert!(db.get_message(&reply.to_string()).unwrap().is_none());
    assert!(db.load_thread(DEFAULT_TOPIC_ID).unwrap().is_empty());
}

#[test]
fn notifications_mark_read() {
    let db = Database::open_in_memory().unwrap();
    let alice = user(&db, "alice");
    let bob = user(&db, "bob");

    let first = db
        .insert_notification(&NewNotification {
            user_id: alice,
            kind: NotificationKind::Pin,
            message: "pinned".into(),
        })
        .unwrap();
    db.insert_notification(&NewNotification {
        user_id: alice,
        kind: NotificationKind::Wizard,
        message: "wizard".into(),
    })
    .unwrap();

    assert_eq!(db.list_notifications(&alice.to_string(), true, 50).unwrap().len(), 2);

    let (note, changed) = db
        .mark_notification_read(&alice.to_string(), &first.id.to_string())
        .unwrap()
        .unwrap();
    assert!(changed);
    assert!(note.is_read);

    // Someone else's notification is invisible
    assert!(db
        .mark_notification_read(&bob.to_string(), &first.id.to_string())
        .unwrap()
        .is_none());

    let flipped = db.mark_all_notifications_read(&alice.to_string()).unwrap();
    assert_eq!(flipped.len(), 1);
    assert_eq!(flipped[0].kind, NotificationKind::Wizard);
    assert!(db.list_notifications(&alice.to_string(), true, 50).unwrap().is_empty());
    assert_eq!(db.list_notifications(&alice.to_string(), false, 50).unwrap().len(), 2);
}

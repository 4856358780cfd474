use std::collections::HashMap;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, warn};
use uuid::Uuid;

use turf_types::models::{Message, MessageRecord, Reaction};

/// Upper bound on buffered replies per room.
pub const ORPHAN_CAPACITY: usize = 256;

/// What `MessageThread::insert` did with a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// Appended to the root list.
    Root,
    /// Appended to its parent's replies.
    Reply,
    /// Parent not loaded yet; held until it arrives or the TTL runs out.
    Buffered,
    /// Already present, ignored.
    Duplicate,
    /// Parent is itself a reply; threads are one level deep.
    Dropped,
}

struct Orphan {
    message: Message,
    received_at: Instant,
}

/// Root messages in creation order, each with one level of replies, plus
/// replies whose parent has not been seen yet.
pub struct MessageThread {
    roots: Vec<Message>,
    orphans: HashMap<Uuid, Vec<Orphan>>,
    orphan_count: usize,
    orphan_ttl: Duration,
    orphan_capacity: usize,
}

impl MessageThread {
    pub fn new(orphan_ttl: Duration) -> Self {
        Self::with_capacity(orphan_ttl, ORPHAN_CAPACITY)
    }

    pub fn with_capacity(orphan_ttl: Duration, orphan_capacity: usize) -> Self {
        Self {
            roots: Vec::new(),
            orphans: HashMap::new(),
            orphan_count: 0,
            orphan_ttl,
            orphan_capacity,
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.roots
    }

    pub fn orphan_count(&self) -> usize {
        self.orphan_count
    }

    /// Replace the whole list. Buffered replies whose parent is now present
    /// are attached.
    pub fn replace(&mut self, messages: Vec<Message>) {
        self.roots = messages;
        let waiting: Vec<Uuid> = self
            .orphans
            .keys()
            .filter(|parent_id| self.roots.iter().any(|m| m.id == **parent_id))
            .copied()
            .collect();
        for parent_id in waiting {
            self.adopt(parent_id);
        }
    }

    pub fn contains(&self, id: Uuid) -> bool {
        self.find(id).is_some()
    }

    pub fn find(&self, id: Uuid) -> Option<&Message> {
        self.roots.iter().find_map(|root| {
            if root.id == id {
                Some(root)
            } else {
                root.replies.iter().find(|r| r.id == id)
            }
        })
    }

    fn find_mut(&mut self, id: Uuid) -> Option<&mut Message> {
        for root in self.roots.iter_mut() {
            if root.id == id {
                return Some(root);
            }
            if let Some(reply) = root.replies.iter_mut().find(|r| r.id == id) {
                return Some(reply);
            }
        }
        self.orphans
            .values_mut()
            .flat_map(|list| list.iter_mut())
            .map(|o| &mut o.message)
            .find(|m| m.id == id)
    }

    fn is_buffered(&self, id: Uuid) -> bool {
        self.orphans
            .values()
            .any(|list| list.iter().any(|o| o.message.id == id))
    }

    pub fn insert(&mut self, record: MessageRecord, now: Instant) -> InsertOutcome {
        if self.contains(record.id) || self.is_buffered(record.id) {
            return InsertOutcome::Duplicate;
        }

        let Some(parent_id) = record.parent_id else {
            let id = record.id;
            self.roots.push(Message::from(record));
            self.adopt(id);
            return InsertOutcome::Root;
        };

        if let Some(parent) = self.roots.iter_mut().find(|m| m.id == parent_id) {
            parent.replies.push(Message::from(record));
            return InsertOutcome::Reply;
        }

        if self.contains(parent_id) {
            warn!(
                "Dropping message {}: parent {} is itself a reply",
                record.id, parent_id
            );
            return InsertOutcome::Dropped;
        }

        if self.orphan_count >= self.orphan_capacity {
            self.evict_oldest_orphan();
        }
        debug!("Buffering reply {} until parent {} arrives", record.id, parent_id);
        self.orphans.entry(parent_id).or_default().push(Orphan {
            message: Message::from(record),
            received_at: now,
        });
        self.orphan_count += 1;
        InsertOutcome::Buffered
    }

    /// Merge a fresher row into the loaded message. Returns false if unknown.
    pub fn update(&mut self, record: &MessageRecord) -> bool {
        match self.find_mut(record.id) {
            Some(message) => {
                message.merge(record);
                true
            }
            None => false,
        }
    }

    /// Remove a root (with its replies) or a reply.
    pub fn remove(&mut self, id: Uuid) -> bool {
        if let Some(pos) = self.roots.iter().position(|m| m.id == id) {
            self.roots.remove(pos);
            if let Some(list) = self.orphans.remove(&id) {
                self.orphan_count -= list.len();
            }
            return true;
        }
        for root in self.roots.iter_mut() {
            if let Some(pos) = root.replies.iter().position(|r| r.id == id) {
                root.replies.remove(pos);
                return true;
            }
        }
        false
    }

    pub fn add_reaction(&mut self, reaction: Reaction) -> bool {
        let Some(message) = self.find_mut(reaction.message_id) else {
            debug!(
                "Reaction {} for unknown message {}, ignoring",
                reaction.id, reaction.message_id
            );
            return false;
        };
        if message.reactions.iter().any(|r| r.id == reaction.id) {
            return false;
        }
        message.reactions.push(reaction);
        true
    }

    pub fn remove_reaction(&mut self, reaction: &Reaction) -> bool {
        let Some(message) = self.find_mut(reaction.message_id) else {
            return false;
        };
        let before = message.reactions.len();
        message.reactions.retain(|r| r.id != reaction.id);
        message.reactions.len() != before
    }

    /// Drop buffered replies older than the TTL. Returns how many were dropped.
    pub fn expire_orphans(&mut self, now: Instant) -> usize {
        let ttl = self.orphan_ttl;
        let mut dropped = 0;
        self.orphans.retain(|parent_id, list| {
            list.retain(|o| {
                let keep = now.saturating_duration_since(o.received_at) < ttl;
                if !keep {
                    warn!(
                        "Dropping reply {}: parent {} never arrived within {:?}",
                        o.message.id, parent_id, ttl
                    );
                    dropped += 1;
                }
                keep
            });
            !list.is_empty()
        });
        self.orphan_count -= dropped;
        dropped
    }

    fn adopt(&mut self, parent_id: Uuid) {
        let Some(list) = self.orphans.remove(&parent_id) else {
            return;
        };
        self.orphan_count -= list.len();
        let Some(parent) = self.roots.iter_mut().find(|m| m.id == parent_id) else {
            return;
        };
        for orphan in list {
            if !parent.replies.iter().any(|r| r.id == orphan.message.id) {
                debug!("Attaching buffered reply {} to {}", orphan.message.id, parent_id);
                parent.replies.push(orphan.message);
            }
        }
        parent.replies.sort_by_key(|r| r.created_at);
    }

    fn evict_oldest_orphan(&mut self) {
        let oldest = self
            .orphans
            .iter()
            .flat_map(|(parent_id, list)| {
                list.iter()
                    .enumerate()
                    .map(move |(idx, o)| (*parent_id, idx, o.received_at))
            })
            .min_by_key(|(_, _, at)| *at);

        if let Some((parent_id, idx, _)) = oldest {
            if let Some(list) = self.orphans.get_mut(&parent_id) {
                let evicted = list.remove(idx);
                warn!(
                    "Reply buffer full, dropping reply {} waiting on {}",
                    evicted.message.id, parent_id
                );
                if list.is_empty() {
                    self.orphans.remove(&parent_id);
                }
                self.orphan_count -= 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn record(parent_id: Option<Uuid>) -> MessageRecord {
        let now = Utc::now();
        MessageRecord {
            id: Uuid::new_v4(),
            topic_id: Uuid::nil(),
            author_id: Uuid::new_v4(),
            author_username: "alice".into(),
            content: "hi".into(),
            parent_id,
            is_pinned: false,
            is_moderator: false,
            created_at: now,
            updated_at: now,
        }
    }

    fn reaction(message_id: Uuid) -> Reaction {
        Reaction {
            id: Uuid::new_v4(),
            message_id,
            topic_id: Uuid::nil(),
            user_id: Uuid::new_v4(),
            kind: "upvote".into(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn roots_and_replies_are_placed() {
        let now = Instant::now();
        let mut thread = MessageThread::new(Duration::from_secs(60));
        let root = record(None);
        let reply = record(Some(root.id));

        assert_eq!(thread.insert(root.clone(), now), InsertOutcome::Root);
        assert_eq!(thread.insert(reply.clone(), now), InsertOutcome::Reply);
        assert_eq!(thread.insert(reply.clone(), now), InsertOutcome::Duplicate);
        assert_eq!(thread.messages().len(), 1);
        assert_eq!(thread.messages()[0].replies[0].id, reply.id);

        // Reply to a reply is not threaded
        assert_eq!(thread.insert(record(Some(reply.id)), now), InsertOutcome::Dropped);
    }

    #[test]
    fn early_reply_is_attached_when_parent_arrives() {
        let now = Instant::now();
        let mut thread = MessageThread::new(Duration::from_secs(60));
        let root = record(None);
        let reply = record(Some(root.id));

        assert_eq!(thread.insert(reply.clone(), now), InsertOutcome::Buffered);
        assert!(thread.messages().is_empty());
        assert_eq!(thread.orphan_count(), 1);

        assert_eq!(thread.insert(root, now), InsertOutcome::Root);
        assert_eq!(thread.orphan_count(), 0);
        assert_eq!(thread.messages()[0].replies[0].id, reply.id);
    }

    #[test]
    fn orphans_expire_after_ttl() {
        let start = Instant::now();
        let mut thread = MessageThread::new(Duration::from_secs(60));
        thread.insert(record(Some(Uuid::new_v4())), start);

        assert_eq!(thread.expire_orphans(start + Duration::from_secs(59)), 0);
        assert_eq!(thread.expire_orphans(start + Duration::from_secs(60)), 1);
        assert_eq!(thread.orphan_count(), 0);
    }

    #[test]
    fn orphan_buffer_is_bounded() {
        let start = Instant::now();
        let mut thread = MessageThread::with_capacity(Duration::from_secs(60), 2);
        let first = record(Some(Uuid::new_v4()));
        thread.insert(first.clone(), start);
        thread.insert(record(Some(Uuid::new_v4())), start + Duration::from_secs(1));
        thread.insert(record(Some(Uuid::new_v4())), start + Duration::from_secs(2));

        assert_eq!(thread.orphan_count(), 2);
        assert!(!thread.is_buffered(first.id));
    }

    #[test]
    fn replace_attaches_waiting_replies() {
        let now = Instant::now();
        let mut thread = MessageThread::new(Duration::from_secs(60));
        let root = record(None);
        thread.insert(record(Some(root.id)), now);

        thread.replace(vec![Message::from(root)]);
        assert_eq!(thread.orphan_count(), 0);
        assert_eq!(thread.messages()[0].replies.len(), 1);
    }

    #[test]
    fn updates_and_reactions_reach_replies() {
        let now = Instant::now();
        let mut thread = MessageThread::new(Duration::from_secs(60));
        let root = record(None);
        let mut reply = record(Some(root.id));
        thread.insert(root.clone(), now);
        thread.insert(reply.clone(), now);

        reply.content = "edited".into();
        assert!(thread.update(&reply));
        assert_eq!(thread.find(reply.id).unwrap().content, "edited");
        assert!(!thread.update(&record(None)));

        let r = reaction(reply.id);
        assert!(thread.add_reaction(r.clone()));
        assert!(!thread.add_reaction(r.clone()));
        assert_eq!(thread.find(reply.id).unwrap().reactions.len(), 1);
        assert!(thread.remove_reaction(&r));
        assert!(!thread.add_reaction(reaction(Uuid::new_v4())));

        assert!(thread.remove(reply.id));
        assert!(thread.messages()[0].replies.is_empty());
        assert!(thread.remove(root.id));
        assert!(!thread.remove(root.id));
    }
}

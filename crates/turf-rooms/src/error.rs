use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum RoomError {
    #[error("message is longer than {max} characters")]
    TooLong { max: usize },

    #[error("parent message {0} not found")]
    ParentNotFound(Uuid),

    #[error("parent message {0} belongs to another topic")]
    ParentInOtherTopic(Uuid),

    #[error("cannot reply to reply {0}; threads are one level deep")]
    NestedReply(Uuid),

    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

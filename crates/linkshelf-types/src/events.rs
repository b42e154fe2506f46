use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{InboxMessage, Reaction, ReactionTarget};

/// A realtime channel, keyed by table and filter. Serialized as
/// `inbox:<recipient_id>` or `reactions:<kind>:<target_id>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum Topic {
    Inbox { recipient_id: Uuid },
    Reactions { target: ReactionTarget },
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inbox { recipient_id } => write!(f, "inbox:{}", recipient_id),
            Self::Reactions { target } => write!(f, "reactions:{}", target),
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("malformed topic '{0}'")]
pub struct TopicParseError(String);

impl FromStr for Topic {
    type Err = TopicParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || TopicParseError(s.to_string());
        let mut parts = s.split(':');
        match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some("inbox"), Some(id), None, None) => Ok(Self::Inbox {
                recipient_id: id.parse().map_err(|_| err())?,
            }),
            (Some("reactions"), Some(kind), Some(id), None) => {
                let id = id.parse().map_err(|_| err())?;
                let target = ReactionTarget::from_parts(kind, id).map_err(|_| err())?;
                Ok(Self::Reactions { target })
            }
            _ => Err(err()),
        }
    }
}

impl From<Topic> for String {
    fn from(t: Topic) -> Self {
        t.to_string()
    }
}

impl TryFrom<String> for Topic {
    type Error = TopicParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "table", content = "row", rename_all = "snake_case")]
pub enum ChangeRecord {
    InboxMessage(InboxMessage),
    Reaction(Reaction),
}

/// One row-level change. Receivers treat it as an invalidation signal and
/// go back to the store for authoritative state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub topic: Topic,
    pub kind: ChangeKind,
    pub record: ChangeRecord,
}

/// Events sent over the realtime gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayEvent {
    /// Server confirms successful authentication
    Ready { user_id: Uuid },

    /// A subscribed table changed
    Change(ChangeEvent),

    /// A subscription request was refused
    SubscribeDenied { topic: Topic },
}

/// Commands sent FROM client TO server over WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayCommand {
    Subscribe { topic: Topic },
    Unsubscribe { topic: Topic },
}

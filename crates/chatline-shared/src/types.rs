use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ChatlineError, Result};

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn is_empty(&self) -> bool {
                self.0.is_empty()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }
    };
}

string_id!(
    /// Server-assigned chatroom identifier.
    ChatroomId
);

string_id!(
    /// Server-assigned conversation identifier.
    ConversationId
);

string_id!(
    /// Locally generated placeholder for a conversation awaiting confirmation.
    TemporaryId
);

string_id!(
    /// Member (user) identifier.
    MemberId
);

impl TemporaryId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl ConversationId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// Identity of a conversation across the optimistic-send window.
///
/// A conversation starts life either as `Temporary` (sent from this device,
/// not acknowledged yet) or `Confirmed` (fetched from the store). When the
/// server acknowledges a temporary send the two ids coexist as `Both`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Identity {
    Temporary(TemporaryId),
    Confirmed(ConversationId),
    Both {
        temporary: TemporaryId,
        server: ConversationId,
    },
}

impl Identity {
    /// Build an identity from optional parts, ignoring empty strings.
    pub fn from_parts(
        temporary: Option<TemporaryId>,
        server: Option<ConversationId>,
    ) -> Result<Self> {
        let temporary = temporary.filter(|t| !t.is_empty());
        let server = server.filter(|s| !s.is_empty());
        match (temporary, server) {
            (Some(temporary), Some(server)) => Ok(Self::Both { temporary, server }),
            (Some(temporary), None) => Ok(Self::Temporary(temporary)),
            (None, Some(server)) => Ok(Self::Confirmed(server)),
            (None, None) => Err(ChatlineError::InvalidIdentity),
        }
    }

    pub fn server_id(&self) -> Option<&ConversationId> {
        match self {
            Self::Confirmed(server) | Self::Both { server, .. } => Some(server),
            Self::Temporary(_) => None,
        }
    }

    pub fn temporary_id(&self) -> Option<&TemporaryId> {
        match self {
            Self::Temporary(temporary) | Self::Both { temporary, .. } => Some(temporary),
            Self::Confirmed(_) => None,
        }
    }

    pub fn is_confirmed(&self) -> bool {
        self.server_id().is_some()
    }

    /// Whether two identities refer to the same conversation.
    ///
    /// Server ids are conclusive when both sides have one; temporary ids are
    /// only consulted when at least one side is still unconfirmed. Narrower
    /// than "server ids equal or temporary ids equal" on purpose: a reused
    /// temporary id never merges two confirmed conversations.
    pub fn matches(&self, other: &Identity) -> bool {
        match (self.server_id(), other.server_id()) {
            (Some(a), Some(b)) => a == b,
            _ => match (self.temporary_id(), other.temporary_id()) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            },
        }
    }

    /// Attach the server id handed out on acknowledgment.
    pub fn confirm(self, server: ConversationId) -> Self {
        match self {
            Self::Temporary(temporary) | Self::Both { temporary, .. } => {
                Self::Both { temporary, server }
            }
            Self::Confirmed(_) => Self::Confirmed(server),
        }
    }

    /// Key used by list cells: the server id once known, else the temporary id.
    pub fn display_key(&self) -> &str {
        match self {
            Self::Confirmed(server) | Self::Both { server, .. } => server.as_str(),
            Self::Temporary(temporary) => temporary.as_str(),
        }
    }
}

impl std::fmt::Display for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Temporary(t) => write!(f, "temp:{t}"),
            Self::Confirmed(s) => write!(f, "{s}"),
            Self::Both { temporary, server } => write!(f, "{server} (temp:{temporary})"),
        }
    }
}

/// Direction of a paginated fetch relative to the visible list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScrollDirection {
    Up,
    Down,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_parts_rejects_empty() {
        assert_eq!(
            Identity::from_parts(Some("".into()), None),
            Err(ChatlineError::InvalidIdentity)
        );
        assert_eq!(
            Identity::from_parts(Some("t1".into()), Some("".into())).unwrap(),
            Identity::Temporary("t1".into())
        );
    }

    #[test]
    fn temporary_matches_its_confirmation() {
        let temp = Identity::Temporary("t1".into());
        let both = temp.clone().confirm("s1".into());
        assert!(temp.matches(&both));
        assert!(both.matches(&temp));
        assert!(both.matches(&Identity::Confirmed("s1".into())));
    }

    #[test]
    fn server_ids_are_conclusive() {
        let a = Identity::Both {
            temporary: "t1".into(),
            server: "s1".into(),
        };
        let b = Identity::Both {
            temporary: "t1".into(),
            server: "s2".into(),
        };
        assert!(!a.matches(&b));
        assert!(!Identity::Confirmed("s1".into()).matches(&Identity::Temporary("s1".into())));
    }

    #[test]
    fn display_key_prefers_server_id() {
        let both = Identity::Both {
            temporary: "t1".into(),
            server: "s1".into(),
        };
        assert_eq!(both.display_key(), "s1");
        assert_eq!(Identity::Temporary("t1".into()).display_key(), "t1");
    }
}

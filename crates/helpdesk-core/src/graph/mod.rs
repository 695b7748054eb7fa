//! Graph mirror of users, tickets and messages
//!
//! The graph answers "who" questions: which customer created a ticket, which
//! tickets an agent holds, which messages mention a phrase. Its ticket nodes
//! also cache status and priority, which the update workflow mirrors last.

#[cfg(feature = "sqlite")]
mod sqlite;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteGraphStore;

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::ticket::{ParseVocabularyError, Ticket, TicketId, TicketPriority, TicketStatus, UserId};

/// Store-assigned node reference, shown as `0x…`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeUid(pub u64);

impl std::fmt::Display for NodeUid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

impl FromStr for NodeUid {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s
            .strip_prefix("0x")
            .ok_or_else(|| StoreError::Validation(format!("node uid {:?} lacks 0x prefix", s)))?;
        u64::from_str_radix(digits, 16)
            .map(NodeUid)
            .map_err(|e| StoreError::Validation(format!("node uid {:?}: {}", s, e)))
    }
}

/// Role of a user node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Customer,
    Agent,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Customer => "customer",
            Role::Agent => "agent",
            Role::Admin => "admin",
        }
    }
}

impl FromStr for Role {
    type Err = ParseVocabularyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "customer" => Ok(Role::Customer),
            "agent" => Ok(Role::Agent),
            "admin" => Ok(Role::Admin),
            other => Err(ParseVocabularyError {
                field: "role",
                value: other.to_string(),
            }),
        }
    }
}

/// A user as stored in the graph and in `users_by_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphUser {
    pub user_id: UserId,
    pub username: String,
    pub email: String,
    pub role: Role,
}

impl GraphUser {
    pub fn new(user_id: impl Into<UserId>, username: impl Into<String>, role: Role) -> Self {
        let username = username.into();
        Self {
            user_id: user_id.into(),
            email: format!("{}@example.com", username.to_lowercase().replace(' ', ".")),
            username,
            role,
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = email.into();
        self
    }
}

/// The far end of a user edge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRef {
    pub uid: NodeUid,
    pub user_id: UserId,
}

/// A ticket node with its outgoing user edges resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TicketNode {
    pub uid: NodeUid,
    pub ticket_id: TicketId,
    pub status: TicketStatus,
    pub priority: TicketPriority,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub assigned_to: Option<UserRef>,
    pub created_by: Option<UserRef>,
}

/// A message node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageNode {
    pub uid: NodeUid,
    pub message_id: String,
    pub ticket_id: TicketId,
    pub sender: Option<UserRef>,
    pub message_text: String,
    pub timestamp: DateTime<Utc>,
}

/// Mirrored attributes of a ticket node. Unset fields are left alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TicketAttributes {
    pub status: Option<TicketStatus>,
    pub priority: Option<TicketPriority>,
    pub updated_at: DateTime<Utc>,
}

/// Which user edge of a ticket to follow in reverse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserEdge {
    AssignedTo,
    CreatedBy,
}

/// The trait that graph backends implement.
pub trait GraphStore: Send + Sync {
    /// Create node tables and indexes if missing.
    fn apply_schema(&self) -> Result<(), StoreError>;

    /// Insert or refresh a user node, keyed by `user_id`.
    fn upsert_user(&self, user: &GraphUser) -> Result<NodeUid, StoreError>;

    fn find_user(&self, user_id: &str) -> Result<Option<(NodeUid, GraphUser)>, StoreError>;

    /// Insert or refresh a ticket node keyed by its business id.
    ///
    /// `created_by` and `assigned_to` edges point at existing user nodes for
    /// `ticket.customer_id` and `ticket.agent_id`; unknown users leave the
    /// edge unset.
    fn upsert_ticket(&self, ticket: &Ticket) -> Result<NodeUid, StoreError>;

    /// Look a ticket up by business id.
    fn find_ticket(&self, ticket_id: &str) -> Result<Option<TicketNode>, StoreError>;

    /// Overwrite cached attributes of a ticket node. `NotFound` if absent.
    fn set_ticket_attributes(&self, uid: NodeUid, attrs: &TicketAttributes) -> Result<(), StoreError>;

    /// Create a message node linked to its ticket and sender.
    fn add_message(
        &self,
        ticket_id: &str,
        sender_id: &str,
        text: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<MessageNode, StoreError>;

    /// Messages whose text contains every term of `query`, newest first.
    fn search_messages(&self, query: &str) -> Result<Vec<MessageNode>, StoreError>;

    /// Tickets reaching `user_id` over `edge`, oldest first.
    fn tickets_for_user(&self, user_id: &str, edge: UserEdge) -> Result<Vec<TicketNode>, StoreError>;
}

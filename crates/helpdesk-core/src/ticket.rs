//! Ticket documents and the closed vocabularies shared by every store

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Business identifier of a ticket (the document store's `_uuid`).
pub type TicketId = String;

/// Business identifier of a user (customer or agent).
pub type UserId = String;

/// Lifecycle status of a ticket.
///
/// Any value may replace any other; `Resolved` tickets can be reopened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    Open,
    InProgress,
    Resolved,
}

impl TicketStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TicketStatus::Open => "open",
            TicketStatus::InProgress => "in_progress",
            TicketStatus::Resolved => "resolved",
        }
    }

    pub fn all() -> [TicketStatus; 3] {
        [
            TicketStatus::Open,
            TicketStatus::InProgress,
            TicketStatus::Resolved,
        ]
    }
}

impl Default for TicketStatus {
    fn default() -> Self {
        TicketStatus::Open
    }
}

impl std::fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TicketStatus {
    type Err = ParseVocabularyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(TicketStatus::Open),
            "in_progress" => Ok(TicketStatus::InProgress),
            "resolved" => Ok(TicketStatus::Resolved),
            other => Err(ParseVocabularyError {
                field: "status",
                value: other.to_string(),
            }),
        }
    }
}

/// Priority of a ticket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketPriority {
    High,
    Medium,
    Low,
}

impl TicketPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            TicketPriority::High => "high",
            TicketPriority::Medium => "medium",
            TicketPriority::Low => "low",
        }
    }

    pub fn all() -> [TicketPriority; 3] {
        [
            TicketPriority::High,
            TicketPriority::Medium,
            TicketPriority::Low,
        ]
    }
}

impl std::fmt::Display for TicketPriority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TicketPriority {
    type Err = ParseVocabularyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "high" => Ok(TicketPriority::High),
            "medium" => Ok(TicketPriority::Medium),
            "low" => Ok(TicketPriority::Low),
            other => Err(ParseVocabularyError {
                field: "priority",
                value: other.to_string(),
            }),
        }
    }
}

/// A value outside one of the closed vocabularies.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid {field}: {value:?}")]
pub struct ParseVocabularyError {
    pub field: &'static str,
    pub value: String,
}

/// A message posted on a ticket, embedded in the ticket document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TicketMessage {
    pub sender_id: UserId,
    pub timestamp: DateTime<Utc>,
    pub message_text: String,
}

/// Customer feedback left after resolution.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Feedback {
    pub rating: Option<i32>,
    pub comments: Option<String>,
    pub submitted_timestamp: Option<DateTime<Utc>>,
}

/// The canonical ticket document.
///
/// The document store owns this record; the wide-column projections and the
/// graph node are derived copies of its status and priority.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticket {
    #[serde(rename = "_uuid", alias = "uuid")]
    pub uuid: TicketId,
    pub customer_id: UserId,
    #[serde(default)]
    pub agent_id: Option<UserId>,
    pub description: String,
    pub status: TicketStatus,
    pub priority: TicketPriority,
    pub created_timestamp: DateTime<Utc>,
    pub updated_timestamp: DateTime<Utc>,
    #[serde(default)]
    pub category: String,
    pub channel: String,
    #[serde(default)]
    pub messages: Vec<TicketMessage>,
    #[serde(default)]
    pub feedback: Feedback,
    #[serde(default)]
    pub resolution_steps: Vec<String>,
}

impl Ticket {
    /// Create a new open ticket stamped with the current time.
    pub fn new(
        customer_id: impl Into<UserId>,
        description: impl Into<String>,
        priority: TicketPriority,
        channel: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            uuid: Uuid::new_v4().to_string(),
            customer_id: customer_id.into(),
            agent_id: None,
            description: description.into(),
            status: TicketStatus::Open,
            priority,
            created_timestamp: now,
            updated_timestamp: now,
            category: String::new(),
            channel: channel.into(),
            messages: Vec::new(),
            feedback: Feedback::default(),
            resolution_steps: Vec::new(),
        }
    }

    pub fn with_agent(mut self, agent_id: impl Into<UserId>) -> Self {
        self.agent_id = Some(agent_id.into());
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    /// Apply a partial update in place and bump `updated_timestamp`.
    pub fn apply(&mut self, update: &TicketUpdate, at: DateTime<Utc>) {
        if let Some(status) = update.status {
            self.status = status;
        }
        if let Some(priority) = update.priority {
            self.priority = priority;
        }
        self.updated_timestamp = at;
    }
}

/// Partial update of a ticket's status and/or priority.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<TicketStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<TicketPriority>,
}

impl TicketUpdate {
    pub fn status(status: TicketStatus) -> Self {
        Self {
            status: Some(status),
            priority: None,
        }
    }

    pub fn priority(priority: TicketPriority) -> Self {
        Self {
            status: None,
            priority: Some(priority),
        }
    }

    pub fn with_status(mut self, status: TicketStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_priority(mut self, priority: TicketPriority) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.status.is_none() && self.priority.is_none()
    }

    /// The changed fields as `(activity_type, new_value)` pairs, status first.
    pub fn changes(&self) -> Vec<(ChangeKind, &'static str)> {
        let mut changes = Vec::new();
        if let Some(status) = self.status {
            changes.push((ChangeKind::Status, status.as_str()));
        }
        if let Some(priority) = self.priority {
            changes.push((ChangeKind::Priority, priority.as_str()));
        }
        changes
    }
}

/// Which ticket field an activity record describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Status,
    Priority,
}

impl ChangeKind {
    /// Value written to `activity_by_ticket.activity_type`.
    pub fn activity_type(&self) -> &'static str {
        match self {
            ChangeKind::Status => "status_updated",
            ChangeKind::Priority => "priority_updated",
        }
    }
}

/// Append-only audit entry, one per changed field per update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityRecord {
    pub ticket_id: TicketId,
    pub activity_timestamp: DateTime<Utc>,
    pub activity_id: Uuid,
    pub activity_type: String,
    pub status: String,
    pub agent_id: UserId,
}

impl ActivityRecord {
    pub fn new(
        ticket_id: &str,
        agent_id: &str,
        kind: ChangeKind,
        new_value: &str,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            ticket_id: ticket_id.to_string(),
            activity_timestamp: at,
            activity_id: Uuid::new_v4(),
            activity_type: kind.activity_type().to_string(),
            status: new_value.to_string(),
            agent_id: agent_id.to_string(),
        }
    }
}

/// Filter for document store ticket queries. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketFilter {
    pub customer_id: Option<UserId>,
    pub agent_id: Option<UserId>,
    pub status: Option<TicketStatus>,
    pub priority: Option<TicketPriority>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_wire_names() {
        assert_eq!(
            serde_json::to_string(&TicketStatus::InProgress).unwrap(),
            "\"in_progress\""
        );
        assert_eq!("resolved".parse::<TicketStatus>().unwrap(), TicketStatus::Resolved);
        assert!("closed".parse::<TicketStatus>().is_err());
    }

    #[test]
    fn priority_rejects_unknown_values() {
        let err = "urgent".parse::<TicketPriority>().unwrap_err();
        assert_eq!(err.field, "priority");
        assert!(err.to_string().contains("urgent"));
    }

    #[test]
    fn ticket_uses_underscore_uuid_on_the_wire() {
        let ticket = Ticket::new("cust-1", "Cannot log in", TicketPriority::High, "chat");
        let json = serde_json::to_value(&ticket).unwrap();
        assert_eq!(json["_uuid"], ticket.uuid.as_str());
        assert!(json.get("uuid").is_none());

        let back: Ticket = serde_json::from_value(json).unwrap();
        assert_eq!(back, ticket);
    }

    #[test]
    fn ticket_accepts_plain_uuid_alias() {
        let json = serde_json::json!({
            "uuid": "T1",
            "customer_id": "C1",
            "description": "printer on fire",
            "status": "open",
            "priority": "medium",
            "created_timestamp": "2024-11-13T10:00:00Z",
            "updated_timestamp": "2024-11-13T10:15:00Z",
            "channel": "phone"
        });
        let ticket: Ticket = serde_json::from_value(json).unwrap();
        assert_eq!(ticket.uuid, "T1");
        assert!(ticket.messages.is_empty());
        assert_eq!(ticket.feedback, Feedback::default());
    }

    #[test]
    fn update_serializes_only_present_fields() {
        let update = TicketUpdate::priority(TicketPriority::High);
        assert_eq!(
            serde_json::to_string(&update).unwrap(),
            r#"{"priority":"high"}"#
        );
        assert!(TicketUpdate::default().is_empty());
    }

    #[test]
    fn apply_changes_only_requested_fields() {
        let mut ticket = Ticket::new("C1", "slow vpn", TicketPriority::Medium, "email");
        let at = Utc::now();
        ticket.apply(&TicketUpdate::status(TicketStatus::Resolved), at);
        assert_eq!(ticket.status, TicketStatus::Resolved);
        assert_eq!(ticket.priority, TicketPriority::Medium);
        assert_eq!(ticket.updated_timestamp, at);
    }

    #[test]
    fn changes_list_status_before_priority() {
        let update = TicketUpdate::priority(TicketPriority::Low).with_status(TicketStatus::Open);
        let changes = update.changes();
        assert_eq!(
            changes,
            vec![(ChangeKind::Status, "open"), (ChangeKind::Priority, "low")]
        );
        assert_eq!(ChangeKind::Priority.activity_type(), "priority_updated");
    }
}

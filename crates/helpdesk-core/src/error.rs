//! Error types for helpdesk-core

use thiserror::Error;

use crate::config::ConfigError;
use crate::projection::Table;
use crate::ticket::TicketId;

/// Result type alias for helpdesk operations
pub type Result<T> = std::result::Result<T, HelpdeskError>;

/// Top-level error for binaries and callers that do not care which layer failed
#[derive(Error, Debug)]
pub enum HelpdeskError {
    /// A store backend failed outside of an update workflow
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// The cross-store update workflow failed
    #[error("Update error: {0}")]
    Update(#[from] UpdateError),

    /// A secondary mirror write failed
    #[error("Mirror error: {0}")]
    Mirror(#[from] MirrorError),

    /// Configuration could not be loaded or is invalid
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

/// Errors raised by a single store backend
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// A statement or record was rejected before reaching the backend
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Storage error: {0}")]
    Storage(String),

    /// The backend could not be reached or answered unexpectedly
    #[error("Transport error: {0}")]
    Transport(String),
}

#[cfg(feature = "sqlite")]
impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        StoreError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Storage(format!("serialization: {}", err))
    }
}

/// Where a ticket copy was expected but absent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Missing {
    /// The canonical document
    Ticket,
    /// One projection table row
    ProjectionRow(Table),
}

impl std::fmt::Display for Missing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Missing::Ticket => write!(f, "document store"),
            Missing::ProjectionRow(table) => write!(f, "table {}", table),
        }
    }
}

/// Failures of the cross-store update workflow.
///
/// `InvalidUpdate`, `NotFound`, `Resolution` and `Store` are raised before any
/// store is written. `PartialUpdate` is raised after the document store write
/// and names every projection table that already committed. When a row move
/// failed halfway and the old row could not be put back, `displaced` names the
/// table that no longer holds the ticket at any key.
#[derive(Error, Debug)]
pub enum UpdateError {
    #[error("Invalid update: {0}")]
    InvalidUpdate(String),

    #[error("Ticket {ticket_id} not found in {missing}")]
    NotFound { ticket_id: TicketId, missing: Missing },

    #[error("Could not resolve ticket {ticket_id} in the graph store: {reason}")]
    Resolution { ticket_id: TicketId, reason: String },

    #[error(
        "Partial update of ticket {ticket_id}: document store and [{}] committed, {failed} failed{}: {source}",
        join_tables(.committed),
        displaced_note(.displaced)
    )]
    PartialUpdate {
        ticket_id: TicketId,
        committed: Vec<Table>,
        failed: Table,
        displaced: Option<Table>,
        #[source]
        source: StoreError,
    },

    /// A store failed while nothing had been written yet
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl UpdateError {
    /// True when the workflow stopped before any store was mutated.
    pub fn is_clean_abort(&self) -> bool {
        !matches!(self, UpdateError::PartialUpdate { .. })
    }
}

/// The graph mirror could not be brought up to date.
///
/// Never rolls back the authoritative and projection writes; callers log it.
#[derive(Error, Debug)]
#[error("Graph mirror of ticket {ticket_id} failed: {source}")]
pub struct MirrorError {
    pub ticket_id: TicketId,
    #[source]
    pub source: StoreError,
}

fn displaced_note(displaced: &Option<Table>) -> String {
    match displaced {
        Some(table) => format!(" (row removed from {} and not restored)", table),
        None => String::new(),
    }
}

fn join_tables(tables: &[Table]) -> String {
    tables
        .iter()
        .map(|t| t.name())
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_update_names_committed_and_failed_tables() {
        let err = UpdateError::PartialUpdate {
            ticket_id: "T1".into(),
            committed: vec![Table::TicketByDate, Table::TicketsByAgentDate],
            failed: Table::TicketsByCustomer,
            displaced: None,
            source: StoreError::Storage("disk full".into()),
        };
        let msg = err.to_string();
        assert!(msg.contains("[ticket_by_date, tickets_by_agent_date]"));
        assert!(msg.contains("tickets_by_customer failed"));
        assert!(msg.contains("disk full"));
        assert!(!msg.contains("not restored"));
        assert!(!err.is_clean_abort());
    }

    #[test]
    fn partial_update_mentions_displaced_row() {
        let err = UpdateError::PartialUpdate {
            ticket_id: "T1".into(),
            committed: vec![],
            failed: Table::UrgentTicketsByTime,
            displaced: Some(Table::UrgentTicketsByTime),
            source: StoreError::Storage("write timeout".into()),
        };
        assert!(err
            .to_string()
            .contains("urgent_tickets_by_time failed (row removed from urgent_tickets_by_time and not restored)"));
    }

    #[test]
    fn not_found_mentions_location() {
        let err = UpdateError::NotFound {
            ticket_id: "T9".into(),
            missing: Missing::ProjectionRow(Table::UrgentTicketsByTime),
        };
        assert_eq!(
            err.to_string(),
            "Ticket T9 not found in table urgent_tickets_by_time"
        );
        assert!(err.is_clean_abort());
    }

    #[test]
    fn mirror_error_display() {
        let err = MirrorError {
            ticket_id: "T1".into(),
            source: StoreError::Transport("connection refused".into()),
        };
        assert!(err.to_string().contains("connection refused"));
    }
}

//! Canonical ticket documents
//!
//! The document store is the authoritative copy of every ticket. Two backends
//! are provided: an embedded SQLite store (used by `helpdesk-server`) and an
//! HTTP client for the server's ticket API.

#[cfg(feature = "http")]
mod http;
#[cfg(feature = "sqlite")]
mod sqlite;

#[cfg(feature = "http")]
pub use http::HttpDocumentStore;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteDocumentStore;

use crate::error::StoreError;
use crate::ticket::{Ticket, TicketFilter, TicketMessage, TicketUpdate};

/// The trait that document backends implement.
///
/// "Not found" is a normal answer (`None` / `false`), not an error.
pub trait DocumentStore: Send + Sync {
    /// Store a new ticket. `AlreadyExists` if the id is taken.
    fn insert_ticket(&self, ticket: &Ticket) -> Result<(), StoreError>;

    fn get_ticket(&self, ticket_id: &str) -> Result<Option<Ticket>, StoreError>;

    /// Apply a partial status/priority update and return the stored ticket.
    fn update_ticket(&self, ticket_id: &str, update: &TicketUpdate) -> Result<Option<Ticket>, StoreError>;

    /// Returns `false` if there was nothing to delete.
    fn delete_ticket(&self, ticket_id: &str) -> Result<bool, StoreError>;

    /// Tickets matching every set field of `filter`, oldest first.
    fn find_tickets(&self, filter: &TicketFilter) -> Result<Vec<Ticket>, StoreError>;

    /// Append a message stamped with the store's clock.
    fn append_message(
        &self,
        ticket_id: &str,
        sender_id: &str,
        text: &str,
    ) -> Result<Option<TicketMessage>, StoreError>;
}

/// Reject updates that change nothing before touching a backend.
pub(crate) fn check_update(update: &TicketUpdate) -> Result<(), StoreError> {
    if update.is_empty() {
        return Err(StoreError::Validation(
            "update must set status or priority".into(),
        ));
    }
    Ok(())
}

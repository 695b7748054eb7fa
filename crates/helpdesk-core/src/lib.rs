//! Helpdesk Core - tickets kept consistent across three stores
//!
//! A ticket lives in three places at once:
//!
//! - **Document**: the canonical ticket record (`document`)
//! - **Projection**: denormalized, query-shaped wide-column tables (`projection`)
//! - **Graph**: users, tickets and messages with reverse edges and full-text search (`graph`)
//!
//! [`CrossStoreUpdater`] applies status and priority changes to all of them,
//! reporting exactly which stores were written when something fails part way.
//!
//! # Features
//!
//! - `sqlite` (default): embedded backends for all three stores
//! - `http`: blocking client for the document store API served by `helpdesk-server`

pub mod config;
pub mod document;
pub mod error;
pub mod graph;
pub mod orchestrator;
pub mod projection;
pub mod ticket;

pub use config::{ConfigError, HelpdeskConfig};
pub use document::DocumentStore;
pub use error::{HelpdeskError, MirrorError, Missing, Result, StoreError, UpdateError};
pub use graph::{GraphStore, GraphUser, NodeUid, Role, TicketNode, UserEdge};
pub use orchestrator::{CrossStoreUpdater, MessageOutcome, UpdateOutcome};
pub use projection::{Table, WideColumnStore};
pub use ticket::{
    ActivityRecord, ChangeKind, Ticket, TicketFilter, TicketId, TicketMessage, TicketPriority,
    TicketStatus, TicketUpdate, UserId,
};

#[cfg(feature = "http")]
pub use document::HttpDocumentStore;
#[cfg(feature = "sqlite")]
pub use document::SqliteDocumentStore;
#[cfg(feature = "sqlite")]
pub use graph::SqliteGraphStore;
#[cfg(feature = "sqlite")]
pub use projection::SqliteWideColumnStore;

//! Wide-column projection tables
//!
//! The same logical ticket is copied into several query-shaped tables, each
//! with its own partition and clustering key. Nothing keeps those copies in
//! sync except the update workflow in [`crate::orchestrator`].

mod keys;
mod rows;
mod schema;
mod statement;
mod value;

#[cfg(feature = "sqlite")]
mod sqlite;

pub use keys::{lookup_for, sentinel_date, sentinel_timestamp, KeyContext, KeyPredicate, RowLookup};
pub use rows::{activity_row, ticket_rows, user_row};
pub use schema::{Column, Table, TableDef};
pub use statement::{key_of, BoundStatement, Statement};
pub use value::{CellValue, ColumnType, Row};

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteWideColumnStore;

use crate::error::StoreError;

/// The trait that wide-column backends implement.
///
/// Writes follow wide-column semantics: `Insert` is an upsert, `Update` and
/// `Delete` address one row by its full primary key, and no two statements
/// are atomic with respect to each other.
pub trait WideColumnStore: Send + Sync {
    /// Create every table of the keyspace if missing.
    fn create_schema(&self) -> Result<(), StoreError>;

    /// Fetch the first row matching a lookup.
    fn fetch_row(&self, lookup: &RowLookup) -> Result<Option<Row>, StoreError>;

    /// Execute a single mutation.
    fn execute(&self, statement: &Statement) -> Result<(), StoreError>;

    /// All rows of one partition, in clustering order.
    fn scan_partition(&self, table: Table, partition: &[CellValue]) -> Result<Vec<Row>, StoreError>;
}

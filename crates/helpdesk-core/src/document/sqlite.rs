use std::path::Path;
use std::sync::Mutex;

use chrono::{SecondsFormat, Utc};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};

use super::{check_update, DocumentStore};
use crate::error::StoreError;
use crate::ticket::{Ticket, TicketFilter, TicketMessage, TicketUpdate};

/// Schema version for migrations
pub const SCHEMA_VERSION: u32 = 1;

const CREATE_TABLES: &str = r#"
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER NOT NULL,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Query columns are copies of document fields
CREATE TABLE IF NOT EXISTS tickets (
    uuid TEXT PRIMARY KEY,
    customer_id TEXT NOT NULL,
    agent_id TEXT,
    status TEXT NOT NULL,
    priority TEXT NOT NULL,
    created_timestamp TEXT NOT NULL,
    updated_timestamp TEXT NOT NULL,
    document TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_tickets_customer ON tickets(customer_id);
CREATE INDEX IF NOT EXISTS idx_tickets_agent ON tickets(agent_id);
CREATE INDEX IF NOT EXISTS idx_tickets_status ON tickets(status);
CREATE INDEX IF NOT EXISTS idx_tickets_priority ON tickets(priority);
"#;

/// Migration SQL between two schema versions.
fn migration(from_version: u32, to_version: u32) -> Option<&'static str> {
    match (from_version, to_version) {
        _ => None,
    }
}

/// Document store over a single SQLite file.
pub struct SqliteDocumentStore {
    conn: Mutex<Connection>,
}

impl SqliteDocumentStore {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn =
            Connection::open(path).map_err(|e| StoreError::Storage(format!("open: {}", e)))?;
        Self::init_with_connection(conn)
    }

    /// Create an in-memory store (for testing).
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| StoreError::Storage(format!("open_in_memory: {}", e)))?;
        Self::init_with_connection(conn)
    }

    fn init_with_connection(conn: Connection) -> Result<Self, StoreError> {
        Self::initialize(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize(conn: &Connection) -> Result<(), StoreError> {
        let current_version = Self::schema_version(conn).unwrap_or(0);
        if current_version == 0 {
            conn.execute_batch(CREATE_TABLES)
                .map_err(|e| StoreError::Storage(format!("init_schema: {}", e)))?;
            Self::set_schema_version(conn, SCHEMA_VERSION)?;
        } else if current_version < SCHEMA_VERSION {
            for version in current_version..SCHEMA_VERSION {
                if let Some(sql) = migration(version, version + 1) {
                    conn.execute_batch(sql)
                        .map_err(|e| StoreError::Storage(format!("migrate to {}: {}", version + 1, e)))?;
                }
            }
            Self::set_schema_version(conn, SCHEMA_VERSION)?;
        }
        Ok(())
    }

    fn schema_version(conn: &Connection) -> Option<u32> {
        conn.query_row(
            "SELECT version FROM schema_version ORDER BY applied_at DESC LIMIT 1",
            [],
            |row| row.get(0),
        )
        .ok()
    }

    fn set_schema_version(conn: &Connection, version: u32) -> Result<(), StoreError> {
        conn.execute(
            "INSERT INTO schema_version (version) VALUES (?1)",
            [version],
        )?;
        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|e| StoreError::Storage(format!("connection poisoned: {}", e)))
    }

    fn load(conn: &Connection, ticket_id: &str) -> Result<Option<Ticket>, StoreError> {
        let document: Option<String> = conn
            .query_row(
                "SELECT document FROM tickets WHERE uuid = ?1",
                params![ticket_id],
                |row| row.get(0),
            )
            .optional()?;
        document
            .map(|json| serde_json::from_str(&json).map_err(StoreError::from))
            .transpose()
    }

    /// Rewrite the document and its query columns.
    fn save(conn: &Connection, ticket: &Ticket) -> Result<(), StoreError> {
        let document = serde_json::to_string(ticket)?;
        conn.execute(
            "UPDATE tickets SET customer_id = ?1, agent_id = ?2, status = ?3, priority = ?4,
             updated_timestamp = ?5, document = ?6 WHERE uuid = ?7",
            params![
                ticket.customer_id,
                ticket.agent_id,
                ticket.status.as_str(),
                ticket.priority.as_str(),
                ticket.updated_timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
                document,
                ticket.uuid
            ],
        )?;
        Ok(())
    }
}

impl DocumentStore for SqliteDocumentStore {
    fn insert_ticket(&self, ticket: &Ticket) -> Result<(), StoreError> {
        let conn = self.lock()?;
        let document = serde_json::to_string(ticket)?;
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO tickets
             (uuid, customer_id, agent_id, status, priority, created_timestamp, updated_timestamp, document)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                ticket.uuid,
                ticket.customer_id,
                ticket.agent_id,
                ticket.status.as_str(),
                ticket.priority.as_str(),
                ticket.created_timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
                ticket.updated_timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
                document
            ],
        )?;
        if inserted == 0 {
            return Err(StoreError::AlreadyExists(format!("ticket {}", ticket.uuid)));
        }
        Ok(())
    }

    fn get_ticket(&self, ticket_id: &str) -> Result<Option<Ticket>, StoreError> {
        let conn = self.lock()?;
        Self::load(&conn, ticket_id)
    }

    fn update_ticket(&self, ticket_id: &str, update: &TicketUpdate) -> Result<Option<Ticket>, StoreError> {
        check_update(update)?;
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let Some(mut ticket) = Self::load(&tx, ticket_id)? else {
            return Ok(None);
        };
        ticket.apply(update, Utc::now());
        Self::save(&tx, &ticket)?;
        tx.commit()?;
        Ok(Some(ticket))
    }

    fn delete_ticket(&self, ticket_id: &str) -> Result<bool, StoreError> {
        let conn = self.lock()?;
        let deleted = conn.execute("DELETE FROM tickets WHERE uuid = ?1", params![ticket_id])?;
        Ok(deleted > 0)
    }

    fn find_tickets(&self, filter: &TicketFilter) -> Result<Vec<Ticket>, StoreError> {
        let mut conditions = Vec::new();
        let mut values: Vec<String> = Vec::new();
        if let Some(customer) = &filter.customer_id {
            conditions.push("customer_id = ?");
            values.push(customer.clone());
        }
        if let Some(agent) = &filter.agent_id {
            conditions.push("agent_id = ?");
            values.push(agent.clone());
        }
        if let Some(status) = filter.status {
            conditions.push("status = ?");
            values.push(status.as_str().to_string());
        }
        if let Some(priority) = filter.priority {
            conditions.push("priority = ?");
            values.push(priority.as_str().to_string());
        }
        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };
        let sql = format!(
            "SELECT document FROM tickets {} ORDER BY created_timestamp, uuid",
            where_clause
        );

        let conn = self.lock()?;
        let mut stmt = conn.prepare(&sql)?;
        let documents = stmt
            .query_map(params_from_iter(values.iter()), |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        documents
            .iter()
            .map(|json| serde_json::from_str(json).map_err(StoreError::from))
            .collect()
    }

    fn append_message(
        &self,
        ticket_id: &str,
        sender_id: &str,
        text: &str,
    ) -> Result<Option<TicketMessage>, StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let Some(mut ticket) = Self::load(&tx, ticket_id)? else {
            return Ok(None);
        };
        let now = Utc::now();
        let message = TicketMessage {
            sender_id: sender_id.to_string(),
            timestamp: now,
            message_text: text.to_string(),
        };
        ticket.messages.push(message.clone());
        ticket.updated_timestamp = now;
        Self::save(&tx, &ticket)?;
        tx.commit()?;
        Ok(Some(message))
    }
}

use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use super::{
    GraphStore, GraphUser, MessageNode, NodeUid, Role, TicketAttributes, TicketNode, UserEdge,
    UserRef,
};
use crate::error::StoreError;
use crate::ticket::Ticket;

/// SQLite-backed graph: one table per node type, user edges as foreign keys
/// with reverse indexes, and an FTS5 index over message text.
pub struct SqliteGraphStore {
    conn: Mutex<Connection>,
}

const TICKET_COLUMNS: &str = "t.uid, t.ticket_id, t.status, t.priority, t.created_at, t.updated_at,
     t.assigned_to, a.user_id, t.created_by, c.user_id";

const TICKET_JOINS: &str = "FROM tickets t
     LEFT JOIN users a ON a.uid = t.assigned_to
     LEFT JOIN users c ON c.uid = t.created_by";

const MESSAGE_COLUMNS: &str =
    "m.uid, m.message_id, t.ticket_id, m.sender_uid, u.user_id, m.message_text, m.timestamp";

impl SqliteGraphStore {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn =
            Connection::open(path).map_err(|e| StoreError::Storage(format!("open: {}", e)))?;
        Self::init_with_connection(conn)
    }

    /// Create an in-memory graph (for testing).
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| StoreError::Storage(format!("open_in_memory: {}", e)))?;
        Self::init_with_connection(conn)
    }

    fn init_with_connection(conn: Connection) -> Result<Self, StoreError> {
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.apply_schema()?;
        Ok(store)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|e| StoreError::Storage(format!("connection poisoned: {}", e)))
    }

    fn allocate_uid(conn: &Connection, kind: &str) -> Result<i64, StoreError> {
        conn.execute("INSERT INTO nodes (kind) VALUES (?1)", params![kind])
            .map_err(|e| StoreError::Storage(format!("allocate {} node: {}", kind, e)))?;
        Ok(conn.last_insert_rowid())
    }

    fn user_uid(conn: &Connection, user_id: &str) -> Result<Option<i64>, StoreError> {
        Ok(conn
            .query_row(
                "SELECT uid FROM users WHERE user_id = ?1",
                params![user_id],
                |row| row.get(0),
            )
            .optional()?)
    }

    fn ticket_uid(conn: &Connection, ticket_id: &str) -> Result<Option<i64>, StoreError> {
        Ok(conn
            .query_row(
                "SELECT uid FROM tickets WHERE ticket_id = ?1",
                params![ticket_id],
                |row| row.get(0),
            )
            .optional()?)
    }

    fn query_tickets(
        conn: &Connection,
        where_clause: &str,
        order: &str,
        key: &str,
    ) -> Result<Vec<TicketNode>, StoreError> {
        let sql = format!(
            "SELECT {} {} WHERE {} ORDER BY {}",
            TICKET_COLUMNS, TICKET_JOINS, where_clause, order
        );
        let mut stmt = conn.prepare(&sql)?;
        let raw = stmt
            .query_map(params![key], RawTicket::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        raw.into_iter().map(RawTicket::into_node).collect()
    }
}

fn format_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_ts(column: &str, s: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StoreError::Storage(format!("{}: bad timestamp {:?}: {}", column, s, e)))
}

fn user_ref(uid: Option<i64>, user_id: Option<String>) -> Option<UserRef> {
    match (uid, user_id) {
        (Some(uid), Some(user_id)) => Some(UserRef {
            uid: NodeUid(uid as u64),
            user_id,
        }),
        _ => None,
    }
}

/// Column values of a ticket node, before vocabulary parsing.
struct RawTicket {
    uid: i64,
    ticket_id: String,
    status: String,
    priority: String,
    created_at: String,
    updated_at: String,
    assigned_uid: Option<i64>,
    assigned_user: Option<String>,
    creator_uid: Option<i64>,
    creator_user: Option<String>,
}

impl RawTicket {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            uid: row.get(0)?,
            ticket_id: row.get(1)?,
            status: row.get(2)?,
            priority: row.get(3)?,
            created_at: row.get(4)?,
            updated_at: row.get(5)?,
            assigned_uid: row.get(6)?,
            assigned_user: row.get(7)?,
            creator_uid: row.get(8)?,
            creator_user: row.get(9)?,
        })
    }

    fn into_node(self) -> Result<TicketNode, StoreError> {
        let bad = |e: crate::ticket::ParseVocabularyError| StoreError::Storage(e.to_string());
        Ok(TicketNode {
            uid: NodeUid(self.uid as u64),
            status: self.status.parse().map_err(bad)?,
            priority: self.priority.parse().map_err(bad)?,
            created_at: parse_ts("created_at", &self.created_at)?,
            updated_at: parse_ts("updated_at", &self.updated_at)?,
            assigned_to: user_ref(self.assigned_uid, self.assigned_user),
            created_by: user_ref(self.creator_uid, self.creator_user),
            ticket_id: self.ticket_id,
        })
    }
}

struct RawMessage {
    uid: i64,
    message_id: String,
    ticket_id: String,
    sender_uid: Option<i64>,
    sender_user: Option<String>,
    message_text: String,
    timestamp: String,
}

impl RawMessage {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            uid: row.get(0)?,
            message_id: row.get(1)?,
            ticket_id: row.get(2)?,
            sender_uid: row.get(3)?,
            sender_user: row.get(4)?,
            message_text: row.get(5)?,
            timestamp: row.get(6)?,
        })
    }

    fn into_node(self) -> Result<MessageNode, StoreError> {
        Ok(MessageNode {
            uid: NodeUid(self.uid as u64),
            message_id: self.message_id,
            ticket_id: self.ticket_id,
            sender: user_ref(self.sender_uid, self.sender_user),
            message_text: self.message_text,
            timestamp: parse_ts("timestamp", &self.timestamp)?,
        })
    }
}

/// Quote each whitespace-separated term so FTS5 treats it literally; the
/// terms are implicitly ANDed.
fn fts_terms(query: &str) -> String {
    query
        .split_whitespace()
        .map(|term| format!("\"{}\"", term.replace('"', "\"\"")))
        .collect::<Vec<_>>()
        .join(" ")
}

impl GraphStore for SqliteGraphStore {
    fn apply_schema(&self) -> Result<(), StoreError> {
        let conn = self.lock()?;
        conn.execute_batch(
            "
            PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS nodes (
                uid INTEGER PRIMARY KEY AUTOINCREMENT,
                kind TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS users (
                uid INTEGER PRIMARY KEY REFERENCES nodes(uid),
                user_id TEXT NOT NULL UNIQUE,
                username TEXT NOT NULL,
                email TEXT NOT NULL,
                role TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS tickets (
                uid INTEGER PRIMARY KEY REFERENCES nodes(uid),
                ticket_id TEXT NOT NULL UNIQUE,
                status TEXT NOT NULL,
                priority TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                assigned_to INTEGER REFERENCES users(uid),
                created_by INTEGER REFERENCES users(uid)
            );

            CREATE TABLE IF NOT EXISTS messages (
                uid INTEGER PRIMARY KEY REFERENCES nodes(uid),
                message_id TEXT NOT NULL UNIQUE,
                ticket_uid INTEGER NOT NULL REFERENCES tickets(uid),
                sender_uid INTEGER REFERENCES users(uid),
                message_text TEXT NOT NULL,
                timestamp TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_tickets_assigned_to ON tickets(assigned_to);
            CREATE INDEX IF NOT EXISTS idx_tickets_created_by ON tickets(created_by);
            CREATE INDEX IF NOT EXISTS idx_messages_ticket ON messages(ticket_uid);
            CREATE INDEX IF NOT EXISTS idx_messages_sender ON messages(sender_uid);
            ",
        )
        .map_err(|e| StoreError::Storage(format!("apply_schema: {}", e)))?;

        conn.execute_batch(
            "
            CREATE VIRTUAL TABLE IF NOT EXISTS messages_fts USING fts5(
                message_uid UNINDEXED,
                message_text
            );
            ",
        )
        .map_err(|e| StoreError::Storage(format!("init_fts: {}", e)))?;
        Ok(())
    }

    fn upsert_user(&self, user: &GraphUser) -> Result<NodeUid, StoreError> {
        let conn = self.lock()?;
        let uid = match Self::user_uid(&conn, &user.user_id)? {
            Some(uid) => {
                conn.execute(
                    "UPDATE users SET username = ?1, email = ?2, role = ?3 WHERE uid = ?4",
                    params![user.username, user.email, user.role.as_str(), uid],
                )?;
                uid
            }
            None => {
                let uid = Self::allocate_uid(&conn, "user")?;
                conn.execute(
                    "INSERT INTO users (uid, user_id, username, email, role)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![uid, user.user_id, user.username, user.email, user.role.as_str()],
                )?;
                uid
            }
        };
        Ok(NodeUid(uid as u64))
    }

    fn find_user(&self, user_id: &str) -> Result<Option<(NodeUid, GraphUser)>, StoreError> {
        let conn = self.lock()?;
        let raw = conn
            .query_row(
                "SELECT uid, user_id, username, email, role FROM users WHERE user_id = ?1",
                params![user_id],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                    ))
                },
            )
            .optional()?;
        let Some((uid, user_id, username, email, role)) = raw else {
            return Ok(None);
        };
        let role: Role = role
            .parse()
            .map_err(|e: crate::ticket::ParseVocabularyError| StoreError::Storage(e.to_string()))?;
        Ok(Some((
            NodeUid(uid as u64),
            GraphUser {
                user_id,
                username,
                email,
                role,
            },
        )))
    }

    fn upsert_ticket(&self, ticket: &Ticket) -> Result<NodeUid, StoreError> {
        let conn = self.lock()?;
        let created_by = Self::user_uid(&conn, &ticket.customer_id)?;
        let assigned_to = match &ticket.agent_id {
            Some(agent) => Self::user_uid(&conn, agent)?,
            None => None,
        };
        let created_at = format_ts(&ticket.created_timestamp);
        let updated_at = format_ts(&ticket.updated_timestamp);

        let uid = match Self::ticket_uid(&conn, &ticket.uuid)? {
            Some(uid) => {
                conn.execute(
                    "UPDATE tickets SET status = ?1, priority = ?2, created_at = ?3,
                     updated_at = ?4, assigned_to = ?5, created_by = ?6 WHERE uid = ?7",
                    params![
                        ticket.status.as_str(),
                        ticket.priority.as_str(),
                        created_at,
                        updated_at,
                        assigned_to,
                        created_by,
                        uid
                    ],
                )?;
                uid
            }
            None => {
                let uid = Self::allocate_uid(&conn, "ticket")?;
                conn.execute(
                    "INSERT INTO tickets (uid, ticket_id, status, priority, created_at,
                     updated_at, assigned_to, created_by)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                    params![
                        uid,
                        ticket.uuid,
                        ticket.status.as_str(),
                        ticket.priority.as_str(),
                        created_at,
                        updated_at,
                        assigned_to,
                        created_by
                    ],
                )?;
                uid
            }
        };
        if created_by.is_none() {
            tracing::debug!(ticket_id = %ticket.uuid, customer_id = %ticket.customer_id, "ticket node has no created_by edge");
        }
        Ok(NodeUid(uid as u64))
    }

    fn find_ticket(&self, ticket_id: &str) -> Result<Option<TicketNode>, StoreError> {
        let conn = self.lock()?;
        let mut found = Self::query_tickets(&conn, "t.ticket_id = ?1", "t.uid", ticket_id)?;
        Ok(found.pop())
    }

    fn set_ticket_attributes(&self, uid: NodeUid, attrs: &TicketAttributes) -> Result<(), StoreError> {
        let conn = self.lock()?;
        let changed = conn.execute(
            "UPDATE tickets SET status = COALESCE(?1, status), priority = COALESCE(?2, priority),
             updated_at = ?3 WHERE uid = ?4",
            params![
                attrs.status.map(|s| s.as_str()),
                attrs.priority.map(|p| p.as_str()),
                format_ts(&attrs.updated_at),
                uid.0 as i64
            ],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound(format!("ticket node {}", uid)));
        }
        Ok(())
    }

    fn add_message(
        &self,
        ticket_id: &str,
        sender_id: &str,
        text: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<MessageNode, StoreError> {
        let mut conn = self.lock()?;
        let ticket_uid = Self::ticket_uid(&conn, ticket_id)?
            .ok_or_else(|| StoreError::NotFound(format!("ticket node {}", ticket_id)))?;
        let sender_uid = Self::user_uid(&conn, sender_id)?;
        let message_id = Uuid::new_v4().to_string();

        let tx = conn.transaction()?;
        let uid = Self::allocate_uid(&tx, "message")?;
        tx.execute(
            "INSERT INTO messages (uid, message_id, ticket_uid, sender_uid, message_text, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![uid, message_id, ticket_uid, sender_uid, text, format_ts(&timestamp)],
        )?;
        tx.execute(
            "INSERT INTO messages_fts (message_uid, message_text) VALUES (?1, ?2)",
            params![uid, text],
        )
        .map_err(|e| StoreError::Storage(format!("update_fts: {}", e)))?;
        tx.commit()?;

        Ok(MessageNode {
            uid: NodeUid(uid as u64),
            message_id,
            ticket_id: ticket_id.to_string(),
            sender: sender_uid.map(|uid| UserRef {
                uid: NodeUid(uid as u64),
                user_id: sender_id.to_string(),
            }),
            message_text: text.to_string(),
            timestamp,
        })
    }

    fn search_messages(&self, query: &str) -> Result<Vec<MessageNode>, StoreError> {
        let terms = fts_terms(query);
        if terms.is_empty() {
            return Ok(Vec::new());
        }
        let conn = self.lock()?;
        let sql = format!(
            "SELECT {} FROM messages_fts f
             JOIN messages m ON m.uid = f.message_uid
             JOIN tickets t ON t.uid = m.ticket_uid
             LEFT JOIN users u ON u.uid = m.sender_uid
             WHERE messages_fts MATCH ?1
             ORDER BY m.timestamp DESC",
            MESSAGE_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let raw = stmt
            .query_map(params![terms], RawMessage::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        raw.into_iter().map(RawMessage::into_node).collect()
    }

    fn tickets_for_user(&self, user_id: &str, edge: UserEdge) -> Result<Vec<TicketNode>, StoreError> {
        let conn = self.lock()?;
        let where_clause = match edge {
            UserEdge::AssignedTo => "a.user_id = ?1",
            UserEdge::CreatedBy => "c.user_id = ?1",
        };
        Self::query_tickets(&conn, where_clause, "t.created_at, t.uid", user_id)
    }
}

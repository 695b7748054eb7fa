//! Shared harness: SQLite stores wrapped so tests can inject failures and
//! count projection writes.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use helpdesk_core::graph::{MessageNode, TicketAttributes};
use helpdesk_core::projection::{CellValue, Row, RowLookup, Statement};
use helpdesk_core::{
    CrossStoreUpdater, GraphStore, GraphUser, NodeUid, Role, SqliteDocumentStore,
    SqliteGraphStore, SqliteWideColumnStore, StoreError, Table, Ticket, TicketNode,
    TicketPriority, UserEdge, WideColumnStore,
};

pub const CUSTOMER: &str = "cust-1";
pub const AGENT: &str = "agent-7";

/// Wide-column store that can fail fetches or writes on one table.
pub struct FlakyWideColumn {
    pub inner: SqliteWideColumnStore,
    fail_fetch: Mutex<Option<Table>>,
    fail_write: Mutex<Option<Table>>,
    /// Table whose next N inserts fail
    fail_inserts: Mutex<Option<(Table, usize)>>,
    writes: AtomicUsize,
}

impl FlakyWideColumn {
    pub fn new() -> Self {
        Self {
            inner: SqliteWideColumnStore::open_in_memory().unwrap(),
            fail_fetch: Mutex::new(None),
            fail_write: Mutex::new(None),
            fail_inserts: Mutex::new(None),
            writes: AtomicUsize::new(0),
        }
    }

    pub fn fail_fetch_on(&self, table: Table) {
        *self.fail_fetch.lock().unwrap() = Some(table);
    }

    pub fn fail_write_on(&self, table: Table) {
        *self.fail_write.lock().unwrap() = Some(table);
    }

    /// Fail the next `times` inserts on `table`; other statements go through.
    pub fn fail_inserts_on(&self, table: Table, times: usize) {
        *self.fail_inserts.lock().unwrap() = Some((table, times));
    }

    pub fn clear_failures(&self) {
        *self.fail_fetch.lock().unwrap() = None;
        *self.fail_write.lock().unwrap() = None;
        *self.fail_inserts.lock().unwrap() = None;
    }

    /// Successful writes since the last reset.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn reset_writes(&self) {
        self.writes.store(0, Ordering::SeqCst);
    }
}

impl WideColumnStore for FlakyWideColumn {
    fn create_schema(&self) -> Result<(), StoreError> {
        self.inner.create_schema()
    }

    fn fetch_row(&self, lookup: &RowLookup) -> Result<Option<Row>, StoreError> {
        if *self.fail_fetch.lock().unwrap() == Some(lookup.table) {
            return Err(StoreError::Transport(format!("{} unavailable", lookup.table)));
        }
        self.inner.fetch_row(lookup)
    }

    fn execute(&self, statement: &Statement) -> Result<(), StoreError> {
        if *self.fail_write.lock().unwrap() == Some(statement.table()) {
            return Err(StoreError::Storage(format!(
                "write timeout on {}",
                statement.table()
            )));
        }
        if let Statement::Insert { table, .. } = statement {
            let mut fail_inserts = self.fail_inserts.lock().unwrap();
            if let Some((failing, remaining)) = fail_inserts.as_mut() {
                if *failing == *table && *remaining > 0 {
                    *remaining -= 1;
                    return Err(StoreError::Storage(format!("insert rejected on {}", table)));
                }
            }
        }
        self.inner.execute(statement)?;
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn scan_partition(&self, table: Table, partition: &[CellValue]) -> Result<Vec<Row>, StoreError> {
        self.inner.scan_partition(table, partition)
    }
}

/// Graph store whose attribute mirror can be switched off.
pub struct FlakyGraph {
    pub inner: SqliteGraphStore,
    fail_mirror: AtomicBool,
}

impl FlakyGraph {
    pub fn new() -> Self {
        Self {
            inner: SqliteGraphStore::open_in_memory().unwrap(),
            fail_mirror: AtomicBool::new(false),
        }
    }

    pub fn fail_mirror(&self) {
        self.fail_mirror.store(true, Ordering::SeqCst);
    }
}

impl GraphStore for FlakyGraph {
    fn apply_schema(&self) -> Result<(), StoreError> {
        self.inner.apply_schema()
    }

    fn upsert_user(&self, user: &GraphUser) -> Result<NodeUid, StoreError> {
        self.inner.upsert_user(user)
    }

    fn find_user(&self, user_id: &str) -> Result<Option<(NodeUid, GraphUser)>, StoreError> {
        self.inner.find_user(user_id)
    }

    fn upsert_ticket(&self, ticket: &Ticket) -> Result<NodeUid, StoreError> {
        self.inner.upsert_ticket(ticket)
    }

    fn find_ticket(&self, ticket_id: &str) -> Result<Option<TicketNode>, StoreError> {
        self.inner.find_ticket(ticket_id)
    }

    fn set_ticket_attributes(&self, uid: NodeUid, attrs: &TicketAttributes) -> Result<(), StoreError> {
        if self.fail_mirror.load(Ordering::SeqCst) {
            return Err(StoreError::Transport("graph alpha unreachable".into()));
        }
        self.inner.set_ticket_attributes(uid, attrs)
    }

    fn add_message(
        &self,
        ticket_id: &str,
        sender_id: &str,
        text: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<MessageNode, StoreError> {
        self.inner.add_message(ticket_id, sender_id, text, timestamp)
    }

    fn search_messages(&self, query: &str) -> Result<Vec<MessageNode>, StoreError> {
        self.inner.search_messages(query)
    }

    fn tickets_for_user(&self, user_id: &str, edge: UserEdge) -> Result<Vec<TicketNode>, StoreError> {
        self.inner.tickets_for_user(user_id, edge)
    }
}

pub struct Harness {
    pub docs: Arc<SqliteDocumentStore>,
    pub wide: Arc<FlakyWideColumn>,
    pub graph: Arc<FlakyGraph>,
    pub updater: CrossStoreUpdater,
}

impl Harness {
    pub fn new() -> Self {
        let docs = Arc::new(SqliteDocumentStore::open_in_memory().unwrap());
        let wide = Arc::new(FlakyWideColumn::new());
        let graph = Arc::new(FlakyGraph::new());
        let updater = CrossStoreUpdater::new(docs.clone(), wide.clone(), graph.clone());
        Self {
            docs,
            wide,
            graph,
            updater,
        }
    }

    /// A harness holding one freshly loaded ticket; write counts start at zero.
    pub fn with_ticket(priority: TicketPriority) -> (Self, Ticket) {
        let harness = Self::new();
        let ticket = harness.load(priority);
        harness.wide.reset_writes();
        (harness, ticket)
    }

    pub fn load(&self, priority: TicketPriority) -> Ticket {
        let customer = GraphUser::new(CUSTOMER, "Casey Customer", Role::Customer);
        let agent = GraphUser::new(AGENT, "Avery Agent", Role::Agent);
        let ticket = Ticket::new(CUSTOMER, "Cannot reset password", priority, "email")
            .with_category("account");
        self.updater.load_ticket(&ticket, &customer, &agent).unwrap()
    }

    /// Every row of `ticket` in `table`, across all partitions it could sit in.
    pub fn rows_of(&self, table: Table, ticket: &Ticket) -> Vec<Row> {
        let partitions: Vec<CellValue> = match table {
            Table::TicketByDate => vec![ticket.created_timestamp.date_naive().into()],
            Table::TicketsByAgentDate => vec![AGENT.into()],
            Table::TicketsByCustomer => vec![CUSTOMER.into()],
            Table::UrgentTicketsByTime => TicketPriority::all()
                .iter()
                .map(|p| p.as_str().into())
                .collect(),
            Table::ActivityByTicket => vec![ticket.uuid.as_str().into()],
            other => panic!("no ticket partition for {}", other),
        };
        partitions
            .into_iter()
            .flat_map(|p| self.wide.inner.scan_partition(table, &[p]).unwrap())
            .filter(|row| row.get("ticket_id") == Some(&CellValue::from(ticket.uuid.as_str())))
            .collect()
    }

    pub fn only_row(&self, table: Table, ticket: &Ticket) -> Row {
        let mut rows = self.rows_of(table, ticket);
        assert_eq!(rows.len(), 1, "expected one row in {}", table);
        rows.remove(0)
    }

    /// Remove the ticket's row from one projection, bypassing the wrapper.
    pub fn drop_row(&self, table: Table, ticket: &Ticket) {
        let row = self.only_row(table, ticket);
        self.wide
            .inner
            .execute(&Statement::delete_row(table, &row).unwrap())
            .unwrap();
    }
}

pub fn text(value: &str) -> CellValue {
    CellValue::from(value)
}

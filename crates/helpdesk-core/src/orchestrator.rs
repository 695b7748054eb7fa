//! Cross-store ticket mutations
//!
//! A status or priority change has to reach the canonical document, every
//! projection table holding a copy, and the graph mirror. None of these
//! stores share a transaction, so the update runs as a saga:
//!
//! 1. validate the update
//! 2. read the canonical document (existence, creation date, current priority)
//! 3. resolve the ticket node and owning customer in the graph
//! 4. fetch every projection row and plan the writes
//! 5. update the document
//! 6. write each projection table in turn, moving the priority-keyed row
//!    back to its old partition if the move fails halfway
//! 7. append one activity record per changed field
//! 8. mirror the new attributes onto the graph node
//!
//! Steps 1-4 only read, so failures there leave every store untouched.
//! Failures in 6-7 are reported with the list of tables already written.
//! A priority-keyed row that a failed update left at a stale priority is
//! found under the other priorities and moved on the next update.
//! A failure in 8 does not fail the update.

use std::sync::Arc;

use chrono::NaiveDate;
use tracing::{debug, error, info, warn};

use crate::document::DocumentStore;
use crate::error::{Missing, MirrorError, StoreError, UpdateError};
use crate::graph::{GraphStore, GraphUser, MessageNode, TicketAttributes, TicketNode};
use crate::projection::{
    activity_row, lookup_for, ticket_rows, user_row, CellValue, KeyContext, Row, Statement,
    Table, WideColumnStore,
};
use crate::ticket::{ActivityRecord, Ticket, TicketMessage, TicketPriority, TicketUpdate};

/// Result of a successful update.
#[derive(Debug)]
pub struct UpdateOutcome {
    /// The canonical ticket as stored after the update
    pub ticket: Ticket,
    pub activities: Vec<ActivityRecord>,
    /// Set when the graph mirror could not be updated
    pub mirror_error: Option<MirrorError>,
}

/// Result of appending a message to a ticket.
#[derive(Debug)]
pub struct MessageOutcome {
    pub message: TicketMessage,
    pub node: Option<MessageNode>,
    pub mirror_error: Option<MirrorError>,
}

/// Keeps a ticket consistent across the document, wide-column and graph stores.
pub struct CrossStoreUpdater {
    documents: Arc<dyn DocumentStore>,
    projections: Arc<dyn WideColumnStore>,
    graph: Arc<dyn GraphStore>,
}

impl CrossStoreUpdater {
    pub fn new(
        documents: Arc<dyn DocumentStore>,
        projections: Arc<dyn WideColumnStore>,
        graph: Arc<dyn GraphStore>,
    ) -> Self {
        Self {
            documents,
            projections,
            graph,
        }
    }

    pub fn documents(&self) -> &dyn DocumentStore {
        self.documents.as_ref()
    }

    pub fn projections(&self) -> &dyn WideColumnStore {
        self.projections.as_ref()
    }

    pub fn graph(&self) -> &dyn GraphStore {
        self.graph.as_ref()
    }

    /// Apply a status and/or priority change on behalf of `agent_id`.
    pub fn update_ticket(
        &self,
        ticket_id: &str,
        agent_id: &str,
        update: &TicketUpdate,
    ) -> Result<UpdateOutcome, UpdateError> {
        if update.is_empty() {
            return Err(UpdateError::InvalidUpdate(
                "update must set status or priority".to_string(),
            ));
        }
        if ticket_id.trim().is_empty() || agent_id.trim().is_empty() {
            return Err(UpdateError::InvalidUpdate(
                "ticket_id and agent_id are required".to_string(),
            ));
        }
        info!(ticket_id, agent_id, ?update, "updating ticket");

        let current = self
            .documents
            .get_ticket(ticket_id)?
            .ok_or_else(|| not_found(ticket_id, Missing::Ticket))?;
        let node = self.resolve_node(ticket_id)?;
        let customer_id = node
            .created_by
            .as_ref()
            .map(|user| user.user_id.clone())
            .ok_or_else(|| UpdateError::Resolution {
                ticket_id: ticket_id.to_string(),
                reason: format!("ticket node {} has no created_by edge", node.uid),
            })?;
        if node.priority != current.priority {
            debug!(
                ticket_id,
                graph = %node.priority,
                document = %current.priority,
                "graph priority is stale, keying projections by the document"
            );
        }

        let ctx = KeyContext {
            ticket_id,
            agent_id,
            customer_id: &customer_id,
            priority: current.priority,
            created_date: current.created_timestamp.date_naive(),
        };
        let rows = self.fetch_projection_rows(&ctx, node.priority)?;
        let writes = plan_projection_writes(&rows, update, current.priority)?;

        let ticket = self
            .documents
            .update_ticket(ticket_id, update)?
            .ok_or_else(|| not_found(ticket_id, Missing::Ticket))?;
        debug!(ticket_id, "document store updated");

        let mut committed = Vec::with_capacity(writes.len());
        for (table, write) in &writes {
            if let Err(failure) = self.apply_write(ticket_id, write) {
                let displaced = failure.displaced.then_some(*table);
                return Err(partial(ticket_id, committed, *table, displaced, failure.source));
            }
            debug!(ticket_id, table = %table, "projection updated");
            committed.push(*table);
        }

        let activities: Vec<ActivityRecord> = update
            .changes()
            .into_iter()
            .map(|(kind, value)| {
                ActivityRecord::new(ticket_id, agent_id, kind, value, ticket.updated_timestamp)
            })
            .collect();
        for record in &activities {
            let statement = Statement::insert(Table::ActivityByTicket, activity_row(record));
            if let Err(source) = self.projections.execute(&statement) {
                return Err(partial(ticket_id, committed, Table::ActivityByTicket, None, source));
            }
        }

        let attrs = TicketAttributes {
            status: update.status,
            priority: update.priority,
            updated_at: ticket.updated_timestamp,
        };
        let mirror_error = match self.graph.set_ticket_attributes(node.uid, &attrs) {
            Ok(()) => None,
            Err(source) => {
                let err = MirrorError {
                    ticket_id: ticket_id.to_string(),
                    source,
                };
                warn!(ticket_id, error = %err, "graph mirror is out of date");
                Some(err)
            }
        };

        info!(
            ticket_id,
            status = %ticket.status,
            priority = %ticket.priority,
            activities = activities.len(),
            "ticket updated"
        );
        Ok(UpdateOutcome {
            ticket,
            activities,
            mirror_error,
        })
    }

    /// Write a new ticket into all three stores.
    ///
    /// The ticket is filed under `agent` in the agent-keyed tables; its
    /// `agent_id` is set to the agent when missing and must match it otherwise.
    pub fn load_ticket(
        &self,
        ticket: &Ticket,
        customer: &GraphUser,
        agent: &GraphUser,
    ) -> Result<Ticket, StoreError> {
        if ticket.customer_id != customer.user_id {
            return Err(StoreError::Validation(format!(
                "ticket {} belongs to {}, not {}",
                ticket.uuid, ticket.customer_id, customer.user_id
            )));
        }
        if let Some(assigned) = ticket.agent_id.as_deref() {
            if assigned != agent.user_id {
                return Err(StoreError::Validation(format!(
                    "ticket {} is assigned to {}, not {}",
                    ticket.uuid, assigned, agent.user_id
                )));
            }
        }
        let mut ticket = ticket.clone();
        ticket.agent_id = Some(agent.user_id.clone());

        for user in [customer, agent] {
            self.graph.upsert_user(user)?;
            self.projections
                .execute(&Statement::insert(Table::UsersById, user_row(user)))?;
        }
        self.documents.insert_ticket(&ticket)?;
        let assigned_date: NaiveDate = ticket.created_timestamp.date_naive();
        for (table, row) in ticket_rows(&ticket, &agent.user_id, assigned_date) {
            self.projections.execute(&Statement::insert(table, row))?;
        }
        let uid = self.graph.upsert_ticket(&ticket)?;
        info!(ticket_id = %ticket.uuid, node = %uid, "ticket loaded");
        Ok(ticket)
    }

    /// Append a customer message to the document and mirror it as a graph node.
    pub fn add_message(
        &self,
        ticket_id: &str,
        customer_id: &str,
        text: &str,
    ) -> Result<MessageOutcome, UpdateError> {
        if text.trim().is_empty() {
            return Err(UpdateError::InvalidUpdate("message text is empty".to_string()));
        }
        let message = self
            .documents
            .append_message(ticket_id, customer_id, text)?
            .ok_or_else(|| not_found(ticket_id, Missing::Ticket))?;

        let (node, mirror_error) =
            match self
                .graph
                .add_message(ticket_id, customer_id, text, message.timestamp)
            {
                Ok(node) => (Some(node), None),
                Err(source) => {
                    let err = MirrorError {
                        ticket_id: ticket_id.to_string(),
                        source,
                    };
                    warn!(ticket_id, error = %err, "message not mirrored to graph");
                    (None, Some(err))
                }
            };
        Ok(MessageOutcome {
            message,
            node,
            mirror_error,
        })
    }

    /// Activity records of a ticket, oldest first.
    pub fn activity_log(&self, ticket_id: &str) -> Result<Vec<Row>, StoreError> {
        self.projections
            .scan_partition(Table::ActivityByTicket, &[CellValue::from(ticket_id)])
    }

    fn resolve_node(&self, ticket_id: &str) -> Result<TicketNode, UpdateError> {
        match self.graph.find_ticket(ticket_id) {
            Ok(Some(node)) => Ok(node),
            Ok(None) => Err(UpdateError::Resolution {
                ticket_id: ticket_id.to_string(),
                reason: "no ticket node".to_string(),
            }),
            Err(e) => Err(UpdateError::Resolution {
                ticket_id: ticket_id.to_string(),
                reason: e.to_string(),
            }),
        }
    }

    fn fetch_projection_rows(
        &self,
        ctx: &KeyContext<'_>,
        graph_priority: TicketPriority,
    ) -> Result<Vec<(Table, Row)>, UpdateError> {
        let mut rows = Vec::with_capacity(Table::TICKET_PROJECTIONS.len());
        for table in Table::TICKET_PROJECTIONS {
            let Some(lookup) = lookup_for(table, ctx) else {
                continue;
            };
            let mut row = self.projections.fetch_row(&lookup)?;
            if row.is_none() && table.priority_in_partition_key() {
                row = self.find_under_other_priority(table, ctx, graph_priority)?;
            }
            let row = row.ok_or_else(|| not_found(ctx.ticket_id, Missing::ProjectionRow(table)))?;
            rows.push((table, row));
        }
        Ok(rows)
    }

    /// Look up a priority-keyed row under the priorities other than the
    /// document's, the graph's copy first.
    fn find_under_other_priority(
        &self,
        table: Table,
        ctx: &KeyContext<'_>,
        graph_priority: TicketPriority,
    ) -> Result<Option<Row>, StoreError> {
        let mut candidates = vec![graph_priority];
        candidates.extend(
            TicketPriority::all()
                .into_iter()
                .filter(|p| *p != graph_priority),
        );
        for priority in candidates.into_iter().filter(|p| *p != ctx.priority) {
            let stale = KeyContext {
                priority,
                ..ctx.clone()
            };
            let Some(lookup) = lookup_for(table, &stale) else {
                continue;
            };
            if let Some(row) = self.projections.fetch_row(&lookup)? {
                warn!(
                    ticket_id = ctx.ticket_id,
                    table = %table,
                    found = %priority,
                    document = %ctx.priority,
                    "projection row sits under a stale priority"
                );
                return Ok(Some(row));
            }
        }
        Ok(None)
    }

    fn apply_write(&self, ticket_id: &str, write: &TableWrite) -> Result<(), WriteFailure> {
        match write {
            TableWrite::Update(statement) => {
                self.projections
                    .execute(statement)
                    .map_err(|source| WriteFailure {
                        source,
                        displaced: false,
                    })
            }
            TableWrite::Relocate {
                delete,
                insert,
                restore,
            } => {
                self.projections
                    .execute(delete)
                    .map_err(|source| WriteFailure {
                        source,
                        displaced: false,
                    })?;
                let Err(source) = self.projections.execute(insert) else {
                    return Ok(());
                };
                match self.projections.execute(restore) {
                    Ok(()) => {
                        warn!(ticket_id, table = %restore.table(), "row move failed, old row restored");
                        Err(WriteFailure {
                            source,
                            displaced: false,
                        })
                    }
                    Err(restore_err) => {
                        error!(
                            ticket_id,
                            table = %restore.table(),
                            error = %restore_err,
                            "row move failed and the old row could not be restored"
                        );
                        Err(WriteFailure {
                            source,
                            displaced: true,
                        })
                    }
                }
            }
        }
    }
}

/// The writes planned for one projection table.
#[derive(Debug)]
enum TableWrite {
    /// Same-key update of the copied columns
    Update(Statement),
    /// Move the row to another partition. `restore` re-inserts the row as it
    /// was fetched, at its old key.
    Relocate {
        delete: Statement,
        insert: Statement,
        restore: Statement,
    },
}

struct WriteFailure {
    source: StoreError,
    /// The old row was deleted and is not back
    displaced: bool,
}

fn not_found(ticket_id: &str, missing: Missing) -> UpdateError {
    UpdateError::NotFound {
        ticket_id: ticket_id.to_string(),
        missing,
    }
}

fn partial(
    ticket_id: &str,
    committed: Vec<Table>,
    failed: Table,
    displaced: Option<Table>,
    source: StoreError,
) -> UpdateError {
    error!(
        ticket_id,
        failed = %failed,
        committed = ?committed,
        displaced = ?displaced,
        error = %source,
        "projection write failed after document update"
    );
    UpdateError::PartialUpdate {
        ticket_id: ticket_id.to_string(),
        committed,
        failed,
        displaced,
        source,
    }
}

/// Per-table writes for `update`, given the rows currently stored.
///
/// Non-key copies get one same-key UPDATE. A priority held in the partition
/// key relocates the row to the new priority, or to `current` when the update
/// leaves priority alone but the row was left behind by an earlier failure.
/// Tables with nothing to change are left out.
fn plan_projection_writes(
    rows: &[(Table, Row)],
    update: &TicketUpdate,
    current: TicketPriority,
) -> Result<Vec<(Table, TableWrite)>, StoreError> {
    let mut plan = Vec::new();
    for (table, row) in rows {
        let mut assignments = Vec::new();
        let mut relocate_to = None;

        if let (Some(status), Some(column)) = (update.status, table.status_column()) {
            assignments.push((column, CellValue::from(status.as_str())));
        }
        if let Some(column) = table.priority_column() {
            if table.priority_in_partition_key() {
                let target = CellValue::from(update.priority.unwrap_or(current).as_str());
                if row.get(column) != Some(&target) {
                    relocate_to = Some((column, target));
                }
            } else if let Some(priority) = update.priority {
                assignments.push((column, CellValue::from(priority.as_str())));
            }
        }

        let write = match relocate_to {
            Some((column, value)) => {
                let mut moved = row.clone();
                for (name, assigned) in assignments {
                    moved.insert(name.to_string(), assigned);
                }
                moved.insert(column.to_string(), value);
                Some(TableWrite::Relocate {
                    delete: Statement::delete_row(*table, row)?,
                    insert: Statement::insert(*table, moved),
                    restore: Statement::insert(*table, row.clone()),
                })
            }
            None if !assignments.is_empty() => {
                Some(TableWrite::Update(Statement::update_row(*table, assignments, row)?))
            }
            None => None,
        };
        if let Some(write) = write {
            plan.push((*table, write));
        }
    }
    Ok(plan)
}

//! The wide-column keyspace: one definition per query-shaped table.
//!
//! ```text
//! ticket_by_date              ((created_date), created_timestamp, ticket_id)
//! tickets_by_agent_date       ((agent_id), ticket_id, assigned_date)
//! tickets_by_customer         ((customer_id), created_timestamp, ticket_id)
//! urgent_tickets_by_time      ((priority_level), created_timestamp, ticket_id)
//! activity_by_ticket          ((ticket_id), activity_timestamp, activity_id)
//! feedback_by_agent           ((agent_id), ticket_id)
//! ticket_count_by_channel_date((created_date), support_channel, ticket_id)
//! users_by_id                 ((user_id))
//! ```

use super::value::ColumnType;

/// A table of the wide-column keyspace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Table {
    TicketByDate,
    TicketsByAgentDate,
    TicketsByCustomer,
    UrgentTicketsByTime,
    ActivityByTicket,
    FeedbackByAgent,
    TicketCountByChannelDate,
    UsersById,
}

impl Table {
    pub const ALL: [Table; 8] = [
        Table::TicketByDate,
        Table::TicketsByAgentDate,
        Table::TicketsByCustomer,
        Table::UrgentTicketsByTime,
        Table::ActivityByTicket,
        Table::FeedbackByAgent,
        Table::TicketCountByChannelDate,
        Table::UsersById,
    ];

    /// Tables holding a copy of a ticket's status and/or priority, in the
    /// order the update workflow visits them.
    pub const TICKET_PROJECTIONS: [Table; 4] = [
        Table::TicketByDate,
        Table::TicketsByAgentDate,
        Table::TicketsByCustomer,
        Table::UrgentTicketsByTime,
    ];

    pub fn name(&self) -> &'static str {
        self.def().name
    }

    pub fn def(&self) -> &'static TableDef {
        match self {
            Table::TicketByDate => &TICKET_BY_DATE,
            Table::TicketsByAgentDate => &TICKETS_BY_AGENT_DATE,
            Table::TicketsByCustomer => &TICKETS_BY_CUSTOMER,
            Table::UrgentTicketsByTime => &URGENT_TICKETS_BY_TIME,
            Table::ActivityByTicket => &ACTIVITY_BY_TICKET,
            Table::FeedbackByAgent => &FEEDBACK_BY_AGENT,
            Table::TicketCountByChannelDate => &TICKET_COUNT_BY_CHANNEL_DATE,
            Table::UsersById => &USERS_BY_ID,
        }
    }

    /// Column holding the ticket status, if this table keeps one.
    pub fn status_column(&self) -> Option<&'static str> {
        match self {
            Table::TicketByDate | Table::TicketsByAgentDate | Table::TicketsByCustomer => {
                Some("status")
            }
            _ => None,
        }
    }

    /// Column holding the ticket priority, if this table keeps one.
    pub fn priority_column(&self) -> Option<&'static str> {
        match self {
            Table::TicketsByAgentDate | Table::TicketsByCustomer => Some("priority"),
            Table::UrgentTicketsByTime => Some("priority_level"),
            _ => None,
        }
    }

    /// A priority change on this table moves the row to another partition.
    pub fn priority_in_partition_key(&self) -> bool {
        self.priority_column()
            .is_some_and(|col| self.def().partition_key.contains(&col))
    }
}

impl std::fmt::Display for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A column declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Column {
    pub name: &'static str,
    pub ty: ColumnType,
}

const fn col(name: &'static str, ty: ColumnType) -> Column {
    Column { name, ty }
}

/// Static shape of one table: columns plus partition and clustering keys.
#[derive(Debug)]
pub struct TableDef {
    pub name: &'static str,
    pub columns: &'static [Column],
    pub partition_key: &'static [&'static str],
    pub clustering_key: &'static [&'static str],
}

impl TableDef {
    pub fn column(&self, name: &str) -> Option<&'static Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Partition key columns followed by clustering columns.
    pub fn primary_key(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.partition_key
            .iter()
            .chain(self.clustering_key.iter())
            .copied()
    }

    pub fn is_key_column(&self, name: &str) -> bool {
        self.primary_key().any(|k| k == name)
    }
}

use ColumnType::{Date, Int, Text, Timestamp};

static TICKET_BY_DATE: TableDef = TableDef {
    name: "ticket_by_date",
    columns: &[
        col("created_date", Date),
        col("created_timestamp", Timestamp),
        col("ticket_id", Text),
        col("customer_id", Text),
        col("description", Text),
        col("status", Text),
    ],
    partition_key: &["created_date"],
    clustering_key: &["created_timestamp", "ticket_id"],
};

static TICKETS_BY_AGENT_DATE: TableDef = TableDef {
    name: "tickets_by_agent_date",
    columns: &[
        col("agent_id", Text),
        col("ticket_id", Text),
        col("assigned_date", Date),
        col("priority", Text),
        col("status", Text),
    ],
    partition_key: &["agent_id"],
    clustering_key: &["ticket_id", "assigned_date"],
};

static TICKETS_BY_CUSTOMER: TableDef = TableDef {
    name: "tickets_by_customer",
    columns: &[
        col("customer_id", Text),
        col("created_timestamp", Timestamp),
        col("ticket_id", Text),
        col("status", Text),
        col("priority", Text),
    ],
    partition_key: &["customer_id"],
    clustering_key: &["created_timestamp", "ticket_id"],
};

static URGENT_TICKETS_BY_TIME: TableDef = TableDef {
    name: "urgent_tickets_by_time",
    columns: &[
        col("priority_level", Text),
        col("created_timestamp", Timestamp),
        col("ticket_id", Text),
        col("customer_id", Text),
        col("description", Text),
        col("agent_id", Text),
    ],
    partition_key: &["priority_level"],
    clustering_key: &["created_timestamp", "ticket_id"],
};

static ACTIVITY_BY_TICKET: TableDef = TableDef {
    name: "activity_by_ticket",
    columns: &[
        col("ticket_id", Text),
        col("activity_timestamp", Timestamp),
        col("activity_id", Text),
        col("activity_type", Text),
        col("status", Text),
        col("agent_id", Text),
    ],
    partition_key: &["ticket_id"],
    clustering_key: &["activity_timestamp", "activity_id"],
};

static FEEDBACK_BY_AGENT: TableDef = TableDef {
    name: "feedback_by_agent",
    columns: &[
        col("agent_id", Text),
        col("ticket_id", Text),
        col("feedback_rating", Int),
        col("feedback_comments", Text),
    ],
    partition_key: &["agent_id"],
    clustering_key: &["ticket_id"],
};

static TICKET_COUNT_BY_CHANNEL_DATE: TableDef = TableDef {
    name: "ticket_count_by_channel_date",
    columns: &[
        col("created_date", Date),
        col("support_channel", Text),
        col("ticket_id", Text),
        col("ticket_count", Int),
    ],
    partition_key: &["created_date"],
    clustering_key: &["support_channel", "ticket_id"],
};

static USERS_BY_ID: TableDef = TableDef {
    name: "users_by_id",
    columns: &[
        col("user_id", Text),
        col("username", Text),
        col("email", Text),
        col("role", Text),
    ],
    partition_key: &["user_id"],
    clustering_key: &[],
};

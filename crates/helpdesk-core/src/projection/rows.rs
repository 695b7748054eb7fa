//! Row builders for loading tickets, activity, and users into the keyspace

use chrono::NaiveDate;

use super::schema::Table;
use super::value::{CellValue, Row};
use crate::graph::GraphUser;
use crate::ticket::{ActivityRecord, Ticket};

fn row<const N: usize>(cells: [(&str, CellValue); N]) -> Row {
    cells
        .into_iter()
        .map(|(name, value)| (name.to_string(), value))
        .collect()
}

/// Projection rows describing a freshly loaded ticket.
///
/// `agent_id` is the agent the ticket is filed under in the agent-keyed
/// tables; `assigned_date` is the day of that assignment. A ticket carrying a
/// feedback rating also gets its `feedback_by_agent` row.
pub fn ticket_rows(ticket: &Ticket, agent_id: &str, assigned_date: NaiveDate) -> Vec<(Table, Row)> {
    let created_date = ticket.created_timestamp.date_naive();
    let mut rows = vec![
        (
            Table::TicketByDate,
            row([
                ("created_date", created_date.into()),
                ("created_timestamp", ticket.created_timestamp.into()),
                ("ticket_id", ticket.uuid.as_str().into()),
                ("customer_id", ticket.customer_id.as_str().into()),
                ("description", ticket.description.as_str().into()),
                ("status", ticket.status.as_str().into()),
            ]),
        ),
        (
            Table::TicketsByAgentDate,
            row([
                ("agent_id", agent_id.into()),
                ("ticket_id", ticket.uuid.as_str().into()),
                ("assigned_date", assigned_date.into()),
                ("priority", ticket.priority.as_str().into()),
                ("status", ticket.status.as_str().into()),
            ]),
        ),
        (
            Table::TicketsByCustomer,
            row([
                ("customer_id", ticket.customer_id.as_str().into()),
                ("created_timestamp", ticket.created_timestamp.into()),
                ("ticket_id", ticket.uuid.as_str().into()),
                ("status", ticket.status.as_str().into()),
                ("priority", ticket.priority.as_str().into()),
            ]),
        ),
        (
            Table::UrgentTicketsByTime,
            row([
                ("priority_level", ticket.priority.as_str().into()),
                ("created_timestamp", ticket.created_timestamp.into()),
                ("ticket_id", ticket.uuid.as_str().into()),
                ("customer_id", ticket.customer_id.as_str().into()),
                ("description", ticket.description.as_str().into()),
                ("agent_id", agent_id.into()),
            ]),
        ),
        (
            Table::TicketCountByChannelDate,
            row([
                ("created_date", created_date.into()),
                ("support_channel", ticket.channel.as_str().into()),
                ("ticket_id", ticket.uuid.as_str().into()),
                ("ticket_count", CellValue::Int(1)),
            ]),
        ),
    ];
    if let Some(rating) = ticket.feedback.rating {
        rows.push((
            Table::FeedbackByAgent,
            row([
                ("agent_id", agent_id.into()),
                ("ticket_id", ticket.uuid.as_str().into()),
                ("feedback_rating", i64::from(rating).into()),
                (
                    "feedback_comments",
                    ticket
                        .feedback
                        .comments
                        .as_deref()
                        .map_or(CellValue::Null, CellValue::from),
                ),
            ]),
        ));
    }
    rows
}

pub fn activity_row(record: &ActivityRecord) -> Row {
    row([
        ("ticket_id", record.ticket_id.as_str().into()),
        ("activity_timestamp", record.activity_timestamp.into()),
        ("activity_id", record.activity_id.to_string().into()),
        ("activity_type", record.activity_type.as_str().into()),
        ("status", record.status.as_str().into()),
        ("agent_id", record.agent_id.as_str().into()),
    ])
}

pub fn user_row(user: &GraphUser) -> Row {
    row([
        ("user_id", user.user_id.as_str().into()),
        ("username", user.username.as_str().into()),
        ("email", user.email.as_str().into()),
        ("role", user.role.as_str().into()),
    ])
}

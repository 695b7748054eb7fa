//! Per-table key resolution.
//!
//! Every projection keys the same ticket differently. Some key fields are known
//! up front (ticket, agent, customer, current priority, creation date) and are
//! matched exactly; the rest are anchored with a "greater than sentinel" range
//! predicate so the row can be found without knowing the stored value.

use chrono::{DateTime, NaiveDate, TimeZone, Utc};

use super::schema::Table;
use super::statement::BoundStatement;
use super::value::CellValue;
use crate::error::StoreError;
use crate::ticket::TicketPriority;

/// Lower bound for date range anchors.
pub fn sentinel_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2000, 1, 1).unwrap_or(NaiveDate::MIN)
}

/// Lower bound for timestamp range anchors.
pub fn sentinel_timestamp() -> DateTime<Utc> {
    sentinel_date()
        .and_hms_opt(0, 0, 0)
        .map(|naive| Utc.from_utc_datetime(&naive))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// One predicate of a row lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyPredicate {
    /// `column = value`
    Eq(&'static str, CellValue),
    /// `column > value`, used as a range-scan anchor
    After(&'static str, CellValue),
}

impl KeyPredicate {
    pub fn column(&self) -> &'static str {
        match self {
            KeyPredicate::Eq(c, _) | KeyPredicate::After(c, _) => c,
        }
    }

    pub fn value(&self) -> &CellValue {
        match self {
            KeyPredicate::Eq(_, v) | KeyPredicate::After(_, v) => v,
        }
    }

    fn operator(&self) -> &'static str {
        match self {
            KeyPredicate::Eq(..) => "=",
            KeyPredicate::After(..) => ">",
        }
    }
}

/// A point lookup of a single projection row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowLookup {
    pub table: Table,
    pub predicates: Vec<KeyPredicate>,
}

impl RowLookup {
    /// Render `SELECT <columns> FROM <table> WHERE ... LIMIT 1` with every
    /// value bound as a parameter.
    pub fn bind(&self) -> Result<BoundStatement, StoreError> {
        let def = self.table.def();
        if self.predicates.is_empty() {
            return Err(StoreError::Validation(format!(
                "lookup on {} has no predicates",
                def.name
            )));
        }

        let mut conditions = Vec::with_capacity(self.predicates.len());
        let mut params = Vec::with_capacity(self.predicates.len());
        for pred in &self.predicates {
            let column = def.column(pred.column()).ok_or_else(|| {
                StoreError::Validation(format!(
                    "unknown column {} on {}",
                    pred.column(),
                    def.name
                ))
            })?;
            if !pred.value().fits(column.ty) {
                return Err(StoreError::Validation(format!(
                    "value {} does not fit {}.{}",
                    pred.value(),
                    def.name,
                    column.name
                )));
            }
            conditions.push(format!("{} {} ?", column.name, pred.operator()));
            params.push(pred.value().clone());
        }

        let columns: Vec<&str> = def.columns.iter().map(|c| c.name).collect();
        Ok(BoundStatement {
            text: format!(
                "SELECT {} FROM {} WHERE {} LIMIT 1",
                columns.join(", "),
                def.name,
                conditions.join(" AND ")
            ),
            params,
        })
    }
}

/// Everything known about a ticket before its projection rows are fetched.
#[derive(Debug, Clone)]
pub struct KeyContext<'a> {
    pub ticket_id: &'a str,
    pub agent_id: &'a str,
    pub customer_id: &'a str,
    /// Current priority, i.e. the partition the urgent row lives in
    pub priority: TicketPriority,
    pub created_date: NaiveDate,
}

/// Build the minimal lookup that locates the ticket's row in `table`.
///
/// Returns `None` for tables that hold no copy of the ticket.
pub fn lookup_for(table: Table, ctx: &KeyContext<'_>) -> Option<RowLookup> {
    use KeyPredicate::{After, Eq};

    let ticket = || Eq("ticket_id", ctx.ticket_id.into());
    let predicates = match table {
        Table::TicketByDate => vec![
            Eq("created_date", ctx.created_date.into()),
            ticket(),
            After("created_timestamp", sentinel_timestamp().into()),
        ],
        Table::TicketsByAgentDate => vec![
            Eq("agent_id", ctx.agent_id.into()),
            ticket(),
            After("assigned_date", sentinel_date().into()),
        ],
        Table::TicketsByCustomer => vec![
            Eq("customer_id", ctx.customer_id.into()),
            ticket(),
            After("created_timestamp", sentinel_timestamp().into()),
        ],
        Table::UrgentTicketsByTime => vec![
            Eq("priority_level", ctx.priority.as_str().into()),
            Eq("agent_id", ctx.agent_id.into()),
            ticket(),
            After("created_timestamp", sentinel_timestamp().into()),
        ],
        _ => return None,
    };

    Some(RowLookup { table, predicates })
}

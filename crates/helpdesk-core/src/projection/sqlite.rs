use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use rusqlite::types::Value as SqlValue;
use rusqlite::{params_from_iter, Connection};

use super::schema::{Table, TableDef};
use super::statement::{BoundStatement, Statement};
use super::value::{CellValue, ColumnType, Row};
use super::{RowLookup, WideColumnStore};
use crate::error::StoreError;

/// SQLite-backed emulation of the wide-column keyspace.
///
/// Each table gets its full primary key as a SQLite primary key, so a row can
/// only move partitions by delete + insert. Dates and timestamps are stored as
/// fixed-width text so that range anchors compare correctly.
pub struct SqliteWideColumnStore {
    conn: Mutex<Connection>,
}

impl SqliteWideColumnStore {
    /// Open (or create) a keyspace file and its tables.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn =
            Connection::open(path).map_err(|e| StoreError::Storage(format!("open: {}", e)))?;
        Self::init_with_connection(conn)
    }

    /// Create an in-memory keyspace (for testing).
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| StoreError::Storage(format!("open_in_memory: {}", e)))?;
        Self::init_with_connection(conn)
    }

    fn init_with_connection(conn: Connection) -> Result<Self, StoreError> {
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.create_schema()?;
        Ok(store)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|e| StoreError::Storage(format!("connection poisoned: {}", e)))
    }
}

fn create_table_sql(def: &TableDef) -> String {
    let columns: Vec<String> = def
        .columns
        .iter()
        .map(|c| {
            let ty = match c.ty {
                ColumnType::Int => "INTEGER",
                ColumnType::Text | ColumnType::Date | ColumnType::Timestamp => "TEXT",
            };
            format!("{} {}", c.name, ty)
        })
        .collect();
    let key: Vec<&str> = def.primary_key().collect();
    format!(
        "CREATE TABLE IF NOT EXISTS {} ({}, PRIMARY KEY ({})) WITHOUT ROWID;",
        def.name,
        columns.join(", "),
        key.join(", ")
    )
}

fn to_sql(value: &CellValue) -> SqlValue {
    match value {
        CellValue::Null => SqlValue::Null,
        CellValue::Text(s) => SqlValue::Text(s.clone()),
        CellValue::Int(i) => SqlValue::Integer(*i),
        CellValue::Date(d) => SqlValue::Text(d.format("%Y-%m-%d").to_string()),
        CellValue::Timestamp(t) => SqlValue::Text(t.to_rfc3339_opts(SecondsFormat::Millis, true)),
    }
}

fn from_sql(def: &TableDef, column: &str, ty: ColumnType, raw: SqlValue) -> Result<CellValue, StoreError> {
    let bad = |what: &str| {
        StoreError::Storage(format!("{}.{}: unexpected {}", def.name, column, what))
    };
    match (ty, raw) {
        (_, SqlValue::Null) => Ok(CellValue::Null),
        (ColumnType::Int, SqlValue::Integer(i)) => Ok(CellValue::Int(i)),
        (ColumnType::Text, SqlValue::Text(s)) => Ok(CellValue::Text(s)),
        (ColumnType::Date, SqlValue::Text(s)) => NaiveDate::parse_from_str(&s, "%Y-%m-%d")
            .map(CellValue::Date)
            .map_err(|e| bad(&format!("date {:?} ({})", s, e))),
        (ColumnType::Timestamp, SqlValue::Text(s)) => DateTime::parse_from_rfc3339(&s)
            .map(|t| CellValue::Timestamp(t.with_timezone(&Utc)))
            .map_err(|e| bad(&format!("timestamp {:?} ({})", s, e))),
        (_, other) => Err(bad(&format!("value {:?}", other))),
    }
}

/// Run a bound SELECT and decode every returned row against `def`.
fn query_rows(conn: &Connection, def: &TableDef, bound: &BoundStatement) -> Result<Vec<Row>, StoreError> {
    let mut stmt = conn
        .prepare(&bound.text)
        .map_err(|e| StoreError::Storage(format!("prepare: {} (sql: {})", e, bound.text)))?;
    let width = def.columns.len();
    let raw_rows = stmt
        .query_map(params_from_iter(bound.params.iter().map(to_sql)), |row| {
            (0..width)
                .map(|i| row.get::<_, SqlValue>(i))
                .collect::<rusqlite::Result<Vec<_>>>()
        })
        .map_err(|e| StoreError::Storage(format!("query {}: {}", def.name, e)))?
        .collect::<rusqlite::Result<Vec<_>>>()
        .map_err(|e| StoreError::Storage(format!("rows {}: {}", def.name, e)))?;

    raw_rows
        .into_iter()
        .map(|raw| {
            def.columns
                .iter()
                .zip(raw)
                .map(|(column, value)| {
                    Ok((column.name.to_string(), from_sql(def, column.name, column.ty, value)?))
                })
                .collect::<Result<Row, StoreError>>()
        })
        .collect()
}

impl WideColumnStore for SqliteWideColumnStore {
    fn create_schema(&self) -> Result<(), StoreError> {
        let conn = self.lock()?;
        let ddl: Vec<String> = Table::ALL.iter().map(|t| create_table_sql(t.def())).collect();
        conn.execute_batch(&ddl.join("\n"))
            .map_err(|e| StoreError::Storage(format!("create_schema: {}", e)))?;
        Ok(())
    }

    fn fetch_row(&self, lookup: &RowLookup) -> Result<Option<Row>, StoreError> {
        let bound = lookup.bind()?;
        let conn = self.lock()?;
        let mut rows = query_rows(&conn, lookup.table.def(), &bound)?;
        Ok(if rows.is_empty() { None } else { Some(rows.swap_remove(0)) })
    }

    fn execute(&self, statement: &Statement) -> Result<(), StoreError> {
        let mut bound = statement.bind()?;
        if let Statement::Insert { table, row } = statement {
            // Wide-column inserts are upserts: overwrite the columns given,
            // keep the rest.
            let def = table.def();
            let key: Vec<&str> = def.primary_key().collect();
            let updates: Vec<String> = row
                .keys()
                .filter(|name| !def.is_key_column(name))
                .map(|name| format!("{} = excluded.{}", name, name))
                .collect();
            let action = if updates.is_empty() {
                "DO NOTHING".to_string()
            } else {
                format!("DO UPDATE SET {}", updates.join(", "))
            };
            bound.text = format!("{} ON CONFLICT ({}) {}", bound.text, key.join(", "), action);
        }

        let conn = self.lock()?;
        let changed = conn
            .execute(&bound.text, params_from_iter(bound.params.iter().map(to_sql)))
            .map_err(|e| StoreError::Storage(format!("{}: {}", statement.table(), e)))?;
        if changed == 0 {
            tracing::debug!(table = %statement.table(), sql = %bound.text, "statement matched no rows");
        }
        Ok(())
    }

    fn scan_partition(&self, table: Table, partition: &[CellValue]) -> Result<Vec<Row>, StoreError> {
        let def = table.def();
        if partition.len() != def.partition_key.len() {
            return Err(StoreError::Validation(format!(
                "{}: partition key has {} columns, got {} values",
                def.name,
                def.partition_key.len(),
                partition.len()
            )));
        }
        let columns: Vec<&str> = def.columns.iter().map(|c| c.name).collect();
        let conditions: Vec<String> = def.partition_key.iter().map(|k| format!("{} = ?", k)).collect();
        let mut text = format!(
            "SELECT {} FROM {} WHERE {}",
            columns.join(", "),
            def.name,
            conditions.join(" AND ")
        );
        if !def.clustering_key.is_empty() {
            text.push_str(&format!(" ORDER BY {}", def.clustering_key.join(", ")));
        }
        let bound = BoundStatement {
            text,
            params: partition.to_vec(),
        };
        let conn = self.lock()?;
        query_rows(&conn, def, &bound)
    }
}

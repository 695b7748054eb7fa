use super::schema::{Table, TableDef};
use super::value::{CellValue, Row};
use crate::error::StoreError;

/// A mutation against one wide-column table.
///
/// Column names come from the static table definitions; values are only ever
/// carried as bound parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Statement {
    /// Same-key update of non-key columns
    Update {
        table: Table,
        assignments: Vec<(&'static str, CellValue)>,
        key: Vec<(&'static str, CellValue)>,
    },
    /// Remove the row at a full primary key
    Delete {
        table: Table,
        key: Vec<(&'static str, CellValue)>,
    },
    /// Upsert a full row
    Insert { table: Table, row: Row },
}

/// Statement text with `?` placeholders and its ordered parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundStatement {
    pub text: String,
    pub params: Vec<CellValue>,
}

impl Statement {
    pub fn table(&self) -> Table {
        match self {
            Statement::Update { table, .. }
            | Statement::Delete { table, .. }
            | Statement::Insert { table, .. } => *table,
        }
    }

    /// UPDATE addressed by the primary key values of a fetched row.
    pub fn update_row(
        table: Table,
        assignments: Vec<(&'static str, CellValue)>,
        current: &Row,
    ) -> Result<Self, StoreError> {
        Ok(Statement::Update {
            table,
            assignments,
            key: key_of(table.def(), current)?,
        })
    }

    /// DELETE addressed by the primary key values of a fetched row.
    pub fn delete_row(table: Table, current: &Row) -> Result<Self, StoreError> {
        Ok(Statement::Delete {
            table,
            key: key_of(table.def(), current)?,
        })
    }

    pub fn insert(table: Table, row: Row) -> Self {
        Statement::Insert { table, row }
    }

    /// Render the statement, validating it against the table definition.
    pub fn bind(&self) -> Result<BoundStatement, StoreError> {
        let def = self.table().def();
        match self {
            Statement::Update {
                assignments, key, ..
            } => {
                if assignments.is_empty() {
                    return Err(invalid(def, "update without assignments"));
                }
                let mut params = Vec::new();
                let mut sets = Vec::new();
                for (name, value) in assignments {
                    check_column(def, name, value)?;
                    if def.is_key_column(name) {
                        return Err(invalid(
                            def,
                            &format!("cannot update key column {}, relocate the row", name),
                        ));
                    }
                    sets.push(format!("{} = ?", name));
                    params.push(value.clone());
                }
                let (where_clause, key_params) = bind_key(def, key)?;
                params.extend(key_params);
                Ok(BoundStatement {
                    text: format!("UPDATE {} SET {} WHERE {}", def.name, sets.join(", "), where_clause),
                    params,
                })
            }
            Statement::Delete { key, .. } => {
                let (where_clause, params) = bind_key(def, key)?;
                Ok(BoundStatement {
                    text: format!("DELETE FROM {} WHERE {}", def.name, where_clause),
                    params,
                })
            }
            Statement::Insert { row, .. } => {
                for key in def.primary_key() {
                    if row.get(key).map_or(true, CellValue::is_null) {
                        return Err(invalid(def, &format!("insert without key column {}", key)));
                    }
                }
                let mut names = Vec::with_capacity(row.len());
                let mut params = Vec::with_capacity(row.len());
                for (name, value) in row {
                    let column = check_column(def, name, value)?;
                    names.push(column);
                    params.push(value.clone());
                }
                let placeholders = vec!["?"; names.len()];
                Ok(BoundStatement {
                    text: format!(
                        "INSERT INTO {} ({}) VALUES ({})",
                        def.name,
                        names.join(", "),
                        placeholders.join(", ")
                    ),
                    params,
                })
            }
        }
    }
}

/// Extract the full primary key of `row`, in key order.
pub fn key_of(def: &TableDef, row: &Row) -> Result<Vec<(&'static str, CellValue)>, StoreError> {
    def.primary_key()
        .map(|name| match row.get(name) {
            Some(value) if !value.is_null() => Ok((name, value.clone())),
            _ => Err(invalid(def, &format!("row has no value for key column {}", name))),
        })
        .collect()
}

fn bind_key(
    def: &TableDef,
    key: &[(&'static str, CellValue)],
) -> Result<(String, Vec<CellValue>), StoreError> {
    let expected: Vec<&str> = def.primary_key().collect();
    let given: Vec<&str> = key.iter().map(|(name, _)| *name).collect();
    if expected != given {
        return Err(invalid(
            def,
            &format!("key [{}] does not match primary key [{}]", given.join(", "), expected.join(", ")),
        ));
    }
    let mut conditions = Vec::with_capacity(key.len());
    let mut params = Vec::with_capacity(key.len());
    for (name, value) in key {
        check_column(def, name, value)?;
        conditions.push(format!("{} = ?", name));
        params.push(value.clone());
    }
    Ok((conditions.join(" AND "), params))
}

/// Validate `name` and `value` against the table; returns the declared name.
fn check_column(def: &TableDef, name: &str, value: &CellValue) -> Result<&'static str, StoreError> {
    let column = def
        .column(name)
        .ok_or_else(|| invalid(def, &format!("unknown column {}", name)))?;
    if !value.fits(column.ty) {
        return Err(invalid(def, &format!("value {} does not fit column {}", value, name)));
    }
    Ok(column.name)
}

fn invalid(def: &TableDef, message: &str) -> StoreError {
    StoreError::Validation(format!("{}: {}", def.name, message))
}

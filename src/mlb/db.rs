use crate::mlb::error::SinkError;
use crate::mlb::models::Record;

use log::{info, warn};
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, Connection};
use serde_json::{Map, Value};
use std::collections::hash_map::Entry;
use std::collections::{BTreeSet, HashMap};
use std::{path::Path, time::Instant};

/// One flat row as column name to JSON value.
pub type Row = Map<String, Value>;

/// What one `upsert` call did with its rows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpsertSummary {
    pub written: usize,
    /// Rows left out because a conflict key column was null or missing.
    pub dropped: usize,
    /// Earlier rows replaced by a later row with the same conflict key.
    pub collapsed: usize,
}

/// Destination for normalized rows.
///
/// `upsert` takes care of the contract every store shares (empty batches,
/// rows without a conflict key, repeated keys, logging); implementors only
/// write an already validated batch in one round trip.
pub trait UpsertSink {
    fn write_batch(&self, table: &str, rows: &[&Row], conflict_keys: &[&str]) -> Result<usize, SinkError>;

    fn upsert(&self, table: &str, records: &[Row], conflict_keys: &[&str]) -> Result<UpsertSummary, SinkError> {
        if conflict_keys.is_empty() {
            return Err(SinkError::NoConflictKey { table: table.to_string() });
        }
        if records.is_empty() {
            info!("No rows to upsert into {}", table);
            return Ok(UpsertSummary::default());
        }

        let (keyed, unkeyed): (Vec<&Row>, Vec<&Row>) =
            records.iter().partition(|row| has_conflict_key(row, conflict_keys));
        if !unkeyed.is_empty() {
            warn!(
                "Dropping {} of {} rows for {} with a null conflict key ({})",
                unkeyed.len(),
                records.len(),
                table,
                conflict_keys.join(",")
            );
        }
        let mut summary = UpsertSummary { dropped: unkeyed.len(), ..Default::default() };
        if keyed.is_empty() {
            return Ok(summary);
        }

        // one statement may touch each key once
        let unique = collapse_repeated_keys(keyed, conflict_keys);
        summary.collapsed = records.len() - summary.dropped - unique.len();
        if summary.collapsed > 0 {
            warn!(
                "Collapsed {} rows for {} sharing a conflict key with a later row",
                summary.collapsed, table
            );
        }

        info!("Upserting {} rows into {} on ({})", unique.len(), table, conflict_keys.join(","));
        summary.written = self.write_batch(table, &unique, conflict_keys)?;
        info!("{} rows upserted into {}", summary.written, table);
        Ok(summary)
    }
}

pub fn has_conflict_key(row: &Row, conflict_keys: &[&str]) -> bool {
    conflict_keys.iter().all(|key| matches!(row.get(*key), Some(v) if !v.is_null()))
}

fn conflict_key_of(row: &Row, conflict_keys: &[&str]) -> Vec<String> {
    conflict_keys
        .iter()
        .map(|key| row.get(*key).map(Value::to_string).unwrap_or_default())
        .collect()
}

/// Keeps the last row for each conflict key, at the position its key was
/// first seen.
fn collapse_repeated_keys<'r>(rows: Vec<&'r Row>, conflict_keys: &[&str]) -> Vec<&'r Row> {
    let mut positions: HashMap<Vec<String>, usize> = HashMap::with_capacity(rows.len());
    let mut unique: Vec<&Row> = Vec::with_capacity(rows.len());
    for row in rows {
        match positions.entry(conflict_key_of(row, conflict_keys)) {
            Entry::Occupied(seen) => unique[*seen.get()] = row,
            Entry::Vacant(slot) => {
                slot.insert(unique.len());
                unique.push(row);
            }
        }
    }
    unique
}

/// Serializes typed records and upserts them under the record's own table and
/// conflict key.
pub fn upsert_records<R: Record>(sink: &dyn UpsertSink, records: &[R]) -> Result<UpsertSummary, SinkError> {
    let mut rows = Vec::with_capacity(records.len());
    for record in records {
        let value = serde_json::to_value(record).map_err(|source| SinkError::Serialize {
            table: R::TABLE.to_string(),
            rows: records.len(),
            source,
        })?;
        match value {
            Value::Object(row) => rows.push(row),
            other => {
                return Err(SinkError::NotARow {
                    table: R::TABLE.to_string(),
                    rows: records.len(),
                    kind: json_kind(&other),
                })
            }
        }
    }
    sink.upsert(R::TABLE, &rows, R::CONFLICT_KEYS)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Local SQLite mirror of the hosted tables.
pub struct SqliteStore {
    conn: Connection,
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn to_sql_value(value: Option<&Value>) -> SqlValue {
    match value {
        None | Some(Value::Null) => SqlValue::Null,
        Some(Value::Bool(b)) => SqlValue::Integer(*b as i64),
        Some(Value::Number(n)) => match n.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => SqlValue::Real(n.as_f64().unwrap_or(0.0)),
        },
        Some(Value::String(s)) => SqlValue::Text(s.clone()),
        Some(other) => SqlValue::Text(other.to_string()),
    }
}

impl SqliteStore {
    pub fn open<P: AsRef<Path>>(path: P) -> rusqlite::Result<Self> {
        Ok(SqliteStore { conn: Connection::open(path)? })
    }

    #[cfg(test)]
    pub fn open_in_memory() -> rusqlite::Result<Self> {
        Ok(SqliteStore { conn: Connection::open_in_memory()? })
    }

    fn get_db_connection(&self) -> &Connection {
        &self.conn
    }

    pub fn check_table_exists(&self, table_name: &str) -> rusqlite::Result<bool> {
        let db_conn = self.get_db_connection();
        let mut find_table_stmt =
            db_conn.prepare("SELECT name FROM sqlite_master WHERE type='table' AND name=?")?;
        find_table_stmt.exists(params![table_name])
    }

    /// Column types come from the first non-null value seen for each column.
    fn get_create_statement(table_name: &str, columns: &[String], rows: &[&Row], conflict_keys: &[&str]) -> String {
        let mut create_inserts = Vec::with_capacity(columns.len() + 1);
        for col_name in columns {
            let first_non_null = rows.iter().filter_map(|r| r.get(col_name)).find(|v| !v.is_null());
            let col_type = match first_non_null {
                Some(Value::Number(n)) if n.is_i64() || n.is_u64() => " INTEGER",
                Some(Value::Number(_)) => " REAL",
                Some(Value::Bool(_)) => " INTEGER",
                Some(_) => " TEXT",
                None => "",
            };
            create_inserts.push(format!("{}{}", quote_ident(col_name), col_type));
        }
        let key_cols = conflict_keys.iter().map(|k| quote_ident(k)).collect::<Vec<String>>().join(", ");
        create_inserts.push(format!("PRIMARY KEY ({})", key_cols));
        format!("CREATE TABLE IF NOT EXISTS {} ({})", quote_ident(table_name), create_inserts.join(", "))
    }

    fn get_upsert_statement(table_name: &str, columns: &[String], conflict_keys: &[&str]) -> String {
        let col_list = columns.iter().map(|c| quote_ident(c)).collect::<Vec<String>>().join(", ");
        let placeholders = (1..=columns.len()).map(|i| format!("?{}", i)).collect::<Vec<String>>().join(", ");
        let key_cols = conflict_keys.iter().map(|k| quote_ident(k)).collect::<Vec<String>>().join(", ");
        let updates = columns
            .iter()
            .filter(|c| !conflict_keys.contains(&c.as_str()))
            .map(|c| format!("{col} = excluded.{col}", col = quote_ident(c)))
            .collect::<Vec<String>>();
        let on_conflict = if updates.is_empty() {
            "DO NOTHING".to_string()
        } else {
            format!("DO UPDATE SET {}", updates.join(", "))
        };
        format!(
            "INSERT INTO {} ({}) VALUES ({}) ON CONFLICT ({}) {}",
            quote_ident(table_name),
            col_list,
            placeholders,
            key_cols,
            on_conflict
        )
    }

    fn write_rows(&self, table_name: &str, rows: &[&Row], conflict_keys: &[&str]) -> rusqlite::Result<usize> {
        let columns: Vec<String> = rows
            .iter()
            .flat_map(|r| r.keys().cloned())
            .collect::<BTreeSet<String>>()
            .into_iter()
            .collect();

        let db_conn = self.get_db_connection();
        let tx = db_conn.unchecked_transaction()?;
        if !self.check_table_exists(table_name)? {
            tx.execute_batch(&Self::get_create_statement(table_name, &columns, rows, conflict_keys))?;
        }
        let mut written = 0;
        {
            let mut stmt = tx.prepare(&Self::get_upsert_statement(table_name, &columns, conflict_keys))?;
            for row in rows {
                let values = columns.iter().map(|c| to_sql_value(row.get(c)));
                written += stmt.execute(params_from_iter(values))?;
            }
        }
        tx.commit()?;
        Ok(written)
    }

    /// Every stored row of `table_name`, ordered by `order_by`.
    #[cfg(test)]
    pub fn fetch_rows(&self, table_name: &str, order_by: &[&str]) -> rusqlite::Result<Vec<Row>> {
        let order = order_by.iter().map(|c| quote_ident(c)).collect::<Vec<String>>().join(", ");
        let sql = format!("SELECT * FROM {} ORDER BY {}", quote_ident(table_name), order);
        let mut stmt = self.conn.prepare(&sql)?;
        let names: Vec<String> = stmt.column_names().into_iter().map(str::to_string).collect();
        let rows = stmt.query_map([], |r| {
            let mut row = Row::new();
            for (i, name) in names.iter().enumerate() {
                let value = match r.get::<_, SqlValue>(i)? {
                    SqlValue::Null => Value::Null,
                    SqlValue::Integer(v) => Value::from(v),
                    SqlValue::Real(v) => Value::from(v),
                    SqlValue::Text(v) => Value::from(v),
                    SqlValue::Blob(v) => Value::from(v),
                };
                row.insert(name.clone(), value);
            }
            Ok(row)
        })?;
        let stored = rows.collect::<rusqlite::Result<Vec<Row>>>()?;
        Ok(stored)
    }
}

impl UpsertSink for SqliteStore {
    fn write_batch(&self, table: &str, rows: &[&Row], conflict_keys: &[&str]) -> Result<usize, SinkError> {
        let load_start = Instant::now();
        let written = self.write_rows(table, rows, conflict_keys).map_err(|source| SinkError::Sqlite {
            table: table.to_string(),
            rows: rows.len(),
            source,
        })?;
        info!("sqlite upsert into {} took {:?}", table, load_start.elapsed());
        Ok(written)
    }
}

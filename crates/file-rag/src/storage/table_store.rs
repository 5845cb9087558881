//! CSV collections loaded into per-collection SQLite databases
//!
//! Each CSV upload gets its own database file holding a single table named
//! after the file. Reloading drops and recreates the table.

use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{params_from_iter, Connection};
use serde::Serialize;
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use super::file_store::split_extension;

/// A freshly loaded table
#[derive(Debug, Clone, Serialize)]
pub struct LoadedTable {
    /// Database file holding the table
    pub db_path: PathBuf,
    /// Table name derived from the CSV file name
    pub table_name: String,
    /// Rows inserted
    pub rows: usize,
}

/// Rows returned by a query, one JSON object per row
#[derive(Debug, Clone, Default, Serialize)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Map<String, Value>>,
}

impl QueryResult {
    /// The value when the result is exactly one row with one column
    pub fn single_value(&self) -> Option<&Value> {
        if self.columns.len() == 1 && self.rows.len() == 1 {
            self.rows[0].get(&self.columns[0])
        } else {
            None
        }
    }
}

/// Outcome of running generated SQL. Database errors are data, not `Err`.
#[derive(Debug, Clone)]
pub enum QueryOutcome {
    Rows(QueryResult),
    Failed(String),
}

/// Column affinity inferred from CSV values
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnKind {
    Integer,
    Boolean,
    Real,
    Text,
}

impl ColumnKind {
    fn sql_type(&self) -> &'static str {
        match self {
            ColumnKind::Integer | ColumnKind::Boolean => "INTEGER",
            ColumnKind::Real => "REAL",
            ColumnKind::Text => "TEXT",
        }
    }

    fn convert(&self, raw: &str) -> SqlValue {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return SqlValue::Null;
        }
        match self {
            ColumnKind::Integer => trimmed
                .parse::<i64>()
                .map(SqlValue::Integer)
                .unwrap_or_else(|_| SqlValue::Text(raw.to_string())),
            ColumnKind::Boolean => SqlValue::Integer(trimmed.eq_ignore_ascii_case("true") as i64),
            ColumnKind::Real => trimmed
                .parse::<f64>()
                .map(SqlValue::Real)
                .unwrap_or_else(|_| SqlValue::Text(raw.to_string())),
            ColumnKind::Text => SqlValue::Text(raw.to_string()),
        }
    }
}

/// Directory of per-collection CSV databases
#[derive(Debug, Clone)]
pub struct TableStore {
    db_dir: PathBuf,
}

impl TableStore {
    /// Create the store, creating the database directory if needed
    pub fn new(db_dir: impl Into<PathBuf>) -> Result<Self> {
        let db_dir = db_dir.into();
        fs::create_dir_all(&db_dir)?;
        Ok(Self { db_dir })
    }

    /// Database file for a collection
    pub fn db_path(&self, saved_name: &str) -> PathBuf {
        self.db_dir.join(format!("{}.db", saved_name))
    }

    /// Whether the collection's database has been built
    pub fn exists(&self, saved_name: &str) -> bool {
        self.db_path(saved_name).is_file()
    }

    /// Load a CSV file into the collection's database, replacing the table
    pub fn load_csv(&self, csv_path: &Path, saved_name: &str) -> Result<LoadedTable> {
        load_csv_to_sql(csv_path, &self.db_path(saved_name))
    }

    /// Schema description for prompting
    pub fn table_info(&self, saved_name: &str) -> Result<String> {
        table_info(&self.db_path(saved_name))
    }

    /// Run SQL against the collection's database
    pub fn run_query(&self, saved_name: &str, sql: &str) -> QueryOutcome {
        run_query(sql, &self.db_path(saved_name))
    }

    /// Remove the collection's database, returning whether it existed
    pub fn delete(&self, saved_name: &str) -> Result<bool> {
        let path = self.db_path(saved_name);
        if path.exists() {
            fs::remove_file(&path)?;
            return Ok(true);
        }
        Ok(false)
    }
}

/// Table name for a CSV path: file stem with `-` and spaces replaced by `_`
pub fn table_name_for(csv_path: &Path) -> String {
    let file_name = csv_path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let (stem, _) = split_extension(&file_name);
    stem.replace(['-', ' '], "_")
}

/// Read a CSV into `db_path`, dropping any existing table of the same name
pub fn load_csv_to_sql(csv_path: &Path, db_path: &Path) -> Result<LoadedTable> {
    let table_name = table_name_for(csv_path);

    let mut reader = csv::ReaderBuilder::new().flexible(true).from_path(csv_path)?;
    let headers = unique_headers(reader.headers()?.iter());
    if headers.is_empty() {
        return Err(Error::file_parse(
            csv_path.display().to_string(),
            "CSV has no header row",
        ));
    }

    let mut records = Vec::new();
    for record in reader.records() {
        records.push(record?);
    }

    let kinds: Vec<ColumnKind> = (0..headers.len())
        .map(|i| infer_kind(records.iter().filter_map(|r| r.get(i))))
        .collect();

    if let Some(parent) = db_path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut conn = Connection::open(db_path)?;
    let tx = conn.transaction()?;

    let table = quote_ident(&table_name);
    tx.execute_batch(&format!("DROP TABLE IF EXISTS {};", table))?;

    let columns_sql: Vec<String> = headers
        .iter()
        .zip(&kinds)
        .map(|(name, kind)| format!("{} {}", quote_ident(name), kind.sql_type()))
        .collect();
    tx.execute_batch(&format!("CREATE TABLE {} ({});", table, columns_sql.join(", ")))?;

    {
        let placeholders = vec!["?"; headers.len()].join(", ");
        let mut stmt = tx.prepare(&format!("INSERT INTO {} VALUES ({})", table, placeholders))?;
        for record in &records {
            let values = kinds
                .iter()
                .enumerate()
                .map(|(i, kind)| kind.convert(record.get(i).unwrap_or("")));
            stmt.execute(params_from_iter(values))?;
        }
    }
    tx.commit()?;

    tracing::info!(
        "Loaded {} rows into table '{}' ({})",
        records.len(),
        table_name,
        db_path.display()
    );

    Ok(LoadedTable {
        db_path: db_path.to_path_buf(),
        table_name,
        rows: records.len(),
    })
}

/// Describe every table: `\nTable: {name}\nColumns: a, b\n`
pub fn table_info(db_path: &Path) -> Result<String> {
    let conn = Connection::open(db_path)?;

    let mut stmt = conn.prepare("SELECT name FROM sqlite_master WHERE type='table'")?;
    let tables: Vec<String> = stmt
        .query_map([], |row| row.get(0))?
        .collect::<rusqlite::Result<_>>()?;

    let mut schema = String::new();
    for name in tables {
        let mut pragma = conn.prepare(&format!("PRAGMA table_info({})", quote_ident(&name)))?;
        let columns: Vec<String> = pragma
            .query_map([], |row| row.get(1))?
            .collect::<rusqlite::Result<_>>()?;
        schema.push_str(&format!("\nTable: {}\nColumns: {}\n", name, columns.join(", ")));
    }

    Ok(schema)
}

/// Run arbitrary SQL; any database error becomes `QueryOutcome::Failed`
pub fn run_query(sql: &str, db_path: &Path) -> QueryOutcome {
    if !db_path.is_file() {
        return QueryOutcome::Failed(format!("database not found: {}", db_path.display()));
    }
    match execute(sql, db_path) {
        Ok(result) => QueryOutcome::Rows(result),
        Err(e) => {
            tracing::warn!("Query failed: {}", e);
            QueryOutcome::Failed(e.to_string())
        }
    }
}

fn execute(sql: &str, db_path: &Path) -> rusqlite::Result<QueryResult> {
    let conn = Connection::open(db_path)?;
    let mut stmt = conn.prepare(sql)?;
    let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();

    let mut rows = Vec::new();
    let mut cursor = stmt.query([])?;
    while let Some(row) = cursor.next()? {
        let mut object = Map::new();
        for (i, column) in columns.iter().enumerate() {
            object.insert(column.clone(), to_json(row.get_ref(i)?));
        }
        rows.push(object);
    }

    Ok(QueryResult { columns, rows })
}

fn to_json(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        ValueRef::Text(t) => Value::String(String::from_utf8_lossy(t).to_string()),
        ValueRef::Blob(b) => Value::String(hex::encode(b)),
    }
}

fn infer_kind<'a>(values: impl Iterator<Item = &'a str>) -> ColumnKind {
    let mut kind: Option<ColumnKind> = None;

    for value in values.map(str::trim).filter(|v| !v.is_empty()) {
        let value_kind = if value.parse::<i64>().is_ok() {
            ColumnKind::Integer
        } else if value.eq_ignore_ascii_case("true") || value.eq_ignore_ascii_case("false") {
            ColumnKind::Boolean
        } else if value.parse::<f64>().is_ok() {
            ColumnKind::Real
        } else {
            return ColumnKind::Text;
        };

        kind = Some(match (kind, value_kind) {
            (None, k) => k,
            (Some(a), b) if a == b => a,
            (Some(ColumnKind::Integer), ColumnKind::Real)
            | (Some(ColumnKind::Real), ColumnKind::Integer) => ColumnKind::Real,
            _ => return ColumnKind::Text,
        });
    }

    kind.unwrap_or(ColumnKind::Text)
}

/// Deduplicate header names (`a`, `a.1`, `a.2`) and name empty ones `Unnamed: {i}`
fn unique_headers<'a>(raw: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut seen: Vec<String> = Vec::new();
    for (i, name) in raw.enumerate() {
        let base = match name.trim() {
            "" => format!("Unnamed: {}", i),
            trimmed => trimmed.to_string(),
        };
        let mut candidate = base.clone();
        let mut suffix = 1;
        while seen.contains(&candidate) {
            candidate = format!("{}.{}", base, suffix);
            suffix += 1;
        }
        seen.push(candidate);
    }
    seen
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

//! SQLite access for the target table.
//!
//! A [`Session`] owns the one connection used by an upload. Storage failures
//! are turned into [`StorageDiagnostic`]s so they can be reported per row.

use std::{fmt, path::Path, sync::LazyLock};

use log::{debug, info};
use regex::Regex;
use rusqlite::{
    Connection, OpenFlags, OptionalExtension, Transaction, ffi,
    types::{ToSql, ToSqlOutput, Value, ValueRef},
};
use serde::Serialize;

use crate::{
    coerce::{FieldValue, TypeClass, format_temporal},
    config::ColumnSpec,
    error::IngestError,
};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetColumn {
    pub name: String,
    #[serde(rename = "type")]
    pub declared_type: String,
    pub type_class: TypeClass,
    pub nullable: bool,
    pub default: Option<String>,
    pub primary_key: bool,
}

impl TargetColumn {
    pub fn new(name: &str, type_class: TypeClass) -> Self {
        Self {
            name: name.to_string(),
            declared_type: type_class.as_str().to_ascii_uppercase(),
            type_class,
            nullable: true,
            default: None,
            primary_key: false,
        }
    }
}

impl From<&ColumnSpec> for TargetColumn {
    fn from(spec: &ColumnSpec) -> Self {
        Self {
            nullable: spec.nullable,
            ..TargetColumn::new(&spec.name, spec.type_class)
        }
    }
}

pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

pub struct Session {
    conn: Connection,
    label: String,
}

impl Session {
    /// Opens an existing database file; a missing file is an error rather
    /// than a fresh empty database.
    pub fn open(path: &Path) -> Result<Self, IngestError> {
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_URI
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let conn = Connection::open_with_flags(path, flags)
            .map_err(|err| IngestError::storage(format!("Opening database {path:?}"), &err))?;
        Self::from_connection(conn, path.display().to_string())
    }

    pub fn open_in_memory() -> Result<Self, IngestError> {
        let conn = Connection::open_in_memory()
            .map_err(|err| IngestError::storage("Opening in-memory database", &err))?;
        Self::from_connection(conn, ":memory:".to_string())
    }

    pub fn from_connection(conn: Connection, label: String) -> Result<Self, IngestError> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")
            .map_err(|err| IngestError::storage("Enabling foreign keys", &err))?;
        debug!("Acquired database session on {label}");
        Ok(Self { conn, label })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn table_exists(&self, table: &str) -> Result<bool, IngestError> {
        self.conn
            .query_row(
                "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1",
                [table],
                |_| Ok(()),
            )
            .optional()
            .map(|found| found.is_some())
            .map_err(|err| IngestError::storage(format!("Looking up table '{table}'"), &err))
    }

    /// Reads the live column list. Fails with a schema error when the table
    /// does not exist.
    pub fn describe_table(&self, table: &str) -> Result<Vec<TargetColumn>, IngestError> {
        if !self.table_exists(table)? {
            return Err(IngestError::Schema {
                table: table.to_string(),
            });
        }
        let context = || format!("Reading columns of '{table}'");
        let mut stmt = self
            .conn
            .prepare(&format!("PRAGMA table_info({})", quote_ident(table)))
            .map_err(|err| IngestError::storage(context(), &err))?;
        let columns = stmt
            .query_map([], |row| {
                let name: String = row.get(1)?;
                let declared_type: String = row.get::<_, Option<String>>(2)?.unwrap_or_default();
                let not_null: i64 = row.get(3)?;
                let default: Option<String> = row.get(4)?;
                let pk: i64 = row.get(5)?;
                Ok(TargetColumn {
                    type_class: TypeClass::from_declared(&declared_type),
                    name,
                    declared_type,
                    nullable: not_null == 0,
                    default,
                    primary_key: pk > 0,
                })
            })
            .map_err(|err| IngestError::storage(context(), &err))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|err| IngestError::storage(context(), &err))?;
        Ok(columns)
    }

    pub fn count_rows(&self, table: &str) -> Result<i64, IngestError> {
        self.conn
            .query_row(
                &format!("SELECT COUNT(*) FROM {}", quote_ident(table)),
                [],
                |row| row.get(0),
            )
            .map_err(|err| IngestError::storage(format!("Counting rows of '{table}'"), &err))
    }

    /// Deletes every row outside any transaction, resets the autoincrement
    /// counter and verifies the table is empty afterwards.
    pub fn clear_table(&self, table: &str) -> Result<usize, IngestError> {
        let clear_failed = |err: rusqlite::Error| {
            let diagnostic = StorageDiagnostic::from_error(&err);
            IngestError::Clear {
                table: table.to_string(),
                reason: diagnostic.message.clone(),
                diagnostic: Some(diagnostic),
            }
        };
        let deleted = self
            .conn
            .execute(&format!("DELETE FROM {}", quote_ident(table)), [])
            .map_err(clear_failed)?;
        if self.table_exists("sqlite_sequence")? {
            self.conn
                .execute("DELETE FROM sqlite_sequence WHERE name = ?1", [table])
                .map_err(clear_failed)?;
        }
        let remaining = self.count_rows(table)?;
        if remaining != 0 {
            return Err(IngestError::Clear {
                table: table.to_string(),
                reason: format!("{remaining} row(s) remained after delete"),
                diagnostic: None,
            });
        }
        info!("Cleared {deleted} existing row(s) from '{table}'");
        Ok(deleted)
    }

    pub fn transaction(&mut self) -> Result<Transaction<'_>, IngestError> {
        self.conn
            .transaction()
            .map_err(|err| IngestError::storage("Starting transaction", &err))
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        debug!("Released database session on {}", self.label);
    }
}

impl ToSql for FieldValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            FieldValue::Null => ToSqlOutput::Owned(Value::Null),
            FieldValue::Number(number) if number.fract() == 0.0 && number.abs() < 9.0e15 => {
                ToSqlOutput::Owned(Value::Integer(*number as i64))
            }
            FieldValue::Number(number) => ToSqlOutput::Owned(Value::Real(*number)),
            FieldValue::Temporal(value) => ToSqlOutput::Owned(Value::Text(format_temporal(value))),
            FieldValue::Boolean(flag) => ToSqlOutput::Owned(Value::Integer(i64::from(*flag))),
            FieldValue::Text(text) => ToSqlOutput::Borrowed(ValueRef::Text(text.as_bytes())),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    NotNull,
    Unique,
    ForeignKey,
    Check,
    DataType,
    UnknownColumn,
    MissingTable,
    Other,
}

/// Storage failure translated for humans, keeping the engine's own text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StorageDiagnostic {
    pub kind: DiagnosticKind,
    pub code: Option<String>,
    pub message: String,
    pub detail: Option<String>,
    pub column: Option<String>,
    pub constraint: Option<String>,
}

impl fmt::Display for StorageDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl StorageDiagnostic {
    pub fn from_error(err: &rusqlite::Error) -> Self {
        match err {
            rusqlite::Error::SqliteFailure(failure, message) => {
                let detail = message.clone().unwrap_or_else(|| failure.to_string());
                Self::classify(failure.extended_code, detail)
            }
            other => Self {
                kind: DiagnosticKind::Other,
                code: None,
                message: other.to_string(),
                detail: None,
                column: None,
                constraint: None,
            },
        }
    }

    fn classify(extended_code: i32, detail: String) -> Self {
        let (kind, code) = match extended_code {
            ffi::SQLITE_CONSTRAINT_NOTNULL => (DiagnosticKind::NotNull, "SQLITE_CONSTRAINT_NOTNULL"),
            ffi::SQLITE_CONSTRAINT_UNIQUE => (DiagnosticKind::Unique, "SQLITE_CONSTRAINT_UNIQUE"),
            ffi::SQLITE_CONSTRAINT_PRIMARYKEY => {
                (DiagnosticKind::Unique, "SQLITE_CONSTRAINT_PRIMARYKEY")
            }
            ffi::SQLITE_CONSTRAINT_FOREIGNKEY => {
                (DiagnosticKind::ForeignKey, "SQLITE_CONSTRAINT_FOREIGNKEY")
            }
            ffi::SQLITE_CONSTRAINT_CHECK => (DiagnosticKind::Check, "SQLITE_CONSTRAINT_CHECK"),
            ffi::SQLITE_CONSTRAINT_DATATYPE => {
                (DiagnosticKind::DataType, "SQLITE_CONSTRAINT_DATATYPE")
            }
            ffi::SQLITE_MISMATCH => (DiagnosticKind::DataType, "SQLITE_MISMATCH"),
            _ if capture(&NO_SUCH_COLUMN, &detail).is_some() => {
                (DiagnosticKind::UnknownColumn, "SQLITE_ERROR")
            }
            _ if capture(&NO_SUCH_TABLE, &detail).is_some() => {
                (DiagnosticKind::MissingTable, "SQLITE_ERROR")
            }
            _ => (DiagnosticKind::Other, ""),
        };

        let column = match kind {
            DiagnosticKind::NotNull => capture(&NOT_NULL_COLUMN, &detail),
            DiagnosticKind::Unique => capture(&UNIQUE_COLUMNS, &detail),
            DiagnosticKind::DataType => capture(&DATATYPE_COLUMN, &detail),
            DiagnosticKind::UnknownColumn => capture(&NO_SUCH_COLUMN, &detail),
            _ => None,
        }
        .map(|qualified| unqualify(&qualified));
        let constraint = match kind {
            DiagnosticKind::Check => capture(&CHECK_CONSTRAINT, &detail),
            DiagnosticKind::Unique | DiagnosticKind::ForeignKey | DiagnosticKind::NotNull => {
                Some(code.trim_start_matches("SQLITE_CONSTRAINT_").to_ascii_lowercase())
            }
            _ => None,
        };

        let message = human_message(kind, column.as_deref(), &detail);
        Self {
            kind,
            code: (!code.is_empty()).then(|| code.to_string()),
            message,
            detail: Some(detail),
            column,
            constraint,
        }
    }
}

fn human_message(kind: DiagnosticKind, column: Option<&str>, detail: &str) -> String {
    let column = column.unwrap_or("unknown");
    match kind {
        DiagnosticKind::NotNull => format!("Required field is empty: {column}"),
        DiagnosticKind::Unique => format!("Duplicate value: {detail}"),
        DiagnosticKind::ForeignKey => {
            "Foreign key violation: value does not exist in the referenced table".to_string()
        }
        DiagnosticKind::Check => format!("Value rejected by check constraint: {detail}"),
        DiagnosticKind::DataType => format!("Wrong data type for column {column}: {detail}"),
        DiagnosticKind::UnknownColumn => format!("Column does not exist in the table: {column}"),
        DiagnosticKind::MissingTable => format!("Table does not exist: {detail}"),
        DiagnosticKind::Other => detail.to_string(),
    }
}

static NO_SUCH_COLUMN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"has no column named (\S+)").expect("Invalid column regex"));
static NO_SUCH_TABLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"no such table: (\S+)").expect("Invalid table regex"));
static NOT_NULL_COLUMN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"NOT NULL constraint failed: (\S+)").expect("Invalid NOT NULL regex")
});
static UNIQUE_COLUMNS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"constraint failed: (.+)$").expect("Invalid UNIQUE regex"));
static DATATYPE_COLUMN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"value in \w+ column (\S+)").expect("Invalid datatype regex"));
static CHECK_CONSTRAINT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"CHECK constraint failed: (.+)$").expect("Invalid CHECK regex")
});

fn capture(regex: &Regex, text: &str) -> Option<String> {
    regex
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|found| found.as_str().trim().to_string())
}

// "hoja1.mes" -> "mes"; lists such as "t.a, t.b" become "a, b".
fn unqualify(qualified: &str) -> String {
    qualified
        .split(',')
        .map(|part| {
            let part = part.trim();
            part.rsplit_once('.').map_or(part, |(_, column)| column)
        })
        .collect::<Vec<_>>()
        .join(", ")
}

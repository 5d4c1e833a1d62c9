//! Replace-load of coerced rows into the target table.
//!
//! The load walks `Validating -> Clearing -> Inserting -> Committed`, or ends
//! in `Aborted`. Clearing runs in autocommit mode and cannot be undone; all
//! inserts share one transaction that is rolled back on any abort.

use std::{
    fmt,
    sync::atomic::{AtomicBool, Ordering},
};

use itertools::Itertools;
use log::{debug, info, warn};
use rusqlite::{Transaction, params_from_iter};
use serde::Serialize;

use crate::{
    coerce::{FieldValue, TypeClass, coerce, enforce_numeric},
    config::{IngestConfig, InsertPolicy},
    error::IngestError,
    mapping::ColumnMapping,
    sheet::SheetRow,
    store::{Session, StorageDiagnostic, TargetColumn, quote_ident},
};

const LOUD_FAILURES: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadState {
    Idle,
    Validating,
    Clearing,
    Inserting,
    Committed,
    Aborted,
}

impl fmt::Display for LoadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            LoadState::Idle => "idle",
            LoadState::Validating => "validating",
            LoadState::Clearing => "clearing",
            LoadState::Inserting => "inserting",
            LoadState::Committed => "committed",
            LoadState::Aborted => "aborted",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum LoadEvent {
    StateChanged(LoadState),
    Progress {
        inserted: usize,
        processed: usize,
        total: usize,
    },
    RowFailed(RowFailure),
}

/// One rejected data row, numbered as in the spreadsheet.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RowFailure {
    pub row: usize,
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column: Option<String>,
}

impl RowFailure {
    fn new(row: usize, diagnostic: &StorageDiagnostic) -> Self {
        Self {
            row,
            error: diagnostic.message.clone(),
            code: diagnostic.code.clone(),
            detail: diagnostic.detail.clone(),
            column: diagnostic.column.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadResult {
    pub total_rows: usize,
    pub inserted_rows: usize,
    pub error_rows: usize,
    #[serde(rename = "recordsInDB")]
    pub records_in_db: i64,
    pub errors: Vec<RowFailure>,
}

struct PlannedColumn {
    index: usize,
    target: String,
    class: TypeClass,
    strict_numeric: bool,
}

/// Which spreadsheet column feeds which target column, and how to coerce it.
struct LoadPlan {
    columns: Vec<PlannedColumn>,
}

impl LoadPlan {
    fn new(config: &IngestConfig, targets: &[TargetColumn], mapping: &ColumnMapping) -> Self {
        let columns = mapping
            .mapped
            .iter()
            .map(|mapped| {
                let class = targets
                    .iter()
                    .find(|target| target.name == mapped.target)
                    .map_or(TypeClass::Text, |target| target.type_class);
                PlannedColumn {
                    index: mapped.index,
                    target: mapped.target.clone(),
                    class,
                    strict_numeric: config.is_numeric_enforced(&mapped.target),
                }
            })
            .collect();
        Self { columns }
    }

    fn insert_sql(&self, table: &str) -> String {
        let names = self
            .columns
            .iter()
            .map(|column| quote_ident(&column.target))
            .join(", ");
        let placeholders = (1..=self.columns.len()).map(|n| format!("?{n}")).join(", ");
        format!(
            "INSERT INTO {} ({names}) VALUES ({placeholders})",
            quote_ident(table)
        )
    }

    fn values(&self, row: &SheetRow) -> Vec<FieldValue> {
        self.columns
            .iter()
            .map(|column| {
                let value = coerce(row.cell(column.index), column.class);
                if column.strict_numeric {
                    enforce_numeric(value)
                } else {
                    value
                }
            })
            .collect()
    }
}

#[derive(Default)]
struct Tally {
    inserted: usize,
    error_rows: usize,
    errors: Vec<RowFailure>,
}

type ProgressFn<'a> = Box<dyn Fn(&LoadEvent) + 'a>;

pub struct BulkLoader<'a> {
    config: &'a IngestConfig,
    progress: Option<ProgressFn<'a>>,
    cancel: Option<&'a AtomicBool>,
}

impl<'a> BulkLoader<'a> {
    pub fn new(config: &'a IngestConfig) -> Self {
        Self {
            config,
            progress: None,
            cancel: None,
        }
    }

    pub fn with_progress<F>(mut self, on_event: F) -> Self
    where
        F: Fn(&LoadEvent) + 'a,
    {
        self.progress = Some(Box::new(on_event));
        self
    }

    /// Rows are checked against the flag one at a time; once it is set the
    /// insert transaction is rolled back.
    pub fn with_cancel_flag(mut self, flag: &'a AtomicBool) -> Self {
        self.cancel = Some(flag);
        self
    }

    pub fn run(
        &self,
        session: &mut Session,
        targets: &[TargetColumn],
        mapping: &ColumnMapping,
        rows: &[SheetRow],
    ) -> Result<LoadResult, IngestError> {
        let table = self.config.table.as_str();
        self.enter(LoadState::Idle);

        self.enter(LoadState::Validating);
        if mapping.is_empty() {
            return self.abort(IngestError::Mapping {
                headers: mapping.unmapped.iter().map(|c| c.header.clone()).collect(),
                target_columns: targets.iter().map(|t| t.name.clone()).collect(),
                unmapped: mapping.unmapped.clone(),
            });
        }
        match session.table_exists(table) {
            Ok(true) => {}
            Ok(false) => {
                return self.abort(IngestError::Schema {
                    table: table.to_string(),
                });
            }
            Err(err) => return self.abort(err),
        }
        if self.cancelled() {
            return self.abort(IngestError::Cancelled { processed: 0 });
        }

        self.enter(LoadState::Clearing);
        if let Err(err) = session.clear_table(table) {
            return self.abort(err);
        }

        self.enter(LoadState::Inserting);
        let plan = LoadPlan::new(self.config, targets, mapping);
        let tx = match session.transaction() {
            Ok(tx) => tx,
            Err(err) => return self.abort(err),
        };
        let tally = match self.insert_rows(&tx, &plan, rows) {
            Ok(tally) => tally,
            Err(err) => {
                if tx.is_autocommit() {
                    debug!("Transaction already ended by the database; nothing to roll back");
                } else if let Err(rollback) = tx.rollback() {
                    warn!("Rollback after aborted load failed: {rollback}");
                } else {
                    info!("Rolled back inserts into '{table}'");
                }
                return self.abort(err);
            }
        };
        if let Err(err) = tx.commit() {
            return self.abort(IngestError::storage("Committing inserts", &err));
        }

        self.enter(LoadState::Committed);
        let records_in_db = committed_count(session, table, tally.inserted);
        if records_in_db != tally.inserted as i64 {
            warn!(
                "Table '{table}' holds {records_in_db} row(s) after commit but {} were inserted",
                tally.inserted
            );
        }
        info!(
            "Loaded {} of {} row(s) into '{table}' ({} failed)",
            tally.inserted,
            rows.len(),
            tally.error_rows
        );
        Ok(LoadResult {
            total_rows: rows.len(),
            inserted_rows: tally.inserted,
            error_rows: tally.error_rows,
            records_in_db,
            errors: tally.errors,
        })
    }

    fn insert_rows(
        &self,
        tx: &Transaction<'_>,
        plan: &LoadPlan,
        rows: &[SheetRow],
    ) -> Result<Tally, IngestError> {
        let sql = plan.insert_sql(&self.config.table);
        debug!("Insert statement: {sql}");
        let mut stmt = tx
            .prepare(&sql)
            .map_err(|err| IngestError::storage("Preparing insert statement", &err))?;

        let total = rows.len();
        let every = self.config.progress_every.max(1);
        let mut tally = Tally::default();

        for (position, row) in rows.iter().enumerate() {
            if self.cancelled() {
                info!("Cancellation requested after {position} row(s)");
                return Err(IngestError::Cancelled {
                    processed: position,
                });
            }

            let values = plan.values(row);
            match stmt.execute(params_from_iter(values.iter())) {
                Ok(_) => tally.inserted += 1,
                Err(err) => {
                    let diagnostic = StorageDiagnostic::from_error(&err);
                    tally.error_rows += 1;
                    if tally.error_rows <= LOUD_FAILURES {
                        warn!("Row {} rejected: {}", row.line, diagnostic.message);
                    } else {
                        debug!("Row {} rejected: {}", row.line, diagnostic.message);
                    }
                    let failure = RowFailure::new(row.line, &diagnostic);
                    self.emit(LoadEvent::RowFailed(failure.clone()));
                    if tally.errors.len() < self.config.error_report_limit {
                        tally.errors.push(failure);
                    }

                    if tx.is_autocommit() {
                        return Err(IngestError::TransactionState {
                            row: row.line,
                            diagnostic,
                        });
                    }
                    if position == 0 && self.config.insert_policy == InsertPolicy::FirstRowProbe {
                        return Err(IngestError::FirstRow {
                            row: row.line,
                            diagnostic,
                        });
                    }
                    if tally.error_rows > self.config.max_row_errors {
                        return Err(IngestError::Threshold {
                            error_rows: tally.error_rows,
                            limit: self.config.max_row_errors,
                            last: diagnostic,
                        });
                    }
                }
            }

            let processed = position + 1;
            if processed % every == 0 || processed == total {
                self.emit(LoadEvent::Progress {
                    inserted: tally.inserted,
                    processed,
                    total,
                });
            }
        }
        Ok(tally)
    }

    fn cancelled(&self) -> bool {
        self.cancel
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
    }

    fn enter(&self, state: LoadState) {
        debug!("Load state -> {state}");
        self.emit(LoadEvent::StateChanged(state));
    }

    fn abort(&self, err: IngestError) -> Result<LoadResult, IngestError> {
        warn!("Load aborted: {err}");
        self.enter(LoadState::Aborted);
        Err(err)
    }

    fn emit(&self, event: LoadEvent) {
        if let Some(on_event) = &self.progress {
            on_event(&event);
        }
    }
}

/// Row count after commit. The load is already durable at this point, so a
/// failing count falls back to the number of rows inserted.
fn committed_count(session: &Session, table: &str, inserted: usize) -> i64 {
    match session.count_rows(table) {
        Ok(count) => count,
        Err(err) => {
            warn!("Could not count rows of '{table}' after commit: {err}");
            inserted as i64
        }
    }
}

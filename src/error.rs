use thiserror::Error;

use crate::{mapping::UnmappedColumn, store::StorageDiagnostic};

/// Problems with the uploaded file itself. Nothing touches the database
/// while these are possible.
#[derive(Debug, Error)]
pub enum InputError {
    #[error("no file was provided")]
    MissingFile,
    #[error("unsupported file type '{name}': only .xlsx, .xls and .xlsm workbooks are accepted")]
    UnsupportedFileType { name: String },
    #[error("file is {size} bytes, above the {limit} byte upload limit")]
    FileTooLarge { size: usize, limit: usize },
    #[error("the workbook has no rows")]
    EmptyFile,
    #[error("the sheet has a header row but no data rows")]
    NoData,
    #[error("could not read workbook: {0}")]
    Unreadable(String),
}

impl InputError {
    pub fn code(&self) -> &'static str {
        match self {
            InputError::MissingFile => "MISSING_FILE",
            InputError::UnsupportedFileType { .. } => "UNSUPPORTED_FILE_TYPE",
            InputError::FileTooLarge { .. } => "FILE_TOO_LARGE",
            InputError::EmptyFile => "EMPTY_FILE",
            InputError::NoData => "NO_DATA",
            InputError::Unreadable(_) => "UNREADABLE_FILE",
        }
    }
}

#[derive(Debug, Error)]
pub enum IngestError {
    #[error(transparent)]
    Input(#[from] InputError),

    #[error("none of the {} spreadsheet columns match a column of the target table", .headers.len())]
    Mapping {
        headers: Vec<String>,
        target_columns: Vec<String>,
        unmapped: Vec<UnmappedColumn>,
    },

    #[error("target table '{table}' does not exist")]
    Schema { table: String },

    #[error("could not clear table '{table}': {reason}")]
    Clear {
        table: String,
        reason: String,
        diagnostic: Option<StorageDiagnostic>,
    },

    #[error("first data row (sheet row {row}) was rejected: {}", .diagnostic.message)]
    FirstRow {
        row: usize,
        diagnostic: StorageDiagnostic,
    },

    #[error("{error_rows} rows failed, above the limit of {limit}; load rolled back")]
    Threshold {
        error_rows: usize,
        limit: usize,
        last: StorageDiagnostic,
    },

    #[error("transaction was aborted by the database at sheet row {row}: {}", .diagnostic.message)]
    TransactionState {
        row: usize,
        diagnostic: StorageDiagnostic,
    },

    #[error("load cancelled after {processed} row(s); changes rolled back")]
    Cancelled { processed: usize },

    #[error("{context}: {}", .diagnostic.message)]
    Storage {
        context: String,
        diagnostic: StorageDiagnostic,
    },
}

impl IngestError {
    pub fn storage(context: impl Into<String>, err: &rusqlite::Error) -> Self {
        IngestError::Storage {
            context: context.into(),
            diagnostic: StorageDiagnostic::from_error(err),
        }
    }

    /// Stable machine-readable category.
    pub fn kind(&self) -> &'static str {
        match self {
            IngestError::Input(_) => "InputError",
            IngestError::Mapping { .. } => "MappingError",
            IngestError::Schema { .. } => "SchemaError",
            IngestError::Clear { .. } => "ClearError",
            IngestError::FirstRow { .. } => "RowError",
            IngestError::Threshold { .. } => "ThresholdError",
            IngestError::TransactionState { .. } => "TransactionStateError",
            IngestError::Cancelled { .. } => "Cancelled",
            IngestError::Storage { .. } => "StorageError",
        }
    }

    pub fn diagnostic(&self) -> Option<&StorageDiagnostic> {
        match self {
            IngestError::FirstRow { diagnostic, .. }
            | IngestError::TransactionState { diagnostic, .. }
            | IngestError::Storage { diagnostic, .. } => Some(diagnostic),
            IngestError::Threshold { last, .. } => Some(last),
            IngestError::Clear { diagnostic, .. } => diagnostic.as_ref(),
            _ => None,
        }
    }
}

//! Workbook reading.
//!
//! Only the first worksheet is read. Row 1 is the header row; every later
//! row is a data row unless all of its cells are blank.

use std::{io::Cursor, iter, path::Path, thread};

use calamine::{Data, Reader, open_workbook_auto_from_rs};
use chrono::NaiveDateTime;
use log::debug;

use crate::{
    coerce::{excel_serial_to_datetime, parse_datetime},
    error::InputError,
};

pub const ACCEPTED_EXTENSIONS: &[&str] = &["xlsx", "xls", "xlsm"];
pub const ACCEPTED_MIME_TYPES: &[&str] = &[
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
    "application/vnd.ms-excel",
    "application/vnd.ms-excel.sheet.macroEnabled.12",
];

/// A cell in its natural spreadsheet form. No coercion has happened yet.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Empty,
    Text(String),
    Number(f64),
    Bool(bool),
    DateTime(NaiveDateTime),
}

impl Cell {
    /// Whitespace-only text counts as blank, so such cells load as null.
    pub fn is_blank(&self) -> bool {
        match self {
            Cell::Empty => true,
            Cell::Text(text) => text.trim().is_empty(),
            _ => false,
        }
    }
}

impl From<&Data> for Cell {
    fn from(value: &Data) -> Self {
        match value {
            Data::Empty => Cell::Empty,
            Data::String(text) => Cell::Text(text.clone()),
            Data::Int(number) => Cell::Number(*number as f64),
            Data::Float(number) => Cell::Number(*number),
            Data::Bool(flag) => Cell::Bool(*flag),
            Data::DateTime(serial) => excel_serial_to_datetime(serial.as_f64())
                .map_or_else(|| Cell::Number(serial.as_f64()), Cell::DateTime),
            Data::DateTimeIso(text) => {
                parse_datetime(text).map_or_else(|| Cell::Text(text.clone()), Cell::DateTime)
            }
            Data::DurationIso(text) => Cell::Text(text.clone()),
            Data::Error(err) => Cell::Text(err.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SheetRow {
    /// 1-based row number as shown by spreadsheet applications.
    pub line: usize,
    pub cells: Vec<Cell>,
}

impl SheetRow {
    pub fn cell(&self, index: usize) -> &Cell {
        self.cells.get(index).unwrap_or(&Cell::Empty)
    }

    fn is_blank(&self) -> bool {
        self.cells.iter().all(Cell::is_blank)
    }
}

#[derive(Debug, Clone)]
pub struct Sheet {
    pub name: String,
    pub headers: Vec<String>,
    pub rows: Vec<SheetRow>,
}

impl Sheet {
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
}

pub fn read_workbook(bytes: Vec<u8>) -> Result<Sheet, InputError> {
    if bytes.is_empty() {
        return Err(InputError::MissingFile);
    }
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes))
        .map_err(|err| InputError::Unreadable(err.to_string()))?;
    let name = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or(InputError::EmptyFile)?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or(InputError::EmptyFile)?
        .map_err(|err| InputError::Unreadable(err.to_string()))?;

    // calamine trims leading blank rows and columns off the range; put them
    // back so row 1 stays the header row and column indexes match the sheet.
    let (start_row, start_col) = range
        .start()
        .map(|(row, col)| (row as usize, col as usize))
        .ok_or(InputError::EmptyFile)?;
    let width = start_col + range.width();
    let mut rows = range.rows();
    let (headers, first_line) = if start_row == 0 {
        let first = rows.next().ok_or(InputError::EmptyFile)?;
        let headers: Vec<String> = iter::repeat_n(String::new(), start_col)
            .chain(first.iter().map(header_text))
            .collect();
        (headers, 2)
    } else {
        debug!("Row 1 of sheet '{name}' is blank; data starts at row {}", start_row + 1);
        (vec![String::new(); width], start_row + 1)
    };

    let mut data_rows = Vec::new();
    let mut blank = 0usize;
    for (offset, raw) in rows.enumerate() {
        let mut cells = vec![Cell::Empty; start_col];
        cells.extend(raw.iter().map(Cell::from));
        cells.resize(width, Cell::Empty);
        let row = SheetRow {
            line: first_line + offset,
            cells,
        };
        if row.is_blank() {
            blank += 1;
            continue;
        }
        data_rows.push(row);
    }
    debug!(
        "Sheet '{name}': {} header(s), {} data row(s), {blank} blank row(s) skipped",
        width,
        data_rows.len()
    );

    if data_rows.is_empty() {
        return Err(InputError::NoData);
    }
    Ok(Sheet {
        name,
        headers,
        rows: data_rows,
    })
}

pub fn read_workbook_file(path: &Path) -> Result<Sheet, InputError> {
    let bytes = std::fs::read(path).map_err(|err| InputError::Unreadable(err.to_string()))?;
    read_workbook(bytes)
}

/// Parses the workbook on a worker thread so the caller can prepare the
/// database side meanwhile.
pub fn spawn_read(bytes: Vec<u8>) -> thread::JoinHandle<Result<Sheet, InputError>> {
    thread::spawn(move || read_workbook(bytes))
}

pub fn join_read(
    handle: thread::JoinHandle<Result<Sheet, InputError>>,
) -> Result<Sheet, InputError> {
    handle
        .join()
        .map_err(|_| InputError::Unreadable("workbook reader thread panicked".to_string()))?
}

/// Checks name, declared MIME type and size before any parsing. A file is
/// accepted when either its MIME type or its extension is a spreadsheet one.
pub fn validate_upload(
    name: &str,
    mime: Option<&str>,
    size: usize,
    max_bytes: usize,
) -> Result<(), InputError> {
    if size == 0 {
        return Err(InputError::MissingFile);
    }
    let mime_ok = mime.is_some_and(|mime| {
        ACCEPTED_MIME_TYPES
            .iter()
            .any(|accepted| accepted.eq_ignore_ascii_case(mime.trim()))
    });
    let extension_ok = Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            ACCEPTED_EXTENSIONS
                .iter()
                .any(|accepted| accepted.eq_ignore_ascii_case(ext))
        });
    if !mime_ok && !extension_ok {
        return Err(InputError::UnsupportedFileType {
            name: name.to_string(),
        });
    }
    if size > max_bytes {
        return Err(InputError::FileTooLarge {
            size,
            limit: max_bytes,
        });
    }
    Ok(())
}

fn header_text(value: &Data) -> String {
    match value {
        Data::Empty => String::new(),
        Data::String(text) => text.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_detection_ignores_whitespace() {
        assert!(Cell::Empty.is_blank());
        assert!(Cell::Text("  ".into()).is_blank());
        assert!(!Cell::Number(0.0).is_blank());
        assert!(!Cell::Bool(false).is_blank());
    }

    #[test]
    fn calamine_values_keep_their_natural_form() {
        assert_eq!(Cell::from(&Data::Int(7)), Cell::Number(7.0));
        assert_eq!(Cell::from(&Data::Float(2.5)), Cell::Number(2.5));
        assert_eq!(Cell::from(&Data::String("x".into())), Cell::Text("x".into()));
        assert_eq!(Cell::from(&Data::Bool(true)), Cell::Bool(true));
        assert_eq!(Cell::from(&Data::Empty), Cell::Empty);
        assert!(matches!(
            Cell::from(&Data::DateTimeIso("2024-02-01T10:00:00".into())),
            Cell::DateTime(_)
        ));
    }

    #[test]
    fn missing_cells_read_as_empty() {
        let row = SheetRow {
            line: 2,
            cells: vec![Cell::Number(1.0)],
        };
        assert_eq!(row.cell(5), &Cell::Empty);
    }

    #[test]
    fn upload_accepts_extension_or_mime() {
        assert!(validate_upload("datos.XLSX", None, 10, 100).is_ok());
        assert!(validate_upload("datos.xlsm", None, 10, 100).is_ok());
        assert!(validate_upload("blob.bin", Some("application/vnd.ms-excel"), 10, 100).is_ok());
        assert!(matches!(
            validate_upload("datos.csv", Some("text/csv"), 10, 100),
            Err(InputError::UnsupportedFileType { .. })
        ));
    }

    #[test]
    fn upload_rejects_empty_and_oversized_files() {
        assert!(matches!(
            validate_upload("datos.xlsx", None, 0, 100),
            Err(InputError::MissingFile)
        ));
        assert!(matches!(
            validate_upload("datos.xlsx", None, 101, 100),
            Err(InputError::FileTooLarge { size: 101, limit: 100 })
        ));
    }

    #[test]
    fn garbage_bytes_are_unreadable() {
        let result = read_workbook(b"definitely not a workbook".to_vec());
        assert!(matches!(result, Err(InputError::Unreadable(_))));
    }

    #[test]
    fn no_bytes_means_missing_file() {
        assert!(matches!(read_workbook(Vec::new()), Err(InputError::MissingFile)));
    }
}

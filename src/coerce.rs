use std::{fmt, sync::LazyLock};

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::sheet::Cell;

const EXCEL_EPOCH: (i32, u32, u32) = (1899, 12, 30);
// 9999-12-31 as a spreadsheet serial.
const MAX_EXCEL_SERIAL: f64 = 2_958_466.0;

static LEADING_NUMBER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^-?\d*\.?\d+").expect("valid leading number pattern")
});

/// Semantic class of a target column. Drives how cells are coerced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeClass {
    Numeric,
    Temporal,
    Boolean,
    Text,
}

impl TypeClass {
    /// Classifies a declared SQL column type using SQLite's affinity
    /// conventions, checking the boolean and temporal spellings first since
    /// SQLite itself would give them numeric affinity.
    pub fn from_declared(declared: &str) -> Self {
        let declared = declared.trim().to_ascii_lowercase();
        if declared.contains("bool") {
            TypeClass::Boolean
        } else if declared.contains("date") || declared.contains("time") {
            TypeClass::Temporal
        } else if ["int", "real", "floa", "doub", "num", "dec"]
            .iter()
            .any(|marker| declared.contains(marker))
        {
            TypeClass::Numeric
        } else {
            TypeClass::Text
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TypeClass::Numeric => "numeric",
            TypeClass::Temporal => "temporal",
            TypeClass::Boolean => "boolean",
            TypeClass::Text => "text",
        }
    }
}

impl fmt::Display for TypeClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A cell after coercion, ready to be bound to an insert statement.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Null,
    Number(f64),
    Temporal(NaiveDateTime),
    Boolean(bool),
    Text(String),
}

impl FieldValue {
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            FieldValue::Number(value) => Some(*value),
            _ => None,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Null => Ok(()),
            FieldValue::Number(value) => f.write_str(&format_number(*value)),
            FieldValue::Temporal(value) => f.write_str(&format_temporal(value)),
            FieldValue::Boolean(value) => write!(f, "{value}"),
            FieldValue::Text(value) => f.write_str(value),
        }
    }
}

pub fn coerce(cell: &Cell, class: TypeClass) -> FieldValue {
    if cell.is_blank() {
        return FieldValue::Null;
    }
    match class {
        TypeClass::Numeric => coerce_numeric(cell),
        TypeClass::Temporal => coerce_temporal(cell),
        TypeClass::Boolean => coerce_boolean(cell),
        TypeClass::Text => coerce_text(cell),
    }
}

/// Post-filter for columns that must hold a number or nothing. Anything that
/// is not already a finite number, or a string that parses cleanly as one,
/// becomes null.
pub fn enforce_numeric(value: FieldValue) -> FieldValue {
    match value {
        FieldValue::Number(number) if number.is_finite() => FieldValue::Number(number),
        FieldValue::Text(text) => match text.trim().parse::<f64>() {
            Ok(number) if number.is_finite() => FieldValue::Number(number),
            _ => FieldValue::Null,
        },
        _ => FieldValue::Null,
    }
}

fn coerce_numeric(cell: &Cell) -> FieldValue {
    match cell {
        Cell::Number(value) if value.is_nan() => FieldValue::Null,
        Cell::Number(value) => FieldValue::Number(*value),
        Cell::Text(text) => parse_loose_number(text).map_or(FieldValue::Null, FieldValue::Number),
        Cell::Empty | Cell::Bool(_) | Cell::DateTime(_) => FieldValue::Null,
    }
}

fn coerce_temporal(cell: &Cell) -> FieldValue {
    match cell {
        Cell::DateTime(value) => FieldValue::Temporal(*value),
        Cell::Number(serial) => {
            excel_serial_to_datetime(*serial).map_or(FieldValue::Null, FieldValue::Temporal)
        }
        Cell::Text(text) => parse_datetime(text.trim()).map_or(FieldValue::Null, FieldValue::Temporal),
        Cell::Empty | Cell::Bool(_) => FieldValue::Null,
    }
}

fn coerce_boolean(cell: &Cell) -> FieldValue {
    match cell {
        Cell::Bool(value) => FieldValue::Boolean(*value),
        Cell::Number(value) if value.is_nan() => FieldValue::Null,
        Cell::Number(value) => FieldValue::Boolean(*value != 0.0),
        Cell::Text(text) => FieldValue::Boolean(is_truthy(text)),
        Cell::Empty | Cell::DateTime(_) => FieldValue::Null,
    }
}

fn coerce_text(cell: &Cell) -> FieldValue {
    match cell {
        Cell::Text(text) => FieldValue::Text(text.trim().to_string()),
        Cell::Number(value) if value.is_nan() => FieldValue::Null,
        Cell::Number(value) => FieldValue::Text(format_number(*value)),
        Cell::Bool(value) => FieldValue::Text(value.to_string()),
        Cell::DateTime(value) => FieldValue::Text(format_temporal(value)),
        Cell::Empty => FieldValue::Null,
    }
}

fn is_truthy(text: &str) -> bool {
    matches!(
        text.trim().to_lowercase().as_str(),
        "true" | "1" | "si" | "sí" | "yes"
    )
}

/// Keeps only digits, `.` and `-`, then parses the longest leading number
/// in what is left. Anything after it is ignored.
///
/// Grouping separators are not interpreted: `"1.234,56"` becomes `1.23456`,
/// `"1,234.56"` becomes `1234.56` and `"1.234.567"` becomes `1.234`.
pub fn parse_loose_number(text: &str) -> Option<f64> {
    let cleaned: String = text
        .chars()
        .filter(|ch| ch.is_ascii_digit() || *ch == '.' || *ch == '-')
        .collect();
    LEADING_NUMBER
        .find(&cleaned)?
        .as_str()
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
}

/// Converts a spreadsheet serial (days since 1899-12-30, fraction = time of
/// day) into a timestamp, to millisecond precision.
pub fn excel_serial_to_datetime(serial: f64) -> Option<NaiveDateTime> {
    if !serial.is_finite() || serial.abs() >= MAX_EXCEL_SERIAL {
        return None;
    }
    let (year, month, day) = EXCEL_EPOCH;
    let epoch = NaiveDate::from_ymd_opt(year, month, day)?.and_time(NaiveTime::MIN);
    let millis = (serial * 86_400_000.0).round() as i64;
    epoch.checked_add_signed(TimeDelta::try_milliseconds(millis)?)
}

pub fn parse_datetime(value: &str) -> Option<NaiveDateTime> {
    const DATETIME_FORMATS: &[&str] = &[
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%d/%m/%Y %H:%M:%S",
        "%d/%m/%Y %H:%M",
        "%Y-%m-%d %H:%M",
        "%Y-%m-%dT%H:%M",
    ];
    const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d/%m/%Y", "%Y/%m/%d", "%d-%m-%Y", "%d.%m.%Y"];

    if value.is_empty() {
        return None;
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Some(parsed.naive_local());
    }
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|fmt| NaiveDate::parse_from_str(value, fmt).ok())
                .map(|date| date.and_time(NaiveTime::MIN))
        })
}

/// Integral values print without a fractional part.
pub fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        value.to_string()
    }
}

pub fn format_temporal(value: &NaiveDateTime) -> String {
    if value.time() == NaiveTime::MIN {
        value.format("%Y-%m-%d").to_string()
    } else {
        value.format("%Y-%m-%d %H:%M:%S").to_string()
    }
}

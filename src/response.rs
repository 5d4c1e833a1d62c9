//! JSON documents printed by the upload and structure commands.

use std::collections::BTreeMap;

use chrono::Utc;
use serde::Serialize;

use crate::{
    error::IngestError,
    ingest::UploadOutcome,
    load::RowFailure,
    mapping::UnmappedColumn,
    store::TargetColumn,
};

fn timestamp() -> String {
    Utc::now().to_rfc3339()
}

#[derive(Debug, Serialize)]
pub struct SuccessResponse {
    pub success: bool,
    pub data: UploadData,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadData {
    pub total_rows: usize,
    pub inserted_rows: usize,
    pub error_rows: usize,
    #[serde(rename = "recordsInDB")]
    pub records_in_db: i64,
    pub errors: Vec<RowFailure>,
    pub column_mapping: BTreeMap<usize, String>,
    pub unmapped_columns: Vec<UnmappedColumn>,
    pub timestamp: String,
}

impl From<&UploadOutcome> for SuccessResponse {
    fn from(outcome: &UploadOutcome) -> Self {
        let result = &outcome.result;
        Self {
            success: true,
            data: UploadData {
                total_rows: result.total_rows,
                inserted_rows: result.inserted_rows,
                error_rows: result.error_rows,
                records_in_db: result.records_in_db,
                errors: result.errors.clone(),
                column_mapping: outcome.mapping.index_map(),
                unmapped_columns: outcome.mapping.unmapped.clone(),
                timestamp: timestamp(),
            },
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureResponse {
    pub success: bool,
    pub message: String,
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub constraint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub excel_headers: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub db_columns: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unmapped_columns: Option<Vec<UnmappedColumn>>,
    pub timestamp: String,
}

impl From<&IngestError> for FailureResponse {
    fn from(err: &IngestError) -> Self {
        let diagnostic = err.diagnostic();
        let code = match err {
            IngestError::Input(input) => Some(input.code().to_string()),
            _ => diagnostic.and_then(|diagnostic| diagnostic.code.clone()),
        };
        let mut response = Self {
            success: false,
            message: err.to_string(),
            error: err.kind().to_string(),
            code,
            detail: diagnostic.and_then(|diagnostic| diagnostic.detail.clone()),
            column: diagnostic.and_then(|diagnostic| diagnostic.column.clone()),
            constraint: diagnostic.and_then(|diagnostic| diagnostic.constraint.clone()),
            excel_headers: None,
            db_columns: None,
            unmapped_columns: None,
            timestamp: timestamp(),
        };
        if let IngestError::Mapping {
            headers,
            target_columns,
            unmapped,
        } = err
        {
            response.excel_headers = Some(headers.clone());
            response.db_columns = Some(target_columns.clone());
            response.unmapped_columns = Some(unmapped.clone());
        }
        response
    }
}

#[derive(Debug, Serialize)]
pub struct StructureResponse<'a> {
    pub success: bool,
    pub table: &'a str,
    pub columns: &'a [TargetColumn],
    pub timestamp: String,
}

impl<'a> StructureResponse<'a> {
    pub fn new(table: &'a str, columns: &'a [TargetColumn]) -> Self {
        Self {
            success: true,
            table,
            columns,
            timestamp: timestamp(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::InputError,
        mapping::UnmappedReason,
        store::{DiagnosticKind, StorageDiagnostic},
    };
    use serde_json::Value;

    fn json<T: Serialize>(value: &T) -> Value {
        serde_json::to_value(value).unwrap()
    }

    #[test]
    fn input_failures_carry_their_code() {
        let err = IngestError::from(InputError::EmptyFile);
        let value = json(&FailureResponse::from(&err));
        assert_eq!(value["success"], false);
        assert_eq!(value["error"], "InputError");
        assert_eq!(value["code"], "EMPTY_FILE");
        assert!(value.get("detail").is_none());
    }

    #[test]
    fn mapping_failures_list_headers_and_columns() {
        let err = IngestError::Mapping {
            headers: vec!["Foo".into()],
            target_columns: vec!["id".into(), "mes".into()],
            unmapped: vec![UnmappedColumn {
                index: 0,
                header: "Foo".into(),
                reason: UnmappedReason::NoMatch,
            }],
        };
        let value = json(&FailureResponse::from(&err));
        assert_eq!(value["excelHeaders"][0], "Foo");
        assert_eq!(value["dbColumns"][1], "mes");
        assert_eq!(value["unmappedColumns"][0]["reason"]["kind"], "no_match");
    }

    #[test]
    fn storage_diagnostics_surface_column_and_constraint() {
        let err = IngestError::FirstRow {
            row: 2,
            diagnostic: StorageDiagnostic {
                kind: DiagnosticKind::NotNull,
                code: Some("SQLITE_CONSTRAINT_NOTNULL".into()),
                message: "Required field is empty: pais".into(),
                detail: Some("NOT NULL constraint failed: hoja1.pais".into()),
                column: Some("pais".into()),
                constraint: Some("notnull".into()),
            },
        };
        let value = json(&FailureResponse::from(&err));
        assert_eq!(value["error"], "RowError");
        assert_eq!(value["column"], "pais");
        assert_eq!(value["constraint"], "notnull");
        assert!(value["message"].as_str().unwrap().contains("sheet row 2"));
    }

    #[test]
    fn structure_lists_columns_in_camel_case() {
        let columns = vec![TargetColumn::new("mes", crate::coerce::TypeClass::Numeric)];
        let value = json(&StructureResponse::new("hoja1", &columns));
        assert_eq!(value["table"], "hoja1");
        assert_eq!(value["columns"][0]["name"], "mes");
        assert_eq!(value["columns"][0]["type"], "NUMERIC");
        assert_eq!(value["columns"][0]["typeClass"], "numeric");
        assert_eq!(value["columns"][0]["primaryKey"], false);
    }
}

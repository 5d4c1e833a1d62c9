use log::info;

use crate::{
    config::{IngestConfig, SchemaSource},
    error::IngestError,
    load::{BulkLoader, LoadResult},
    lock::TableLocks,
    mapping::{ColumnMapper, ColumnMapping},
    sheet::{self, Sheet},
    store::{Session, TargetColumn},
};

/// A file as received by the upload surface.
#[derive(Debug, Clone)]
pub struct Upload {
    pub file_name: String,
    pub mime: Option<String>,
    pub bytes: Vec<u8>,
}

#[derive(Debug)]
pub struct UploadOutcome {
    pub sheet_name: String,
    pub headers: Vec<String>,
    pub mapping: ColumnMapping,
    pub result: LoadResult,
}

/// Runs the whole pipeline for one upload: validate, parse, map, load.
pub struct Ingestor<'a> {
    config: &'a IngestConfig,
    locks: &'a TableLocks,
    mapper: ColumnMapper,
}

impl<'a> Ingestor<'a> {
    pub fn new(config: &'a IngestConfig, locks: &'a TableLocks) -> Self {
        Self {
            config,
            locks,
            mapper: ColumnMapper::new(config),
        }
    }

    /// Columns the mapper may target, read fresh for every call.
    pub fn target_columns(&self, session: &Session) -> Result<Vec<TargetColumn>, IngestError> {
        match self.config.schema_source {
            SchemaSource::Introspect => session.describe_table(&self.config.table),
            SchemaSource::Static => Ok(self.config.columns.iter().map(TargetColumn::from).collect()),
        }
    }

    pub fn map_sheet(&self, sheet: &Sheet, targets: &[TargetColumn]) -> Result<ColumnMapping, IngestError> {
        let mapping = self.mapper.map(&sheet.headers, targets);
        if mapping.is_empty() {
            return Err(IngestError::Mapping {
                headers: sheet.headers.clone(),
                target_columns: targets.iter().map(|column| column.name.clone()).collect(),
                unmapped: mapping.unmapped,
            });
        }
        Ok(mapping)
    }

    pub fn upload(
        &self,
        session: &mut Session,
        upload: Upload,
        loader: &BulkLoader<'_>,
    ) -> Result<UploadOutcome, IngestError> {
        sheet::validate_upload(
            &upload.file_name,
            upload.mime.as_deref(),
            upload.bytes.len(),
            self.config.max_upload_bytes,
        )?;
        info!(
            "Received '{}' ({} bytes) for table '{}'",
            upload.file_name,
            upload.bytes.len(),
            self.config.table
        );

        let reader = sheet::spawn_read(upload.bytes);
        let _guard = self.locks.acquire(&self.config.table);
        let targets = self.target_columns(session);
        let sheet = sheet::join_read(reader)?;
        let targets = targets?;
        info!(
            "Sheet '{}': {} column(s), {} data row(s)",
            sheet.name,
            sheet.headers.len(),
            sheet.row_count()
        );

        let mapping = self.map_sheet(&sheet, &targets)?;
        let result = loader.run(session, &targets, &mapping, &sheet.rows)?;
        Ok(UploadOutcome {
            sheet_name: sheet.name,
            headers: sheet.headers,
            mapping,
            result,
        })
    }
}

use anyhow::{Context, Result};
use log::info;
use serde::Serialize;

use crate::{
    cli::MapArgs,
    config::SchemaSource,
    ingest::Ingestor,
    load_config,
    lock::TableLocks,
    mapping::{MappedColumn, UnmappedColumn},
    sheet,
    store::{Session, TargetColumn},
    table::TextTable,
};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct MapReport<'a> {
    sheet: &'a str,
    data_rows: usize,
    target_columns: usize,
    mapped: &'a [MappedColumn],
    unmapped: &'a [UnmappedColumn],
}

pub fn execute(args: &MapArgs) -> Result<()> {
    let config = load_config(&args.target)?;
    let locks = TableLocks::new();
    let ingestor = Ingestor::new(&config, &locks);

    let sheet = sheet::read_workbook_file(&args.file)
        .with_context(|| format!("Reading workbook {:?}", args.file))?;
    let targets: Vec<TargetColumn> = match (&args.db, config.schema_source) {
        (Some(db), SchemaSource::Introspect) => {
            let session = Session::open(db)?;
            ingestor.target_columns(&session)?
        }
        _ => {
            info!("Using the configured column list for '{}'", config.table);
            config.columns.iter().map(TargetColumn::from).collect()
        }
    };

    let mapping = ingestor
        .map_sheet(&sheet, &targets)
        .with_context(|| format!("Mapping headers of {:?}", args.file))?;

    if args.json {
        let report = MapReport {
            sheet: &sheet.name,
            data_rows: sheet.row_count(),
            target_columns: targets.len(),
            mapped: &mapping.mapped,
            unmapped: &mapping.unmapped,
        };
        let document = serde_json::to_string_pretty(&report).context("Serializing mapping")?;
        println!("{document}");
        return Ok(());
    }

    println!(
        "Sheet '{}': {} data row(s); {} of {} header(s) mapped onto {} target column(s).",
        sheet.name,
        sheet.row_count(),
        mapping.len(),
        sheet.headers.len(),
        targets.len()
    );
    let mut table = TextTable::new(["col", "header", "column", "match"]).max_column_width(48);
    for column in &mapping.mapped {
        table.push_row([
            column.index.to_string(),
            column.header.clone(),
            column.target.clone(),
            column.strategy.to_string(),
        ]);
    }
    for column in &mapping.unmapped {
        table.push_row([
            column.index.to_string(),
            column.header.clone(),
            "-".to_string(),
            column.reason.to_string(),
        ]);
    }
    table.print();
    Ok(())
}

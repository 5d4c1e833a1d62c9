use std::fs;

use anyhow::{Context, Result, anyhow};
use log::{debug, info};

use crate::{
    cli::UploadArgs,
    ingest::{Ingestor, Upload, UploadOutcome},
    load::{BulkLoader, LoadEvent},
    load_config,
    lock::{TableFileLock, TableLocks},
    response::{FailureResponse, SuccessResponse},
    store::Session,
    table::TextTable,
};

pub fn execute(args: &UploadArgs) -> Result<()> {
    let mut config = load_config(&args.target)?;
    if let Some(policy) = args.policy {
        config.insert_policy = policy.into();
    }
    if let Some(limit) = args.max_row_errors {
        config.max_row_errors = limit;
    }
    info!(
        "Uploading {:?} into '{}' (policy {}, failure ceiling {})",
        args.file,
        config.table,
        config.insert_policy.as_str(),
        config.max_row_errors
    );

    let bytes = fs::read(&args.file).with_context(|| format!("Reading {:?}", args.file))?;
    let upload = Upload {
        file_name: args
            .file
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default(),
        mime: args.mime.clone(),
        bytes,
    };

    let locks = TableLocks::new();
    let ingestor = Ingestor::new(&config, &locks);
    let loader = BulkLoader::new(&config).with_progress(log_event);
    let outcome = match Session::open(&args.db) {
        Ok(mut session) => {
            // Other trade-ingest processes may be loading the same table.
            let _file_lock = TableFileLock::acquire(&args.db, &config.table)
                .with_context(|| format!("Locking table '{}' of {:?}", config.table, args.db))?;
            ingestor.upload(&mut session, upload, &loader)
        }
        Err(err) => Err(err),
    };

    match outcome {
        Ok(outcome) => {
            if args.json {
                let document = serde_json::to_string_pretty(&SuccessResponse::from(&outcome))
                    .context("Serializing upload result")?;
                println!("{document}");
            } else {
                print_summary(&outcome, &config.table);
            }
            Ok(())
        }
        Err(err) => {
            if args.json {
                let document = serde_json::to_string_pretty(&FailureResponse::from(&err))
                    .context("Serializing upload failure")?;
                println!("{document}");
            }
            Err(anyhow!(err)).with_context(|| format!("Uploading {:?}", args.file))
        }
    }
}

fn log_event(event: &LoadEvent) {
    match event {
        LoadEvent::Progress {
            inserted,
            processed,
            total,
        } => info!("Processed {processed}/{total} row(s), {inserted} inserted"),
        LoadEvent::StateChanged(state) => debug!("Entered state {state}"),
        LoadEvent::RowFailed(_) => {}
    }
}

fn print_summary(outcome: &UploadOutcome, table: &str) {
    let result = &outcome.result;
    println!(
        "Loaded {} of {} row(s) from sheet '{}' into '{table}'; {} failed; table now holds {} row(s).",
        result.inserted_rows,
        result.total_rows,
        outcome.sheet_name,
        result.error_rows,
        result.records_in_db
    );

    let mut mapped = TextTable::new(["col", "header", "column", "match"]).max_column_width(48);
    for column in &outcome.mapping.mapped {
        mapped.push_row([
            column.index.to_string(),
            column.header.clone(),
            column.target.clone(),
            column.strategy.to_string(),
        ]);
    }
    println!();
    mapped.print();

    if !outcome.mapping.unmapped.is_empty() {
        let mut unmapped = TextTable::new(["col", "header", "reason"]).max_column_width(48);
        for column in &outcome.mapping.unmapped {
            unmapped.push_row([
                column.index.to_string(),
                column.header.clone(),
                column.reason.to_string(),
            ]);
        }
        println!();
        unmapped.print();
    }

    if !result.errors.is_empty() {
        let mut failures = TextTable::new(["row", "error"]).max_column_width(96);
        for failure in &result.errors {
            failures.push_row([failure.row.to_string(), failure.error.clone()]);
        }
        println!();
        failures.print();
    }
}

use anyhow::{Context, Result};
use log::info;

use crate::{
    cli::StructureArgs,
    ingest::Ingestor,
    load_config,
    lock::TableLocks,
    response::StructureResponse,
    store::Session,
    table::TextTable,
};

pub fn execute(args: &StructureArgs) -> Result<()> {
    let config = load_config(&args.target)?;
    let session = Session::open(&args.db)?;
    let locks = TableLocks::new();
    let columns = Ingestor::new(&config, &locks)
        .target_columns(&session)
        .with_context(|| format!("Reading structure of '{}'", config.table))?;
    info!("Table '{}' has {} column(s)", config.table, columns.len());

    if args.json {
        let document = serde_json::to_string_pretty(&StructureResponse::new(&config.table, &columns))
            .context("Serializing table structure")?;
        println!("{document}");
        return Ok(());
    }

    let mut table = TextTable::new(["column", "type", "class", "nullable", "default"]).max_column_width(64);
    for column in &columns {
        table.push_row([
            column.name.clone(),
            column.declared_type.clone(),
            column.type_class.to_string(),
            if column.nullable { "yes" } else { "no" }.to_string(),
            column.default.clone().unwrap_or_default(),
        ]);
    }
    table.print();
    Ok(())
}

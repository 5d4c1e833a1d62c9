#![allow(dead_code)]

use std::path::{Path, PathBuf};

use rusqlite::Connection;
use tempfile::{TempDir, tempdir};

/// Cell content for generated workbooks.
#[derive(Debug, Clone, Copy)]
pub enum Val<'a> {
    Text(&'a str),
    Num(f64),
    Bool(bool),
    Blank,
}

pub const HOJA1_DDL: &str = "
    CREATE TABLE hoja1 (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        codigo_del_pais_de_destino TEXT,
        nombre_del_pais_de_destino TEXT NOT NULL,
        gestion INTEGER,
        mes INTEGER,
        fecha_de_embarque DATE,
        es_reexportacion BOOLEAN,
        peso_neto_kg REAL,
        valor_fob_en_dolares_estadounidenses NUMERIC
    );
";

pub const CUSTOMS_HEADERS: [&str; 9] = [
    "Código del país de destino.",
    "Nombre del país de destino.",
    "Gestión",
    "Mes",
    "Fecha de embarque",
    "¿Es reexportación?",
    "Peso neto (kg).",
    "Valor FOB (en dólares estadounidenses).",
    "Observaciones",
];

/// One well-formed customs record. An empty `country` violates NOT NULL.
pub fn customs_row(country: &'static str, month: f64) -> Vec<Val<'static>> {
    vec![
        Val::Text("PE"),
        if country.is_empty() {
            Val::Blank
        } else {
            Val::Text(country)
        },
        Val::Num(2023.0),
        Val::Num(month),
        Val::Num(45_000.0),
        Val::Text("no"),
        Val::Text("1.250,5 kg"),
        Val::Num(9_876.25),
        Val::Text("sin observaciones"),
    ]
}

/// Scratch directory helper that cleans up files automatically on drop.
pub struct TestWorkspace {
    temp_dir: TempDir,
}

impl TestWorkspace {
    pub fn new() -> Self {
        Self {
            temp_dir: tempdir().expect("temp dir"),
        }
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Writes a single-sheet workbook whose first row is `headers`.
    pub fn workbook(&self, name: &str, headers: &[&str], rows: &[Vec<Val<'_>>]) -> PathBuf {
        let header_row: Vec<Val<'_>> = headers.iter().map(|header| Val::Text(header)).collect();
        let mut all = vec![header_row];
        all.extend(rows.iter().cloned());
        self.workbook_with_sheets(name, &[("Sheet1", all)])
    }

    /// Writes one sheet per entry, in order. Rows are written verbatim.
    pub fn workbook_with_sheets(&self, name: &str, sheets: &[(&str, Vec<Vec<Val<'_>>>)]) -> PathBuf {
        let path = self.path().join(name);
        let mut book = umya_spreadsheet::new_file();
        for (position, (sheet_name, rows)) in sheets.iter().enumerate() {
            if position > 0 {
                let _ = book.new_sheet(*sheet_name);
            }
            let lookup = if position == 0 { "Sheet1" } else { *sheet_name };
            let ws = book.get_sheet_by_name_mut(lookup).expect("sheet exists");
            for (r, row) in rows.iter().enumerate() {
                for (c, value) in row.iter().enumerate() {
                    let coordinate = (c as u32 + 1, r as u32 + 1);
                    match value {
                        Val::Text(text) => {
                            ws.get_cell_mut(coordinate).set_value_string(text.to_string());
                        }
                        Val::Num(number) => {
                            ws.get_cell_mut(coordinate).set_value_number(*number);
                        }
                        Val::Bool(flag) => {
                            ws.get_cell_mut(coordinate).set_value_bool(*flag);
                        }
                        Val::Blank => {}
                    }
                }
            }
        }
        umya_spreadsheet::writer::xlsx::write(&book, &path).expect("write workbook");
        path
    }

    /// Creates a SQLite file with the hoja1 table and `stale` pre-existing rows.
    pub fn database(&self, name: &str, stale: usize) -> PathBuf {
        let path = self.path().join(name);
        let conn = Connection::open(&path).expect("open sqlite");
        conn.execute_batch(HOJA1_DDL).expect("create hoja1");
        for n in 0..stale {
            conn.execute(
                "INSERT INTO hoja1 (nombre_del_pais_de_destino, mes) VALUES (?1, ?2)",
                rusqlite::params![format!("stale {n}"), 1],
            )
            .expect("seed stale row");
        }
        path
    }

    pub fn execute(&self, db: &Path, sql: &str) {
        Connection::open(db)
            .expect("open sqlite")
            .execute_batch(sql)
            .expect("run sql");
    }

    pub fn write(&self, name: &str, contents: &[u8]) -> PathBuf {
        let path = self.path().join(name);
        std::fs::write(&path, contents).expect("write temp file");
        path
    }
}

pub fn count_rows(db: &Path, table: &str) -> i64 {
    Connection::open(db)
        .expect("open sqlite")
        .query_row(&format!("SELECT COUNT(*) FROM \"{table}\""), [], |row| row.get(0))
        .expect("count rows")
}

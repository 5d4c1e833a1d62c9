//! Ingestion configuration.
//!
//! Everything that was tuned by hand for the customs table lives here rather
//! than in code: the curated header dictionary, the numeric allow-list, the
//! fuzzy matching knobs and the insertion policy. Files are YAML; every key
//! is optional and falls back to the values the `hoja1` table was built with.

use std::{collections::BTreeMap, fs::File, io::BufReader, path::Path};

use anyhow::{Context, Result, ensure};
use serde::{Deserialize, Serialize};

use crate::coerce::TypeClass;

pub const DEFAULT_TABLE: &str = "hoja1";
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum SchemaSource {
    #[default]
    Introspect,
    Static,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum InsertPolicy {
    /// Keep going past bad rows until the failure ceiling is exceeded.
    #[default]
    Tolerant,
    /// Abort immediately when the first data row is rejected, then behave
    /// like `Tolerant` for the remaining rows.
    FirstRowProbe,
}

impl InsertPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            InsertPolicy::Tolerant => "tolerant",
            InsertPolicy::FirstRowProbe => "first_row_probe",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ColumnSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub type_class: TypeClass,
    #[serde(default = "ColumnSpec::default_nullable")]
    pub nullable: bool,
}

impl ColumnSpec {
    const fn default_nullable() -> bool {
        true
    }

    fn new(name: &str, type_class: TypeClass) -> Self {
        Self {
            name: name.to_string(),
            type_class,
            nullable: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FuzzyConfig {
    pub threshold: f64,
    pub min_keyword_len: usize,
    pub stop_words: Vec<String>,
    pub excluded_columns: Vec<String>,
}

impl Default for FuzzyConfig {
    fn default() -> Self {
        Self {
            threshold: 0.7,
            min_keyword_len: 4,
            stop_words: ["del", "de", "la", "las", "los", "en", "por", "segun", "the", "of", "and"]
                .iter()
                .map(|word| word.to_string())
                .collect(),
            excluded_columns: vec!["id".to_string()],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct IngestConfig {
    pub table: String,
    pub schema_source: SchemaSource,
    pub columns: Vec<ColumnSpec>,
    pub manual_mapping: BTreeMap<String, String>,
    pub numeric_columns: Vec<String>,
    pub fuzzy: FuzzyConfig,
    pub insert_policy: InsertPolicy,
    pub max_row_errors: usize,
    pub error_report_limit: usize,
    pub progress_every: usize,
    pub max_upload_bytes: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            table: DEFAULT_TABLE.to_string(),
            schema_source: SchemaSource::default(),
            columns: default_columns(),
            manual_mapping: default_manual_mapping(),
            numeric_columns: default_numeric_columns(),
            fuzzy: FuzzyConfig::default(),
            insert_policy: InsertPolicy::default(),
            max_row_errors: 50,
            error_report_limit: 10,
            progress_every: 100,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }
}

impl IngestConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("Opening config file {path:?}"))?;
        let reader = BufReader::new(file);
        let config: IngestConfig =
            serde_yaml::from_reader(reader).context("Parsing ingest config YAML")?;
        config.validate()?;
        Ok(config)
    }

    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        self.validate()?;
        let file = File::create(path).with_context(|| format!("Creating config file {path:?}"))?;
        serde_yaml::to_writer(file, self).context("Writing ingest config YAML")
    }

    pub fn to_yaml_string(&self) -> Result<String> {
        serde_yaml::to_string(self).context("Serializing ingest config to YAML")
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(!self.table.trim().is_empty(), "Target table name cannot be empty");
        ensure!(
            self.fuzzy.threshold > 0.0 && self.fuzzy.threshold <= 1.0,
            "Fuzzy threshold must be within (0, 1], got {}",
            self.fuzzy.threshold
        );
        ensure!(
            self.progress_every > 0,
            "progress_every must be at least 1"
        );
        ensure!(
            self.max_upload_bytes > 0,
            "max_upload_bytes must be positive"
        );
        if self.schema_source == SchemaSource::Static {
            ensure!(
                !self.columns.is_empty(),
                "schema_source 'static' requires a non-empty column list"
            );
        }
        Ok(())
    }

    pub fn is_numeric_enforced(&self, column: &str) -> bool {
        self.numeric_columns
            .iter()
            .any(|candidate| candidate.eq_ignore_ascii_case(column))
    }
}

fn default_columns() -> Vec<ColumnSpec> {
    use TypeClass::{Numeric, Text};
    let mut columns = vec![ColumnSpec {
        name: "id".to_string(),
        type_class: Numeric,
        nullable: false,
    }];
    columns.extend(
        [
            ("codigo_de_la_aduana_de_despacho", Text),
            ("descripcion_de_la_aduana_de_despacho", Text),
            ("gestion", Numeric),
            ("mes", Numeric),
            ("tipo_de_operacion_exportacion_reexportacion_o_efectos_personale", Text),
            ("codigo_arancelario_nandina_norma_de_clasificacion_de_productos_", Text),
            ("descripcion_del_producto_segun_codigo_nandina", Text),
            ("capitulo_de_la_clasificacion_nandina_primeros_2_digitos", Text),
            ("descripcion_del_capitulo_nandina", Text),
            ("seccion_de_la_clasificacion_nandina", Text),
            ("descripcion_de_la_seccion_nandina", Text),
            ("codigo_del_pais_de_destino", Text),
            ("nombre_del_pais_de_destino", Text),
            ("codigo_de_zona_geoeconomica", Text),
            ("descripcion_de_zona_geoeconomica_can_mercosur_nafta_etc", Text),
            ("medi", Text),
            ("descripcion_del_medio_de_transporte_aereo_terrestre_maritimo_et", Text),
            ("codigo_de_la_via_de_salida_puerto_aeropuerto_frontera", Text),
            ("descripcion_de_la_via_de_salida", Text),
            ("codigo_del_departamento_de_origen", Text),
            ("descripcion_del_departamento_de_origen", Text),
            ("cuci3", Text),
            ("descuci3", Text),
            ("gce3", Text),
            ("desgce3", Text),
            ("ciiur3", Text),
            ("descripcion_de_la_clasificacion_ciiu_rev3", Text),
            ("clasificacion_por_actividad_economica_texto", Text),
            ("codact2", Text),
            ("descripcion_del_producto_segun_actividad_economica", Text),
            ("tnt", Text),
            ("destnt", Text),
            ("cltnt", Text),
            ("peso_bruto_kg", Numeric),
            ("peso_neto_kg", Numeric),
            ("contenido_fino_en_caso_de_minerales_u_otros_productos_que_requi", Numeric),
            ("valor_fob_en_dolares_estadounidenses", Numeric),
        ]
        .into_iter()
        .map(|(name, class)| ColumnSpec::new(name, class)),
    );
    columns
}

fn default_numeric_columns() -> Vec<String> {
    [
        "gestion",
        "mes",
        "peso_bruto_kg",
        "peso_neto_kg",
        "contenido_fino_en_caso_de_minerales_u_otros_productos_que_requi",
        "valor_fob_en_dolares_estadounidenses",
    ]
    .iter()
    .map(|name| name.to_string())
    .collect()
}

// Long narrative headers of the customs export. Their database identifiers
// were truncated to 63 bytes, which no similarity rule can recover.
fn default_manual_mapping() -> BTreeMap<String, String> {
    [
        ("Código de la aduana de despacho", "codigo_de_la_aduana_de_despacho"),
        ("Descripción de la aduana de despacho", "descripcion_de_la_aduana_de_despacho"),
        ("Gestión", "gestion"),
        ("Mes", "mes"),
        (
            "Tipo de operación: exportación, reexportación o efectos personales.",
            "tipo_de_operacion_exportacion_reexportacion_o_efectos_personale",
        ),
        (
            "Código arancelario NANDINA (norma de clasificación de productos en la CAN).",
            "codigo_arancelario_nandina_norma_de_clasificacion_de_productos_",
        ),
        (
            "Descripción del producto según código NANDINA.",
            "descripcion_del_producto_segun_codigo_nandina",
        ),
        (
            "Capítulo de la clasificación NANDINA (primeros 2 dígitos).",
            "capitulo_de_la_clasificacion_nandina_primeros_2_digitos",
        ),
        ("Descripción del capítulo NANDINA.", "descripcion_del_capitulo_nandina"),
        ("Sección de la clasificación NANDINA.", "seccion_de_la_clasificacion_nandina"),
        ("Descripción de la sección NANDINA.", "descripcion_de_la_seccion_nandina"),
        ("Código del país de destino.", "codigo_del_pais_de_destino"),
        ("Nombre del país de destino.", "nombre_del_pais_de_destino"),
        ("Código de zona geoeconómica.", "codigo_de_zona_geoeconomica"),
        (
            "Descripción de zona geoeconómica (CAN, MERCOSUR, NAFTA, etc.).",
            "descripcion_de_zona_geoeconomica_can_mercosur_nafta_etc",
        ),
        ("MEDI", "medi"),
        (
            "Descripción del medio de transporte (aéreo, terrestre, marítimo, etc.).",
            "descripcion_del_medio_de_transporte_aereo_terrestre_maritimo_et",
        ),
        (
            "Código de la vía de salida (puerto, aeropuerto, frontera).",
            "codigo_de_la_via_de_salida_puerto_aeropuerto_frontera",
        ),
        ("Descripción de la vía de salida.", "descripcion_de_la_via_de_salida"),
        ("Código del departamento de origen.", "codigo_del_departamento_de_origen"),
        (
            "Descripción del departamento de origen.",
            "descripcion_del_departamento_de_origen",
        ),
        ("CUCI3", "cuci3"),
        ("DESCUCI3", "descuci3"),
        ("GCE3", "gce3"),
        ("DESGCE3", "desgce3"),
        ("CIIUR3", "ciiur3"),
        (
            "Descripción de la clasificación CIIU Rev.3.",
            "descripcion_de_la_clasificacion_ciiu_rev3",
        ),
        (
            "Clasificación por actividad económica (texto).",
            "clasificacion_por_actividad_economica_texto",
        ),
        ("CODACT2", "codact2"),
        (
            "Descripción del producto según actividad económica.",
            "descripcion_del_producto_segun_actividad_economica",
        ),
        ("TNT", "tnt"),
        ("DESTNT", "destnt"),
        ("CLTNT", "cltnt"),
        ("Peso bruto (kg).", "peso_bruto_kg"),
        ("Peso neto (kg).", "peso_neto_kg"),
        (
            "Contenido fino (en caso de minerales u otros productos que requieran pureza).",
            "contenido_fino_en_caso_de_minerales_u_otros_productos_que_requi",
        ),
        (
            "Valor FOB (en dólares estadounidenses).",
            "valor_fob_en_dolares_estadounidenses",
        ),
    ]
    .into_iter()
    .map(|(header, column)| (header.to_string(), column.to_string()))
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_yaml_yields_defaults() {
        let config: IngestConfig = serde_yaml::from_str("{}").unwrap();
        assert_eq!(config, IngestConfig::default());
        assert_eq!(config.table, "hoja1");
        assert_eq!(config.insert_policy, InsertPolicy::Tolerant);
        assert_eq!(config.max_row_errors, 50);
        assert_eq!(config.manual_mapping.len(), 37);
    }

    #[test]
    fn partial_yaml_overrides_selected_keys() {
        let yaml = "table: exports\ninsert_policy: first_row_probe\nfuzzy:\n  threshold: 0.5\n";
        let config: IngestConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.table, "exports");
        assert_eq!(config.insert_policy, InsertPolicy::FirstRowProbe);
        assert_eq!(config.fuzzy.threshold, 0.5);
        assert_eq!(config.fuzzy.min_keyword_len, 4);
        assert!(config.fuzzy.excluded_columns.contains(&"id".to_string()));
    }

    #[test]
    fn static_columns_parse_type_classes() {
        let yaml = "schema_source: static\ncolumns:\n  - name: amount\n    type: numeric\n  - name: shipped\n    type: temporal\n    nullable: false\n";
        let config: IngestConfig = serde_yaml::from_str(yaml).unwrap();
        config.validate().unwrap();
        assert_eq!(config.columns.len(), 2);
        assert_eq!(config.columns[0].type_class, TypeClass::Numeric);
        assert!(config.columns[0].nullable);
        assert!(!config.columns[1].nullable);
    }

    #[test]
    fn rejects_out_of_range_threshold() {
        let mut config = IngestConfig::default();
        config.fuzzy.threshold = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn numeric_allow_list_is_case_insensitive() {
        let config = IngestConfig::default();
        assert!(config.is_numeric_enforced("PESO_NETO_KG"));
        assert!(!config.is_numeric_enforced("medi"));
    }

    #[test]
    fn yaml_round_trip_preserves_dictionary() {
        let config = IngestConfig::default();
        let yaml = config.to_yaml_string().unwrap();
        let parsed: IngestConfig = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed.manual_mapping, config.manual_mapping);
    }
}

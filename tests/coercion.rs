use chrono::{NaiveDate, NaiveDateTime};
use proptest::prelude::*;
use trade_ingest::{
    coerce::{FieldValue, TypeClass, coerce, enforce_numeric, parse_loose_number},
    sheet::Cell,
};

const ALL_CLASSES: [TypeClass; 4] = [
    TypeClass::Numeric,
    TypeClass::Temporal,
    TypeClass::Boolean,
    TypeClass::Text,
];

fn at(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(y, m, d)
        .unwrap()
        .and_hms_opt(h, min, s)
        .unwrap()
}

#[test]
fn blank_cells_are_null_for_every_class() {
    for class in ALL_CLASSES {
        for cell in [
            Cell::Empty,
            Cell::Text(String::new()),
            Cell::Text("  \t ".to_string()),
        ] {
            assert_eq!(coerce(&cell, class), FieldValue::Null, "{class} {cell:?}");
        }
    }
}

#[test]
fn customs_text_values_become_numbers() {
    let cases = [
        ("1.250,5 kg", 1.2505),
        ("USD 9876.25", 9876.25),
        ("-12", -12.0),
        ("1,234.56", 1234.56),
        ("  42  ", 42.0),
    ];
    for (raw, expected) in cases {
        assert_eq!(
            coerce(&Cell::Text(raw.to_string()), TypeClass::Numeric),
            FieldValue::Number(expected),
            "{raw}"
        );
    }
    assert_eq!(
        coerce(&Cell::Text("sin dato".to_string()), TypeClass::Numeric),
        FieldValue::Null
    );
    assert_eq!(parse_loose_number("1-2"), Some(1.0));
    assert_eq!(parse_loose_number("Gestión 2020-2021"), Some(2020.0));
    assert_eq!(parse_loose_number("1.234.567 kg"), Some(1.234));
    assert_eq!(parse_loose_number("- . -"), None);
}

#[test]
fn temporal_cells_accept_serials_and_text() {
    assert_eq!(
        coerce(&Cell::Number(45_000.5), TypeClass::Temporal),
        FieldValue::Temporal(at(2023, 3, 15, 12, 0, 0))
    );
    assert_eq!(
        coerce(&Cell::Text("15/03/2023".to_string()), TypeClass::Temporal),
        FieldValue::Temporal(at(2023, 3, 15, 0, 0, 0))
    );
    assert_eq!(
        coerce(&Cell::Text("2023-03-15T08:30:00Z".to_string()), TypeClass::Temporal),
        FieldValue::Temporal(at(2023, 3, 15, 8, 30, 0))
    );
    assert_eq!(
        coerce(&Cell::Text("marzo".to_string()), TypeClass::Temporal),
        FieldValue::Null
    );
}

#[test]
fn booleans_accept_spanish_and_english_spellings() {
    for raw in ["Sí", "si", "TRUE", "1", "yes"] {
        assert_eq!(
            coerce(&Cell::Text(raw.to_string()), TypeClass::Boolean),
            FieldValue::Boolean(true),
            "{raw}"
        );
    }
    for raw in ["no", "false", "0", "quizás"] {
        assert_eq!(
            coerce(&Cell::Text(raw.to_string()), TypeClass::Boolean),
            FieldValue::Boolean(false),
            "{raw}"
        );
    }
    assert_eq!(
        coerce(&Cell::Number(2.0), TypeClass::Boolean),
        FieldValue::Boolean(true)
    );
}

#[test]
fn text_columns_render_numbers_without_trailing_zeroes() {
    assert_eq!(
        coerce(&Cell::Number(2023.0), TypeClass::Text),
        FieldValue::Text("2023".to_string())
    );
    assert_eq!(
        coerce(&Cell::Number(0.25), TypeClass::Text),
        FieldValue::Text("0.25".to_string())
    );
    assert_eq!(
        coerce(&Cell::Bool(true), TypeClass::Text),
        FieldValue::Text("true".to_string())
    );
}

#[test]
fn allow_listed_columns_reject_non_numbers() {
    assert_eq!(enforce_numeric(FieldValue::Text("enero".into())), FieldValue::Null);
    assert_eq!(enforce_numeric(FieldValue::Text(" 7 ".into())), FieldValue::Number(7.0));
    assert_eq!(enforce_numeric(FieldValue::Boolean(true)), FieldValue::Null);
    assert_eq!(enforce_numeric(FieldValue::Number(f64::INFINITY)), FieldValue::Null);
    assert_eq!(enforce_numeric(FieldValue::Null), FieldValue::Null);
}

proptest! {
    #[test]
    fn finite_numbers_survive_text_round_trip(value in -1.0e12f64..1.0e12f64) {
        let cell = Cell::Text(value.to_string());
        prop_assert_eq!(coerce(&cell, TypeClass::Numeric), FieldValue::Number(value));
    }

    #[test]
    fn numeric_cells_pass_through_unchanged(value in proptest::num::f64::NORMAL) {
        prop_assert_eq!(coerce(&Cell::Number(value), TypeClass::Numeric), FieldValue::Number(value));
    }
}

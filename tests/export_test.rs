use tabsql::{
    ColumnFilter, Error, ExportError, ExportFormat, FileBuffer, FileFormat, FilterModel,
    NumberOperator, Session,
};

mod common;
use common::{load_text, strings, PEOPLE_CSV};

const ANIMALS_CSV: &str = "name,legs\nfox,4\ncat,4\nFoxglove,0\nbat,2\n";

fn animals() -> Session {
    let mut session = Session::default();
    load_text(&mut session, "animals.csv", ANIMALS_CSV);
    session
}

fn csv_text(bytes: Vec<u8>) -> String {
    String::from_utf8(bytes).unwrap()
}

#[test]
fn test_quick_filter_matches_any_visible_column_case_insensitively() {
    let mut session = animals();
    let bytes = session
        .export_displayed(
            "animals",
            &strings(&["name", "legs"]),
            Some("fox"),
            None,
            ExportFormat::Csv,
        )
        .unwrap();
    assert_eq!(csv_text(bytes), "name,legs\nfox,4\nFoxglove,0\n");

    let bytes = session
        .export_displayed(
            "animals",
            &strings(&["name"]),
            Some("cat"),
            None,
            ExportFormat::Csv,
        )
        .unwrap();
    assert_eq!(csv_text(bytes), "name\ncat\n");
}

#[test]
fn test_in_range_bounds_are_inclusive() {
    let mut session = animals();
    let mut model = FilterModel::new();
    model.insert(
        "legs".to_string(),
        ColumnFilter::Number {
            operator: NumberOperator::InRange,
            filter: Some(2.0),
            filter_to: Some(4.0),
        },
    );
    let bytes = session
        .export_displayed(
            "animals",
            &strings(&["name", "legs"]),
            None,
            Some(&model),
            ExportFormat::Csv,
        )
        .unwrap();
    assert_eq!(csv_text(bytes), "name,legs\nfox,4\ncat,4\nbat,2\n");
}

#[test]
fn test_grid_filter_model_from_json() {
    let mut session = animals();
    let model: FilterModel = serde_json::from_str(
        r#"{
            "name": {"filterType": "text", "type": "startsWith", "filter": "f"},
            "legs": {"filterType": "number", "type": "greaterThan", "filter": 1}
        }"#,
    )
    .unwrap();
    let bytes = session
        .export_displayed(
            "animals",
            &strings(&["name"]),
            None,
            Some(&model),
            ExportFormat::Csv,
        )
        .unwrap();
    assert_eq!(csv_text(bytes), "name\nfox\n");
}

#[test]
fn test_csv_escaping_survives_a_reader() {
    let mut session = Session::default();
    session
        .ingest(
            FileBuffer::Text(
                r#"[{"text":"a,b","n":1},{"text":"say \"hi\"","n":2},{"text":"multi\nline","n":3}]"#
                    .to_string(),
            ),
            "tricky.json",
            FileFormat::Json,
        )
        .unwrap();

    let displayed = session
        .export_displayed("tricky", &[], None, None, ExportFormat::Csv)
        .unwrap();
    let queried = session
        .export_query("SELECT * FROM \"tricky\"", ExportFormat::Csv)
        .unwrap();

    for bytes in [displayed, queried] {
        let mut reader = csv::Reader::from_reader(bytes.as_slice());
        let texts: Vec<String> = reader
            .records()
            .map(|r| r.unwrap().get(0).unwrap().to_string())
            .collect();
        assert_eq!(texts, vec!["a,b", "say \"hi\"", "multi\nline"]);
    }
}

#[test]
fn test_both_export_paths_agree_without_grid_state() {
    let mut session = Session::default();
    load_text(&mut session, "people.csv", PEOPLE_CSV);

    for format in [ExportFormat::Csv, ExportFormat::Tsv, ExportFormat::Json] {
        let queried = session
            .export_query("SELECT * FROM \"people\"", format)
            .unwrap();
        let displayed = session
            .export_displayed("people", &[], None, None, format)
            .unwrap();
        assert_eq!(queried, displayed, "{:?}", format);
    }
}

#[test]
fn test_query_export_of_empty_result_is_no_rows() {
    let mut session = Session::default();
    load_text(&mut session, "people.csv", PEOPLE_CSV);
    for format in [ExportFormat::Csv, ExportFormat::Parquet, ExportFormat::Json] {
        let err = session
            .export_query("SELECT * FROM \"people\" WHERE \"age\" > 100", format)
            .unwrap_err();
        assert!(matches!(err, Error::Export(ExportError::NoRows)), "{:?}", format);
    }
    // The staging relation never outlives an export.
    assert!(session.execute("SELECT * FROM \"__tabsql_export\"").is_err());
}

#[test]
fn test_query_export_error_is_verbatim_query_error() {
    let mut session = Session::default();
    load_text(&mut session, "people.csv", PEOPLE_CSV);
    let err = session
        .export_query("SELECT \"missing\" FROM \"people\"", ExportFormat::Csv)
        .unwrap_err();
    assert!(matches!(err, Error::Query { .. }));
}

#[test]
fn test_binary_exports_load_back() {
    let mut session = Session::default();
    load_text(&mut session, "people.csv", PEOPLE_CSV);

    let parquet = session
        .export_query("SELECT * FROM \"people\"", ExportFormat::Parquet)
        .unwrap();
    let xlsx = session
        .export_displayed("people", &strings(&["name", "age"]), None, None, ExportFormat::Xlsx)
        .unwrap();

    let from_parquet = session
        .ingest(FileBuffer::Bytes(parquet), "copy.parquet", FileFormat::Parquet)
        .unwrap();
    assert_eq!(from_parquet.row_count, 3);
    assert_eq!(from_parquet.column_names(), vec!["id", "name", "age"]);

    let from_xlsx = session
        .ingest(FileBuffer::Bytes(xlsx), "copy_sheet.xlsx", FileFormat::Xlsx)
        .unwrap();
    assert_eq!(from_xlsx.row_count, 3);
    assert_eq!(from_xlsx.column_names(), vec!["name", "age"]);
}

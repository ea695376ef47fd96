use serde_json::json;
use tabsql::{Error, FileBuffer, FileFormat, Session, TableFormat};

mod common;
use common::{load_bytes, load_text, people_parquet, people_xlsx, PEOPLE_CSV};

fn count_star(session: &mut Session, relation: &str) -> usize {
    session
        .count(&format!("SELECT * FROM \"{}\"", relation))
        .unwrap()
}

#[test]
fn test_row_count_matches_count_star_for_every_format() {
    let mut session = Session::default();

    let tables = vec![
        load_text(&mut session, "p_csv.csv", PEOPLE_CSV),
        load_text(
            &mut session,
            "p_tsv.tsv",
            "id\tname\tage\n1\tAda\t36\n2\tGrace\t45\n3\tLinus\t28\n",
        ),
        load_text(
            &mut session,
            "p_json.json",
            r#"[{"id":1,"name":"Ada","age":36},{"id":2,"name":"Grace","age":45},{"id":3,"name":"Linus","age":28}]"#,
        ),
        load_bytes(&mut session, "p_parquet.parquet", people_parquet()),
        load_bytes(&mut session, "p sheet.xlsx", people_xlsx()),
    ];

    for table in &tables {
        assert_eq!(table.row_count, 3, "{}", table.display_name);
        assert_eq!(
            table.row_count,
            count_star(&mut session, &table.relation_name),
            "{}",
            table.display_name
        );
        assert_eq!(table.column_names(), vec!["id", "name", "age"]);
    }

    let names: Vec<&str> = session
        .catalog()
        .tables()
        .iter()
        .map(|t| t.relation_name.as_str())
        .collect();
    assert_eq!(
        names,
        vec!["p_csv", "p_tsv", "p_json", "p_parquet", "p_sheet"]
    );
}

#[test]
fn test_json_lines_are_accepted() {
    let mut session = Session::default();
    let table = load_text(
        &mut session,
        "events.json",
        "{\"kind\":\"a\",\"n\":1}\n{\"kind\":\"b\",\"n\":2}\n",
    );
    assert_eq!(table.row_count, 2);
    let result = session
        .execute("SELECT \"kind\" FROM \"events\" ORDER BY \"n\"")
        .unwrap();
    assert_eq!(result.rows()[1]["kind"], json!("b"));
}

#[test]
fn test_reload_replaces_relation_in_place() {
    let mut session = Session::default();
    load_text(&mut session, "a.csv", "x\n1\n");
    load_text(&mut session, "b.csv", "y\n1\n");
    let table = load_text(&mut session, "a.csv", "x,z\n1,2\n3,4\n");

    assert_eq!(table.row_count, 2);
    assert_eq!(session.catalog().len(), 2);
    assert_eq!(session.catalog().tables()[0].relation_name, "a");
    assert_eq!(session.table("a").map(|t| t.columns.len()), Some(2));
}

#[test]
fn test_failed_load_keeps_previous_table() {
    let mut session = Session::default();
    load_text(&mut session, "data.parquet.csv", "v\n1\n2\n");
    let before = session.table("data_parquet").cloned();

    let err = session
        .ingest(
            FileBuffer::Bytes(b"definitely not parquet".to_vec()),
            "data.parquet.csv",
            FileFormat::Parquet,
        )
        .unwrap_err();
    assert!(matches!(err, Error::Ingestion { .. }));
    assert!(!err.is_fatal());

    assert_eq!(session.table("data_parquet").cloned(), before);
    assert_eq!(count_star(&mut session, "data_parquet"), 2);
}

#[test]
fn test_empty_file_is_an_ingestion_error() {
    let mut session = Session::default();
    let err = session
        .ingest(FileBuffer::Text(String::new()), "empty.csv", FileFormat::Csv)
        .unwrap_err();
    assert!(matches!(err, Error::Ingestion { ref name, .. } if name == "empty.csv"));
    assert!(session.catalog().is_empty());
}

#[test]
fn test_source_format_is_recorded() {
    let mut session = Session::default();
    let table = load_bytes(&mut session, "p.parquet", people_parquet());
    assert_eq!(table.format, TableFormat::Source(FileFormat::Parquet));
    assert_eq!(table.format.label(), "parquet");
}

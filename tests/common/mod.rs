#![allow(dead_code)]

use polars::prelude::*;
use rust_xlsxwriter::Workbook;
use tabsql::{FileBuffer, FileFormat, LoadedTable, Session};

pub const PEOPLE_CSV: &str = "id,name,age\n1,Ada,36\n2,Grace,45\n3,Linus,28\n";
pub const ORDERS_CSV: &str = "order_id,id,total\n10,1,9.5\n11,1,20.0\n12,3,5.25\n13,9,1.0\n";

pub fn load_text(session: &mut Session, name: &str, text: &str) -> LoadedTable {
    session
        .ingest(
            FileBuffer::Text(text.to_string()),
            name,
            FileFormat::detect(name),
        )
        .unwrap()
}

pub fn load_bytes(session: &mut Session, name: &str, bytes: Vec<u8>) -> LoadedTable {
    session
        .ingest(FileBuffer::Bytes(bytes), name, FileFormat::detect(name))
        .unwrap()
}

/// The people table as Parquet bytes.
pub fn people_parquet() -> Vec<u8> {
    let mut df = df!(
        "id" => [1i64, 2, 3],
        "name" => ["Ada", "Grace", "Linus"],
        "age" => [36i64, 45, 28]
    )
    .unwrap();
    let mut buf = Vec::new();
    ParquetWriter::new(&mut buf).finish(&mut df).unwrap();
    buf
}

/// The people table as an xlsx workbook with a second, ignored sheet.
pub fn people_xlsx() -> Vec<u8> {
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    sheet.set_name("people").unwrap();
    let rows = [(1.0, "Ada", 36.0), (2.0, "Grace", 45.0), (3.0, "Linus", 28.0)];
    sheet.write_string(0, 0, "id").unwrap();
    sheet.write_string(0, 1, "name").unwrap();
    sheet.write_string(0, 2, "age").unwrap();
    for (i, (id, name, age)) in rows.iter().enumerate() {
        let row = i as u32 + 1;
        sheet.write_number(row, 0, *id).unwrap();
        sheet.write_string(row, 1, *name).unwrap();
        sheet.write_number(row, 2, *age).unwrap();
    }
    let extra = workbook.add_worksheet();
    extra.write_string(0, 0, "ignored").unwrap();
    workbook.save_to_buffer().unwrap()
}

pub fn strings(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

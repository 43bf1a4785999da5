use std::collections::HashMap;

use tempfile::tempdir;

use wc_rfm_export::error::RfmError;
use wc_rfm_export::exporter::{sorted_chunk_files, ChunkedTableExporter};
use wc_rfm_export::store::StagingStore;
use wc_rfm_export::xlsx::{data_to_f64, read_first_sheet};

/// Seed a staging table with `rows` sequential records
fn seeded_store(dir: &std::path::Path, rows: usize) -> StagingStore {
    let store = StagingStore::open(&dir.join("staging.db")).expect("open store");
    store
        .execute_batch("CREATE TABLE items (id INTEGER, amount REAL, note TEXT);")
        .expect("create table");
    for i in 1..=rows {
        store
            .execute_batch(&format!(
                "INSERT INTO items VALUES ({i}, {v}, 'row {i}');",
                v = i * 100
            ))
            .expect("insert row");
    }
    store
}

#[test]
fn rows_split_into_ceil_r_over_m_chunks() {
    let dir = tempdir().expect("tempdir");
    let store = seeded_store(dir.path(), 25);
    let out = dir.path().join("out");

    let exporter = ChunkedTableExporter::new(&store, &out, 10).expect("exporter");
    let files = exporter.export("items", "items", None, None).expect("export");

    let names: Vec<String> = files
        .iter()
        .filter_map(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
        .collect();
    assert_eq!(names, vec!["1_items.xlsx", "2_items.xlsx", "3_items.xlsx"]);

    // Every chunk repeats the header; the last holds the remainder.
    let first = read_first_sheet(&files[0]).expect("read first chunk");
    assert_eq!(first.header(), &["id", "amount", "note"]);
    assert_eq!(first.rows().count(), 10);
    let last = read_first_sheet(&files[2]).expect("read last chunk");
    assert_eq!(last.rows().count(), 5);
}

#[test]
fn chunk_order_reconstructs_the_source_order() {
    let dir = tempdir().expect("tempdir");
    let store = seeded_store(dir.path(), 12);
    let out = dir.path().join("out");

    ChunkedTableExporter::new(&store, &out, 5)
        .expect("exporter")
        .export("items", "items", None, None)
        .expect("export");

    let mut ids = Vec::new();
    for chunk in sorted_chunk_files(&out, "items").expect("sorted chunks") {
        let sheet = read_first_sheet(&chunk).expect("read chunk");
        for row in sheet.rows() {
            ids.push(row.first().and_then(data_to_f64).expect("id cell") as i64);
        }
    }
    assert_eq!(ids, (1..=12).collect::<Vec<i64>>());
}

#[test]
fn exact_multiple_of_the_cap_adds_no_empty_chunk() {
    let dir = tempdir().expect("tempdir");
    let store = seeded_store(dir.path(), 20);
    let out = dir.path().join("out");

    let files = ChunkedTableExporter::new(&store, &out, 10)
        .expect("exporter")
        .export("items", "items", None, None)
        .expect("export");
    assert_eq!(files.len(), 2);
}

#[test]
fn header_overrides_replace_column_names() {
    let dir = tempdir().expect("tempdir");
    let store = seeded_store(dir.path(), 3);
    let out = dir.path().join("out");

    let files = ChunkedTableExporter::new(&store, &out, 10)
        .expect("exporter")
        .export("items", "items", Some(&["ID", "Amount", "Note"]), None)
        .expect("export");
    let sheet = read_first_sheet(&files[0]).expect("read chunk");
    assert_eq!(sheet.header(), &["ID", "Amount", "Note"]);
}

#[test]
fn mismatched_header_count_is_an_export_error() {
    let dir = tempdir().expect("tempdir");
    let store = seeded_store(dir.path(), 3);
    let out = dir.path().join("out");

    let err = ChunkedTableExporter::new(&store, &out, 10)
        .expect("exporter")
        .export("items", "items", Some(&["only", "two"]), None);
    assert!(matches!(err, Err(RfmError::Export(_))));
}

#[test]
fn number_formats_do_not_change_cell_values() {
    let dir = tempdir().expect("tempdir");
    let store = seeded_store(dir.path(), 2);
    let out = dir.path().join("out");

    let formats: HashMap<String, String> =
        [("amount".to_string(), "#,##0".to_string())].into_iter().collect();
    let files = ChunkedTableExporter::new(&store, &out, 10)
        .expect("exporter")
        .export("items", "items", None, Some(&formats))
        .expect("export");

    let sheet = read_first_sheet(&files[0]).expect("read chunk");
    let amounts: Vec<f64> = sheet
        .rows()
        .filter_map(|row| row.get(1).and_then(data_to_f64))
        .collect();
    assert_eq!(amounts, vec![100.0, 200.0]);
}

#[test]
fn empty_relation_exports_nothing() {
    let dir = tempdir().expect("tempdir");
    let store = seeded_store(dir.path(), 0);
    let out = dir.path().join("out");

    let files = ChunkedTableExporter::new(&store, &out, 10)
        .expect("exporter")
        .export("items", "items", None, None)
        .expect("export");
    assert!(files.is_empty());
}

use std::fs;
use std::io::Write;
use std::path::Path;

use flate2::write::GzEncoder;
use flate2::Compression;
use tempfile::tempdir;

use wc_rfm_export::dump_reader::DumpReader;
use wc_rfm_export::error::RfmError;
use wc_rfm_export::models::TableGroup;

fn wp_group() -> Vec<TableGroup> {
    vec![TableGroup {
        name: "wp".to_string(),
        tables: vec![
            "users".to_string(),
            "wc_order_stats".to_string(),
            "usermeta".to_string(),
            "wc_customer_lookup".to_string(),
        ],
    }]
}

fn full_dump_sql() -> String {
    [
        "CREATE TABLE `wp_users` (`ID` bigint(20) NOT NULL);",
        "CREATE TABLE `wp_usermeta` (`umeta_id` bigint(20) NOT NULL);",
        "CREATE TABLE `wp_wc_order_stats` (`order_id` bigint(20) NOT NULL);",
        "CREATE TABLE `wp_wc_customer_lookup` (`customer_id` bigint(20) NOT NULL);",
    ]
    .join("\n")
}

fn write_gzip(path: &Path, contents: &str) {
    let file = fs::File::create(path).expect("create gz file");
    let mut encoder = GzEncoder::new(file, Compression::default());
    encoder
        .write_all(contents.as_bytes())
        .expect("write gz contents");
    encoder.finish().expect("finish gz stream");
}

#[test]
fn lists_only_dump_files_sorted_by_name() {
    let dir = tempdir().expect("tempdir");
    fs::write(dir.path().join("b.sql"), "-- dump").expect("write b.sql");
    fs::write(dir.path().join("a.sql"), "-- dump").expect("write a.sql");
    fs::write(dir.path().join("notes.txt"), "not a dump").expect("write notes.txt");
    write_gzip(&dir.path().join("c.sql.gz"), "-- dump");

    let reader = DumpReader::new(dir.path(), &wp_group());
    let files = reader.list_files().expect("list files");

    let names: Vec<&str> = files.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, vec!["a.sql", "b.sql", "c.sql.gz"]);
    assert!(!files[0].compressed);
    assert!(files[2].compressed);
}

#[test]
fn get_info_on_missing_file_is_not_found() {
    let dir = tempdir().expect("tempdir");
    let reader = DumpReader::new(dir.path(), &wp_group());
    let err = reader.get_info(&dir.path().join("missing.sql"));
    assert!(matches!(err, Err(RfmError::NotFound(_))));
}

#[test]
fn detects_shared_prefix_from_anchor_tables() {
    let dir = tempdir().expect("tempdir");
    let dump = dir.path().join("site.sql");
    fs::write(&dump, full_dump_sql()).expect("write dump");

    let reader = DumpReader::new(dir.path(), &wp_group());
    assert_eq!(reader.detect_prefix(&dump).expect("detect"), "wp_");
}

#[test]
fn prefix_detection_reads_gzip_dumps() {
    let dir = tempdir().expect("tempdir");
    let dump = dir.path().join("site.sql.gz");
    write_gzip(&dump, &full_dump_sql());

    let reader = DumpReader::new(dir.path(), &wp_group());
    assert_eq!(reader.detect_prefix(&dump).expect("detect"), "wp_");
}

#[test]
fn inconsistent_prefixes_collapse_to_empty() {
    let dir = tempdir().expect("tempdir");
    let dump = dir.path().join("mixed.sql");
    fs::write(
        &dump,
        "CREATE TABLE `wp_users` (`ID` bigint(20));\n\
         CREATE TABLE `site2_usermeta` (`umeta_id` bigint(20));\n",
    )
    .expect("write dump");

    let reader = DumpReader::new(dir.path(), &wp_group());
    assert_eq!(reader.detect_prefix(&dump).expect("detect"), "");
}

#[test]
fn group_is_complete_only_with_every_required_table() {
    let dir = tempdir().expect("tempdir");

    let complete = dir.path().join("complete.sql");
    fs::write(&complete, full_dump_sql()).expect("write dump");
    let reader = DumpReader::new(dir.path(), &wp_group());
    assert_eq!(
        reader.get_complete_groups(&complete, "wp_").expect("groups"),
        vec!["wp".to_string()]
    );

    // Dropping one required table flips the whole group to incomplete.
    let partial = dir.path().join("partial.sql");
    fs::write(
        &partial,
        "CREATE TABLE `wp_users` (`ID` bigint(20));\n\
         CREATE TABLE `wp_usermeta` (`umeta_id` bigint(20));\n\
         CREATE TABLE `wp_wc_order_stats` (`order_id` bigint(20));\n",
    )
    .expect("write dump");
    assert!(reader
        .get_complete_groups(&partial, "wp_")
        .expect("groups")
        .is_empty());
}

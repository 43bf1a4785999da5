use tempfile::tempdir;

use wc_rfm_export::constants::RfmConstantsEngine;
use wc_rfm_export::models::Metric;
use wc_rfm_export::store::StagingStore;
use wc_rfm_export::xlsx::{read_sheet, sheet_names};

/// Seed rfm_data with ten customers whose metric values are 1..=10
fn seeded_store(dir: &std::path::Path) -> StagingStore {
    let store = StagingStore::open(&dir.join("staging.db")).expect("open store");
    store
        .execute_batch(
            "CREATE TABLE rfm_data (
                 user_id INTEGER, recency_days INTEGER, total_orders INTEGER,
                 total_spent REAL, last_order_amount REAL, last_order_date TEXT
             );",
        )
        .expect("create rfm_data");
    for i in 1..=10 {
        store
            .execute_batch(&format!(
                "INSERT INTO rfm_data VALUES ({i}, {i}, {i}, {v}, {v}, '2023-09-01');",
                v = f64::from(i) * 10.0
            ))
            .expect("insert row");
    }
    store
}

#[test]
fn quintiles_split_ten_values_into_five_even_buckets() {
    let dir = tempdir().expect("tempdir");
    let store = seeded_store(dir.path());
    let engine = RfmConstantsEngine::new(&store, 5);

    let thresholds = engine
        .metric_thresholds(Metric::TotalOrders)
        .expect("thresholds");
    assert_eq!(thresholds.len(), 5);

    // Bucket 1 holds the two smallest values and keeps the ascending score.
    assert_eq!(thresholds[0].bucket, 1);
    assert!((thresholds[0].min_value - 1.0).abs() < f64::EPSILON);
    assert!((thresholds[0].max_value - 2.0).abs() < f64::EPSILON);
    assert_eq!(thresholds[0].score, 1);
    assert_eq!(thresholds[0].sample_count, 2);
    assert_eq!(thresholds[4].score, 5);
}

#[test]
fn recency_scores_are_inverted() {
    let dir = tempdir().expect("tempdir");
    let store = seeded_store(dir.path());
    let engine = RfmConstantsEngine::new(&store, 5);

    let thresholds = engine
        .metric_thresholds(Metric::RecencyDays)
        .expect("thresholds");
    // The lowest recency bucket (most recent buyers) earns the top score.
    assert_eq!(thresholds[0].bucket, 1);
    assert_eq!(thresholds[0].score, 5);
    assert_eq!(thresholds[4].score, 1);
}

#[test]
fn stats_cover_count_min_max_mean() {
    let dir = tempdir().expect("tempdir");
    let store = seeded_store(dir.path());
    let engine = RfmConstantsEngine::new(&store, 5);

    let stats = engine.metric_stats(Metric::TotalSpent).expect("stats");
    assert_eq!(stats.count, 10);
    assert_eq!(stats.min, Some(10.0));
    assert_eq!(stats.max, Some(100.0));
    assert_eq!(stats.mean, Some(55.0));
}

#[test]
fn five_bands_use_the_fixed_taxonomy() {
    let dir = tempdir().expect("tempdir");
    let store = seeded_store(dir.path());

    let rules = RfmConstantsEngine::new(&store, 5).default_segment_rules();
    let names: Vec<&str> = rules.iter().map(|r| r.segment.as_str()).collect();
    assert_eq!(
        names,
        vec![
            "Champions",
            "Loyal Customers",
            "Potential Loyalist",
            "At Risk",
            "Hibernating"
        ]
    );
}

#[test]
fn other_band_counts_use_the_generic_taxonomy() {
    let dir = tempdir().expect("tempdir");
    let store = seeded_store(dir.path());

    let rules = RfmConstantsEngine::new(&store, 4).default_segment_rules();
    let names: Vec<&str> = rules.iter().map(|r| r.segment.as_str()).collect();
    assert_eq!(names, vec!["Top Value", "Mid Value", "Low Value"]);

    let top = &rules[0];
    assert_eq!(top.r_min, 3); // max(Q - 1, 1)
    assert_eq!(top.r_max, 4);
    let mid = &rules[1];
    assert_eq!(mid.r_min, 2); // max(Q / 2, 1)
    let low = &rules[2];
    assert_eq!(low.r_max, 2); // min(2, Q)
}

#[test]
fn workbook_carries_all_four_sheets() {
    let dir = tempdir().expect("tempdir");
    let store = seeded_store(dir.path());
    let engine = RfmConstantsEngine::new(&store, 5);

    let path = engine.write_workbook(dir.path()).expect("write workbook");
    assert!(path.is_file());

    let sheets = sheet_names(&path).expect("sheet names");
    for required in ["meta", "thresholds", "metric_stats", "segment_rules"] {
        assert!(sheets.iter().any(|s| s == required), "missing {required}");
    }

    // Three metrics times five buckets.
    let thresholds = read_sheet(&path, "thresholds").expect("read thresholds");
    assert_eq!(thresholds.rows().count(), 15);
}

#[test]
fn empty_table_adds_a_warning_row_to_meta() {
    let dir = tempdir().expect("tempdir");
    let store = StagingStore::open(&dir.path().join("staging.db")).expect("open store");
    store
        .execute_batch(
            "CREATE TABLE rfm_data (
                 user_id INTEGER, recency_days INTEGER, total_orders INTEGER,
                 total_spent REAL, last_order_amount REAL, last_order_date TEXT
             );",
        )
        .expect("create empty rfm_data");

    let path = RfmConstantsEngine::new(&store, 5)
        .write_workbook(dir.path())
        .expect("write workbook");

    let meta = read_sheet(&path, "meta").expect("read meta");
    let keys: Vec<String> = meta
        .rows()
        .filter_map(|row| row.first().map(wc_rfm_export::xlsx::data_to_string))
        .collect();
    assert!(keys.iter().any(|k| k == "warning"));
}

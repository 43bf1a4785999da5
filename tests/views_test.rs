use tempfile::tempdir;

use wc_rfm_export::shamsi::parse_cutoff;
use wc_rfm_export::store::StagingStore;
use wc_rfm_export::views::DerivedViewBuilder;

/// Seed the four staged WooCommerce tables with a small fixture:
/// user 1 has completed, processing, refunded, and post-cutoff orders;
/// user 2 has only a refunded order.
fn seeded_store(dir: &std::path::Path) -> StagingStore {
    let store = StagingStore::open(&dir.join("staging.db")).expect("open store");
    store
        .execute_batch(
            "CREATE TABLE users (
                 ID INTEGER, user_login TEXT, display_name TEXT,
                 user_email TEXT, user_registered TEXT
             );
             INSERT INTO users VALUES
                 (1, 'ali', 'Ali', 'ali@example.com', '2020-01-01 00:00:00'),
                 (2, 'sara', 'Sara', 'sara@example.com', '2021-05-05 00:00:00');

             CREATE TABLE usermeta (user_id INTEGER, meta_key TEXT, meta_value TEXT);
             INSERT INTO usermeta VALUES
                 (1, 'billing_phone', '09120000000'),
                 (1, 'first_name', 'Ali'),
                 (1, 'billing_city', 'Tehran');

             CREATE TABLE wc_customer_lookup (
                 customer_id INTEGER, user_id INTEGER, email TEXT,
                 first_name TEXT, last_name TEXT
             );
             INSERT INTO wc_customer_lookup VALUES
                 (10, 1, 'ali@example.com', 'Ali', 'Ahmadi'),
                 (20, 2, 'sara@example.com', 'Sara', 'Karimi');

             CREATE TABLE wc_order_stats (
                 order_id INTEGER, customer_id INTEGER, date_created TEXT,
                 total_sales REAL, status TEXT
             );
             INSERT INTO wc_order_stats VALUES
                 (100, 10, '2023-08-01 09:00:00',  50.0, 'wc-processing'),
                 (101, 10, '2023-09-01 10:00:00', 100.0, 'wc-completed'),
                 (102, 10, '2023-09-10 11:00:00', 999.0, 'wc-refunded'),
                 (103, 10, '2023-10-01 12:00:00', 200.0, 'wc-completed'),
                 (200, 20, '2023-09-05 13:00:00', 300.0, 'wc-refunded');",
        )
        .expect("seed tables");
    store
}

#[test]
fn customer_purchases_lists_every_order_with_identity() {
    let dir = tempdir().expect("tempdir");
    let store = seeded_store(dir.path());
    let builder = DerivedViewBuilder::new(&store);

    let count = builder.build_customer_purchases().expect("build view");
    assert_eq!(count, 5);

    let conn = store.conn().expect("conn");
    let (name, email, phone): (String, String, String) = conn
        .query_row(
            "SELECT user_name, email, phone FROM customer_purchases WHERE order_id = 101",
            [],
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
        )
        .expect("query purchases");
    assert_eq!(name, "Ali");
    assert_eq!(email, "ali@example.com");
    assert_eq!(phone, "09120000000");
}

#[test]
fn user_full_data_pivots_meta_keys_into_columns() {
    let dir = tempdir().expect("tempdir");
    let store = seeded_store(dir.path());
    let builder = DerivedViewBuilder::new(&store);

    let count = builder.build_user_full_data().expect("build table");
    assert_eq!(count, 2);

    let conn = store.conn().expect("conn");
    let (phone, city): (Option<String>, Option<String>) = conn
        .query_row(
            "SELECT billing_phone, billing_city FROM user_full_data WHERE user_id = 1",
            [],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .expect("query full data");
    assert_eq!(phone.as_deref(), Some("09120000000"));
    assert_eq!(city.as_deref(), Some("Tehran"));

    // A user without meta rows still appears, with empty columns.
    let phone2: Option<String> = conn
        .query_row(
            "SELECT billing_phone FROM user_full_data WHERE user_id = 2",
            [],
            |r| r.get(0),
        )
        .expect("query user 2");
    assert_eq!(phone2, None);
}

#[test]
fn rfm_base_counts_only_qualifying_orders() {
    let dir = tempdir().expect("tempdir");
    let store = seeded_store(dir.path());
    let builder = DerivedViewBuilder::new(&store);

    let count = builder.build_rfm_base(None).expect("build rfm base");
    // User 2 has only a refunded order and is excluded entirely.
    assert_eq!(count, 1);

    let conn = store.conn().expect("conn");
    let (orders, spent, last_amount): (i64, f64, f64) = conn
        .query_row(
            "SELECT total_orders, total_spent, last_order_amount FROM rfm_data WHERE user_id = 1",
            [],
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
        )
        .expect("query rfm");
    assert_eq!(orders, 3);
    assert!((spent - 350.0).abs() < f64::EPSILON);
    assert!((last_amount - 200.0).abs() < f64::EPSILON);
}

#[test]
fn shamsi_cutoff_excludes_later_orders_and_anchors_recency() {
    let dir = tempdir().expect("tempdir");
    let store = seeded_store(dir.path());
    let builder = DerivedViewBuilder::new(&store);

    // 1402/07/01 is 2023-09-23: the 2023-10-01 order falls outside.
    let cutoff = parse_cutoff("1402/07/01").expect("parse cutoff");
    builder.build_rfm_base(cutoff).expect("build rfm base");

    let conn = store.conn().expect("conn");
    let (orders, spent, recency, last_amount): (i64, f64, i64, f64) = conn
        .query_row(
            "SELECT total_orders, total_spent, recency_days, last_order_amount
             FROM rfm_data WHERE user_id = 1",
            [],
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?)),
        )
        .expect("query rfm");
    assert_eq!(orders, 2);
    assert!((spent - 150.0).abs() < f64::EPSILON);
    // Days from the last qualifying order (2023-09-01) to the cutoff.
    assert_eq!(recency, 22);
    assert!((last_amount - 100.0).abs() < f64::EPSILON);
}

#[test]
fn rfm_base_is_rebuilt_wholly_on_each_run() {
    let dir = tempdir().expect("tempdir");
    let store = seeded_store(dir.path());
    let builder = DerivedViewBuilder::new(&store);

    builder.build_rfm_base(None).expect("first build");
    let count = builder.build_rfm_base(None).expect("second build");
    assert_eq!(count, 1);
    assert_eq!(store.row_count("rfm_data").expect("count"), 1);
}

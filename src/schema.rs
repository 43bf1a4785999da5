//! Staging-store schema definitions
//!
//! This module provides constants for the table, view, column, and sheet
//! names shared between the importer, the derived-view builder, the RFM
//! engines, and the exporters.

/// Base tables required by the WooCommerce ("wp") group, prefix-stripped.
pub mod wp {
    /// WordPress users table
    pub const USERS: &str = "users";
    /// WordPress user metadata key/value table
    pub const USERMETA: &str = "usermeta";
    /// WooCommerce order statistics table
    pub const ORDER_STATS: &str = "wc_order_stats";
    /// WooCommerce customer lookup table
    pub const CUSTOMER_LOOKUP: &str = "wc_customer_lookup";
}

/// Customer purchases derived view
pub mod customer_purchases {
    /// View name
    pub const VIEW: &str = "customer_purchases";
    /// Customer's WordPress user id
    pub const USER_ID: &str = "user_id";
    /// Customer's display name
    pub const USER_NAME: &str = "user_name";
    /// Customer's email address
    pub const EMAIL: &str = "email";
    /// Customer's billing phone
    pub const PHONE: &str = "phone";
    /// Order id
    pub const ORDER_ID: &str = "order_id";
    /// Order creation date
    pub const ORDER_DATE: &str = "order_date";
    /// Order total amount
    pub const ORDER_TOTAL: &str = "order_total";
    /// Order status
    pub const ORDER_STATUS: &str = "order_status";
}

/// User full data derived table
pub mod user_full_data {
    /// Table name
    pub const TABLE: &str = "user_full_data";
}

/// RFM base table (one row per customer with raw metrics)
pub mod rfm_data {
    /// Table name
    pub const TABLE: &str = "rfm_data";
    /// Customer's WordPress user id
    pub const USER_ID: &str = "user_id";
    /// Days since the most recent qualifying order
    pub const RECENCY_DAYS: &str = "recency_days";
    /// Count of qualifying orders
    pub const TOTAL_ORDERS: &str = "total_orders";
    /// Sum of qualifying order totals
    pub const TOTAL_SPENT: &str = "total_spent";
    /// Amount of the most recent qualifying order
    pub const LAST_ORDER_AMOUNT: &str = "last_order_amount";
    /// Date of the most recent qualifying order
    pub const LAST_ORDER_DATE: &str = "last_order_date";
}

/// Sheet and column names of the constants workbook (`rfm_constant.xlsx`)
pub mod constants_workbook {
    /// Workbook file name
    pub const FILE_NAME: &str = "rfm_constant.xlsx";
    /// Metadata sheet
    pub const META_SHEET: &str = "meta";
    /// Machine-readable thresholds sheet
    pub const THRESHOLDS_SHEET: &str = "thresholds";
    /// Per-metric descriptive statistics sheet
    pub const STATS_SHEET: &str = "metric_stats";
    /// Segment rules sheet
    pub const SEGMENT_RULES_SHEET: &str = "segment_rules";

    /// Column order of the thresholds sheet
    pub const THRESHOLD_COLUMNS: [&str; 13] = [
        "metric",
        "metric_label",
        "bucket",
        "quantile_label",
        "percentile_from",
        "percentile_to",
        "score",
        "min_value",
        "max_value",
        "sample_count",
        "label",
        "scoring_direction",
        "rule_text",
    ];

    /// Column order of the segment rules sheet
    pub const SEGMENT_RULE_COLUMNS: [&str; 8] = [
        "segment", "r_min", "r_max", "f_min", "f_max", "m_min", "m_max", "description",
    ];
}

/// Column names of the scores workbook (`rfm_scores.xlsx`)
pub mod scores_workbook {
    /// Workbook file name
    pub const FILE_NAME: &str = "rfm_scores.xlsx";

    /// Column order of the scores sheet
    pub const COLUMNS: [&str; 9] = [
        "user_id",
        "r_score",
        "f_score",
        "m_score",
        "rfm_score",
        "segment",
        "recency_days",
        "total_orders",
        "total_spent",
    ];
}

/// Base name of the paginated RFM data exports consumed by re-entry runs
pub const RFM_DATA_EXPORT_BASE: &str = "rfm_data";

/// File name of the staging database copy placed in each output folder
pub const STAGING_DB_COPY: &str = "converted.db";

/// File name of the machine-readable run manifest
pub const MANIFEST_FILE: &str = "manifest.json";

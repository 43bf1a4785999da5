//! WooCommerce dump import and RFM analytics
//!
//! A pipeline that stages WordPress/WooCommerce SQL dumps in an embedded
//! SQLite database, derives customer-purchase and RFM relations from them,
//! computes quantile-based RFM thresholds, and streams the results into
//! paginated Excel workbooks. A previously generated output folder can later
//! be re-entered to score its exported customers.
//!
//! # Features
//!
//! - Dump discovery with prefix detection and table-group completeness checks
//! - Streaming MySQL-to-SQLite statement translation for `.sql` and gzip dumps
//! - Derived customer-purchase, user-profile, and RFM base relations
//! - NTILE quantile thresholds and default segment rules (`rfm_constant.xlsx`)
//! - Rule-based scoring and segmentation (`rfm_scores.xlsx`)
//! - Chunked `.xlsx` export with a configurable per-file row cap

/// Configuration management
pub mod config;
/// Quantile thresholds and the constants workbook
pub mod constants;
/// Dump discovery, prefix detection, and group completeness
pub mod dump_reader;
/// Error types
pub mod error;
/// Chunked workbook export
pub mod exporter;
/// Statement streaming, translation, and import
pub mod importer;
/// Logging setup and utilities
pub mod logging;
/// Data models and structures
pub mod models;
/// Run orchestration
pub mod pipeline;
/// Scoring and segment assignment
pub mod scoring;
/// Staging table, column, and sheet-name constants
pub mod schema;
/// Jalali calendar conversion
pub mod shamsi;
/// Relational staging store
pub mod store;
/// Output-folder validation for re-entry runs
pub mod validation;
/// Derived analytical relations
pub mod views;
/// Workbook read/write helpers
pub mod xlsx;

// Re-export key components for easier access
pub use config::AppConfig;
pub use dump_reader::DumpReader;
pub use error::{Result, RfmError};
pub use importer::DumpImporter;
pub use pipeline::Pipeline;
pub use store::StagingStore;

//! Data models for the import and analytics pipeline
//!
//! This module contains the typed records used throughout the application:
//! dump file descriptors, table groups, RFM thresholds, segment rules, and
//! scored customers.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Information about a candidate dump file
#[derive(Debug, Clone, Serialize)]
pub struct FileInfo {
    /// Full path to the dump file
    pub path: PathBuf,
    /// File name without directory
    pub name: String,
    /// Size in megabytes, rounded to two decimals
    pub size_mb: f64,
    /// True if the file is gzip-compressed
    pub compressed: bool,
}

/// A named, ordered set of base tables required together in a dump
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableGroup {
    /// Group name (e.g. "wp")
    pub name: String,
    /// Required base table names, without any prefix
    pub tables: Vec<String>,
}

/// Result of importing the complete groups of one dump file
#[derive(Debug, Clone, Default)]
pub struct ImportOutcome {
    /// Number of staging tables created
    pub tables_created: usize,
    /// Number of INSERT statements executed
    pub inserts_count: usize,
    /// Per-statement failures, in encounter order
    pub errors: Vec<String>,
}

/// The three customer-behavior metrics scored by the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Metric {
    /// Days since the most recent qualifying order
    RecencyDays,
    /// Count of qualifying orders
    TotalOrders,
    /// Sum of qualifying order totals
    TotalSpent,
}

impl Metric {
    /// All metrics in threshold-table order
    pub const ALL: [Metric; 3] = [Metric::RecencyDays, Metric::TotalOrders, Metric::TotalSpent];

    /// Column name of the metric in the RFM base table
    #[must_use]
    pub const fn column(self) -> &'static str {
        match self {
            Self::RecencyDays => "recency_days",
            Self::TotalOrders => "total_orders",
            Self::TotalSpent => "total_spent",
        }
    }

    /// Human-readable metric label for the constants workbook
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::RecencyDays => "Purchase recency (days)",
            Self::TotalOrders => "Order count",
            Self::TotalSpent => "Total purchase value",
        }
    }

    /// Scoring direction: recency rewards small values, the others large ones
    #[must_use]
    pub const fn direction(self) -> ScoringDirection {
        match self {
            Self::RecencyDays => ScoringDirection::LowerIsBetter,
            Self::TotalOrders | Self::TotalSpent => ScoringDirection::HigherIsBetter,
        }
    }

    /// Parse a metric from its base-table column name
    #[must_use]
    pub fn from_column(column: &str) -> Option<Self> {
        match column {
            "recency_days" => Some(Self::RecencyDays),
            "total_orders" => Some(Self::TotalOrders),
            "total_spent" => Some(Self::TotalSpent),
            _ => None,
        }
    }
}

/// Direction in which raw metric values map to scores
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoringDirection {
    /// Smaller raw value earns a higher score (recency)
    LowerIsBetter,
    /// Larger raw value earns a higher score (frequency, monetary)
    HigherIsBetter,
}

impl ScoringDirection {
    /// Stable string form stored in the thresholds sheet
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::LowerIsBetter => "lower_is_better",
            Self::HigherIsBetter => "higher_is_better",
        }
    }

    /// Parse the stable string form
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "lower_is_better" => Some(Self::LowerIsBetter),
            "higher_is_better" => Some(Self::HigherIsBetter),
            _ => None,
        }
    }
}

/// One quantile bucket of one metric, with its derived score
#[derive(Debug, Clone, PartialEq)]
pub struct MetricThreshold {
    /// Metric this bucket belongs to
    pub metric: Metric,
    /// 1-based bucket index, ascending by value
    pub bucket: u32,
    /// Smallest value observed in the bucket
    pub min_value: f64,
    /// Largest value observed in the bucket
    pub max_value: f64,
    /// Score assigned to values falling in this bucket
    pub score: u32,
    /// Number of samples in the bucket
    pub sample_count: u64,
}

impl MetricThreshold {
    /// True if `value` lies inside this bucket's inclusive bounds
    #[must_use]
    pub fn contains(&self, value: f64) -> bool {
        value >= self.min_value && value <= self.max_value
    }

    /// Midpoint of the bucket bounds, used for the nearest-center tie-break
    #[must_use]
    pub fn midpoint(&self) -> f64 {
        (self.min_value + self.max_value) / 2.0
    }
}

/// Descriptive statistics for one metric over the RFM base table
#[derive(Debug, Clone)]
pub struct MetricStats {
    /// Metric the statistics describe
    pub metric: Metric,
    /// Count of non-null values
    pub count: u64,
    /// Minimum value, if any rows exist
    pub min: Option<f64>,
    /// Maximum value, if any rows exist
    pub max: Option<f64>,
    /// Mean value, if any rows exist
    pub mean: Option<f64>,
}

/// An ordered segment-classification rule; the first match wins
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentRule {
    /// Segment label assigned on match
    pub segment: String,
    /// Inclusive R score range
    pub r_min: u32,
    /// Inclusive R score range
    pub r_max: u32,
    /// Inclusive F score range
    pub f_min: u32,
    /// Inclusive F score range
    pub f_max: u32,
    /// Inclusive M score range
    pub m_min: u32,
    /// Inclusive M score range
    pub m_max: u32,
    /// Human-readable description of the segment
    pub description: String,
}

impl SegmentRule {
    /// True if all three score ranges contain the respective scores
    #[must_use]
    pub const fn matches(&self, r: u32, f: u32, m: u32) -> bool {
        self.r_min <= r
            && r <= self.r_max
            && self.f_min <= f
            && f <= self.f_max
            && self.m_min <= m
            && m <= self.m_max
    }
}

/// Raw per-customer metrics read from the RFM base table or its exports
#[derive(Debug, Clone, Default)]
pub struct CustomerMetrics {
    /// Customer's WordPress user id
    pub user_id: i64,
    /// Days since the most recent qualifying order, if known
    pub recency_days: Option<f64>,
    /// Count of qualifying orders, if known
    pub total_orders: Option<f64>,
    /// Sum of qualifying order totals, if known
    pub total_spent: Option<f64>,
}

impl CustomerMetrics {
    /// Raw value for one metric
    #[must_use]
    pub const fn value(&self, metric: Metric) -> Option<f64> {
        match metric {
            Metric::RecencyDays => self.recency_days,
            Metric::TotalOrders => self.total_orders,
            Metric::TotalSpent => self.total_spent,
        }
    }
}

/// One scored customer record, never mutated after creation
#[derive(Debug, Clone, Serialize)]
pub struct ScoredCustomer {
    /// Customer's WordPress user id
    pub user_id: i64,
    /// Recency score
    pub r_score: u32,
    /// Frequency score
    pub f_score: u32,
    /// Monetary score
    pub m_score: u32,
    /// Composite code, the concatenated "RFM" scores
    pub rfm_score: String,
    /// Assigned segment label
    pub segment: String,
    /// Raw metrics the scores were derived from
    #[serde(skip)]
    pub metrics: CustomerMetrics,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recency_rewards_small_values() {
        assert_eq!(
            Metric::RecencyDays.direction(),
            ScoringDirection::LowerIsBetter
        );
        assert_eq!(
            Metric::TotalSpent.direction(),
            ScoringDirection::HigherIsBetter
        );
    }

    #[test]
    fn threshold_contains_is_inclusive() {
        let t = MetricThreshold {
            metric: Metric::TotalOrders,
            bucket: 1,
            min_value: 1.0,
            max_value: 3.0,
            score: 1,
            sample_count: 10,
        };
        assert!(t.contains(1.0));
        assert!(t.contains(3.0));
        assert!(!t.contains(3.01));
    }

    #[test]
    fn segment_rule_matches_all_three_ranges() {
        let rule = SegmentRule {
            segment: "Champions".to_string(),
            r_min: 4,
            r_max: 5,
            f_min: 4,
            f_max: 5,
            m_min: 4,
            m_max: 5,
            description: String::new(),
        };
        assert!(rule.matches(5, 4, 5));
        assert!(!rule.matches(3, 5, 5));
    }
}

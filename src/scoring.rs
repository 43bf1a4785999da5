//! RFM scoring from a previously generated constants workbook
//!
//! Loads the machine-readable `thresholds` and `segment_rules` sheets of
//! `rfm_constant.xlsx`, scores raw customer metrics against them, assigns a
//! segment by first matching rule, and writes the `rfm_scores.xlsx` report.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use rust_xlsxwriter::Workbook;
use tracing::{debug, info, warn};

use crate::error::{Result, RfmError};
use crate::models::{CustomerMetrics, Metric, MetricThreshold, ScoredCustomer, SegmentRule};
use crate::schema::{constants_workbook, rfm_data, scores_workbook};
use crate::xlsx::{data_to_f64, data_to_string, read_first_sheet, read_sheet, write_sheet, Cell};

/// Segment assigned when no rule matches
pub const UNCLASSIFIED: &str = "Unclassified";

/// Per-metric threshold ranges loaded from the constants workbook
pub struct ThresholdTable {
    by_metric: HashMap<Metric, Vec<MetricThreshold>>,
}

impl ThresholdTable {
    /// Load the `thresholds` sheet of a constants workbook.
    ///
    /// Rows with an unknown metric or non-numeric bounds are skipped with a
    /// warning; a metric with no usable rows at all is a configuration error
    /// because every customer needs all three scores.
    pub fn load(workbook_path: &Path) -> Result<Self> {
        let sheet = read_sheet(workbook_path, constants_workbook::THRESHOLDS_SHEET)?;
        let cols = sheet.required_columns(&["metric", "score", "min_value", "max_value"])?;
        let metric_col = cols["metric"];
        let score_col = cols["score"];
        let min_col = cols["min_value"];
        let max_col = cols["max_value"];
        let bucket_col = sheet.header().iter().position(|h| h == "bucket");
        let count_col = sheet.header().iter().position(|h| h == "sample_count");

        let mut by_metric: HashMap<Metric, Vec<MetricThreshold>> = HashMap::new();
        for row in sheet.rows() {
            let metric_name = row.get(metric_col).map(data_to_string).unwrap_or_default();
            let Some(metric) = Metric::from_column(&metric_name) else {
                if !metric_name.is_empty() {
                    warn!(metric = %metric_name, "Skipping threshold row for unknown metric");
                }
                continue;
            };
            let score = row.get(score_col).and_then(data_to_f64);
            let min_value = row.get(min_col).and_then(data_to_f64);
            let max_value = row.get(max_col).and_then(data_to_f64);
            let (Some(score), Some(min_value), Some(max_value)) = (score, min_value, max_value)
            else {
                warn!(metric = metric.column(), "Skipping threshold row with non-numeric fields");
                continue;
            };
            let bucket = bucket_col
                .and_then(|c| row.get(c))
                .and_then(data_to_f64)
                .unwrap_or(0.0);
            let sample_count = count_col
                .and_then(|c| row.get(c))
                .and_then(data_to_f64)
                .unwrap_or(0.0);
            by_metric.entry(metric).or_default().push(MetricThreshold {
                metric,
                bucket: bucket as u32,
                min_value,
                max_value,
                score: score as u32,
                sample_count: sample_count as u64,
            });
        }

        for metric in Metric::ALL {
            match by_metric.get_mut(&metric) {
                Some(thresholds) if !thresholds.is_empty() => {
                    thresholds.sort_by(|a, b| a.min_value.total_cmp(&b.min_value));
                }
                _ => {
                    return Err(RfmError::Config(format!(
                        "constants workbook has no thresholds for metric '{}'",
                        metric.column()
                    )));
                }
            }
        }
        Ok(Self { by_metric })
    }

    /// Score one raw metric value.
    ///
    /// A missing value scores 0. Values below the lowest range or above the
    /// highest clamp to the respective boundary band. A value falling in a
    /// numeric gap between adjacent ranges takes the score of the band whose
    /// midpoint is nearest.
    #[must_use]
    pub fn score(&self, metric: Metric, value: Option<f64>) -> u32 {
        let Some(value) = value else {
            return 0;
        };
        let Some(thresholds) = self.by_metric.get(&metric) else {
            return 0;
        };
        let Some(first) = thresholds.first() else {
            return 0;
        };
        let Some(last) = thresholds.last() else {
            return 0;
        };

        if let Some(hit) = thresholds.iter().find(|t| t.contains(value)) {
            return hit.score;
        }
        if value < first.min_value {
            return first.score;
        }
        if value > last.max_value {
            return last.score;
        }

        // In a gap between adjacent bands: pick the nearest band center.
        let mut best = first;
        let mut best_distance = f64::INFINITY;
        for t in thresholds {
            let distance = (value - t.midpoint()).abs();
            if distance < best_distance {
                best_distance = distance;
                best = t;
            }
        }
        debug!(
            metric = metric.column(),
            value,
            score = best.score,
            "Value fell between threshold ranges; using nearest band"
        );
        best.score
    }
}

/// Load the `segment_rules` sheet of a constants workbook.
///
/// Missing required columns are a configuration error; individual rows with
/// non-numeric bounds are skipped with a warning.
pub fn load_segment_rules(workbook_path: &Path) -> Result<Vec<SegmentRule>> {
    let sheet = read_sheet(workbook_path, constants_workbook::SEGMENT_RULES_SHEET)?;
    let cols = sheet.required_columns(&constants_workbook::SEGMENT_RULE_COLUMNS)?;

    let bound = |row: &[calamine::Data], name: &str| -> Option<u32> {
        row.get(cols[name])
            .and_then(data_to_f64)
            .filter(|v| *v >= 0.0)
            .map(|v| v as u32)
    };

    let mut rules = Vec::new();
    for row in sheet.rows() {
        let segment = row.get(cols["segment"]).map(data_to_string).unwrap_or_default();
        if segment.is_empty() {
            continue;
        }
        let bounds = (
            bound(row, "r_min"),
            bound(row, "r_max"),
            bound(row, "f_min"),
            bound(row, "f_max"),
            bound(row, "m_min"),
            bound(row, "m_max"),
        );
        let (Some(r_min), Some(r_max), Some(f_min), Some(f_max), Some(m_min), Some(m_max)) = bounds
        else {
            warn!(segment = %segment, "Skipping segment rule with non-numeric bounds");
            continue;
        };
        rules.push(SegmentRule {
            segment,
            r_min,
            r_max,
            f_min,
            f_max,
            m_min,
            m_max,
            description: row
                .get(cols["description"])
                .map(data_to_string)
                .unwrap_or_default(),
        });
    }
    info!(rules = rules.len(), "Loaded segment rules");
    Ok(rules)
}

/// Read one `rfm_data` export chunk into raw customer metrics
pub fn load_customer_metrics(chunk_path: &Path) -> Result<Vec<CustomerMetrics>> {
    let sheet = read_first_sheet(chunk_path)?;
    let cols = sheet.required_columns(&[
        rfm_data::USER_ID,
        rfm_data::RECENCY_DAYS,
        rfm_data::TOTAL_ORDERS,
        rfm_data::TOTAL_SPENT,
    ])?;

    let mut customers = Vec::new();
    for row in sheet.rows() {
        let Some(user_id) = row.get(cols[rfm_data::USER_ID]).and_then(data_to_f64) else {
            continue;
        };
        customers.push(CustomerMetrics {
            user_id: user_id as i64,
            recency_days: row.get(cols[rfm_data::RECENCY_DAYS]).and_then(data_to_f64),
            total_orders: row.get(cols[rfm_data::TOTAL_ORDERS]).and_then(data_to_f64),
            total_spent: row.get(cols[rfm_data::TOTAL_SPENT]).and_then(data_to_f64),
        });
    }
    Ok(customers)
}

/// Scores customers against loaded thresholds and segment rules
pub struct RfmScoringEngine {
    thresholds: ThresholdTable,
    rules: Vec<SegmentRule>,
}

impl RfmScoringEngine {
    /// Load both scoring inputs from a constants workbook
    pub fn load(workbook_path: &Path) -> Result<Self> {
        Ok(Self {
            thresholds: ThresholdTable::load(workbook_path)?,
            rules: load_segment_rules(workbook_path)?,
        })
    }

    /// Build an engine from already-loaded inputs
    #[must_use]
    pub fn new(thresholds: ThresholdTable, rules: Vec<SegmentRule>) -> Self {
        Self { thresholds, rules }
    }

    /// Score one customer and assign their segment
    #[must_use]
    pub fn score_customer(&self, metrics: CustomerMetrics) -> ScoredCustomer {
        let r_score = self.thresholds.score(Metric::RecencyDays, metrics.recency_days);
        let f_score = self.thresholds.score(Metric::TotalOrders, metrics.total_orders);
        let m_score = self.thresholds.score(Metric::TotalSpent, metrics.total_spent);
        let segment = self
            .rules
            .iter()
            .find(|rule| rule.matches(r_score, f_score, m_score))
            .map_or_else(|| UNCLASSIFIED.to_string(), |rule| rule.segment.clone());
        ScoredCustomer {
            user_id: metrics.user_id,
            r_score,
            f_score,
            m_score,
            rfm_score: format!("{r_score}{f_score}{m_score}"),
            segment,
            metrics,
        }
    }

    /// Write `rfm_scores.xlsx` into `output_folder` and return its path
    pub fn write_scores(
        &self,
        output_folder: &Path,
        scored: &[ScoredCustomer],
    ) -> Result<PathBuf> {
        std::fs::create_dir_all(output_folder)?;
        let output_path = output_folder.join(scores_workbook::FILE_NAME);

        let mut workbook = Workbook::new();
        let worksheet = workbook.add_worksheet().set_name("scores")?;
        let rows: Vec<Vec<Cell>> = scored
            .iter()
            .map(|c| {
                vec![
                    c.user_id.into(),
                    c.r_score.into(),
                    c.f_score.into(),
                    c.m_score.into(),
                    c.rfm_score.clone().into(),
                    c.segment.clone().into(),
                    c.metrics.recency_days.into(),
                    c.metrics.total_orders.into(),
                    c.metrics.total_spent.into(),
                ]
            })
            .collect();
        write_sheet(worksheet, &scores_workbook::COLUMNS, &rows)?;
        workbook.save(&output_path)?;
        info!(path = %output_path.display(), customers = scored.len(), "Wrote scores workbook");
        Ok(output_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(thresholds: Vec<MetricThreshold>) -> ThresholdTable {
        let mut by_metric: HashMap<Metric, Vec<MetricThreshold>> = HashMap::new();
        for t in thresholds {
            by_metric.entry(t.metric).or_default().push(t);
        }
        for v in by_metric.values_mut() {
            v.sort_by(|a, b| a.min_value.total_cmp(&b.min_value));
        }
        ThresholdTable { by_metric }
    }

    fn band(min: f64, max: f64, score: u32) -> MetricThreshold {
        MetricThreshold {
            metric: Metric::TotalSpent,
            bucket: score,
            min_value: min,
            max_value: max,
            score,
            sample_count: 1,
        }
    }

    #[test]
    fn values_clamp_to_boundary_bands() {
        let t = table(vec![band(10.0, 20.0, 1), band(21.0, 30.0, 2)]);
        assert_eq!(t.score(Metric::TotalSpent, Some(5.0)), 1);
        assert_eq!(t.score(Metric::TotalSpent, Some(99.0)), 2);
    }

    #[test]
    fn gap_values_take_the_nearest_band() {
        let t = table(vec![band(0.0, 10.0, 1), band(20.0, 30.0, 2)]);
        assert_eq!(t.score(Metric::TotalSpent, Some(11.0)), 1);
        assert_eq!(t.score(Metric::TotalSpent, Some(19.0)), 2);
    }

    #[test]
    fn missing_values_score_zero() {
        let t = table(vec![band(0.0, 10.0, 1)]);
        assert_eq!(t.score(Metric::TotalSpent, None), 0);
    }

    #[test]
    fn unmatched_customers_are_unclassified() {
        let engine = RfmScoringEngine::new(
            table(vec![band(0.0, 100.0, 3)]),
            vec![SegmentRule {
                segment: "Champions".to_string(),
                r_min: 4,
                r_max: 5,
                f_min: 4,
                f_max: 5,
                m_min: 4,
                m_max: 5,
                description: String::new(),
            }],
        );
        let scored = engine.score_customer(CustomerMetrics {
            user_id: 7,
            recency_days: None,
            total_orders: None,
            total_spent: Some(50.0),
        });
        assert_eq!(scored.segment, UNCLASSIFIED);
        assert_eq!(scored.rfm_score, "003");
    }
}

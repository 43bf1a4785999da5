//! RFM constants workbook generation
//!
//! Splits each metric of the RFM base table into quantile bands with NTILE,
//! maps bands to scores according to the metric's scoring direction, and
//! writes the `rfm_constant.xlsx` workbook: a `meta` sheet, a
//! machine-readable `thresholds` sheet, per-metric `metric_stats`, and the
//! default `segment_rules`.

use std::path::{Path, PathBuf};

use chrono::Local;
use rust_xlsxwriter::Workbook;
use tracing::{info, warn};

use crate::error::Result;
use crate::models::{Metric, MetricStats, MetricThreshold, ScoringDirection, SegmentRule};
use crate::schema::{constants_workbook, rfm_data};
use crate::shamsi::ShamsiDate;
use crate::store::StagingStore;
use crate::xlsx::{write_sheet, Cell};

/// Builds quantile thresholds and the constants workbook
pub struct RfmConstantsEngine<'a> {
    store: &'a StagingStore,
    quantile_bands: u32,
}

impl<'a> RfmConstantsEngine<'a> {
    /// Create an engine with the configured band count. Fewer than two bands
    /// cannot form a quantile split, so the count is floored at two.
    #[must_use]
    pub fn new(store: &'a StagingStore, quantile_bands: u32) -> Self {
        Self {
            store,
            quantile_bands: quantile_bands.max(2),
        }
    }

    /// Quantile thresholds for one metric, ascending by bucket.
    ///
    /// Each non-null value is assigned to one of Q NTILE buckets ordered by
    /// value; the bucket's observed min/max become the threshold bounds.
    /// Recency maps bucket b to score Q+1-b, the other metrics to b.
    pub fn metric_thresholds(&self, metric: Metric) -> Result<Vec<MetricThreshold>> {
        let column = metric.column();
        let sql = format!(
            r#"WITH ranked AS (
    SELECT
        CAST("{column}" AS REAL) AS val,
        NTILE({bands}) OVER (ORDER BY CAST("{column}" AS REAL) ASC) AS bucket
    FROM "{table}"
    WHERE "{column}" IS NOT NULL
)
SELECT bucket, MIN(val), MAX(val), COUNT(*)
FROM ranked
GROUP BY bucket
ORDER BY bucket"#,
            bands = self.quantile_bands,
            table = rfm_data::TABLE,
        );

        let conn = self.store.conn()?;
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, f64>(1)?,
                row.get::<_, f64>(2)?,
                row.get::<_, i64>(3)?,
            ))
        })?;

        let mut thresholds = Vec::new();
        for row in rows {
            let (bucket, min_value, max_value, count) = row?;
            let bucket = u32::try_from(bucket).unwrap_or(0);
            let score = match metric.direction() {
                ScoringDirection::LowerIsBetter => self.quantile_bands + 1 - bucket,
                ScoringDirection::HigherIsBetter => bucket,
            };
            thresholds.push(MetricThreshold {
                metric,
                bucket,
                min_value,
                max_value,
                score,
                sample_count: u64::try_from(count).unwrap_or(0),
            });
        }
        Ok(thresholds)
    }

    /// Descriptive statistics for one metric
    pub fn metric_stats(&self, metric: Metric) -> Result<MetricStats> {
        let column = metric.column();
        let sql = format!(
            r#"SELECT
    COUNT("{column}"),
    MIN(CAST("{column}" AS REAL)),
    MAX(CAST("{column}" AS REAL)),
    AVG(CAST("{column}" AS REAL))
FROM "{table}""#,
            table = rfm_data::TABLE,
        );
        let conn = self.store.conn()?;
        let (count, min, max, mean) = conn.query_row(&sql, [], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, Option<f64>>(1)?,
                row.get::<_, Option<f64>>(2)?,
                row.get::<_, Option<f64>>(3)?,
            ))
        })?;
        Ok(MetricStats {
            metric,
            count: u64::try_from(count).unwrap_or(0),
            min,
            max,
            mean,
        })
    }

    /// Default segment rules for the configured band count.
    ///
    /// Five bands get the fixed five-segment taxonomy; any other count gets a
    /// generic three-tier split derived from the band count.
    #[must_use]
    pub fn default_segment_rules(&self) -> Vec<SegmentRule> {
        let q = self.quantile_bands;
        if q == 5 {
            return vec![
                rule("Champions", 4, 5, 4, 5, 4, 5, "Highly valuable and active buyers"),
                rule("Loyal Customers", 3, 5, 4, 5, 3, 5, "Loyal customers with steady purchases"),
                rule(
                    "Potential Loyalist",
                    4,
                    5,
                    2,
                    3,
                    2,
                    5,
                    "New or growing, worth nurturing toward loyalty",
                ),
                rule("At Risk", 1, 2, 3, 5, 3, 5, "Were good customers but have recently dropped off"),
                rule("Hibernating", 1, 2, 1, 2, 1, 2, "Inactive or low value, needs a reactivation campaign"),
            ];
        }
        let high_min = (q - 1).max(1);
        let mid_min = (q / 2).max(1);
        let low_max = 2.min(q);
        vec![
            rule(
                "Top Value",
                high_min,
                q,
                high_min,
                q,
                high_min,
                q,
                "Generic definition for the top bands",
            ),
            rule(
                "Mid Value",
                mid_min,
                q,
                mid_min,
                q,
                mid_min,
                q,
                "Generic definition for mid-range customers",
            ),
            rule(
                "Low Value",
                1,
                low_max,
                1,
                low_max,
                1,
                low_max,
                "Generic definition for low-value customers",
            ),
        ]
    }

    /// Build `rfm_constant.xlsx` in `output_folder` and return its path
    pub fn write_workbook(&self, output_folder: &Path) -> Result<PathBuf> {
        std::fs::create_dir_all(output_folder)?;
        let output_path = output_folder.join(constants_workbook::FILE_NAME);
        let total_rows = self.store.row_count(rfm_data::TABLE)?;

        let mut workbook = Workbook::new();

        let meta = workbook.add_worksheet().set_name(constants_workbook::META_SHEET)?;
        let now = Local::now();
        let today = ShamsiDate::from_gregorian(now.date_naive());
        let mut meta_rows: Vec<Vec<Cell>> = vec![
            vec!["table_name".into(), rfm_data::TABLE.into()],
            vec![
                "generated_at_shamsi".into(),
                format!("{today} {}", now.format("%H:%M:%S")).into(),
            ],
            vec!["total_rows".into(), total_rows.into()],
            vec!["quantile_bands".into(), u64::from(self.quantile_bands).into()],
            vec![
                "note".into(),
                format!(
                    "Bands were built with NTILE({}) over the current data.",
                    self.quantile_bands
                )
                .into(),
            ],
            vec![
                "note2".into(),
                "For recency, a smaller value earns a higher score.".into(),
            ],
        ];
        if total_rows == 0 {
            warn!("RFM base table is empty; constants workbook will carry a warning");
            meta_rows.push(vec![
                "warning".into(),
                "The rfm_data table is empty; thresholds may be incomplete.".into(),
            ]);
        }
        write_sheet(meta, &["key", "value"], &meta_rows)?;

        let thresholds_sheet = workbook
            .add_worksheet()
            .set_name(constants_workbook::THRESHOLDS_SHEET)?;
        let mut threshold_rows: Vec<Vec<Cell>> = Vec::new();
        for metric in Metric::ALL {
            for t in self.metric_thresholds(metric)? {
                threshold_rows.push(threshold_row(&t, self.quantile_bands));
            }
        }
        write_sheet(
            thresholds_sheet,
            &constants_workbook::THRESHOLD_COLUMNS,
            &threshold_rows,
        )?;

        let stats_sheet = workbook
            .add_worksheet()
            .set_name(constants_workbook::STATS_SHEET)?;
        let mut stats_rows: Vec<Vec<Cell>> = Vec::new();
        for metric in Metric::ALL {
            let s = self.metric_stats(metric)?;
            stats_rows.push(vec![
                metric.column().into(),
                metric.label().into(),
                s.count.into(),
                s.min.into(),
                s.max.into(),
                s.mean.into(),
            ]);
        }
        write_sheet(
            stats_sheet,
            &["metric", "metric_label", "count", "min", "max", "avg"],
            &stats_rows,
        )?;

        let rules_sheet = workbook
            .add_worksheet()
            .set_name(constants_workbook::SEGMENT_RULES_SHEET)?;
        let rule_rows: Vec<Vec<Cell>> = self
            .default_segment_rules()
            .iter()
            .map(|r| {
                vec![
                    r.segment.clone().into(),
                    r.r_min.into(),
                    r.r_max.into(),
                    r.f_min.into(),
                    r.f_max.into(),
                    r.m_min.into(),
                    r.m_max.into(),
                    r.description.clone().into(),
                ]
            })
            .collect();
        write_sheet(rules_sheet, &constants_workbook::SEGMENT_RULE_COLUMNS, &rule_rows)?;

        workbook.save(&output_path)?;
        info!(path = %output_path.display(), total_rows, "Wrote constants workbook");
        Ok(output_path)
    }
}

/// Band label shown to users next to each threshold row
#[must_use]
pub fn band_label(metric: Metric, score: u32, max_score: u32) -> String {
    let named = match (metric, score) {
        (Metric::RecencyDays, 5) => "Very recent",
        (Metric::RecencyDays, 4) => "Recent",
        (Metric::RecencyDays, 2) => "Old",
        (Metric::RecencyDays, 1) => "Very old",
        (Metric::TotalOrders, 5) => "Very frequent",
        (Metric::TotalOrders, 4) => "Frequent",
        (Metric::TotalOrders, 2) => "Infrequent",
        (Metric::TotalOrders, 1) => "Very infrequent",
        (Metric::TotalSpent, 5) => "Very high value",
        (Metric::TotalSpent, 4) => "High value",
        (Metric::TotalSpent, 2) => "Low value",
        (Metric::TotalSpent, 1) => "Very low value",
        (_, 3) => "Average",
        _ => "",
    };
    if named.is_empty() {
        format!("Level {score} of {max_score}")
    } else {
        named.to_string()
    }
}

fn threshold_row(t: &MetricThreshold, bands: u32) -> Vec<Cell> {
    let percentile_from = round2(f64::from(t.bucket - 1) / f64::from(bands) * 100.0);
    let percentile_to = round2(f64::from(t.bucket) / f64::from(bands) * 100.0);
    vec![
        t.metric.column().into(),
        t.metric.label().into(),
        t.bucket.into(),
        format!("Q{}", t.bucket).into(),
        percentile_from.into(),
        percentile_to.into(),
        t.score.into(),
        t.min_value.into(),
        t.max_value.into(),
        t.sample_count.into(),
        band_label(t.metric, t.score, bands).into(),
        t.metric.direction().as_str().into(),
        format!("{:.2} <= {} <= {:.2}", t.min_value, t.metric.column(), t.max_value).into(),
    ]
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

#[allow(clippy::too_many_arguments)]
fn rule(
    segment: &str,
    r_min: u32,
    r_max: u32,
    f_min: u32,
    f_max: u32,
    m_min: u32,
    m_max: u32,
    description: &str,
) -> SegmentRule {
    SegmentRule {
        segment: segment.to_string(),
        r_min,
        r_max,
        f_min,
        f_max,
        m_min,
        m_max,
        description: description.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn named_labels_cover_the_five_band_scores() {
        assert_eq!(band_label(Metric::RecencyDays, 5, 5), "Very recent");
        assert_eq!(band_label(Metric::TotalOrders, 3, 5), "Average");
        assert_eq!(band_label(Metric::TotalSpent, 1, 5), "Very low value");
    }

    #[test]
    fn unnamed_scores_fall_back_to_level_text() {
        assert_eq!(band_label(Metric::TotalSpent, 7, 10), "Level 7 of 10");
    }
}

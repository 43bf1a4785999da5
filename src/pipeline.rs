//! Run orchestration
//!
//! Two entry flows mirror the tool's lifecycle. An import run takes a dump
//! file through staging, derived relations, chunked exports, and the
//! constants workbook, ending in a self-contained output folder. A scoring
//! run re-enters such a folder later, scores the exported RFM data against
//! the folder's own constants workbook, and adds `rfm_scores.xlsx`.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{Local, NaiveDate};
use serde::Serialize;
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::constants::RfmConstantsEngine;
use crate::dump_reader::DumpReader;
use crate::error::{Result, RfmError};
use crate::exporter::ChunkedTableExporter;
use crate::importer::DumpImporter;
use crate::logging::OperationTimer;
use crate::models::{FileInfo, ImportOutcome};
use crate::schema::{customer_purchases, rfm_data, user_full_data, MANIFEST_FILE, RFM_DATA_EXPORT_BASE, STAGING_DB_COPY};
use crate::scoring::{load_customer_metrics, RfmScoringEngine};
use crate::shamsi::parse_cutoff;
use crate::store::StagingStore;
use crate::validation::OutputFolderValidator;
use crate::views::DerivedViewBuilder;

/// Human headers of the customer purchases export
const USER_ORDERS_HEADERS: [&str; 8] = [
    "User ID",
    "User name",
    "Email",
    "Mobile number",
    "Order ID",
    "Purchase date",
    "Purchase amount",
    "Order status",
];

/// Number of importer errors surfaced verbatim; the rest are summarized
const SURFACED_ERRORS: usize = 5;

/// Everything an import run produced, for reporting
#[derive(Debug)]
pub struct ImportReport {
    /// The dump that was imported
    pub dump: FileInfo,
    /// Detected table-name prefix, possibly empty
    pub prefix: String,
    /// Names of the groups imported
    pub complete_groups: Vec<String>,
    /// Statement-level import result
    pub outcome: ImportOutcome,
    /// Recommended indexes created after the import
    pub indexes_created: usize,
    /// Row counts per staged and derived relation
    pub table_row_counts: BTreeMap<String, u64>,
    /// The run's output folder
    pub output_folder: PathBuf,
    /// All workbook files written, in creation order
    pub exported_files: Vec<PathBuf>,
}

/// Machine-readable record of one import run, written as `manifest.json`
#[derive(Debug, Serialize)]
struct RunManifest<'a> {
    dump_file: &'a str,
    dump_size_mb: f64,
    prefix: &'a str,
    complete_groups: &'a [String],
    cutoff_date: Option<String>,
    tables_created: usize,
    inserts_count: usize,
    import_errors: &'a [String],
    table_row_counts: &'a BTreeMap<String, u64>,
    generated_at: String,
}

/// Sequential pipeline over one configuration
pub struct Pipeline {
    config: AppConfig,
}

impl Pipeline {
    /// Create a pipeline; the configuration is never mutated afterwards
    #[must_use]
    pub const fn new(config: AppConfig) -> Self {
        Self { config }
    }

    /// The reader over the configured dump directory and table groups
    #[must_use]
    pub fn dump_reader(&self) -> DumpReader {
        DumpReader::new(
            Path::new(&self.config.paths.dump_dir),
            &self.config.table_groups,
        )
    }

    /// Run a full import: stage the dump, derive the analytical relations,
    /// export everything, and archive the staging database.
    ///
    /// `cutoff_input` is a Shamsi `YYYY/MM/DD` date; empty or "0" means no
    /// cutoff.
    pub fn run_import(&self, dump_path: &Path, cutoff_input: &str) -> Result<ImportReport> {
        let timer = OperationTimer::new("import run");
        let cutoff = parse_cutoff(cutoff_input)?;
        match cutoff {
            Some(date) => info!(%date, "RFM metrics measured up to the cutoff date"),
            None => info!("RFM metrics measured over all transactions"),
        }

        let store = StagingStore::open(Path::new(&self.config.paths.staging_db))?;
        let dropped = store.clear_all_tables()?;
        info!(dropped, "Staging store cleared");

        let reader = self.dump_reader();
        let dump = reader.get_info(dump_path)?;
        info!(
            name = %dump.name,
            size_mb = dump.size_mb,
            compressed = dump.compressed,
            "Selected dump"
        );

        let prefix = reader.detect_prefix(dump_path)?;
        if prefix.is_empty() {
            info!("No table-name prefix detected");
        } else {
            info!(prefix, "Detected table-name prefix");
        }

        let complete_groups = reader.get_complete_groups(dump_path, &prefix)?;
        for group in &self.config.table_groups {
            let present = complete_groups.contains(&group.name);
            info!(group = %group.name, complete = present, "Group completeness");
        }
        if complete_groups.is_empty() {
            return Err(RfmError::Validation(format!(
                "dump {} contains no complete table group",
                dump.name
            )));
        }

        let importer = DumpImporter::new(&store);
        let outcome = importer.import_complete_groups(
            dump_path,
            &complete_groups,
            &self.config.table_groups,
            &prefix,
        )?;
        report_import_errors(&outcome);

        let indexes_created = store.ensure_recommended_indexes()?;
        if indexes_created > 0 {
            info!(indexes_created, "Recommended indexes created");
        }
        let mut table_row_counts = store.get_table_row_counts()?;

        if complete_groups.iter().any(|g| g == "wp") {
            let builder = DerivedViewBuilder::new(&store);
            table_row_counts.insert(
                customer_purchases::VIEW.to_string(),
                builder.build_customer_purchases()?,
            );
            table_row_counts.insert(
                user_full_data::TABLE.to_string(),
                builder.build_user_full_data()?,
            );
            table_row_counts.insert(rfm_data::TABLE.to_string(), builder.build_rfm_base(cutoff)?);
        }

        let folder_name = match prefix.trim_end_matches('_') {
            "" => "output",
            trimmed => trimmed,
        };
        let output_folder = create_output_folder(Path::new(&self.config.paths.output_dir), folder_name)?;
        info!(folder = %output_folder.display(), "Output folder created");

        self.write_manifest(
            &output_folder,
            &dump,
            &prefix,
            &complete_groups,
            cutoff,
            &outcome,
            &table_row_counts,
        )?;

        let exporter = ChunkedTableExporter::new(
            &store,
            &output_folder,
            self.config.export.max_rows_per_file,
        )?;
        let mut exported_files = Vec::new();

        if table_row_counts.contains_key(customer_purchases::VIEW) {
            exported_files.extend(exporter.export(
                customer_purchases::VIEW,
                "user_orders",
                Some(&USER_ORDERS_HEADERS),
                None,
            )?);
        }
        if table_row_counts.contains_key(user_full_data::TABLE) {
            exported_files.extend(exporter.export(
                user_full_data::TABLE,
                user_full_data::TABLE,
                None,
                None,
            )?);
        }
        if table_row_counts.contains_key(rfm_data::TABLE) {
            let formats: HashMap<String, String> = [
                (rfm_data::TOTAL_SPENT.to_string(), "#,##0".to_string()),
                (rfm_data::LAST_ORDER_AMOUNT.to_string(), "#,##0".to_string()),
            ]
            .into_iter()
            .collect();
            exported_files.extend(exporter.export(
                rfm_data::TABLE,
                RFM_DATA_EXPORT_BASE,
                None,
                Some(&formats),
            )?);

            let engine = RfmConstantsEngine::new(&store, self.config.rfm.quantile_bands);
            exported_files.push(engine.write_workbook(&output_folder)?);
        }

        store.copy_to(&output_folder.join(STAGING_DB_COPY))?;
        info!(db = STAGING_DB_COPY, "Staging database archived in output folder");

        timer.finish();
        Ok(ImportReport {
            dump,
            prefix,
            complete_groups,
            outcome,
            indexes_created,
            table_row_counts,
            output_folder,
            exported_files,
        })
    }

    /// Re-enter a previously generated output folder and produce
    /// `rfm_scores.xlsx` from its exported RFM data and constants workbook.
    pub fn run_scoring(&self, output_folder: &Path) -> Result<PathBuf> {
        let timer = OperationTimer::new("scoring run");

        let chunks = OutputFolderValidator::validate(output_folder)?;
        let engine = RfmScoringEngine::load(
            &output_folder.join(crate::schema::constants_workbook::FILE_NAME),
        )?;

        let mut scored = Vec::new();
        for chunk in &chunks {
            info!(chunk = %chunk.display(), "Scoring export chunk");
            for metrics in load_customer_metrics(chunk)? {
                scored.push(engine.score_customer(metrics));
            }
        }
        if scored.is_empty() {
            warn!("No customers found in the exported RFM data");
        }

        let path = engine.write_scores(output_folder, &scored)?;
        timer.finish();
        Ok(path)
    }

    #[allow(clippy::too_many_arguments)]
    fn write_manifest(
        &self,
        output_folder: &Path,
        dump: &FileInfo,
        prefix: &str,
        complete_groups: &[String],
        cutoff: Option<NaiveDate>,
        outcome: &ImportOutcome,
        table_row_counts: &BTreeMap<String, u64>,
    ) -> Result<()> {
        let manifest = RunManifest {
            dump_file: &dump.name,
            dump_size_mb: dump.size_mb,
            prefix,
            complete_groups,
            cutoff_date: cutoff.map(|d| d.format("%Y-%m-%d").to_string()),
            tables_created: outcome.tables_created,
            inserts_count: outcome.inserts_count,
            import_errors: &outcome.errors,
            table_row_counts,
            generated_at: Local::now().to_rfc3339(),
        };
        let json = serde_json::to_string_pretty(&manifest)
            .map_err(|e| RfmError::Export(format!("manifest serialization failed: {e}")))?;
        fs::write(output_folder.join(MANIFEST_FILE), json)?;
        Ok(())
    }
}

/// Log the first few statement-level import errors and summarize the rest
fn report_import_errors(outcome: &ImportOutcome) {
    for error in outcome.errors.iter().take(SURFACED_ERRORS) {
        warn!(error = %error, "Import statement failed");
    }
    if outcome.errors.len() > SURFACED_ERRORS {
        warn!(
            remaining = outcome.errors.len() - SURFACED_ERRORS,
            "Further import errors omitted from the log"
        );
    }
}

/// Create a uniquely named run folder under `output_dir`
fn create_output_folder(output_dir: &Path, name: &str) -> Result<PathBuf> {
    let mut candidate = output_dir.join(name);
    let mut suffix = 1;
    while candidate.exists() {
        suffix += 1;
        candidate = output_dir.join(format!("{name}_{suffix}"));
    }
    fs::create_dir_all(&candidate)?;
    Ok(candidate)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_folders_never_collide() {
        let dir = tempfile::tempdir().expect("tempdir");
        let first = create_output_folder(dir.path(), "wp").expect("first");
        let second = create_output_folder(dir.path(), "wp").expect("second");
        assert_ne!(first, second);
        assert!(first.is_dir());
        assert!(second.is_dir());
    }
}

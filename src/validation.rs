//! Output-folder validation for re-entry runs
//!
//! A scoring run starts from a folder produced by an earlier import run.
//! Before any scoring happens the folder is checked for the constants
//! workbook (with its machine-readable sheets and columns) and at least one
//! readable `rfm_data` export chunk.

use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::{Result, RfmError};
use crate::exporter::sorted_chunk_files;
use crate::schema::{constants_workbook, rfm_data, RFM_DATA_EXPORT_BASE};
use crate::xlsx::{read_first_sheet, read_sheet, sheet_names};

/// Validates previously generated output folders
pub struct OutputFolderValidator;

impl OutputFolderValidator {
    /// Check a folder end to end and return the ordered `rfm_data` chunk
    /// paths a scoring run should consume.
    pub fn validate(folder: &Path) -> Result<Vec<PathBuf>> {
        if !folder.is_dir() {
            return Err(RfmError::NotFound(folder.to_path_buf()));
        }
        Self::validate_constants_workbook(folder)?;
        let chunks = Self::validate_rfm_chunks(folder)?;
        info!(folder = %folder.display(), chunks = chunks.len(), "Output folder is valid");
        Ok(chunks)
    }

    /// The constants workbook must exist and carry the thresholds and
    /// segment-rules sheets with their required columns.
    pub fn validate_constants_workbook(folder: &Path) -> Result<()> {
        let path = folder.join(constants_workbook::FILE_NAME);
        if !path.is_file() {
            return Err(RfmError::Validation(format!(
                "missing {} in {}",
                constants_workbook::FILE_NAME,
                folder.display()
            )));
        }

        let sheets = sheet_names(&path)?;
        for required in [
            constants_workbook::THRESHOLDS_SHEET,
            constants_workbook::SEGMENT_RULES_SHEET,
        ] {
            if !sheets.iter().any(|s| s == required) {
                return Err(RfmError::Validation(format!(
                    "{} is missing the '{required}' sheet",
                    constants_workbook::FILE_NAME
                )));
            }
        }

        read_sheet(&path, constants_workbook::THRESHOLDS_SHEET)?
            .required_columns(&["metric", "score", "min_value", "max_value"])
            .map_err(|e| RfmError::Validation(format!("thresholds sheet: {e}")))?;
        read_sheet(&path, constants_workbook::SEGMENT_RULES_SHEET)?
            .required_columns(&constants_workbook::SEGMENT_RULE_COLUMNS)
            .map_err(|e| RfmError::Validation(format!("segment_rules sheet: {e}")))?;
        Ok(())
    }

    /// At least one `rfm_data` chunk must exist, and the first chunk must
    /// carry the metric columns the scorer reads.
    pub fn validate_rfm_chunks(folder: &Path) -> Result<Vec<PathBuf>> {
        let chunks = sorted_chunk_files(folder, RFM_DATA_EXPORT_BASE)?;
        let Some(first) = chunks.first() else {
            return Err(RfmError::Validation(format!(
                "no {RFM_DATA_EXPORT_BASE} export chunks in {}",
                folder.display()
            )));
        };

        read_first_sheet(first)?
            .required_columns(&[
                rfm_data::USER_ID,
                rfm_data::RECENCY_DAYS,
                rfm_data::TOTAL_ORDERS,
                rfm_data::TOTAL_SPENT,
            ])
            .map_err(|e| {
                RfmError::Validation(format!("{}: {e}", first.display()))
            })?;
        Ok(chunks)
    }
}

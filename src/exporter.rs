//! Chunked spreadsheet export
//!
//! Streams any staged table or view into sequential `{n}_{base_name}.xlsx`
//! files, each holding a header row plus at most the configured number of
//! data rows. Rows are pulled through a forward-only cursor; nothing is
//! materialized beyond the workbook currently being written.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use rusqlite::types::ValueRef;
use rust_xlsxwriter::{Format, Workbook};
use tracing::{info, warn};

use crate::error::{Result, RfmError};
use crate::store::StagingStore;
use crate::xlsx::Cell;

/// Streams staged relations into paginated workbooks
pub struct ChunkedTableExporter<'a> {
    store: &'a StagingStore,
    output_dir: PathBuf,
    max_rows: usize,
}

impl<'a> ChunkedTableExporter<'a> {
    /// Create an exporter writing into `output_dir` with `max_rows` data rows
    /// per file.
    pub fn new(store: &'a StagingStore, output_dir: &Path, max_rows: usize) -> Result<Self> {
        if max_rows == 0 {
            return Err(RfmError::Export("max_rows must be greater than 0".into()));
        }
        fs::create_dir_all(output_dir)?;
        Ok(Self {
            store,
            output_dir: output_dir.to_path_buf(),
            max_rows,
        })
    }

    /// Export `relation` to one or more chunk files named `{n}_{base_name}.xlsx`.
    ///
    /// `headers` overrides the relation's column names in the header row;
    /// `formats` maps column names to number-format strings applied uniformly
    /// across all chunks. Returns the written paths in chunk order.
    pub fn export(
        &self,
        relation: &str,
        base_name: &str,
        headers: Option<&[&str]>,
        formats: Option<&HashMap<String, String>>,
    ) -> Result<Vec<PathBuf>> {
        let conn = self.store.conn()?;
        let mut stmt = conn.prepare(&format!("SELECT * FROM \"{relation}\""))?;
        let columns: Vec<String> = stmt.column_names().iter().map(ToString::to_string).collect();

        let header_cells: Vec<String> = match headers {
            Some(names) => {
                if names.len() != columns.len() {
                    return Err(RfmError::Export(format!(
                        "{relation}: {} header names supplied for {} columns",
                        names.len(),
                        columns.len()
                    )));
                }
                names.iter().map(ToString::to_string).collect()
            }
            None => columns.clone(),
        };

        let column_formats: Vec<Option<Format>> = columns
            .iter()
            .map(|name| {
                formats
                    .and_then(|m| m.get(name))
                    .map(|pattern| Format::new().set_num_format(pattern.as_str()))
            })
            .collect();

        let mut rows = stmt.query([])?;
        let mut written = Vec::new();
        let mut pending: Option<Vec<Cell>> = next_row_cells(&mut rows)?;

        if pending.is_none() {
            warn!(relation, "Nothing to export: relation is empty");
            return Ok(written);
        }

        let mut chunk_index = 0usize;
        while pending.is_some() {
            chunk_index += 1;
            let path = self
                .output_dir
                .join(format!("{chunk_index}_{base_name}.xlsx"));

            let mut workbook = Workbook::new();
            {
                let worksheet = workbook.add_worksheet();
                for (col, name) in header_cells.iter().enumerate() {
                    worksheet.write_string(0, col_idx(col)?, name.as_str())?;
                }

                let mut row_idx: u32 = 0;
                while let Some(cells) = pending.take() {
                    row_idx += 1;
                    for (col, cell) in cells.iter().enumerate() {
                        cell.write(worksheet, row_idx, col_idx(col)?, column_formats[col].as_ref())?;
                    }
                    if (row_idx as usize) >= self.max_rows {
                        pending = next_row_cells(&mut rows)?;
                        break;
                    }
                    pending = next_row_cells(&mut rows)?;
                }
            }
            workbook.save(&path)?;
            written.push(path);
        }

        info!(relation, chunks = written.len(), "Chunked export finished");
        Ok(written)
    }
}

fn col_idx(col: usize) -> Result<u16> {
    u16::try_from(col).map_err(|_| RfmError::Export("column index overflow".into()))
}

/// Pull the next row off the cursor as owned cells
fn next_row_cells(rows: &mut rusqlite::Rows<'_>) -> Result<Option<Vec<Cell>>> {
    let Some(row) = rows.next()? else {
        return Ok(None);
    };
    let count = row.as_ref().column_count();
    let mut cells = Vec::with_capacity(count);
    for i in 0..count {
        let cell = match row.get_ref(i)? {
            ValueRef::Null => Cell::Empty,
            ValueRef::Integer(n) => Cell::Number(n as f64),
            ValueRef::Real(f) => Cell::Number(f),
            ValueRef::Text(t) => Cell::Text(String::from_utf8_lossy(t).into_owned()),
            ValueRef::Blob(b) => Cell::Text(String::from_utf8_lossy(b).into_owned()),
        };
        cells.push(cell);
    }
    Ok(Some(cells))
}

/// Chunk files for `base_name` in `dir`, ordered by their numeric prefix.
///
/// Files without a numeric prefix sort last, by name, so a later reader can
/// reconstruct the source relation's order by concatenating data rows.
pub fn sorted_chunk_files(dir: &Path, base_name: &str) -> Result<Vec<PathBuf>> {
    let suffix = format!("_{base_name}.xlsx");
    let plain = format!("{base_name}.xlsx");

    let mut entries: Vec<(Option<u64>, String, PathBuf)> = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let Some(name) = path.file_name().map(|n| n.to_string_lossy().into_owned()) else {
            continue;
        };
        if name == plain {
            entries.push((None, name, path));
        } else if let Some(prefix) = name.strip_suffix(&suffix) {
            entries.push((prefix.parse::<u64>().ok(), name, path));
        }
    }

    // Numeric prefixes first in ascending order; everything else last by name.
    entries.sort_by(|a, b| match (&a.0, &b.0) {
        (Some(x), Some(y)) => x.cmp(y),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => a.1.cmp(&b.1),
    });

    Ok(entries.into_iter().map(|(_, _, path)| path).collect())
}

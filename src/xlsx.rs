//! Workbook read/write helpers
//!
//! Thin wrappers over `rust_xlsxwriter` (output) and `calamine` (re-entry
//! reads) shared by the exporters, the constants engine, and the scoring
//! loader.

use std::collections::HashMap;
use std::path::Path;

use calamine::{open_workbook, Data, Range, Reader, Xlsx};
use rust_xlsxwriter::{Format, Worksheet};

use crate::error::{Result, RfmError};

/// One spreadsheet cell value on the write path
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    /// Empty cell
    Empty,
    /// Numeric cell
    Number(f64),
    /// Text cell
    Text(String),
}

impl Cell {
    /// Write the cell at (row, col), applying `format` to numbers when given
    pub fn write(
        &self,
        worksheet: &mut Worksheet,
        row: u32,
        col: u16,
        format: Option<&Format>,
    ) -> Result<()> {
        match self {
            Cell::Empty => {}
            Cell::Number(n) => {
                if let Some(fmt) = format {
                    worksheet.write_number_with_format(row, col, *n, fmt)?;
                } else {
                    worksheet.write_number(row, col, *n)?;
                }
            }
            Cell::Text(s) => {
                worksheet.write_string(row, col, s.as_str())?;
            }
        }
        Ok(())
    }
}

impl From<&str> for Cell {
    fn from(s: &str) -> Self {
        Cell::Text(s.to_string())
    }
}

impl From<String> for Cell {
    fn from(s: String) -> Self {
        Cell::Text(s)
    }
}

impl From<f64> for Cell {
    fn from(n: f64) -> Self {
        Cell::Number(n)
    }
}

impl From<u32> for Cell {
    fn from(n: u32) -> Self {
        Cell::Number(f64::from(n))
    }
}

impl From<u64> for Cell {
    fn from(n: u64) -> Self {
        Cell::Number(n as f64)
    }
}

impl From<i64> for Cell {
    fn from(n: i64) -> Self {
        Cell::Number(n as f64)
    }
}

impl From<Option<f64>> for Cell {
    fn from(n: Option<f64>) -> Self {
        n.map_or(Cell::Empty, Cell::Number)
    }
}

/// Write a header row followed by data rows onto a worksheet
pub fn write_sheet(worksheet: &mut Worksheet, header: &[&str], rows: &[Vec<Cell>]) -> Result<()> {
    for (col, name) in header.iter().enumerate() {
        worksheet.write_string(0, u16::try_from(col).unwrap_or(u16::MAX), *name)?;
    }
    for (r, row) in rows.iter().enumerate() {
        let row_idx = u32::try_from(r + 1).map_err(|_| RfmError::Export("row overflow".into()))?;
        for (c, cell) in row.iter().enumerate() {
            cell.write(
                worksheet,
                row_idx,
                u16::try_from(c).unwrap_or(u16::MAX),
                None,
            )?;
        }
    }
    Ok(())
}

/// A sheet read from an existing workbook: header names plus data rows
pub struct SheetData {
    header: Vec<String>,
    range: Range<Data>,
}

impl SheetData {
    /// Index of each required column, or a `Config` error naming the first
    /// missing one.
    pub fn required_columns(&self, required: &[&str]) -> Result<HashMap<String, usize>> {
        let mut indexes = HashMap::new();
        for name in required {
            let idx = self
                .header
                .iter()
                .position(|h| h == name)
                .ok_or_else(|| RfmError::Config(format!("missing required column '{name}'")))?;
            indexes.insert((*name).to_string(), idx);
        }
        Ok(indexes)
    }

    /// Header row of the sheet
    #[must_use]
    pub fn header(&self) -> &[String] {
        &self.header
    }

    /// Forward-only iterator over the data rows (header excluded)
    pub fn rows(&self) -> impl Iterator<Item = &[Data]> {
        self.range.rows().skip(1)
    }
}

/// Open one sheet of an xlsx workbook, failing with `Config` when the sheet
/// is absent.
pub fn read_sheet(path: &Path, sheet: &str) -> Result<SheetData> {
    if !path.is_file() {
        return Err(RfmError::NotFound(path.to_path_buf()));
    }
    let mut workbook: Xlsx<_> = open_workbook(path).map_err(RfmError::from)?;
    let range = workbook
        .worksheet_range(sheet)
        .map_err(|_| RfmError::Config(format!("workbook {} has no '{sheet}' sheet", path.display())))?;

    let header = range
        .rows()
        .next()
        .map(|row| row.iter().map(data_to_string).collect())
        .unwrap_or_default();

    Ok(SheetData { header, range })
}

/// Open the first sheet of an xlsx workbook, whatever its name
pub fn read_first_sheet(path: &Path) -> Result<SheetData> {
    if !path.is_file() {
        return Err(RfmError::NotFound(path.to_path_buf()));
    }
    let workbook: Xlsx<_> = open_workbook(path).map_err(RfmError::from)?;
    let first = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or_else(|| RfmError::Config(format!("workbook {} has no sheets", path.display())))?;
    drop(workbook);
    read_sheet(path, &first)
}

/// Sheet names present in a workbook
pub fn sheet_names(path: &Path) -> Result<Vec<String>> {
    if !path.is_file() {
        return Err(RfmError::NotFound(path.to_path_buf()));
    }
    let workbook: Xlsx<_> = open_workbook(path).map_err(RfmError::from)?;
    Ok(workbook.sheet_names().to_vec())
}

/// Best-effort numeric view of a calamine cell
#[must_use]
pub fn data_to_f64(data: &Data) -> Option<f64> {
    match data {
        Data::Int(i) => Some(*i as f64),
        Data::Float(f) => Some(*f),
        Data::String(s) => s.trim().parse().ok(),
        Data::Bool(b) => Some(f64::from(u8::from(*b))),
        _ => None,
    }
}

/// String view of a calamine cell; empty for blanks and errors
#[must_use]
pub fn data_to_string(data: &Data) -> String {
    match data {
        Data::Empty | Data::Error(_) => String::new(),
        Data::String(s) => s.trim().to_string(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) => {
            // Integral floats read back from xlsx print without the fraction.
            if f.fract() == 0.0 && f.abs() < 9e15 {
                format!("{}", *f as i64)
            } else {
                f.to_string()
            }
        }
        Data::Bool(b) => b.to_string(),
        Data::DateTime(dt) => dt.to_string(),
        Data::DateTimeIso(s) | Data::DurationIso(s) => s.clone(),
    }
}

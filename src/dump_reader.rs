//! Dump discovery and inspection
//!
//! Finds candidate dump files, reports their size and compression, detects a
//! shared table-name prefix, and decides which configured table groups are
//! fully present in a dump before anything is imported.

use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use regex::Regex;
use tracing::debug;

use crate::config::DUMP_EXTENSIONS;
use crate::error::{Result, RfmError};
use crate::models::{FileInfo, TableGroup};

/// Reader over a directory of dump files and the configured table groups
pub struct DumpReader {
    dump_dir: PathBuf,
    table_groups: Vec<TableGroup>,
    create_table_re: Regex,
}

impl DumpReader {
    /// Create a reader for `dump_dir` checking the given table groups
    #[must_use]
    pub fn new(dump_dir: &Path, table_groups: &[TableGroup]) -> Self {
        Self {
            dump_dir: dump_dir.to_path_buf(),
            table_groups: table_groups.to_vec(),
            // mysqldump writes one schema definition per table, each opening
            // with CREATE TABLE on its own line.
            create_table_re: Regex::new(
                r#"(?i)^\s*CREATE\s+TABLE\s+(?:IF\s+NOT\s+EXISTS\s+)?[`"]?([A-Za-z0-9_]+)"#,
            )
            .unwrap(),
        }
    }

    /// List dump files in the configured directory, sorted by name
    pub fn list_files(&self) -> Result<Vec<FileInfo>> {
        if !self.dump_dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut files = Vec::new();
        for entry in fs::read_dir(&self.dump_dir)? {
            let path = entry?.path();
            if path.is_file() && has_dump_extension(&path) {
                files.push(self.get_info(&path)?);
            }
        }
        files.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(files)
    }

    /// Stat a single dump file
    pub fn get_info(&self, path: &Path) -> Result<FileInfo> {
        let meta = fs::metadata(path).map_err(|_| RfmError::NotFound(path.to_path_buf()))?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        #[allow(clippy::cast_precision_loss)]
        let size_mb = (meta.len() as f64 / (1024.0 * 1024.0) * 100.0).round() / 100.0;

        Ok(FileInfo {
            path: path.to_path_buf(),
            name,
            size_mb,
            compressed: is_compressed(path),
        })
    }

    /// Detect a shared table-name prefix from the dump's schema definitions.
    ///
    /// Every configured required table acts as an anchor: a dump table ending
    /// in an anchor name yields a candidate prefix. The longest common prefix
    /// of all candidates is returned, or an empty string when the candidates
    /// are inconsistent or no anchor matched.
    pub fn detect_prefix(&self, path: &Path) -> Result<String> {
        let defined = self.defined_tables(path)?;

        let mut candidates: Vec<String> = Vec::new();
        for group in &self.table_groups {
            for anchor in &group.tables {
                for table in &defined {
                    if table.ends_with(anchor.as_str()) {
                        candidates.push(table[..table.len() - anchor.len()].to_string());
                    }
                }
            }
        }

        let prefix = longest_common_prefix(&candidates);
        debug!(candidates = candidates.len(), prefix, "Prefix detection");
        Ok(prefix)
    }

    /// Names of the table groups whose required tables are all defined in the
    /// dump (after stripping `prefix`).
    ///
    /// A group missing even one required table is incomplete; there is no
    /// partial membership.
    pub fn get_complete_groups(&self, path: &Path, prefix: &str) -> Result<Vec<String>> {
        let defined = self.defined_tables(path)?;
        let stripped: BTreeSet<&str> = defined
            .iter()
            .map(|t| t.strip_prefix(prefix).unwrap_or(t.as_str()))
            .collect();

        let complete = self
            .table_groups
            .iter()
            .filter(|group| group.tables.iter().all(|t| stripped.contains(t.as_str())))
            .map(|group| group.name.clone())
            .collect();

        Ok(complete)
    }

    /// Scan the dump once for every table name appearing in a schema definition
    fn defined_tables(&self, path: &Path) -> Result<BTreeSet<String>> {
        let reader = open_dump(path)?;
        let mut tables = BTreeSet::new();

        for line in reader.lines() {
            let line = line?;
            if let Some(caps) = self.create_table_re.captures(&line) {
                tables.insert(caps[1].to_string());
            }
        }

        if tables.is_empty() {
            debug!(path = %path.display(), "No schema definitions found in dump");
        }
        Ok(tables)
    }
}

/// Open a dump file as a buffered, forward-only text stream, transparently
/// decompressing gzip.
pub fn open_dump(path: &Path) -> Result<Box<dyn BufRead>> {
    let file = File::open(path).map_err(|_| RfmError::NotFound(path.to_path_buf()))?;
    if is_compressed(path) {
        Ok(Box::new(BufReader::new(GzDecoder::new(file))))
    } else {
        Ok(Box::new(BufReader::new(file)))
    }
}

/// True if the path carries one of the allowed dump extensions
#[must_use]
pub fn has_dump_extension(path: &Path) -> bool {
    let name = path.file_name().map(|n| n.to_string_lossy().to_lowercase());
    name.is_some_and(|n| DUMP_EXTENSIONS.iter().any(|ext| n.ends_with(ext)))
}

fn is_compressed(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("gz"))
}

fn longest_common_prefix(candidates: &[String]) -> String {
    let Some(first) = candidates.first() else {
        return String::new();
    };
    let mut prefix = first.as_str();
    for candidate in &candidates[1..] {
        while !candidate.starts_with(prefix) {
            prefix = &prefix[..prefix.len() - 1];
            if prefix.is_empty() {
                return String::new();
            }
        }
    }
    prefix.to_string()
}

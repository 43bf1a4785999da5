//! Dump import
//!
//! Splits a dump into discrete statements with a quote- and escape-aware
//! tokenizer, translates the MySQL dialect into SQLite, and executes the
//! statements belonging to the requested complete groups. Import is
//! best-effort at statement granularity and all-or-nothing at group
//! granularity: incomplete groups never reach this module.

use std::collections::BTreeSet;
use std::collections::VecDeque;
use std::io::BufRead;
use std::path::Path;

use regex::Regex;
use tracing::{debug, info, warn};

use crate::dump_reader::open_dump;
use crate::error::{Result, RfmError};
use crate::models::{ImportOutcome, TableGroup};
use crate::store::StagingStore;

/// Tokenizer state carried across lines
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LexState {
    Normal,
    SingleQuote,
    DoubleQuote,
    Backtick,
    BlockComment,
}

/// A lazy, forward-only stream of SQL statements read from a dump.
///
/// Semicolons inside quoted literals or comments never split a statement;
/// string state survives line boundaries.
pub struct StatementStream {
    reader: Box<dyn BufRead>,
    state: LexState,
    pending: String,
    ready: VecDeque<String>,
    finished: bool,
}

impl StatementStream {
    /// Open a (possibly gzip-compressed) dump file as a statement stream
    pub fn open(path: &Path) -> Result<Self> {
        Ok(Self {
            reader: open_dump(path)?,
            state: LexState::Normal,
            pending: String::new(),
            ready: VecDeque::new(),
            finished: false,
        })
    }

    /// Feed one line through the lexer, queueing any completed statements
    fn consume_line(&mut self, line: &str) {
        let mut chars = line.chars().peekable();
        let mut line_comment = false;

        while let Some(c) = chars.next() {
            if line_comment {
                break;
            }
            match self.state {
                LexState::Normal => match c {
                    '\'' => {
                        self.state = LexState::SingleQuote;
                        self.pending.push(c);
                    }
                    '"' => {
                        self.state = LexState::DoubleQuote;
                        self.pending.push(c);
                    }
                    '`' => {
                        self.state = LexState::Backtick;
                        self.pending.push(c);
                    }
                    '#' => line_comment = true,
                    '-' if chars.peek() == Some(&'-') => {
                        chars.next();
                        line_comment = true;
                    }
                    '/' if chars.peek() == Some(&'*') => {
                        chars.next();
                        self.state = LexState::BlockComment;
                    }
                    ';' => {
                        let stmt = self.pending.trim().to_string();
                        self.pending.clear();
                        if !stmt.is_empty() {
                            self.ready.push_back(stmt);
                        }
                    }
                    _ => self.pending.push(c),
                },
                LexState::SingleQuote | LexState::DoubleQuote => {
                    let quote = if self.state == LexState::SingleQuote { '\'' } else { '"' };
                    self.pending.push(c);
                    if c == '\\' {
                        // Backslash escape: the next character is literal.
                        if let Some(escaped) = chars.next() {
                            self.pending.push(escaped);
                        }
                    } else if c == quote {
                        if chars.peek() == Some(&quote) {
                            // Doubled quote stays inside the literal.
                            self.pending.push(quote);
                            chars.next();
                        } else {
                            self.state = LexState::Normal;
                        }
                    }
                }
                LexState::Backtick => {
                    self.pending.push(c);
                    if c == '`' {
                        self.state = LexState::Normal;
                    }
                }
                LexState::BlockComment => {
                    if c == '*' && chars.peek() == Some(&'/') {
                        chars.next();
                        self.state = LexState::Normal;
                    }
                }
            }
        }

        // A newline inside a string literal is part of the value.
        if matches!(self.state, LexState::SingleQuote | LexState::DoubleQuote) {
            self.pending.push('\n');
        } else if self.state == LexState::Normal && !self.pending.is_empty() {
            self.pending.push(' ');
        }
    }
}

impl Iterator for StatementStream {
    type Item = Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(stmt) = self.ready.pop_front() {
                return Some(Ok(stmt));
            }
            if self.finished {
                return None;
            }

            let mut line = String::new();
            match self.reader.read_line(&mut line) {
                Ok(0) => {
                    self.finished = true;
                    // A trailing statement without a terminating semicolon is
                    // still a statement.
                    let tail = self.pending.trim().to_string();
                    self.pending.clear();
                    if !tail.is_empty() {
                        self.ready.push_back(tail);
                    }
                }
                Ok(_) => self.consume_line(line.trim_end_matches(['\r', '\n'])),
                Err(e) => {
                    self.finished = true;
                    return Some(Err(e.into()));
                }
            }
        }
    }
}

/// What a dump statement does, with its target table where applicable
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatementKind {
    /// A schema definition for the named table
    CreateTable(String),
    /// A data insertion into the named table
    Insert(String),
    /// Anything else (session settings, locks, drops); never executed
    Other,
}

/// Classifies statements and rewrites them for the staging store
pub struct StatementTranslator {
    create_re: Regex,
    insert_re: Regex,
    charset_re: Regex,
    prefix: String,
}

impl StatementTranslator {
    /// Build a translator stripping `prefix` from target table names
    #[must_use]
    pub fn new(prefix: &str) -> Self {
        Self {
            create_re: Regex::new(
                r#"(?is)^\s*CREATE\s+TABLE\s+(?:IF\s+NOT\s+EXISTS\s+)?[`"]?([A-Za-z0-9_]+)[`"]?"#,
            )
            .unwrap(),
            insert_re: Regex::new(r#"(?is)^\s*INSERT\s+INTO\s+[`"]?([A-Za-z0-9_]+)[`"]?"#).unwrap(),
            charset_re: Regex::new(r"(?i)\s+(CHARACTER\s+SET|COLLATE)\s+[A-Za-z0-9_]+").unwrap(),
            prefix: prefix.to_string(),
        }
    }

    /// Classify a statement by its leading keywords
    #[must_use]
    pub fn classify(&self, statement: &str) -> StatementKind {
        if let Some(caps) = self.create_re.captures(statement) {
            StatementKind::CreateTable(caps[1].to_string())
        } else if let Some(caps) = self.insert_re.captures(statement) {
            StatementKind::Insert(caps[1].to_string())
        } else {
            StatementKind::Other
        }
    }

    /// Strip the detected prefix from a dump table name
    #[must_use]
    pub fn strip_prefix<'a>(&self, table: &'a str) -> &'a str {
        table.strip_prefix(self.prefix.as_str()).unwrap_or(table)
    }

    /// Rewrite a MySQL CREATE TABLE statement into a SQLite-compatible one
    /// targeting the prefix-stripped table name.
    pub fn translate_create(&self, statement: &str, table: &str) -> Result<String> {
        let stripped = self.strip_prefix(table);
        let header_end = statement
            .find('(')
            .ok_or_else(|| RfmError::Parse(format!("CREATE TABLE without column list: {table}")))?;
        let body = &statement[header_end..];

        // Drop everything after the closing paren (ENGINE=, AUTO_INCREMENT=,
        // charset table options).
        let body_end = body
            .rfind(')')
            .ok_or_else(|| RfmError::Parse(format!("unterminated CREATE TABLE: {table}")))?;
        let body = &body[..=body_end];

        // Remove secondary-index and constraint lines SQLite does not accept
        // inside CREATE TABLE.
        let inner = &body[1..body.len() - 1];
        let kept: Vec<String> = split_top_level(inner, ',')
            .into_iter()
            .map(|part| part.trim().to_string())
            .filter(|part| {
                let upper = part.to_uppercase();
                !(upper.starts_with("KEY ")
                    || upper.starts_with("KEY(")
                    || upper.starts_with("UNIQUE KEY")
                    || upper.starts_with("FULLTEXT")
                    || upper.starts_with("SPATIAL")
                    || upper.starts_with("CONSTRAINT")
                    || upper.starts_with("INDEX "))
            })
            .map(|part| {
                let part = self.charset_re.replace_all(&part, "").into_owned();
                part.replace(" unsigned", "")
                    .replace(" UNSIGNED", "")
                    .replace(" AUTO_INCREMENT", "")
                    .replace(" auto_increment", "")
            })
            .collect();

        if kept.is_empty() {
            return Err(RfmError::Parse(format!("CREATE TABLE with no columns: {table}")));
        }

        Ok(format!("CREATE TABLE \"{stripped}\" ({})", kept.join(", ")))
    }

    /// Rewrite a MySQL INSERT statement: retarget to the stripped table name
    /// and convert backslash escapes inside string literals into SQLite form.
    #[must_use]
    pub fn translate_insert(&self, statement: &str, table: &str) -> String {
        let stripped = self.strip_prefix(table);
        let rest = self
            .insert_re
            .find(statement)
            .map_or(statement, |m| &statement[m.end()..]);
        let rewritten = rewrite_string_escapes(rest);
        format!("INSERT INTO \"{stripped}\"{rewritten}")
    }
}

/// Split on `sep` outside quotes, parens, and backticks
fn split_top_level(input: &str, sep: char) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;
    let mut state = LexState::Normal;
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        match state {
            LexState::Normal => match c {
                '(' => {
                    depth += 1;
                    current.push(c);
                }
                ')' => {
                    depth = depth.saturating_sub(1);
                    current.push(c);
                }
                '\'' => {
                    state = LexState::SingleQuote;
                    current.push(c);
                }
                '"' => {
                    state = LexState::DoubleQuote;
                    current.push(c);
                }
                '`' => {
                    state = LexState::Backtick;
                    current.push(c);
                }
                _ if c == sep && depth == 0 => {
                    parts.push(current.clone());
                    current.clear();
                }
                _ => current.push(c),
            },
            LexState::SingleQuote | LexState::DoubleQuote => {
                let quote = if state == LexState::SingleQuote { '\'' } else { '"' };
                current.push(c);
                if c == '\\' {
                    if let Some(escaped) = chars.next() {
                        current.push(escaped);
                    }
                } else if c == quote {
                    state = LexState::Normal;
                }
            }
            LexState::Backtick => {
                current.push(c);
                if c == '`' {
                    state = LexState::Normal;
                }
            }
            LexState::BlockComment => unreachable!("comments are stripped by the statement stream"),
        }
    }
    if !current.is_empty() {
        parts.push(current);
    }
    parts
}

/// Convert MySQL backslash escapes inside single- or double-quoted literals
/// into SQLite-compatible text. Quotes are re-emitted doubled; control escapes
/// become their literal characters.
fn rewrite_string_escapes(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();
    let mut in_string: Option<char> = None;

    while let Some(c) = chars.next() {
        match in_string {
            None => {
                if c == '\'' || c == '"' {
                    in_string = Some(c);
                    out.push('\'');
                } else if c == '`' {
                    // Identifier quote: pass through to the closing backtick.
                    out.push('"');
                    for ident in chars.by_ref() {
                        if ident == '`' {
                            break;
                        }
                        out.push(ident);
                    }
                    out.push('"');
                } else {
                    out.push(c);
                }
            }
            Some(quote) => {
                if c == '\\' {
                    match chars.next() {
                        Some('\'') => out.push_str("''"),
                        Some('"') => out.push('"'),
                        Some('\\') => out.push('\\'),
                        Some('n') => out.push('\n'),
                        Some('r') => out.push('\r'),
                        Some('t') => out.push('\t'),
                        Some('0' | 'Z') => {} // NUL and EOF markers are dropped
                        Some(other) => out.push(other),
                        None => {}
                    }
                } else if c == quote {
                    if chars.peek() == Some(&quote) {
                        chars.next();
                        if quote == '\'' {
                            out.push_str("''");
                        } else {
                            out.push('"');
                        }
                    } else {
                        in_string = None;
                        out.push('\'');
                    }
                } else if c == '\'' && quote == '"' {
                    // A raw apostrophe inside a double-quoted MySQL string
                    // must be doubled once the literal becomes single-quoted.
                    out.push_str("''");
                } else {
                    out.push(c);
                }
            }
        }
    }
    out
}

/// Imports the statements of complete table groups into the staging store
pub struct DumpImporter<'a> {
    store: &'a StagingStore,
}

impl<'a> DumpImporter<'a> {
    /// Create an importer writing into `store`
    #[must_use]
    pub const fn new(store: &'a StagingStore) -> Self {
        Self { store }
    }

    /// Import every statement belonging to the requested complete groups.
    ///
    /// Runs inside one transaction: a crash mid-import leaves the store in its
    /// prior state. Statement-level failures are recorded and do not abort the
    /// batch.
    pub fn import_complete_groups(
        &self,
        path: &Path,
        complete_groups: &[String],
        table_groups: &[TableGroup],
        prefix: &str,
    ) -> Result<ImportOutcome> {
        let allowed: BTreeSet<&str> = table_groups
            .iter()
            .filter(|g| complete_groups.contains(&g.name))
            .flat_map(|g| g.tables.iter().map(String::as_str))
            .collect();

        if allowed.is_empty() {
            return Ok(ImportOutcome::default());
        }

        let translator = StatementTranslator::new(prefix);
        let mut outcome = ImportOutcome::default();

        let mut conn = self.store.conn()?;
        let tx = conn.transaction()?;

        for statement in StatementStream::open(path)? {
            let statement = statement?;
            match translator.classify(&statement) {
                StatementKind::CreateTable(table) => {
                    let stripped = translator.strip_prefix(&table);
                    if !allowed.contains(stripped) {
                        continue;
                    }
                    match translator
                        .translate_create(&statement, &table)
                        .and_then(|sql| tx.execute_batch(&sql).map_err(Into::into))
                    {
                        Ok(()) => outcome.tables_created += 1,
                        Err(e) => outcome.errors.push(
                            RfmError::Import {
                                table: stripped.to_string(),
                                message: e.to_string(),
                            }
                            .to_string(),
                        ),
                    }
                }
                StatementKind::Insert(table) => {
                    let stripped = translator.strip_prefix(&table);
                    if !allowed.contains(stripped) {
                        continue;
                    }
                    let sql = translator.translate_insert(&statement, &table);
                    match tx.execute_batch(&sql) {
                        Ok(()) => outcome.inserts_count += 1,
                        Err(e) => outcome.errors.push(
                            RfmError::Import {
                                table: stripped.to_string(),
                                message: e.to_string(),
                            }
                            .to_string(),
                        ),
                    }
                }
                StatementKind::Other => {}
            }
        }

        tx.commit()?;

        info!(
            tables_created = outcome.tables_created,
            inserts = outcome.inserts_count,
            errors = outcome.errors.len(),
            "Dump import finished"
        );
        if !outcome.errors.is_empty() {
            warn!(
                first = outcome.errors.first().map(String::as_str).unwrap_or(""),
                "Import recorded statement-level errors"
            );
        }
        debug!(groups = ?complete_groups, prefix, "Imported groups");

        Ok(outcome)
    }
}

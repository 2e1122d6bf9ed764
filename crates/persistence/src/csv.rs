//! CSV export of a dense series
//!
//! Layout: header `Timestamp,<column per channel key ascending>`, then one
//! line per tick. Resolved channels are headed by the sensor name, unresolved
//! ones by their raw key. A channel with no value at a tick (it had not been
//! seen yet) leaves an empty cell.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::mem;
use std::path::{Path, PathBuf};

use contracts::{DenseSeries, Session};
use tracing::{debug, instrument};

use crate::error::{PersistenceError, Result};
use crate::ChannelMapping;

/// Header of the tick column
pub const TIMESTAMP_HEADER: &str = "Timestamp";

/// Writes `{root}/{device_id}/{session_name}.csv`
#[derive(Debug, Clone)]
pub struct CsvExporter {
    root: PathBuf,
}

impl CsvExporter {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Target file of a session
    pub fn path_for(&self, session: &Session) -> PathBuf {
        self.root
            .join(session.device_id.to_string())
            .join(format!("{}.csv", file_stem(&session.name)))
    }

    /// Write the series, creating the device directory if needed.
    ///
    /// # Errors
    /// `PersistenceError::Export` on any filesystem failure.
    #[instrument(
        name = "csv_export",
        skip(self, session, series, mapping),
        fields(session_id = %session.id, rows = series.len())
    )]
    pub fn export(
        &self,
        session: &Session,
        series: &DenseSeries,
        mapping: &ChannelMapping,
    ) -> Result<PathBuf> {
        let path = self.path_for(session);
        write_file(&path, series, mapping).map_err(|source| PersistenceError::Export {
            path: path.clone(),
            source,
        })?;

        debug!(path = %path.display(), "CSV written");
        Ok(path)
    }
}

fn write_file(path: &Path, series: &DenseSeries, mapping: &ChannelMapping) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut writer = BufWriter::new(File::create(path)?);
    render_csv(&mut writer, series, mapping)?;
    writer.flush()
}

/// Session names become file names; path separators are not allowed through.
fn file_stem(name: &str) -> String {
    let stem: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '\0' => '_',
            c => c,
        })
        .collect();

    match stem.trim() {
        "" | "." | ".." => "session".to_string(),
        _ => stem,
    }
}

/// Render a series as CSV into any writer
pub fn render_csv<W: Write>(
    out: &mut W,
    series: &DenseSeries,
    mapping: &ChannelMapping,
) -> std::io::Result<()> {
    let keys = mapping.keys();

    out.write_all(TIMESTAMP_HEADER.as_bytes())?;
    for key in &keys {
        out.write_all(b",")?;
        write_field(out, &mapping.column_name(key))?;
    }
    out.write_all(b"\n")?;

    for row in series.iter() {
        write!(out, "{}", row.tick)?;
        for key in &keys {
            match row.channels.get(key) {
                Some(value) => write!(out, ",{value}")?,
                None => out.write_all(b",")?,
            }
        }
        out.write_all(b"\n")?;
    }

    Ok(())
}

fn write_field<W: Write>(out: &mut W, field: &str) -> std::io::Result<()> {
    if field.contains([',', '"', '\n', '\r']) {
        write!(out, "\"{}\"", field.replace('"', "\"\""))
    } else {
        out.write_all(field.as_bytes())
    }
}

/// One data line of a parsed export
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsvRow {
    pub tick: u64,
    /// One cell per channel column; `None` for an empty cell
    pub values: Vec<Option<i64>>,
}

/// A parsed export
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCsv {
    /// Channel column names (without `Timestamp`)
    pub header: Vec<String>,
    pub rows: Vec<CsvRow>,
}

impl ParsedCsv {
    /// Every cell of one named column
    pub fn column(&self, name: &str) -> Option<Vec<Option<i64>>> {
        let index = self.header.iter().position(|h| h == name)?;
        Some(self.rows.iter().map(|row| row.values[index]).collect())
    }
}

/// Read an export back.
///
/// # Errors
/// `PersistenceError::CsvParse` for a missing or wrong header, unbalanced
/// quotes, ragged lines, or cells that are not integers.
pub fn parse_csv(text: &str) -> Result<ParsedCsv> {
    let mut records = split_records(text)?.into_iter();

    let (_, header) = records
        .next()
        .ok_or_else(|| PersistenceError::csv_parse(1, "missing header"))?;
    let mut header = header.into_iter();
    if header.next().as_deref() != Some(TIMESTAMP_HEADER) {
        return Err(PersistenceError::csv_parse(
            1,
            format!("first column must be '{TIMESTAMP_HEADER}'"),
        ));
    }
    let header: Vec<String> = header.collect();

    let mut rows = Vec::new();
    for (line, fields) in records {
        if fields.len() != header.len() + 1 {
            return Err(PersistenceError::csv_parse(
                line,
                format!("expected {} fields, found {}", header.len() + 1, fields.len()),
            ));
        }

        let mut fields = fields.into_iter();
        let tick = fields
            .next()
            .unwrap_or_default()
            .parse::<u64>()
            .map_err(|e| PersistenceError::csv_parse(line, format!("bad timestamp: {e}")))?;

        let values = fields
            .map(|cell| {
                if cell.is_empty() {
                    Ok(None)
                } else {
                    cell.parse::<i64>().map(Some).map_err(|e| {
                        PersistenceError::csv_parse(line, format!("bad value '{cell}': {e}"))
                    })
                }
            })
            .collect::<Result<Vec<_>>>()?;

        rows.push(CsvRow { tick, values });
    }

    Ok(ParsedCsv { header, rows })
}

/// Split RFC 4180 text into records, each tagged with its starting line.
fn split_records(text: &str) -> Result<Vec<(usize, Vec<String>)>> {
    let mut records = Vec::new();
    let mut record = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut line = 1;
    let mut record_line = 1;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' if chars.next_if_eq(&'"').is_some() => field.push('"'),
                '"' => in_quotes = false,
                '\n' => {
                    line += 1;
                    field.push(c);
                }
                _ => field.push(c),
            }
            continue;
        }

        match c {
            '"' if field.is_empty() => in_quotes = true,
            '"' => return Err(PersistenceError::csv_parse(line, "quote inside unquoted field")),
            ',' => record.push(mem::take(&mut field)),
            '\r' if chars.peek() == Some(&'\n') => {}
            '\n' => {
                record.push(mem::take(&mut field));
                records.push((record_line, mem::take(&mut record)));
                line += 1;
                record_line = line;
            }
            _ => field.push(c),
        }
    }

    if in_quotes {
        return Err(PersistenceError::csv_parse(record_line, "unterminated quoted field"));
    }
    if !field.is_empty() || !record.is_empty() {
        record.push(field);
        records.push((record_line, record));
    }

    Ok(records)
}

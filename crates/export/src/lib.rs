//! Full-log spreadsheet export.
//!
//! Re-reads a project's whole access log, parses every line with the same
//! parser the live pipeline uses and writes the accepted rows to a single
//! `all` worksheet.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use logwarden_core::event::ABSENT;
use logwarden_core::Event;
use logwarden_ingest::{EnrichmentStage, LineParser};
use rust_xlsxwriter::{Format, Workbook, XlsxError};
use thiserror::Error;
use tracing::{debug, info, warn};

pub const SHEET_NAME: &str = "all";

const BASE_COLUMNS: &[&str] = &[
    "RemoteAddr",
    "RemoteUser",
    "LocalTime",
    "RequestMethod",
    "RequestUri",
    "RequestProtocol",
    "Status",
    "Bytes",
    "Referer",
    "UserAgent",
];

const ENRICHMENT_COLUMNS: &[&str] = &["Location", "Bot"];

/// Data rows a worksheet can hold below the header.
const MAX_ROWS: usize = 1_048_575;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("cannot read log {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot write spreadsheet: {0}")]
    Write(#[from] XlsxError),

    #[error("export task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// A written export file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportedFile {
    pub path: PathBuf,
    pub rows: usize,
}

/// Header row, with enrichment columns when the stage does anything.
pub fn columns(enriched: bool) -> Vec<&'static str> {
    let mut cols = BASE_COLUMNS.to_vec();
    if enriched {
        cols.extend_from_slice(ENRICHMENT_COLUMNS);
    }
    cols
}

/// `export_<project>_<unix seconds>.xlsx`, with anything outside
/// `[A-Za-z0-9_-]` in the project name replaced by `_`.
pub fn export_file_name(project: &str, at: DateTime<Utc>) -> String {
    let safe: String = project
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    format!("export_{safe}_{}.xlsx", at.timestamp())
}

/// Export every parseable line of `log` into `out_dir`.
///
/// Returns `Ok(None)` and writes nothing when no line parses.
pub async fn export_log(
    log: &Path,
    parser: &LineParser,
    stage: &EnrichmentStage,
    out_dir: &Path,
    at: DateTime<Utc>,
) -> Result<Option<ExportedFile>, ExportError> {
    let bytes = tokio::fs::read(log).await.map_err(|source| ExportError::Read {
        path: log.to_path_buf(),
        source,
    })?;
    let text = String::from_utf8_lossy(&bytes);

    let mut events = Vec::new();
    let mut skipped = 0usize;
    for line in text.lines().filter(|l| !l.trim().is_empty()) {
        if events.len() == MAX_ROWS {
            warn!(
                project = %parser.project(),
                max = MAX_ROWS,
                "export truncated at worksheet row limit"
            );
            break;
        }
        match parser.parse(line) {
            Ok(event) => events.push(stage.apply(event).await),
            Err(_) => skipped += 1,
        }
    }

    if events.is_empty() {
        info!(project = %parser.project(), skipped, "nothing to export");
        return Ok(None);
    }

    let path = out_dir.join(export_file_name(parser.project(), at));
    let rows = events.len();
    let enriched = !stage.is_empty();
    let target = path.clone();
    tokio::task::spawn_blocking(move || write_workbook(&target, &events, enriched)).await??;

    info!(project = %parser.project(), rows, skipped, path = %path.display(), "export written");
    Ok(Some(ExportedFile { path, rows }))
}

fn write_workbook(path: &Path, events: &[Event], enriched: bool) -> Result<(), XlsxError> {
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    sheet.set_name(SHEET_NAME)?;

    let bold = Format::new().set_bold();
    for (col, title) in columns(enriched).iter().enumerate() {
        sheet.write_string_with_format(0, col as u16, *title, &bold)?;
    }

    for (i, event) in events.iter().enumerate() {
        let row = i as u32 + 1;
        sheet.write_string(row, 0, &event.remote_addr)?;
        sheet.write_string(row, 1, event.remote_user.as_deref().unwrap_or(ABSENT))?;
        sheet.write_string(row, 2, &event.time_local)?;
        sheet.write_string(row, 3, &event.parsed.method)?;
        sheet.write_string(row, 4, &event.parsed.uri)?;
        sheet.write_string(row, 5, &event.parsed.protocol)?;
        sheet.write_number(row, 6, f64::from(event.status))?;
        sheet.write_number(row, 7, event.body_bytes_sent as f64)?;
        sheet.write_string(row, 8, &event.referer)?;
        sheet.write_string(row, 9, &event.user_agent)?;
        if enriched {
            sheet.write_string(row, 10, event.enrichment.location.as_deref().unwrap_or(""))?;
            sheet.write_string(row, 11, event.enrichment.bot.as_deref().unwrap_or(""))?;
        }
    }

    debug!(path = %path.display(), rows = events.len(), "saving workbook");
    workbook.save(path)?;
    Ok(())
}

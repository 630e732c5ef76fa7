use crate::db::{InsertOutcome, NewQuote};
use crate::error::{BotError, Result};
use crate::service::repository::QuoteRepository;
use csv::{ReaderBuilder, StringRecord, Trim};
use serde::{Deserialize, Serialize};
use std::{fs::File, io, path::Path};
use tracing::{debug, error, info, warn};

#[derive(Debug, Deserialize)]
struct CsvQuoteRow {
    #[serde(default)]
    quote_text: Option<String>,
    #[serde(default)]
    author: Option<String>,
    #[serde(default)]
    source: Option<String>,
}

/// One data row of an import file.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedRow {
    Quote(NewQuote),
    /// `quote_text` or `author` was blank.
    Invalid { line: u64 },
    /// The record could not be decoded at all.
    Unreadable { line: u64, reason: String },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub total: usize,
    pub inserted: usize,
    pub skipped: usize,
    pub invalid: usize,
    pub errors: usize,
}

/// Parse a UTF-8 CSV with a `quote_text,author[,source]` header.
pub fn parse_quotes<Rd: io::Read>(input: Rd) -> Result<Vec<ParsedRow>> {
    let mut reader = ReaderBuilder::new()
        .trim(Trim::All)
        .flexible(true)
        .from_reader(input);

    let headers = reader.headers()?.clone();
    for required in ["quote_text", "author"] {
        if !headers.iter().any(|h| h == required) {
            return Err(BotError::InvalidInput(format!(
                "CSV header is missing the `{required}` column"
            )));
        }
    }

    let rows = reader
        .records()
        .map(|record| match record {
            Ok(record) => parse_record(&record, &headers),
            Err(e) => ParsedRow::Unreadable {
                line: e.position().map(|p| p.line()).unwrap_or_default(),
                reason: e.to_string(),
            },
        })
        .collect();
    Ok(rows)
}

fn parse_record(record: &StringRecord, headers: &StringRecord) -> ParsedRow {
    let line = record.position().map(|p| p.line()).unwrap_or_default();
    match record.deserialize::<CsvQuoteRow>(Some(headers)) {
        Ok(row) => {
            let (Some(text), Some(author)) = (row.quote_text, row.author) else {
                return ParsedRow::Invalid { line };
            };
            NewQuote::new(text, author, row.source)
                .map(ParsedRow::Quote)
                .unwrap_or(ParsedRow::Invalid { line })
        }
        Err(e) => ParsedRow::Unreadable {
            line,
            reason: e.to_string(),
        },
    }
}

pub fn parse_quotes_file(path: &Path) -> Result<Vec<ParsedRow>> {
    let file = File::open(path)?;
    parse_quotes(io::BufReader::new(file))
}

/// Store every parsed quote. Row-level failures are counted, never fatal.
pub async fn ingest_quotes<R: QuoteRepository + ?Sized>(
    repo: &R,
    rows: Vec<ParsedRow>,
) -> IngestReport {
    let mut report = IngestReport {
        total: rows.len(),
        ..Default::default()
    };

    for row in rows {
        match row {
            ParsedRow::Quote(quote) => {
                let author = quote.author.clone();
                match repo.insert(quote).await {
                    Ok(InsertOutcome::Inserted(id)) => {
                        debug!(id, %author, "quote added");
                        report.inserted += 1;
                    }
                    Ok(InsertOutcome::Duplicate(id)) => {
                        debug!(id, %author, "duplicate quote skipped");
                        report.skipped += 1;
                    }
                    Err(e) => {
                        error!(%author, error = %e, "failed to store quote");
                        report.errors += 1;
                    }
                }
            }
            ParsedRow::Invalid { line } => {
                warn!(line, "skipping row without quote_text or author");
                report.invalid += 1;
            }
            ParsedRow::Unreadable { line, reason } => {
                warn!(line, %reason, "skipping unreadable row");
                report.errors += 1;
            }
        }
    }

    info!(
        total = report.total,
        inserted = report.inserted,
        skipped = report.skipped,
        invalid = report.invalid,
        errors = report.errors,
        "quote import finished"
    );
    report
}

//! CSV encoding for export artifacts
//!
//! The encoder is format-only: it never inspects SQL and never opens a
//! connection. It produces the dialect the downstream consumers depend
//! on: every field enclosed in the quote character, embedded quotes
//! escaped by doubling, records terminated by the configured byte.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// CSV output format specification
///
/// The default matches the wire contract of the delivered files:
/// comma-delimited, double-quote enclosed and escaped, `\n`-terminated,
/// UTF-8, header row on. All format characters must be single-byte.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CsvFormat {
    /// Field delimiter (default: ',')
    #[serde(default = "default_delimiter")]
    pub delimiter: char,

    /// Field quote character, also used as the escape character by
    /// doubling (default: '"')
    #[serde(default = "default_quote")]
    pub quote: char,

    /// Record terminator (default: '\n')
    #[serde(default = "default_terminator")]
    pub terminator: char,

    /// Whether a header row is emitted (default: true)
    #[serde(default = "default_headers")]
    pub headers: bool,
}

impl Default for CsvFormat {
    fn default() -> Self {
        Self {
            delimiter: default_delimiter(),
            quote: default_quote(),
            terminator: default_terminator(),
            headers: default_headers(),
        }
    }
}

impl CsvFormat {
    /// Validate that the format characters are single-byte
    ///
    /// The CSV dialect (and the engine's export clause) operate on bytes;
    /// a multi-byte delimiter would silently truncate.
    pub fn validate(&self) -> Result<()> {
        for (ch, key) in [
            (self.delimiter, "csv.delimiter"),
            (self.quote, "csv.quote"),
            (self.terminator, "csv.terminator"),
        ] {
            if !ch.is_ascii() {
                return Err(Error::Config {
                    message: format!("{key} must be a single-byte character, got {ch:?}"),
                    key: Some(key.to_string()),
                });
            }
        }
        Ok(())
    }
}

fn default_delimiter() -> char {
    ','
}

fn default_quote() -> char {
    '"'
}

fn default_terminator() -> char {
    '\n'
}

fn default_headers() -> bool {
    true
}

/// Encodes header and data rows to CSV bytes per a [`CsvFormat`]
#[derive(Clone, Debug)]
pub struct CsvEncoder {
    format: CsvFormat,
}

impl CsvEncoder {
    /// Create an encoder for the given format
    pub fn new(format: CsvFormat) -> Self {
        Self { format }
    }

    fn writer(&self) -> csv::Writer<Vec<u8>> {
        csv::WriterBuilder::new()
            .delimiter(self.format.delimiter as u8)
            .quote(self.format.quote as u8)
            .double_quote(true)
            .quote_style(csv::QuoteStyle::Always)
            .terminator(csv::Terminator::Any(self.format.terminator as u8))
            .from_writer(Vec::new())
    }

    /// Encode the header row from column names
    pub fn encode_header(&self, columns: &[String]) -> Result<Vec<u8>> {
        let mut writer = self.writer();
        writer.write_record(columns)?;
        into_bytes(writer)
    }

    /// Encode one data row
    ///
    /// `None` values render as an empty, still-quoted field. Values are
    /// written in the order given; ordinal position is authoritative.
    pub fn encode_row(&self, values: &[Option<String>]) -> Result<Vec<u8>> {
        let mut writer = self.writer();
        for value in values {
            writer.write_field(value.as_deref().unwrap_or(""))?;
        }
        // Terminate the record
        writer.write_record(None::<&[u8]>)?;
        into_bytes(writer)
    }
}

fn into_bytes(writer: csv::Writer<Vec<u8>>) -> Result<Vec<u8>> {
    writer
        .into_inner()
        .map_err(|e| Error::Io(std::io::Error::other(e.to_string())))
}

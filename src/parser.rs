//! Field extraction for Gin-style access log lines
//!
//! Lines are split on whitespace and fields are taken from fixed positions:
//!
//! ```text
//! [GIN] 2024/01/02 - 10:00:00 | 200 |   15.2ms |  1.2.3.4 | GET      "/api/v1/users/42"
//!   1       2      3     4    5  6  7     8    9     10   11  12             13
//! ```
//!
//! Colored Gin output wraps status and method in ANSI escapes; those are
//! stripped before tokenizing.

use crate::error::ParseError;
use crate::record::LogRecord;
use chrono::NaiveDate;
use regex::Regex;
use std::sync::LazyLock;

/// Minimum number of whitespace-separated fields in a usable line
pub const MIN_FIELDS: usize = 13;

// Zero-based token positions
const DATE_FIELD: usize = 1;
const TIME_FIELD: usize = 3;
const STATUS_FIELD: usize = 5;
const DURATION_FIELD: usize = 7;
const CLIENT_IP_FIELD: usize = 9;
const METHOD_FIELD: usize = 11;
const PATH_FIELD: usize = 12;

static ANSI_ESCAPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\x1b\[[0-9;]*[A-Za-z]").expect("valid ANSI regex"));

/// Extracts [`LogRecord`]s from lines that carry the configured marker
#[derive(Debug, Clone)]
pub struct LineParser {
    marker: String,
}

impl LineParser {
    pub fn new(marker: impl Into<String>) -> Self {
        Self {
            marker: marker.into(),
        }
    }

    /// Whether the line carries the marker and should be parsed
    pub fn is_candidate(&self, line: &str) -> bool {
        line.contains(&self.marker)
    }

    /// Parse one line into a record tagged with `server` and `program`.
    ///
    /// The caller is expected to have checked [`is_candidate`](Self::is_candidate).
    /// Either every field is extracted or an error is returned.
    pub fn parse(&self, line: &str, server: &str, program: &str) -> Result<LogRecord, ParseError> {
        let cleaned = ANSI_ESCAPE.replace_all(line, "");
        let fields: Vec<&str> = cleaned.split_whitespace().collect();

        if fields.len() < MIN_FIELDS {
            return Err(ParseError::MalformedLine {
                line: line.trim_end().to_string(),
                found: fields.len(),
                expected: MIN_FIELDS,
            });
        }

        let api_path = trim_quotes(fields[PATH_FIELD]);
        if api_path.is_empty() {
            return Err(ParseError::EmptyPath(line.trim_end().to_string()));
        }

        Ok(LogRecord {
            server: server.to_string(),
            program: program.to_string(),
            date: normalize_date(trim_quotes(fields[DATE_FIELD])),
            time: trim_quotes(fields[TIME_FIELD]).to_string(),
            status_code: fields[STATUS_FIELD].to_string(),
            duration: fields[DURATION_FIELD].to_string(),
            client_ip: fields[CLIENT_IP_FIELD].to_string(),
            http_method: fields[METHOD_FIELD].to_string(),
            api_path: api_path.to_string(),
        })
    }
}

fn trim_quotes(field: &str) -> &str {
    field.trim_matches('"')
}

/// Rewrite `2024/01/02` (or an already ISO date) as `2024-01-02`.
/// Anything that is not a calendar date is kept as logged.
fn normalize_date(raw: &str) -> String {
    ["%Y/%m/%d", "%Y-%m-%d"]
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(raw, format).ok())
        .map(|date| date.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| raw.to_string())
}

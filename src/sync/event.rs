//! Line Parser
//!
//! Turns one raw input line into a [`LineEvent`]. Parsing never fails the
//! process: anything that cannot be understood comes back as
//! [`LineEvent::Unrecognized`] carrying a [`ParseWarning`].
//!
//! Recognized shapes:
//!
//! ```text
//! 2024-05-01 10:00:03<TAB>user<TAB>...              -> Row
//! 2024-05-01 10:00:00 === ONLINE ===                -> StreamBoundary(Start)
//! 2024-05-01 14:00:00 === OFFLINE ===               -> StreamBoundary(End)
//! 2024-05-01 12:00:00 === HYPE TRAIN END level=3    -> Milestone { level: 3 }
//! ```

use crate::sync::row::{Row, STREAM_END, STREAM_START};
use regex::Regex;
use std::fmt;
use std::sync::LazyLock;

const FIELD_DELIMITER: char = '\t';
const EVENT_PREFIX: &str = " ===";
const EVENT_SEPARATOR: &str = " === ";
const HYPE_TRAIN_END: &str = "=== HYPE TRAIN END";
const ONLINE: &str = "=== ONLINE";
const OFFLINE: &str = "=== OFFLINE";

static ROW_DATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^20\d\d-\d\d-\d\d").expect("static regex"));

static HYPE_LEVEL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"level=(\d*)").expect("static regex"));

/// Malformed or unknown input line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseWarning {
    pub line: String,
    pub reason: &'static str,
}

impl fmt::Display for ParseWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {:?}", self.reason, self.line)
    }
}

impl std::error::Error for ParseWarning {}

/// Stream boundary kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Boundary {
    Start,
    End,
}

impl Boundary {
    pub fn category(self) -> &'static str {
        match self {
            Boundary::Start => STREAM_START,
            Boundary::End => STREAM_END,
        }
    }
}

/// Completed hype train
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Milestone {
    pub level: u64,
}

impl Milestone {
    /// Reported level is one below the level the train ended on
    pub fn message(&self) -> String {
        format!("Hypetrain Completed Level {}", i128::from(self.level) - 1)
    }
}

/// Result of parsing one line
#[derive(Debug, Clone, PartialEq)]
pub enum LineEvent {
    /// Timestamped entry to append
    Row(Row),
    /// Stream start/end, carrying its synthesized row
    StreamBoundary { boundary: Boundary, row: Row },
    /// Annotation for the most recently queued row
    Milestone(Milestone),
    Unrecognized(ParseWarning),
}

/// Parse a single line
pub fn parse_line(raw: &str) -> LineEvent {
    let line = raw.trim_end_matches(['\r', '\n']);

    if let Some(row) = parse_row(line) {
        return LineEvent::Row(row);
    }

    if line.contains(HYPE_TRAIN_END) {
        return parse_milestone(line);
    }

    if let Some(idx) = line.find(ONLINE) {
        return boundary(line, idx, Boundary::Start);
    }
    if let Some(idx) = line.find(OFFLINE) {
        return boundary(line, idx, Boundary::End);
    }

    LineEvent::Unrecognized(ParseWarning {
        line: line.to_string(),
        reason: "Unrecognized line",
    })
}

fn parse_row(line: &str) -> Option<Row> {
    let mut fields = line.split(FIELD_DELIMITER);
    let first = fields.next()?;
    let second = fields.next()?;
    if !ROW_DATE.is_match(first) || second.starts_with(EVENT_PREFIX) {
        return None;
    }
    Some(Row::from_cells(line.split(FIELD_DELIMITER)))
}

fn parse_milestone(line: &str) -> LineEvent {
    let level = HYPE_LEVEL
        .captures(line)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<u64>().ok());

    match level {
        Some(level) => LineEvent::Milestone(Milestone { level }),
        None => LineEvent::Unrecognized(ParseWarning {
            line: line.to_string(),
            reason: "Hype train end without level",
        }),
    }
}

fn boundary(line: &str, marker_at: usize, boundary: Boundary) -> LineEvent {
    let mut timestamp = line[..marker_at].trim();
    if timestamp.is_empty() {
        // Marker-first form: `=== ONLINE === 2024-05-01 10:00:00`
        timestamp = line
            .rsplit(EVENT_SEPARATOR)
            .next()
            .map(str::trim)
            .unwrap_or_default();
        if timestamp.starts_with("===") {
            timestamp = "";
        }
    }
    LineEvent::StreamBoundary {
        boundary,
        row: Row::marker(timestamp, boundary.category()),
    }
}

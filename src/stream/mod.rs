//! Incremental reader for a worker's newline-delimited JSON output stream.
//!
//! Each worker appends status records to `streams/<role>.jsonl`. The
//! [`EventReader`] remembers how far it has read and, on every poll, decodes
//! only the complete lines written since then. Reading never waits for more
//! output.
//!
//! Accepted record shape:
//!
//! ```text
//! {"type": "milestone", "payload": {"text": "Schema designed", "progress": 40}}
//! {"kind": "status", "message": "Starting"}
//! {"type": "finding", "payload": "Uses outdated crate"}
//! ```

use crate::errors::IngestError;
use crate::event::{Event, EventKind, EventPayload, Role, clamp_progress};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::{Map, Value};
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use tracing::{error, warn};

/// Characters of an undecodable line kept in the synthetic error event.
const MALFORMED_EVENT_PREFIX: usize = 200;
/// Characters of an undecodable line echoed into the log.
const MALFORMED_LOG_PREFIX: usize = 100;

/// Reads new events from one worker's stream file.
#[derive(Debug)]
pub struct EventReader {
    role: Role,
    path: PathBuf,
    offset: u64,
}

impl EventReader {
    pub fn new(role: Role, path: impl Into<PathBuf>) -> Self {
        Self {
            role,
            path: path.into(),
            offset: 0,
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Byte offset of the first unread byte.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Read everything appended since the last call.
    ///
    /// Only complete lines are consumed: a trailing partial line stays in the
    /// file and is picked up once its newline arrives. A missing file yields
    /// nothing. If the file shrank (truncated or replaced) the reader starts
    /// over from the beginning.
    pub fn read_new(&mut self) -> Result<NewEvents, IngestError> {
        let mut file = match File::open(&self.path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(NewEvents::empty(self.role));
            }
            Err(e) => {
                return Err(IngestError::OpenFailed {
                    path: self.path.clone(),
                    source: e,
                });
            }
        };

        let len = file
            .metadata()
            .map_err(|e| IngestError::ReadFailed {
                path: self.path.clone(),
                source: e,
            })?
            .len();

        if len < self.offset {
            warn!(
                role = %self.role,
                path = %self.path.display(),
                previous_offset = self.offset,
                len,
                "Stream file shrank, re-reading from start"
            );
            self.offset = 0;
        }
        if len == self.offset {
            return Ok(NewEvents::empty(self.role));
        }

        let mut buf = Vec::with_capacity((len - self.offset) as usize);
        file.seek(SeekFrom::Start(self.offset))
            .and_then(|_| file.read_to_end(&mut buf))
            .map_err(|e| IngestError::ReadFailed {
                path: self.path.clone(),
                source: e,
            })?;

        let complete = match buf.iter().rposition(|b| *b == b'\n') {
            Some(pos) => pos + 1,
            None => return Ok(NewEvents::empty(self.role)),
        };
        buf.truncate(complete);
        self.offset += complete as u64;

        let text = String::from_utf8_lossy(&buf).into_owned();
        Ok(NewEvents::new(self.role, text))
    }
}

/// Lazy, finite sequence of events decoded from one read.
#[derive(Debug)]
pub struct NewEvents {
    role: Role,
    lines: std::vec::IntoIter<String>,
}

impl NewEvents {
    fn new(role: Role, text: String) -> Self {
        let lines: Vec<String> = text.lines().map(str::to_string).collect();
        Self {
            role,
            lines: lines.into_iter(),
        }
    }

    fn empty(role: Role) -> Self {
        Self {
            role,
            lines: Vec::new().into_iter(),
        }
    }
}

impl Iterator for NewEvents {
    type Item = Event;

    fn next(&mut self) -> Option<Event> {
        for line in self.lines.by_ref() {
            if let Some(event) = decode_line(self.role, &line) {
                return Some(event);
            }
        }
        None
    }
}

/// Decode one stream line.
///
/// Returns `None` for blank lines and for records whose kind is missing or
/// not in the closed set. A line that is not valid JSON becomes a synthetic
/// `error` event instead of being dropped.
pub fn decode_line(role: Role, line: &str) -> Option<Event> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    let record: Value = match serde_json::from_str(line) {
        Ok(v) => v,
        Err(e) => {
            error!(
                role = %role,
                error = %e,
                line = %truncate_chars(line, MALFORMED_LOG_PREFIX),
                "Malformed JSON from worker"
            );
            return Some(Event::new(
                role,
                EventKind::Error,
                format!(
                    "Malformed JSON: {}",
                    truncate_chars(line, MALFORMED_EVENT_PREFIX)
                ),
            ));
        }
    };

    let Some(obj) = record.as_object() else {
        error!(role = %role, "Stream record is not a JSON object, skipping");
        return None;
    };

    let kind_name = obj
        .get("type")
        .or_else(|| obj.get("kind"))
        .and_then(Value::as_str);
    let Some(kind_name) = kind_name else {
        error!(role = %role, "Stream record has no event type, skipping");
        return None;
    };
    let Some(kind) = EventKind::from_wire(kind_name) else {
        error!(role = %role, kind = kind_name, "Unknown event type, skipping");
        return None;
    };

    let payload = normalize_payload(obj);
    let timestamp = obj
        .get("timestamp")
        .or_else(|| {
            obj.get("payload")
                .and_then(Value::as_object)
                .and_then(|p| p.get("timestamp"))
        })
        .and_then(Value::as_str)
        .and_then(parse_timestamp)
        .unwrap_or_else(Utc::now);

    Some(Event {
        kind,
        role,
        timestamp,
        payload,
    })
}

fn normalize_payload(record: &Map<String, Value>) -> EventPayload {
    let raw = record.get("payload");
    let fields: Map<String, Value> = match raw {
        Some(Value::String(s)) => {
            let mut m = Map::new();
            m.insert("text".to_string(), Value::String(s.clone()));
            m
        }
        Some(Value::Object(m)) => m.clone(),
        Some(Value::Null) | None => Map::new(),
        Some(other) => {
            let mut m = Map::new();
            m.insert("text".to_string(), Value::String(other.to_string()));
            m
        }
    };

    let text = non_empty_str(fields.get("text"))
        .or_else(|| non_empty_str(fields.get("message")))
        .or_else(|| non_empty_str(record.get("message")))
        .unwrap_or_else(|| match raw {
            Some(v) if !v.is_null() => v.to_string(),
            _ => Value::Object(record.clone()).to_string(),
        });

    let progress = fields
        .get("progress")
        .or_else(|| record.get("progress"))
        .and_then(Value::as_f64)
        .map(clamp_progress);

    let file = fields
        .get("file")
        .and_then(Value::as_str)
        .map(str::to_string);

    let data = fields.get("data").and_then(Value::as_object).cloned();

    EventPayload {
        text,
        progress,
        file,
        data,
    }
}

fn non_empty_str(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Parse an RFC 3339 timestamp, or a naive ISO 8601 one taken as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

//! Event definitions
//!
//! Defines the structure of individual transaction log records and their
//! line-oriented text form used by the file backend.

use std::fmt;

use crate::error::{LedgerError, Result};

/// Field separator in the text form
const FIELD_SEPARATOR: char = '\t';

/// Kind of mutation recorded by an [`Event`].
///
/// Code 0 is reserved and never valid in a well-formed log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum EventKind {
    Delete = 1,
    Put = 2,
}

impl EventKind {
    /// Numeric code as persisted
    pub fn code(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for EventKind {
    type Error = LedgerError;

    fn try_from(code: u8) -> Result<Self> {
        match code {
            1 => Ok(EventKind::Delete),
            2 => Ok(EventKind::Put),
            other => Err(LedgerError::UnknownEventKind(other)),
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventKind::Delete => f.write_str("DELETE"),
            EventKind::Put => f.write_str("PUT"),
        }
    }
}

/// A single record in the transaction log
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    /// Strictly increasing across the log; assigned by the logger on append
    pub sequence: u64,

    /// The operation recorded
    pub kind: EventKind,

    /// Non-empty key
    pub key: String,

    /// Value for `Put`; empty for `Delete`
    pub value: String,
}

impl Event {
    /// An unsequenced Put event
    pub fn put(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            sequence: 0,
            kind: EventKind::Put,
            key: key.into(),
            value: value.into(),
        }
    }

    /// An unsequenced Delete event
    pub fn delete(key: impl Into<String>) -> Self {
        Self {
            sequence: 0,
            kind: EventKind::Delete,
            key: key.into(),
            value: String::new(),
        }
    }

    /// Render the event as one log line with the given sequence number.
    ///
    /// Format: `sequence \t kind \t key \t value \n`. Tabs, newlines and
    /// backslashes inside the key or value are escaped.
    pub fn encode_line(&self, sequence: u64) -> String {
        let mut line = String::with_capacity(24 + self.key.len() + self.value.len());
        line.push_str(&sequence.to_string());
        line.push(FIELD_SEPARATOR);
        line.push_str(&self.kind.code().to_string());
        line.push(FIELD_SEPARATOR);
        escape_into(&self.key, &mut line);
        line.push(FIELD_SEPARATOR);
        escape_into(&self.value, &mut line);
        line.push('\n');
        line
    }

    /// Parse one log line (without its trailing newline)
    pub fn parse_line(line: &str) -> Result<Self> {
        let mut fields = line.splitn(4, FIELD_SEPARATOR);
        let (Some(sequence), Some(kind), Some(key), Some(value)) =
            (fields.next(), fields.next(), fields.next(), fields.next())
        else {
            return Err(LedgerError::WalCorruption(format!(
                "expected 4 tab-separated fields in {:?}",
                line
            )));
        };

        let sequence: u64 = sequence.parse().map_err(|e| {
            LedgerError::WalCorruption(format!("bad sequence {:?}: {}", sequence, e))
        })?;
        let code: u8 = kind
            .parse()
            .map_err(|e| LedgerError::WalCorruption(format!("bad event kind {:?}: {}", kind, e)))?;
        let kind = EventKind::try_from(code)?;

        let key = unescape(key)?;
        if key.is_empty() {
            return Err(LedgerError::WalCorruption(format!("empty key in {:?}", line)));
        }
        let value = unescape(value)?;

        Ok(Self { sequence, kind, key, value })
    }
}

fn escape_into(raw: &str, out: &mut String) {
    for c in raw.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\t' => out.push_str("\\t"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            c => out.push(c),
        }
    }
}

fn unescape(field: &str) -> Result<String> {
    if !field.contains('\\') {
        return Ok(field.to_string());
    }

    let mut out = String::with_capacity(field.len());
    let mut chars = field.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('t') => out.push('\t'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            other => {
                return Err(LedgerError::WalCorruption(format!(
                    "invalid escape sequence \\{} in {:?}",
                    other.map(String::from).unwrap_or_default(),
                    field
                )))
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_put_line() {
        let line = Event::put("a", "1").encode_line(7);
        assert_eq!(line, "7\t2\ta\t1\n");
    }

    #[test]
    fn test_encode_delete_line_has_empty_value() {
        let line = Event::delete("a").encode_line(3);
        assert_eq!(line, "3\t1\ta\t\n");
    }

    #[test]
    fn test_escapes_survive_parse() {
        let event = Event::put("tab\tkey", "multi\nline\\value\r");
        let line = event.encode_line(1);
        assert_eq!(line.matches('\n').count(), 1);

        let parsed = Event::parse_line(line.trim_end_matches('\n')).unwrap();
        assert_eq!(parsed.key, "tab\tkey");
        assert_eq!(parsed.value, "multi\nline\\value\r");
        assert_eq!(parsed.sequence, 1);
    }

    #[test]
    fn test_kind_zero_is_rejected() {
        let err = Event::parse_line("1\t0\tkey\tvalue").unwrap_err();
        assert!(matches!(err, LedgerError::UnknownEventKind(0)));
    }

    #[test]
    fn test_kind_codes() {
        assert_eq!(EventKind::Delete.code(), 1);
        assert_eq!(EventKind::Put.code(), 2);
        assert!(EventKind::try_from(3).is_err());
    }

    #[test]
    fn test_malformed_lines() {
        assert!(matches!(
            Event::parse_line("1\t2\tkey"),
            Err(LedgerError::WalCorruption(_))
        ));
        assert!(matches!(
            Event::parse_line("x\t2\tkey\tv"),
            Err(LedgerError::WalCorruption(_))
        ));
        assert!(matches!(
            Event::parse_line("1\t2\t\tv"),
            Err(LedgerError::WalCorruption(_))
        ));
        assert!(matches!(
            Event::parse_line("1\t2\tk\\q\tv"),
            Err(LedgerError::WalCorruption(_))
        ));
    }
}

//! Turning one matched event line into a typed [`Record`].

use crate::error::MalformedKind;
use crate::error::MalformedLineError;
use crate::extract::EventLine;
use crate::grammar::Caster;
use crate::grammar::FieldGrammar;
use crate::grammar::TimestampSource;
use compact_str::CompactString;
use smallvec::SmallVec;

/// A single numeric field value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    Int(i64),
    Float(f64),
}

impl Value {
    pub fn as_f64(self) -> f64 {
        match self {
            Self::Int(v) => v as f64,
            Self::Float(v) => v,
        }
    }

    pub fn caster(self) -> Caster {
        match self {
            Self::Int(_) => Caster::Int,
            Self::Float(_) => Caster::Float,
        }
    }
}

/// A parsed event: timestamp plus one value per grammar field, in grammar
/// order.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    /// Seconds.
    pub timestamp: f64,
    pub values: SmallVec<[Value; 12]>,
}

/// Matches the `<secs>.<usecs>:` header field of a `trace-cmd report` line.
static TIMESTAMP_REGEX: std::sync::LazyLock<regex::Regex> = std::sync::LazyLock::new(|| {
    regex::Regex::new(r"(?:^|\s)([0-9]+\.[0-9]+):").expect("Failed to compile regex")
});

/// Parse `line` according to `grammar`.
///
/// The payload is everything after the grammar's marker. Fields are looked up
/// by key, so the order of tokens on the line does not matter, and tokens not
/// named by the grammar are ignored.
pub fn parse(line: &EventLine, grammar: &FieldGrammar) -> Result<Record, MalformedLineError> {
    let malformed = |kind| MalformedLineError {
        subsystem: grammar.subsystem.into(),
        line: line.number,
        kind,
    };

    let text = line.text.as_str();
    let (header, payload) = match text.find(grammar.marker) {
        Some(pos) => (&text[..pos], &text[pos + grammar.marker.len()..]),
        None => (text, ""),
    };

    let tokens: SmallVec<[(&str, &str); 16]> = payload
        .split_ascii_whitespace()
        .filter_map(|token| token.split_once('='))
        .collect();
    let lookup = |key: &str| {
        tokens
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, value)| *value)
    };

    let timestamp = match grammar.timestamp {
        TimestampSource::Header => TIMESTAMP_REGEX
            .captures(header)
            .and_then(|caps| caps.get(1))
            .and_then(|m| m.as_str().parse::<f64>().ok())
            .ok_or_else(|| malformed(MalformedKind::MissingTimestamp))?,
        TimestampSource::Key(key) => {
            let raw = lookup(key).ok_or_else(|| malformed(MalformedKind::MissingTimestamp))?;
            parse_float(raw).ok_or_else(|| {
                malformed(MalformedKind::BadValue {
                    key: key.into(),
                    value: raw.into(),
                })
            })?
        }
    };

    let mut values = SmallVec::with_capacity(grammar.fields.len());
    for field in grammar.fields {
        let raw = lookup(field.key)
            .ok_or_else(|| malformed(MalformedKind::MissingField(field.key.into())))?;
        let value = match field.caster {
            Caster::Int => raw.parse::<i64>().ok().map(Value::Int),
            Caster::Float => parse_float(raw).map(Value::Float),
        };
        let value = value.ok_or_else(|| {
            malformed(MalformedKind::BadValue {
                key: field.key.into(),
                value: CompactString::from(raw),
            })
        })?;
        values.push(value);
    }

    Ok(Record { timestamp, values })
}

/// Only finite floats are accepted, anything else could not be cached.
fn parse_float(raw: &str) -> Option<f64> {
    raw.parse::<f64>().ok().filter(|v| v.is_finite())
}

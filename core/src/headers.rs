//! Ordered, case-insensitive header collection.
//!
//! # Design
//! Headers are kept as a `Vec` of `(name, value)` pairs in insertion order
//! with the caller's casing. Lookups compare names ASCII case-insensitively.
//! Repeated names are stored as separate entries; whether they may be
//! comma-merged depends on the header, so callers choose between
//! [`Headers::get`] (first match) and [`Headers::get_all`] (every match).
//!
//! Validation happens at insertion, so a `Headers` value can always be
//! written to the wire without producing an extra line.

use std::fmt;

use crate::constants::header;
use crate::error::{Error, ProtocolError};
use crate::method::is_token;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    entries: Vec<(String, String)>,
}

fn validate(name: &str, value: &str) -> Result<(), Error> {
    if !is_token(name) {
        return Err(Error::InvalidHeader {
            name: name.to_string(),
            reason: "name is not a token",
        });
    }
    if value.bytes().any(|b| (b < 0x20 && b != b'\t') || b == 0x7f) {
        return Err(Error::InvalidHeader {
            name: name.to_string(),
            reason: "value contains a control character",
        });
    }
    Ok(())
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry, keeping any existing entries with the same name.
    pub fn add(&mut self, name: &str, value: &str) -> Result<(), Error> {
        validate(name, value)?;
        self.entries.push((name.to_string(), value.to_string()));
        Ok(())
    }

    /// Append a compile-time entry known to be valid.
    pub(crate) fn push_trusted(&mut self, name: &'static str, value: &'static str) {
        debug_assert!(validate(name, value).is_ok());
        self.entries.push((name.to_string(), value.to_string()));
    }

    /// Replace every entry named `name` with a single entry holding `value`,
    /// at the position of the first one. Appends if there was none.
    pub fn set(&mut self, name: &str, value: &str) -> Result<(), Error> {
        validate(name, value)?;
        match self.position(name) {
            Some(first) => {
                self.entries[first] = (name.to_string(), value.to_string());
                let mut index = 0;
                self.entries.retain(|(n, _)| {
                    let keep = index <= first || !n.eq_ignore_ascii_case(name);
                    index += 1;
                    keep
                });
            }
            None => self.entries.push((name.to_string(), value.to_string())),
        }
        Ok(())
    }

    /// First value for `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Every value for `name`, in insertion order.
    pub fn get_all(&self, name: &str) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
            .collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    /// Remove every entry named `name`, returning how many were removed.
    pub fn remove(&mut self, name: &str) -> usize {
        let before = self.entries.len();
        self.entries.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
        before - self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.entries.iter().position(|(n, _)| n.eq_ignore_ascii_case(name))
    }

    /// Append `Name: value\r\n` for every entry.
    pub fn write_to(&self, out: &mut Vec<u8>) {
        for (name, value) in &self.entries {
            out.extend_from_slice(name.as_bytes());
            out.extend_from_slice(b": ");
            out.extend_from_slice(value.as_bytes());
            out.extend_from_slice(b"\r\n");
        }
    }

    /// The declared body length. Repeated or comma-joined values are
    /// accepted only when they all agree.
    pub fn content_length(&self) -> Result<Option<u64>, ProtocolError> {
        let mut length: Option<u64> = None;
        for raw in self.get_all(header::CONTENT_LENGTH) {
            for part in raw.split(',') {
                let part = part.trim();
                let parsed = if !part.is_empty() && part.bytes().all(|b| b.is_ascii_digit()) {
                    part.parse::<u64>().ok()
                } else {
                    None
                };
                match (parsed, length) {
                    (None, _) => return Err(ProtocolError::InvalidContentLength(raw.to_string())),
                    (Some(n), Some(prev)) if n != prev => {
                        return Err(ProtocolError::InvalidContentLength(raw.to_string()));
                    }
                    (Some(n), _) => length = Some(n),
                }
            }
        }
        Ok(length)
    }

    /// True when the final transfer coding is `chunked`.
    pub fn is_chunked(&self) -> bool {
        self.get_all(header::TRANSFER_ENCODING)
            .iter()
            .flat_map(|v| v.split(','))
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .last()
            .is_some_and(|c| c.eq_ignore_ascii_case("chunked"))
    }
}

impl fmt::Display for Headers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, value) in &self.entries {
            write!(f, "{name}: {value}\r\n")?;
        }
        Ok(())
    }
}

impl<'a> IntoIterator for &'a Headers {
    type Item = (&'a str, &'a str);
    type IntoIter = Box<dyn Iterator<Item = (&'a str, &'a str)> + 'a>;

    fn into_iter(self) -> Self::IntoIter {
        Box::new(self.iter())
    }
}

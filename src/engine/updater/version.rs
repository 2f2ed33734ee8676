//! Firmware Version Ordering
//!
//! Total order over firmware version strings. Each dot-separated part is
//! split into runs of digits and runs of letters; digit runs compare
//! numerically, letter runs lexically. A part written as `0x`-prefixed
//! hexadecimal is one number. Other characters (spaces, dashes, brackets)
//! only separate runs.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VersionError {
    #[error("empty version string")]
    Empty,
    #[error("malformed version {0:?}: empty segment")]
    EmptySegment(String),
}

/// One run of a version string.
///
/// Numbers sort before text so that mixed inputs still form a total order.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    /// Digits with leading zeros removed; compared by length, then lexically.
    Numeric(String),
    Text(String),
}

impl Token {
    fn numeric(digits: &str) -> Self {
        let trimmed = digits.trim_start_matches('0');
        Self::Numeric(if trimmed.is_empty() { "0" } else { trimmed }.to_string())
    }
}

fn hex_value(part: &str) -> Option<Token> {
    let hex = part.strip_prefix("0x").or_else(|| part.strip_prefix("0X"))?;
    if hex.is_empty() || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    u128::from_str_radix(hex, 16)
        .ok()
        .map(|value| Token::Numeric(value.to_string()))
}

/// Append the digit and letter runs of one dotted part.
fn tokenize(part: &str, tokens: &mut Vec<Token>) {
    if let Some(token) = hex_value(part) {
        tokens.push(token);
        return;
    }

    let mut run = String::new();
    let mut digits = false;
    let mut flush = |run: &mut String, digits: bool| {
        if run.is_empty() {
            return;
        }
        let text = std::mem::take(run);
        tokens.push(if digits {
            Token::numeric(&text)
        } else {
            Token::Text(text)
        });
    };

    for c in part.chars() {
        let is_digit = c.is_ascii_digit();
        if !is_digit && !c.is_alphabetic() {
            flush(&mut run, digits);
            continue;
        }
        if is_digit != digits {
            flush(&mut run, digits);
            digits = is_digit;
        }
        run.push(c);
    }
    flush(&mut run, digits);
}

impl Ord for Token {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Numeric(a), Self::Numeric(b)) => {
                a.len().cmp(&b.len()).then_with(|| a.cmp(b))
            }
            (Self::Numeric(_), Self::Text(_)) => Ordering::Less,
            (Self::Text(_), Self::Numeric(_)) => Ordering::Greater,
            (Self::Text(a), Self::Text(b)) => a.cmp(b),
        }
    }
}

impl PartialOrd for Token {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// A parsed firmware version that keeps its original spelling for display.
#[derive(Debug, Clone)]
pub struct FirmwareVersion {
    raw: String,
    tokens: Vec<Token>,
}

impl FirmwareVersion {
    pub fn parse(raw: &str) -> Result<Self, VersionError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(VersionError::Empty);
        }

        let mut tokens = Vec::new();
        for part in raw.split('.') {
            let part = part.trim();
            if part.is_empty() {
                return Err(VersionError::EmptySegment(raw.to_string()));
            }
            tokenize(part, &mut tokens);
        }

        Ok(Self {
            raw: raw.to_string(),
            tokens,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// True if `self` is an update target for a device at `current`.
    pub fn is_newer_than(&self, current: &FirmwareVersion) -> bool {
        self > current
    }

    /// True if `self` is a downgrade target for a device at `current`.
    pub fn is_older_than(&self, current: &FirmwareVersion) -> bool {
        self < current
    }
}

impl PartialEq for FirmwareVersion {
    fn eq(&self, other: &Self) -> bool {
        self.tokens == other.tokens
    }
}

impl Eq for FirmwareVersion {}

impl Ord for FirmwareVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.tokens.cmp(&other.tokens)
    }
}

impl PartialOrd for FirmwareVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl FromStr for FirmwareVersion {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for FirmwareVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl Serialize for FirmwareVersion {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.raw)
    }
}

impl<'de> Deserialize<'de> for FirmwareVersion {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

//! Core types for rotastream

use bytes::Bytes;
use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, Local, TimeZone};
use once_cell::sync::Lazy;
use regex::Regex;
use std::str::FromStr;
use std::time::Duration;

use crate::constants::MAX_FREQUENCY_SECS;
use crate::error::{Error, Result};

/// "2 hours", "30m", "day", "10 seconds"
static FREQUENCY_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(\d+)?\s*([a-zA-Z]+)\s*$").expect("Invalid frequency regex")
});

/// Calendar unit whose crossing forces a rotation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BoundaryUnit {
    Second,
    Minute,
    Hour,
    Day,
}

impl BoundaryUnit {
    /// Length of one unit
    pub fn duration(&self) -> Duration {
        match self {
            BoundaryUnit::Second => Duration::from_secs(1),
            BoundaryUnit::Minute => Duration::from_secs(60),
            BoundaryUnit::Hour => Duration::from_secs(3600),
            BoundaryUnit::Day => Duration::from_secs(86400),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BoundaryUnit::Second => "second",
            BoundaryUnit::Minute => "minute",
            BoundaryUnit::Hour => "hour",
            BoundaryUnit::Day => "day",
        }
    }

    fn parse_unit(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "s" | "sec" | "secs" | "second" | "seconds" => Some(BoundaryUnit::Second),
            "m" | "min" | "mins" | "minute" | "minutes" | "minutely" => Some(BoundaryUnit::Minute),
            "h" | "hr" | "hrs" | "hour" | "hours" | "hourly" => Some(BoundaryUnit::Hour),
            "d" | "day" | "days" | "daily" => Some(BoundaryUnit::Day),
            _ => None,
        }
    }
}

impl FromStr for BoundaryUnit {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse_unit(s.trim()).ok_or_else(|| Error::InvalidBoundary(s.to_string()))
    }
}

impl std::fmt::Display for BoundaryUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Relative rotation period such as "2 hours", aligned to calendar boundaries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frequency {
    pub count: u32,
    pub unit: BoundaryUnit,
}

impl Frequency {
    pub fn new(count: u32, unit: BoundaryUnit) -> Self {
        Self { count, unit }
    }

    /// Length of one period
    pub fn period(&self) -> Duration {
        self.unit.duration() * self.count
    }

    /// Reject empty periods and periods too long to schedule on a calendar
    pub fn validate(&self) -> Result<()> {
        if self.count == 0 {
            return Err(Error::InvalidFrequency(format!(
                "{} (count must be greater than 0)",
                self
            )));
        }
        if self.period().as_secs() > MAX_FREQUENCY_SECS {
            return Err(Error::InvalidFrequency(format!(
                "{} (longer than {} days)",
                self,
                MAX_FREQUENCY_SECS / 86_400
            )));
        }
        Ok(())
    }
}

impl FromStr for Frequency {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let caps = FREQUENCY_REGEX
            .captures(s)
            .ok_or_else(|| Error::InvalidFrequency(s.to_string()))?;

        let count = match caps.get(1) {
            Some(m) => m
                .as_str()
                .parse::<u32>()
                .map_err(|_| Error::InvalidFrequency(s.to_string()))?,
            None => 1,
        };
        let unit = BoundaryUnit::parse_unit(&caps[2])
            .ok_or_else(|| Error::InvalidFrequency(s.to_string()))?;

        let frequency = Frequency { count, unit };
        frequency.validate()?;
        Ok(frequency)
    }
}

impl std::fmt::Display for Frequency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.count == 1 {
            write!(f, "1 {}", self.unit)
        } else {
            write!(f, "{} {}s", self.count, self.unit)
        }
    }
}

/// Text encoding applied to string payloads before they are queued
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Encoding {
    #[default]
    Utf8,
    Latin1,
    Hex,
}

impl Encoding {
    pub fn as_str(&self) -> &'static str {
        match self {
            Encoding::Utf8 => "utf8",
            Encoding::Latin1 => "latin1",
            Encoding::Hex => "hex",
        }
    }

    /// Convert text to the bytes that will be written
    pub fn encode(&self, text: &str) -> Result<Bytes> {
        match self {
            Encoding::Utf8 => Ok(Bytes::copy_from_slice(text.as_bytes())),
            Encoding::Latin1 => text
                .chars()
                .map(|c| {
                    u8::try_from(u32::from(c)).map_err(|_| {
                        Error::InvalidEncoding(format!("{:?} is not representable in latin1", c))
                    })
                })
                .collect::<Result<Vec<u8>>>()
                .map(Bytes::from),
            Encoding::Hex => {
                let digits = text.trim().as_bytes();
                if digits.len() % 2 != 0 {
                    return Err(Error::InvalidEncoding(
                        "hex payload has an odd number of digits".to_string(),
                    ));
                }
                digits
                    .chunks(2)
                    .map(|pair| {
                        std::str::from_utf8(pair)
                            .ok()
                            .and_then(|p| u8::from_str_radix(p, 16).ok())
                            .ok_or_else(|| {
                                Error::InvalidEncoding(format!(
                                    "invalid hex digits: {}",
                                    String::from_utf8_lossy(pair)
                                ))
                            })
                    })
                    .collect::<Result<Vec<u8>>>()
                    .map(Bytes::from)
            }
        }
    }
}

impl FromStr for Encoding {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "utf8" | "utf-8" => Ok(Encoding::Utf8),
            "latin1" | "binary" | "iso-8859-1" => Ok(Encoding::Latin1),
            "hex" => Ok(Encoding::Hex),
            _ => Err(Error::InvalidEncoding(s.to_string())),
        }
    }
}

impl std::fmt::Display for Encoding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How the backing file is opened
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OpenFlags {
    /// Keep existing content and append ("a")
    #[default]
    Append,
    /// Discard existing content ("w")
    Truncate,
}

impl FromStr for OpenFlags {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "a" | "append" => Ok(OpenFlags::Append),
            "w" | "truncate" => Ok(OpenFlags::Truncate),
            _ => Err(Error::config(format!(
                "Invalid open flags: {}. Expected 'a' or 'w'",
                s
            ))),
        }
    }
}

/// Options passed through to the backing file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileOptions {
    pub flags: OpenFlags,
    /// Permission mode for newly created files (unix only)
    pub mode: Option<u32>,
    /// Default encoding for string payloads
    pub encoding: Encoding,
}

impl Default for FileOptions {
    fn default() -> Self {
        Self {
            flags: OpenFlags::Append,
            mode: Some(crate::constants::DEFAULT_FILE_MODE),
            encoding: Encoding::Utf8,
        }
    }
}

/// Validated strftime format used in rotated file names
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimestampFormat(String);

impl TimestampFormat {
    pub fn new(format: impl Into<String>) -> Result<Self> {
        let format = format.into();
        if format.is_empty() {
            return Err(Error::config("Timestamp format must not be empty"));
        }
        if StrftimeItems::new(&format).any(|item| matches!(item, Item::Error)) {
            return Err(Error::config(format!(
                "Invalid timestamp format: {}",
                format
            )));
        }

        let candidate = Self(format);
        let sample = Local
            .with_ymd_and_hms(2000, 1, 1, 0, 0, 0)
            .earliest()
            .map(|ts| candidate.format(&ts))
            .unwrap_or_default();
        if sample.contains('/') || sample.contains('\\') {
            return Err(Error::config(format!(
                "Timestamp format must not produce path separators: {}",
                candidate.0
            )));
        }

        Ok(candidate)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Format a timestamp for use in a file name
    pub fn format(&self, timestamp: &DateTime<Local>) -> String {
        timestamp.format(&self.0).to_string()
    }
}

impl Default for TimestampFormat {
    fn default() -> Self {
        Self(crate::constants::DEFAULT_TIMESTAMP_FORMAT.to_string())
    }
}

//! Timestamp handling for lines from the log API
//!
//! Lines arrive as `<RFC3339Nano timestamp> <content>`. Resumption works on
//! second resolution, display uses a configurable format and location.

use std::fmt::{self, Write as _};
use std::str::FromStr;

use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, FixedOffset, Local, SecondsFormat, TimeZone, Utc};
use chrono_tz::Tz;

/// `01-02 15:04:05`, month-day and time without the year
pub const SHORT_FORMAT: &str = "%m-%d %H:%M:%S";

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum TimestampError {
    #[error("missing timestamp")]
    Missing,

    #[error("invalid timestamp {0:?}")]
    Invalid(String),

    #[error("unknown time zone {0:?}, expected UTC, Local, a zone name or an offset such as +09:00")]
    InvalidLocation(String),

    #[error("invalid timestamp format {0:?}")]
    InvalidFormat(String),
}

/// Split a raw line on its first space into `(timestamp, content)`
pub fn split_log_line(line: &str) -> Option<(&str, &str)> {
    line.split_once(' ')
}

/// Parse the RFC3339Nano timestamp that prefixes every line
pub fn parse_timestamp(timestamp: &str) -> Result<DateTime<FixedOffset>, TimestampError> {
    if timestamp.is_empty() {
        return Err(TimestampError::Missing);
    }
    DateTime::parse_from_rfc3339(timestamp)
        .map_err(|_| TimestampError::Invalid(timestamp.to_string()))
}

/// Drop the fractional seconds from an RFC3339Nano timestamp
///
/// `2023-02-14T05:36:39.123456789Z` becomes `2023-02-14T05:36:39Z`. Input
/// without a fraction is returned unchanged.
pub fn remove_subsecond(timestamp: &str) -> String {
    let Some(dot) = timestamp.find('.') else {
        return timestamp.to_string();
    };
    let digits = timestamp[dot + 1..]
        .bytes()
        .take_while(u8::is_ascii_digit)
        .count();
    if digits == 0 {
        return timestamp.to_string();
    }
    format!("{}{}", &timestamp[..dot], &timestamp[dot + 1 + digits..])
}

/// How a line's timestamp is printed
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum TimestampFormat {
    /// RFC3339 with nine fractional digits
    #[default]
    Default,
    /// Month, day and time
    Short,
    /// strftime style pattern
    Custom(String),
}

impl FromStr for TimestampFormat {
    type Err = TimestampError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "" | "default" => Ok(Self::Default),
            "short" => Ok(Self::Short),
            custom => {
                if StrftimeItems::new(custom).any(|item| matches!(item, Item::Error)) {
                    return Err(TimestampError::InvalidFormat(custom.to_string()));
                }
                Ok(Self::Custom(custom.to_string()))
            }
        }
    }
}

/// Time zone timestamps are displayed in
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Location {
    #[default]
    Local,
    Utc,
    Fixed(FixedOffset),
    /// IANA zone such as `Asia/Tokyo`
    Named(Tz),
}

impl FromStr for Location {
    type Err = TimestampError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "utc" | "z" => Ok(Self::Utc),
            _ => FixedOffset::from_str(s)
                .map(Self::Fixed)
                .or_else(|_| s.parse::<Tz>().map(Self::Named))
                .map_err(|_| TimestampError::InvalidLocation(s.to_string())),
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local => f.write_str("Local"),
            Self::Utc => f.write_str("UTC"),
            Self::Fixed(offset) => write!(f, "{offset}"),
            Self::Named(tz) => f.write_str(tz.name()),
        }
    }
}

/// Reformat an RFC3339Nano timestamp for display
pub fn format_timestamp(
    timestamp: &str,
    format: &TimestampFormat,
    location: Location,
) -> Result<String, TimestampError> {
    let parsed = parse_timestamp(timestamp)?;

    match location {
        Location::Utc => render(&parsed.with_timezone(&Utc), format),
        Location::Local => render(&parsed.with_timezone(&Local), format),
        Location::Fixed(offset) => render(&parsed.with_timezone(&offset), format),
        Location::Named(tz) => render(&parsed.with_timezone(&tz), format),
    }
}

fn render<Tz>(time: &DateTime<Tz>, format: &TimestampFormat) -> Result<String, TimestampError>
where
    Tz: TimeZone,
    Tz::Offset: fmt::Display,
{
    let pattern = match format {
        TimestampFormat::Default => return Ok(time.to_rfc3339_opts(SecondsFormat::Nanos, true)),
        TimestampFormat::Short => SHORT_FORMAT,
        TimestampFormat::Custom(pattern) => pattern.as_str(),
    };

    let mut out = String::new();
    write!(out, "{}", time.format(pattern))
        .map_err(|_| TimestampError::InvalidFormat(pattern.to_string()))?;
    Ok(out)
}

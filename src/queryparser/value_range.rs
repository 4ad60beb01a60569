//! Value range processors: turning `begin..end` into value slot ranges.
//!
//! A processor either claims a range, returning the slot and the bounds in
//! the slot's serialised form, or declines so the next processor can try.
//! An empty bound leaves that side open.
//!
//! ```text
//! "$10..20"            NumberValueRangeProcessor(0, "$" prefix)
//!   → slot 0, sortable(10) .. sortable(20)
//! "12/03/99..12/04/01" DateValueRangeProcessor(1, d/m/y, epoch 1960)
//!   → slot 1, "19991203" .. "20011204"
//! ```

use chrono::NaiveDate;
use lazy_static::lazy_static;
use regex::Regex;

use crate::ValueNo;
use crate::error::Result;
use crate::sortable::sortable_serialise;

/// A range claimed by a [`ValueRangeProcessor`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueRange {
    pub slot: ValueNo,
    pub begin: Vec<u8>,
    pub end: Vec<u8>,
}

/// Interprets the two sides of a `begin..end` range.
///
/// Return `Ok(None)` to decline the range. Errors abort the parse.
pub trait ValueRangeProcessor: Send + Sync {
    fn process(&self, begin: &str, end: &str) -> Result<Option<ValueRange>>;
}

/// A marker string identifying which ranges a processor handles.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
enum Marker {
    #[default]
    None,
    /// Required at the start of `begin`, optional at the start of `end`.
    Prefix(String),
    /// Required at the end of `end`, optional at the end of `begin`.
    Suffix(String),
}

impl Marker {
    fn new(marker: &str, prefix: bool) -> Self {
        match (marker.is_empty(), prefix) {
            (true, _) => Marker::None,
            (false, true) => Marker::Prefix(marker.to_string()),
            (false, false) => Marker::Suffix(marker.to_string()),
        }
    }

    fn strip<'a>(&self, begin: &'a str, end: &'a str) -> Option<(&'a str, &'a str)> {
        match self {
            Marker::None => Some((begin, end)),
            Marker::Prefix(marker) => {
                let begin = begin.strip_prefix(marker.as_str())?;
                Some((begin, end.strip_prefix(marker.as_str()).unwrap_or(end)))
            }
            Marker::Suffix(marker) => {
                let end = end.strip_suffix(marker.as_str())?;
                Some((begin.strip_suffix(marker.as_str()).unwrap_or(begin), end))
            }
        }
    }
}

// ── String ────────────────────────────────────────────────────────────

/// Uses the range text unchanged as the slot bounds.
#[derive(Debug, Clone)]
pub struct StringValueRangeProcessor {
    slot: ValueNo,
    marker: Marker,
}

impl StringValueRangeProcessor {
    /// Claims every range.
    pub fn new(slot: ValueNo) -> Self {
        StringValueRangeProcessor {
            slot,
            marker: Marker::None,
        }
    }

    /// Claims ranges carrying `marker` as a prefix (`prefix == true`) or a
    /// suffix.
    pub fn with_marker(slot: ValueNo, marker: &str, prefix: bool) -> Self {
        StringValueRangeProcessor {
            slot,
            marker: Marker::new(marker, prefix),
        }
    }
}

impl ValueRangeProcessor for StringValueRangeProcessor {
    fn process(&self, begin: &str, end: &str) -> Result<Option<ValueRange>> {
        Ok(self.marker.strip(begin, end).map(|(begin, end)| ValueRange {
            slot: self.slot,
            begin: begin.as_bytes().to_vec(),
            end: end.as_bytes().to_vec(),
        }))
    }
}

// ── Number ────────────────────────────────────────────────────────────

/// Parses both sides as numbers and serialises them with
/// [`sortable_serialise`].
#[derive(Debug, Clone)]
pub struct NumberValueRangeProcessor {
    slot: ValueNo,
    marker: Marker,
}

impl NumberValueRangeProcessor {
    pub fn new(slot: ValueNo) -> Self {
        NumberValueRangeProcessor {
            slot,
            marker: Marker::None,
        }
    }

    /// `with_marker(0, "$", true)` accepts `$10..20`; `with_marker(1, "kg",
    /// false)` accepts `5..10kg`.
    pub fn with_marker(slot: ValueNo, marker: &str, prefix: bool) -> Self {
        NumberValueRangeProcessor {
            slot,
            marker: Marker::new(marker, prefix),
        }
    }
}

fn parse_number(text: &str) -> Option<f64> {
    let numeric = text
        .chars()
        .all(|ch| ch.is_ascii_digit() || matches!(ch, '.' | '-' | '+' | 'e' | 'E'));
    if !numeric || !text.chars().any(|ch| ch.is_ascii_digit()) {
        return None;
    }
    text.parse().ok()
}

/// Serialise one side of a range; an empty side stays empty.
fn convert_side<F>(text: &str, convert: F) -> Option<Vec<u8>>
where
    F: Fn(&str) -> Option<Vec<u8>>,
{
    if text.is_empty() {
        Some(Vec::new())
    } else {
        convert(text)
    }
}

impl ValueRangeProcessor for NumberValueRangeProcessor {
    fn process(&self, begin: &str, end: &str) -> Result<Option<ValueRange>> {
        let Some((begin, end)) = self.marker.strip(begin, end) else {
            return Ok(None);
        };
        let serialise = |text: &str| parse_number(text).map(sortable_serialise);
        let (Some(begin), Some(end)) = (convert_side(begin, serialise), convert_side(end, serialise)) else {
            return Ok(None);
        };
        Ok(Some(ValueRange {
            slot: self.slot,
            begin,
            end,
        }))
    }
}

// ── Date ──────────────────────────────────────────────────────────────

lazy_static! {
    static ref COMPACT_DATE: Regex = Regex::new(r"^(\d{4})(\d{2})(\d{2})$").unwrap();
    static ref ISO_DATE: Regex = Regex::new(r"^(\d{4})[-/.](\d{1,2})[-/.](\d{1,2})$").unwrap();
    static ref DMY_DATE: Regex = Regex::new(r"^(\d{1,2})[-/.](\d{1,2})[-/.](\d{2}|\d{4})$").unwrap();
}

/// Parses dates into `YYYYMMDD` strings, which sort chronologically.
///
/// Accepted forms are `YYYYMMDD`, `YYYY-MM-DD` and `D/M/Y` (or `M/D/Y` with
/// `prefer_mdy`), where `-`, `/` and `.` all work as separators. A two
/// digit year is placed in the century that puts it at or after
/// `epoch_year`.
#[derive(Debug, Clone)]
pub struct DateValueRangeProcessor {
    slot: ValueNo,
    marker: Marker,
    prefer_mdy: bool,
    epoch_year: i32,
}

impl DateValueRangeProcessor {
    pub fn new(slot: ValueNo, prefer_mdy: bool, epoch_year: i32) -> Self {
        DateValueRangeProcessor {
            slot,
            marker: Marker::None,
            prefer_mdy,
            epoch_year,
        }
    }

    pub fn with_marker(slot: ValueNo, marker: &str, prefix: bool, prefer_mdy: bool, epoch_year: i32) -> Self {
        DateValueRangeProcessor {
            slot,
            marker: Marker::new(marker, prefix),
            prefer_mdy,
            epoch_year,
        }
    }

    fn parse_date(&self, text: &str) -> Option<Vec<u8>> {
        let field = |caps: &regex::Captures<'_>, idx: usize| -> Option<u32> { caps.get(idx)?.as_str().parse().ok() };

        let date = if let Some(caps) = COMPACT_DATE.captures(text).or_else(|| ISO_DATE.captures(text)) {
            let year = i32::try_from(field(&caps, 1)?).ok()?;
            NaiveDate::from_ymd_opt(year, field(&caps, 2)?, field(&caps, 3)?)?
        } else {
            let caps = DMY_DATE.captures(text)?;
            let (a, b) = (field(&caps, 1)?, field(&caps, 2)?);
            let year_text = caps.get(3)?.as_str();
            let mut year = i32::try_from(field(&caps, 3)?).ok()?;
            if year_text.len() == 2 {
                year += 1900;
                if year < self.epoch_year {
                    year += 100;
                }
            }
            let (first, second) = if self.prefer_mdy { ((b, a), (a, b)) } else { ((a, b), (b, a)) };
            NaiveDate::from_ymd_opt(year, first.1, first.0)
                .or_else(|| NaiveDate::from_ymd_opt(year, second.1, second.0))?
        };
        Some(date.format("%Y%m%d").to_string().into_bytes())
    }
}

impl ValueRangeProcessor for DateValueRangeProcessor {
    fn process(&self, begin: &str, end: &str) -> Result<Option<ValueRange>> {
        let Some((begin, end)) = self.marker.strip(begin, end) else {
            return Ok(None);
        };
        let parse = |text: &str| self.parse_date(text);
        let (Some(begin), Some(end)) = (convert_side(begin, parse), convert_side(end, parse)) else {
            return Ok(None);
        };
        Ok(Some(ValueRange {
            slot: self.slot,
            begin,
            end,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sortable::sortable_unserialise;

    #[test]
    fn test_string_markers() {
        let vrp = StringValueRangeProcessor::with_marker(2, "author:", true);
        let range = vrp.process("author:a", "b").unwrap().unwrap();
        assert_eq!((range.slot, range.begin, range.end), (2, b"a".to_vec(), b"b".to_vec()));
        assert!(vrp.process("a", "b").unwrap().is_none());

        let suffix = StringValueRangeProcessor::with_marker(3, "kg", false);
        let range = suffix.process("5kg", "10kg").unwrap().unwrap();
        assert_eq!(range.begin, b"5".to_vec());
        assert!(suffix.process("5kg", "10").unwrap().is_none());
    }

    #[test]
    fn test_number_range() {
        let vrp = NumberValueRangeProcessor::with_marker(0, "$", true);
        let range = vrp.process("$10", "20").unwrap().unwrap();
        assert_eq!(range.slot, 0);
        assert_eq!(sortable_unserialise(&range.begin), 10.0);
        assert_eq!(sortable_unserialise(&range.end), 20.0);
        assert!(vrp.process("$ten", "20").unwrap().is_none());

        let open = NumberValueRangeProcessor::new(1).process("", "-2.5").unwrap().unwrap();
        assert!(open.begin.is_empty());
        assert_eq!(sortable_unserialise(&open.end), -2.5);
    }

    #[test]
    fn test_date_formats() {
        let vrp = DateValueRangeProcessor::new(1, false, 1960);
        let range = vrp.process("12/03/99", "12/04/01").unwrap().unwrap();
        assert_eq!(range.begin, b"19991203".to_vec());
        assert_eq!(range.end, b"20011204".to_vec());

        let iso = vrp.process("2001-02-03", "20010304").unwrap().unwrap();
        assert_eq!(iso.begin, b"20010203".to_vec());
        assert_eq!(iso.end, b"20010304".to_vec());

        let mdy = DateValueRangeProcessor::new(1, true, 1960);
        let range = mdy.process("03/12/99", "").unwrap().unwrap();
        assert_eq!(range.begin, b"19990312".to_vec());
        assert!(range.end.is_empty());
        // An impossible month/day order falls back to the other reading.
        let swapped = mdy.process("25/12/99", "").unwrap().unwrap();
        assert_eq!(swapped.begin, b"19991225".to_vec());
        assert!(vrp.process("31/31/99", "").unwrap().is_none());
        assert!(vrp.process("yesterday", "today").unwrap().is_none());
    }
}

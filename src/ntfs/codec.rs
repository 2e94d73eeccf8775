//! Field-level decoding primitives
//!
//! Little-endian integer reads at fixed offsets, Windows FILETIME
//! conversion and UTF-16LE name decoding. Every reader is bounds-checked
//! and reports a [`DecodeError`] instead of panicking.

use crate::error::DecodeError;
use byteorder::{ByteOrder, LittleEndian};
use chrono::{DateTime, NaiveDate, TimeDelta, Utc};
use std::fmt;

/// Borrowed view over a byte slice with offset-addressed little-endian reads.
///
/// Offsets are always relative to the start of the wrapped slice, so the
/// same cursor can be handed an attribute and read its fields using the
/// offsets from the NTFS layout tables.
#[derive(Debug, Clone, Copy)]
pub struct ByteCursor<'a> {
    data: &'a [u8],
}

impl<'a> ByteCursor<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn bytes(&self) -> &'a [u8] {
        self.data
    }

    /// Slice `len` bytes at `offset`, failing if the range leaves the buffer
    pub fn slice(&self, field: &'static str, offset: usize, len: usize) -> Result<&'a [u8], DecodeError> {
        offset
            .checked_add(len)
            .and_then(|end| self.data.get(offset..end))
            .ok_or(DecodeError::OutOfBounds {
                field,
                offset,
                len,
            })
    }

    pub fn u8(&self, field: &'static str, offset: usize) -> Result<u8, DecodeError> {
        Ok(self.slice(field, offset, 1)?[0])
    }

    pub fn u16(&self, field: &'static str, offset: usize) -> Result<u16, DecodeError> {
        Ok(LittleEndian::read_u16(self.slice(field, offset, 2)?))
    }

    pub fn u32(&self, field: &'static str, offset: usize) -> Result<u32, DecodeError> {
        Ok(LittleEndian::read_u32(self.slice(field, offset, 4)?))
    }

    pub fn u64(&self, field: &'static str, offset: usize) -> Result<u64, DecodeError> {
        Ok(LittleEndian::read_u64(self.slice(field, offset, 8)?))
    }

    pub fn filetime(&self, field: &'static str, offset: usize) -> Result<Filetime, DecodeError> {
        self.u64(field, offset).map(Filetime)
    }

    /// Decode `units` UTF-16 code units starting at `offset`
    pub fn utf16(&self, offset: usize, units: usize) -> Result<String, DecodeError> {
        let raw = self
            .slice("name", offset, units * 2)
            .map_err(|_| DecodeError::UnreadableName)?;
        decode_utf16le(raw)
    }
}

/// Decode a UTF-16LE byte string. Odd lengths and unpaired surrogates are
/// reported as [`DecodeError::UnreadableName`].
pub fn decode_utf16le(raw: &[u8]) -> Result<String, DecodeError> {
    if raw.len() % 2 != 0 {
        return Err(DecodeError::UnreadableName);
    }
    let units: Vec<u16> = raw
        .chunks_exact(2)
        .map(LittleEndian::read_u16)
        .collect();
    String::from_utf16(&units).map_err(|_| DecodeError::UnreadableName)
}

/// Encode a string as UTF-16LE bytes (used when building records)
pub fn encode_utf16le(name: &str) -> Vec<u8> {
    name.encode_utf16().flat_map(|u| u.to_le_bytes()).collect()
}

// ============================================================================
// FILETIME
// ============================================================================

/// Tick counts at or beyond this bound are rejected as timestamps.
pub const MAX_FILETIME_TICKS: u64 = u64::MAX / 100;

/// Raw Windows FILETIME: 100-nanosecond ticks since 1601-01-01 UTC.
///
/// The tick count is kept as-is; conversion to a calendar date happens on
/// demand so an unconvertible value never loses the original bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, serde::Serialize)]
pub struct Filetime(pub u64);

impl Filetime {
    pub fn ticks(&self) -> u64 {
        self.0
    }

    pub fn to_datetime(&self) -> Result<DateTime<Utc>, DecodeError> {
        if self.0 >= MAX_FILETIME_TICKS {
            return Err(DecodeError::InvalidTimestamp(self.0));
        }
        let epoch = NaiveDate::from_ymd_opt(1601, 1, 1)
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .ok_or(DecodeError::InvalidTimestamp(self.0))?;
        let micros = i64::try_from(self.0 / 10).map_err(|_| DecodeError::InvalidTimestamp(self.0))?;
        let nanos = (self.0 % 10) as i64 * 100;
        epoch
            .checked_add_signed(TimeDelta::microseconds(micros))
            .and_then(|t| t.checked_add_signed(TimeDelta::nanoseconds(nanos)))
            .map(|t| t.and_utc())
            .ok_or(DecodeError::InvalidTimestamp(self.0))
    }

    /// Convert to whole seconds since the Unix epoch (negative before 1970)
    pub fn to_unix(&self) -> Result<i64, DecodeError> {
        self.to_datetime().map(|t| t.timestamp())
    }
}

impl fmt::Display for Filetime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_datetime() {
            Ok(t) => write!(f, "{}", t.format("%Y-%m-%d %H:%M:%S%.7f")),
            Err(e) => write!(f, "{}", e),
        }
    }
}

impl From<DateTime<Utc>> for Filetime {
    fn from(value: DateTime<Utc>) -> Self {
        // Difference between 1601 and 1970 in 100-nanosecond intervals
        const EPOCH_DIFF: i64 = 116_444_736_000_000_000;
        let ticks = value.timestamp() * 10_000_000
            + i64::from(value.timestamp_subsec_nanos() / 100)
            + EPOCH_DIFF;
        Filetime(ticks.max(0) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn reads_little_endian_fields() {
        let data = [0x46, 0x49, 0x4C, 0x45, 0x30, 0x00, 0x03, 0x00];
        let cursor = ByteCursor::new(&data);
        assert_eq!(cursor.u32("signature", 0).unwrap(), 0x454C_4946);
        assert_eq!(cursor.u16("usa", 4).unwrap(), 0x30);
        assert_eq!(cursor.u16("usa_size", 6).unwrap(), 3);
    }

    #[test]
    fn out_of_bounds_reads_fail() {
        let data = [0u8; 6];
        let cursor = ByteCursor::new(&data);
        assert_eq!(
            cursor.u64("lsn", 0),
            Err(DecodeError::OutOfBounds { field: "lsn", offset: 0, len: 8 })
        );
        assert!(cursor.slice("huge", usize::MAX, 2).is_err());
    }

    #[test]
    fn filetime_epoch_and_unix() {
        assert_eq!(
            Filetime(0).to_datetime().unwrap(),
            Utc.with_ymd_and_hms(1601, 1, 1, 0, 0, 0).unwrap()
        );
        assert_eq!(Filetime(116_444_736_000_000_000).to_unix().unwrap(), 0);
    }

    #[test]
    fn filetime_from_datetime_keeps_ticks() {
        let when = Utc.with_ymd_and_hms(2023, 11, 14, 9, 30, 5).unwrap();
        let ft = Filetime::from(when);
        assert_eq!(ft.to_datetime().unwrap(), when);
        assert_eq!(Filetime(ft.ticks() + 7).to_datetime().unwrap().timestamp_subsec_nanos(), 700);
    }

    #[test]
    fn huge_filetime_is_invalid() {
        let ft = Filetime(u64::MAX);
        assert_eq!(ft.to_datetime(), Err(DecodeError::InvalidTimestamp(u64::MAX)));
        assert_eq!(ft.to_string(), "invalid timestamp");
        assert!(Filetime(MAX_FILETIME_TICKS - 1).to_datetime().is_ok());
    }

    #[test]
    fn utf16_names() {
        let raw = encode_utf16le("report.txt");
        assert_eq!(decode_utf16le(&raw).unwrap(), "report.txt");
        // lone high surrogate
        assert_eq!(decode_utf16le(&[0x00, 0xD8]), Err(DecodeError::UnreadableName));
        assert_eq!(decode_utf16le(&[0x41]), Err(DecodeError::UnreadableName));
        let cursor = ByteCursor::new(&raw);
        assert_eq!(cursor.utf16(0, 6).unwrap(), "report");
        assert_eq!(cursor.utf16(0, 40), Err(DecodeError::UnreadableName));
    }
}

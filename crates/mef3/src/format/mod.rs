//! On-disk layouts.
//!
//! - [`header`]: universal header shared by every file
//! - [`metadata`]: time-series metadata file (`.tmet`)
//! - [`red`]: compressed sample blocks stored in `.tdat`
//! - [`index`]: block index file (`.tidx`) and table of contents
//! - [`records`]: record data and index files (`.rdat` / `.ridx`)
//!
//! All multi-byte values are little-endian.

pub mod header;
pub mod index;
pub mod metadata;
pub mod records;
pub mod red;

/// Microsecond UTC timestamp.
pub type Timestamp = i64;

/// "No entry" sentinel for timestamps.
pub const UUTC_NO_ENTRY: Timestamp = i64::MIN;

/// "No entry" sentinel for signed counts.
pub const COUNT_NO_ENTRY: i64 = -1;

/// "No entry" sentinel for frequencies and other floating point values.
pub const FREQUENCY_NO_ENTRY: f64 = -1.0;

/// Recording-time de-identification offset.
///
/// Stored times are `-(t - offset)`, so a stored negative value marks an
/// offset-applied time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RecordingTimeOffset(Option<i64>);

impl RecordingTimeOffset {
    /// Wraps a section 3 `recording_time_offset` value. No-entry and zero
    /// disable the offset.
    pub fn new(offset: i64) -> Self {
        if offset == UUTC_NO_ENTRY || offset == 0 {
            Self(None)
        } else {
            Self(Some(offset))
        }
    }

    /// An offset that leaves times untouched.
    pub fn none() -> Self {
        Self(None)
    }

    /// Returns the offset value, if any.
    pub fn value(&self) -> Option<i64> {
        self.0
    }

    /// Converts a caller time into its stored form.
    pub fn apply(&self, time: Timestamp) -> Timestamp {
        match self.0 {
            Some(offset) if time != UUTC_NO_ENTRY => -(time - offset),
            _ => time,
        }
    }

    /// Converts a stored time back into caller time.
    pub fn remove(&self, time: Timestamp) -> Timestamp {
        match self.0 {
            Some(offset) if time != UUTC_NO_ENTRY && time < 0 => -time + offset,
            _ => time,
        }
    }
}

/// Copies `value` into a fixed NUL padded field, truncating at a char
/// boundary so one terminating NUL always fits.
pub(crate) fn put_str(buf: &mut [u8], value: &str) {
    buf.fill(0);
    let max = buf.len().saturating_sub(1);
    let mut end = value.len().min(max);
    while !value.is_char_boundary(end) {
        end -= 1;
    }
    buf[..end].copy_from_slice(&value.as_bytes()[..end]);
}

/// Reads a NUL padded UTF-8 field.
pub(crate) fn get_str(buf: &[u8]) -> String {
    let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    String::from_utf8_lossy(&buf[..end]).into_owned()
}

pub(crate) fn get_u32(buf: &[u8], offset: usize) -> u32 {
    let mut raw = [0u8; 4];
    raw.copy_from_slice(&buf[offset..offset + 4]);
    u32::from_le_bytes(raw)
}

pub(crate) fn get_i32(buf: &[u8], offset: usize) -> i32 {
    let mut raw = [0u8; 4];
    raw.copy_from_slice(&buf[offset..offset + 4]);
    i32::from_le_bytes(raw)
}

pub(crate) fn get_i64(buf: &[u8], offset: usize) -> i64 {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&buf[offset..offset + 8]);
    i64::from_le_bytes(raw)
}

pub(crate) fn get_f32(buf: &[u8], offset: usize) -> f32 {
    f32::from_bits(get_u32(buf, offset))
}

pub(crate) fn get_f64(buf: &[u8], offset: usize) -> f64 {
    f64::from_bits(get_i64(buf, offset) as u64)
}

pub(crate) fn put(buf: &mut [u8], offset: usize, bytes: &[u8]) {
    buf[offset..offset + bytes.len()].copy_from_slice(bytes);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_time_offset() {
        let offset = RecordingTimeOffset::new(1_000_000);
        let stored = offset.apply(1_500_000);
        assert_eq!(stored, -500_000);
        assert_eq!(offset.remove(stored), 1_500_000);

        // Non-negative stored times are already offset free.
        assert_eq!(offset.remove(42), 42);
        assert_eq!(offset.apply(UUTC_NO_ENTRY), UUTC_NO_ENTRY);
        assert_eq!(offset.remove(UUTC_NO_ENTRY), UUTC_NO_ENTRY);
    }

    #[test]
    fn test_no_offset() {
        let offset = RecordingTimeOffset::new(UUTC_NO_ENTRY);
        assert_eq!(offset.value(), None);
        assert_eq!(offset.apply(123), 123);
        assert_eq!(offset.remove(-123), -123);
    }

    #[test]
    fn test_string_fields() {
        let mut buf = [0xFFu8; 8];
        put_str(&mut buf, "channel-long-name");
        assert_eq!(get_str(&buf), "channel");
        assert_eq!(buf[7], 0);

        // Multi-byte characters are never split.
        put_str(&mut buf, "ab\u{00e9}\u{00e9}\u{00e9}");
        assert_eq!(get_str(&buf), "ab\u{00e9}\u{00e9}");
    }
}

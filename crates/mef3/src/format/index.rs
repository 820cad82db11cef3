//! Block index file (`.tidx`) and table of contents.
//!
//! The index file is a universal header followed by one fixed 56-byte entry
//! per data block:
//!
//! ```text
//! Offset  Size  Field
//! ------  ----  -----
//! 0x00    8     file_offset (i64, offset of the block in .tdat)
//! 0x08    8     start_time (i64, stored form)
//! 0x10    8     start_sample (i64, relative to the segment)
//! 0x18    4     number_of_samples (u32)
//! 0x1C    4     block_bytes (u32)
//! 0x20    4     maximum_sample_value (i32)
//! 0x24    4     minimum_sample_value (i32)
//! 0x28    4     reserved
//! 0x2C    1     RED block flags
//! 0x2D    11    reserved
//! ```

use crate::error::{MefError, Result};
use crate::format::header::{FileType, UniversalHeader};
use crate::format::red::BlockFlags;
use crate::format::{get_i32, get_i64, get_u32, put, Timestamp};
use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::Path;
use tracing::debug;

/// Index entry size in bytes.
pub const INDEX_ENTRY_BYTES: usize = 56;

/// Location and summary of one data block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockIndexEntry {
    /// Offset of the block from the start of the data file.
    pub file_offset: i64,
    /// Start time of the block.
    pub start_time: Timestamp,
    /// First sample of the block, relative to the segment start.
    pub start_sample: i64,
    /// Samples in the block.
    pub number_of_samples: u32,
    /// Encoded length of the block.
    pub block_bytes: u32,
    /// Largest sample in the block.
    pub maximum_sample_value: i32,
    /// Smallest sample in the block.
    pub minimum_sample_value: i32,
    /// Copy of the block's flags.
    pub flags: BlockFlags,
}

impl BlockIndexEntry {
    /// Sample following the last one in this block.
    pub fn end_sample(&self) -> i64 {
        self.start_sample + i64::from(self.number_of_samples)
    }

    /// Returns true if the block starts a new contiguous run.
    pub fn is_discontinuity(&self) -> bool {
        self.flags.is_discontinuity()
    }

    /// Encodes the entry into `INDEX_ENTRY_BYTES` bytes of `buf`.
    pub fn encode_into(&self, buf: &mut [u8]) {
        let buf = &mut buf[..INDEX_ENTRY_BYTES];
        buf.fill(0);
        put(buf, 0, &self.file_offset.to_le_bytes());
        put(buf, 8, &self.start_time.to_le_bytes());
        put(buf, 16, &self.start_sample.to_le_bytes());
        put(buf, 24, &self.number_of_samples.to_le_bytes());
        put(buf, 28, &self.block_bytes.to_le_bytes());
        put(buf, 32, &self.maximum_sample_value.to_le_bytes());
        put(buf, 36, &self.minimum_sample_value.to_le_bytes());
        buf[44] = self.flags.as_u8();
    }

    /// Decodes an entry from `INDEX_ENTRY_BYTES` bytes.
    pub fn decode(buf: &[u8]) -> Self {
        Self {
            file_offset: get_i64(buf, 0),
            start_time: get_i64(buf, 8),
            start_sample: get_i64(buf, 16),
            number_of_samples: get_u32(buf, 24),
            block_bytes: get_u32(buf, 28),
            maximum_sample_value: get_i32(buf, 32),
            minimum_sample_value: get_i32(buf, 36),
            flags: BlockFlags::from_u8(buf[44]),
        }
    }
}

/// Returns true if every entry not flagged as a discontinuity starts where
/// the previous one ends.
pub fn is_contiguous(entries: &[BlockIndexEntry]) -> bool {
    entries
        .windows(2)
        .all(|pair| pair[1].is_discontinuity() || pair[0].end_sample() == pair[1].start_sample)
}

/// A `.tidx` file in memory.
#[derive(Debug, Clone)]
pub struct IndexFile {
    /// Universal header.
    pub header: UniversalHeader,
    /// Entries in block order.
    pub entries: Vec<BlockIndexEntry>,
}

impl IndexFile {
    /// Reads and validates an index file.
    ///
    /// # Errors
    ///
    /// Returns `MefError::FileMissing` if the file is absent,
    /// `MefError::ChecksumMismatch` if the body CRC is wrong and
    /// `MefError::InvalidMetadata` if the body size disagrees with the
    /// header's entry count.
    pub fn read(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(MefError::FileMissing {
                path: path.to_path_buf(),
            });
        }
        let mut file = File::open(path)?;
        let header = UniversalHeader::read_from(&mut file)?;
        header.expect_type(FileType::TimeSeriesIndex)?;

        let mut body = Vec::new();
        file.read_to_end(&mut body)?;
        let actual = crc32fast::hash(&body);
        if actual != header.body_crc {
            return Err(MefError::ChecksumMismatch {
                expected: header.body_crc,
                actual,
            });
        }
        if body.len() % INDEX_ENTRY_BYTES != 0
            || (body.len() / INDEX_ENTRY_BYTES) as i64 != header.number_of_entries
        {
            return Err(MefError::InvalidMetadata(format!(
                "index body of {} bytes does not hold {} entries",
                body.len(),
                header.number_of_entries
            )));
        }

        let entries = body
            .chunks_exact(INDEX_ENTRY_BYTES)
            .map(BlockIndexEntry::decode)
            .collect::<Vec<_>>();
        debug!(
            "Loaded {} index entries from {}",
            entries.len(),
            path.display()
        );
        Ok(Self { header, entries })
    }

    /// Writes the whole file, refreshing the entry count and CRCs.
    ///
    /// # Errors
    ///
    /// Returns an error if any I/O operation fails.
    pub fn write(&mut self, path: &Path) -> Result<()> {
        let mut body = vec![0u8; self.entries.len() * INDEX_ENTRY_BYTES];
        for (entry, chunk) in self
            .entries
            .iter()
            .zip(body.chunks_exact_mut(INDEX_ENTRY_BYTES))
        {
            entry.encode_into(chunk);
        }
        self.header.number_of_entries = self.entries.len() as i64;
        self.header.maximum_entry_size = INDEX_ENTRY_BYTES as i64;
        self.header.body_crc = crc32fast::hash(&body);

        let mut writer = BufWriter::new(File::create(path)?);
        let encoded = self.header.encode();
        writer.write_all(&encoded)?;
        writer.write_all(&body)?;
        writer.flush()?;
        let file = writer
            .into_inner()
            .map_err(|e| std::io::Error::other(e.to_string()))?;
        file.sync_all()?;
        self.header.header_crc = get_u32(&encoded, 0);
        Ok(())
    }
}

/// One row of a table of contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TocEntry {
    /// The block starts a new contiguous run.
    pub discontinuity: bool,
    /// Deviation (µs) of the block start from the predicted end of the
    /// previous block; zero for the first block.
    pub gap_us: i64,
    /// First sample of the block (channel wide when built for a channel).
    pub start_sample: i64,
    /// Start time of the block (offset free).
    pub start_time: Timestamp,
    /// Samples in the block.
    pub number_of_samples: u32,
}

/// Duration of `number_of_samples` at `sampling_frequency`, in µs.
pub fn samples_to_us(number_of_samples: i64, sampling_frequency: f64) -> i64 {
    if sampling_frequency <= 0.0 {
        return 0;
    }
    ((number_of_samples as f64) / sampling_frequency * 1e6).round() as i64
}

/// Builds a table of contents for `entries`.
///
/// `entries` must carry offset-free start times. `sample_offset` is added to
/// every start sample; `previous_end` is the predicted end time of the block
/// preceding `entries[0]`, if any.
pub fn build_toc(
    entries: &[BlockIndexEntry],
    sample_offset: i64,
    mut previous_end: Option<Timestamp>,
    sampling_frequency: f64,
    epsilon_us: i64,
) -> Vec<TocEntry> {
    let mut toc = Vec::with_capacity(entries.len());
    for entry in entries {
        let gap_us = previous_end.map_or(0, |end| entry.start_time - end);
        toc.push(TocEntry {
            discontinuity: entry.is_discontinuity() || gap_us.abs() > epsilon_us,
            gap_us,
            start_sample: sample_offset + entry.start_sample,
            start_time: entry.start_time,
            number_of_samples: entry.number_of_samples,
        });
        previous_end = Some(
            entry.start_time
                + samples_to_us(i64::from(entry.number_of_samples), sampling_frequency),
        );
    }
    toc
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::header::UNIVERSAL_HEADER_BYTES;
    use tempfile::TempDir;

    fn entry(start_sample: i64, start_time: i64, discontinuity: bool) -> BlockIndexEntry {
        let mut flags = BlockFlags::new();
        flags.set_discontinuity(discontinuity);
        BlockIndexEntry {
            file_offset: UNIVERSAL_HEADER_BYTES as i64 + start_sample * 40,
            start_time,
            start_sample,
            number_of_samples: 10,
            block_bytes: 320,
            maximum_sample_value: 9,
            minimum_sample_value: -9,
            flags,
        }
    }

    #[test]
    fn test_entry_layout() {
        let e = entry(10, 10_000, true);
        let mut buf = [0u8; INDEX_ENTRY_BYTES];
        e.encode_into(&mut buf);
        assert_eq!(get_i64(&buf, 16), 10);
        assert_eq!(buf[44], BlockFlags::DISCONTINUITY);
        assert_eq!(BlockIndexEntry::decode(&buf), e);
    }

    #[test]
    fn test_contiguity() {
        let entries = vec![entry(0, 0, false), entry(10, 10_000, false)];
        assert!(is_contiguous(&entries));

        let gapped = vec![entry(0, 0, false), entry(15, 15_000, false)];
        assert!(!is_contiguous(&gapped));

        let flagged = vec![entry(0, 0, false), entry(15, 15_000, true)];
        assert!(is_contiguous(&flagged));
    }

    #[test]
    fn test_index_file_roundtrip() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("seg-000000.tidx");

        let mut file = IndexFile {
            header: UniversalHeader::new(FileType::TimeSeriesIndex),
            entries: (0..5).map(|i| entry(i * 10, i * 10_000, false)).collect(),
        };
        file.write(&path).unwrap();

        let loaded = IndexFile::read(&path).unwrap();
        assert_eq!(loaded.header.number_of_entries, 5);
        assert_eq!(loaded.entries, file.entries);
    }

    #[test]
    fn test_index_file_corruption() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("seg-000000.tidx");
        let mut file = IndexFile {
            header: UniversalHeader::new(FileType::TimeSeriesIndex),
            entries: vec![entry(0, 0, false)],
        };
        file.write(&path).unwrap();

        let mut bytes = std::fs::read(&path).unwrap();
        bytes[UNIVERSAL_HEADER_BYTES + 3] ^= 0x10;
        std::fs::write(&path, bytes).unwrap();
        assert!(matches!(
            IndexFile::read(&path),
            Err(MefError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn test_toc_gaps() {
        // 1 kHz, 10-sample blocks: each block predicts the next at +10 ms.
        let entries = vec![
            entry(0, 0, false),
            entry(10, 10_000, false),
            entry(20, 20_400, false),
            entry(30, 90_000, false),
        ];
        let toc = build_toc(&entries, 100, None, 1000.0, 1000);

        assert!(!toc[0].discontinuity);
        assert_eq!(toc[0].start_sample, 100);
        assert!(!toc[1].discontinuity);
        assert_eq!(toc[2].gap_us, 400);
        assert!(!toc[2].discontinuity);
        assert_eq!(toc[3].gap_us, 90_000 - 30_400);
        assert!(toc[3].discontinuity);
    }
}

//! Time-series segment writer.
//!
//! Splits a sample buffer into fixed-size blocks, compresses each one and
//! appends it to the segment's `.tdat` file while building the matching
//! `.tidx` entries. On [`SegmentWriter::finish`] the data header is
//! rewritten with its final CRC, the index file is written and the block
//! aggregates land in section 2 of the `.tmet` file.
//!
//! The same writer appends to an existing segment: it reopens the data file
//! at its end, continues the body CRC and extends the index from the prior
//! sample count.

use crate::access::{Credentials, EncryptionLevel, PasswordData};
use crate::config::{LossyConfig, MefConfig};
use crate::error::{MefError, Result};
use crate::format::header::{FileType, UniversalHeader, UNIVERSAL_HEADER_BYTES};
use crate::format::index::{samples_to_us, BlockIndexEntry, IndexFile};
use crate::format::metadata::MetadataFile;
use crate::format::red::RedBlock;
use crate::format::{RecordingTimeOffset, Timestamp, UUTC_NO_ENTRY};
use crate::path::{MefPath, SegmentLocation};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::Path;
use tracing::debug;

/// Default samples per block.
pub const DEFAULT_BLOCK_SIZE: usize = 1000;

/// Per-call write options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteOptions {
    /// Samples per block; the last block may be shorter.
    pub block_size: usize,
    /// Quantize blocks towards the configured residual ratio.
    pub lossy: bool,
    /// Encryption applied to every block.
    pub encryption: EncryptionLevel,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            lossy: false,
            encryption: EncryptionLevel::None,
        }
    }
}

impl WriteOptions {
    /// Options with the given block size.
    pub fn new(block_size: usize) -> Self {
        Self {
            block_size,
            ..Self::default()
        }
    }

    /// Enables or disables lossy compression.
    pub fn with_lossy(mut self, lossy: bool) -> Self {
        self.lossy = lossy;
        self
    }

    /// Sets the block encryption level.
    pub fn with_encryption(mut self, encryption: EncryptionLevel) -> Self {
        self.encryption = encryption;
        self
    }
}

/// State of a segment after a write or append.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentSummary {
    /// Samples in the segment.
    pub number_of_samples: i64,
    /// Blocks in the segment.
    pub number_of_blocks: i64,
    /// Start of the first block (offset free).
    pub start_time: Timestamp,
    /// End of the last block (offset free).
    pub end_time: Timestamp,
}

/// Streams blocks into one segment.
pub struct SegmentWriter {
    location: SegmentLocation,
    metadata: MetadataFile,
    access: PasswordData,
    offset: RecordingTimeOffset,
    sampling_frequency: f64,
    options: WriteOptions,
    lossy: Option<LossyConfig>,
    data: BufWriter<File>,
    data_header: UniversalHeader,
    body_crc: crc32fast::Hasher,
    position: u64,
    index: IndexFile,
    next_sample: i64,
    maximum_difference_bytes: u32,
    requested_end_time: Timestamp,
}

impl SegmentWriter {
    /// Starts writing a segment whose `.tmet` file already exists.
    ///
    /// # Errors
    ///
    /// Returns `MefError::FileMissing` without metadata,
    /// `MefError::FileExists` if the segment already holds data and
    /// `MefError::InvalidBlockSize` for a zero block size.
    pub fn create(
        segment_path: &Path,
        credentials: &Credentials,
        options: WriteOptions,
        config: &MefConfig,
    ) -> Result<Self> {
        if options.block_size == 0 {
            return Err(MefError::InvalidBlockSize(0));
        }
        let location = MefPath::parse(segment_path)?.segment_location()?;
        let tdat_path = location.file_path(FileType::TimeSeriesData);
        let tidx_path = location.file_path(FileType::TimeSeriesIndex);
        for path in [&tdat_path, &tidx_path] {
            if path.exists() {
                return Err(MefError::FileExists { path: path.clone() });
            }
        }
        let (metadata, access) = open_metadata(&location, credentials, options, config)?;

        let data_header = metadata.header.sibling(FileType::TimeSeriesData);
        let mut data = BufWriter::new(File::create(&tdat_path)?);
        // Placeholder, rewritten in finish().
        data_header.write_to(&mut data)?;
        let index = IndexFile {
            header: metadata.header.sibling(FileType::TimeSeriesIndex),
            entries: Vec::new(),
        };

        Self::assemble(
            location,
            metadata,
            access,
            options,
            config,
            data,
            data_header,
            crc32fast::Hasher::new(),
            UNIVERSAL_HEADER_BYTES as u64,
            index,
        )
    }

    /// Reopens an existing segment for appending.
    ///
    /// # Errors
    ///
    /// Returns `MefError::FileMissing` if any of the metadata, data or
    /// index files is absent.
    pub fn open_append(
        segment_path: &Path,
        credentials: &Credentials,
        options: WriteOptions,
        config: &MefConfig,
    ) -> Result<Self> {
        if options.block_size == 0 {
            return Err(MefError::InvalidBlockSize(0));
        }
        let location = MefPath::parse(segment_path)?.segment_location()?;
        for file_type in [
            FileType::TimeSeriesMetadata,
            FileType::TimeSeriesData,
            FileType::TimeSeriesIndex,
        ] {
            let path = location.file_path(file_type);
            if !path.exists() {
                return Err(MefError::FileMissing { path });
            }
        }
        let (metadata, access) = open_metadata(&location, credentials, options, config)?;
        let index = IndexFile::read(&location.file_path(FileType::TimeSeriesIndex))?;

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(location.file_path(FileType::TimeSeriesData))?;
        let data_header = UniversalHeader::read_from(&mut file)?;
        data_header.expect_type(FileType::TimeSeriesData)?;
        let position = file.seek(SeekFrom::End(0))?;
        let body_crc = crc32fast::Hasher::new_with_initial(data_header.body_crc);

        Self::assemble(
            location,
            metadata,
            access,
            options,
            config,
            BufWriter::new(file),
            data_header,
            body_crc,
            position,
            index,
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn assemble(
        location: SegmentLocation,
        metadata: MetadataFile,
        access: PasswordData,
        options: WriteOptions,
        config: &MefConfig,
        data: BufWriter<File>,
        data_header: UniversalHeader,
        body_crc: crc32fast::Hasher,
        position: u64,
        index: IndexFile,
    ) -> Result<Self> {
        let sampling_frequency = metadata.time_series()?.sampling_frequency;
        if sampling_frequency <= 0.0 {
            return Err(MefError::InvalidMetadata(format!(
                "sampling frequency must be positive, got {}",
                sampling_frequency
            )));
        }
        let next_sample = index.entries.last().map_or(0, BlockIndexEntry::end_sample);
        let maximum_difference_bytes = metadata.time_series()?.maximum_difference_bytes;
        Ok(Self {
            offset: metadata.recording_time_offset(),
            location,
            metadata,
            access,
            sampling_frequency,
            options,
            lossy: options.lossy.then_some(config.lossy),
            data,
            data_header,
            body_crc,
            position,
            index,
            next_sample,
            maximum_difference_bytes,
            requested_end_time: UUTC_NO_ENTRY,
        })
    }

    /// Start time (offset free) recorded in the segment metadata.
    pub fn metadata_start_time(&self) -> Timestamp {
        self.offset.remove(self.metadata.header.start_time)
    }

    /// Asks `finish` to record at least `end_time` as the segment end.
    pub fn set_end_time(&mut self, end_time: Timestamp) {
        self.requested_end_time = end_time;
    }

    /// Compresses `samples` into blocks starting at `start_time`.
    ///
    /// Block `i` starts at `start_time + round(i * block_size / fs * 1e6)`.
    /// With `discontinuity` set the first block is flagged as a
    /// discontinuity.
    ///
    /// # Errors
    ///
    /// Returns `MefError::EmptyInput` for an empty buffer and I/O or codec
    /// errors as they occur.
    pub fn write_samples(
        &mut self,
        samples: &[i32],
        start_time: Timestamp,
        discontinuity: bool,
    ) -> Result<()> {
        if samples.is_empty() {
            return Err(MefError::EmptyInput);
        }
        let block_size = self.options.block_size;
        for (i, chunk) in samples.chunks(block_size).enumerate() {
            let block_time =
                start_time + samples_to_us((i * block_size) as i64, self.sampling_frequency);
            let stored_time = self.offset.apply(block_time);
            let mut block = RedBlock::compress(
                chunk,
                stored_time,
                discontinuity && i == 0,
                self.lossy.as_ref(),
            )?;
            block.encrypt(self.options.encryption, &self.access)?;

            self.data.write_all(&block.bytes)?;
            self.body_crc.update(&block.bytes);
            self.index.entries.push(BlockIndexEntry {
                file_offset: self.position as i64,
                start_time: stored_time,
                start_sample: self.next_sample,
                number_of_samples: block.header.number_of_samples,
                block_bytes: block.header.block_bytes,
                maximum_sample_value: block.maximum_sample_value,
                minimum_sample_value: block.minimum_sample_value,
                flags: block.header.flags,
            });
            self.position += block.len() as u64;
            self.next_sample += chunk.len() as i64;
            self.maximum_difference_bytes = self
                .maximum_difference_bytes
                .max(block.header.difference_bytes);
        }
        debug!(
            "Encoded {} samples into {} blocks for {}",
            samples.len(),
            samples.len().div_ceil(block_size),
            self.location.segment_name
        );
        Ok(())
    }

    /// Finalizes the data, index and metadata files.
    ///
    /// # Errors
    ///
    /// Returns an error if any I/O operation fails or no block was written.
    pub fn finish(mut self) -> Result<SegmentSummary> {
        let (first, last) = match (self.index.entries.first(), self.index.entries.last()) {
            (Some(first), Some(last)) => (*first, *last),
            _ => return Err(MefError::EmptyInput),
        };
        let start_time = self.offset.remove(first.start_time);
        let mut end_time = self.offset.remove(last.start_time)
            + samples_to_us(i64::from(last.number_of_samples), self.sampling_frequency);
        if self.requested_end_time != UUTC_NO_ENTRY {
            end_time = end_time.max(self.requested_end_time);
        }
        let stats = BlockStatistics::from_entries(&self.index.entries);

        // Data file: final header with the complete body CRC.
        self.data_header.body_crc = self.body_crc.clone().finalize();
        self.data_header.number_of_entries = stats.number_of_blocks;
        self.data_header.maximum_entry_size = stats.maximum_block_bytes;
        self.data_header.start_time = self.offset.apply(start_time);
        self.data_header.end_time = self.offset.apply(end_time);
        self.data.seek(SeekFrom::Start(0))?;
        self.data_header.write_to(&mut self.data)?;
        self.data.flush()?;
        let file = self
            .data
            .into_inner()
            .map_err(|e| std::io::Error::other(e.to_string()))?;
        file.sync_all()?;

        self.index.header.start_time = self.data_header.start_time;
        self.index.header.end_time = self.data_header.end_time;
        self.index
            .write(&self.location.file_path(FileType::TimeSeriesIndex))?;

        let block_interval = samples_to_us(self.options.block_size as i64, self.sampling_frequency);
        let section = self.metadata.time_series_mut()?;
        section.number_of_samples = stats.number_of_samples;
        section.number_of_blocks = stats.number_of_blocks;
        section.maximum_block_bytes = stats.maximum_block_bytes;
        section.maximum_block_samples = stats.maximum_block_samples;
        section.maximum_difference_bytes = self.maximum_difference_bytes;
        section.block_interval = block_interval;
        section.recording_duration =
            samples_to_us(stats.number_of_samples, section.sampling_frequency);
        let (maximum_native, minimum_native) = native_extrema(
            stats.maximum_sample_value,
            stats.minimum_sample_value,
            section.units_conversion_factor,
        );
        section.maximum_native_sample_value = maximum_native;
        section.minimum_native_sample_value = minimum_native;
        section.number_of_discontinuities = stats.number_of_discontinuities;
        section.maximum_contiguous_blocks = stats.maximum_contiguous_blocks;
        section.maximum_contiguous_block_bytes = stats.maximum_contiguous_block_bytes;
        section.maximum_contiguous_samples = stats.maximum_contiguous_samples;
        self.metadata.header.start_time = self.data_header.start_time;
        self.metadata.header.end_time = self.data_header.end_time;
        self.metadata.write(
            &self.location.file_path(FileType::TimeSeriesMetadata),
            &self.access,
        )?;

        debug!(
            "Finished segment {}: {} samples in {} blocks",
            self.location.segment_name, stats.number_of_samples, stats.number_of_blocks
        );
        Ok(SegmentSummary {
            number_of_samples: stats.number_of_samples,
            number_of_blocks: stats.number_of_blocks,
            start_time,
            end_time,
        })
    }
}

fn open_metadata(
    location: &SegmentLocation,
    credentials: &Credentials,
    options: WriteOptions,
    config: &MefConfig,
) -> Result<(MetadataFile, PasswordData)> {
    let (metadata, unlocked) = MetadataFile::read(
        &location.file_path(FileType::TimeSeriesMetadata),
        credentials.password(),
        config,
    )?;
    let protected = !metadata.header.validation.is_unencrypted();
    if protected && unlocked.access_level() < crate::access::AccessLevel::Level1 {
        return Err(MefError::AccessDenied(format!(
            "credentials do not unlock {}",
            location.segment_name
        )));
    }
    if options.encryption.encrypted().is_encrypted() && !protected {
        return Err(MefError::Password(format!(
            "segment {} has no passwords to encrypt blocks with",
            location.segment_name
        )));
    }
    if !unlocked.can_decrypt(options.encryption.encrypted()) {
        return Err(MefError::AccessDenied(format!(
            "credentials cannot encrypt blocks at level {}",
            options.encryption.encrypted().as_i8()
        )));
    }
    Ok((metadata, unlocked))
}

/// Aggregates derived from a segment's full index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BlockStatistics {
    /// Samples across all blocks.
    pub number_of_samples: i64,
    /// Blocks.
    pub number_of_blocks: i64,
    /// Largest block in bytes.
    pub maximum_block_bytes: i64,
    /// Largest block in samples.
    pub maximum_block_samples: u32,
    /// Largest sample value.
    pub maximum_sample_value: i32,
    /// Smallest sample value.
    pub minimum_sample_value: i32,
    /// Blocks flagged as discontinuities.
    pub number_of_discontinuities: i64,
    /// Longest contiguous run, in blocks.
    pub maximum_contiguous_blocks: i64,
    /// Longest contiguous run, in bytes.
    pub maximum_contiguous_block_bytes: i64,
    /// Longest contiguous run, in samples.
    pub maximum_contiguous_samples: i64,
}

impl BlockStatistics {
    /// Computes the aggregates over `entries`. A contiguous run starts at
    /// the first entry and at every flagged discontinuity.
    pub fn from_entries(entries: &[BlockIndexEntry]) -> Self {
        let mut stats = Self {
            maximum_sample_value: i32::MIN,
            minimum_sample_value: i32::MAX,
            ..Self::default()
        };
        let (mut run_blocks, mut run_bytes, mut run_samples) = (0i64, 0i64, 0i64);
        for (i, entry) in entries.iter().enumerate() {
            if entry.is_discontinuity() {
                stats.number_of_discontinuities += 1;
            }
            if i > 0 && entry.is_discontinuity() {
                run_blocks = 0;
                run_bytes = 0;
                run_samples = 0;
            }
            run_blocks += 1;
            run_bytes += i64::from(entry.block_bytes);
            run_samples += i64::from(entry.number_of_samples);
            stats.maximum_contiguous_blocks = stats.maximum_contiguous_blocks.max(run_blocks);
            stats.maximum_contiguous_block_bytes =
                stats.maximum_contiguous_block_bytes.max(run_bytes);
            stats.maximum_contiguous_samples = stats.maximum_contiguous_samples.max(run_samples);

            stats.number_of_samples += i64::from(entry.number_of_samples);
            stats.number_of_blocks += 1;
            stats.maximum_block_bytes = stats.maximum_block_bytes.max(i64::from(entry.block_bytes));
            stats.maximum_block_samples = stats.maximum_block_samples.max(entry.number_of_samples);
            stats.maximum_sample_value = stats.maximum_sample_value.max(entry.maximum_sample_value);
            stats.minimum_sample_value = stats.minimum_sample_value.min(entry.minimum_sample_value);
        }
        stats
    }
}

/// Native (max, min) for raw sample extrema. A negative conversion factor
/// flips which raw extreme maps to the native maximum.
fn native_extrema(maximum: i32, minimum: i32, units_conversion_factor: f64) -> (f64, f64) {
    let (maximum, minimum) = (f64::from(maximum), f64::from(minimum));
    if units_conversion_factor >= 0.0 {
        (maximum * units_conversion_factor, minimum * units_conversion_factor)
    } else {
        (minimum * units_conversion_factor, maximum * units_conversion_factor)
    }
}

/// Writes `samples` as the data of a segment whose metadata exists.
///
/// Blocks start at the metadata's start time.
///
/// # Errors
///
/// Returns `MefError::EmptyInput` for an empty buffer (no files are
/// created), `MefError::FileMissing` without metadata and
/// `MefError::FileExists` if the segment already holds data.
pub fn write_ts_data(
    segment_path: &Path,
    credentials: &Credentials,
    samples: &[i32],
    options: WriteOptions,
    config: &MefConfig,
) -> Result<SegmentSummary> {
    if samples.is_empty() {
        return Err(MefError::EmptyInput);
    }
    let mut writer = SegmentWriter::create(segment_path, credentials, options, config)?;
    let start_time = writer.metadata_start_time();
    if start_time == UUTC_NO_ENTRY {
        return Err(MefError::InvalidMetadata(
            "segment metadata has no start time".into(),
        ));
    }
    writer.write_samples(samples, start_time, false)?;
    writer.finish()
}

/// Appends `samples` to the tail of an existing segment.
///
/// New blocks start at `start_time`; the segment end becomes the later of
/// `end_time` and the end of the last block. The first appended block is
/// flagged as a discontinuity when `discontinuity` is set.
///
/// # Errors
///
/// Returns `MefError::EmptyInput` for an empty buffer and
/// `MefError::FileMissing` if any of the three segment files is absent.
#[allow(clippy::too_many_arguments)]
pub fn append_ts_data(
    segment_path: &Path,
    credentials: &Credentials,
    start_time: Timestamp,
    end_time: Timestamp,
    samples: &[i32],
    discontinuity: bool,
    options: WriteOptions,
    config: &MefConfig,
) -> Result<SegmentSummary> {
    if samples.is_empty() {
        return Err(MefError::EmptyInput);
    }
    let mut writer = SegmentWriter::open_append(segment_path, credentials, options, config)?;
    writer.set_end_time(end_time);
    writer.write_samples(samples, start_time, discontinuity)?;
    writer.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::red::BlockFlags;

    fn entry(start_sample: i64, n: u32, bytes: u32, discontinuity: bool) -> BlockIndexEntry {
        let mut flags = BlockFlags::new();
        flags.set_discontinuity(discontinuity);
        BlockIndexEntry {
            file_offset: 0,
            start_time: 0,
            start_sample,
            number_of_samples: n,
            block_bytes: bytes,
            maximum_sample_value: start_sample as i32,
            minimum_sample_value: -(start_sample as i32),
            flags,
        }
    }

    #[test]
    fn test_block_statistics() {
        let entries = vec![
            entry(0, 10, 320, false),
            entry(10, 10, 328, false),
            entry(20, 4, 312, true),
            entry(24, 10, 400, false),
            entry(34, 10, 320, false),
        ];
        let stats = BlockStatistics::from_entries(&entries);
        assert_eq!(stats.number_of_samples, 44);
        assert_eq!(stats.number_of_blocks, 5);
        assert_eq!(stats.maximum_block_bytes, 400);
        assert_eq!(stats.maximum_block_samples, 10);
        assert_eq!(stats.maximum_sample_value, 34);
        assert_eq!(stats.minimum_sample_value, -34);
        assert_eq!(stats.number_of_discontinuities, 1);
        assert_eq!(stats.maximum_contiguous_blocks, 3);
        assert_eq!(stats.maximum_contiguous_samples, 24);
        assert_eq!(stats.maximum_contiguous_block_bytes, 1032);
    }

    #[test]
    fn test_native_extrema_follow_conversion_sign() {
        assert_eq!(native_extrema(79, -20, 0.5), (39.5, -10.0));
        assert_eq!(native_extrema(79, -20, -1.0), (20.0, -79.0));
        assert_eq!(native_extrema(79, -20, 0.0), (0.0, 0.0));
    }

    #[test]
    fn test_write_options() {
        let options = WriteOptions::new(64)
            .with_lossy(true)
            .with_encryption(EncryptionLevel::Level1);
        assert_eq!(options.block_size, 64);
        assert!(options.lossy);
        assert_eq!(WriteOptions::default().block_size, DEFAULT_BLOCK_SIZE);
    }
}

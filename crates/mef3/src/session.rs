//! Session, channel and segment handles.
//!
//! Opening a session loads every time-series channel below it, and opening a
//! channel loads all of its segments: metadata, block index (with the
//! recording-time offset removed) and a lazily opened data file handle.
//! Dropping a [`Session`] releases everything it owns.

use crate::access::{AccessLevel, PasswordData};
use crate::config::MefConfig;
use crate::error::{MefError, Result};
use crate::format::header::{FileType, UniversalHeader, UNIVERSAL_HEADER_BYTES};
use crate::format::index::{build_toc, samples_to_us, BlockIndexEntry, IndexFile, TocEntry};
use crate::format::metadata::{MetadataFile, TimeSeriesSection2};
use crate::format::records::{read_records, Record};
use crate::format::red::{BlockHeader, BLOCK_HEADER_BYTES};
use crate::format::{Timestamp, UUTC_NO_ENTRY};
use crate::path::{MefPath, MefPathKind, SegmentLocation};
use crate::reader::{read_channel, ReadOutput};
use crate::resolver::SegmentView;
use std::fs::{self, File};
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// A `.tdat` file with an optionally cached handle.
#[derive(Debug)]
pub struct DataFile {
    path: PathBuf,
    handle: Option<File>,
}

impl DataFile {
    fn new(path: PathBuf) -> Self {
        Self { path, handle: None }
    }

    /// Path of the data file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// True while a handle is cached.
    pub fn is_open(&self) -> bool {
        self.handle.is_some()
    }

    /// Reads `len` bytes at `offset`. A short read is zero filled, which
    /// fails block validation downstream.
    ///
    /// # Errors
    ///
    /// Returns `MefError::InvalidMetadata` for a negative offset or length
    /// and I/O errors from opening or seeking.
    pub fn read_span(&mut self, offset: i64, len: i64, keep_open: bool) -> Result<Vec<u8>> {
        let (Ok(offset), Ok(len)) = (u64::try_from(offset), usize::try_from(len)) else {
            return Err(MefError::InvalidMetadata(format!(
                "invalid block span {}+{} in {}",
                offset,
                len,
                self.path.display()
            )));
        };
        let mut file = match self.handle.take() {
            Some(file) => file,
            None => File::open(&self.path)?,
        };
        file.seek(SeekFrom::Start(offset))?;
        let mut buf = Vec::with_capacity(len);
        (&mut file).take(len as u64).read_to_end(&mut buf)?;
        if buf.len() < len {
            warn!(
                "Short read from {}: {} of {} bytes at offset {}",
                self.path.display(),
                buf.len(),
                len,
                offset
            );
            buf.resize(len, 0);
        }
        if keep_open {
            self.handle = Some(file);
        } else {
            debug!("Closed {}", self.path.display());
        }
        Ok(buf)
    }

    /// Drops the cached handle.
    pub fn close(&mut self) {
        if self.handle.take().is_some() {
            debug!("Closed {}", self.path.display());
        }
    }
}

/// What is wrong with one indexed block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockIssue {
    /// The block header declares a length other than the index entry's.
    /// A header past the end of the data file reads as zero.
    BlockBytes {
        /// Length recorded in the index.
        index: u32,
        /// Length read from the block header.
        header: u32,
    },
    /// The block does not start where the previous one ends.
    FileOffset {
        /// Offset implied by the preceding entries.
        expected: i64,
    },
}

/// An index entry that disagrees with the data file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockProblem {
    /// Block number within the segment.
    pub block: usize,
    /// Data file offset recorded in the index.
    pub file_offset: i64,
    /// The disagreement found.
    pub issue: BlockIssue,
}

/// Result of comparing a segment's block index with its data file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorruptionReport {
    /// Owning channel name.
    pub channel: String,
    /// Segment name.
    pub segment: String,
    /// Index entries examined.
    pub blocks_checked: usize,
    /// Entries that disagree with the data file, in block order.
    pub problems: Vec<BlockProblem>,
    /// Data file length the index accounts for.
    pub expected_file_bytes: u64,
    /// Actual data file length.
    pub file_bytes: u64,
}

impl CorruptionReport {
    /// True if every block matched and the file length is as indexed.
    pub fn is_clean(&self) -> bool {
        self.problems.is_empty() && self.file_bytes == self.expected_file_bytes
    }

    /// Bytes past the last indexed block.
    pub fn trailing_bytes(&self) -> u64 {
        self.file_bytes.saturating_sub(self.expected_file_bytes)
    }
}

/// One segment of a time-series channel.
#[derive(Debug)]
pub struct Segment {
    location: SegmentLocation,
    metadata: MetadataFile,
    index: Vec<BlockIndexEntry>,
    access: PasswordData,
    data: DataFile,
    sampling_frequency: f64,
    sample_offset: i64,
    start_time: Timestamp,
    end_time: Timestamp,
}

impl Segment {
    /// Opens a segment directory.
    ///
    /// # Errors
    ///
    /// Returns `MefError::Path` for a malformed path, `MefError::FileMissing`
    /// if the metadata, data or index file is absent and
    /// `MefError::AccessDenied` if `password` does not unlock the
    /// time-series parameters.
    pub fn open(path: &Path, password: Option<&str>, config: &MefConfig) -> Result<Self> {
        let location = MefPath::parse(path)?.segment_location()?;
        let tdat_path = location.file_path(FileType::TimeSeriesData);
        if !tdat_path.exists() {
            return Err(MefError::FileMissing { path: tdat_path });
        }
        let (metadata, access) = MetadataFile::read(
            &location.file_path(FileType::TimeSeriesMetadata),
            password,
            config,
        )?;
        let section_2 = metadata.time_series()?;
        let sampling_frequency = section_2.sampling_frequency;
        let expected_blocks = section_2.number_of_blocks;

        let offset = metadata.recording_time_offset();
        let mut index = IndexFile::read(&location.file_path(FileType::TimeSeriesIndex))?.entries;
        for entry in &mut index {
            entry.start_time = offset.remove(entry.start_time);
        }
        if expected_blocks != index.len() as i64 {
            warn!(
                "Segment {} metadata lists {} blocks, index holds {}",
                location.segment_name,
                expected_blocks,
                index.len()
            );
        }

        let derived_end = index.last().map(|last| {
            last.start_time + samples_to_us(i64::from(last.number_of_samples), sampling_frequency)
        });
        let start_time = match offset.remove(metadata.header.start_time) {
            UUTC_NO_ENTRY => index.first().map_or(UUTC_NO_ENTRY, |e| e.start_time),
            time => time,
        };
        let end_time = match offset.remove(metadata.header.end_time) {
            UUTC_NO_ENTRY => derived_end.unwrap_or(start_time),
            time => derived_end.map_or(time, |end| end.max(time)),
        };

        debug!(
            "Opened segment {} ({} blocks)",
            location.segment_name,
            index.len()
        );
        Ok(Self {
            data: DataFile::new(tdat_path),
            location,
            metadata,
            index,
            access,
            sampling_frequency,
            sample_offset: 0,
            start_time,
            end_time,
        })
    }

    /// Segment name (`<channel>-NNNNNN`).
    pub fn name(&self) -> &str {
        &self.location.segment_name
    }

    /// Segment number.
    pub fn segment_number(&self) -> i32 {
        self.location.segment_number
    }

    /// File locations.
    pub fn location(&self) -> &SegmentLocation {
        &self.location
    }

    /// The decoded metadata file.
    pub fn metadata(&self) -> &MetadataFile {
        &self.metadata
    }

    /// Time-series parameters. Always available once opened.
    pub fn time_series(&self) -> Option<&TimeSeriesSection2> {
        self.metadata.section_2.get()
    }

    /// Block index with offset-free times.
    pub fn index(&self) -> &[BlockIndexEntry] {
        &self.index
    }

    /// Access granted by the password the segment was opened with.
    pub fn access_level(&self) -> AccessLevel {
        self.access.access_level()
    }

    pub(crate) fn access(&self) -> &PasswordData {
        &self.access
    }

    /// Sampling frequency in Hz.
    pub fn sampling_frequency(&self) -> f64 {
        self.sampling_frequency
    }

    /// Channel-wide number of the segment's first sample.
    pub fn sample_offset(&self) -> i64 {
        self.sample_offset
    }

    /// Samples held by the segment.
    pub fn number_of_samples(&self) -> i64 {
        self.index.last().map_or(0, BlockIndexEntry::end_sample)
    }

    /// Offset-free start time.
    pub fn start_time(&self) -> Timestamp {
        self.start_time
    }

    /// Offset-free end time (exclusive).
    pub fn end_time(&self) -> Timestamp {
        self.end_time
    }

    /// Table of contents of this segment with segment-relative samples.
    pub fn toc(&self, config: &MefConfig) -> Vec<TocEntry> {
        build_toc(
            &self.index,
            0,
            None,
            self.sampling_frequency,
            config.epsilon_us(self.sampling_frequency),
        )
    }

    /// Records stored in the segment directory; empty if there are none.
    ///
    /// # Errors
    ///
    /// See [`read_records`].
    pub fn records(&self, password: Option<&str>, config: &MefConfig) -> Result<Vec<Record>> {
        records_in(&self.location.segment_dir, password, config)
    }

    pub(crate) fn read_span(&mut self, offset: i64, len: i64, keep_open: bool) -> Result<Vec<u8>> {
        self.data.read_span(offset, len, keep_open)
    }

    /// Releases the cached data file handle.
    pub fn close_file(&mut self) {
        self.data.close();
    }

    /// True while the data file handle is cached.
    pub fn is_file_open(&self) -> bool {
        self.data.is_open()
    }

    /// Compares every index entry with the block header it points at and
    /// the data file length with the end of the last block. Nothing is
    /// modified; the cached handle state is left as found.
    ///
    /// # Errors
    ///
    /// Returns I/O errors from reading the data file.
    pub fn detect_corruption(&mut self) -> Result<CorruptionReport> {
        let was_open = self.data.is_open();
        let mut problems = Vec::new();
        let mut expected_offset = UNIVERSAL_HEADER_BYTES as i64;
        for (block, entry) in self.index.iter().enumerate() {
            if entry.file_offset != expected_offset {
                problems.push(BlockProblem {
                    block,
                    file_offset: entry.file_offset,
                    issue: BlockIssue::FileOffset {
                        expected: expected_offset,
                    },
                });
            }
            let header_bytes = if entry.file_offset < 0 {
                0
            } else {
                let header =
                    self.data
                        .read_span(entry.file_offset, BLOCK_HEADER_BYTES as i64, true)?;
                BlockHeader::peek_block_bytes(&header)
                    .and_then(|bytes| u32::try_from(bytes).ok())
                    .unwrap_or(0)
            };
            if header_bytes != entry.block_bytes {
                problems.push(BlockProblem {
                    block,
                    file_offset: entry.file_offset,
                    issue: BlockIssue::BlockBytes {
                        index: entry.block_bytes,
                        header: header_bytes,
                    },
                });
            }
            expected_offset = entry.file_offset + i64::from(entry.block_bytes);
        }
        if !was_open {
            self.data.close();
        }

        let file_bytes = fs::metadata(self.data.path())?.len();
        let report = CorruptionReport {
            channel: self.location.channel_name.clone(),
            segment: self.location.segment_name.clone(),
            blocks_checked: self.index.len(),
            problems,
            expected_file_bytes: u64::try_from(expected_offset).unwrap_or(0),
            file_bytes,
        };
        for problem in &report.problems {
            warn!(
                "Segment {} block {}/{}: {:?}",
                report.segment, problem.block, report.blocks_checked, problem.issue
            );
        }
        if report.file_bytes != report.expected_file_bytes {
            warn!(
                "Data file of segment {} holds {} bytes, index accounts for {}",
                report.segment, report.file_bytes, report.expected_file_bytes
            );
        }
        Ok(report)
    }

    fn predicted_end(&self) -> Option<Timestamp> {
        self.index.last().map(|last| {
            last.start_time
                + samples_to_us(i64::from(last.number_of_samples), self.sampling_frequency)
        })
    }
}

/// A time-series channel: its segments ordered by segment number.
#[derive(Debug)]
pub struct Channel {
    path: PathBuf,
    name: String,
    segments: Vec<Segment>,
    earliest_start_time: Timestamp,
    latest_end_time: Timestamp,
    number_of_samples: i64,
    sampling_frequency: f64,
    maximum_block_samples: u32,
    maximum_block_bytes: i64,
}

impl Channel {
    /// Opens a `.timd` channel directory and all of its segments.
    ///
    /// Segments are numbered into one channel-wide sample space in segment
    /// number order.
    ///
    /// # Errors
    ///
    /// Returns `MefError::Path` if `path` is not a channel directory or
    /// holds no segments, and any error from [`Segment::open`].
    pub fn open(path: &Path, password: Option<&str>, config: &MefConfig) -> Result<Self> {
        let mef_path = MefPath::parse(path)?;
        if mef_path.kind != MefPathKind::TimeSeriesChannel {
            return Err(MefError::Path(format!(
                "{} is not a time series channel",
                path.display()
            )));
        }

        let mut segments = Vec::new();
        for dir in subdirectories(path, MefPathKind::Segment)? {
            segments.push(Segment::open(&dir, password, config)?);
        }
        if segments.is_empty() {
            return Err(MefError::Path(format!(
                "{} holds no segments",
                path.display()
            )));
        }
        segments.sort_by_key(Segment::segment_number);

        let mut sample_offset = 0;
        for segment in &mut segments {
            segment.sample_offset = sample_offset;
            sample_offset += segment.number_of_samples();
        }

        let sampling_frequency = segments[0].sampling_frequency;
        if segments
            .iter()
            .any(|s| s.sampling_frequency != sampling_frequency)
        {
            warn!(
                "Channel {} mixes sampling frequencies, using {} Hz",
                mef_path.name, sampling_frequency
            );
        }
        let maximum_block_samples = segments
            .iter()
            .flat_map(|s| {
                let declared = s.metadata.time_series().map_or(0, |t| t.maximum_block_samples);
                s.index
                    .iter()
                    .map(|e| e.number_of_samples)
                    .chain(std::iter::once(declared))
            })
            .max()
            .unwrap_or(0);
        let maximum_block_bytes = segments
            .iter()
            .flat_map(|s| s.index.iter().map(|e| i64::from(e.block_bytes)))
            .max()
            .unwrap_or(0);

        let channel = Self {
            path: path.to_path_buf(),
            name: mef_path.name,
            earliest_start_time: segments
                .iter()
                .map(Segment::start_time)
                .min()
                .unwrap_or(UUTC_NO_ENTRY),
            latest_end_time: segments
                .iter()
                .map(Segment::end_time)
                .max()
                .unwrap_or(UUTC_NO_ENTRY),
            number_of_samples: sample_offset,
            sampling_frequency,
            maximum_block_samples,
            maximum_block_bytes,
            segments,
        };
        debug!(
            "Opened channel {}: {} segments, {} samples",
            channel.name,
            channel.segments.len(),
            channel.number_of_samples
        );
        Ok(channel)
    }

    /// Channel name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Channel directory.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Segments in segment number order.
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub(crate) fn segments_mut(&mut self) -> &mut [Segment] {
        &mut self.segments
    }

    pub(crate) fn segment_views(&self) -> Vec<SegmentView<'_>> {
        self.segments
            .iter()
            .map(|s| SegmentView {
                entries: &s.index,
                sample_offset: s.sample_offset,
                start_time: s.start_time,
                end_time: s.end_time,
            })
            .collect()
    }

    /// Offset-free start of the earliest segment.
    pub fn earliest_start_time(&self) -> Timestamp {
        self.earliest_start_time
    }

    /// Offset-free end of the latest segment.
    pub fn latest_end_time(&self) -> Timestamp {
        self.latest_end_time
    }

    /// Samples across all segments.
    pub fn number_of_samples(&self) -> i64 {
        self.number_of_samples
    }

    /// Sampling frequency in Hz.
    pub fn sampling_frequency(&self) -> f64 {
        self.sampling_frequency
    }

    /// Largest block in samples.
    pub fn maximum_block_samples(&self) -> u32 {
        self.maximum_block_samples
    }

    /// Largest block in bytes.
    pub fn maximum_block_bytes(&self) -> i64 {
        self.maximum_block_bytes
    }

    /// Lowest access level across the channel's segments.
    pub fn access_level(&self) -> AccessLevel {
        self.segments
            .iter()
            .map(Segment::access_level)
            .min()
            .unwrap_or_default()
    }

    /// Table of contents across all segments with channel-wide samples.
    ///
    /// The first block of each segment is compared against the predicted
    /// end of the previous segment.
    pub fn toc(&self, config: &MefConfig) -> Vec<TocEntry> {
        let epsilon_us = config.epsilon_us(self.sampling_frequency);
        let mut toc = Vec::new();
        let mut previous_end = None;
        for segment in &self.segments {
            toc.extend(build_toc(
                &segment.index,
                segment.sample_offset,
                previous_end,
                self.sampling_frequency,
                epsilon_us,
            ));
            previous_end = segment.predicted_end().or(previous_end);
        }
        toc
    }

    /// Reads samples `[start, end)` in channel-wide numbering.
    ///
    /// # Errors
    ///
    /// Returns `MefError::Range` if `start >= end`.
    pub fn read_by_sample(
        &mut self,
        start: i64,
        end: i64,
        config: &MefConfig,
    ) -> Result<ReadOutput> {
        read_channel(self, start, end, false, config)
    }

    /// Reads the offset-free time window `[start, end)` in µs.
    ///
    /// # Errors
    ///
    /// Returns `MefError::Range` if `start >= end`.
    pub fn read_by_time(
        &mut self,
        start: Timestamp,
        end: Timestamp,
        config: &MefConfig,
    ) -> Result<ReadOutput> {
        read_channel(self, start, end, true, config)
    }

    /// Channel-wide sample number at offset-free time `time`.
    ///
    /// The block starting last at or before `time` anchors the conversion.
    /// Times before the first block map to sample 0 and times in a gap map
    /// to the first sample after the preceding block. Returns `None` for a
    /// channel without blocks.
    pub fn sample_for_time(&self, time: Timestamp) -> Option<i64> {
        let (segment, entry) = self.anchor_block(|_, entry| entry.start_time <= time)?;
        let start = segment.sample_offset + entry.start_sample;
        let elapsed = time.saturating_sub(entry.start_time) as f64;
        let offset = (elapsed * segment.sampling_frequency / 1e6).round() as i64;
        Some(start + offset.clamp(0, i64::from(entry.number_of_samples)))
    }

    /// Offset-free time of channel-wide sample `sample`, anchored on the
    /// block that holds it. `number_of_samples()` maps to the end of the
    /// last block. Returns `None` outside `[0, number_of_samples()]`.
    pub fn time_for_sample(&self, sample: i64) -> Option<Timestamp> {
        if sample < 0 || sample > self.number_of_samples {
            return None;
        }
        let (segment, entry) = self.anchor_block(|segment, entry| {
            segment.sample_offset + entry.start_sample <= sample
        })?;
        let start = segment.sample_offset + entry.start_sample;
        Some(entry.start_time + samples_to_us(sample - start, segment.sampling_frequency))
    }

    /// Last block accepted by `at_or_before`, or the first block if none is.
    fn anchor_block(
        &self,
        at_or_before: impl Fn(&Segment, &BlockIndexEntry) -> bool,
    ) -> Option<(&Segment, &BlockIndexEntry)> {
        let mut blocks = self
            .segments
            .iter()
            .flat_map(|segment| segment.index.iter().map(move |entry| (segment, entry)));
        let first = blocks.next()?;
        Some(
            std::iter::once(first)
                .chain(blocks)
                .take_while(|&(segment, entry)| at_or_before(segment, entry))
                .last()
                .unwrap_or(first),
        )
    }

    /// Runs [`Segment::detect_corruption`] on every segment.
    ///
    /// # Errors
    ///
    /// Returns the first I/O error from a segment.
    pub fn detect_corruption(&mut self) -> Result<Vec<CorruptionReport>> {
        self.segments
            .iter_mut()
            .map(Segment::detect_corruption)
            .collect()
    }

    /// Records stored in the channel directory; empty if there are none.
    ///
    /// # Errors
    ///
    /// See [`read_records`].
    pub fn records(&self, password: Option<&str>, config: &MefConfig) -> Result<Vec<Record>> {
        records_in(&self.path, password, config)
    }

    /// Releases every cached data file handle.
    pub fn close_files(&mut self) {
        for segment in &mut self.segments {
            segment.close_file();
        }
    }
}

/// A session: its time-series channels ordered by name.
#[derive(Debug)]
pub struct Session {
    path: PathBuf,
    name: String,
    channels: Vec<Channel>,
}

impl Session {
    /// Opens a `.mefd` session directory.
    ///
    /// Directories other than time-series channels are skipped.
    ///
    /// # Errors
    ///
    /// Returns `MefError::Path` if `path` is not a session directory and
    /// any error from [`Channel::open`].
    pub fn open(path: &Path, password: Option<&str>, config: &MefConfig) -> Result<Self> {
        let mef_path = MefPath::parse(path)?;
        if mef_path.kind != MefPathKind::Session {
            return Err(MefError::Path(format!(
                "{} is not a session directory",
                path.display()
            )));
        }
        let mut channels = Vec::new();
        for dir in subdirectories(path, MefPathKind::TimeSeriesChannel)? {
            channels.push(Channel::open(&dir, password, config)?);
        }
        channels.sort_by(|a, b| a.name.cmp(&b.name));
        debug!(
            "Opened session {} with {} channels",
            mef_path.name,
            channels.len()
        );
        Ok(Self {
            path: path.to_path_buf(),
            name: mef_path.name,
            channels,
        })
    }

    /// Session name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Session directory.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Channels ordered by name.
    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    /// Looks up a channel by name.
    pub fn channel(&self, name: &str) -> Option<&Channel> {
        self.channels.iter().find(|c| c.name == name)
    }

    /// Looks up a channel by name for reading.
    pub fn channel_mut(&mut self, name: &str) -> Option<&mut Channel> {
        self.channels.iter_mut().find(|c| c.name == name)
    }

    /// Earliest channel start, or no-entry for an empty session.
    pub fn earliest_start_time(&self) -> Timestamp {
        self.channels
            .iter()
            .map(Channel::earliest_start_time)
            .min()
            .unwrap_or(UUTC_NO_ENTRY)
    }

    /// Latest channel end, or no-entry for an empty session.
    pub fn latest_end_time(&self) -> Timestamp {
        self.channels
            .iter()
            .map(Channel::latest_end_time)
            .max()
            .unwrap_or(UUTC_NO_ENTRY)
    }

    /// Runs [`Segment::detect_corruption`] on every segment of every
    /// channel. Reports with no problems are included.
    ///
    /// # Errors
    ///
    /// Returns the first I/O error from a segment.
    pub fn detect_corruption(&mut self) -> Result<Vec<CorruptionReport>> {
        let mut reports = Vec::new();
        for channel in &mut self.channels {
            reports.extend(channel.detect_corruption()?);
        }
        Ok(reports)
    }

    /// Records stored in the session directory; empty if there are none.
    ///
    /// # Errors
    ///
    /// See [`read_records`].
    pub fn records(&self, password: Option<&str>, config: &MefConfig) -> Result<Vec<Record>> {
        records_in(&self.path, password, config)
    }

    /// Releases every cached data file handle.
    pub fn close_files(&mut self) {
        for channel in &mut self.channels {
            channel.close_files();
        }
    }
}

/// Validates `password` against a MEF file, or against the metadata file
/// of a segment directory.
///
/// # Errors
///
/// Returns `MefError::FileMissing` if the file does not exist and header
/// decoding errors. A wrong password is not an error: it yields
/// [`AccessLevel::Invalid`].
pub fn check_password(path: &Path, password: Option<&str>) -> Result<AccessLevel> {
    let file_path = if path.is_dir() {
        MefPath::parse(path)?
            .segment_location()?
            .file_path(FileType::TimeSeriesMetadata)
    } else {
        path.to_path_buf()
    };
    let header = UniversalHeader::read_file(&file_path)?;
    Ok(header.validation.check(password))
}

fn records_in(dir: &Path, password: Option<&str>, config: &MefConfig) -> Result<Vec<Record>> {
    let (rdat, _) = MefPath::parse(dir)?.record_paths();
    if !rdat.exists() {
        return Ok(Vec::new());
    }
    read_records(dir, password, config)
}

/// Child directories of `dir` of the given kind, in name order.
fn subdirectories(dir: &Path, kind: MefPathKind) -> Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if !path.is_dir() {
            continue;
        }
        match MefPath::parse(&path) {
            Ok(parsed) if parsed.kind == kind => found.push(path),
            _ => debug!("Skipping {}", path.display()),
        }
    }
    found.sort();
    Ok(found)
}

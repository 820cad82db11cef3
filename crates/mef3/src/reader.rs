//! Window reads over a channel.
//!
//! A read resolves the window to a block span, loads the span's bytes from
//! every segment involved into one buffer and decodes it block by block.
//! Each block passes four checks before it is decoded:
//!
//! 1. a full block header remains in the buffer,
//! 2. the declared block length fits the remaining buffer,
//! 3. the declared length does not exceed the worst case for the channel's
//!    largest block,
//! 4. the block CRC matches (unless CRC checks are disabled).
//!
//! A failed block leaves `NaN` in its sample range. Two consecutive
//! failures abort the rest of the span. Blocks the caller cannot decrypt
//! are left as `NaN` without counting as failures.

use crate::access::{EncryptionLevel, PasswordData};
use crate::config::{CrcMode, FailBehavior, MefConfig};
use crate::error::{MefError, Result};
use crate::format::red::{self, BlockHeader, BLOCK_HEADER_BYTES};
use crate::format::Timestamp;
use crate::resolver::{resolve, BlockSpan};
use crate::session::Channel;
use thiserror::Error;
use tracing::{debug, error, warn};

/// Non-fatal conditions reported next to the decoded samples.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReadWarning {
    /// One or more blocks failed validation or decoding.
    #[error("{failed_blocks} block(s) failed validation{}", abort_suffix(.aborted))]
    Corruption {
        /// Blocks that failed.
        failed_blocks: usize,
        /// Decoding stopped after two consecutive failures.
        aborted: bool,
    },

    /// The window extends past recorded coverage.
    #[error("window [{lower}, {upper}) exceeds coverage [{covered_lower}, {covered_upper})")]
    OutOfRange {
        /// Requested lower bound.
        lower: i64,
        /// Requested upper bound.
        upper: i64,
        /// First covered point.
        covered_lower: i64,
        /// End of coverage (exclusive).
        covered_upper: i64,
    },

    /// Blocks stayed encrypted for the supplied password.
    #[error("{blocks} encrypted block(s) not accessible with the supplied password")]
    Inaccessible {
        /// Blocks left undecoded.
        blocks: usize,
    },
}

fn abort_suffix(aborted: &bool) -> &'static str {
    if *aborted {
        ", decoding aborted"
    } else {
        ""
    }
}

/// Result of a window read.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReadOutput {
    /// Decoded samples; `NaN` where nothing valid covers the window.
    pub samples: Vec<f64>,
    /// Conditions worth reporting.
    pub warnings: Vec<ReadWarning>,
    /// Blocks that failed validation or decoding.
    pub failed_blocks: usize,
    /// Blocks that were stored encrypted and decrypted for this read.
    pub decrypted_blocks: usize,
}

impl ReadOutput {
    /// Number of samples that are `NaN`.
    pub fn missing(&self) -> usize {
        self.samples.iter().filter(|v| v.is_nan()).count()
    }
}

/// Decoder state across one span.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeState {
    /// The previous block decoded.
    Decoding,
    /// The previous block failed.
    OneFailureObserved,
    /// Two consecutive blocks failed; nothing more is decoded.
    Aborted,
}

impl DecodeState {
    /// State after a block decoded successfully.
    pub fn on_success(self) -> Self {
        match self {
            Self::Aborted => Self::Aborted,
            _ => Self::Decoding,
        }
    }

    /// State after a block that was skipped without validation, such as
    /// one the caller cannot decrypt. A skip separates two failures, so they
    /// no longer count as consecutive.
    pub fn on_skip(self) -> Self {
        self.on_success()
    }

    /// State after a block failed.
    pub fn on_failure(self) -> Self {
        match self {
            Self::Decoding => Self::OneFailureObserved,
            Self::OneFailureObserved | Self::Aborted => Self::Aborted,
        }
    }
}

/// Where decoded samples land in the output.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Placement {
    /// Output index = channel sample number - `lower`.
    Samples { lower: i64 },
    /// Output index = round((block start - `lower`) * fs / 1e6) + k.
    Time { lower: Timestamp, sampling_frequency: f64 },
}

impl Placement {
    fn first_index(&self, block: &PlannedBlock<'_>) -> i64 {
        match *self {
            Self::Samples { lower } => block.start_sample - lower,
            Self::Time {
                lower,
                sampling_frequency,
            } => ((block.start_time - lower) as f64 * sampling_frequency / 1e6).round() as i64,
        }
    }
}

/// A block scheduled for decoding.
#[derive(Debug, Clone, Copy)]
pub(crate) struct PlannedBlock<'a> {
    /// Position of the block in the span buffer.
    pub buffer_offset: usize,
    /// Channel-wide first sample.
    pub start_sample: i64,
    /// Offset-free start time.
    pub start_time: Timestamp,
    /// Samples the index promises.
    pub number_of_samples: u32,
    /// Keys of the owning segment.
    pub access: &'a PasswordData,
}

/// Counters produced by [`decode_span`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct SpanReport {
    pub failed_blocks: usize,
    pub inaccessible_blocks: usize,
    pub decrypted_blocks: usize,
    pub aborted: bool,
}

enum BlockOutcome {
    Decoded {
        samples: Vec<i32>,
        encryption: EncryptionLevel,
    },
    Inaccessible,
    Failed(String),
}

fn check_block(
    buffer: &[u8],
    max_block_bytes: usize,
    crc_mode: CrcMode,
) -> std::result::Result<usize, String> {
    let remaining = buffer.len();
    let Some(block_bytes) = BlockHeader::peek_block_bytes(buffer) else {
        return Err(format!(
            "only {} bytes left, a block header needs {}",
            remaining, BLOCK_HEADER_BYTES
        ));
    };
    if block_bytes < BLOCK_HEADER_BYTES || block_bytes > remaining {
        return Err(format!(
            "declared length {} does not fit the {} remaining bytes",
            block_bytes, remaining
        ));
    }
    if block_bytes > max_block_bytes {
        return Err(format!(
            "declared length {} exceeds the bound of {}",
            block_bytes, max_block_bytes
        ));
    }
    if crc_mode == CrcMode::Validate {
        let block = &buffer[..block_bytes];
        let stored = u32::from_le_bytes([block[0], block[1], block[2], block[3]]);
        let actual = red::block_crc(block);
        if stored != actual {
            return Err(format!(
                "CRC mismatch: stored {:#010x}, computed {:#010x}",
                stored, actual
            ));
        }
    }
    Ok(block_bytes)
}

fn decode_block(
    buffer: &mut [u8],
    block: &PlannedBlock<'_>,
    max_block_bytes: usize,
    crc_mode: CrcMode,
) -> BlockOutcome {
    let block_bytes = match check_block(buffer, max_block_bytes, crc_mode) {
        Ok(block_bytes) => block_bytes,
        Err(reason) => return BlockOutcome::Failed(reason),
    };
    let bytes = &mut buffer[..block_bytes];
    let level = red::BlockFlags::from_u8(bytes[4]).encryption_level();
    if level.is_encrypted() && !block.access.can_decrypt(level) {
        return BlockOutcome::Inaccessible;
    }
    let encryption = match red::decrypt(bytes, block.access) {
        Ok(encryption) => encryption,
        Err(e) => return BlockOutcome::Failed(e.to_string()),
    };
    match red::decompress(bytes) {
        Ok(samples) if samples.len() == block.number_of_samples as usize => {
            BlockOutcome::Decoded {
                samples,
                encryption,
            }
        }
        Ok(samples) => BlockOutcome::Failed(format!(
            "decoded {} samples, index promises {}",
            samples.len(),
            block.number_of_samples
        )),
        Err(e) => BlockOutcome::Failed(e.to_string()),
    }
}

/// Decodes `blocks` out of `buffer` into `output`, which must be prefilled
/// with `NaN`.
pub(crate) fn decode_span(
    buffer: &mut [u8],
    blocks: &[PlannedBlock<'_>],
    output: &mut [f64],
    placement: Placement,
    max_block_bytes: usize,
    config: &MefConfig,
) -> SpanReport {
    let mut report = SpanReport::default();
    let mut state = DecodeState::Decoding;
    for (i, block) in blocks.iter().enumerate() {
        if block.buffer_offset > buffer.len() {
            state = state.on_failure();
            report.failed_blocks += 1;
        } else {
            match decode_block(
                &mut buffer[block.buffer_offset..],
                block,
                max_block_bytes,
                config.crc_mode,
            ) {
                BlockOutcome::Decoded {
                    samples,
                    encryption,
                } => {
                    if encryption != EncryptionLevel::None {
                        report.decrypted_blocks += 1;
                    }
                    let first = placement.first_index(block);
                    for (k, value) in samples.into_iter().enumerate() {
                        let index = first + k as i64;
                        if index >= 0 && (index as usize) < output.len() {
                            output[index as usize] = f64::from(value);
                        }
                    }
                    state = state.on_success();
                }
                BlockOutcome::Inaccessible => {
                    report.inaccessible_blocks += 1;
                    state = state.on_skip();
                }
                BlockOutcome::Failed(reason) => {
                    report.failed_blocks += 1;
                    state = state.on_failure();
                    match config.behavior_on_fail {
                        FailBehavior::Return => warn!(
                            "Block at sample {} failed: {}",
                            block.start_sample, reason
                        ),
                        FailBehavior::Suppress => debug!(
                            "Block at sample {} failed: {}",
                            block.start_sample, reason
                        ),
                    }
                }
            }
        }
        if state == DecodeState::Aborted {
            report.aborted = true;
            error!(
                "Two consecutive block failures, abandoning {} remaining block(s)",
                blocks.len() - i - 1
            );
            break;
        }
    }
    report
}

/// Reads `[lower, upper)` from `channel`.
///
/// Sample windows are clamped to `[0, number_of_samples)`; time windows
/// keep their full length with uncovered samples left `NaN`.
///
/// # Errors
///
/// Returns `MefError::Range` if `lower >= upper` and I/O errors from the
/// segment data files.
pub fn read_channel(
    channel: &mut Channel,
    lower: i64,
    upper: i64,
    by_time: bool,
    config: &MefConfig,
) -> Result<ReadOutput> {
    if lower >= upper {
        return Err(MefError::Range { lower, upper });
    }
    let mut warnings = Vec::new();
    let (covered_lower, covered_upper) = if by_time {
        (channel.earliest_start_time(), channel.latest_end_time())
    } else {
        (0, channel.number_of_samples())
    };
    if lower < covered_lower || upper > covered_upper {
        warnings.push(ReadWarning::OutOfRange {
            lower,
            upper,
            covered_lower,
            covered_upper,
        });
    }

    let sampling_frequency = channel.sampling_frequency();
    let (window_lower, window_upper, length, placement) = if by_time {
        let width = upper
            .checked_sub(lower)
            .ok_or(MefError::Range { lower, upper })?;
        // Partial trailing samples are not part of the window.
        let length = (width as f64 * sampling_frequency / 1e6).floor().max(0.0) as usize;
        let placement = Placement::Time {
            lower,
            sampling_frequency,
        };
        (lower, upper, length, placement)
    } else {
        let window_lower = lower.max(0);
        let window_upper = upper.min(covered_upper);
        let length = (window_upper - window_lower).max(0) as usize;
        (
            window_lower,
            window_upper,
            length,
            Placement::Samples {
                lower: window_lower,
            },
        )
    };

    let mut output = ReadOutput {
        samples: vec![f64::NAN; length],
        warnings: Vec::new(),
        failed_blocks: 0,
        decrypted_blocks: 0,
    };
    let span = if length == 0 {
        None
    } else {
        resolve(&channel.segment_views(), window_lower, window_upper, by_time)
    };
    if let Some(span) = span {
        let report = decode_channel_span(channel, span, &mut output.samples, placement, config)?;
        output.failed_blocks = report.failed_blocks;
        output.decrypted_blocks = report.decrypted_blocks;
        if report.failed_blocks > 0 {
            warnings.push(ReadWarning::Corruption {
                failed_blocks: report.failed_blocks,
                aborted: report.aborted,
            });
        }
        if report.inaccessible_blocks > 0 {
            warnings.push(ReadWarning::Inaccessible {
                blocks: report.inaccessible_blocks,
            });
        }
    }
    if !config.keep_files_open {
        channel.close_files();
    }

    for warning in &warnings {
        warn!("Channel {}: {}", channel.name(), warning);
    }
    output.warnings = warnings;
    Ok(output)
}

fn decode_channel_span(
    channel: &mut Channel,
    span: BlockSpan,
    output: &mut [f64],
    placement: Placement,
    config: &MefConfig,
) -> Result<SpanReport> {
    let max_block_bytes = red::max_compressed_bytes(channel.maximum_block_samples() as usize);
    let keep_open = config.keep_files_open;

    let mut buffer = Vec::new();
    let mut ranges = Vec::new();
    for segment_number in span.start_segment..=span.end_segment {
        let segment = &mut channel.segments_mut()[segment_number];
        let Some(last_entry) = segment.index().len().checked_sub(1) else {
            continue;
        };
        let first = if segment_number == span.start_segment {
            span.start_block
        } else {
            0
        };
        let last = if segment_number == span.end_segment {
            span.end_block
        } else {
            last_entry
        };
        let first_offset = segment.index()[first].file_offset;
        let end_offset =
            segment.index()[last].file_offset + i64::from(segment.index()[last].block_bytes);
        let bytes = segment.read_span(first_offset, end_offset - first_offset, keep_open)?;
        ranges.push((segment_number, first, last, first_offset, buffer.len()));
        buffer.extend_from_slice(&bytes);
    }

    let segments = channel.segments();
    let mut blocks = Vec::new();
    for &(segment_number, first, last, first_offset, base) in &ranges {
        let segment = &segments[segment_number];
        for entry in &segment.index()[first..=last] {
            blocks.push(PlannedBlock {
                buffer_offset: base + (entry.file_offset - first_offset) as usize,
                start_sample: segment.sample_offset() + entry.start_sample,
                start_time: entry.start_time,
                number_of_samples: entry.number_of_samples,
                access: segment.access(),
            });
        }
    }
    debug!(
        "Decoding {} block(s) from {} bytes of channel {}",
        blocks.len(),
        buffer.len(),
        channel.name()
    );
    Ok(decode_span(
        &mut buffer,
        &blocks,
        output,
        placement,
        max_block_bytes,
        config,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::Credentials;
    use crate::format::red::RedBlock;

    fn encode(blocks: &[(Vec<i32>, i64)]) -> (Vec<u8>, Vec<usize>) {
        let mut buffer = Vec::new();
        let mut offsets = Vec::new();
        for (samples, start_time) in blocks {
            offsets.push(buffer.len());
            let block = RedBlock::compress(samples, *start_time, false, None).unwrap();
            buffer.extend_from_slice(&block.bytes);
        }
        (buffer, offsets)
    }

    fn plan<'a>(offsets: &[usize], access: &'a PasswordData) -> Vec<PlannedBlock<'a>> {
        offsets
            .iter()
            .enumerate()
            .map(|(i, &buffer_offset)| PlannedBlock {
                buffer_offset,
                start_sample: i as i64 * 10,
                start_time: i as i64 * 10_000,
                number_of_samples: 10,
                access,
            })
            .collect()
    }

    fn ramp(block: i32) -> Vec<i32> {
        (0..10).map(|k| block * 10 + k).collect()
    }

    #[test]
    fn test_state_machine() {
        let state = DecodeState::Decoding;
        assert_eq!(state.on_failure(), DecodeState::OneFailureObserved);
        assert_eq!(state.on_failure().on_success(), DecodeState::Decoding);
        assert_eq!(state.on_failure().on_failure(), DecodeState::Aborted);
        assert_eq!(DecodeState::Aborted.on_success(), DecodeState::Aborted);
        assert_eq!(state.on_failure().on_skip(), DecodeState::Decoding);
        assert_eq!(DecodeState::Aborted.on_skip(), DecodeState::Aborted);
    }

    #[test]
    fn test_decode_span_isolates_one_corrupt_block() {
        let input: Vec<(Vec<i32>, i64)> = (0..4).map(|b| (ramp(b), b as i64 * 10_000)).collect();
        let (mut buffer, offsets) = encode(&input);
        buffer[offsets[1] + BLOCK_HEADER_BYTES] ^= 0xFF;

        let access = PasswordData::default();
        let blocks = plan(&offsets, &access);
        let mut output = vec![f64::NAN; 40];
        let report = decode_span(
            &mut buffer,
            &blocks,
            &mut output,
            Placement::Samples { lower: 0 },
            red::max_compressed_bytes(10),
            &MefConfig::default(),
        );
        assert_eq!(report.failed_blocks, 1);
        assert!(!report.aborted);
        for (i, value) in output.iter().enumerate() {
            if (10..20).contains(&i) {
                assert!(value.is_nan());
            } else {
                assert_eq!(*value, i as f64);
            }
        }
    }

    #[test]
    fn test_decode_span_aborts_after_two_failures() {
        let input: Vec<(Vec<i32>, i64)> = (0..4).map(|b| (ramp(b), b as i64 * 10_000)).collect();
        let (mut buffer, offsets) = encode(&input);
        buffer[offsets[1] + 40] ^= 0x01;
        buffer[offsets[2] + 40] ^= 0x01;

        let access = PasswordData::default();
        let blocks = plan(&offsets, &access);
        let mut output = vec![f64::NAN; 40];
        let report = decode_span(
            &mut buffer,
            &blocks,
            &mut output,
            Placement::Samples { lower: 0 },
            red::max_compressed_bytes(10),
            &MefConfig::default(),
        );
        assert_eq!(report.failed_blocks, 2);
        assert!(report.aborted);
        assert_eq!(output[..10], (0..10).map(f64::from).collect::<Vec<_>>()[..]);
        assert!(output[10..].iter().all(|v| v.is_nan()));
    }

    #[test]
    fn test_decode_span_ignores_crc_when_disabled() {
        let input: Vec<(Vec<i32>, i64)> = vec![(ramp(0), 0)];
        let (mut buffer, offsets) = encode(&input);
        // Corrupt the CRC field only.
        buffer[0] ^= 0xFF;
        let access = PasswordData::default();
        let blocks = plan(&offsets, &access);
        let mut output = vec![f64::NAN; 10];
        let config = MefConfig::default().with_crc_mode(CrcMode::Ignore);
        let report = decode_span(
            &mut buffer,
            &blocks,
            &mut output,
            Placement::Samples { lower: 0 },
            red::max_compressed_bytes(10),
            &config,
        );
        assert_eq!(report.failed_blocks, 0);
        assert_eq!(output[9], 9.0);
    }

    #[test]
    fn test_decode_span_rejects_oversized_block() {
        let input: Vec<(Vec<i32>, i64)> = vec![(ramp(0), 0)];
        let (mut buffer, offsets) = encode(&input);
        let access = PasswordData::default();
        let blocks = plan(&offsets, &access);
        let mut output = vec![f64::NAN; 10];
        // A bound smaller than the block itself trips check 3.
        let report = decode_span(
            &mut buffer,
            &blocks,
            &mut output,
            Placement::Samples { lower: 0 },
            BLOCK_HEADER_BYTES,
            &MefConfig::default(),
        );
        assert_eq!(report.failed_blocks, 1);
        assert!(output.iter().all(|v| v.is_nan()));
    }

    #[test]
    fn test_decode_span_truncated_buffer() {
        let input: Vec<(Vec<i32>, i64)> = (0..2).map(|b| (ramp(b), b as i64 * 10_000)).collect();
        let (mut buffer, offsets) = encode(&input);
        buffer.truncate(offsets[1] + 100);
        let access = PasswordData::default();
        let blocks = plan(&offsets, &access);
        let mut output = vec![f64::NAN; 20];
        let report = decode_span(
            &mut buffer,
            &blocks,
            &mut output,
            Placement::Samples { lower: 0 },
            red::max_compressed_bytes(10),
            &MefConfig::default(),
        );
        assert_eq!(report.failed_blocks, 1);
        assert_eq!(output[0], 0.0);
        assert!(output[10..].iter().all(|v| v.is_nan()));
    }

    #[test]
    fn test_decode_span_time_placement() {
        let input: Vec<(Vec<i32>, i64)> = vec![(ramp(0), 1_000_000), (ramp(1), 1_020_000)];
        let (mut buffer, offsets) = encode(&input);
        let access = PasswordData::default();
        let mut blocks = plan(&offsets, &access);
        blocks[0].start_time = 1_000_000;
        blocks[1].start_time = 1_020_000;
        // 1 kHz, window starting 5 ms before the first block.
        let mut output = vec![f64::NAN; 40];
        let report = decode_span(
            &mut buffer,
            &blocks,
            &mut output,
            Placement::Time {
                lower: 995_000,
                sampling_frequency: 1000.0,
            },
            red::max_compressed_bytes(10),
            &MefConfig::default(),
        );
        assert_eq!(report, SpanReport::default());
        assert!(output[..5].iter().all(|v| v.is_nan()));
        assert_eq!(output[5], 0.0);
        assert_eq!(output[14], 9.0);
        assert!(output[15..25].iter().all(|v| v.is_nan()));
        assert_eq!(output[25], 10.0);
        assert!(output[35..].iter().all(|v| v.is_nan()));
    }

    #[test]
    fn test_decode_span_encrypted_blocks() {
        let credentials = Credentials::new(Some("l1pass"), Some("l2pass")).unwrap();
        let full = credentials.password_data();
        let fields = credentials.validation_fields();

        let mut first = RedBlock::compress(&ramp(0), 0, false, None).unwrap();
        first.encrypt(EncryptionLevel::Level1, &full).unwrap();
        let mut second = RedBlock::compress(&ramp(1), 10_000, false, None).unwrap();
        second.encrypt(EncryptionLevel::Level2, &full).unwrap();
        let mut buffer = first.bytes.clone();
        buffer.extend_from_slice(&second.bytes);
        let offsets = [0, first.len()];

        let level_1 = PasswordData::process(&fields, Some("l1pass"));
        let blocks = plan(&offsets, &level_1);
        let mut output = vec![f64::NAN; 20];
        let report = decode_span(
            &mut buffer.clone(),
            &blocks,
            &mut output,
            Placement::Samples { lower: 0 },
            red::max_compressed_bytes(10),
            &MefConfig::default(),
        );
        assert_eq!(report.inaccessible_blocks, 1);
        assert_eq!(report.decrypted_blocks, 1);
        assert_eq!(report.failed_blocks, 0);
        assert_eq!(output[9], 9.0);
        assert!(output[10..].iter().all(|v| v.is_nan()));

        let level_2 = PasswordData::process(&fields, Some("l2pass"));
        let blocks = plan(&offsets, &level_2);
        let mut output = vec![f64::NAN; 20];
        let report = decode_span(
            &mut buffer,
            &blocks,
            &mut output,
            Placement::Samples { lower: 0 },
            red::max_compressed_bytes(10),
            &MefConfig::default(),
        );
        assert_eq!(
            report,
            SpanReport {
                decrypted_blocks: 2,
                ..SpanReport::default()
            }
        );
        assert_eq!(output[19], 19.0);
    }

    #[test]
    fn test_locked_block_separates_failures() {
        let credentials = Credentials::new(Some("l1pass"), Some("l2pass")).unwrap();
        let full = credentials.password_data();
        let level_1 = PasswordData::process(&credentials.validation_fields(), Some("l1pass"));

        let mut buffer = Vec::new();
        let mut offsets = Vec::new();
        for b in 0..4 {
            let mut block = RedBlock::compress(&ramp(b), b as i64 * 10_000, false, None).unwrap();
            if b == 1 {
                block.encrypt(EncryptionLevel::Level2, &full).unwrap();
            }
            offsets.push(buffer.len());
            buffer.extend_from_slice(&block.bytes);
        }
        // Damage the blocks on either side of the locked one.
        buffer[offsets[0] + BLOCK_HEADER_BYTES] ^= 0xFF;
        buffer[offsets[2] + BLOCK_HEADER_BYTES] ^= 0xFF;

        let blocks = plan(&offsets, &level_1);
        let mut output = vec![f64::NAN; 40];
        let report = decode_span(
            &mut buffer,
            &blocks,
            &mut output,
            Placement::Samples { lower: 0 },
            red::max_compressed_bytes(10),
            &MefConfig::default(),
        );
        assert_eq!(report.failed_blocks, 2);
        assert_eq!(report.inaccessible_blocks, 1);
        assert!(!report.aborted);
        assert!(output[..30].iter().all(|v| v.is_nan()));
        assert_eq!(output[30], 30.0);
        assert_eq!(output[39], 39.0);
    }

    #[test]
    fn test_warning_messages() {
        let warning = ReadWarning::Corruption {
            failed_blocks: 2,
            aborted: true,
        };
        assert_eq!(
            warning.to_string(),
            "2 block(s) failed validation, decoding aborted"
        );
        assert_eq!(
            ReadWarning::Inaccessible { blocks: 1 }.to_string(),
            "1 encrypted block(s) not accessible with the supplied password"
        );
    }
}

//! RED compressed sample blocks.
//!
//! A block is a fixed 304-byte header followed by the entropy coded payload,
//! zero padded to a multiple of 8 bytes.
//!
//! ## Block header
//!
//! ```text
//! Offset  Size  Field
//! ------  ----  -----
//! 0x00    4     block_crc (CRC32 of bytes 4..block_bytes)
//! 0x04    1     flags (bit0 discontinuity, bit1 L1 encrypted, bit2 L2 encrypted)
//! 0x05    3     protected region
//! 0x08    8     discretionary region
//! 0x10    4     detrend_slope (f32)
//! 0x14    4     detrend_intercept (f32)
//! 0x18    4     scale_factor (f32, 1.0 = lossless)
//! 0x1C    4     difference_bytes (u32)
//! 0x20    4     number_of_samples (u32)
//! 0x24    4     block_bytes (u32)
//! 0x28    8     start_time (i64)
//! 0x30    256   statistics (scaled symbol counts)
//! ```
//!
//! ## Encoding
//!
//! Samples are first difference coded: a difference in `[-127, 127]` takes
//! one byte, anything else (and the first sample) is a key sample written as
//! `0x80` followed by the raw little-endian value. The difference bytes are
//! then range coded against their own symbol counts, scaled into one byte
//! each and stored in the statistics region. When range coding would not
//! shrink the stream the difference bytes are stored as-is and the
//! statistics stay zero.
//!
//! Encryption covers the statistics region only; without it the payload
//! cannot be decoded.

use crate::access::{EncryptionLevel, PasswordData};
use crate::config::LossyConfig;
use crate::error::{MefError, Result};
use crate::format::{get_f32, get_i64, get_u32, put, Timestamp};

/// Block header size in bytes.
pub const BLOCK_HEADER_BYTES: usize = 304;

/// Offset of the statistics region within the header.
pub const STATISTICS_OFFSET: usize = 48;

/// Size of the statistics region.
pub const STATISTICS_BYTES: usize = 256;

/// Marker byte that introduces a raw 4-byte key sample.
pub const KEY_SAMPLE_FLAG: u8 = 0x80;

/// Blocks are padded to this alignment.
pub const BLOCK_ALIGNMENT: usize = 8;

const MAX_DIFFERENCE: i64 = 127;
const KEY_SAMPLE_BYTES: usize = 5;

const RANGE_TOP: u32 = 1 << 24;
const RANGE_BOTTOM: u32 = 1 << 16;

fn align(bytes: usize) -> usize {
    bytes.div_ceil(BLOCK_ALIGNMENT) * BLOCK_ALIGNMENT
}

/// Upper bound on the encoded size of a block of `number_of_samples`.
///
/// Readers reject any block header declaring more than this.
pub fn max_compressed_bytes(number_of_samples: usize) -> usize {
    align(BLOCK_HEADER_BYTES + KEY_SAMPLE_BYTES * number_of_samples + 16)
}

/// CRC of an encoded block (everything after the CRC field).
pub fn block_crc(block: &[u8]) -> u32 {
    crc32fast::hash(&block[4..])
}

/// Per-block flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BlockFlags(u8);

impl BlockFlags {
    /// The block does not continue the previous one.
    pub const DISCONTINUITY: u8 = 0b001;
    /// Statistics are encrypted with the level-1 key.
    pub const LEVEL_1_ENCRYPTION: u8 = 0b010;
    /// Statistics are encrypted with the level-2 key.
    pub const LEVEL_2_ENCRYPTION: u8 = 0b100;

    /// Creates flags with nothing set.
    pub fn new() -> Self {
        Self(0)
    }

    /// Creates flags from the stored byte.
    pub fn from_u8(value: u8) -> Self {
        Self(value)
    }

    /// Returns the stored byte.
    pub fn as_u8(self) -> u8 {
        self.0
    }

    /// Returns true if the discontinuity flag is set.
    pub fn is_discontinuity(self) -> bool {
        self.0 & Self::DISCONTINUITY != 0
    }

    /// Sets or clears the discontinuity flag.
    pub fn set_discontinuity(&mut self, discontinuity: bool) {
        if discontinuity {
            self.0 |= Self::DISCONTINUITY;
        } else {
            self.0 &= !Self::DISCONTINUITY;
        }
    }

    /// Encryption recorded in the flags.
    pub fn encryption_level(self) -> EncryptionLevel {
        if self.0 & Self::LEVEL_2_ENCRYPTION != 0 {
            EncryptionLevel::Level2
        } else if self.0 & Self::LEVEL_1_ENCRYPTION != 0 {
            EncryptionLevel::Level1
        } else {
            EncryptionLevel::None
        }
    }

    /// Records `level` in the flags. Decrypted markers clear the bits.
    pub fn set_encryption_level(&mut self, level: EncryptionLevel) {
        self.0 &= !(Self::LEVEL_1_ENCRYPTION | Self::LEVEL_2_ENCRYPTION);
        match level {
            EncryptionLevel::Level1 => self.0 |= Self::LEVEL_1_ENCRYPTION,
            EncryptionLevel::Level2 => self.0 |= Self::LEVEL_2_ENCRYPTION,
            _ => {}
        }
    }
}

/// Decoded block header.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockHeader {
    /// CRC of bytes 4..block_bytes.
    pub block_crc: u32,
    /// Flags.
    pub flags: BlockFlags,
    /// Detrend slope (unused, zero).
    pub detrend_slope: f32,
    /// Detrend intercept (unused, zero).
    pub detrend_intercept: f32,
    /// Quantization step; 1.0 for lossless blocks.
    pub scale_factor: f32,
    /// Length of the difference stream.
    pub difference_bytes: u32,
    /// Samples in the block.
    pub number_of_samples: u32,
    /// Total block length including header and padding.
    pub block_bytes: u32,
    /// Start time (stored form).
    pub start_time: Timestamp,
    /// Scaled symbol counts, or zeros for a stored difference stream.
    pub statistics: [u8; STATISTICS_BYTES],
}

impl BlockHeader {
    /// Writes the header into the first [`BLOCK_HEADER_BYTES`] of `buf`.
    pub fn encode_into(&self, buf: &mut [u8]) {
        let buf = &mut buf[..BLOCK_HEADER_BYTES];
        buf.fill(0);
        put(buf, 0, &self.block_crc.to_le_bytes());
        buf[4] = self.flags.as_u8();
        put(buf, 16, &self.detrend_slope.to_le_bytes());
        put(buf, 20, &self.detrend_intercept.to_le_bytes());
        put(buf, 24, &self.scale_factor.to_le_bytes());
        put(buf, 28, &self.difference_bytes.to_le_bytes());
        put(buf, 32, &self.number_of_samples.to_le_bytes());
        put(buf, 36, &self.block_bytes.to_le_bytes());
        put(buf, 40, &self.start_time.to_le_bytes());
        put(buf, STATISTICS_OFFSET, &self.statistics);
    }

    /// Decodes a header from the start of `buf`.
    ///
    /// # Errors
    ///
    /// Returns `MefError::Codec` if fewer than [`BLOCK_HEADER_BYTES`] are
    /// available.
    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < BLOCK_HEADER_BYTES {
            return Err(MefError::Codec(format!(
                "block header needs {} bytes, {} available",
                BLOCK_HEADER_BYTES,
                buf.len()
            )));
        }
        let mut statistics = [0u8; STATISTICS_BYTES];
        statistics.copy_from_slice(&buf[STATISTICS_OFFSET..STATISTICS_OFFSET + STATISTICS_BYTES]);
        Ok(Self {
            block_crc: get_u32(buf, 0),
            flags: BlockFlags::from_u8(buf[4]),
            detrend_slope: get_f32(buf, 16),
            detrend_intercept: get_f32(buf, 20),
            scale_factor: get_f32(buf, 24),
            difference_bytes: get_u32(buf, 28),
            number_of_samples: get_u32(buf, 32),
            block_bytes: get_u32(buf, 36),
            start_time: get_i64(buf, 40),
            statistics,
        })
    }

    /// Declared block length without decoding the full header.
    pub fn peek_block_bytes(buf: &[u8]) -> Option<usize> {
        (buf.len() >= BLOCK_HEADER_BYTES).then(|| get_u32(buf, 36) as usize)
    }
}

/// An encoded block ready to be appended to a data file.
#[derive(Debug, Clone)]
pub struct RedBlock {
    /// Header as written.
    pub header: BlockHeader,
    /// Full block bytes: header, payload and padding.
    pub bytes: Vec<u8>,
    /// Smallest input sample.
    pub minimum_sample_value: i32,
    /// Largest input sample.
    pub maximum_sample_value: i32,
}

impl RedBlock {
    /// Compresses `samples` into a block.
    ///
    /// With `lossy` set, samples are quantized by a scale factor searched so
    /// that the mean residual ratio lands near the configured goal.
    ///
    /// # Errors
    ///
    /// Returns `MefError::Codec` for an empty or oversized input.
    pub fn compress(
        samples: &[i32],
        start_time: Timestamp,
        discontinuity: bool,
        lossy: Option<&LossyConfig>,
    ) -> Result<Self> {
        if samples.is_empty() {
            return Err(MefError::Codec("cannot encode an empty block".into()));
        }
        let number_of_samples = u32::try_from(samples.len())
            .map_err(|_| MefError::Codec("too many samples for one block".into()))?;

        let mut minimum_sample_value = i32::MAX;
        let mut maximum_sample_value = i32::MIN;
        for &sample in samples {
            minimum_sample_value = minimum_sample_value.min(sample);
            maximum_sample_value = maximum_sample_value.max(sample);
        }

        let scale_factor = match lossy {
            Some(lossy) => choose_scale_factor(samples, lossy),
            None => 1.0,
        };
        let differences = if scale_factor == 1.0 {
            difference_encode(samples)
        } else {
            let quantized: Vec<i32> = samples
                .iter()
                .map(|&s| quantize(s, scale_factor))
                .collect();
            difference_encode(&quantized)
        };

        let statistics = scaled_statistics(&differences);
        let coded = range_encode(&differences, &statistics);
        let (statistics, payload) = if coded.len() < differences.len() {
            (statistics, coded)
        } else {
            ([0u8; STATISTICS_BYTES], differences.clone())
        };

        let block_bytes = align(BLOCK_HEADER_BYTES + payload.len());
        let mut flags = BlockFlags::new();
        flags.set_discontinuity(discontinuity);
        let mut header = BlockHeader {
            block_crc: 0,
            flags,
            detrend_slope: 0.0,
            detrend_intercept: 0.0,
            scale_factor,
            difference_bytes: differences.len() as u32,
            number_of_samples,
            block_bytes: block_bytes as u32,
            start_time,
            statistics,
        };

        let mut bytes = vec![0u8; block_bytes];
        header.encode_into(&mut bytes);
        bytes[BLOCK_HEADER_BYTES..BLOCK_HEADER_BYTES + payload.len()].copy_from_slice(&payload);
        header.block_crc = block_crc(&bytes);
        put(&mut bytes, 0, &header.block_crc.to_le_bytes());

        Ok(Self {
            header,
            bytes,
            minimum_sample_value,
            maximum_sample_value,
        })
    }

    /// Encrypts the statistics region with the key of `level` and refreshes
    /// the CRC. A no-op for [`EncryptionLevel::None`].
    ///
    /// # Errors
    ///
    /// Returns `MefError::AccessDenied` if `access` lacks the key.
    pub fn encrypt(&mut self, level: EncryptionLevel, access: &PasswordData) -> Result<()> {
        let level = level.encrypted();
        if !level.is_encrypted() {
            return Ok(());
        }
        access.encrypt(
            level,
            &mut self.bytes[STATISTICS_OFFSET..STATISTICS_OFFSET + STATISTICS_BYTES],
        )?;
        self.header.flags.set_encryption_level(level);
        self.bytes[4] = self.header.flags.as_u8();
        self.header
            .statistics
            .copy_from_slice(&self.bytes[STATISTICS_OFFSET..STATISTICS_OFFSET + STATISTICS_BYTES]);
        self.header.block_crc = block_crc(&self.bytes);
        put(&mut self.bytes, 0, &self.header.block_crc.to_le_bytes());
        Ok(())
    }

    /// Encoded length in bytes.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Always false: blocks hold at least one sample.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Decrypts a block's statistics in place and clears its encryption bits.
///
/// Returns the "currently decrypted" marker for the block, or
/// [`EncryptionLevel::None`] if it was never encrypted. The flag byte only
/// has bits for the encrypted levels, so the returned marker is the only
/// record that the block was decrypted. The block CRC is not updated, so
/// CRC validation must happen before this call.
///
/// # Errors
///
/// Returns `MefError::AccessDenied` if `access` cannot decrypt the block.
pub fn decrypt(block: &mut [u8], access: &PasswordData) -> Result<EncryptionLevel> {
    if block.len() < BLOCK_HEADER_BYTES {
        return Err(MefError::Codec("truncated block header".into()));
    }
    let mut flags = BlockFlags::from_u8(block[4]);
    let level = flags.encryption_level();
    if !level.is_encrypted() {
        return Ok(EncryptionLevel::None);
    }
    if !access.can_decrypt(level) {
        return Err(MefError::AccessDenied(format!(
            "block requires access level {}",
            level.as_i8()
        )));
    }
    access.decrypt(
        level,
        &mut block[STATISTICS_OFFSET..STATISTICS_OFFSET + STATISTICS_BYTES],
    )?;
    flags.set_encryption_level(level.decrypted());
    block[4] = flags.as_u8();
    Ok(level.decrypted())
}

/// Decompresses an unencrypted block back into samples.
///
/// # Errors
///
/// Returns `MefError::Codec` if the block is encrypted, truncated or its
/// payload does not decode to the declared sample count.
pub fn decompress(block: &[u8]) -> Result<Vec<i32>> {
    let header = BlockHeader::decode(block)?;
    if header.flags.encryption_level().is_encrypted() {
        return Err(MefError::Codec("block statistics are encrypted".into()));
    }
    let block_bytes = header.block_bytes as usize;
    if block_bytes < BLOCK_HEADER_BYTES || block_bytes > block.len() {
        return Err(MefError::Codec(format!(
            "declared block length {} does not fit {} bytes",
            block_bytes,
            block.len()
        )));
    }
    let number_of_samples = header.number_of_samples as usize;
    let difference_bytes = header.difference_bytes as usize;
    if difference_bytes < number_of_samples
        || difference_bytes > number_of_samples * KEY_SAMPLE_BYTES
    {
        return Err(MefError::Codec(format!(
            "{} difference bytes cannot describe {} samples",
            difference_bytes, number_of_samples
        )));
    }

    let payload = &block[BLOCK_HEADER_BYTES..block_bytes];
    let differences = if header.statistics.iter().all(|&count| count == 0) {
        payload
            .get(..difference_bytes)
            .ok_or_else(|| MefError::Codec("difference stream truncated".into()))?
            .to_vec()
    } else {
        range_decode(payload, &header.statistics, difference_bytes)?
    };

    let mut samples = difference_decode(&differences, number_of_samples)?;
    if header.scale_factor != 1.0 {
        let scale = f64::from(header.scale_factor);
        for sample in samples.iter_mut() {
            *sample = (f64::from(*sample) * scale).round() as i32;
        }
    }
    Ok(samples)
}

fn difference_encode(samples: &[i32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(samples.len() + KEY_SAMPLE_BYTES);
    let mut previous: Option<i32> = None;
    for &sample in samples {
        match previous {
            Some(prev) if (i64::from(sample) - i64::from(prev)).abs() <= MAX_DIFFERENCE => {
                out.push((sample - prev) as i8 as u8);
            }
            _ => {
                out.push(KEY_SAMPLE_FLAG);
                out.extend_from_slice(&sample.to_le_bytes());
            }
        }
        previous = Some(sample);
    }
    out
}

fn difference_decode(differences: &[u8], number_of_samples: usize) -> Result<Vec<i32>> {
    let mut samples = Vec::with_capacity(number_of_samples);
    let mut current: i32 = 0;
    let mut pos = 0;
    while samples.len() < number_of_samples {
        let byte = *differences
            .get(pos)
            .ok_or_else(|| MefError::Codec("difference stream truncated".into()))?;
        pos += 1;
        if byte == KEY_SAMPLE_FLAG {
            let raw = differences
                .get(pos..pos + 4)
                .ok_or_else(|| MefError::Codec("key sample truncated".into()))?;
            let mut value = [0u8; 4];
            value.copy_from_slice(raw);
            current = i32::from_le_bytes(value);
            pos += 4;
        } else {
            current = current.wrapping_add(i32::from(byte as i8));
        }
        samples.push(current);
    }
    Ok(samples)
}

fn quantize(sample: i32, scale_factor: f32) -> i32 {
    (f64::from(sample) / f64::from(scale_factor)).round() as i32
}

/// Mean absolute residual relative to the mean absolute deviation.
fn mean_residual_ratio(samples: &[i32], scale_factor: f32, deviation: f64) -> f64 {
    let scale = f64::from(scale_factor);
    let residual: f64 = samples
        .iter()
        .map(|&s| {
            let restored = (f64::from(quantize(s, scale_factor)) * scale).round();
            (f64::from(s) - restored).abs()
        })
        .sum();
    residual / samples.len() as f64 / deviation
}

fn choose_scale_factor(samples: &[i32], lossy: &LossyConfig) -> f32 {
    let n = samples.len() as f64;
    let mean = samples.iter().map(|&s| f64::from(s)).sum::<f64>() / n;
    let deviation = samples.iter().map(|&s| (f64::from(s) - mean).abs()).sum::<f64>() / n;
    if deviation == 0.0 || lossy.goal_mean_residual_ratio <= 0.0 {
        return 1.0;
    }
    let goal = lossy.goal_mean_residual_ratio;
    let tolerance = lossy.goal_tolerance.abs();

    let mut low = 1.0f32;
    let mut high = 2.0f32;
    while mean_residual_ratio(samples, high, deviation) < goal - tolerance {
        low = high;
        high *= 2.0;
        if high > (1u32 << 30) as f32 {
            return low;
        }
    }
    for _ in 0..32 {
        let mid = (low + high) / 2.0;
        let ratio = mean_residual_ratio(samples, mid, deviation);
        if (ratio - goal).abs() <= tolerance {
            return mid;
        }
        if ratio < goal {
            low = mid;
        } else {
            high = mid;
        }
    }
    low
}

/// Symbol counts scaled so the largest is 255 and every present symbol is
/// at least 1. The total stays below the coder's bottom bound.
fn scaled_statistics(bytes: &[u8]) -> [u8; STATISTICS_BYTES] {
    let mut counts = [0u64; STATISTICS_BYTES];
    for &byte in bytes {
        counts[byte as usize] += 1;
    }
    let max = counts.iter().copied().max().unwrap_or(0);
    let mut statistics = [0u8; STATISTICS_BYTES];
    if max == 0 {
        return statistics;
    }
    for (slot, &count) in statistics.iter_mut().zip(counts.iter()) {
        if count > 0 {
            *slot = ((count * 255) / max).max(1) as u8;
        }
    }
    statistics
}

fn cumulative(statistics: &[u8; STATISTICS_BYTES]) -> [u32; STATISTICS_BYTES + 1] {
    let mut cumulative = [0u32; STATISTICS_BYTES + 1];
    for (i, &count) in statistics.iter().enumerate() {
        cumulative[i + 1] = cumulative[i] + u32::from(count);
    }
    cumulative
}

/// Carry-less 32-bit range encoder.
struct RangeEncoder {
    low: u32,
    range: u32,
    out: Vec<u8>,
}

impl RangeEncoder {
    fn new(capacity: usize) -> Self {
        Self {
            low: 0,
            range: u32::MAX,
            out: Vec::with_capacity(capacity),
        }
    }

    fn encode(&mut self, start: u32, size: u32, total: u32) {
        self.range /= total;
        self.low = self.low.wrapping_add(start * self.range);
        self.range *= size;
        loop {
            if (self.low ^ self.low.wrapping_add(self.range)) >= RANGE_TOP {
                if self.range >= RANGE_BOTTOM {
                    break;
                }
                self.range = self.low.wrapping_neg() & (RANGE_BOTTOM - 1);
            }
            self.out.push((self.low >> 24) as u8);
            self.low <<= 8;
            self.range <<= 8;
        }
    }

    fn finish(mut self) -> Vec<u8> {
        for _ in 0..4 {
            self.out.push((self.low >> 24) as u8);
            self.low <<= 8;
        }
        self.out
    }
}

struct RangeDecoder<'a> {
    input: &'a [u8],
    pos: usize,
    low: u32,
    code: u32,
    range: u32,
}

impl<'a> RangeDecoder<'a> {
    fn new(input: &'a [u8]) -> Self {
        let mut decoder = Self {
            input,
            pos: 0,
            low: 0,
            code: 0,
            range: u32::MAX,
        };
        for _ in 0..4 {
            decoder.code = (decoder.code << 8) | decoder.next_byte();
        }
        decoder
    }

    fn next_byte(&mut self) -> u32 {
        let byte = self.input.get(self.pos).copied().unwrap_or(0);
        self.pos += 1;
        u32::from(byte)
    }

    fn target(&mut self, total: u32) -> Result<u32> {
        self.range /= total;
        let value = self.code.wrapping_sub(self.low) / self.range;
        if value >= total {
            return Err(MefError::Codec("range decoder out of bounds".into()));
        }
        Ok(value)
    }

    fn consume(&mut self, start: u32, size: u32) {
        self.low = self.low.wrapping_add(start * self.range);
        self.range *= size;
        loop {
            if (self.low ^ self.low.wrapping_add(self.range)) >= RANGE_TOP {
                if self.range >= RANGE_BOTTOM {
                    break;
                }
                self.range = self.low.wrapping_neg() & (RANGE_BOTTOM - 1);
            }
            self.code = (self.code << 8) | self.next_byte();
            self.low <<= 8;
            self.range <<= 8;
        }
    }
}

fn range_encode(symbols: &[u8], statistics: &[u8; STATISTICS_BYTES]) -> Vec<u8> {
    let cumulative = cumulative(statistics);
    let total = cumulative[STATISTICS_BYTES];
    let mut encoder = RangeEncoder::new(symbols.len());
    for &symbol in symbols {
        let s = symbol as usize;
        encoder.encode(cumulative[s], cumulative[s + 1] - cumulative[s], total);
    }
    encoder.finish()
}

fn range_decode(
    payload: &[u8],
    statistics: &[u8; STATISTICS_BYTES],
    count: usize,
) -> Result<Vec<u8>> {
    let cumulative = cumulative(statistics);
    let total = cumulative[STATISTICS_BYTES];
    let mut decoder = RangeDecoder::new(payload);
    let mut symbols = Vec::with_capacity(count);
    for _ in 0..count {
        let target = decoder.target(total)?;
        // Last symbol whose cumulative start is <= target.
        let symbol = cumulative.partition_point(|&c| c <= target) - 1;
        decoder.consume(cumulative[symbol], cumulative[symbol + 1] - cumulative[symbol]);
        symbols.push(symbol as u8);
    }
    Ok(symbols)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::Credentials;

    fn sine(n: usize, amplitude: f64) -> Vec<i32> {
        (0..n)
            .map(|i| ((i as f64) * 0.05).sin() * amplitude)
            .map(|v| v as i32)
            .collect()
    }

    #[test]
    fn test_header_layout() {
        let block = RedBlock::compress(&[1, 2, 3], 10_000, true, None).unwrap();
        let bytes = &block.bytes;
        assert_eq!(bytes.len() % BLOCK_ALIGNMENT, 0);
        assert_eq!(bytes[4] & BlockFlags::DISCONTINUITY, BlockFlags::DISCONTINUITY);
        assert_eq!(get_f32(bytes, 24), 1.0);
        assert_eq!(get_u32(bytes, 32), 3);
        assert_eq!(get_u32(bytes, 36) as usize, bytes.len());
        assert_eq!(get_i64(bytes, 40), 10_000);
        assert_eq!(get_u32(bytes, 0), block_crc(bytes));

        let header = BlockHeader::decode(bytes).unwrap();
        assert_eq!(header, block.header);
    }

    #[test]
    fn test_roundtrip_smooth_signal() {
        let samples = sine(1000, 200.0);
        let block = RedBlock::compress(&samples, 0, false, None).unwrap();
        // Smooth data range codes well below one byte per sample.
        assert!(block.len() < BLOCK_HEADER_BYTES + samples.len());
        assert!(block.header.statistics.iter().any(|&c| c != 0));
        assert_eq!(decompress(&block.bytes).unwrap(), samples);
    }

    #[test]
    fn test_roundtrip_key_samples() {
        let samples = vec![0, i32::MAX, i32::MIN, 5, -300, 100_000, 100_001, 0];
        let block = RedBlock::compress(&samples, 0, false, None).unwrap();
        assert_eq!(block.minimum_sample_value, i32::MIN);
        assert_eq!(block.maximum_sample_value, i32::MAX);
        assert_eq!(decompress(&block.bytes).unwrap(), samples);
    }

    #[test]
    fn test_worst_case_bound() {
        let samples: Vec<i32> = (0..512)
            .map(|i| if i % 2 == 0 { i32::MIN } else { i32::MAX })
            .collect();
        let block = RedBlock::compress(&samples, 0, false, None).unwrap();
        assert!(block.len() <= max_compressed_bytes(samples.len()));
        assert_eq!(block.header.difference_bytes as usize, 5 * samples.len());
        assert_eq!(decompress(&block.bytes).unwrap(), samples);
    }

    #[test]
    fn test_single_sample() {
        let block = RedBlock::compress(&[-42], 7, false, None).unwrap();
        assert_eq!(decompress(&block.bytes).unwrap(), vec![-42]);
    }

    #[test]
    fn test_empty_block_rejected() {
        assert!(RedBlock::compress(&[], 0, false, None).is_err());
    }

    #[test]
    fn test_lossy_reduces_size() {
        let samples: Vec<i32> = (0..2000)
            .map(|i| ((i as f64 * 0.01).sin() * 50_000.0) as i32 + (i * 7919 % 97) as i32)
            .collect();
        let lossless = RedBlock::compress(&samples, 0, false, None).unwrap();
        let lossy = RedBlock::compress(&samples, 0, false, Some(&LossyConfig::default())).unwrap();

        assert!(lossy.header.scale_factor > 1.0);
        assert!(lossy.len() < lossless.len());

        let restored = decompress(&lossy.bytes).unwrap();
        let step = f64::from(lossy.header.scale_factor);
        for (original, restored) in samples.iter().zip(restored.iter()) {
            assert!((f64::from(*original) - f64::from(*restored)).abs() <= step / 2.0 + 1.0);
        }
    }

    #[test]
    fn test_lossy_constant_signal_stays_lossless() {
        let samples = vec![12; 100];
        let block = RedBlock::compress(&samples, 0, false, Some(&LossyConfig::default())).unwrap();
        assert_eq!(block.header.scale_factor, 1.0);
        assert_eq!(decompress(&block.bytes).unwrap(), samples);
    }

    #[test]
    fn test_corrupted_payload_fails_crc() {
        let samples = sine(200, 500.0);
        let mut block = RedBlock::compress(&samples, 0, false, None).unwrap();
        block.bytes[BLOCK_HEADER_BYTES + 3] ^= 0xFF;
        assert_ne!(block_crc(&block.bytes), block.header.block_crc);
    }

    #[test]
    fn test_encrypted_block() {
        let creds = Credentials::new(Some("one"), Some("two")).unwrap();
        let samples = sine(300, 800.0);
        let mut block = RedBlock::compress(&samples, 0, false, None).unwrap();
        block.encrypt(EncryptionLevel::Level2, &creds.password_data()).unwrap();

        assert_eq!(block.header.flags.encryption_level(), EncryptionLevel::Level2);
        assert_eq!(get_u32(&block.bytes, 0), block_crc(&block.bytes));
        assert!(decompress(&block.bytes).is_err());

        let fields = creds.validation_fields();
        let level_1 = PasswordData::process(&fields, Some("one"));
        let mut copy = block.bytes.clone();
        assert!(matches!(
            decrypt(&mut copy, &level_1),
            Err(MefError::AccessDenied(_))
        ));

        let level_2 = PasswordData::process(&fields, Some("two"));
        let marker = decrypt(&mut copy, &level_2).unwrap();
        assert_eq!(marker, EncryptionLevel::Level2Decrypted);
        assert_eq!(decompress(&copy).unwrap(), samples);
    }

    #[test]
    fn test_statistics_scaling() {
        let mut bytes = vec![0u8; 1000];
        bytes.push(9);
        let statistics = scaled_statistics(&bytes);
        assert_eq!(statistics[0], 255);
        assert_eq!(statistics[9], 1);
        assert_eq!(statistics[1], 0);
        assert!(cumulative(&statistics)[STATISTICS_BYTES] < RANGE_BOTTOM);
    }
}

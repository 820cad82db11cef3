//! Time-series metadata file (`.tmet`).
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │  Universal header          1024 bytes       │
//! ├─────────────────────────────────────────────┤
//! │  Section 1                 1536 bytes       │
//! │  - section 2 / 3 encryption levels          │
//! ├─────────────────────────────────────────────┤
//! │  Section 2 (time series)  10752 bytes       │
//! │  - descriptions, sampling, block aggregates │
//! ├─────────────────────────────────────────────┤
//! │  Section 3 (subject)       3072 bytes       │
//! │  - recording time offset, DST, identity     │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! Sections 2 and 3 are encrypted in place when their level is positive.
//! A section the caller cannot decrypt is kept as raw bytes so the file can
//! be rewritten without losing it.

use crate::access::{Credentials, EncryptionLevel, PasswordData};
use crate::config::{FailBehavior, MefConfig};
use crate::error::{MefError, Result};
use crate::format::header::{FileType, UniversalHeader, UNIVERSAL_HEADER_BYTES};
use crate::format::{
    get_f64, get_i32, get_i64, get_str, get_u32, put, put_str, RecordingTimeOffset, Timestamp,
    COUNT_NO_ENTRY, FREQUENCY_NO_ENTRY, UUTC_NO_ENTRY,
};
use crate::path::MefPath;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::Path;
use tracing::{debug, warn};

/// Total size of a metadata file.
pub const METADATA_FILE_BYTES: usize = 16384;

/// Section 1 size.
pub const SECTION_1_BYTES: usize = 1536;

/// Section 2 size.
pub const SECTION_2_BYTES: usize = 10752;

/// Section 3 size.
pub const SECTION_3_BYTES: usize = 3072;

const SECTION_1_OFFSET: usize = UNIVERSAL_HEADER_BYTES;
const SECTION_2_OFFSET: usize = SECTION_1_OFFSET + SECTION_1_BYTES;
const SECTION_3_OFFSET: usize = SECTION_2_OFFSET + SECTION_2_BYTES;

const DESCRIPTION_BYTES: usize = 2048;
const UNITS_DESCRIPTION_BYTES: usize = 128;
const SUBJECT_FIELD_BYTES: usize = 128;
const RECORDING_LOCATION_BYTES: usize = 512;

/// Section 1: encryption levels of the other two sections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Section1 {
    /// Encryption of section 2.
    pub section_2_encryption: EncryptionLevel,
    /// Encryption of section 3.
    pub section_3_encryption: EncryptionLevel,
}

/// Section 2: time-series parameters and block aggregates.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeSeriesSection2 {
    /// Free text channel description.
    pub channel_description: String,
    /// Free text session description.
    pub session_description: String,
    /// Duration of the recorded samples (µs).
    pub recording_duration: i64,
    /// Reference electrode description.
    pub reference_description: String,
    /// Acquisition system channel number.
    pub acquisition_channel_number: i64,
    /// Sampling frequency (Hz).
    pub sampling_frequency: f64,
    /// Low filter setting (Hz).
    pub low_frequency_filter_setting: f64,
    /// High filter setting (Hz).
    pub high_frequency_filter_setting: f64,
    /// Notch filter setting (Hz).
    pub notch_filter_frequency_setting: f64,
    /// Mains frequency (Hz).
    pub ac_line_frequency: f64,
    /// Multiplier from stored integers to native units.
    pub units_conversion_factor: f64,
    /// Native unit name.
    pub units_description: String,
    /// Largest sample in native units.
    pub maximum_native_sample_value: f64,
    /// Smallest sample in native units.
    pub minimum_native_sample_value: f64,
    /// First sample of this segment within the channel.
    pub start_sample: i64,
    /// Samples in the segment.
    pub number_of_samples: i64,
    /// Blocks in the segment.
    pub number_of_blocks: i64,
    /// Largest encoded block.
    pub maximum_block_bytes: i64,
    /// Largest sample count of a block.
    pub maximum_block_samples: u32,
    /// Largest difference stream of a block.
    pub maximum_difference_bytes: u32,
    /// Nominal block duration (µs).
    pub block_interval: i64,
    /// Blocks flagged as discontinuities.
    pub number_of_discontinuities: i64,
    /// Longest run of contiguous blocks.
    pub maximum_contiguous_blocks: i64,
    /// Bytes of the longest contiguous run.
    pub maximum_contiguous_block_bytes: i64,
    /// Samples of the longest contiguous run.
    pub maximum_contiguous_samples: i64,
}

impl Default for TimeSeriesSection2 {
    fn default() -> Self {
        Self {
            channel_description: String::new(),
            session_description: String::new(),
            recording_duration: COUNT_NO_ENTRY,
            reference_description: String::new(),
            acquisition_channel_number: COUNT_NO_ENTRY,
            sampling_frequency: FREQUENCY_NO_ENTRY,
            low_frequency_filter_setting: FREQUENCY_NO_ENTRY,
            high_frequency_filter_setting: FREQUENCY_NO_ENTRY,
            notch_filter_frequency_setting: FREQUENCY_NO_ENTRY,
            ac_line_frequency: FREQUENCY_NO_ENTRY,
            units_conversion_factor: 1.0,
            units_description: String::new(),
            maximum_native_sample_value: 0.0,
            minimum_native_sample_value: 0.0,
            start_sample: 0,
            number_of_samples: 0,
            number_of_blocks: 0,
            maximum_block_bytes: 0,
            maximum_block_samples: 0,
            maximum_difference_bytes: 0,
            block_interval: COUNT_NO_ENTRY,
            number_of_discontinuities: 0,
            maximum_contiguous_blocks: 0,
            maximum_contiguous_block_bytes: 0,
            maximum_contiguous_samples: 0,
        }
    }
}

impl TimeSeriesSection2 {
    /// Section 2 with a sampling frequency and channel start sample.
    pub fn with_sampling(sampling_frequency: f64, start_sample: i64) -> Self {
        Self {
            sampling_frequency,
            start_sample,
            ..Self::default()
        }
    }

    fn encode(&self) -> Vec<u8> {
        let mut buf = vec![0u8; SECTION_2_BYTES];
        put_str(&mut buf[0..2048], &self.channel_description);
        put_str(&mut buf[2048..4096], &self.session_description);
        put(&mut buf, 4096, &self.recording_duration.to_le_bytes());
        put_str(&mut buf[4104..4104 + DESCRIPTION_BYTES], &self.reference_description);
        put(&mut buf, 6152, &self.acquisition_channel_number.to_le_bytes());
        put(&mut buf, 6160, &self.sampling_frequency.to_le_bytes());
        put(&mut buf, 6168, &self.low_frequency_filter_setting.to_le_bytes());
        put(&mut buf, 6176, &self.high_frequency_filter_setting.to_le_bytes());
        put(&mut buf, 6184, &self.notch_filter_frequency_setting.to_le_bytes());
        put(&mut buf, 6192, &self.ac_line_frequency.to_le_bytes());
        put(&mut buf, 6200, &self.units_conversion_factor.to_le_bytes());
        put_str(&mut buf[6208..6208 + UNITS_DESCRIPTION_BYTES], &self.units_description);
        put(&mut buf, 6336, &self.maximum_native_sample_value.to_le_bytes());
        put(&mut buf, 6344, &self.minimum_native_sample_value.to_le_bytes());
        put(&mut buf, 6352, &self.start_sample.to_le_bytes());
        put(&mut buf, 6360, &self.number_of_samples.to_le_bytes());
        put(&mut buf, 6368, &self.number_of_blocks.to_le_bytes());
        put(&mut buf, 6376, &self.maximum_block_bytes.to_le_bytes());
        put(&mut buf, 6384, &self.maximum_block_samples.to_le_bytes());
        put(&mut buf, 6388, &self.maximum_difference_bytes.to_le_bytes());
        put(&mut buf, 6392, &self.block_interval.to_le_bytes());
        put(&mut buf, 6400, &self.number_of_discontinuities.to_le_bytes());
        put(&mut buf, 6408, &self.maximum_contiguous_blocks.to_le_bytes());
        put(&mut buf, 6416, &self.maximum_contiguous_block_bytes.to_le_bytes());
        put(&mut buf, 6424, &self.maximum_contiguous_samples.to_le_bytes());
        buf
    }

    fn decode(buf: &[u8]) -> Self {
        Self {
            channel_description: get_str(&buf[0..2048]),
            session_description: get_str(&buf[2048..4096]),
            recording_duration: get_i64(buf, 4096),
            reference_description: get_str(&buf[4104..4104 + DESCRIPTION_BYTES]),
            acquisition_channel_number: get_i64(buf, 6152),
            sampling_frequency: get_f64(buf, 6160),
            low_frequency_filter_setting: get_f64(buf, 6168),
            high_frequency_filter_setting: get_f64(buf, 6176),
            notch_filter_frequency_setting: get_f64(buf, 6184),
            ac_line_frequency: get_f64(buf, 6192),
            units_conversion_factor: get_f64(buf, 6200),
            units_description: get_str(&buf[6208..6208 + UNITS_DESCRIPTION_BYTES]),
            maximum_native_sample_value: get_f64(buf, 6336),
            minimum_native_sample_value: get_f64(buf, 6344),
            start_sample: get_i64(buf, 6352),
            number_of_samples: get_i64(buf, 6360),
            number_of_blocks: get_i64(buf, 6368),
            maximum_block_bytes: get_i64(buf, 6376),
            maximum_block_samples: get_u32(buf, 6384),
            maximum_difference_bytes: get_u32(buf, 6388),
            block_interval: get_i64(buf, 6392),
            number_of_discontinuities: get_i64(buf, 6400),
            maximum_contiguous_blocks: get_i64(buf, 6408),
            maximum_contiguous_block_bytes: get_i64(buf, 6416),
            maximum_contiguous_samples: get_i64(buf, 6424),
        }
    }
}

/// Section 3: de-identification and subject parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section3 {
    /// Recording-time offset applied to every stored time.
    pub recording_time_offset: i64,
    /// Daylight saving start.
    pub dst_start_time: Timestamp,
    /// Daylight saving end.
    pub dst_end_time: Timestamp,
    /// Offset from GMT in seconds.
    pub gmt_offset: i32,
    /// Subject first name.
    pub subject_name_1: String,
    /// Subject last name.
    pub subject_name_2: String,
    /// Subject identifier.
    pub subject_id: String,
    /// Recording location.
    pub recording_location: String,
}

impl Default for Section3 {
    fn default() -> Self {
        Self {
            recording_time_offset: UUTC_NO_ENTRY,
            dst_start_time: UUTC_NO_ENTRY,
            dst_end_time: UUTC_NO_ENTRY,
            gmt_offset: i32::MIN,
            subject_name_1: String::new(),
            subject_name_2: String::new(),
            subject_id: String::new(),
            recording_location: String::new(),
        }
    }
}

impl Section3 {
    fn encode(&self) -> Vec<u8> {
        let mut buf = vec![0u8; SECTION_3_BYTES];
        put(&mut buf, 0, &self.recording_time_offset.to_le_bytes());
        put(&mut buf, 8, &self.dst_start_time.to_le_bytes());
        put(&mut buf, 16, &self.dst_end_time.to_le_bytes());
        put(&mut buf, 24, &self.gmt_offset.to_le_bytes());
        put_str(&mut buf[28..28 + SUBJECT_FIELD_BYTES], &self.subject_name_1);
        put_str(&mut buf[156..156 + SUBJECT_FIELD_BYTES], &self.subject_name_2);
        put_str(&mut buf[284..284 + SUBJECT_FIELD_BYTES], &self.subject_id);
        put_str(
            &mut buf[412..412 + RECORDING_LOCATION_BYTES],
            &self.recording_location,
        );
        buf
    }

    fn decode(buf: &[u8]) -> Self {
        Self {
            recording_time_offset: get_i64(buf, 0),
            dst_start_time: get_i64(buf, 8),
            dst_end_time: get_i64(buf, 16),
            gmt_offset: get_i32(buf, 24),
            subject_name_1: get_str(&buf[28..28 + SUBJECT_FIELD_BYTES]),
            subject_name_2: get_str(&buf[156..156 + SUBJECT_FIELD_BYTES]),
            subject_id: get_str(&buf[284..284 + SUBJECT_FIELD_BYTES]),
            recording_location: get_str(&buf[412..412 + RECORDING_LOCATION_BYTES]),
        }
    }
}

/// A metadata section that may be unreadable with the current password.
#[derive(Debug, Clone, PartialEq)]
pub enum Section<T> {
    /// Decoded contents.
    Available(T),
    /// Still encrypted; raw bytes are preserved for rewriting.
    Locked(Vec<u8>),
}

impl<T> Section<T> {
    /// Decoded contents, if accessible.
    pub fn get(&self) -> Option<&T> {
        match self {
            Self::Available(value) => Some(value),
            Self::Locked(_) => None,
        }
    }

    /// Mutable decoded contents, if accessible.
    pub fn get_mut(&mut self) -> Option<&mut T> {
        match self {
            Self::Available(value) => Some(value),
            Self::Locked(_) => None,
        }
    }
}

/// A `.tmet` file in memory.
#[derive(Debug, Clone)]
pub struct MetadataFile {
    /// Universal header.
    pub header: UniversalHeader,
    /// Section encryption markers; decrypted sections carry the negative
    /// "currently decrypted" value.
    pub section_1: Section1,
    /// Time-series parameters.
    pub section_2: Section<TimeSeriesSection2>,
    /// Subject parameters.
    pub section_3: Section<Section3>,
}

impl MetadataFile {
    /// Reads a metadata file, decrypting every section `password` unlocks.
    ///
    /// Returns the file together with the unlocked key material.
    ///
    /// # Errors
    ///
    /// Returns `MefError::FileMissing` if the file is absent,
    /// `MefError::InvalidFileType` if it is not a `.tmet` file and
    /// `MefError::ChecksumMismatch` if a CRC is wrong.
    pub fn read(
        path: &Path,
        password: Option<&str>,
        config: &MefConfig,
    ) -> Result<(Self, PasswordData)> {
        if !path.exists() {
            return Err(MefError::FileMissing {
                path: path.to_path_buf(),
            });
        }
        let mut buf = Vec::with_capacity(METADATA_FILE_BYTES);
        File::open(path)?.read_to_end(&mut buf)?;
        if buf.len() != METADATA_FILE_BYTES {
            return Err(MefError::InvalidMetadata(format!(
                "{} is {} bytes, expected {}",
                path.display(),
                buf.len(),
                METADATA_FILE_BYTES
            )));
        }

        let header = UniversalHeader::decode(&buf)?;
        header.expect_type(FileType::TimeSeriesMetadata)?;
        let actual = crc32fast::hash(&buf[UNIVERSAL_HEADER_BYTES..]);
        if actual != header.body_crc {
            return Err(MefError::ChecksumMismatch {
                expected: header.body_crc,
                actual,
            });
        }

        let access = PasswordData::process(&header.validation, password);
        let level_at = |offset: usize| {
            let raw = buf[offset] as i8;
            EncryptionLevel::from_i8(raw).ok_or_else(|| {
                MefError::InvalidMetadata(format!("unknown section encryption level {}", raw))
            })
        };
        let mut section_1 = Section1 {
            section_2_encryption: level_at(SECTION_1_OFFSET)?.encrypted(),
            section_3_encryption: level_at(SECTION_1_OFFSET + 1)?.encrypted(),
        };

        let mut section_2_bytes = buf[SECTION_2_OFFSET..SECTION_3_OFFSET].to_vec();
        let section_2 = if open_section(
            &access,
            &mut section_1.section_2_encryption,
            &mut section_2_bytes,
        )? {
            Section::Available(TimeSeriesSection2::decode(&section_2_bytes))
        } else {
            report_locked(path, 2, config);
            Section::Locked(section_2_bytes)
        };

        let mut section_3_bytes = buf[SECTION_3_OFFSET..].to_vec();
        let section_3 = if open_section(
            &access,
            &mut section_1.section_3_encryption,
            &mut section_3_bytes,
        )? {
            Section::Available(Section3::decode(&section_3_bytes))
        } else {
            report_locked(path, 3, config);
            Section::Locked(section_3_bytes)
        };

        Ok((
            Self {
                header,
                section_1,
                section_2,
                section_3,
            },
            access,
        ))
    }

    /// Writes the file, encrypting accessible sections again.
    ///
    /// # Errors
    ///
    /// Returns `MefError::AccessDenied` if a section must be encrypted with a
    /// key `access` does not hold.
    pub fn write(&mut self, path: &Path, access: &PasswordData) -> Result<()> {
        let mut body = vec![0u8; METADATA_FILE_BYTES - UNIVERSAL_HEADER_BYTES];
        let section_2_level = self.section_1.section_2_encryption.encrypted();
        let section_3_level = self.section_1.section_3_encryption.encrypted();
        body[0] = section_2_level.as_i8() as u8;
        body[1] = section_3_level.as_i8() as u8;

        let section_2 = match &self.section_2 {
            Section::Available(section) => {
                let mut bytes = section.encode();
                access.encrypt(section_2_level, &mut bytes)?;
                bytes
            }
            Section::Locked(bytes) => bytes.clone(),
        };
        let section_3 = match &self.section_3 {
            Section::Available(section) => {
                let mut bytes = section.encode();
                access.encrypt(section_3_level, &mut bytes)?;
                bytes
            }
            Section::Locked(bytes) => bytes.clone(),
        };
        let section_2_start = SECTION_2_OFFSET - UNIVERSAL_HEADER_BYTES;
        let section_3_start = SECTION_3_OFFSET - UNIVERSAL_HEADER_BYTES;
        body[section_2_start..section_3_start].copy_from_slice(&section_2);
        body[section_3_start..].copy_from_slice(&section_3);

        self.header.number_of_entries = 1;
        self.header.maximum_entry_size = (METADATA_FILE_BYTES - UNIVERSAL_HEADER_BYTES) as i64;
        self.header.body_crc = crc32fast::hash(&body);
        let encoded = self.header.encode();
        self.header.header_crc = get_u32(&encoded, 0);

        let mut file = File::create(path)?;
        file.write_all(&encoded)?;
        file.write_all(&body)?;
        file.sync_all()?;
        debug!("Wrote metadata {}", path.display());
        Ok(())
    }

    /// Time-series parameters.
    ///
    /// # Errors
    ///
    /// Returns `MefError::AccessDenied` if section 2 is still encrypted.
    pub fn time_series(&self) -> Result<&TimeSeriesSection2> {
        self.section_2
            .get()
            .ok_or_else(|| MefError::AccessDenied("metadata section 2 is encrypted".into()))
    }

    /// Mutable time-series parameters.
    ///
    /// # Errors
    ///
    /// Returns `MefError::AccessDenied` if section 2 is still encrypted.
    pub fn time_series_mut(&mut self) -> Result<&mut TimeSeriesSection2> {
        self.section_2
            .get_mut()
            .ok_or_else(|| MefError::AccessDenied("metadata section 2 is encrypted".into()))
    }

    /// Recording-time offset from section 3, or none if it is locked.
    pub fn recording_time_offset(&self) -> RecordingTimeOffset {
        self.section_3
            .get()
            .map_or(RecordingTimeOffset::none(), |s| {
                RecordingTimeOffset::new(s.recording_time_offset)
            })
    }
}

/// Decrypts a section in place when allowed. Returns false if it stays
/// encrypted.
fn open_section(
    access: &PasswordData,
    level: &mut EncryptionLevel,
    bytes: &mut [u8],
) -> Result<bool> {
    if !level.is_encrypted() {
        return Ok(true);
    }
    if !access.can_decrypt(*level) {
        return Ok(false);
    }
    access.decrypt(*level, bytes)?;
    *level = level.decrypted();
    Ok(true)
}

fn report_locked(path: &Path, section: u8, config: &MefConfig) {
    match config.behavior_on_fail {
        FailBehavior::Return => warn!(
            "Metadata section {} of {} stays encrypted for the supplied password",
            section,
            path.display()
        ),
        FailBehavior::Suppress => debug!(
            "Metadata section {} of {} stays encrypted",
            section,
            path.display()
        ),
    }
}

/// Creates the `.tmet` file of a segment.
///
/// Creates the segment directory if needed. Channel, session and segment
/// number come from `segment_path`; times are given offset free and stored
/// with the recording-time offset of `section_3` applied.
///
/// # Errors
///
/// Returns `MefError::Path` for a malformed segment path,
/// `MefError::Password` for invalid credentials and `MefError::FileExists`
/// if the metadata file is already present.
pub fn write_ts_metadata(
    segment_path: &Path,
    credentials: &Credentials,
    start_time: Timestamp,
    end_time: Timestamp,
    section_2: TimeSeriesSection2,
    section_3: Section3,
    config: &MefConfig,
) -> Result<()> {
    let location = MefPath::parse(segment_path)?.segment_location()?;
    let tmet_path = location.file_path(FileType::TimeSeriesMetadata);
    if tmet_path.exists() {
        return Err(MefError::FileExists { path: tmet_path });
    }
    if section_2.sampling_frequency <= 0.0 {
        return Err(MefError::InvalidMetadata(format!(
            "sampling frequency must be positive, got {}",
            section_2.sampling_frequency
        )));
    }
    fs::create_dir_all(&location.segment_dir)?;

    let offset = RecordingTimeOffset::new(section_3.recording_time_offset);
    let mut header = UniversalHeader::new(FileType::TimeSeriesMetadata);
    header.start_time = offset.apply(start_time);
    header.end_time = offset.apply(end_time);
    header.segment_number = location.segment_number;
    header.channel_name = location.channel_name.clone();
    header.session_name = location.session_name.clone();
    header.validation = credentials.validation_fields();

    let mut file = MetadataFile {
        header,
        section_1: Section1 {
            section_2_encryption: credentials.section_2_encryption(),
            section_3_encryption: credentials.section_3_encryption(),
        },
        section_2: Section::Available(section_2),
        section_3: Section::Available(section_3),
    };
    file.write(&tmet_path, &credentials.password_data())?;
    if config.behavior_on_fail == FailBehavior::Return {
        debug!(
            "Created metadata for {} segment {}",
            location.channel_name, location.segment_number
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn segment_dir(root: &Path) -> std::path::PathBuf {
        root.join("sess.mefd").join("ch1.timd").join("ch1-000002.segd")
    }

    fn section_3_with_offset(offset: i64) -> Section3 {
        Section3 {
            recording_time_offset: offset,
            subject_name_1: "Jane".into(),
            subject_id: "S-001".into(),
            ..Section3::default()
        }
    }

    #[test]
    fn test_section_sizes_are_cipher_aligned() {
        assert_eq!(SECTION_2_BYTES % 16, 0);
        assert_eq!(SECTION_3_BYTES % 16, 0);
        assert_eq!(
            UNIVERSAL_HEADER_BYTES + SECTION_1_BYTES + SECTION_2_BYTES + SECTION_3_BYTES,
            METADATA_FILE_BYTES
        );
    }

    #[test]
    fn test_write_read_unencrypted() {
        let temp_dir = TempDir::new().unwrap();
        let segment = segment_dir(temp_dir.path());
        let mut section_2 = TimeSeriesSection2::with_sampling(512.0, 0);
        section_2.units_description = "uV".into();

        write_ts_metadata(
            &segment,
            &Credentials::unencrypted(),
            1_000,
            2_000,
            section_2.clone(),
            Section3::default(),
            &MefConfig::default(),
        )
        .unwrap();

        let path = segment.join("ch1-000002.tmet");
        assert_eq!(fs::metadata(&path).unwrap().len() as usize, METADATA_FILE_BYTES);

        let (file, access) = MetadataFile::read(&path, None, &MefConfig::default()).unwrap();
        assert_eq!(access.access_level(), crate::access::AccessLevel::Unencrypted);
        assert_eq!(file.header.segment_number, 2);
        assert_eq!(file.header.channel_name, "ch1");
        assert_eq!(file.header.session_name, "sess");
        assert_eq!(file.header.start_time, 1_000);
        assert_eq!(file.time_series().unwrap(), &section_2);
    }

    #[test]
    fn test_sections_gated_by_level() {
        let temp_dir = TempDir::new().unwrap();
        let segment = segment_dir(temp_dir.path());
        let creds = Credentials::new(Some("one"), Some("two")).unwrap();
        write_ts_metadata(
            &segment,
            &creds,
            5_000_000,
            6_000_000,
            TimeSeriesSection2::with_sampling(1000.0, 0),
            section_3_with_offset(1_000_000),
            &MefConfig::default(),
        )
        .unwrap();
        let path = segment.join("ch1-000002.tmet");
        let config = MefConfig::default();

        // Stored times carry the recording-time offset.
        let (none, _) = MetadataFile::read(&path, None, &config).unwrap();
        assert_eq!(none.header.start_time, -4_000_000);
        assert!(none.time_series().is_err());
        assert!(none.section_3.get().is_none());
        assert_eq!(none.section_1.section_2_encryption, EncryptionLevel::Level1);

        let (level_1, _) = MetadataFile::read(&path, Some("one"), &config).unwrap();
        assert_eq!(level_1.time_series().unwrap().sampling_frequency, 1000.0);
        assert_eq!(
            level_1.section_1.section_2_encryption,
            EncryptionLevel::Level1Decrypted
        );
        assert!(level_1.section_3.get().is_none());
        assert_eq!(level_1.recording_time_offset(), RecordingTimeOffset::none());

        let (level_2, _) = MetadataFile::read(&path, Some("two"), &config).unwrap();
        let section_3 = level_2.section_3.get().unwrap();
        assert_eq!(section_3.subject_id, "S-001");
        assert_eq!(level_2.recording_time_offset().value(), Some(1_000_000));
    }

    #[test]
    fn test_rewrite_preserves_locked_section() {
        let temp_dir = TempDir::new().unwrap();
        let segment = segment_dir(temp_dir.path());
        let creds = Credentials::new(Some("one"), Some("two")).unwrap();
        write_ts_metadata(
            &segment,
            &creds,
            0,
            1,
            TimeSeriesSection2::with_sampling(1000.0, 0),
            section_3_with_offset(77),
            &MefConfig::default(),
        )
        .unwrap();
        let path = segment.join("ch1-000002.tmet");
        let config = MefConfig::default();

        let (mut file, access) = MetadataFile::read(&path, Some("one"), &config).unwrap();
        file.time_series_mut().unwrap().number_of_samples = 99;
        file.write(&path, &access).unwrap();

        let (reread, _) = MetadataFile::read(&path, Some("two"), &config).unwrap();
        assert_eq!(reread.time_series().unwrap().number_of_samples, 99);
        assert_eq!(reread.section_3.get().unwrap().recording_time_offset, 77);
    }

    #[test]
    fn test_metadata_exists() {
        let temp_dir = TempDir::new().unwrap();
        let segment = segment_dir(temp_dir.path());
        let write = || {
            write_ts_metadata(
                &segment,
                &Credentials::unencrypted(),
                0,
                1,
                TimeSeriesSection2::with_sampling(100.0, 0),
                Section3::default(),
                &MefConfig::default(),
            )
        };
        write().unwrap();
        assert!(matches!(write(), Err(MefError::FileExists { .. })));
    }
}

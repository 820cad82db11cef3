//! Record data (`.rdat`) and record index (`.ridx`) files.
//!
//! Records are typed annotations attached to a session, channel or segment.
//! Each record in `.rdat` is a 24-byte header followed by a body padded to
//! 16 bytes:
//!
//! ```text
//! Offset  Size  Field
//! ------  ----  -----
//! 0x00    4     record_crc (CRC32 of bytes 4..24+body)
//! 0x04    5     type string ("Note", "SyLg", "EDFA", "LNTP", ...) + NUL
//! 0x09    1     version_major
//! 0x0A    1     version_minor
//! 0x0B    1     encryption level (i8)
//! 0x0C    4     body bytes (u32, multiple of 16)
//! 0x10    8     time (i64)
//! ```
//!
//! `.ridx` holds one 24-byte entry per record: type string, versions,
//! encryption, `file_offset` (i64) and time (i64).
//!
//! Bodies are decoded through a [`RecordRegistry`] keyed by type code;
//! unregistered types come back as [`RecordBody::Unknown`].

use crate::access::{Credentials, EncryptionLevel, PasswordData, ENCRYPTION_BLOCK_BYTES};
use crate::config::{CrcMode, FailBehavior, MefConfig};
use crate::error::{MefError, Result};
use crate::format::header::{FileType, UniversalHeader, UNIVERSAL_HEADER_BYTES};
use crate::format::{get_i64, get_str, get_u32, put, Timestamp};
use crate::path::{MefPath, MefPathKind};
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::{debug, warn};

/// Record header size in bytes.
pub const RECORD_HEADER_BYTES: usize = 24;

/// Record index entry size in bytes.
pub const RECORD_INDEX_ENTRY_BYTES: usize = 24;

/// Type code of free text notes.
pub const NOTE_TYPE: [u8; 4] = *b"Note";
/// Type code of system log entries.
pub const SYSTEM_LOG_TYPE: [u8; 4] = *b"SyLg";
/// Type code of EDF+ annotations.
pub const EDF_ANNOTATION_TYPE: [u8; 4] = *b"EDFA";
/// Type code of line noise templates.
pub const LINE_NOISE_TEMPLATE_TYPE: [u8; 4] = *b"LNTP";

/// Decoded record body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordBody {
    /// Free text note.
    Note(String),
    /// System log line.
    SystemLog(String),
    /// EDF+ annotation with a duration in µs.
    EdfAnnotation {
        /// Annotation duration (µs).
        duration: i64,
        /// Annotation text.
        text: String,
    },
    /// Line noise template samples.
    LineNoiseTemplate(Vec<i32>),
    /// Body of an unregistered type, as stored.
    Unknown(Vec<u8>),
    /// Body the caller's password cannot decrypt.
    Encrypted,
}

/// One record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Four character type code.
    pub type_code: [u8; 4],
    /// Record type major version.
    pub version_major: u8,
    /// Record type minor version.
    pub version_minor: u8,
    /// Encryption marker; negative once decrypted.
    pub encryption: EncryptionLevel,
    /// Record time.
    pub time: Timestamp,
    /// Body.
    pub body: RecordBody,
}

impl Record {
    fn typed(type_code: [u8; 4], time: Timestamp, body: RecordBody) -> Self {
        Self {
            type_code,
            version_major: 1,
            version_minor: 0,
            encryption: EncryptionLevel::None,
            time,
            body,
        }
    }

    /// A free text note.
    pub fn note(time: Timestamp, text: impl Into<String>) -> Self {
        Self::typed(NOTE_TYPE, time, RecordBody::Note(text.into()))
    }

    /// A system log line.
    pub fn system_log(time: Timestamp, text: impl Into<String>) -> Self {
        Self::typed(SYSTEM_LOG_TYPE, time, RecordBody::SystemLog(text.into()))
    }

    /// An EDF+ annotation.
    pub fn edf_annotation(time: Timestamp, duration: i64, text: impl Into<String>) -> Self {
        Self::typed(
            EDF_ANNOTATION_TYPE,
            time,
            RecordBody::EdfAnnotation {
                duration,
                text: text.into(),
            },
        )
    }

    /// A line noise template.
    pub fn line_noise_template(time: Timestamp, template: Vec<i32>) -> Self {
        Self::typed(
            LINE_NOISE_TEMPLATE_TYPE,
            time,
            RecordBody::LineNoiseTemplate(template),
        )
    }

    /// Sets the encryption level used when writing.
    pub fn with_encryption(mut self, level: EncryptionLevel) -> Self {
        self.encryption = level;
        self
    }

    /// Type code as text.
    pub fn type_name(&self) -> String {
        String::from_utf8_lossy(&self.type_code).into_owned()
    }
}

/// Serializes a body. `None` if the body does not belong to the type.
pub type RecordEncoder = fn(&RecordBody) -> Option<Vec<u8>>;

/// Parses a decrypted, padded body.
pub type RecordDecoder = fn(&[u8]) -> Result<RecordBody>;

/// Encoder/decoder pair for one record type.
#[derive(Debug, Clone, Copy)]
pub struct RecordCodec {
    /// Body encoder.
    pub encode: RecordEncoder,
    /// Body decoder.
    pub decode: RecordDecoder,
}

fn text_bytes(text: &str) -> Vec<u8> {
    let mut bytes = text.as_bytes().to_vec();
    bytes.push(0);
    bytes
}

fn encode_note(body: &RecordBody) -> Option<Vec<u8>> {
    match body {
        RecordBody::Note(text) => Some(text_bytes(text)),
        _ => None,
    }
}

fn decode_note(bytes: &[u8]) -> Result<RecordBody> {
    Ok(RecordBody::Note(get_str(bytes)))
}

fn encode_system_log(body: &RecordBody) -> Option<Vec<u8>> {
    match body {
        RecordBody::SystemLog(text) => Some(text_bytes(text)),
        _ => None,
    }
}

fn decode_system_log(bytes: &[u8]) -> Result<RecordBody> {
    Ok(RecordBody::SystemLog(get_str(bytes)))
}

fn encode_edf_annotation(body: &RecordBody) -> Option<Vec<u8>> {
    match body {
        RecordBody::EdfAnnotation { duration, text } => {
            let mut bytes = duration.to_le_bytes().to_vec();
            bytes.extend_from_slice(&text_bytes(text));
            Some(bytes)
        }
        _ => None,
    }
}

fn decode_edf_annotation(bytes: &[u8]) -> Result<RecordBody> {
    if bytes.len() < 8 {
        return Err(MefError::InvalidRecord("EDFA body shorter than 8 bytes".into()));
    }
    Ok(RecordBody::EdfAnnotation {
        duration: get_i64(bytes, 0),
        text: get_str(&bytes[8..]),
    })
}

fn encode_line_noise_template(body: &RecordBody) -> Option<Vec<u8>> {
    match body {
        RecordBody::LineNoiseTemplate(template) => {
            let mut bytes = (template.len() as i64).to_le_bytes().to_vec();
            for value in template {
                bytes.extend_from_slice(&value.to_le_bytes());
            }
            Some(bytes)
        }
        _ => None,
    }
}

fn decode_line_noise_template(bytes: &[u8]) -> Result<RecordBody> {
    if bytes.len() < 8 {
        return Err(MefError::InvalidRecord("LNTP body shorter than 8 bytes".into()));
    }
    let length = usize::try_from(get_i64(bytes, 0))
        .map_err(|_| MefError::InvalidRecord("negative LNTP template length".into()))?;
    let values = bytes[8..]
        .get(..length.saturating_mul(4))
        .ok_or_else(|| MefError::InvalidRecord("LNTP template truncated".into()))?;
    Ok(RecordBody::LineNoiseTemplate(
        values
            .chunks_exact(4)
            .map(|chunk| i32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect(),
    ))
}

/// Maps record type codes to their codecs.
#[derive(Debug, Clone, Default)]
pub struct RecordRegistry {
    codecs: HashMap<[u8; 4], RecordCodec>,
}

impl RecordRegistry {
    /// An empty registry: every body decodes as [`RecordBody::Unknown`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in `Note`, `SyLg`, `EDFA` and `LNTP` types.
    pub fn standard() -> Self {
        let mut codecs = HashMap::new();
        codecs.insert(
            NOTE_TYPE,
            RecordCodec {
                encode: encode_note,
                decode: decode_note,
            },
        );
        codecs.insert(
            SYSTEM_LOG_TYPE,
            RecordCodec {
                encode: encode_system_log,
                decode: decode_system_log,
            },
        );
        codecs.insert(
            EDF_ANNOTATION_TYPE,
            RecordCodec {
                encode: encode_edf_annotation,
                decode: decode_edf_annotation,
            },
        );
        codecs.insert(
            LINE_NOISE_TEMPLATE_TYPE,
            RecordCodec {
                encode: encode_line_noise_template,
                decode: decode_line_noise_template,
            },
        );
        Self { codecs }
    }

    /// Registers a codec for `type_code`.
    ///
    /// # Errors
    ///
    /// Returns `MefError::InvalidRecord` if the type is already registered.
    pub fn register(&mut self, type_code: [u8; 4], codec: RecordCodec) -> Result<()> {
        if self.codecs.contains_key(&type_code) {
            return Err(MefError::InvalidRecord(format!(
                "record type {} already registered",
                String::from_utf8_lossy(&type_code)
            )));
        }
        self.codecs.insert(type_code, codec);
        Ok(())
    }

    /// Returns true if `type_code` has a codec.
    pub fn contains(&self, type_code: &[u8; 4]) -> bool {
        self.codecs.contains_key(type_code)
    }

    fn encode_body(&self, record: &Record) -> Result<Vec<u8>> {
        if let RecordBody::Unknown(bytes) = &record.body {
            return Ok(bytes.clone());
        }
        self.codecs
            .get(&record.type_code)
            .and_then(|codec| (codec.encode)(&record.body))
            .ok_or_else(|| {
                MefError::InvalidRecord(format!(
                    "cannot encode {:?} as {}",
                    record.body,
                    record.type_name()
                ))
            })
    }

    fn decode_body(&self, type_code: &[u8; 4], bytes: &[u8]) -> Result<RecordBody> {
        match self.codecs.get(type_code) {
            Some(codec) => (codec.decode)(bytes),
            None => Ok(RecordBody::Unknown(bytes.to_vec())),
        }
    }
}

fn padded(mut bytes: Vec<u8>) -> Vec<u8> {
    let len = bytes.len().div_ceil(ENCRYPTION_BLOCK_BYTES) * ENCRYPTION_BLOCK_BYTES;
    bytes.resize(len, 0);
    bytes
}

fn level_header(dir: &MefPath, file_type: FileType) -> Result<UniversalHeader> {
    let mut header = UniversalHeader::new(file_type);
    match dir.kind {
        MefPathKind::Session => header.session_name = dir.name.clone(),
        MefPathKind::TimeSeriesChannel => {
            header.channel_name = dir.name.clone();
            if let Ok(session) = MefPath::parse(&dir.parent) {
                header.session_name = session.name;
            }
        }
        MefPathKind::Segment => {
            let location = dir.segment_location()?;
            header.segment_number = location.segment_number;
            header.channel_name = location.channel_name;
            header.session_name = location.session_name;
        }
    }
    Ok(header)
}

/// Writes `records` into the `.rdat`/`.ridx` pair of a session, channel or
/// segment directory, replacing existing record files.
///
/// Records whose encryption level is positive are encrypted with the
/// matching key from `credentials`.
///
/// # Errors
///
/// Returns `MefError::Path` for a malformed directory,
/// `MefError::InvalidRecord` for a body that does not match its type and
/// `MefError::AccessDenied` if `credentials` lack a required key.
pub fn write_records(
    dir: &Path,
    credentials: &Credentials,
    start_time: Timestamp,
    end_time: Timestamp,
    records: &[Record],
    _config: &MefConfig,
) -> Result<()> {
    let dir = MefPath::parse(dir)?;
    fs::create_dir_all(&dir.path)?;
    let registry = RecordRegistry::standard();
    let access = credentials.password_data();

    let mut data = Vec::new();
    let mut index = Vec::with_capacity(records.len() * RECORD_INDEX_ENTRY_BYTES);
    let mut maximum_entry_size = 0usize;

    for record in records {
        let level = record.encryption.encrypted();
        let mut body = padded(registry.encode_body(record)?);
        access.encrypt(level, &mut body)?;

        let mut header = [0u8; RECORD_HEADER_BYTES];
        put(&mut header, 4, &record.type_code);
        header[9] = record.version_major;
        header[10] = record.version_minor;
        header[11] = level.as_i8() as u8;
        put(&mut header, 12, &(body.len() as u32).to_le_bytes());
        put(&mut header, 16, &record.time.to_le_bytes());
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&header[4..]);
        hasher.update(&body);
        put(&mut header, 0, &hasher.finalize().to_le_bytes());

        let file_offset = (UNIVERSAL_HEADER_BYTES + data.len()) as i64;
        let mut entry = [0u8; RECORD_INDEX_ENTRY_BYTES];
        put(&mut entry, 0, &record.type_code);
        entry[5] = record.version_major;
        entry[6] = record.version_minor;
        entry[7] = level.as_i8() as u8;
        put(&mut entry, 8, &file_offset.to_le_bytes());
        put(&mut entry, 16, &record.time.to_le_bytes());
        index.extend_from_slice(&entry);

        maximum_entry_size = maximum_entry_size.max(RECORD_HEADER_BYTES + body.len());
        data.extend_from_slice(&header);
        data.extend_from_slice(&body);
    }

    let mut data_header = level_header(&dir, FileType::RecordData)?;
    data_header.start_time = start_time;
    data_header.end_time = end_time;
    data_header.validation = credentials.validation_fields();
    data_header.number_of_entries = records.len() as i64;
    data_header.maximum_entry_size = maximum_entry_size as i64;
    data_header.body_crc = crc32fast::hash(&data);

    let mut index_header = data_header.sibling(FileType::RecordIndex);
    index_header.number_of_entries = records.len() as i64;
    index_header.maximum_entry_size = RECORD_INDEX_ENTRY_BYTES as i64;
    index_header.body_crc = crc32fast::hash(&index);

    let (rdat_path, ridx_path) = dir.record_paths();
    for (path, header, body) in [
        (&rdat_path, &data_header, &data),
        (&ridx_path, &index_header, &index),
    ] {
        let mut writer = BufWriter::new(File::create(path)?);
        header.write_to(&mut writer)?;
        writer.write_all(body)?;
        writer.flush()?;
    }
    debug!("Wrote {} records to {}", records.len(), rdat_path.display());
    Ok(())
}

/// Reads records with the built-in registry.
///
/// # Errors
///
/// See [`read_records_with`].
pub fn read_records(dir: &Path, password: Option<&str>, config: &MefConfig) -> Result<Vec<Record>> {
    read_records_with(dir, password, &RecordRegistry::standard(), config)
}

fn read_checked(path: &Path, file_type: FileType) -> Result<(UniversalHeader, Vec<u8>)> {
    if !path.exists() {
        return Err(MefError::FileMissing {
            path: path.to_path_buf(),
        });
    }
    let bytes = fs::read(path)?;
    let header = UniversalHeader::decode(&bytes)?;
    header.expect_type(file_type)?;
    let body = bytes[UNIVERSAL_HEADER_BYTES..].to_vec();
    let actual = crc32fast::hash(&body);
    if actual != header.body_crc {
        return Err(MefError::ChecksumMismatch {
            expected: header.body_crc,
            actual,
        });
    }
    Ok((header, body))
}

/// Reads the records of a session, channel or segment directory.
///
/// Records above the caller's access level are returned with a
/// [`RecordBody::Encrypted`] body. Records failing their CRC are skipped
/// with a warning unless CRC checks are disabled.
///
/// # Errors
///
/// Returns `MefError::FileMissing` if either record file is absent and
/// `MefError::ChecksumMismatch` if a file body is corrupt.
pub fn read_records_with(
    dir: &Path,
    password: Option<&str>,
    registry: &RecordRegistry,
    config: &MefConfig,
) -> Result<Vec<Record>> {
    let dir = MefPath::parse(dir)?;
    let (rdat_path, ridx_path) = dir.record_paths();
    let (data_header, data) = read_checked(&rdat_path, FileType::RecordData)?;
    let (_, index) = read_checked(&ridx_path, FileType::RecordIndex)?;
    let access = PasswordData::process(&data_header.validation, password);

    let mut records = Vec::with_capacity(index.len() / RECORD_INDEX_ENTRY_BYTES);
    for entry in index.chunks_exact(RECORD_INDEX_ENTRY_BYTES) {
        let offset = usize::try_from(get_i64(entry, 8))
            .ok()
            .and_then(|o| o.checked_sub(UNIVERSAL_HEADER_BYTES))
            .filter(|&o| o + RECORD_HEADER_BYTES <= data.len())
            .ok_or_else(|| MefError::InvalidRecord("record offset outside data file".into()))?;
        let header = &data[offset..offset + RECORD_HEADER_BYTES];
        let body_bytes = get_u32(header, 12) as usize;
        let body_end = offset + RECORD_HEADER_BYTES + body_bytes;
        if body_end > data.len() {
            return Err(MefError::InvalidRecord("record body outside data file".into()));
        }

        if config.crc_mode == CrcMode::Validate {
            let stored = get_u32(header, 0);
            let actual = crc32fast::hash(&data[offset + 4..body_end]);
            if stored != actual {
                let offset = offset + UNIVERSAL_HEADER_BYTES;
                match config.behavior_on_fail {
                    FailBehavior::Return => {
                        warn!("Record at offset {} failed CRC check, skipping", offset)
                    }
                    FailBehavior::Suppress => {
                        debug!("Record at offset {} failed CRC check, skipping", offset)
                    }
                }
                continue;
            }
        }

        let mut type_code = [0u8; 4];
        type_code.copy_from_slice(&header[4..8]);
        let raw_level = header[11] as i8;
        let level = EncryptionLevel::from_i8(raw_level).ok_or_else(|| {
            MefError::InvalidRecord(format!("unknown record encryption level {}", raw_level))
        })?;
        let mut body = data[offset + RECORD_HEADER_BYTES..body_end].to_vec();

        let (encryption, body) = if level.is_encrypted() && !access.can_decrypt(level) {
            (level, RecordBody::Encrypted)
        } else {
            access.decrypt(level, &mut body)?;
            (level.decrypted(), registry.decode_body(&type_code, &body)?)
        };
        records.push(Record {
            type_code,
            version_major: header[9],
            version_minor: header[10],
            encryption,
            time: get_i64(header, 16),
            body,
        });
    }
    debug!("Read {} records from {}", records.len(), rdat_path.display());
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_body_padding() {
        assert_eq!(padded(vec![1; 5]).len(), 16);
        assert_eq!(padded(vec![1; 16]).len(), 16);
        assert_eq!(padded(vec![1; 17]).len(), 32);
    }

    #[test]
    fn test_standard_codecs() {
        let registry = RecordRegistry::standard();
        let records = [
            Record::note(1, "seizure onset"),
            Record::system_log(2, "amplifier restarted"),
            Record::edf_annotation(3, 1_500_000, "eyes closed"),
            Record::line_noise_template(4, vec![-3, 0, 3, 0]),
        ];
        for record in &records {
            let bytes = padded(registry.encode_body(record).unwrap());
            let body = registry.decode_body(&record.type_code, &bytes).unwrap();
            assert_eq!(body, record.body);
        }
    }

    #[test]
    fn test_unregistered_type_is_unknown() {
        let registry = RecordRegistry::new();
        let body = registry.decode_body(b"Seiz", &[1, 2, 3]).unwrap();
        assert_eq!(body, RecordBody::Unknown(vec![1, 2, 3]));
    }

    #[test]
    fn test_duplicate_registration() {
        let mut registry = RecordRegistry::standard();
        let codec = RecordCodec {
            encode: encode_note,
            decode: decode_note,
        };
        assert!(registry.register(NOTE_TYPE, codec).is_err());
        assert!(registry.register(*b"Curs", codec).is_ok());
        assert!(registry.contains(b"Curs"));
    }

    #[test]
    fn test_mismatched_body_rejected() {
        let registry = RecordRegistry::standard();
        let mut record = Record::note(0, "x");
        record.type_code = EDF_ANNOTATION_TYPE;
        assert!(matches!(
            registry.encode_body(&record),
            Err(MefError::InvalidRecord(_))
        ));
    }

    #[test]
    fn test_corrupt_record_skipped_for_any_fail_behavior() {
        let temp_dir = TempDir::new().unwrap();
        let session = temp_dir.path().join("rec.mefd");
        let records = [
            Record::note(10, "first"),
            Record::system_log(20, "second"),
        ];
        for behavior in [FailBehavior::Return, FailBehavior::Suppress] {
            let config = MefConfig::default().with_behavior_on_fail(behavior);
            write_records(&session, &Credentials::unencrypted(), 10, 20, &records, &config)
                .unwrap();

            // Damage the first body, then refresh the file-level CRCs so only
            // the record CRC catches it.
            let (rdat, _) = MefPath::parse(&session).unwrap().record_paths();
            let bytes = fs::read(&rdat).unwrap();
            let mut header = UniversalHeader::decode(&bytes).unwrap();
            let mut body = bytes[UNIVERSAL_HEADER_BYTES..].to_vec();
            body[RECORD_HEADER_BYTES] ^= 0x20;
            header.body_crc = crc32fast::hash(&body);
            let mut rewritten = header.encode().to_vec();
            rewritten.extend_from_slice(&body);
            fs::write(&rdat, rewritten).unwrap();

            let read = read_records(&session, None, &config).unwrap();
            assert_eq!(read.len(), 1);
            assert_eq!(read[0].body, RecordBody::SystemLog("second".into()));
        }
    }
}

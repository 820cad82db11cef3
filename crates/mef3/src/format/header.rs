//! Universal header shared by every MEF file.
//!
//! ## Layout
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │  0x000  header_crc u32   (CRC of bytes 4..1024)              │
//! │  0x004  body_crc u32     (CRC of everything after header)    │
//! │  0x008  file type "tmet"/"tdat"/... + NUL (5 bytes)          │
//! │  0x00D  version major u8, minor u8, byte order u8            │
//! │  0x010  start_time i64, end_time i64                         │
//! │  0x020  number_of_entries i64, maximum_entry_size i64        │
//! │  0x030  segment_number i32                                   │
//! │  0x034  channel / session / anonymized names (3 x 256)       │
//! │  0x334  level / file / provenance UUIDs (3 x 16)             │
//! │  0x364  level-1 / level-2 password validation (2 x 16)       │
//! │  0x384  protected + discretionary regions (zero)             │
//! └──────────────────────────────────────────────────────────────┘
//! ```

use crate::access::ValidationFields;
use crate::error::{MefError, Result};
use crate::format::{get_i32, get_i64, get_str, get_u32, put, put_str, Timestamp, UUTC_NO_ENTRY};
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

/// Universal header size in bytes.
pub const UNIVERSAL_HEADER_BYTES: usize = 1024;

/// Supported major format version.
pub const MEF_VERSION_MAJOR: u8 = 3;

/// Written minor format version.
pub const MEF_VERSION_MINOR: u8 = 0;

/// Byte order code for little-endian files.
pub const LITTLE_ENDIAN_CODE: u8 = 1;

/// Segment number "no entry" value (session and channel level files).
pub const SEGMENT_NUMBER_NO_ENTRY: i32 = -1;

const NAME_BYTES: usize = 256;
const UUID_BYTES: usize = 16;

const TYPE_OFFSET: usize = 8;
const CHANNEL_NAME_OFFSET: usize = 52;
const SESSION_NAME_OFFSET: usize = CHANNEL_NAME_OFFSET + NAME_BYTES;
const ANONYMIZED_NAME_OFFSET: usize = SESSION_NAME_OFFSET + NAME_BYTES;
const LEVEL_UUID_OFFSET: usize = ANONYMIZED_NAME_OFFSET + NAME_BYTES;
const FILE_UUID_OFFSET: usize = LEVEL_UUID_OFFSET + UUID_BYTES;
const PROVENANCE_UUID_OFFSET: usize = FILE_UUID_OFFSET + UUID_BYTES;
const LEVEL_1_VALIDATION_OFFSET: usize = PROVENANCE_UUID_OFFSET + UUID_BYTES;
const LEVEL_2_VALIDATION_OFFSET: usize = LEVEL_1_VALIDATION_OFFSET + 16;

/// Kind of MEF file, identified by its four character type string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileType {
    /// Time-series metadata (`tmet`).
    TimeSeriesMetadata,
    /// Time-series data blocks (`tdat`).
    TimeSeriesData,
    /// Time-series block index (`tidx`).
    TimeSeriesIndex,
    /// Record data (`rdat`).
    RecordData,
    /// Record index (`ridx`).
    RecordIndex,
}

impl FileType {
    /// Four character type code, also used as the file extension.
    pub fn code(self) -> &'static str {
        match self {
            Self::TimeSeriesMetadata => "tmet",
            Self::TimeSeriesData => "tdat",
            Self::TimeSeriesIndex => "tidx",
            Self::RecordData => "rdat",
            Self::RecordIndex => "ridx",
        }
    }

    /// Parses a type code.
    pub fn from_code(code: &[u8; 4]) -> Option<Self> {
        match code {
            b"tmet" => Some(Self::TimeSeriesMetadata),
            b"tdat" => Some(Self::TimeSeriesData),
            b"tidx" => Some(Self::TimeSeriesIndex),
            b"rdat" => Some(Self::RecordData),
            b"ridx" => Some(Self::RecordIndex),
            _ => None,
        }
    }
}

/// The 1024-byte header at the start of every MEF file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniversalHeader {
    /// CRC of header bytes 4..1024, as read or last encoded.
    pub header_crc: u32,
    /// CRC of the file body.
    pub body_crc: u32,
    /// File type.
    pub file_type: FileType,
    /// Major format version.
    pub version_major: u8,
    /// Minor format version.
    pub version_minor: u8,
    /// Byte order code.
    pub byte_order_code: u8,
    /// Earliest time covered by the file (stored form).
    pub start_time: Timestamp,
    /// Latest time covered by the file (stored form).
    pub end_time: Timestamp,
    /// Number of entries (blocks, index entries, records).
    pub number_of_entries: i64,
    /// Largest entry in bytes.
    pub maximum_entry_size: i64,
    /// Segment number, or [`SEGMENT_NUMBER_NO_ENTRY`].
    pub segment_number: i32,
    /// Channel name.
    pub channel_name: String,
    /// Session name.
    pub session_name: String,
    /// Anonymized subject name.
    pub anonymized_name: String,
    /// UUID shared by all files of one level (segment, channel, session).
    pub level_uuid: [u8; 16],
    /// UUID of this file.
    pub file_uuid: [u8; 16],
    /// UUID of the file this one was derived from.
    pub provenance_uuid: [u8; 16],
    /// Password validation fields.
    pub validation: ValidationFields,
}

impl UniversalHeader {
    /// Creates a header for a new file with fresh UUIDs.
    pub fn new(file_type: FileType) -> Self {
        let file_uuid = *uuid::Uuid::new_v4().as_bytes();
        Self {
            header_crc: 0,
            body_crc: 0,
            file_type,
            version_major: MEF_VERSION_MAJOR,
            version_minor: MEF_VERSION_MINOR,
            byte_order_code: LITTLE_ENDIAN_CODE,
            start_time: UUTC_NO_ENTRY,
            end_time: UUTC_NO_ENTRY,
            number_of_entries: 0,
            maximum_entry_size: 0,
            segment_number: SEGMENT_NUMBER_NO_ENTRY,
            channel_name: String::new(),
            session_name: String::new(),
            anonymized_name: String::new(),
            level_uuid: *uuid::Uuid::new_v4().as_bytes(),
            file_uuid,
            provenance_uuid: file_uuid,
            validation: ValidationFields::default(),
        }
    }

    /// Creates a header for a sibling file: same identity, names, times and
    /// validation fields, a new file UUID and empty counters.
    pub fn sibling(&self, file_type: FileType) -> Self {
        let file_uuid = *uuid::Uuid::new_v4().as_bytes();
        Self {
            header_crc: 0,
            body_crc: 0,
            file_type,
            number_of_entries: 0,
            maximum_entry_size: 0,
            file_uuid,
            provenance_uuid: file_uuid,
            ..self.clone()
        }
    }

    /// Encodes the header. The returned bytes carry a freshly computed
    /// header CRC.
    pub fn encode(&self) -> [u8; UNIVERSAL_HEADER_BYTES] {
        let mut buf = [0u8; UNIVERSAL_HEADER_BYTES];
        put(&mut buf, 4, &self.body_crc.to_le_bytes());
        put(&mut buf, TYPE_OFFSET, self.file_type.code().as_bytes());
        buf[13] = self.version_major;
        buf[14] = self.version_minor;
        buf[15] = self.byte_order_code;
        put(&mut buf, 16, &self.start_time.to_le_bytes());
        put(&mut buf, 24, &self.end_time.to_le_bytes());
        put(&mut buf, 32, &self.number_of_entries.to_le_bytes());
        put(&mut buf, 40, &self.maximum_entry_size.to_le_bytes());
        put(&mut buf, 48, &self.segment_number.to_le_bytes());
        put_str(
            &mut buf[CHANNEL_NAME_OFFSET..CHANNEL_NAME_OFFSET + NAME_BYTES],
            &self.channel_name,
        );
        put_str(
            &mut buf[SESSION_NAME_OFFSET..SESSION_NAME_OFFSET + NAME_BYTES],
            &self.session_name,
        );
        put_str(
            &mut buf[ANONYMIZED_NAME_OFFSET..ANONYMIZED_NAME_OFFSET + NAME_BYTES],
            &self.anonymized_name,
        );
        put(&mut buf, LEVEL_UUID_OFFSET, &self.level_uuid);
        put(&mut buf, FILE_UUID_OFFSET, &self.file_uuid);
        put(&mut buf, PROVENANCE_UUID_OFFSET, &self.provenance_uuid);
        put(&mut buf, LEVEL_1_VALIDATION_OFFSET, &self.validation.level_1);
        put(&mut buf, LEVEL_2_VALIDATION_OFFSET, &self.validation.level_2);

        let crc = crc32fast::hash(&buf[4..]);
        put(&mut buf, 0, &crc.to_le_bytes());
        buf
    }

    /// Writes the encoded header.
    ///
    /// # Errors
    ///
    /// Returns an error if writing fails.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(&self.encode())?;
        Ok(())
    }

    /// Decodes and validates a header.
    ///
    /// # Errors
    ///
    /// Returns `MefError::ChecksumMismatch` if the header CRC is wrong,
    /// `MefError::InvalidFileType` for an unknown type string and
    /// `MefError::UnsupportedVersion` for a major version other than 3.
    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < UNIVERSAL_HEADER_BYTES {
            return Err(MefError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "truncated universal header",
            )));
        }
        let buf = &buf[..UNIVERSAL_HEADER_BYTES];

        let header_crc = get_u32(buf, 0);
        let actual = crc32fast::hash(&buf[4..]);
        if actual != header_crc {
            return Err(MefError::ChecksumMismatch {
                expected: header_crc,
                actual,
            });
        }

        let mut code = [0u8; 4];
        code.copy_from_slice(&buf[TYPE_OFFSET..TYPE_OFFSET + 4]);
        let file_type = FileType::from_code(&code).ok_or(MefError::InvalidFileType {
            expected: "MEF file type",
            actual: code,
        })?;

        let (version_major, version_minor) = (buf[13], buf[14]);
        if version_major != MEF_VERSION_MAJOR {
            return Err(MefError::UnsupportedVersion {
                major: version_major,
                minor: version_minor,
            });
        }

        let uuid_at = |offset: usize| {
            let mut uuid = [0u8; 16];
            uuid.copy_from_slice(&buf[offset..offset + 16]);
            uuid
        };
        let level_uuid = uuid_at(LEVEL_UUID_OFFSET);
        let file_uuid = uuid_at(FILE_UUID_OFFSET);
        let provenance_uuid = uuid_at(PROVENANCE_UUID_OFFSET);
        let validation = ValidationFields {
            level_1: uuid_at(LEVEL_1_VALIDATION_OFFSET),
            level_2: uuid_at(LEVEL_2_VALIDATION_OFFSET),
        };

        Ok(Self {
            header_crc,
            body_crc: get_u32(buf, 4),
            file_type,
            version_major,
            version_minor,
            byte_order_code: buf[15],
            start_time: get_i64(buf, 16),
            end_time: get_i64(buf, 24),
            number_of_entries: get_i64(buf, 32),
            maximum_entry_size: get_i64(buf, 40),
            segment_number: get_i32(buf, 48),
            channel_name: get_str(&buf[CHANNEL_NAME_OFFSET..CHANNEL_NAME_OFFSET + NAME_BYTES]),
            session_name: get_str(&buf[SESSION_NAME_OFFSET..SESSION_NAME_OFFSET + NAME_BYTES]),
            anonymized_name: get_str(
                &buf[ANONYMIZED_NAME_OFFSET..ANONYMIZED_NAME_OFFSET + NAME_BYTES],
            ),
            level_uuid,
            file_uuid,
            provenance_uuid,
            validation,
        })
    }

    /// Reads and validates a header.
    ///
    /// # Errors
    ///
    /// See [`UniversalHeader::decode`].
    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self> {
        let mut buf = [0u8; UNIVERSAL_HEADER_BYTES];
        reader.read_exact(&mut buf)?;
        Self::decode(&buf)
    }

    /// Reads the header at the start of `path`.
    ///
    /// # Errors
    ///
    /// Returns `MefError::FileMissing` if the file does not exist.
    pub fn read_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(MefError::FileMissing {
                path: path.to_path_buf(),
            });
        }
        let mut file = File::open(path)?;
        Self::read_from(&mut file)
    }

    /// Fails unless the header has the expected file type.
    ///
    /// # Errors
    ///
    /// Returns `MefError::InvalidFileType` on mismatch.
    pub fn expect_type(&self, file_type: FileType) -> Result<()> {
        if self.file_type != file_type {
            let mut actual = [0u8; 4];
            actual.copy_from_slice(self.file_type.code().as_bytes());
            return Err(MefError::InvalidFileType {
                expected: file_type.code(),
                actual,
            });
        }
        Ok(())
    }
}

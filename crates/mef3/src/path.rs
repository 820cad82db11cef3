//! Session / channel / segment directory naming.
//!
//! ```text
//! <session>.mefd/
//!   <session>.rdat, <session>.ridx            (optional records)
//!   <channel>.timd/
//!     <channel>-000000.segd/
//!       <channel>-000000.tmet / .tdat / .tidx
//! ```

use crate::error::{MefError, Result};
use crate::format::header::FileType;
use std::path::{Path, PathBuf};

/// Session directory suffix.
pub const SESSION_EXTENSION: &str = "mefd";

/// Time-series channel directory suffix.
pub const TIME_SERIES_CHANNEL_EXTENSION: &str = "timd";

/// Segment directory suffix.
pub const SEGMENT_EXTENSION: &str = "segd";

/// Width of the zero-padded segment number.
pub const SEGMENT_NUMBER_DIGITS: usize = 6;

/// Level of a MEF directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MefPathKind {
    /// `.mefd` session directory.
    Session,
    /// `.timd` time-series channel directory.
    TimeSeriesChannel,
    /// `.segd` segment directory.
    Segment,
}

/// A parsed MEF directory path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MefPath {
    /// The full path.
    pub path: PathBuf,
    /// Enclosing directory.
    pub parent: PathBuf,
    /// Directory name without suffix.
    pub name: String,
    /// Directory level.
    pub kind: MefPathKind,
}

/// Everything needed to address the files of one segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentLocation {
    /// Segment directory.
    pub segment_dir: PathBuf,
    /// Segment name (`<channel>-NNNNNN`).
    pub segment_name: String,
    /// Parsed segment number.
    pub segment_number: i32,
    /// Owning channel name.
    pub channel_name: String,
    /// Owning session name.
    pub session_name: String,
}

impl SegmentLocation {
    /// Path of the segment's file of type `file_type`.
    pub fn file_path(&self, file_type: FileType) -> PathBuf {
        self.segment_dir
            .join(format!("{}.{}", self.segment_name, file_type.code()))
    }
}

fn split_name(path: &Path) -> Result<(String, Option<String>)> {
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| MefError::Path(format!("{} has no usable name", path.display())))?;
    match file_name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => Ok((stem.to_string(), Some(ext.to_string()))),
        _ => Ok((file_name.to_string(), None)),
    }
}

impl MefPath {
    /// Parses a session, channel or segment directory path.
    ///
    /// # Errors
    ///
    /// Returns `MefError::Path` if the suffix is not `.mefd`, `.timd` or
    /// `.segd`.
    pub fn parse(path: &Path) -> Result<Self> {
        let (name, extension) = split_name(path)?;
        let kind = match extension.as_deref() {
            Some(SESSION_EXTENSION) => MefPathKind::Session,
            Some(TIME_SERIES_CHANNEL_EXTENSION) => MefPathKind::TimeSeriesChannel,
            Some(SEGMENT_EXTENSION) => MefPathKind::Segment,
            _ => {
                return Err(MefError::Path(format!(
                    "{} is not a session, channel or segment directory",
                    path.display()
                )))
            }
        };
        Ok(Self {
            path: path.to_path_buf(),
            parent: path.parent().map(Path::to_path_buf).unwrap_or_default(),
            name,
            kind,
        })
    }

    /// Segment number from the `-NNNNNN` suffix of a segment name.
    ///
    /// # Errors
    ///
    /// Returns `MefError::Path` if this is not a segment or the suffix is
    /// missing or not numeric.
    pub fn segment_number(&self) -> Result<i32> {
        if self.kind != MefPathKind::Segment {
            return Err(MefError::Path(format!(
                "{} is not a segment directory",
                self.path.display()
            )));
        }
        let digits = self
            .name
            .rsplit_once('-')
            .map(|(_, digits)| digits)
            .filter(|d| !d.is_empty() && d.bytes().all(|b| b.is_ascii_digit()))
            .ok_or_else(|| {
                MefError::Path(format!(
                    "segment name {} lacks a -NNNNNN number",
                    self.name
                ))
            })?;
        digits
            .parse()
            .map_err(|_| MefError::Path(format!("segment number {} out of range", digits)))
    }

    /// Resolves the channel and session owning a segment directory.
    ///
    /// # Errors
    ///
    /// Returns `MefError::Path` if this is not a segment inside a `.timd`
    /// channel directory.
    pub fn segment_location(&self) -> Result<SegmentLocation> {
        let segment_number = self.segment_number()?;
        let channel = MefPath::parse(&self.parent)?;
        if channel.kind != MefPathKind::TimeSeriesChannel {
            return Err(MefError::Path(format!(
                "{} is not inside a time series channel",
                self.path.display()
            )));
        }
        let session_name = if channel.parent.as_os_str().is_empty() {
            String::new()
        } else {
            split_name(&channel.parent)?.0
        };
        Ok(SegmentLocation {
            segment_dir: self.path.clone(),
            segment_name: self.name.clone(),
            segment_number,
            channel_name: channel.name,
            session_name,
        })
    }

    /// Record data and index paths stored directly inside this directory.
    pub fn record_paths(&self) -> (PathBuf, PathBuf) {
        (
            self.path
                .join(format!("{}.{}", self.name, FileType::RecordData.code())),
            self.path
                .join(format!("{}.{}", self.name, FileType::RecordIndex.code())),
        )
    }
}

/// Directory name of segment `number` of `channel_name`.
pub fn segment_dir_name(channel_name: &str, number: i32) -> String {
    format!(
        "{}-{:0width$}.{}",
        channel_name,
        number,
        SEGMENT_EXTENSION,
        width = SEGMENT_NUMBER_DIGITS
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_kinds() {
        let session = MefPath::parse(Path::new("/data/sub01.mefd")).unwrap();
        assert_eq!(session.kind, MefPathKind::Session);
        assert_eq!(session.name, "sub01");

        let channel = MefPath::parse(Path::new("/data/sub01.mefd/Fp1.timd/")).unwrap();
        assert_eq!(channel.kind, MefPathKind::TimeSeriesChannel);
        assert_eq!(channel.name, "Fp1");

        assert!(matches!(
            MefPath::parse(Path::new("/data/notes.txt")),
            Err(MefError::Path(_))
        ));
        assert!(MefPath::parse(Path::new("/data/plain")).is_err());
    }

    #[test]
    fn test_segment_number() {
        let segment = MefPath::parse(Path::new("a.mefd/Fp1.timd/Fp1-000012.segd")).unwrap();
        assert_eq!(segment.segment_number().unwrap(), 12);

        let bad = MefPath::parse(Path::new("a.mefd/Fp1.timd/Fp1.segd")).unwrap();
        assert!(bad.segment_number().is_err());

        let letters = MefPath::parse(Path::new("a.mefd/Fp1.timd/Fp1-00a012.segd")).unwrap();
        assert!(letters.segment_number().is_err());
    }

    #[test]
    fn test_segment_location() {
        let segment = MefPath::parse(Path::new("/x/sub01.mefd/Fp1-ref.timd/Fp1-ref-000003.segd"))
            .unwrap()
            .segment_location()
            .unwrap();
        assert_eq!(segment.channel_name, "Fp1-ref");
        assert_eq!(segment.session_name, "sub01");
        assert_eq!(segment.segment_number, 3);
        assert_eq!(
            segment.file_path(FileType::TimeSeriesIndex),
            Path::new("/x/sub01.mefd/Fp1-ref.timd/Fp1-ref-000003.segd/Fp1-ref-000003.tidx")
        );

        let orphan = MefPath::parse(Path::new("/x/Fp1-000003.segd")).unwrap();
        assert!(orphan.segment_location().is_err());
    }

    #[test]
    fn test_names() {
        assert_eq!(segment_dir_name("Fp1", 7), "Fp1-000007.segd");
        let session = MefPath::parse(Path::new("/x/s.mefd")).unwrap();
        let (rdat, ridx) = session.record_paths();
        assert_eq!(rdat, Path::new("/x/s.mefd/s.rdat"));
        assert_eq!(ridx, Path::new("/x/s.mefd/s.ridx"));
    }
}

//! mef3 - Multiscale Electrophysiology Format storage
//!
//! This crate stores long multichannel physiological recordings as
//! chunked, compressed and optionally encrypted blocks in a
//! session / channel / segment directory tree.
//!
//! # Components
//!
//! - [`write_ts_metadata`] / [`write_ts_data`] / [`append_ts_data`]: segment writing
//! - [`Session`] / [`Channel`] / [`Segment`]: opening a recording and
//!   reading sample or time windows
//! - [`Channel::sample_for_time`] / [`Channel::time_for_sample`]: index-based
//!   sample and time conversion
//! - [`Session::detect_corruption`]: index against data file consistency report
//! - [`Credentials`] / [`check_password`]: the two-level password hierarchy
//! - [`format`]: on-disk layouts, including the RED block codec
//!
//! # Example
//!
//! ```rust,ignore
//! use mef3::{Credentials, MefConfig, TimeSeriesSection2, Section3, WriteOptions};
//!
//! let config = MefConfig::default();
//! let credentials = Credentials::new(Some("pass_1"), Some("pass_2"))?;
//! let segment = Path::new("sub01.mefd/Fp1.timd/Fp1-000000.segd");
//!
//! mef3::write_ts_metadata(
//!     segment,
//!     &credentials,
//!     start_time,
//!     end_time,
//!     TimeSeriesSection2::with_sampling(1000.0, 0),
//!     Section3::default(),
//!     &config,
//! )?;
//! mef3::write_ts_data(segment, &credentials, &samples, WriteOptions::new(1000), &config)?;
//!
//! let mut session = mef3::Session::open(Path::new("sub01.mefd"), Some("pass_2"), &config)?;
//! let channel = session.channel_mut("Fp1").unwrap();
//! let window = channel.read_by_time(start_time, start_time + 1_000_000, &config)?;
//! ```

#![deny(missing_docs)]

pub mod access;
pub mod config;
pub mod error;
pub mod format;
pub mod path;
pub mod reader;
pub mod resolver;
pub mod session;
pub mod writer;

pub use access::{AccessLevel, Credentials, EncryptionLevel, PasswordData};
pub use config::{CrcMode, FailBehavior, LossyConfig, MefConfig};
pub use error::{MefError, Result};
pub use format::index::TocEntry;
pub use format::metadata::{write_ts_metadata, Section3, TimeSeriesSection2};
pub use format::records::{read_records, write_records, Record, RecordBody, RecordRegistry};
pub use format::{RecordingTimeOffset, Timestamp, UUTC_NO_ENTRY};
pub use reader::{ReadOutput, ReadWarning};
pub use session::{
    check_password, BlockIssue, BlockProblem, Channel, CorruptionReport, Segment, Session,
};
pub use writer::{append_ts_data, write_ts_data, SegmentSummary, SegmentWriter, WriteOptions};

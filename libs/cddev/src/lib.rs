//! Backend-agnostic access to optical disc data
//!
//! This crate normalizes heterogeneous disc sources (hardware drives and
//! several disc image formats) behind one sector-addressed interface:
//!
//! * [`Device`] owns an open backend session and exposes sector reads,
//!   disc metadata and capability queries
//! * [`Track`] is a lightweight per-track view borrowed from a [`Device`]
//! * [`driver`] hosts the [`BackendDriver`](driver::BackendDriver) trait
//!   and its implementations (BIN/CUE, cdrdao TOC, Nero NRG, generic
//!   file-backed device access)
//!
//! All addressing is done in logical sector numbers ([`Lsn`]); the byte
//! size of one sector depends on the [`ReadMode`] used for the read.

pub mod capability;
pub mod device;
pub mod driver;
pub mod error;
pub mod track;

pub use capability::{DriveCaps, MiscCap, ReadCap, WriteCap};
pub use device::{Device, ReadMode};
pub use driver::{
    DiscMode, DriverId, HwInfo, Toc, TocTrack, TrackFormat, get_default_device_driver,
    have_driver, is_binfile, is_cuefile, is_nrg, is_tocfile,
};
pub use error::{CdError, DriverStatus};
pub use track::{Track, TrackFlag};

/// Logical sector number, the disc native block address
pub type Lsn = i32;
/// 1-based track number; 0 addresses the area before the first track
pub type TrackNum = u8;

/// The number of the leadout pseudo track
pub const LEADOUT_TRACK: TrackNum = 0xaa;

/// Bytes of user data in a mode 1 form 1 sector; the ISO9660 block size
pub const CD_FRAMESIZE: usize = 2048;
/// Bytes in a raw sector (also one audio frame)
pub const CD_FRAMESIZE_RAW: usize = 2352;
/// Bytes in a mode 2 sector with subheader but without sync and header
pub const M2RAW_SECTOR_SIZE: usize = 2336;
/// Bytes of user data in a mode 2 form 2 sector
pub const M2F2_SECTOR_SIZE: usize = 2324;
/// Bytes in the sync field of a raw sector
pub const CD_SYNC_SIZE: usize = 12;
/// Bytes in the header field of a raw sector
pub const CD_HEADER_SIZE: usize = 4;
/// Bytes in the subheader field of a raw mode 2 sector
pub const CD_SUBHEADER_SIZE: usize = 8;

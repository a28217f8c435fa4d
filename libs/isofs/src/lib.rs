//! ISO9660 filesystem reading
//!
//! Sits on top of any 2048 byte block source:
//!
//! * [`IsoFs`] parses the descriptor set and answers [`readdir`](IsoFs::readdir),
//!   [`stat`](IsoFs::stat) and extent reads; Joliet hierarchies are used
//!   automatically when present
//! * [`ImageSource`] reads image files directly, including raw sector
//!   framings located by the fuzzy superblock scan
//! * an open [`cddev::Device`] works as a source too, so every disc image
//!   backend and device the driver layer handles is readable here
//!
//! Sector addressing is by LSN throughout, matching the device layer.

pub mod dirent;
pub mod error;
pub mod fs;
pub mod source;
pub mod volume;

pub use dirent::{IsoStat, name_translate};
pub use error::IsoError;
pub use fs::IsoFs;
pub use source::{
    DEFAULT_FUZZ, ISO_BLOCKSIZE, ISO_PVD_SECTOR, ISO_STANDARD_ID, ImageSource, SectorSource,
};
pub use volume::VolumeDescriptor;

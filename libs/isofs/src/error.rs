//! Failure classification for filesystem access

use thiserror::Error;

/// Errors reported while reading an ISO9660 filesystem
#[derive(Error, Debug)]
pub enum IsoError {
    /// The primary volume descriptor is missing or unrecognizable
    #[error("no ISO9660 superblock found")]
    NoSuperblock,

    /// The fuzzy scan ran out of sectors to try
    #[error("no superblock found within {0} sectors of slack")]
    FuzzyScanExhausted(u16),

    /// A volume descriptor failed validation
    #[error("invalid volume descriptor: {0}")]
    InvalidDescriptor(String),

    /// A directory record failed validation
    #[error("invalid directory record: {0}")]
    InvalidRecord(String),

    /// The named path does not exist on the filesystem
    #[error("no such file or directory: {0:?}")]
    NotFound(String),

    /// The underlying device reported an error
    #[error("device: {0}")]
    Device(#[from] cddev::CdError),

    /// Wrapper for [`std::io::Error`](https://doc.rust-lang.org/std/io/struct.Error.html)
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),
}

//! Failure classification across the driver and track domains
//!
//! Backends report failures through the small [`DriverStatus`] code set;
//! [`CdError`] is the typed taxonomy surfaced to callers. The translation
//! happens in exactly one place (the [`From`] impl below) so raw backend
//! codes never leak past the device layer.

use thiserror::Error;

/// Raw status reported by a failed backend operation
///
/// Mirrors the signed return codes of the classic cdrom driver interface;
/// codes outside the known set are carried verbatim for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverStatus {
    /// Generic driver failure (-1)
    Error,
    /// The driver does not implement the operation (-2)
    Unsupported,
    /// The driver session was never initialized (-3)
    Uninit,
    /// The operation is not permitted on this source (-4)
    NotPermitted,
    /// An argument was rejected (-5)
    BadParameter,
    /// A buffer or pointer argument was invalid (-6)
    BadPointer,
    /// No driver is able to handle the source (-7)
    NoDriver,
    /// Any other nonzero code
    Other(i32),
}

impl DriverStatus {
    /// Classifies a raw signed status code; zero and positive are success
    pub fn check(code: i32) -> Result<(), Self> {
        match code {
            0.. => Ok(()),
            -1 => Err(Self::Error),
            -2 => Err(Self::Unsupported),
            -3 => Err(Self::Uninit),
            -4 => Err(Self::NotPermitted),
            -5 => Err(Self::BadParameter),
            -6 => Err(Self::BadPointer),
            -7 => Err(Self::NoDriver),
            other => Err(Self::Other(other)),
        }
    }
}

/// The error taxonomy exposed by this crate
///
/// Every sentinel or status code coming out of a backend is translated
/// into one of these variants at the device boundary.
#[derive(Error, Debug)]
pub enum CdError {
    /// Generic driver failure
    #[error("driver operation failed")]
    Driver,

    /// The active driver does not implement the requested operation
    #[error("operation not supported by this driver")]
    Unsupported,

    /// The device has no open session
    #[error("device has no open session")]
    Uninit,

    /// The operation is not permitted on this source
    #[error("operation not permitted")]
    NotPermitted,

    /// A caller supplied argument was rejected
    #[error("bad parameter: {0}")]
    BadParameter(String),

    /// A buffer or pointer argument was invalid
    #[error("bad buffer or pointer")]
    BadPointer,

    /// No driver was able to open the source
    #[error("no driver can handle source {0:?}")]
    NoDriver(String),

    /// Invalid or missing track, or an address outside any track
    #[error("track error: {0}")]
    Track(String),

    /// A backend returned a byte count that is not a whole number of blocks
    #[error("backend returned {got} bytes, not a multiple of the {block_size} byte block size")]
    ShortRead { got: usize, block_size: usize },

    /// A backend reported a status code outside the known set
    #[error("unrecognized driver status code {0}")]
    Device(i32),

    /// Wrapper for [`std::io::Error`](https://doc.rust-lang.org/std/io/struct.Error.html)
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),
}

impl From<DriverStatus> for CdError {
    fn from(status: DriverStatus) -> Self {
        match status {
            DriverStatus::Error => Self::Driver,
            DriverStatus::Unsupported => Self::Unsupported,
            DriverStatus::Uninit => Self::Uninit,
            DriverStatus::NotPermitted => Self::NotPermitted,
            DriverStatus::BadParameter => Self::BadParameter("rejected by driver".to_string()),
            DriverStatus::BadPointer => Self::BadPointer,
            DriverStatus::NoDriver => Self::NoDriver(String::new()),
            DriverStatus::Other(code) => Self::Device(code),
        }
    }
}

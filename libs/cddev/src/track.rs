//! Per-track views
//!
//! [`Track`] borrows its [`Device`] and answers geometry and attribute
//! queries from the session's table of contents. Pseudo tracks exist for
//! the pregap area (track 0) and the leadout.

use crate::device::Device;
use crate::driver::{TocTrack, TrackFormat};
use crate::error::CdError;
use crate::{LEADOUT_TRACK, Lsn, TrackNum};
use cdutils::msf::{self, Msf};

/// A tri-state attribute flag
///
/// Subchannel derived attributes are not always known, so a plain bool
/// cannot represent them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum TrackFlag {
    False,
    True,
    Unknown,
}

impl From<bool> for TrackFlag {
    fn from(v: bool) -> Self {
        if v { Self::True } else { Self::False }
    }
}

/// A read-only view of one track
#[derive(Debug, Clone, Copy)]
pub struct Track<'a> {
    device: &'a Device,
    number: TrackNum,
}

impl<'a> Track<'a> {
    pub(crate) fn new(device: &'a Device, number: TrackNum) -> Result<Self, CdError> {
        if number != LEADOUT_TRACK && device.toc()?.track(number).is_none() {
            return Err(CdError::Track(format!("no track {number} on this disc")));
        }
        Ok(Self { device, number })
    }

    /// The pseudo track covering the area before the first track
    pub(crate) fn pregap(device: &'a Device) -> Self {
        Self { device, number: 0 }
    }

    /// This track's number; 0 for the pregap area
    pub fn number(&self) -> TrackNum {
        self.number
    }

    fn entry(&self) -> Result<&'a TocTrack, CdError> {
        self.device.toc()?.track(self.number).ok_or_else(|| {
            CdError::Track(format!(
                "track {} has no table of contents entry",
                self.number
            ))
        })
    }

    /// First LSN of the track; for the leadout pseudo track, the LSN
    /// right past the last track
    pub fn get_lsn(&self) -> Result<Lsn, CdError> {
        if self.number == LEADOUT_TRACK {
            return self
                .device
                .toc()?
                .leadout_lsn()
                .ok_or_else(|| CdError::Track("disc has no tracks".to_string()));
        }
        Ok(self.entry()?.start_lsn)
    }

    /// Last LSN of the track extent
    pub fn get_last_lsn(&self) -> Result<Lsn, CdError> {
        Ok(self.entry()?.last_lsn())
    }

    /// First LBA of the track (the LSN shifted by the standard pregap)
    pub fn get_lba(&self) -> Result<i32, CdError> {
        Ok(msf::lsn_to_lba(self.get_lsn()?))
    }

    /// Start address as minutes/seconds/frames
    pub fn get_msf(&self) -> Result<Msf, CdError> {
        msf::lsn_to_msf(self.get_lsn()?)
            .ok_or_else(|| CdError::Track(format!("track {} starts before the disc", self.number)))
    }

    pub fn get_format(&self) -> Result<TrackFormat, CdError> {
        Ok(self.entry()?.format)
    }

    /// Audio channel count; unsupported for data tracks
    pub fn get_audio_channels(&self) -> Result<u8, CdError> {
        self.entry()?.channels.ok_or(CdError::Unsupported)
    }

    /// Whether digital copying is permitted
    pub fn get_copy_permit(&self) -> Result<bool, CdError> {
        Ok(self.entry()?.copy_permit)
    }

    /// Linear preemphasis flag; meaningful for audio tracks only
    pub fn get_preemphasis(&self) -> Result<TrackFlag, CdError> {
        Ok(self.entry()?.preemphasis)
    }

    /// Number of sectors from this track's start to the next track's
    /// start (or the leadout), including any inter-track pregap
    pub fn get_track_sec_count(&self) -> Result<u32, CdError> {
        let toc = self.device.toc()?;
        let entry = self.entry()?;
        let end = toc
            .span_end(entry)
            .ok_or_else(|| CdError::Track("disc has no tracks".to_string()))?;
        match end - entry.start_lsn {
            n if n > 0 => Ok(n as u32),
            _ => Err(CdError::Track(format!("track {} is empty", self.number))),
        }
    }

    /// Whether the track uses a mode 2 ("green book") sector layout
    pub fn is_green(&self) -> Result<bool, CdError> {
        Ok(self.entry()?.green)
    }

    /// Rebinds this view to another track of the same device
    pub fn set_track(self, number: TrackNum) -> Result<Track<'a>, CdError> {
        Track::new(self.device, number)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn flag_from_bool() {
        assert_eq!(TrackFlag::from(true), TrackFlag::True);
        assert_eq!(TrackFlag::from(false), TrackFlag::False);
        assert_ne!(TrackFlag::Unknown, TrackFlag::False);
    }
}

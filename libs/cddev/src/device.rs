//! The device layer
//!
//! [`Device`] owns at most one open backend session and is the public
//! entry point for sector reads and disc metadata. All backend status
//! codes are translated into [`CdError`] here, and partial sector reads
//! are rejected rather than passed through.

use crate::capability::DriveCaps;
use crate::driver::{
    self, BackendDriver, DiscMode, DriverId, HwInfo, Toc,
};
use crate::error::CdError;
use crate::track::Track;
use crate::{
    CD_FRAMESIZE, CD_FRAMESIZE_RAW, Lsn, M2RAW_SECTOR_SIZE, TrackNum,
};
use std::io::SeekFrom;
use tracing::{debug, warn};

/// The sector view requested from a read
///
/// Each mode implies a fixed block size, the number of bytes one sector
/// contributes to the output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum ReadMode {
    /// Raw 2352 byte audio frames
    Audio,
    /// Mode 1 sector without sync and header (2336 bytes)
    M1f1,
    /// Mode 1 user data (2048 bytes)
    M1f2,
    /// Mode 2 sector with subheader (2336 bytes)
    M2f1,
    /// Mode 2 form 1 user data (2048 bytes)
    M2f2,
}

impl ReadMode {
    /// Bytes each sector contributes in this mode
    pub fn block_size(&self) -> usize {
        match self {
            Self::Audio => CD_FRAMESIZE_RAW,
            Self::M1f1 | Self::M2f1 => M2RAW_SECTOR_SIZE,
            Self::M1f2 | Self::M2f2 => CD_FRAMESIZE,
        }
    }
}

/// A handle for one disc source
///
/// Constructed closed; [`open`](Self::open) binds a backend session and
/// every query forwards to it. Operations on a closed device fail with
/// [`CdError::Uninit`].
#[derive(Default)]
pub struct Device {
    session: Option<Box<dyn BackendDriver>>,
}

impl Device {
    /// Creates a closed device
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a source, replacing any session already open
    ///
    /// With no `source` the conventional device nodes are probed. The
    /// `driver_id` hint binds a specific backend; [`DriverId::Unknown`]
    /// probes for one. `access_mode` is advisory and may be ignored by
    /// the backend.
    pub fn open(
        &mut self,
        source: Option<&str>,
        driver_id: DriverId,
        access_mode: Option<&str>,
    ) -> Result<(), CdError> {
        if self.session.is_some() {
            debug!("open with a session active, closing it first");
            self.session = None;
        }
        let (source, driver_id) = match source {
            Some(s) => (s.to_string(), driver_id),
            None => driver::get_default_device_driver()
                .ok_or_else(|| CdError::NoDriver("no default device found".to_string()))?,
        };
        self.session = Some(driver::open_driver(&source, driver_id, access_mode)?);
        Ok(())
    }

    /// Closes the session, if any
    pub fn close(&mut self) {
        if self.session.take().is_none() {
            warn!("close called on a device that is not open");
        }
    }

    /// Whether a session is open
    pub fn is_open(&self) -> bool {
        self.session.is_some()
    }

    fn session(&self) -> Result<&dyn BackendDriver, CdError> {
        self.session.as_deref().ok_or(CdError::Uninit)
    }

    fn session_mut(&mut self) -> Result<&mut (dyn BackendDriver + '_), CdError> {
        match self.session.as_deref_mut() {
            Some(s) => Ok(s),
            None => Err(CdError::Uninit),
        }
    }

    /// The backend handling this session
    pub fn get_driver_id(&self) -> Result<DriverId, CdError> {
        Ok(self.session()?.driver_id())
    }

    /// Conventional name of the backend handling this session
    pub fn get_driver_name(&self) -> Result<&'static str, CdError> {
        Ok(self.session()?.driver_id().name())
    }

    /// The source string the session was opened from
    pub fn get_source(&self) -> Result<String, CdError> {
        Ok(self.session()?.source().to_string())
    }

    pub(crate) fn toc(&self) -> Result<&Toc, CdError> {
        Ok(self.session()?.toc())
    }

    /// Reads `count` sectors starting at `lsn` in the given mode
    ///
    /// Returns the number of whole sectors read along with their bytes.
    /// A byte count that is not a whole number of blocks is a hard error;
    /// no partial sector is ever returned.
    pub fn read_sectors(
        &mut self,
        lsn: Lsn,
        mode: ReadMode,
        count: u32,
    ) -> Result<(u32, Vec<u8>), CdError> {
        if count == 0 {
            return Err(CdError::BadParameter("sector count must be positive".to_string()));
        }
        let block = mode.block_size();
        let mut buf = vec![0u8; block * count as usize];
        let got = self.session_mut()?.read_sectors(&mut buf, lsn, mode, count)?;
        if got % block != 0 {
            return Err(CdError::ShortRead {
                got,
                block_size: block,
            });
        }
        buf.truncate(got);
        Ok(((got / block) as u32, buf))
    }

    /// Reads `count` blocks of 2048 byte user data starting at `lsn`
    pub fn read_data_blocks(&mut self, lsn: Lsn, count: u32) -> Result<Vec<u8>, CdError> {
        let (_, data) = self.read_sectors(lsn, ReadMode::M1f2, count)?;
        Ok(data)
    }

    /// Repositions the backend byte-stream cursor
    pub fn lseek(&mut self, pos: SeekFrom) -> Result<u64, CdError> {
        Ok(self.session_mut()?.lseek(pos)?)
    }

    pub fn get_disc_mode(&self) -> Result<DiscMode, CdError> {
        Ok(self.session()?.disc_mode())
    }

    /// The last addressable LSN of the disc
    pub fn get_disc_last_lsn(&self) -> Result<Lsn, CdError> {
        self.session()?.disc_last_lsn().ok_or(CdError::Driver)
    }

    /// First LSN of the first track of the last session
    pub fn get_last_session(&self) -> Result<Lsn, CdError> {
        Ok(self.session()?.last_session()?)
    }

    /// Media catalog number, when the disc carries one
    pub fn get_mcn(&self) -> Result<Option<String>, CdError> {
        Ok(self.session()?.mcn())
    }

    /// Whether media changed since the last query
    pub fn get_media_changed(&mut self) -> Result<bool, CdError> {
        Ok(self.session_mut()?.media_changed()?)
    }

    /// The decoded drive capabilities
    pub fn get_drive_cap(&self) -> Result<DriveCaps, CdError> {
        let (read, write, misc) = self.session()?.drive_cap();
        Ok(DriveCaps::decode(read, write, misc))
    }

    /// Hardware identification of the drive or image backend
    pub fn get_hwinfo(&self) -> Result<HwInfo, CdError> {
        Ok(self.session()?.hwinfo())
    }

    pub fn get_num_tracks(&self) -> Result<usize, CdError> {
        Ok(self.toc()?.tracks.len())
    }

    /// Number of the first track; `None` on a trackless disc
    pub fn get_first_track_num(&self) -> Result<Option<TrackNum>, CdError> {
        Ok(self.toc()?.first_track_num())
    }

    /// Number of the last track; `None` on a trackless disc
    pub fn get_last_track_num(&self) -> Result<Option<TrackNum>, CdError> {
        Ok(self.toc()?.last_track_num())
    }

    /// A view of the given track; [`LEADOUT_TRACK`](crate::LEADOUT_TRACK)
    /// addresses the leadout area
    pub fn get_track(&self, number: TrackNum) -> Result<Track<'_>, CdError> {
        Track::new(self, number)
    }

    pub fn get_first_track(&self) -> Result<Option<Track<'_>>, CdError> {
        self.get_first_track_num()?
            .map(|n| self.get_track(n))
            .transpose()
    }

    pub fn get_last_track(&self) -> Result<Option<Track<'_>>, CdError> {
        self.get_last_track_num()?
            .map(|n| self.get_track(n))
            .transpose()
    }

    /// The track spanning `lsn`
    ///
    /// An address between sector zero and the first track resolves to
    /// pseudo track 0 (the pregap area); an address outside the disc
    /// yields `None`.
    pub fn get_track_for_lsn(&self, lsn: Lsn) -> Result<Option<Track<'_>>, CdError> {
        let toc = self.toc()?;
        if let Some(t) = toc.track_for_lsn(lsn) {
            let number = t.number;
            return Ok(Some(Track::new(self, number)?));
        }
        let before_first = toc.tracks.first().is_some_and(|t| lsn < t.start_lsn);
        if lsn >= 0 && before_first {
            return Ok(Some(Track::pregap(self)));
        }
        Ok(None)
    }

    /// Sets the hardware read block size, where supported
    pub fn set_blocksize(&mut self, blocksize: usize) -> Result<(), CdError> {
        Ok(self.session_mut()?.set_blocksize(blocksize)?)
    }

    /// Sets the drive read speed, where supported
    pub fn set_speed(&mut self, speed: i32) -> Result<(), CdError> {
        Ok(self.session_mut()?.set_speed(speed)?)
    }

    /// Ejects the media and closes the session
    pub fn eject_media(&mut self) -> Result<(), CdError> {
        self.session_mut()?.eject_media()?;
        self.session = None;
        Ok(())
    }

    pub fn audio_pause(&mut self) -> Result<(), CdError> {
        Ok(self.session_mut()?.audio_pause()?)
    }

    pub fn audio_resume(&mut self) -> Result<(), CdError> {
        Ok(self.session_mut()?.audio_resume()?)
    }

    pub fn audio_stop(&mut self) -> Result<(), CdError> {
        Ok(self.session_mut()?.audio_stop()?)
    }

    /// Starts audio playback over an LSN range
    pub fn audio_play_lsn(&mut self, start: Lsn, end: Lsn) -> Result<(), CdError> {
        if end < start {
            return Err(CdError::BadParameter(
                "playback range goes backwards".to_string(),
            ));
        }
        Ok(self.session_mut()?.audio_play_lsn(start, end)?)
    }
}

impl std::fmt::Debug for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> Result<(), std::fmt::Error> {
        let mut d = f.debug_struct("Device");
        match &self.session {
            Some(s) => d
                .field("driver", &s.driver_id())
                .field("source", &s.source())
                .finish(),
            None => d.field("session", &"closed").finish(),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn block_sizes() {
        assert_eq!(ReadMode::Audio.block_size(), 2352);
        assert_eq!(ReadMode::M1f1.block_size(), 2336);
        assert_eq!(ReadMode::M1f2.block_size(), 2048);
        assert_eq!(ReadMode::M2f1.block_size(), 2336);
        assert_eq!(ReadMode::M2f2.block_size(), 2048);
    }

    #[test]
    fn closed_device() {
        let mut dev = Device::new();
        assert!(!dev.is_open());
        assert!(matches!(dev.get_disc_mode(), Err(CdError::Uninit)));
        assert!(matches!(
            dev.read_sectors(0, ReadMode::M1f2, 1),
            Err(CdError::Uninit)
        ));
        // Double close only warns
        dev.close();
        dev.close();
    }

    #[test]
    fn zero_count_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let img = dir.path().join("disc.iso");
        std::fs::write(&img, vec![0u8; 2048 * 4]).unwrap();
        let mut dev = Device::new();
        dev.open(img.to_str(), DriverId::Unknown, None).unwrap();
        assert!(matches!(
            dev.read_sectors(0, ReadMode::M1f2, 0),
            Err(CdError::BadParameter(_))
        ));
    }
}

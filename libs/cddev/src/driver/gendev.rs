//! Generic file-backed device access
//!
//! Covers sources that are not recognized disc images: block device nodes
//! and anything else readable. Data is treated as a linear run of 2048
//! byte cooked sectors; there is no packet command passthrough, so audio
//! reads and drive control operations report unsupported.

use super::{BackendDriver, DiscMode, DriverId, HwInfo, Toc, TocTrack, TrackFormat, sector_window};
use crate::capability::MISC_FILE_BIT;
use crate::device::ReadMode;
use crate::error::{CdError, DriverStatus};
use crate::track::TrackFlag;
use crate::{CD_FRAMESIZE, Lsn};
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use tracing::debug;

/// The generic device backend
pub struct GenDev {
    source: String,
    file: File,
    sectors: u32,
    toc: Toc,
    is_file: bool,
}

impl GenDev {
    /// Opens a device node or plain file for cooked sector access
    pub fn open(source: &str) -> Result<Self, CdError> {
        let mut file = File::open(source)?;
        let is_file = file.metadata()?.is_file();
        // metadata reports zero for block devices; ask the descriptor
        let len = file.seek(SeekFrom::End(0))?;
        file.seek(SeekFrom::Start(0))?;
        if len == 0 {
            return Err(CdError::BadParameter(format!(
                "{source:?} has no readable data"
            )));
        }
        let sectors = (len / CD_FRAMESIZE as u64) as u32;
        let toc = Toc {
            first_track: 1,
            tracks: vec![TocTrack {
                number: 1,
                start_lsn: 0,
                sectors,
                format: TrackFormat::Data,
                green: false,
                channels: None,
                copy_permit: false,
                preemphasis: TrackFlag::Unknown,
            }],
        };
        debug!("opened device {source:?}: {sectors} cooked sectors");
        Ok(Self {
            source: source.to_string(),
            file,
            sectors,
            toc,
            is_file,
        })
    }
}

impl BackendDriver for GenDev {
    fn driver_id(&self) -> DriverId {
        DriverId::Device
    }

    fn source(&self) -> &str {
        &self.source
    }

    fn toc(&self) -> &Toc {
        &self.toc
    }

    fn read_sectors(
        &mut self,
        buf: &mut [u8],
        lsn: Lsn,
        mode: ReadMode,
        count: u32,
    ) -> Result<usize, DriverStatus> {
        let block = mode.block_size();
        if buf.len() < block * count as usize {
            return Err(DriverStatus::BadPointer);
        }
        let (skip, len) =
            sector_window(mode, CD_FRAMESIZE, false).ok_or(DriverStatus::Unsupported)?;
        if lsn < 0 || lsn as u64 + count as u64 > self.sectors as u64 {
            return Err(DriverStatus::BadParameter);
        }
        debug_assert_eq!((skip, len), (0, CD_FRAMESIZE));
        self.file
            .seek(SeekFrom::Start(lsn as u64 * CD_FRAMESIZE as u64))
            .map_err(|_| DriverStatus::Error)?;
        let out = &mut buf[..block * count as usize];
        self.file.read_exact(out).map_err(|_| DriverStatus::Error)?;
        Ok(out.len())
    }

    fn lseek(&mut self, pos: SeekFrom) -> Result<u64, DriverStatus> {
        self.file.seek(pos).map_err(|_| DriverStatus::Error)
    }

    fn disc_mode(&self) -> DiscMode {
        DiscMode::CdData
    }

    fn disc_last_lsn(&self) -> Option<Lsn> {
        (self.sectors > 0).then(|| self.sectors as Lsn - 1)
    }

    fn last_session(&self) -> Result<Lsn, DriverStatus> {
        Ok(0)
    }

    fn hwinfo(&self) -> HwInfo {
        HwInfo {
            vendor: "GENERIC".to_string(),
            model: self.source.clone(),
            revision: String::new(),
        }
    }

    fn drive_cap(&self) -> (u32, u32, u32) {
        let read = 0x01000 | 0x02000;
        let misc = if self.is_file { MISC_FILE_BIT } else { 0 };
        (read, 0, misc)
    }

    fn set_blocksize(&mut self, blocksize: usize) -> Result<(), DriverStatus> {
        // Only the cooked sector size is meaningful here
        if blocksize == CD_FRAMESIZE {
            Ok(())
        } else {
            Err(DriverStatus::BadParameter)
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn cooked_reads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("flat.dat");
        let mut data = vec![0u8; CD_FRAMESIZE * 3];
        data[CD_FRAMESIZE..CD_FRAMESIZE * 2].fill(0x11);
        std::fs::write(&path, &data).unwrap();

        let mut dev = GenDev::open(path.to_str().unwrap()).unwrap();
        assert_eq!(dev.disc_last_lsn(), Some(2));
        let mut buf = vec![0u8; CD_FRAMESIZE];
        dev.read_sectors(&mut buf, 1, ReadMode::M1f2, 1).unwrap();
        assert!(buf.iter().all(|&b| b == 0x11));
        assert_eq!(
            dev.read_sectors(&mut buf, 3, ReadMode::M1f2, 1),
            Err(DriverStatus::BadParameter)
        );
        assert_eq!(
            dev.read_sectors(&mut buf, 0, ReadMode::Audio, 1),
            Err(DriverStatus::BadPointer)
        );
    }

    #[test]
    fn rejects_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty");
        std::fs::write(&path, b"").unwrap();
        assert!(GenDev::open(path.to_str().unwrap()).is_err());
    }
}

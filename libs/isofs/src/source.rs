//! Block sources the filesystem can sit on
//!
//! The filesystem layer only needs 2048 byte logical blocks addressed by
//! LSN. [`SectorSource`] abstracts over where they come from: an open
//! [`cddev::Device`] session, or a plain image file accessed directly via
//! [`ImageSource`], including images with raw sector framing found by the
//! fuzzy scan.

use crate::error::IsoError;
use cddev::Lsn;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;
use tracing::debug;

/// The ISO9660 logical block size
pub const ISO_BLOCKSIZE: usize = 2048;
/// LSN where the primary volume descriptor lives
pub const ISO_PVD_SECTOR: Lsn = 16;
/// Standard identifier carried by every volume descriptor
pub const ISO_STANDARD_ID: &[u8; 5] = b"CD001";

/// Sector framings tried by the fuzzy scan, most common first
const FRAMESIZES: [usize; 3] = [2048, 2352, 2336];
/// User data offsets within a stored sector tried by the fuzzy scan
const DATA_SKIPS: [usize; 4] = [0, 16, 24, 8];
/// Default slack, in sectors, allowed before the superblock
pub const DEFAULT_FUZZ: u16 = 20;

/// Yields 2048 byte logical blocks by LSN
pub trait SectorSource {
    /// Reads `count` logical blocks starting at `lsn`
    fn read_blocks(&mut self, lsn: Lsn, count: u32) -> Result<Vec<u8>, IsoError>;
}

impl SectorSource for cddev::Device {
    fn read_blocks(&mut self, lsn: Lsn, count: u32) -> Result<Vec<u8>, IsoError> {
        Ok(self.read_data_blocks(lsn, count)?)
    }
}

/// Direct file access to an ISO9660 image
///
/// Handles plain 2048 byte/sector images as well as raw framings where
/// each stored sector carries sync, header or subheader bytes around the
/// user data.
pub struct ImageSource {
    file: File,
    /// Bytes each sector occupies in the file
    framesize: usize,
    /// Offset of the 2048 user data bytes within a stored sector
    skip: usize,
    /// Byte offset in the file where sector 0 starts
    data_start: u64,
}

impl ImageSource {
    /// Opens an image assuming plain 2048 byte sectors from offset zero
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, IsoError> {
        Ok(Self {
            file: File::open(path)?,
            framesize: ISO_BLOCKSIZE,
            skip: 0,
            data_start: 0,
        })
    }

    /// Opens an image locating the superblock by content
    ///
    /// Scans the first `16 + fuzz + 1` sectors worth of bytes for a
    /// volume descriptor signature, then derives the sector framing from
    /// the distance to the following descriptor. Recovers images with
    /// raw 2352 or 2336 byte sectors and images with leading garbage up
    /// to `fuzz` sectors long.
    pub fn open_fuzzy<P: AsRef<Path>>(path: P, fuzz: u16) -> Result<Self, IsoError> {
        let mut file = File::open(path)?;
        let window_len = (ISO_PVD_SECTOR as usize + fuzz as usize + 2) * FRAMESIZES[1];
        let mut window = vec![0u8; window_len];
        let got = read_up_to(&mut file, &mut window)?;
        window.truncate(got);

        let mut search_from = 0usize;
        while let Some(rel) = find_signature(&window[search_from..]) {
            let pos = search_from + rel;
            for &framesize in &FRAMESIZES {
                // The next volume descriptor starts exactly one sector
                // later; its signature confirms the framing
                let next = pos + framesize;
                if window.len() < next + 6 || &window[next + 1..next + 6] != b"CD001" {
                    continue;
                }
                for &skip in &DATA_SKIPS {
                    let lead = ISO_PVD_SECTOR as usize * framesize + skip;
                    // Leading slack is whole sectors, so the signature
                    // position fixes the skip within the sector
                    if skip < framesize && pos >= lead && (pos - skip) % framesize == 0 {
                        let data_start = (pos - lead) as u64;
                        debug!(
                            "superblock found: {framesize} byte sectors, data at +{skip}, image starts at {data_start}"
                        );
                        return Ok(Self {
                            file,
                            framesize,
                            skip,
                            data_start,
                        });
                    }
                }
            }
            search_from = pos + 1;
        }
        Err(IsoError::FuzzyScanExhausted(fuzz))
    }

    /// The detected sector framing, in bytes
    pub fn framesize(&self) -> usize {
        self.framesize
    }
}

/// Finds the next `\x01CD001` primary descriptor signature
fn find_signature(haystack: &[u8]) -> Option<usize> {
    haystack
        .windows(6)
        .position(|w| w == b"\x01CD001")
}

fn read_up_to(file: &mut File, buf: &mut [u8]) -> Result<usize, std::io::Error> {
    let mut total = 0;
    while total < buf.len() {
        let n = file.read(&mut buf[total..])?;
        if n == 0 {
            break;
        }
        total += n;
    }
    Ok(total)
}

impl SectorSource for ImageSource {
    fn read_blocks(&mut self, lsn: Lsn, count: u32) -> Result<Vec<u8>, IsoError> {
        if lsn < 0 {
            return Err(IsoError::Device(cddev::CdError::BadParameter(format!(
                "negative sector address {lsn}"
            ))));
        }
        let mut out = vec![0u8; count as usize * ISO_BLOCKSIZE];
        if self.framesize == ISO_BLOCKSIZE && self.skip == 0 {
            self.file.seek(SeekFrom::Start(
                self.data_start + lsn as u64 * ISO_BLOCKSIZE as u64,
            ))?;
            self.file.read_exact(&mut out)?;
            return Ok(out);
        }
        for i in 0..count as usize {
            let pos = self.data_start
                + (lsn as u64 + i as u64) * self.framesize as u64
                + self.skip as u64;
            self.file.seek(SeekFrom::Start(pos))?;
            self.file
                .read_exact(&mut out[i * ISO_BLOCKSIZE..(i + 1) * ISO_BLOCKSIZE])?;
        }
        Ok(out)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn signature_search() {
        let mut buf = vec![0u8; 64];
        buf[10..16].copy_from_slice(b"\x01CD001");
        assert_eq!(find_signature(&buf), Some(10));
        assert_eq!(find_signature(&buf[11..]), None);
    }
}

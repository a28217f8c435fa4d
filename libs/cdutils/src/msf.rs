//! CD address arithmetic
//!
//! A disc position can be expressed as a logical sector number (LSN), a
//! logical block address (LBA, which is the LSN shifted by the standard
//! pregap) or a human readable minutes/seconds/frames triple.

/// Sectors in the standard track 1 pregap; also the LSN to LBA shift
pub const PREGAP_SECTORS: i32 = 150;
/// CD frames (sectors) per second of playback
pub const FRAMES_PER_SEC: i32 = 75;
/// CD frames per minute of playback
pub const FRAMES_PER_MIN: i32 = 60 * FRAMES_PER_SEC;

/// A minutes/seconds/frames disc address
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Msf {
    pub minutes: u32,
    pub seconds: u32,
    pub frames: u32,
}

impl std::fmt::Display for Msf {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> Result<(), std::fmt::Error> {
        write!(
            f,
            "{:02}:{:02}:{:02}",
            self.minutes, self.seconds, self.frames
        )
    }
}

/// Converts an LSN into an LBA
#[inline]
pub fn lsn_to_lba(lsn: i32) -> i32 {
    lsn + PREGAP_SECTORS
}

/// Converts an LBA into an LSN
#[inline]
pub fn lba_to_lsn(lba: i32) -> i32 {
    lba - PREGAP_SECTORS
}

/// Converts an LSN into a minutes/seconds/frames address
///
/// Returns `None` for addresses before the start of the pregap
pub fn lsn_to_msf(lsn: i32) -> Option<Msf> {
    let lba = lsn_to_lba(lsn);
    if lba < 0 {
        return None;
    }
    Some(Msf {
        minutes: (lba / FRAMES_PER_MIN) as u32,
        seconds: ((lba / FRAMES_PER_SEC) % 60) as u32,
        frames: (lba % FRAMES_PER_SEC) as u32,
    })
}

/// Converts a minutes/seconds/frames address into an LSN
pub fn msf_to_lsn(msf: Msf) -> i32 {
    lba_to_lsn((msf.minutes as i32) * FRAMES_PER_MIN + (msf.seconds as i32) * FRAMES_PER_SEC + msf.frames as i32)
}

/// Converts a minutes/seconds/frames address into a zero-based frame count
pub fn msf_to_frames(minutes: u32, seconds: u32, frames: u32) -> u32 {
    minutes * FRAMES_PER_MIN as u32 + seconds * FRAMES_PER_SEC as u32 + frames
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn lba_shift() {
        assert_eq!(lsn_to_lba(0), 150);
        assert_eq!(lba_to_lsn(150), 0);
        assert_eq!(lsn_to_lba(lba_to_lsn(12345)), 12345);
    }

    #[test]
    fn msf_roundtrip() {
        let msf = lsn_to_msf(0).unwrap();
        assert_eq!(msf.to_string(), "00:02:00");
        assert_eq!(msf_to_lsn(msf), 0);
        let msf = lsn_to_msf(4350).unwrap();
        assert_eq!(msf.to_string(), "01:00:00");
        assert_eq!(msf_to_lsn(msf), 4350);
        assert!(lsn_to_msf(-151).is_none());
    }

    #[test]
    fn frame_counts() {
        assert_eq!(msf_to_frames(0, 2, 0), 150);
        assert_eq!(msf_to_frames(1, 0, 74), 4574);
    }
}

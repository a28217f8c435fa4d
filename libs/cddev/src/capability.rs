//! Drive capability bitmask decoding
//!
//! Drives report three independent raw bitmasks (read formats, write
//! formats, miscellaneous features) which are decoded here into sets of
//! named flags. A bit that is not set only means "unsupported or
//! undetermined", never an error; an entirely empty set is a legitimate
//! answer from a drive with no inserted media.

use std::collections::HashSet;

/// The misc mask bit signalling the drive could not report capabilities
const CAP_ERROR: u32 = 0x40000;
/// The misc mask bit signalling capabilities are unknown
const CAP_UNKNOWN: u32 = 0x80000;

/// Named read capabilities
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum ReadCap {
    Audio,
    CdDa,
    CdG,
    CdR,
    CdRw,
    DvdR,
    DvdPr,
    DvdRam,
    DvdRom,
    DvdRw,
    DvdRpw,
    C2Errs,
    Mode2Form1,
    Mode2Form2,
    Mcn,
    Isrc,
}

/// Named write capabilities
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum WriteCap {
    CdR,
    CdRw,
    DvdR,
    DvdPr,
    DvdRam,
    DvdRw,
    DvdRpw,
    MtRainier,
    BurnProof,
}

/// Named miscellaneous drive features
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum MiscCap {
    /// Capability reporting itself failed
    Error,
    /// Capabilities could not be determined
    Unknown,
    CloseTray,
    Eject,
    Lock,
    SelectSpeed,
    SelectDisc,
    MultiSession,
    MediaChanged,
    Reset,
    /// The source is a file rather than real hardware
    File,
}

const READ_TABLE: &[(u32, ReadCap)] = &[
    (0x00001, ReadCap::Audio),
    (0x00002, ReadCap::CdDa),
    (0x00004, ReadCap::CdG),
    (0x00008, ReadCap::CdR),
    (0x00010, ReadCap::CdRw),
    (0x00020, ReadCap::DvdR),
    (0x00040, ReadCap::DvdPr),
    (0x00080, ReadCap::DvdRam),
    (0x00100, ReadCap::DvdRom),
    (0x00200, ReadCap::DvdRw),
    (0x00400, ReadCap::DvdRpw),
    (0x00800, ReadCap::C2Errs),
    (0x01000, ReadCap::Mode2Form1),
    (0x02000, ReadCap::Mode2Form2),
    (0x04000, ReadCap::Mcn),
    (0x08000, ReadCap::Isrc),
];

const WRITE_TABLE: &[(u32, WriteCap)] = &[
    (0x00001, WriteCap::CdR),
    (0x00002, WriteCap::CdRw),
    (0x00004, WriteCap::DvdR),
    (0x00008, WriteCap::DvdPr),
    (0x00010, WriteCap::DvdRam),
    (0x00020, WriteCap::DvdRw),
    (0x00040, WriteCap::DvdRpw),
    (0x00080, WriteCap::MtRainier),
    (0x00100, WriteCap::BurnProof),
];

const MISC_TABLE: &[(u32, MiscCap)] = &[
    (CAP_ERROR, MiscCap::Error),
    (CAP_UNKNOWN, MiscCap::Unknown),
    (0x00001, MiscCap::CloseTray),
    (0x00002, MiscCap::Eject),
    (0x00004, MiscCap::Lock),
    (0x00008, MiscCap::SelectSpeed),
    (0x00010, MiscCap::SelectDisc),
    (0x00020, MiscCap::MultiSession),
    (0x00080, MiscCap::MediaChanged),
    (0x00100, MiscCap::Reset),
    (0x20000, MiscCap::File),
];

/// The raw misc mask bit for [`MiscCap::File`], set by image backends
pub(crate) const MISC_FILE_BIT: u32 = 0x20000;

/// Decodes a raw read capability mask
pub fn decode_read_cap(mask: u32) -> HashSet<ReadCap> {
    READ_TABLE
        .iter()
        .filter(|(bit, _)| mask & bit != 0)
        .map(|(_, cap)| *cap)
        .collect()
}

/// Decodes a raw write capability mask
pub fn decode_write_cap(mask: u32) -> HashSet<WriteCap> {
    WRITE_TABLE
        .iter()
        .filter(|(bit, _)| mask & bit != 0)
        .map(|(_, cap)| *cap)
        .collect()
}

/// Decodes a raw misc capability mask
pub fn decode_misc_cap(mask: u32) -> HashSet<MiscCap> {
    MISC_TABLE
        .iter()
        .filter(|(bit, _)| mask & bit != 0)
        .map(|(_, cap)| *cap)
        .collect()
}

/// The decoded capabilities of a drive
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct DriveCaps {
    pub read: HashSet<ReadCap>,
    pub write: HashSet<WriteCap>,
    pub misc: HashSet<MiscCap>,
}

impl DriveCaps {
    /// Decodes the three raw bitmasks reported by a backend
    pub fn decode(read_mask: u32, write_mask: u32, misc_mask: u32) -> Self {
        Self {
            read: decode_read_cap(read_mask),
            write: decode_write_cap(write_mask),
            misc: decode_misc_cap(misc_mask),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn empty_masks() {
        let caps = DriveCaps::decode(0, 0, 0);
        assert!(caps.read.is_empty());
        assert!(caps.write.is_empty());
        assert!(caps.misc.is_empty());
    }

    #[test]
    fn read_bits() {
        let set = decode_read_cap(0x00001 | 0x01000 | 0x08000);
        assert_eq!(set.len(), 3);
        assert!(set.contains(&ReadCap::Audio));
        assert!(set.contains(&ReadCap::Mode2Form1));
        assert!(set.contains(&ReadCap::Isrc));
        assert!(!set.contains(&ReadCap::Mcn));
    }

    #[test]
    fn write_bits() {
        let set = decode_write_cap(0x00001 | 0x00100);
        assert!(set.contains(&WriteCap::CdR));
        assert!(set.contains(&WriteCap::BurnProof));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn misc_bits() {
        let set = decode_misc_cap(0x00002 | 0x20000 | CAP_UNKNOWN);
        assert!(set.contains(&MiscCap::Eject));
        assert!(set.contains(&MiscCap::File));
        assert!(set.contains(&MiscCap::Unknown));
        assert_eq!(set.len(), 3);
    }
}

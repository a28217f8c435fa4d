//! Backend drivers
//!
//! A backend turns one kind of source (a hardware drive node or a disc
//! image file) into raw sector reads plus a table of contents. Selection
//! happens at open time: an explicit [`DriverId`] hint binds exactly that
//! backend, while [`DriverId::Unknown`] probes the image backends by
//! content and falls back to generic device access for non-file sources.

pub mod bincue;
pub mod cdrdao;
pub mod gendev;
pub mod nrg;

use crate::device::ReadMode;
use crate::error::{CdError, DriverStatus};
use crate::track::TrackFlag;
use crate::{Lsn, TrackNum};
use std::io::SeekFrom;
use std::path::Path;
use tracing::{debug, warn};

/// Identifies a backend driver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum DriverId {
    /// No driver selected yet; lets `open` probe for one
    Unknown,
    /// Generic file-backed device access
    Device,
    /// CDRWIN BIN/CUE disc image
    BinCue,
    /// cdrdao TOC disc image
    Cdrdao,
    /// Nero NRG disc image
    Nrg,
}

impl DriverId {
    /// The conventional driver name
    pub fn name(&self) -> &'static str {
        match self {
            Self::Unknown => "Unknown",
            Self::Device => "device",
            Self::BinCue => "BIN/CUE",
            Self::Cdrdao => "CDRDAO",
            Self::Nrg => "NRG",
        }
    }
}

impl std::fmt::Display for DriverId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> Result<(), std::fmt::Error> {
        f.write_str(self.name())
    }
}

/// The kind of disc (or disc image) that was loaded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum DiscMode {
    /// Audio only disc
    CdDa,
    /// Mode 1 data disc
    CdData,
    /// Mode 2 (XA) data disc
    CdXa,
    /// Mixed audio and data
    CdMixed,
    DvdRom,
    /// The backend has no mode information
    NoInfo,
    /// The backend failed to determine the mode
    Error,
}

impl std::fmt::Display for DiscMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> Result<(), std::fmt::Error> {
        f.write_str(match self {
            Self::CdDa => "CD-DA",
            Self::CdData => "CD-DATA (Mode 1)",
            Self::CdXa => "CD XA (Mode 2)",
            Self::CdMixed => "CD-MIXED",
            Self::DvdRom => "DVD-ROM",
            Self::NoInfo => "No information",
            Self::Error => "Error in getting information",
        })
    }
}

/// Hardware identification as reported by an inquiry, or synthesized
/// placeholder values for image backends
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct HwInfo {
    pub vendor: String,
    pub model: String,
    pub revision: String,
}

impl HwInfo {
    pub(crate) fn for_image(model: &str) -> Self {
        Self {
            vendor: env!("CARGO_PKG_NAME").to_string(),
            model: model.to_string(),
            revision: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// The data layout of a track
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum TrackFormat {
    /// 2352 byte audio frames
    Audio,
    /// CD-i data
    Cdi,
    /// Mode 2 (XA) data
    Xa,
    /// Mode 1 data
    Data,
    /// Playstation data
    Psx,
}

impl std::fmt::Display for TrackFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> Result<(), std::fmt::Error> {
        f.write_str(match self {
            Self::Audio => "audio",
            Self::Cdi => "CD-i",
            Self::Xa => "XA",
            Self::Data => "data",
            Self::Psx => "PSX",
        })
    }
}

/// One entry in a [`Toc`]
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct TocTrack {
    /// 1-based track number
    pub number: TrackNum,
    /// First LSN of the track extent
    pub start_lsn: Lsn,
    /// Number of sectors in the track extent
    pub sectors: u32,
    pub format: TrackFormat,
    /// Whether sectors carry a mode 2 subheader ("green book" layout)
    pub green: bool,
    /// Audio channel count, when known
    pub channels: Option<u8>,
    /// Digital copy permitted flag
    pub copy_permit: bool,
    /// Linear preemphasis flag for audio tracks
    pub preemphasis: TrackFlag,
}

impl TocTrack {
    /// The last LSN belonging to this track
    pub fn last_lsn(&self) -> Lsn {
        self.start_lsn + self.sectors as Lsn - 1
    }
}

/// A parsed table of contents
///
/// Tracks are stored in ascending number order; backends guarantee
/// contiguous numbering starting at `first_track`.
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Toc {
    pub first_track: TrackNum,
    pub tracks: Vec<TocTrack>,
}

impl Toc {
    /// Looks up a track by number
    pub fn track(&self, number: TrackNum) -> Option<&TocTrack> {
        self.tracks.iter().find(|t| t.number == number)
    }

    /// The number of the last track, if any tracks exist
    pub fn last_track_num(&self) -> Option<TrackNum> {
        self.tracks.last().map(|t| t.number)
    }

    /// The number of the first track, if any tracks exist
    pub fn first_track_num(&self) -> Option<TrackNum> {
        self.tracks.first().map(|t| t.number)
    }

    /// First LSN past the end of the last track
    pub fn leadout_lsn(&self) -> Option<Lsn> {
        self.tracks.last().map(|t| t.last_lsn() + 1)
    }

    /// First LSN past `track`'s span: the next track's start, or the
    /// leadout for the last track
    pub fn span_end(&self, track: &TocTrack) -> Option<Lsn> {
        match self.tracks.iter().find(|t| t.number == track.number + 1) {
            Some(next) => Some(next.start_lsn),
            None => self.leadout_lsn(),
        }
    }

    /// The track spanning `lsn`, if any
    ///
    /// A track's span runs up to the next track's start, so an address
    /// inside a following track's pregap resolves to the preceding track.
    pub fn track_for_lsn(&self, lsn: Lsn) -> Option<&TocTrack> {
        self.tracks.iter().find(|t| {
            lsn >= t.start_lsn && self.span_end(t).is_some_and(|end| lsn < end)
        })
    }
}

/// The backend interface: raw sector access plus disc metadata
///
/// Implementations report failures as [`DriverStatus`] codes; translation
/// into the public error taxonomy is the device layer's job.
pub trait BackendDriver {
    fn driver_id(&self) -> DriverId;

    /// The source string this session was opened from
    fn source(&self) -> &str;

    /// The parsed table of contents
    fn toc(&self) -> &Toc;

    /// Reads `count` sectors of `mode` starting at `lsn` into `buf`,
    /// returning the number of bytes produced
    fn read_sectors(
        &mut self,
        buf: &mut [u8],
        lsn: Lsn,
        mode: ReadMode,
        count: u32,
    ) -> Result<usize, DriverStatus>;

    /// Repositions the byte-stream read cursor
    fn lseek(&mut self, pos: SeekFrom) -> Result<u64, DriverStatus>;

    fn disc_mode(&self) -> DiscMode;

    /// The last addressable LSN of the disc
    fn disc_last_lsn(&self) -> Option<Lsn>;

    /// First LSN of the first track of the last session
    fn last_session(&self) -> Result<Lsn, DriverStatus> {
        Err(DriverStatus::Unsupported)
    }

    /// Media catalog number, when present
    fn mcn(&self) -> Option<String> {
        None
    }

    fn hwinfo(&self) -> HwInfo;

    /// Whether media changed since the last call
    fn media_changed(&mut self) -> Result<bool, DriverStatus> {
        Ok(false)
    }

    /// The three raw capability masks (read, write, misc)
    fn drive_cap(&self) -> (u32, u32, u32);

    fn eject_media(&mut self) -> Result<(), DriverStatus> {
        Err(DriverStatus::Unsupported)
    }

    fn set_blocksize(&mut self, _blocksize: usize) -> Result<(), DriverStatus> {
        Err(DriverStatus::Unsupported)
    }

    fn set_speed(&mut self, _speed: i32) -> Result<(), DriverStatus> {
        Err(DriverStatus::Unsupported)
    }

    fn audio_pause(&mut self) -> Result<(), DriverStatus> {
        Err(DriverStatus::Unsupported)
    }

    fn audio_resume(&mut self) -> Result<(), DriverStatus> {
        Err(DriverStatus::Unsupported)
    }

    fn audio_stop(&mut self) -> Result<(), DriverStatus> {
        Err(DriverStatus::Unsupported)
    }

    fn audio_play_lsn(&mut self, _start: Lsn, _end: Lsn) -> Result<(), DriverStatus> {
        Err(DriverStatus::Unsupported)
    }
}

/// Derives the disc mode from the track formats of a TOC
pub(crate) fn classify(formats: impl Iterator<Item = TrackFormat>) -> DiscMode {
    let mut audio = false;
    let mut data = false;
    let mut xa = false;
    for f in formats {
        match f {
            TrackFormat::Audio => audio = true,
            TrackFormat::Xa | TrackFormat::Cdi => xa = true,
            _ => data = true,
        }
    }
    match (audio, data, xa) {
        (true, false, false) => DiscMode::CdDa,
        (false, true, false) => DiscMode::CdData,
        (false, _, true) => DiscMode::CdXa,
        (true, _, _) => DiscMode::CdMixed,
        (false, false, false) => DiscMode::NoInfo,
    }
}

/// Maps a read request onto one sector as stored in an image file
///
/// `stored_size` is the byte size of the sector in the image and `green`
/// marks mode 2 layouts. Returns `(skip, len)`, the window within the
/// stored sector holding the view `mode` asks for, or `None` when the
/// stored form cannot produce that view.
pub(crate) fn sector_window(
    mode: ReadMode,
    stored_size: usize,
    green: bool,
) -> Option<(usize, usize)> {
    use crate::{
        CD_FRAMESIZE, CD_FRAMESIZE_RAW, CD_HEADER_SIZE, CD_SUBHEADER_SIZE, CD_SYNC_SIZE,
        M2RAW_SECTOR_SIZE,
    };
    let want = mode.block_size();
    if stored_size == want {
        return Some((0, want));
    }
    match (stored_size, want) {
        // Raw sector down to 2048 bytes of user data
        (CD_FRAMESIZE_RAW, CD_FRAMESIZE) => {
            let skip = if green {
                CD_SYNC_SIZE + CD_HEADER_SIZE + CD_SUBHEADER_SIZE
            } else {
                CD_SYNC_SIZE + CD_HEADER_SIZE
            };
            Some((skip, want))
        }
        // Raw sector down to mode 2 subheader plus data
        (CD_FRAMESIZE_RAW, M2RAW_SECTOR_SIZE) if green => {
            Some((CD_SYNC_SIZE + CD_HEADER_SIZE, want))
        }
        // Mode 2 stored without sync and header
        (M2RAW_SECTOR_SIZE, CD_FRAMESIZE) => Some((CD_SUBHEADER_SIZE, want)),
        _ => None,
    }
}

/// Returns whether the given backend is compiled in
pub fn have_driver(id: DriverId) -> bool {
    !matches!(id, DriverId::Unknown)
}

/// Conventional device nodes probed when no source is given
const DEFAULT_DEVICE_NODES: &[&str] = &["/dev/cdrom", "/dev/dvd", "/dev/sr0", "/dev/sr1"];

/// Finds a default device node and the backend that would handle it
///
/// Returns `None` when no conventional device node exists; this is a
/// normal outcome on machines without an optical drive.
pub fn get_default_device_driver() -> Option<(String, DriverId)> {
    DEFAULT_DEVICE_NODES
        .iter()
        .find(|node| Path::new(node).exists())
        .map(|node| (node.to_string(), DriverId::Device))
}

/// Returns the matching CUE sheet path if `path` names the BIN part of a
/// BIN/CUE image pair
pub fn is_binfile(path: &str) -> Option<String> {
    bincue::matching_sheet(path, "bin", "cue")
}

/// Returns the matching BIN path if `path` names the CUE part of a
/// BIN/CUE image pair
pub fn is_cuefile(path: &str) -> Option<String> {
    let cue = Path::new(path);
    if !cue.extension().is_some_and(|e| e.eq_ignore_ascii_case("cue")) {
        return None;
    }
    bincue::parse_sheet(path)
        .ok()
        .map(|sheet| sheet.bin_path.to_string_lossy().into_owned())
}

/// Returns whether `path` names a cdrdao TOC file
pub fn is_tocfile(path: &str) -> bool {
    Path::new(path)
        .extension()
        .is_some_and(|e| e.eq_ignore_ascii_case("toc"))
        && cdrdao::parse_toc(path).is_ok()
}

/// Returns whether `path` names a Nero NRG image
pub fn is_nrg(path: &str) -> bool {
    nrg::read_footer(path).is_ok()
}

/// Opens `source` with the hinted backend, or probes for one
pub(crate) fn open_driver(
    source: &str,
    hint: DriverId,
    access_mode: Option<&str>,
) -> Result<Box<dyn BackendDriver>, CdError> {
    if let Some(mode) = access_mode {
        debug!("access mode {mode:?} requested; backends treat it as advisory");
    }
    match hint {
        DriverId::BinCue => Ok(Box::new(bincue::BinCue::open(source)?)),
        DriverId::Cdrdao => Ok(Box::new(cdrdao::Cdrdao::open(source)?)),
        DriverId::Nrg => Ok(Box::new(nrg::Nrg::open(source)?)),
        DriverId::Device => Ok(Box::new(gendev::GenDev::open(source)?)),
        DriverId::Unknown => probe(source),
    }
}

/// Probes backends able to recognize `source` and binds the first match
fn probe(source: &str) -> Result<Box<dyn BackendDriver>, CdError> {
    let path = Path::new(source);
    if path.is_file() {
        let mut attempts: Vec<(DriverId, CdError)> = Vec::new();
        match cdrdao::Cdrdao::open(source) {
            Ok(drv) => return Ok(Box::new(drv)),
            Err(e) => attempts.push((DriverId::Cdrdao, e)),
        }
        match nrg::Nrg::open(source) {
            Ok(drv) => return Ok(Box::new(drv)),
            Err(e) => attempts.push((DriverId::Nrg, e)),
        }
        // Last because it also accepts bare BIN/ISO files
        match bincue::BinCue::open(source) {
            Ok(drv) => return Ok(Box::new(drv)),
            Err(e) => attempts.push((DriverId::BinCue, e)),
        }
        for (id, e) in &attempts {
            debug!("{id} driver rejected {source:?}: {e}");
        }
        warn!("no image driver accepted {source:?}");
        return Err(CdError::NoDriver(source.to_string()));
    }
    if path.exists() {
        return match gendev::GenDev::open(source) {
            Ok(drv) => Ok(Box::new(drv)),
            Err(e) => {
                warn!("device driver rejected {source:?}: {e}");
                Err(CdError::NoDriver(source.to_string()))
            }
        };
    }
    Err(CdError::NoDriver(source.to_string()))
}

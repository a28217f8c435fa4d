//! cdrdao TOC image backend
//!
//! A cdrdao TOC file is a text description of the disc produced by the
//! `cdrdao` burning tool. Unlike a CUE sheet it may reference several
//! payload files and interleave them with stretches of silence, so each
//! track here is a list of segments rather than one file window.

use super::{
    BackendDriver, DiscMode, DriverId, HwInfo, Toc, TocTrack, TrackFormat, classify,
    sector_window,
};
use crate::capability::MISC_FILE_BIT;
use crate::device::ReadMode;
use crate::error::{CdError, DriverStatus};
use crate::track::TrackFlag;
use crate::{
    CD_FRAMESIZE, CD_FRAMESIZE_RAW, Lsn, M2F2_SECTOR_SIZE, M2RAW_SECTOR_SIZE, TrackNum,
};
use cdutils::msf;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug)]
enum Payload {
    /// Sectors stored in a payload file starting at the given byte offset
    File { path: PathBuf, byte_offset: u64, sectors: Option<u32> },
    /// Sectors of silence not stored anywhere
    Zero { sectors: u32 },
}

#[derive(Debug)]
struct ParsedTrack {
    format: TrackFormat,
    sector_size: usize,
    green: bool,
    copy_permit: bool,
    preemphasis: bool,
    four_channel: bool,
    payloads: Vec<Payload>,
}

/// A parsed TOC file, before payload files are opened
#[derive(Debug)]
pub(crate) struct ParsedToc {
    catalog: Option<String>,
    tracks: Vec<ParsedTrack>,
}

fn bad_toc(line_no: usize, what: &str) -> CdError {
    CdError::BadParameter(format!("TOC file line {line_no}: {what}"))
}

/// Parses a length or position: `mm:ss:ff` or a plain sector count
fn parse_len(s: &str, line_no: usize) -> Result<u32, CdError> {
    if s.contains(':') {
        let mut it = s.split(':');
        let mut next = || {
            it.next()
                .and_then(|v| v.parse::<u32>().ok())
                .ok_or_else(|| bad_toc(line_no, &format!("invalid MSF length {s:?}")))
        };
        let (m, sec, f) = (next()?, next()?, next()?);
        if sec >= 60 || f >= msf::FRAMES_PER_SEC as u32 {
            return Err(bad_toc(line_no, "out of range MSF length"));
        }
        Ok(msf::msf_to_frames(m, sec, f))
    } else {
        s.parse()
            .map_err(|_| bad_toc(line_no, &format!("invalid length {s:?}")))
    }
}

fn unquote(s: &str, line_no: usize) -> Result<&str, CdError> {
    s.strip_prefix('"')
        .and_then(|rest| rest.split('"').next())
        .ok_or_else(|| bad_toc(line_no, &format!("expected quoted string, got {s:?}")))
}

fn track_mode(mode: &str, line_no: usize) -> Result<(TrackFormat, usize, bool), CdError> {
    Ok(match mode {
        "AUDIO" => (TrackFormat::Audio, CD_FRAMESIZE_RAW, false),
        "MODE1" => (TrackFormat::Data, CD_FRAMESIZE, false),
        "MODE1_RAW" => (TrackFormat::Data, CD_FRAMESIZE_RAW, false),
        "MODE2" | "MODE2_FORM_MIX" => (TrackFormat::Xa, M2RAW_SECTOR_SIZE, true),
        "MODE2_FORM1" => (TrackFormat::Xa, CD_FRAMESIZE, true),
        "MODE2_FORM2" => (TrackFormat::Xa, M2F2_SECTOR_SIZE, true),
        "MODE2_RAW" => (TrackFormat::Xa, CD_FRAMESIZE_RAW, true),
        other => return Err(bad_toc(line_no, &format!("unknown track mode {other:?}"))),
    })
}

/// Parses a cdrdao TOC file
pub(crate) fn parse_toc(path: &str) -> Result<ParsedToc, CdError> {
    let text = std::fs::read_to_string(path)?;
    let dir = Path::new(path).parent().map(Path::to_path_buf).unwrap_or_default();
    let mut catalog: Option<String> = None;
    let mut tracks: Vec<ParsedTrack> = Vec::new();
    let mut saw_header = false;
    let mut brace_depth = 0usize;

    for (idx, raw_line) in text.lines().enumerate() {
        let line_no = idx + 1;
        let line = match raw_line.split("//").next() {
            Some(l) => l.trim(),
            None => continue,
        };
        if line.is_empty() {
            continue;
        }
        // CD_TEXT and LANGUAGE blocks are brace delimited; skip them whole
        if brace_depth > 0 || line.contains('{') {
            brace_depth += line.matches('{').count();
            brace_depth = brace_depth.saturating_sub(line.matches('}').count());
            continue;
        }

        let mut words = line.split_whitespace();
        let keyword = words.next().unwrap_or_default().to_string();
        let cur = tracks.last_mut();
        match keyword.as_str() {
            "CD_DA" | "CD_ROM" | "CD_ROM_XA" => saw_header = true,
            "CATALOG" => {
                let mcn = unquote(
                    words.next().ok_or_else(|| bad_toc(line_no, "CATALOG without a value"))?,
                    line_no,
                )?;
                catalog = Some(mcn.to_string());
            }
            "TRACK" => {
                let mode = words
                    .next()
                    .ok_or_else(|| bad_toc(line_no, "TRACK without a mode"))?;
                let (format, sector_size, green) = track_mode(mode, line_no)?;
                tracks.push(ParsedTrack {
                    format,
                    sector_size,
                    green,
                    copy_permit: false,
                    preemphasis: false,
                    four_channel: false,
                    payloads: Vec::new(),
                });
            }
            "COPY" => cur.ok_or_else(|| bad_toc(line_no, "COPY before any TRACK"))?.copy_permit = true,
            "PRE_EMPHASIS" => {
                cur.ok_or_else(|| bad_toc(line_no, "PRE_EMPHASIS before any TRACK"))?
                    .preemphasis = true
            }
            "NO" => {
                let track = cur.ok_or_else(|| bad_toc(line_no, "NO before any TRACK"))?;
                match words.next() {
                    Some("COPY") => track.copy_permit = false,
                    Some("PRE_EMPHASIS") => track.preemphasis = false,
                    other => debug!("ignoring TOC statement NO {other:?}"),
                }
            }
            "TWO_CHANNEL_AUDIO" => {
                cur.ok_or_else(|| bad_toc(line_no, "channel statement before any TRACK"))?
                    .four_channel = false
            }
            "FOUR_CHANNEL_AUDIO" => {
                cur.ok_or_else(|| bad_toc(line_no, "channel statement before any TRACK"))?
                    .four_channel = true
            }
            "ISRC" => {}
            "SILENCE" | "ZERO" | "PREGAP" => {
                let track = cur.ok_or_else(|| bad_toc(line_no, "gap statement before any TRACK"))?;
                let len = words
                    .next()
                    .ok_or_else(|| bad_toc(line_no, "gap statement without a length"))?;
                track.payloads.push(Payload::Zero {
                    sectors: parse_len(len, line_no)?,
                });
            }
            "DATAFILE" => {
                let track = cur.ok_or_else(|| bad_toc(line_no, "DATAFILE before any TRACK"))?;
                let name = unquote(
                    words.next().ok_or_else(|| bad_toc(line_no, "DATAFILE without a name"))?,
                    line_no,
                )?;
                let sectors = words.next().map(|l| parse_len(l, line_no)).transpose()?;
                track.payloads.push(Payload::File {
                    path: dir.join(name),
                    byte_offset: 0,
                    sectors,
                });
            }
            "FILE" | "AUDIOFILE" => {
                let track = cur.ok_or_else(|| bad_toc(line_no, "FILE before any TRACK"))?;
                let name = unquote(
                    words.next().ok_or_else(|| bad_toc(line_no, "FILE without a name"))?,
                    line_no,
                )?;
                let start = words
                    .next()
                    .map(|l| parse_len(l, line_no))
                    .transpose()?
                    .unwrap_or(0);
                let sectors = words.next().map(|l| parse_len(l, line_no)).transpose()?;
                let sector_size = track.sector_size as u64;
                track.payloads.push(Payload::File {
                    path: dir.join(name),
                    byte_offset: start as u64 * sector_size,
                    sectors,
                });
            }
            "START" | "INDEX" => {}
            other => return Err(bad_toc(line_no, &format!("unknown keyword {other:?}"))),
        }
    }

    if !saw_header {
        return Err(CdError::BadParameter(
            "TOC file lacks a disc type header".to_string(),
        ));
    }
    if tracks.is_empty() {
        return Err(CdError::BadParameter("TOC file has no tracks".to_string()));
    }
    for (i, t) in tracks.iter().enumerate() {
        if t.payloads.is_empty() {
            return Err(CdError::BadParameter(format!("track {} has no payload", i + 1)));
        }
    }
    Ok(ParsedToc { catalog, tracks })
}

/// One resolved stretch of sectors within a track
#[derive(Debug)]
struct Segment {
    start_lsn: Lsn,
    sectors: u32,
    /// Index into the payload file table, or `None` for silence
    file: Option<usize>,
    byte_offset: u64,
}

#[derive(Debug)]
struct DaoTrack {
    toc: TocTrack,
    sector_size: usize,
    segments: Vec<Segment>,
}

/// The cdrdao TOC backend
pub struct Cdrdao {
    source: String,
    files: Vec<File>,
    tracks: Vec<DaoTrack>,
    toc: Toc,
    mcn: Option<String>,
    disc_mode: DiscMode,
}

impl Cdrdao {
    /// Opens a cdrdao TOC file and its payload files
    pub fn open(source: &str) -> Result<Self, CdError> {
        if !Path::new(source)
            .extension()
            .is_some_and(|e| e.eq_ignore_ascii_case("toc"))
        {
            return Err(CdError::NoDriver(source.to_string()));
        }
        let parsed = parse_toc(source)?;

        let mut files: Vec<File> = Vec::new();
        let mut file_paths: Vec<PathBuf> = Vec::new();
        fn open_payload(
            files: &mut Vec<File>,
            paths: &mut Vec<PathBuf>,
            path: &PathBuf,
        ) -> Result<usize, CdError> {
            if let Some(i) = paths.iter().position(|p| p == path) {
                return Ok(i);
            }
            files.push(File::open(path)?);
            paths.push(path.clone());
            Ok(files.len() - 1)
        }

        let mut tracks: Vec<DaoTrack> = Vec::with_capacity(parsed.tracks.len());
        let mut cursor: Lsn = 0;
        for (i, pt) in parsed.tracks.iter().enumerate() {
            let start_lsn = cursor;
            let mut segments = Vec::with_capacity(pt.payloads.len());
            for payload in &pt.payloads {
                let (file, byte_offset, sectors) = match payload {
                    Payload::Zero { sectors } => (None, 0, *sectors),
                    Payload::File { path, byte_offset, sectors } => {
                        let idx = open_payload(&mut files, &mut file_paths, path)?;
                        let sectors = match sectors {
                            Some(s) => *s,
                            None => {
                                let len = files[idx].metadata()?.len();
                                if len < *byte_offset {
                                    return Err(CdError::BadParameter(format!(
                                        "payload {path:?} is shorter than its start offset"
                                    )));
                                }
                                ((len - byte_offset) / pt.sector_size as u64) as u32
                            }
                        };
                        (Some(idx), *byte_offset, sectors)
                    }
                };
                segments.push(Segment {
                    start_lsn: cursor,
                    sectors,
                    file,
                    byte_offset,
                });
                cursor += sectors as Lsn;
            }
            let (channels, preemphasis) = match pt.format {
                TrackFormat::Audio => (
                    Some(if pt.four_channel { 4 } else { 2 }),
                    TrackFlag::from(pt.preemphasis),
                ),
                _ => (None, TrackFlag::Unknown),
            };
            tracks.push(DaoTrack {
                toc: TocTrack {
                    number: (i + 1) as TrackNum,
                    start_lsn,
                    sectors: (cursor - start_lsn) as u32,
                    format: pt.format,
                    green: pt.green,
                    channels,
                    copy_permit: pt.copy_permit,
                    preemphasis,
                },
                sector_size: pt.sector_size,
                segments,
            });
        }

        let disc_mode = classify(tracks.iter().map(|t| t.toc.format));
        let toc = Toc {
            first_track: 1,
            tracks: tracks.iter().map(|t| t.toc.clone()).collect(),
        };
        debug!(
            "opened cdrdao image {source:?}: {} track(s), {} payload file(s), {disc_mode}",
            toc.tracks.len(),
            files.len()
        );
        Ok(Self {
            source: source.to_string(),
            files,
            tracks,
            toc,
            mcn: parsed.catalog,
            disc_mode,
        })
    }

    fn locate(&self, lsn: Lsn) -> Option<(&DaoTrack, &Segment)> {
        let track = self
            .tracks
            .iter()
            .find(|t| lsn >= t.toc.start_lsn && lsn <= t.toc.last_lsn())?;
        let segment = track
            .segments
            .iter()
            .find(|s| lsn >= s.start_lsn && lsn < s.start_lsn + s.sectors as Lsn)?;
        Some((track, segment))
    }
}

impl BackendDriver for Cdrdao {
    fn driver_id(&self) -> DriverId {
        DriverId::Cdrdao
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
        let mut produced = 0usize;
        let mut sector = [0u8; CD_FRAMESIZE_RAW];
        for i in 0..count as Lsn {
            let cur = lsn + i;
            let (sector_size, green, read_from) = match self.locate(cur) {
                Some((track, segment)) => (
                    track.sector_size,
                    track.toc.green,
                    segment.file.map(|idx| {
                        (
                            idx,
                            segment.byte_offset
                                + (cur - segment.start_lsn) as u64 * track.sector_size as u64,
                        )
                    }),
                ),
                None => return Err(DriverStatus::BadParameter),
            };
            let out = &mut buf[produced..produced + block];
            match read_from {
                Some((idx, pos)) => {
                    let (skip, len) = sector_window(mode, sector_size, green)
                        .ok_or(DriverStatus::Unsupported)?;
                    let file = &mut self.files[idx];
                    file.seek(SeekFrom::Start(pos)).map_err(|_| DriverStatus::Error)?;
                    let stored = &mut sector[..sector_size];
                    file.read_exact(stored).map_err(|_| DriverStatus::Error)?;
                    out.copy_from_slice(&stored[skip..skip + len]);
                }
                None => out.fill(0),
            }
            produced += block;
        }
        Ok(produced)
    }

    fn lseek(&mut self, pos: SeekFrom) -> Result<u64, DriverStatus> {
        // Byte stream access maps onto the first payload file
        match self.files.first_mut() {
            Some(f) => f.seek(pos).map_err(|_| DriverStatus::Error),
            None => Err(DriverStatus::Unsupported),
        }
    }

    fn disc_mode(&self) -> DiscMode {
        self.disc_mode
    }

    fn disc_last_lsn(&self) -> Option<Lsn> {
        self.toc.leadout_lsn().map(|l| l - 1)
    }

    fn last_session(&self) -> Result<Lsn, DriverStatus> {
        self.toc
            .tracks
            .first()
            .map(|t| t.start_lsn)
            .ok_or(DriverStatus::Error)
    }

    fn mcn(&self) -> Option<String> {
        self.mcn.clone()
    }

    fn hwinfo(&self) -> HwInfo {
        HwInfo::for_image("CDRDAO disc image")
    }

    fn drive_cap(&self) -> (u32, u32, u32) {
        let read = 0x00001 | 0x00002 | 0x01000 | 0x02000 | 0x04000;
        (read, 0, MISC_FILE_BIT)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn lengths() {
        assert_eq!(parse_len("00:02:00", 1).unwrap(), 150);
        assert_eq!(parse_len("300", 1).unwrap(), 300);
        assert!(parse_len("00:61:00", 1).is_err());
    }

    #[test]
    fn toc_parsing() {
        let dir = tempfile::tempdir().unwrap();
        let data = dir.path().join("data.iso");
        std::fs::write(&data, vec![0u8; CD_FRAMESIZE * 8]).unwrap();
        let toc_path = dir.path().join("disc.toc");
        std::fs::write(
            &toc_path,
            concat!(
                "CD_ROM\n",
                "CATALOG \"1234567890123\"\n",
                "// a comment\n",
                "TRACK MODE1\n",
                "DATAFILE \"data.iso\"\n",
                "TRACK AUDIO\n",
                "FOUR_CHANNEL_AUDIO\n",
                "COPY\n",
                "SILENCE 00:00:10\n",
            ),
        )
        .unwrap();
        let drv = Cdrdao::open(toc_path.to_str().unwrap()).unwrap();
        assert_eq!(drv.toc.tracks.len(), 2);
        assert_eq!(drv.toc.tracks[0].sectors, 8);
        assert_eq!(drv.toc.tracks[1].start_lsn, 8);
        assert_eq!(drv.toc.tracks[1].sectors, 10);
        assert_eq!(drv.toc.tracks[1].channels, Some(4));
        assert!(drv.toc.tracks[1].copy_permit);
        assert_eq!(drv.mcn().as_deref(), Some("1234567890123"));
        assert_eq!(drv.disc_mode(), DiscMode::CdMixed);
    }

    #[test]
    fn silence_reads_as_zeros() {
        let dir = tempfile::tempdir().unwrap();
        let data = dir.path().join("data.iso");
        std::fs::write(&data, vec![0x5au8; CD_FRAMESIZE * 2]).unwrap();
        let toc_path = dir.path().join("disc.toc");
        std::fs::write(
            &toc_path,
            "CD_ROM\nTRACK MODE1\nDATAFILE \"data.iso\"\nTRACK AUDIO\nSILENCE 5\n",
        )
        .unwrap();
        let mut drv = Cdrdao::open(toc_path.to_str().unwrap()).unwrap();
        let mut buf = vec![0xffu8; CD_FRAMESIZE];
        drv.read_sectors(&mut buf, 1, ReadMode::M1f2, 1).unwrap();
        assert!(buf.iter().all(|&b| b == 0x5a));
        let mut audio = vec![0xffu8; CD_FRAMESIZE_RAW];
        drv.read_sectors(&mut audio, 3, ReadMode::Audio, 1).unwrap();
        assert!(audio.iter().all(|&b| b == 0));
    }

    #[test]
    fn rejects_junk() {
        let dir = tempfile::tempdir().unwrap();
        let toc_path = dir.path().join("bad.toc");
        std::fs::write(&toc_path, "this is not a toc file\n").unwrap();
        assert!(Cdrdao::open(toc_path.to_str().unwrap()).is_err());
        assert!(parse_toc(toc_path.to_str().unwrap()).is_err());
    }
}

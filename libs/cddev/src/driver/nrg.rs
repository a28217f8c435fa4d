//! Nero NRG image backend
//!
//! An NRG file is the disc payload followed by a chunk directory and a
//! footer. The footer (last 12 bytes for version 2, last 8 for version 1)
//! holds the directory offset; the directory is a sequence of
//! `[id][u32 length][payload]` chunks terminated by `END!`. Track layout
//! comes from the CUEX/CUES cue chunks combined with the DAOX/DAOI
//! disc-at-once chunks.

use super::{
    BackendDriver, DiscMode, DriverId, HwInfo, Toc, TocTrack, TrackFormat, classify,
    sector_window,
};
use crate::capability::MISC_FILE_BIT;
use crate::device::ReadMode;
use crate::error::{CdError, DriverStatus};
use crate::track::TrackFlag;
use crate::{CD_FRAMESIZE, CD_FRAMESIZE_RAW, Lsn, M2RAW_SECTOR_SIZE, TrackNum};
use cdutils::io::{rdi32be, rdu8, rdu16be, rdu32be, rdu64be};
use std::fs::File;
use std::io::{Cursor, Read, Seek, SeekFrom};
use tracing::{debug, warn};

/// Cue entry control nibble: linear preemphasis
const CTRL_PRE_EMPHASIS: u8 = 0x1;
/// Cue entry control nibble: digital copy permitted
const CTRL_COPY_PERMITTED: u8 = 0x2;
/// Cue entry control nibble: data track
const CTRL_DATA: u8 = 0x4;
/// Cue entry control nibble: four channel audio
const CTRL_FOUR_CHANNEL: u8 = 0x8;

fn bad_image(what: &str) -> CdError {
    CdError::BadParameter(format!("NRG image: {what}"))
}

/// Locates the chunk directory via the trailing footer
pub(crate) fn read_footer(path: &str) -> Result<u64, CdError> {
    let mut file = File::open(path)?;
    let len = file.metadata()?.len();
    if len >= 12 {
        file.seek(SeekFrom::End(-12))?;
        let mut tail = [0u8; 12];
        file.read_exact(&mut tail)?;
        if &tail[0..4] == b"NER5" {
            let offset = rdu64be(&mut Cursor::new(&tail[4..12]))?;
            if offset >= len {
                return Err(bad_image("directory offset past end of file"));
            }
            return Ok(offset);
        }
        if &tail[4..8] == b"NERO" {
            let offset = rdu32be(&mut Cursor::new(&tail[8..12]))? as u64;
            if offset >= len {
                return Err(bad_image("directory offset past end of file"));
            }
            return Ok(offset);
        }
    }
    Err(CdError::NoDriver(path.to_string()))
}

fn from_bcd(b: u8) -> u8 {
    (b >> 4) * 10 + (b & 0x0f)
}

#[derive(Debug)]
struct CueEntry {
    control: u8,
    /// 1-based track number; `None` for lead-in and leadout entries
    track: Option<TrackNum>,
    index: u8,
    lsn: Lsn,
}

#[derive(Debug)]
struct DaoBlock {
    sector_size: usize,
    format: TrackFormat,
    green: bool,
    start_offset: u64,
    end_offset: u64,
}

fn parse_cue_chunk(payload: &[u8]) -> Result<Vec<CueEntry>, CdError> {
    if payload.len() % 8 != 0 {
        return Err(bad_image("cue chunk length is not a multiple of 8"));
    }
    let mut cur = Cursor::new(payload);
    let mut entries = Vec::with_capacity(payload.len() / 8);
    for _ in 0..payload.len() / 8 {
        let adr_ctrl = rdu8(&mut cur)?;
        let track_bcd = rdu8(&mut cur)?;
        let index = rdu8(&mut cur)?;
        let _pad = rdu8(&mut cur)?;
        let lsn = rdi32be(&mut cur)?;
        let track = match track_bcd {
            0x00 | 0xaa => None,
            bcd => Some(from_bcd(bcd)),
        };
        entries.push(CueEntry {
            control: adr_ctrl >> 4,
            track,
            index,
            lsn,
        });
    }
    Ok(entries)
}

fn dao_layout(mode: u16) -> Result<(TrackFormat, usize, bool), CdError> {
    Ok(match mode {
        0x00 => (TrackFormat::Data, CD_FRAMESIZE, false),
        0x02 => (TrackFormat::Xa, CD_FRAMESIZE, true),
        0x03 => (TrackFormat::Xa, M2RAW_SECTOR_SIZE, true),
        0x05 => (TrackFormat::Data, CD_FRAMESIZE_RAW, false),
        0x06 => (TrackFormat::Xa, CD_FRAMESIZE_RAW, true),
        0x07 => (TrackFormat::Audio, CD_FRAMESIZE_RAW, false),
        other => return Err(bad_image(&format!("unknown track mode code {other:#x}"))),
    })
}

/// Parses a DAOX (64-bit offsets) or DAOI (32-bit offsets) chunk
fn parse_dao_chunk(payload: &[u8], wide: bool) -> Result<(Option<String>, Vec<DaoBlock>), CdError> {
    let header_len = 22;
    let block_len = if wide { 42 } else { 30 };
    if payload.len() < header_len || (payload.len() - header_len) % block_len != 0 {
        return Err(bad_image("malformed disc-at-once chunk"));
    }
    let mut cur = Cursor::new(payload);
    let _chunk_size = rdu32be(&mut cur)?;
    let mut mcn_raw = [0u8; 13];
    cur.read_exact(&mut mcn_raw)?;
    let _pad = rdu8(&mut cur)?;
    let _toc_type = rdu16be(&mut cur)?;
    let first_track = rdu8(&mut cur)?;
    let last_track = rdu8(&mut cur)?;
    let mcn = if mcn_raw.iter().all(|b| b.is_ascii_digit()) {
        Some(String::from_utf8_lossy(&mcn_raw).into_owned())
    } else {
        None
    };

    let n_blocks = (payload.len() - header_len) / block_len;
    if last_track.saturating_sub(first_track) as usize + 1 != n_blocks {
        warn!(
            "disc-at-once chunk advertises tracks {first_track}..={last_track} but carries {n_blocks} block(s)"
        );
    }
    let mut blocks = Vec::with_capacity(n_blocks);
    for _ in 0..n_blocks {
        let mut isrc = [0u8; 12];
        cur.read_exact(&mut isrc)?;
        let sector_size = rdu16be(&mut cur)? as usize;
        let mode = rdu16be(&mut cur)?;
        let _unknown = rdu16be(&mut cur)?;
        let (_pregap_offset, start_offset, end_offset) = if wide {
            (rdu64be(&mut cur)?, rdu64be(&mut cur)?, rdu64be(&mut cur)?)
        } else {
            (
                rdu32be(&mut cur)? as u64,
                rdu32be(&mut cur)? as u64,
                rdu32be(&mut cur)? as u64,
            )
        };
        let (format, expected_size, green) = dao_layout(mode)?;
        if sector_size != expected_size {
            warn!(
                "track mode {mode:#x} usually stores {expected_size} byte sectors, image says {sector_size}"
            );
        }
        if end_offset < start_offset {
            return Err(bad_image("track data range goes backwards"));
        }
        blocks.push(DaoBlock {
            sector_size,
            format,
            green,
            start_offset,
            end_offset,
        });
    }
    Ok((mcn, blocks))
}

#[derive(Debug)]
struct NrgTrack {
    toc: TocTrack,
    sector_size: usize,
    file_offset: u64,
}

/// The Nero NRG backend
pub struct Nrg {
    source: String,
    file: File,
    tracks: Vec<NrgTrack>,
    toc: Toc,
    mcn: Option<String>,
    disc_mode: DiscMode,
    /// Track counts per session, from SINF chunks
    sessions: Vec<u32>,
}

impl Nrg {
    /// Opens a Nero NRG image
    pub fn open(source: &str) -> Result<Self, CdError> {
        let dir_offset = read_footer(source)?;
        let mut file = File::open(source)?;
        let file_len = file.metadata()?.len();
        file.seek(SeekFrom::Start(dir_offset))?;

        let mut cue_entries: Vec<CueEntry> = Vec::new();
        let mut mcn: Option<String> = None;
        let mut dao_blocks: Vec<DaoBlock> = Vec::new();
        let mut sessions: Vec<u32> = Vec::new();
        let mut media_type: Option<u32> = None;

        loop {
            let mut header = [0u8; 8];
            file.read_exact(&mut header)?;
            let id = &header[0..4];
            let len = rdu32be(&mut Cursor::new(&header[4..8]))? as u64;
            if id == b"END!" {
                break;
            }
            if file.stream_position()? + len > file_len {
                return Err(bad_image("chunk length past end of file"));
            }
            let mut payload = vec![0u8; len as usize];
            file.read_exact(&mut payload)?;
            match id {
                b"CUEX" | b"CUES" => cue_entries.extend(parse_cue_chunk(&payload)?),
                b"DAOX" | b"DAOI" => {
                    let (chunk_mcn, blocks) = parse_dao_chunk(&payload, id == b"DAOX")?;
                    mcn = mcn.or(chunk_mcn);
                    dao_blocks.extend(blocks);
                }
                b"SINF" => {
                    if payload.len() >= 4 {
                        sessions.push(rdu32be(&mut Cursor::new(&payload[..4]))?);
                    }
                }
                b"MTYP" => {
                    if payload.len() >= 4 {
                        media_type = Some(rdu32be(&mut Cursor::new(&payload[..4]))?);
                    }
                }
                b"ETNF" | b"ETN2" => {
                    return Err(CdError::Unsupported);
                }
                other => debug!(
                    "skipping NRG chunk {:?} ({len} bytes)",
                    String::from_utf8_lossy(other)
                ),
            }
        }

        if dao_blocks.is_empty() {
            return Err(bad_image("no disc-at-once chunk found"));
        }

        // Track start addresses come from the cue sheet (index 1 entries),
        // data placement from the disc-at-once blocks
        let mut tracks: Vec<NrgTrack> = Vec::with_capacity(dao_blocks.len());
        for (i, block) in dao_blocks.iter().enumerate() {
            let number = (i + 1) as TrackNum;
            let cue = cue_entries
                .iter()
                .find(|e| e.track == Some(number) && e.index == 1)
                .ok_or_else(|| bad_image(&format!("track {number} missing from cue chunk")))?;
            let sectors = ((block.end_offset - block.start_offset) / block.sector_size as u64) as u32;
            let (channels, preemphasis) = match block.format {
                TrackFormat::Audio => (
                    Some(if cue.control & CTRL_FOUR_CHANNEL != 0 { 4 } else { 2 }),
                    TrackFlag::from(cue.control & CTRL_PRE_EMPHASIS != 0),
                ),
                _ => (None, TrackFlag::Unknown),
            };
            if block.format != TrackFormat::Audio && cue.control & CTRL_DATA == 0 {
                warn!("track {number} is data per its mode code but audio per its cue entry");
            }
            tracks.push(NrgTrack {
                toc: TocTrack {
                    number,
                    start_lsn: cue.lsn,
                    sectors,
                    format: block.format,
                    green: block.green,
                    channels,
                    copy_permit: cue.control & CTRL_COPY_PERMITTED != 0,
                    preemphasis,
                },
                sector_size: block.sector_size,
                file_offset: block.start_offset,
            });
        }

        let disc_mode = match media_type {
            // DVD media types per Nero
            Some(t) if t & 0x1c != 0 => DiscMode::DvdRom,
            _ => classify(tracks.iter().map(|t| t.toc.format)),
        };
        let toc = Toc {
            first_track: 1,
            tracks: tracks.iter().map(|t| t.toc.clone()).collect(),
        };
        debug!(
            "opened NRG image {source:?}: {} track(s), {} session(s), {disc_mode}",
            toc.tracks.len(),
            sessions.len().max(1)
        );
        Ok(Self {
            source: source.to_string(),
            file,
            tracks,
            toc,
            mcn,
            disc_mode,
            sessions,
        })
    }

    fn track_at(&self, lsn: Lsn) -> Option<&NrgTrack> {
        self.tracks
            .iter()
            .find(|t| lsn >= t.toc.start_lsn && lsn <= t.toc.last_lsn())
    }
}

impl BackendDriver for Nrg {
    fn driver_id(&self) -> DriverId {
        DriverId::Nrg
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
            // Copy the placement out of the TOC entry so the file handle
            // can be borrowed mutably below
            let located = self.track_at(cur).map(|track| {
                (
                    track.sector_size,
                    track.toc.green,
                    track.file_offset
                        + (cur - track.toc.start_lsn) as u64 * track.sector_size as u64,
                )
            });
            let out = &mut buf[produced..produced + block];
            match located {
                Some((sector_size, green, pos)) => {
                    let (skip, len) = sector_window(mode, sector_size, green)
                        .ok_or(DriverStatus::Unsupported)?;
                    self.file
                        .seek(SeekFrom::Start(pos))
                        .map_err(|_| DriverStatus::Error)?;
                    let stored = &mut sector[..sector_size];
                    self.file
                        .read_exact(stored)
                        .map_err(|_| DriverStatus::Error)?;
                    out.copy_from_slice(&stored[skip..skip + len]);
                }
                None => {
                    if cur < 0 || self.toc.leadout_lsn().is_none_or(|l| cur >= l) {
                        return Err(DriverStatus::BadParameter);
                    }
                    out.fill(0);
                }
            }
            produced += block;
        }
        Ok(produced)
    }

    fn lseek(&mut self, pos: SeekFrom) -> Result<u64, DriverStatus> {
        self.file.seek(pos).map_err(|_| DriverStatus::Error)
    }

    fn disc_mode(&self) -> DiscMode {
        self.disc_mode
    }

    fn disc_last_lsn(&self) -> Option<Lsn> {
        self.toc.leadout_lsn().map(|l| l - 1)
    }

    fn last_session(&self) -> Result<Lsn, DriverStatus> {
        // SINF chunks carry per-session track counts; the last session
        // starts at the first track not covered by the earlier ones
        let skip: u32 = match self.sessions.split_last() {
            Some((_, earlier)) => earlier.iter().sum(),
            None => 0,
        };
        self.toc
            .tracks
            .get(skip as usize)
            .or(self.toc.tracks.first())
            .map(|t| t.start_lsn)
            .ok_or(DriverStatus::Error)
    }

    fn mcn(&self) -> Option<String> {
        self.mcn.clone()
    }

    fn hwinfo(&self) -> HwInfo {
        HwInfo::for_image("Nero disc image")
    }

    fn drive_cap(&self) -> (u32, u32, u32) {
        let read = 0x00001 | 0x00002 | 0x01000 | 0x02000 | 0x04000;
        (read, 0, MISC_FILE_BIT)
    }
}

#[cfg(test)]
pub(crate) mod test {
    use super::*;
    use std::io::Write;
    use std::path::Path;

    /// Builds a minimal version 2 NRG image: one mode 1 track stored as
    /// 2048 byte sectors, with a cue, disc-at-once and session chunk
    pub(crate) fn build_nrg(path: &Path, sectors: u32, fill: u8) -> u64 {
        let mut out = Vec::new();
        let data_len = sectors as u64 * CD_FRAMESIZE as u64;
        out.resize(data_len as usize, fill);
        let dir_offset = out.len() as u64;

        let cuex = {
            let mut p = Vec::new();
            // lead-in, track 1 index 0 and 1, leadout
            for (track, index, lsn) in [
                (0x00u8, 0u8, -150i32),
                (0x01, 0, -150),
                (0x01, 1, 0),
                (0xaa, 1, sectors as i32),
            ] {
                p.push(0x41); // data, ADR 1
                p.push(track);
                p.push(index);
                p.push(0);
                p.extend_from_slice(&lsn.to_be_bytes());
            }
            p
        };
        let daox = {
            let mut p = Vec::new();
            p.extend_from_slice(&64u32.to_be_bytes());
            p.extend_from_slice(b"1234567890123");
            p.push(0);
            p.extend_from_slice(&0u16.to_be_bytes());
            p.push(1); // first track
            p.push(1); // last track
            p.extend_from_slice(b"\0\0\0\0\0\0\0\0\0\0\0\0"); // isrc
            p.extend_from_slice(&(CD_FRAMESIZE as u16).to_be_bytes());
            p.extend_from_slice(&0u16.to_be_bytes()); // mode 1, 2048
            p.extend_from_slice(&0u16.to_be_bytes());
            p.extend_from_slice(&0u64.to_be_bytes()); // pregap offset
            p.extend_from_slice(&0u64.to_be_bytes()); // start offset
            p.extend_from_slice(&data_len.to_be_bytes()); // end offset
            p
        };
        let sinf = 1u32.to_be_bytes().to_vec();

        for (id, payload) in [
            (&b"CUEX"[..], &cuex),
            (&b"DAOX"[..], &daox),
            (&b"SINF"[..], &sinf),
        ] {
            out.extend_from_slice(id);
            out.extend_from_slice(&(payload.len() as u32).to_be_bytes());
            out.extend_from_slice(payload);
        }
        out.extend_from_slice(b"END!");
        out.extend_from_slice(&0u32.to_be_bytes());
        out.extend_from_slice(b"NER5");
        out.extend_from_slice(&dir_offset.to_be_bytes());

        let mut f = File::create(path).unwrap();
        f.write_all(&out).unwrap();
        dir_offset
    }

    #[test]
    fn footer_detection() {
        let dir = tempfile::tempdir().unwrap();
        let img = dir.path().join("disc.nrg");
        let offset = build_nrg(&img, 3, 0);
        assert_eq!(read_footer(img.to_str().unwrap()).unwrap(), offset);

        let not_nrg = dir.path().join("plain.bin");
        std::fs::write(&not_nrg, vec![0u8; 4096]).unwrap();
        assert!(matches!(
            read_footer(not_nrg.to_str().unwrap()),
            Err(CdError::NoDriver(_))
        ));
    }

    #[test]
    fn open_and_read() {
        let dir = tempfile::tempdir().unwrap();
        let img = dir.path().join("disc.nrg");
        build_nrg(&img, 5, 0x7e);
        let mut drv = Nrg::open(img.to_str().unwrap()).unwrap();
        assert_eq!(drv.toc.tracks.len(), 1);
        assert_eq!(drv.toc.tracks[0].start_lsn, 0);
        assert_eq!(drv.toc.tracks[0].sectors, 5);
        assert_eq!(drv.toc.tracks[0].format, TrackFormat::Data);
        assert_eq!(drv.mcn().as_deref(), Some("1234567890123"));
        assert_eq!(drv.disc_last_lsn(), Some(4));
        assert_eq!(drv.last_session(), Ok(0));

        let mut buf = vec![0u8; CD_FRAMESIZE];
        drv.read_sectors(&mut buf, 2, ReadMode::M1f2, 1).unwrap();
        assert!(buf.iter().all(|&b| b == 0x7e));
        assert_eq!(
            drv.read_sectors(&mut buf, 5, ReadMode::M1f2, 1),
            Err(DriverStatus::BadParameter)
        );
    }

    #[test]
    fn bcd_tracks() {
        assert_eq!(from_bcd(0x01), 1);
        assert_eq!(from_bcd(0x12), 12);
        assert_eq!(from_bcd(0x99), 99);
    }
}

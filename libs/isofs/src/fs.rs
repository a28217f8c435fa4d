//! The filesystem reader
//!
//! [`IsoFs`] binds a [`SectorSource`], locates the descriptor set and
//! answers directory listings, path lookups and extent reads. When a
//! Joliet supplementary descriptor is present its directory hierarchy is
//! used and names are decoded from UCS-2.

use crate::dirent::{DirectoryRecord, IsoStat, RecordName, name_translate};
use crate::error::IsoError;
use crate::source::{ISO_BLOCKSIZE, ISO_PVD_SECTOR, ImageSource, SectorSource};
use crate::volume::{Descriptor, VolumeDescriptor, parse_descriptor};
use cddev::Lsn;
use std::path::Path;
use tracing::{debug, warn};

/// Highest sector probed for descriptors past the primary one
const MAX_DESCRIPTORS: Lsn = 32;

/// An ISO9660 filesystem over some block source
pub struct IsoFs<S: SectorSource> {
    source: S,
    pvd: VolumeDescriptor,
    svd: Option<VolumeDescriptor>,
}

impl IsoFs<ImageSource> {
    /// Opens an image file with standard 2048 byte sector framing
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, IsoError> {
        Self::new(ImageSource::open(path)?)
    }

    /// Opens an image file, locating the superblock by content
    ///
    /// Handles raw sector framings and up to `fuzz` sectors of leading
    /// slack; [`DEFAULT_FUZZ`](crate::source::DEFAULT_FUZZ) is a
    /// reasonable bound.
    pub fn open_fuzzy<P: AsRef<Path>>(path: P, fuzz: u16) -> Result<Self, IsoError> {
        Self::new(ImageSource::open_fuzzy(path, fuzz)?)
    }
}

impl<S: SectorSource> IsoFs<S> {
    /// Reads the superblock from `source` and binds the filesystem
    pub fn new(mut source: S) -> Result<Self, IsoError> {
        let (pvd, svd) = read_superblock(&mut source)?;
        if let Some(svd) = &svd {
            debug!("Joliet level {} hierarchy selected", svd.joliet_level);
        }
        Ok(Self { source, pvd, svd })
    }

    /// The descriptor whose hierarchy is being used
    fn active(&self) -> &VolumeDescriptor {
        self.svd.as_ref().unwrap_or(&self.pvd)
    }

    /// Joliet level of the filesystem, 0 when plain ISO9660
    pub fn joliet_level(&self) -> u8 {
        self.active().joliet_level
    }

    /// The primary (non Joliet) volume descriptor
    pub fn primary_descriptor(&self) -> &VolumeDescriptor {
        &self.pvd
    }

    pub fn volume_id(&self) -> Option<&str> {
        self.id(|vd| &vd.volume_id)
    }

    pub fn system_id(&self) -> Option<&str> {
        self.id(|vd| &vd.system_id)
    }

    pub fn volume_set_id(&self) -> Option<&str> {
        self.id(|vd| &vd.volume_set_id)
    }

    pub fn publisher_id(&self) -> Option<&str> {
        self.id(|vd| &vd.publisher_id)
    }

    pub fn preparer_id(&self) -> Option<&str> {
        self.id(|vd| &vd.preparer_id)
    }

    pub fn application_id(&self) -> Option<&str> {
        self.id(|vd| &vd.application_id)
    }

    /// Joliet values win, blank Joliet fields fall back to the primary
    fn id<F: Fn(&VolumeDescriptor) -> &Option<String>>(&self, field: F) -> Option<&str> {
        self.svd
            .as_ref()
            .and_then(|vd| field(vd).as_deref())
            .or_else(|| field(&self.pvd).as_deref())
    }

    /// First LSN of the root directory extent
    pub fn get_root_lsn(&self) -> Lsn {
        self.active().root.extent as Lsn
    }

    /// Volume size in logical blocks
    pub fn volume_space_size(&self) -> u32 {
        self.pvd.volume_space_size
    }

    /// Reads `count` logical blocks starting at `lsn`
    pub fn seek_read(&mut self, lsn: Lsn, count: u32) -> Result<Vec<u8>, IsoError> {
        self.source.read_blocks(lsn, count)
    }

    /// Releases the filesystem, handing back the underlying source
    pub fn close(self) -> S {
        self.source
    }

    /// Reads a file's content, truncated to its recorded size
    pub fn read_file(&mut self, stat: &IsoStat) -> Result<Vec<u8>, IsoError> {
        if stat.is_dir {
            return Err(IsoError::InvalidRecord(format!(
                "{:?} is a directory",
                stat.name
            )));
        }
        let mut data = self.source.read_blocks(stat.lsn, stat.sec_size)?;
        data.truncate(stat.size as usize);
        Ok(data)
    }

    /// Lists a directory; names are verbatim, including `.` and `..`
    pub fn readdir(&mut self, path: &str) -> Result<Vec<IsoStat>, IsoError> {
        let dir = self
            .resolve(path, false)?
            .ok_or_else(|| IsoError::NotFound(path.to_string()))?;
        if !dir.is_dir() {
            return Err(IsoError::NotFound(format!("{path:?} is not a directory")));
        }
        let joliet = self.joliet_level() > 0;
        let records = self.load_dir(&dir)?;
        Ok(records
            .iter()
            .map(|r| IsoStat::from_record(r, r.name.decode(joliet)))
            .collect())
    }

    /// Looks up a path, matching names exactly as recorded
    ///
    /// A path with no matching entry is a normal outcome and yields
    /// `None`.
    pub fn stat(&mut self, path: &str) -> Result<Option<IsoStat>, IsoError> {
        let joliet = self.joliet_level() > 0;
        Ok(self
            .resolve(path, false)?
            .map(|r| IsoStat::from_record(&r, r.name.decode(joliet))))
    }

    /// Looks up a path with translated name matching
    ///
    /// Components are compared against translated names (version suffix
    /// dropped, lowercased outside Joliet), and the returned name is the
    /// translated one.
    pub fn stat_translate(&mut self, path: &str) -> Result<Option<IsoStat>, IsoError> {
        let level = self.joliet_level();
        Ok(self.resolve(path, true)?.map(|r| {
            let name = name_translate(&r.name.decode(level > 0), level);
            IsoStat::from_record(&r, name)
        }))
    }

    /// Finds the entry whose extent spans `lsn`, searching the whole tree
    pub fn find_lsn(&mut self, lsn: Lsn) -> Result<Option<IsoStat>, IsoError> {
        let root = self.active().root.clone();
        self.find_lsn_below(&root, lsn)
    }

    fn find_lsn_below(
        &mut self,
        dir: &DirectoryRecord,
        lsn: Lsn,
    ) -> Result<Option<IsoStat>, IsoError> {
        let joliet = self.joliet_level() > 0;
        for record in self.load_dir(dir)? {
            if matches!(record.name, RecordName::Current | RecordName::Parent) {
                continue;
            }
            let start = record.extent as Lsn;
            let blocks = record.size.div_ceil(ISO_BLOCKSIZE as u32) as Lsn;
            if lsn >= start && lsn < start + blocks.max(1) {
                let name = record.name.decode(joliet);
                return Ok(Some(IsoStat::from_record(&record, name)));
            }
            if record.is_dir()
                && let Some(found) = self.find_lsn_below(&record, lsn)?
            {
                return Ok(Some(found));
            }
        }
        Ok(None)
    }

    /// Walks `path` from the root; `None` when a component has no match
    fn resolve(
        &mut self,
        path: &str,
        translate: bool,
    ) -> Result<Option<DirectoryRecord>, IsoError> {
        let level = self.joliet_level();
        let joliet = level > 0;
        let mut cur = self.active().root.clone();
        for comp in path.split('/').filter(|c| !c.is_empty() && *c != ".") {
            if !cur.is_dir() {
                return Ok(None);
            }
            let entries = self.load_dir(&cur)?;
            let hit = entries.into_iter().find(|r| {
                let name = r.name.decode(joliet);
                if translate {
                    name == comp || name_translate(&name, level) == comp
                } else {
                    name == comp
                }
            });
            match hit {
                Some(r) => cur = r,
                None => return Ok(None),
            }
        }
        Ok(Some(cur))
    }

    /// Reads and parses a whole directory extent
    fn load_dir(&mut self, dir: &DirectoryRecord) -> Result<Vec<DirectoryRecord>, IsoError> {
        let blocks = dir.size.div_ceil(ISO_BLOCKSIZE as u32);
        let data = self.source.read_blocks(dir.extent as Lsn, blocks)?;
        let mut records = Vec::new();
        for block in data.chunks(ISO_BLOCKSIZE) {
            let mut offset = 0usize;
            // Records never cross block boundaries; a zero length byte
            // pads to the end of the block
            while let Some((record, consumed)) = DirectoryRecord::parse(&block[offset..])? {
                records.push(record);
                offset += consumed;
            }
        }
        Ok(records)
    }
}

/// Locates the primary descriptor and, when present, a Joliet
/// supplementary descriptor
fn read_superblock<S: SectorSource>(
    source: &mut S,
) -> Result<(VolumeDescriptor, Option<VolumeDescriptor>), IsoError> {
    let mut pvd = None;
    let mut svd: Option<VolumeDescriptor> = None;
    for lsn in ISO_PVD_SECTOR..ISO_PVD_SECTOR + MAX_DESCRIPTORS {
        let block = source.read_blocks(lsn, 1).map_err(|e| {
            if lsn == ISO_PVD_SECTOR {
                debug!("cannot read the superblock sector: {e}");
                IsoError::NoSuperblock
            } else {
                e
            }
        })?;
        match parse_descriptor(&block) {
            Ok(Descriptor::Primary(vd)) => pvd = Some(vd),
            Ok(Descriptor::Supplementary(vd)) => {
                // Highest Joliet level wins
                if svd.as_ref().is_none_or(|old| vd.joliet_level > old.joliet_level) {
                    svd = Some(vd);
                }
            }
            Ok(Descriptor::Terminator) => break,
            Ok(Descriptor::Other(t)) => debug!("skipping volume descriptor type {t}"),
            Err(e) => {
                if lsn == ISO_PVD_SECTOR {
                    return Err(IsoError::NoSuperblock);
                }
                warn!("stopping descriptor scan at sector {lsn}: {e}");
                break;
            }
        }
    }
    pvd.map(|p| (p, svd)).ok_or(IsoError::NoSuperblock)
}

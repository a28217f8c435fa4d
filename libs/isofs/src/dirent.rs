//! Directory records and file names
//!
//! Each directory extent is a run of variable length records. Multi byte
//! fields are recorded in both endiannesses; mismatches between the two
//! copies are logged and the little endian value wins.

use crate::error::IsoError;
use cddev::Lsn;
use time::{Date, Month, PrimitiveDateTime, Time, UtcOffset};
use tracing::warn;

/// File flag: the entry is hidden from listings
const FLAG_HIDDEN: u8 = 0x01;
/// File flag: the entry is a directory
const FLAG_DIR: u8 = 0x02;

/// Reads a both-endian `u16` (4 bytes on disk)
pub(crate) fn rdu16both(buf: &[u8]) -> u16 {
    let le = u16::from_le_bytes([buf[0], buf[1]]);
    let be = u16::from_be_bytes([buf[2], buf[3]]);
    if le != be {
        warn!("both-endian u16 mismatch ({le} vs {be}), using the little endian value");
    }
    le
}

/// Reads a both-endian `u32` (8 bytes on disk)
pub(crate) fn rdu32both(buf: &[u8]) -> u32 {
    let le = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]);
    let be = u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]);
    if le != be {
        warn!("both-endian u32 mismatch ({le} vs {be}), using the little endian value");
    }
    le
}

/// Decodes the 7 byte binary timestamp used in directory records
pub(crate) fn parse_binary_date(b: &[u8]) -> Option<time::OffsetDateTime> {
    let year = 1900 + b[0] as i32;
    let month = Month::try_from(b[1]).ok()?;
    let date = Date::from_calendar_date(year, month, b[2]).ok()?;
    let tod = Time::from_hms(b[3], b[4], b[5]).ok()?;
    // Offset in 15 minute units from GMT
    let offset = UtcOffset::from_whole_seconds((b[6] as i8) as i32 * 15 * 60).ok()?;
    Some(PrimitiveDateTime::new(date, tod).assume_offset(offset))
}

/// The identifier carried by a directory record
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum RecordName {
    /// The `\0` self reference
    Current,
    /// The `\x01` parent reference
    Parent,
    Name(Vec<u8>),
}

impl RecordName {
    /// Decodes the identifier; Joliet names are UCS-2 big endian
    pub(crate) fn decode(&self, joliet: bool) -> String {
        match self {
            Self::Current => ".".to_string(),
            Self::Parent => "..".to_string(),
            Self::Name(bytes) => {
                if joliet {
                    bytes
                        .chunks_exact(2)
                        .map(|c| u16::from_be_bytes([c[0], c[1]]))
                        .map(|u| char::from_u32(u as u32).unwrap_or('\u{fffd}'))
                        .collect()
                } else {
                    bytes.iter().map(|&b| b as char).collect()
                }
            }
        }
    }
}

/// One parsed directory record
#[derive(Debug, Clone)]
pub(crate) struct DirectoryRecord {
    pub(crate) extent: u32,
    pub(crate) size: u32,
    pub(crate) flags: u8,
    pub(crate) recorded: Option<time::OffsetDateTime>,
    pub(crate) name: RecordName,
    pub(crate) xa: bool,
}

impl DirectoryRecord {
    /// Parses the record at the start of `buf`
    ///
    /// Returns the record and its on-disk length, or `None` when the
    /// length byte is zero (padding to the end of the block).
    pub(crate) fn parse(buf: &[u8]) -> Result<Option<(Self, usize)>, IsoError> {
        if buf.is_empty() {
            return Ok(None);
        }
        let len = buf[0] as usize;
        if len == 0 {
            return Ok(None);
        }
        if len < 34 || len > buf.len() {
            return Err(IsoError::InvalidRecord(format!(
                "record length {len} out of bounds"
            )));
        }
        let extent = rdu32both(&buf[2..10]);
        let size = rdu32both(&buf[10..18]);
        let recorded = parse_binary_date(&buf[18..25]);
        let flags = buf[25];
        let name_len = buf[32] as usize;
        if 33 + name_len > len {
            return Err(IsoError::InvalidRecord(format!(
                "identifier length {name_len} exceeds record length {len}"
            )));
        }
        let name_bytes = &buf[33..33 + name_len];
        let name = match name_bytes {
            [0x00] => RecordName::Current,
            [0x01] => RecordName::Parent,
            bytes => RecordName::Name(bytes.to_vec()),
        };
        // A pad byte follows even length identifiers; the rest of the
        // record is the system use area (XA attributes live there)
        let su_start = 33 + name_len + (1 - name_len % 2);
        let xa = buf
            .get(su_start..len)
            .is_some_and(|su| su.windows(2).any(|w| w == b"XA"));
        Ok(Some((
            Self {
                extent,
                size,
                flags,
                recorded,
                name,
                xa,
            },
            len,
        )))
    }

    pub(crate) fn is_dir(&self) -> bool {
        self.flags & FLAG_DIR != 0
    }

    pub(crate) fn is_hidden(&self) -> bool {
        self.flags & FLAG_HIDDEN != 0
    }
}

/// File metadata as returned by directory listings and path lookups
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct IsoStat {
    /// The entry name, translated or verbatim depending on the call
    pub name: String,
    /// First LSN of the file extent
    pub lsn: Lsn,
    /// File size in bytes
    pub size: u32,
    /// Size of the extent in whole sectors
    pub sec_size: u32,
    pub is_dir: bool,
    pub hidden: bool,
    /// Whether the record carries XA attributes
    pub xa: bool,
    /// Recording timestamp, when parseable
    #[cfg_attr(feature = "serde", serde(serialize_with = "ser_date"))]
    pub recorded: Option<time::OffsetDateTime>,
}

#[cfg(feature = "serde")]
fn ser_date<S: serde::Serializer>(
    v: &Option<time::OffsetDateTime>,
    s: S,
) -> Result<S::Ok, S::Error> {
    match v {
        Some(d) => s.serialize_some(&d.unix_timestamp()),
        None => s.serialize_none(),
    }
}

impl IsoStat {
    pub(crate) fn from_record(record: &DirectoryRecord, name: String) -> Self {
        Self {
            name,
            lsn: record.extent as Lsn,
            size: record.size,
            sec_size: record.size.div_ceil(crate::source::ISO_BLOCKSIZE as u32),
            is_dir: record.is_dir(),
            hidden: record.is_hidden(),
            xa: record.xa,
            recorded: record.recorded,
        }
    }
}

/// Translates a 9660 identifier into a friendlier file name
///
/// Strips the version suffix (`;1` and a trailing dot before it), maps
/// any interior `;` to `.` and lowercases the result on plain (non
/// Joliet) filesystems, where identifiers are recorded in upper case.
pub fn name_translate(name: &str, joliet_level: u8) -> String {
    let mut out = String::with_capacity(name.len());
    let mut stripped_version = false;
    for (i, c) in name.char_indices() {
        match c {
            ';' => {
                if name[i..]
                    .chars()
                    .skip(1)
                    .all(|d| d.is_ascii_digit())
                {
                    stripped_version = true;
                    break;
                }
                out.push('.');
            }
            c if joliet_level == 0 => out.push(c.to_ascii_lowercase()),
            c => out.push(c),
        }
    }
    // The dot is only dropped as part of a `.;N` suffix; a name that
    // genuinely ends in a dot keeps it
    if stripped_version && out.ends_with('.') {
        out.pop();
    }
    out
}

#[cfg(test)]
mod test {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn translation() {
        assert_eq!(name_translate("README.TXT;1", 0), "readme.txt");
        assert_eq!(name_translate("FOO.;1", 0), "foo");
        assert_eq!(name_translate("BARE", 0), "bare");
        assert_eq!(name_translate("Mixed.Case;1", 3), "Mixed.Case");
        assert_eq!(name_translate("A;B", 0), "a.b");
        // A dot survives unless it came with a version suffix
        assert_eq!(name_translate("FOO.", 0), "foo.");
        assert_eq!(name_translate(".", 0), ".");
    }

    #[test]
    fn binary_dates() {
        // 2024-03-05 12:30:45 UTC+1
        let raw = [124u8, 3, 5, 12, 30, 45, 4];
        assert_eq!(
            parse_binary_date(&raw),
            Some(datetime!(2024-03-05 12:30:45 +1))
        );
        assert_eq!(parse_binary_date(&[0u8, 0, 0, 0, 0, 0, 0]), None);
    }

    #[test]
    fn both_endian_values() {
        assert_eq!(rdu16both(&[0x34, 0x12, 0x12, 0x34]), 0x1234);
        assert_eq!(
            rdu32both(&[0x78, 0x56, 0x34, 0x12, 0x12, 0x34, 0x56, 0x78]),
            0x12345678
        );
        // Mismatch still yields the little endian copy
        assert_eq!(rdu16both(&[0x01, 0x00, 0x00, 0x02]), 1);
    }

    fn sample_record(name: &[u8], flags: u8) -> Vec<u8> {
        let name_len = name.len();
        let pad = 1 - name_len % 2;
        let len = 33 + name_len + pad;
        let mut rec = vec![0u8; len];
        rec[0] = len as u8;
        rec[2..6].copy_from_slice(&20u32.to_le_bytes());
        rec[6..10].copy_from_slice(&20u32.to_be_bytes());
        rec[10..14].copy_from_slice(&4096u32.to_le_bytes());
        rec[14..18].copy_from_slice(&4096u32.to_be_bytes());
        rec[18..25].copy_from_slice(&[124, 3, 5, 12, 30, 45, 0]);
        rec[25] = flags;
        rec[32] = name_len as u8;
        rec[33..33 + name_len].copy_from_slice(name);
        rec
    }

    #[test]
    fn record_parsing() {
        let raw = sample_record(b"HELLO.TXT;1", 0);
        let (rec, consumed) = DirectoryRecord::parse(&raw).unwrap().unwrap();
        assert_eq!(consumed, raw.len());
        assert_eq!(rec.extent, 20);
        assert_eq!(rec.size, 4096);
        assert!(!rec.is_dir());
        assert_eq!(rec.name.decode(false), "HELLO.TXT;1");
        assert!(rec.recorded.is_some());

        let (dot, _) = DirectoryRecord::parse(&sample_record(b"\x00", FLAG_DIR))
            .unwrap()
            .unwrap();
        assert_eq!(dot.name, RecordName::Current);
        assert!(dot.is_dir());

        assert!(DirectoryRecord::parse(&[0u8; 8]).unwrap().is_none());
        assert!(DirectoryRecord::parse(&[40u8, 0, 0]).is_err());
    }
}

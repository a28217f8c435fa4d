//! Volume descriptors
//!
//! The descriptor set starts at sector 16: a primary descriptor, optional
//! supplementary descriptors (Joliet lives here) and a terminator. All
//! identifier getters return `None` for blank fields.

use crate::dirent::{DirectoryRecord, parse_binary_date, rdu16both, rdu32both};
use crate::error::IsoError;
use crate::source::ISO_STANDARD_ID;
use time::OffsetDateTime;
use tracing::{debug, warn};

const VD_PRIMARY: u8 = 1;
const VD_SUPPLEMENTARY: u8 = 2;
const VD_TERMINATOR: u8 = 255;

/// A parsed primary or supplementary volume descriptor
#[derive(Debug, Clone)]
pub struct VolumeDescriptor {
    pub system_id: Option<String>,
    pub volume_id: Option<String>,
    pub volume_set_id: Option<String>,
    pub publisher_id: Option<String>,
    pub preparer_id: Option<String>,
    pub application_id: Option<String>,
    /// Volume size in logical blocks
    pub volume_space_size: u32,
    pub logical_block_size: u16,
    /// Joliet level (1 to 3) for supplementary descriptors, 0 otherwise
    pub joliet_level: u8,
    pub created: Option<OffsetDateTime>,
    pub(crate) root: DirectoryRecord,
}

/// One entry of the descriptor set
#[derive(Debug)]
pub(crate) enum Descriptor {
    Primary(VolumeDescriptor),
    Supplementary(VolumeDescriptor),
    Terminator,
    /// A descriptor type this reader does not interpret
    Other(u8),
}

/// Decodes a fixed width identifier field; Joliet fields are UCS-2
fn decode_id(bytes: &[u8], joliet: bool) -> Option<String> {
    let s: String = if joliet {
        bytes
            .chunks_exact(2)
            .map(|c| u16::from_be_bytes([c[0], c[1]]))
            .map(|u| char::from_u32(u as u32).unwrap_or('\u{fffd}'))
            .collect()
    } else {
        bytes.iter().map(|&b| b as char).collect()
    };
    let trimmed = s.trim_end_matches([' ', '\0']).trim_start_matches(' ');
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Decodes the 17 byte decimal timestamp used in volume descriptors
fn parse_dec_date(b: &[u8]) -> Option<OffsetDateTime> {
    let digits = &b[..16];
    if !digits.iter().all(|c| c.is_ascii_digit()) || digits == b"0000000000000000" {
        return None;
    }
    let num = |range: std::ops::Range<usize>| -> u32 {
        digits[range]
            .iter()
            .fold(0u32, |acc, &c| acc * 10 + (c - b'0') as u32)
    };
    let date = time::Date::from_calendar_date(
        num(0..4) as i32,
        time::Month::try_from(num(4..6) as u8).ok()?,
        num(6..8) as u8,
    )
    .ok()?;
    let tod = time::Time::from_hms_milli(
        num(8..10) as u8,
        num(10..12) as u8,
        num(12..14) as u8,
        (num(14..16) * 10) as u16,
    )
    .ok()?;
    let offset = time::UtcOffset::from_whole_seconds((b[16] as i8) as i32 * 15 * 60).ok()?;
    Some(time::PrimitiveDateTime::new(date, tod).assume_offset(offset))
}

/// Detects the Joliet level from the supplementary descriptor escapes
fn joliet_level(escapes: &[u8]) -> u8 {
    if escapes.len() < 3 || escapes[0] != 0x25 || escapes[1] != 0x2f {
        return 0;
    }
    match escapes[2] {
        0x40 => 1,
        0x43 => 2,
        0x45 => 3,
        other => {
            debug!("unrecognized supplementary escape {other:#x}");
            0
        }
    }
}

/// Parses one 2048 byte block of the descriptor set
pub(crate) fn parse_descriptor(block: &[u8]) -> Result<Descriptor, IsoError> {
    if block.len() < 2048 {
        return Err(IsoError::InvalidDescriptor(
            "descriptor block is truncated".to_string(),
        ));
    }
    if &block[1..6] != ISO_STANDARD_ID {
        return Err(IsoError::InvalidDescriptor(
            "bad standard identifier".to_string(),
        ));
    }
    let vd_type = block[0];
    match vd_type {
        VD_TERMINATOR => Ok(Descriptor::Terminator),
        VD_PRIMARY | VD_SUPPLEMENTARY => {
            let level = if vd_type == VD_SUPPLEMENTARY {
                joliet_level(&block[88..120])
            } else {
                0
            };
            let joliet = level > 0;
            if vd_type == VD_SUPPLEMENTARY && !joliet {
                // A supplementary descriptor without Joliet escapes is of
                // no use to this reader
                return Ok(Descriptor::Other(vd_type));
            }
            let logical_block_size = rdu16both(&block[128..132]);
            if logical_block_size != 2048 {
                warn!("unusual logical block size {logical_block_size}");
            }
            let (root, _) = DirectoryRecord::parse(&block[156..190])?.ok_or_else(|| {
                IsoError::InvalidDescriptor("empty root directory record".to_string())
            })?;
            if !root.is_dir() {
                return Err(IsoError::InvalidDescriptor(
                    "root record is not a directory".to_string(),
                ));
            }
            let vd = VolumeDescriptor {
                system_id: decode_id(&block[8..40], joliet),
                volume_id: decode_id(&block[40..72], joliet),
                volume_set_id: decode_id(&block[190..318], joliet),
                publisher_id: decode_id(&block[318..446], joliet),
                preparer_id: decode_id(&block[446..574], joliet),
                application_id: decode_id(&block[574..702], joliet),
                volume_space_size: rdu32both(&block[80..88]),
                logical_block_size,
                joliet_level: level,
                created: parse_dec_date(&block[813..830]),
                root,
            };
            if vd_type == VD_PRIMARY {
                Ok(Descriptor::Primary(vd))
            } else {
                Ok(Descriptor::Supplementary(vd))
            }
        }
        other => Ok(Descriptor::Other(other)),
    }
}

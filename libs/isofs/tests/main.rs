use isofs::{DEFAULT_FUZZ, IsoError, IsoFs};
use std::path::Path;

const BLOCK: usize = 2048;

/// Builds a directory record with a fixed recording date
fn record(name: &[u8], extent: u32, size: u32, flags: u8) -> Vec<u8> {
    let pad = 1 - name.len() % 2;
    let len = 33 + name.len() + pad;
    let mut rec = vec![0u8; len];
    rec[0] = len as u8;
    rec[2..6].copy_from_slice(&extent.to_le_bytes());
    rec[6..10].copy_from_slice(&extent.to_be_bytes());
    rec[10..14].copy_from_slice(&size.to_le_bytes());
    rec[14..18].copy_from_slice(&size.to_be_bytes());
    rec[18..25].copy_from_slice(&[124, 3, 5, 10, 30, 0, 0]);
    rec[25] = flags;
    rec[32] = name.len() as u8;
    rec[33..33 + name.len()].copy_from_slice(name);
    rec
}

fn dir_block(records: &[Vec<u8>]) -> Vec<u8> {
    let mut block = Vec::new();
    for r in records {
        block.extend_from_slice(r);
    }
    assert!(block.len() <= BLOCK);
    block.resize(BLOCK, 0);
    block
}

/// Builds a primary (type 1) or supplementary (type 2) descriptor block
fn descriptor(vd_type: u8, volume_id: &[u8], escapes: &[u8], root: &[u8]) -> Vec<u8> {
    let mut block = vec![0u8; BLOCK];
    block[0] = vd_type;
    block[1..6].copy_from_slice(b"CD001");
    block[6] = 1;
    block[8..40].fill(b' ');
    block[40..72].fill(b' ');
    block[40..40 + volume_id.len()].copy_from_slice(volume_id);
    block[80..84].copy_from_slice(&64u32.to_le_bytes());
    block[84..88].copy_from_slice(&64u32.to_be_bytes());
    block[88..88 + escapes.len()].copy_from_slice(escapes);
    block[128..130].copy_from_slice(&2048u16.to_le_bytes());
    block[130..132].copy_from_slice(&2048u16.to_be_bytes());
    block[156..156 + root.len()].copy_from_slice(root);
    let app = b"ISOFS TEST SUITE";
    block[574..702].fill(b' ');
    block[574..574 + app.len()].copy_from_slice(app);
    block[813..829].copy_from_slice(b"2024030510300000");
    block
}

fn terminator() -> Vec<u8> {
    let mut block = vec![0u8; BLOCK];
    block[0] = 255;
    block[1..6].copy_from_slice(b"CD001");
    block
}

const README_TEXT: &[u8] = b"Hello from a tiny ISO9660 volume.\n";

/// A plain ISO9660 image:
///   16 PVD, 17 terminator, 18 root dir, 19 README.TXT;1,
///   20 SUB dir, 21..22 DATA.BIN;1 (3000 bytes)
fn build_plain_iso() -> Vec<u8> {
    let mut img = vec![0u8; 16 * BLOCK];
    let root = record(b"\x00", 18, BLOCK as u32, 0x02);
    img.extend(descriptor(1, b"TESTVOL", &[], &root));
    img.extend(terminator());
    img.extend(dir_block(&[
        record(b"\x00", 18, BLOCK as u32, 0x02),
        record(b"\x01", 18, BLOCK as u32, 0x02),
        record(b"README.TXT;1", 19, README_TEXT.len() as u32, 0x00),
        record(b"SUB", 20, BLOCK as u32, 0x02),
    ]));
    let mut readme = README_TEXT.to_vec();
    readme.resize(BLOCK, 0);
    img.extend(readme);
    img.extend(dir_block(&[
        record(b"\x00", 20, BLOCK as u32, 0x02),
        record(b"\x01", 18, BLOCK as u32, 0x02),
        record(b"DATA.BIN;1", 21, 3000, 0x00),
    ]));
    img.extend(vec![0xd7u8; 2 * BLOCK]);
    img
}

fn write_image(dir: &Path, name: &str, data: &[u8]) -> String {
    let path = dir.join(name);
    std::fs::write(&path, data).unwrap();
    path.to_string_lossy().into_owned()
}

#[test]
fn superblock_and_identifiers() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_image(dir.path(), "plain.iso", &build_plain_iso());
    let fs = IsoFs::open(&path).unwrap();
    assert_eq!(fs.volume_id(), Some("TESTVOL"));
    assert_eq!(fs.application_id(), Some("ISOFS TEST SUITE"));
    assert_eq!(fs.system_id(), None);
    assert_eq!(fs.joliet_level(), 0);
    assert_eq!(fs.get_root_lsn(), 18);
    assert_eq!(fs.volume_space_size(), 64);
    let created = fs.primary_descriptor().created.unwrap();
    assert_eq!(created.year(), 2024);
}

#[test]
fn root_listing() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_image(dir.path(), "plain.iso", &build_plain_iso());
    let mut fs = IsoFs::open(&path).unwrap();
    let entries = fs.readdir("/").unwrap();
    let names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(names, [".", "..", "README.TXT;1", "SUB"]);
    assert!(entries[0].is_dir);
    assert!(!entries[2].is_dir);
    assert_eq!(entries[2].size, README_TEXT.len() as u32);
    assert_eq!(entries[2].sec_size, 1);
    assert_eq!(entries[3].lsn, 20);
    let recorded = entries[2].recorded.unwrap();
    assert_eq!((recorded.year(), recorded.hour()), (2024, 10));
}

#[test]
fn stat_and_translation() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_image(dir.path(), "plain.iso", &build_plain_iso());
    let mut fs = IsoFs::open(&path).unwrap();

    let raw = fs.stat("/README.TXT;1").unwrap().unwrap();
    assert_eq!(raw.name, "README.TXT;1");
    assert_eq!(raw.lsn, 19);

    // Exact lookups keep the version suffix significant
    assert!(fs.stat("README.TXT").unwrap().is_none());

    let translated = fs.stat_translate("readme.txt").unwrap().unwrap();
    assert_eq!(translated.name, "readme.txt");
    assert_eq!(translated.lsn, 19);

    let nested = fs.stat_translate("sub/data.bin").unwrap().unwrap();
    assert_eq!(nested.lsn, 21);
    assert_eq!(nested.size, 3000);
    assert_eq!(nested.sec_size, 2);

    // Absence is a normal outcome, not an error
    assert!(fs.stat("/MISSING").unwrap().is_none());
    assert!(fs.stat("/README.TXT;1/inner").unwrap().is_none());
    assert!(matches!(fs.readdir("/NOPE"), Err(IsoError::NotFound(_))));
}

#[test]
fn file_reads() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_image(dir.path(), "plain.iso", &build_plain_iso());
    let mut fs = IsoFs::open(&path).unwrap();

    let stat = fs.stat("README.TXT;1").unwrap().unwrap();
    let content = fs.read_file(&stat).unwrap();
    assert_eq!(content, README_TEXT);

    let data = fs.stat("SUB/DATA.BIN;1").unwrap().unwrap();
    let content = fs.read_file(&data).unwrap();
    assert_eq!(content.len(), 3000);
    assert!(content.iter().all(|&b| b == 0xd7));

    // Directories cannot be read as files
    let sub = fs.stat("SUB").unwrap().unwrap();
    assert!(fs.read_file(&sub).is_err());

    // seek_read is raw block access
    let block = fs.seek_read(19, 1).unwrap();
    assert_eq!(&block[..README_TEXT.len()], README_TEXT);
}

#[test]
fn lsn_lookup() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_image(dir.path(), "plain.iso", &build_plain_iso());
    let mut fs = IsoFs::open(&path).unwrap();

    assert_eq!(fs.find_lsn(19).unwrap().unwrap().name, "README.TXT;1");
    assert_eq!(fs.find_lsn(21).unwrap().unwrap().name, "DATA.BIN;1");
    assert_eq!(fs.find_lsn(22).unwrap().unwrap().name, "DATA.BIN;1");
    assert_eq!(fs.find_lsn(20).unwrap().unwrap().name, "SUB");
    assert!(fs.find_lsn(500).unwrap().is_none());
}

#[test]
fn fuzzy_open_of_raw_framing() {
    // Wrap every 2048 byte block into a 2352 byte raw sector
    let plain = build_plain_iso();
    let mut raw = Vec::with_capacity(plain.len() / BLOCK * 2352);
    for block in plain.chunks(BLOCK) {
        raw.extend_from_slice(&[0u8; 16]);
        raw.extend_from_slice(block);
        raw.extend_from_slice(&[0u8; 288]);
    }
    let dir = tempfile::tempdir().unwrap();
    let path = write_image(dir.path(), "raw.bin", &raw);

    assert!(matches!(IsoFs::open(&path), Err(IsoError::NoSuperblock)));

    let mut fs = IsoFs::open_fuzzy(&path, DEFAULT_FUZZ).unwrap();
    assert_eq!(fs.volume_id(), Some("TESTVOL"));
    let stat = fs.stat_translate("readme.txt").unwrap().unwrap();
    let content = fs.read_file(&stat).unwrap();
    assert_eq!(content, README_TEXT);
}

#[test]
fn fuzzy_scan_gives_up() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_image(dir.path(), "noise.bin", &vec![0x55u8; 2352 * 40]);
    assert!(matches!(
        IsoFs::open_fuzzy(&path, DEFAULT_FUZZ),
        Err(IsoError::FuzzyScanExhausted(_))
    ));
}

#[test]
fn over_a_device_session() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_image(dir.path(), "plain.iso", &build_plain_iso());
    let mut dev = cddev::Device::new();
    dev.open(Some(&path), cddev::DriverId::Unknown, None)
        .unwrap();
    let mut fs = IsoFs::new(dev).unwrap();
    assert_eq!(fs.volume_id(), Some("TESTVOL"));
    let stat = fs.stat_translate("sub/data.bin").unwrap().unwrap();
    assert_eq!(stat.size, 3000);
    let readme = fs.stat_translate("readme.txt").unwrap().unwrap();
    assert_eq!(fs.read_file(&readme).unwrap(), README_TEXT);

    // Closing hands the session back intact
    let dev = fs.close();
    assert!(dev.is_open());
}

#[test]
fn joliet_hierarchy_preferred() {
    // Root records: ASCII hierarchy at 19, Joliet hierarchy at 20
    let mut img = vec![0u8; 16 * BLOCK];
    let pvd_root = record(b"\x00", 19, BLOCK as u32, 0x02);
    let svd_root = record(b"\x00", 20, BLOCK as u32, 0x02);
    let ucs2 = |s: &str| -> Vec<u8> {
        s.chars().flat_map(|c| (c as u16).to_be_bytes()).collect()
    };
    img.extend(descriptor(1, b"PLAINVOL", &[], &pvd_root));
    // Joliet identifier fields are padded with UCS-2 spaces
    let mut svd_vid = ucs2("Fancy Volume");
    while svd_vid.len() < 32 {
        svd_vid.extend_from_slice(&[0x00, 0x20]);
    }
    img.extend(descriptor(2, &svd_vid, &[0x25, 0x2f, 0x45], &svd_root));
    img.extend(terminator());
    img.extend(dir_block(&[
        record(b"\x00", 19, BLOCK as u32, 0x02),
        record(b"\x01", 19, BLOCK as u32, 0x02),
        record(b"READ_ME.TXT;1", 21, README_TEXT.len() as u32, 0x00),
    ]));
    img.extend(dir_block(&[
        record(b"\x00", 20, BLOCK as u32, 0x02),
        record(b"\x01", 20, BLOCK as u32, 0x02),
        record(&ucs2("ReadMe First.txt"), 21, README_TEXT.len() as u32, 0x00),
    ]));
    let mut content = README_TEXT.to_vec();
    content.resize(BLOCK, 0);
    img.extend(content);

    let dir = tempfile::tempdir().unwrap();
    let path = write_image(dir.path(), "joliet.iso", &img);
    let mut fs = IsoFs::open(&path).unwrap();
    assert_eq!(fs.joliet_level(), 3);
    assert_eq!(fs.volume_id(), Some("Fancy Volume"));
    assert_eq!(fs.get_root_lsn(), 20);

    let names: Vec<String> = fs
        .readdir("/")
        .unwrap()
        .into_iter()
        .map(|e| e.name)
        .collect();
    assert_eq!(names, [".", "..", "ReadMe First.txt"]);

    let stat = fs.stat("ReadMe First.txt").unwrap().unwrap();
    assert_eq!(stat.lsn, 21);
    // Joliet names keep their case under translation
    let translated = fs.stat_translate("ReadMe First.txt").unwrap().unwrap();
    assert_eq!(translated.name, "ReadMe First.txt");
}

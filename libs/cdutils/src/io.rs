//! I/O utilities
use std::io::Read;

/// Single byte `u8` reader
#[inline]
pub fn rdu8<R: Read>(r: &mut R) -> Result<u8, std::io::Error> {
    let mut buf = [0u8; 1];
    r.read_exact(&mut buf)?;
    Ok(buf[0])
}

/// Little endian `u16` reader
#[inline]
pub fn rdu16le<R: Read>(r: &mut R) -> Result<u16, std::io::Error> {
    let mut buf = [0u8; 2];
    r.read_exact(&mut buf)?;
    Ok(u16::from_le_bytes(buf))
}

/// Big endian `u16` reader
#[inline]
pub fn rdu16be<R: Read>(r: &mut R) -> Result<u16, std::io::Error> {
    let mut buf = [0u8; 2];
    r.read_exact(&mut buf)?;
    Ok(u16::from_be_bytes(buf))
}

/// Little endian `u32` reader
#[inline]
pub fn rdu32le<R: Read>(r: &mut R) -> Result<u32, std::io::Error> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

/// Big endian `u32` reader
#[inline]
pub fn rdu32be<R: Read>(r: &mut R) -> Result<u32, std::io::Error> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(u32::from_be_bytes(buf))
}

/// Big endian `i32` reader
#[inline]
pub fn rdi32be<R: Read>(r: &mut R) -> Result<i32, std::io::Error> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(i32::from_be_bytes(buf))
}

/// Big endian `u64` reader
#[inline]
pub fn rdu64be<R: Read>(r: &mut R) -> Result<u64, std::io::Error> {
    let mut buf = [0u8; 8];
    r.read_exact(&mut buf)?;
    Ok(u64::from_be_bytes(buf))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn readers() {
        let data = [0x01u8, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08];
        let mut r = data.as_slice();
        assert_eq!(rdu8(&mut r).unwrap(), 0x01);
        assert_eq!(rdu16le(&mut r).unwrap(), 0x0302);
        assert_eq!(rdu16be(&mut r).unwrap(), 0x0405);
        let mut r = data.as_slice();
        assert_eq!(rdu32be(&mut r).unwrap(), 0x01020304);
        assert_eq!(rdu32le(&mut r).unwrap(), 0x08070605);
        let mut r = data.as_slice();
        assert_eq!(rdu64be(&mut r).unwrap(), 0x0102030405060708);
        let mut r = [0xffu8, 0xff, 0xff, 0xff].as_slice();
        assert_eq!(rdi32be(&mut r).unwrap(), -1);
        let mut short = [0u8; 1].as_slice();
        assert!(rdu16le(&mut short).is_err());
    }
}

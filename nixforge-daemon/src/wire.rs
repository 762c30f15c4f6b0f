//! Wire primitives for the worker protocol: little-endian 64-bit integers,
//! and length-prefixed byte strings padded to 8-byte alignment with zero
//! bytes - the same framing [crate::nix_compat::nar] uses for its own
//! length-prefixed strings, just over a socket instead of an archive
//! buffer.
//!
//! Synchronous by construction: a daemon connection runs on a single
//! thread of control and isn't safe to share across concurrent callers, so
//! this reads and writes directly against `std::io::{Read, Write}` rather
//! than an async I/O trait.
use std::io::{self, Read, Write};

pub fn write_u64(w: &mut impl Write, n: u64) -> io::Result<()> {
    w.write_all(&n.to_le_bytes())
}

pub fn read_u64(r: &mut impl Read) -> io::Result<u64> {
    let mut buf = [0u8; 8];
    r.read_exact(&mut buf)?;
    Ok(u64::from_le_bytes(buf))
}

pub fn write_bool(w: &mut impl Write, b: bool) -> io::Result<()> {
    write_u64(w, if b { 1 } else { 0 })
}

pub fn read_bool(r: &mut impl Read) -> io::Result<bool> {
    Ok(read_u64(r)? != 0)
}

fn padding(len: usize) -> usize {
    (8 - len % 8) % 8
}

pub fn write_bytes(w: &mut impl Write, data: &[u8]) -> io::Result<()> {
    write_u64(w, data.len() as u64)?;
    w.write_all(data)?;
    let pad = padding(data.len());
    if pad > 0 {
        w.write_all(&[0u8; 8][..pad])?;
    }
    Ok(())
}

pub fn read_bytes(r: &mut impl Read, max_len: usize) -> io::Result<Vec<u8>> {
    let len = read_u64(r)? as usize;
    if len > max_len {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("string of length {len} exceeds maximum of {max_len}"),
        ));
    }
    let mut buf = vec![0u8; len];
    r.read_exact(&mut buf)?;
    let pad = padding(len);
    if pad > 0 {
        let mut pad_buf = [0u8; 8];
        r.read_exact(&mut pad_buf[..pad])?;
    }
    Ok(buf)
}

pub fn write_string(w: &mut impl Write, s: &str) -> io::Result<()> {
    write_bytes(w, s.as_bytes())
}

pub fn read_string(r: &mut impl Read, max_len: usize) -> io::Result<String> {
    let bytes = read_bytes(r, max_len)?;
    String::from_utf8(bytes)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.utf8_error()))
}

pub fn write_string_list<S: AsRef<str>>(w: &mut impl Write, items: &[S]) -> io::Result<()> {
    write_u64(w, items.len() as u64)?;
    for item in items {
        write_string(w, item.as_ref())?;
    }
    Ok(())
}

pub fn read_string_list(r: &mut impl Read, max_len: usize) -> io::Result<Vec<String>> {
    let n = read_u64(r)?;
    (0..n).map(|_| read_string(r, max_len)).collect()
}

/// Generous but finite: the daemon is a trusted-ish local peer, but a
/// confused or malicious one shouldn't be able to make us allocate an
/// unbounded buffer from a single length prefix.
pub const MAX_STRING_LEN: usize = 256 * 1024 * 1024;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_bytes_unpadded() {
        let mut buf = Vec::new();
        write_bytes(&mut buf, b"12345678").unwrap();
        assert_eq!(buf.len(), 8 + 8);
        let mut cursor = &buf[..];
        assert_eq!(read_bytes(&mut cursor, MAX_STRING_LEN).unwrap(), b"12345678");
    }

    #[test]
    fn roundtrip_bytes_padded() {
        let mut buf = Vec::new();
        write_bytes(&mut buf, b"hello").unwrap();
        // 8 (length) + 5 (data) + 3 (padding) = 16
        assert_eq!(buf.len(), 16);
        let mut cursor = &buf[..];
        assert_eq!(read_bytes(&mut cursor, MAX_STRING_LEN).unwrap(), b"hello");
    }

    #[test]
    fn roundtrip_string_list() {
        let mut buf = Vec::new();
        write_string_list(&mut buf, &["out".to_string(), "dev".to_string()]).unwrap();
        let mut cursor = &buf[..];
        assert_eq!(
            read_string_list(&mut cursor, MAX_STRING_LEN).unwrap(),
            vec!["out".to_string(), "dev".to_string()]
        );
    }

    #[test]
    fn read_bytes_rejects_oversized_length() {
        let mut buf = Vec::new();
        write_u64(&mut buf, 1_000_000).unwrap();
        let mut cursor = &buf[..];
        assert!(read_bytes(&mut cursor, 16).is_err());
    }
}

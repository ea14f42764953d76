//! Decompression of xz/gzip payloads and gzip repacking.

use flate2::read::MultiGzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::{self, Read, Write};
use xz2::read::XzDecoder;

use crate::error::{IoContext, PatchError, Result};

/// Default cap on a decompressed gzip payload (500 MiB).
pub const MAX_DECOMPRESS_BYTES: u64 = 524_288_000;

/// Decompress an xz stream into `dst`. No size cap is applied.
pub fn unpack_xz<W: Write, R: Read>(dst: &mut W, src: R) -> Result<u64> {
    let mut decoder = XzDecoder::new(src);
    io::copy(&mut decoder, dst).ctx("unpack xz copy failed")
}

/// Decompress a gzip stream into `dst`, refusing payloads of `max_bytes` or more.
///
/// A payload that is exactly `max_bytes` long and then ends is accepted; the
/// limit is only reported when the decoder still has data left.
pub fn unpack_gz<W: Write, R: Read>(dst: &mut W, src: R, max_bytes: u64) -> Result<u64> {
    let mut decoder = MultiGzDecoder::new(src);
    let written = io::copy(&mut (&mut decoder).take(max_bytes), dst).ctx("unpack gz copy failed")?;

    if written == max_bytes {
        let mut probe = [0u8; 1];
        if decoder.read(&mut probe).ctx("unpack gz probe failed")? != 0 {
            return Err(PatchError::DecompressLimit { limit: max_bytes });
        }
    }

    Ok(written)
}

/// Gzip all of `src` into `dst` with the default compression level.
pub fn pack_gz<W: Write, R: Read>(dst: W, src: &mut R) -> Result<u64> {
    let mut encoder = GzEncoder::new(dst, Compression::default());
    let read = io::copy(src, &mut encoder).ctx("pack gz copy failed")?;
    encoder
        .finish()
        .ctx("pack gz finish failed")?
        .flush()
        .ctx("pack gz flush failed")?;
    Ok(read)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use xz2::write::XzEncoder;

    fn gzip(data: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        pack_gz(&mut out, &mut Cursor::new(data)).unwrap();
        out
    }

    #[test]
    fn test_gz_round_trip() {
        let payload = b"AAAXBBB".repeat(100);
        let packed = gzip(&payload);
        assert_eq!(&packed[..2], &[0x1F, 0x8B]);

        let mut raw = Vec::new();
        let n = unpack_gz(&mut raw, Cursor::new(packed), MAX_DECOMPRESS_BYTES).unwrap();
        assert_eq!(n, payload.len() as u64);
        assert_eq!(raw, payload);
    }

    #[test]
    fn test_xz_unpack() {
        let payload = b"hello xz payload".to_vec();
        let mut enc = XzEncoder::new(Vec::new(), 6);
        enc.write_all(&payload).unwrap();
        let packed = enc.finish().unwrap();

        let mut raw = Vec::new();
        unpack_xz(&mut raw, Cursor::new(packed)).unwrap();
        assert_eq!(raw, payload);
    }

    #[test]
    fn test_gz_limit_reached() {
        let packed = gzip(&[0x55; 4096]);
        let mut raw = Vec::new();
        let err = unpack_gz(&mut raw, Cursor::new(packed), 1024).unwrap_err();
        assert!(matches!(err, PatchError::DecompressLimit { limit: 1024 }));
    }

    #[test]
    fn test_gz_exactly_at_limit_is_accepted() {
        let packed = gzip(&[0x55; 1024]);
        let mut raw = Vec::new();
        let n = unpack_gz(&mut raw, Cursor::new(packed), 1024).unwrap();
        assert_eq!(n, 1024);
    }

    #[test]
    fn test_gz_corrupt_stream_is_io_error() {
        let mut raw = Vec::new();
        let err = unpack_gz(&mut raw, Cursor::new(vec![0x1F, 0x8B, 0x00, 0x00]), 1024).unwrap_err();
        assert!(matches!(err, PatchError::Io { .. }));
    }
}

//! Cutting and re-attaching the newc cpio header that wraps a compressed payload.
//!
//! Layout handled here:
//!
//! ```text
//! [ cpio records ... TRAILER!!! record ][ zero padding ][ gzip/xz payload ]
//!  ^----------- header (cut) ---------^ ^-- footer len -^
//! ```
//!
//! The padding length is not recorded in the archive, so it is measured on the
//! way in and written back verbatim on the way out.

use cpio::NewcReader;
use std::io::{self, Read, Seek, SeekFrom, Write};

use crate::error::{IoContext, PatchError, Result};
use crate::format::{self, HeaderType};

pub const TRAILER_NAME: &str = "TRAILER!!!";

/// Tracks how many bytes have been pulled through a reader.
struct CountingReader<R> {
    inner: R,
    count: u64,
}

impl<R: Read> Read for CountingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.count += n as u64;
        Ok(n)
    }
}

/// Offset just past the trailer record's header and name, i.e. where its
/// (empty) data would begin.
fn find_trailer<R: Read>(src: R) -> Result<u64> {
    let mut counter = CountingReader {
        inner: src,
        count: 0,
    };

    loop {
        let entry = match NewcReader::new(&mut counter) {
            Ok(entry) => entry,
            // End of data, or padding/payload where the next record header
            // should be: either way no trailer was reached.
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::UnexpectedEof | io::ErrorKind::InvalidData
                ) =>
            {
                return Err(PatchError::TrailerNotFound)
            }
            Err(e) => {
                return Err(PatchError::Io {
                    context: "cpio reader failed",
                    source: e,
                })
            }
        };

        if entry.entry().name() == TRAILER_NAME {
            break;
        }
        entry.finish().ctx("cpio entry skip failed")?;
    }

    Ok(counter.count)
}

/// Copy everything up to and including the trailer record from `src` into `dst`.
///
/// `src` is rewound before scanning and is left positioned at the cut point.
/// Returns the number of header bytes copied.
pub fn cut<W, R>(dst: &mut W, src: &mut R) -> Result<u64>
where
    W: Write,
    R: Read + Seek,
{
    src.seek(SeekFrom::Start(0)).ctx("src seek failed")?;
    let end = find_trailer(&mut *src)?;
    src.seek(SeekFrom::Start(0)).ctx("src seek failed")?;

    let copied = io::copy(&mut (&mut *src).take(end), dst).ctx("cpio header copy failed")?;
    if copied != end {
        return Err(PatchError::Io {
            context: "cpio header copy failed",
            source: io::Error::new(io::ErrorKind::UnexpectedEof, "short copy"),
        });
    }

    Ok(copied)
}

/// Count the zero bytes from the current position of `src` and leave it
/// positioned on the first non-zero byte.
pub fn find_zero_footer_len<R: Read + Seek>(src: &mut R, buffer_size: usize) -> Result<u64> {
    let mut buf = vec![0u8; buffer_size.max(1)];
    let mut zeros: u64 = 0;

    loop {
        let n = match src.read(&mut buf) {
            Ok(0) => return Err(PatchError::PaddingEof),
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                return Err(PatchError::Io {
                    context: "padding read failed",
                    source: e,
                })
            }
        };

        if let Some(i) = buf[..n].iter().position(|&b| b != 0) {
            let rewind = (n - i) as i64;
            src.seek(SeekFrom::Current(-rewind)).ctx("padding seek failed")?;
            return Ok(zeros + i as u64);
        }
        zeros += n as u64;
    }
}

/// Cut the cpio header into `dst`, measure the padding, and sniff the payload.
///
/// On success `src` is positioned just past the payload's magic bytes, the same
/// as after [`format::classify`] on a bare stream.
pub fn cut_header<W, R>(dst: &mut W, src: &mut R, buffer_size: usize) -> Result<(HeaderType, u64)>
where
    W: Write,
    R: Read + Seek,
{
    cut(dst, src)?;
    let footer_len = find_zero_footer_len(src, buffer_size)?;
    let payload = format::classify(src)?;
    Ok((payload, footer_len))
}

/// Write the saved header followed by `footer_len` zero bytes.
pub fn write_header<W, R>(dst: &mut W, header: &mut R, footer_len: u64) -> Result<u64>
where
    W: Write,
    R: Read,
{
    let head = io::copy(header, dst).ctx("cpio header write failed")?;
    let pad = io::copy(&mut io::repeat(0).take(footer_len), dst).ctx("cpio padding write failed")?;
    Ok(head + pad)
}

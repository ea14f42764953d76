//! Magic-byte sniffing of the outer container.

use std::fmt;
use std::io::Read;

use crate::error::{IoContext, PatchError, Result};

/// Number of bytes read when classifying a stream.
pub const MAGIC_LEN: usize = 6;

pub const CPIO_MAGIC: &[u8; 6] = b"070701";
pub const XZ_MAGIC: &[u8; 6] = &[0xFD, 0x37, 0x7A, 0x58, 0x5A, 0x00];
pub const GZ_MAGIC: &[u8; 2] = &[0x1F, 0x8B];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderType {
    Unknown,
    Cpio,
    Xz,
    Gz,
}

impl HeaderType {
    /// Match a magic prefix, in priority order cpio, xz, gz.
    pub fn from_magic(magic: &[u8; MAGIC_LEN]) -> Self {
        if magic == CPIO_MAGIC {
            HeaderType::Cpio
        } else if magic == XZ_MAGIC {
            HeaderType::Xz
        } else if magic[..GZ_MAGIC.len()] == GZ_MAGIC[..] {
            HeaderType::Gz
        } else {
            HeaderType::Unknown
        }
    }
}

impl fmt::Display for HeaderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HeaderType::Unknown => "unknown",
            HeaderType::Cpio => "cpio",
            HeaderType::Xz => "xz",
            HeaderType::Gz => "gz",
        };
        f.write_str(name)
    }
}

/// Read exactly [`MAGIC_LEN`] bytes from the current position and classify them.
///
/// The bytes are consumed; callers that go on to decode the stream must seek
/// back by `MAGIC_LEN` themselves.
pub fn classify<R: Read>(reader: &mut R) -> Result<HeaderType> {
    let mut magic = [0u8; MAGIC_LEN];
    reader.read_exact(&mut magic).ctx("magic read failed")?;

    match HeaderType::from_magic(&magic) {
        HeaderType::Unknown => Err(PatchError::UnsupportedFormat {
            magic: magic.to_vec(),
        }),
        t => Ok(t),
    }
}

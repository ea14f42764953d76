//! Streaming exact-match search and in-place replacement.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};

use crate::error::{IoContext, PatchError, Result};

/// Default block size for streaming reads.
pub const BUFFER_SIZE: usize = 8192;

/// Find every start offset of `pattern` in `reader`, reading `buffer_size`
/// bytes at a time.
///
/// The partial-match index survives block boundaries, so matches that straddle
/// two reads are found. On a mismatch the index drops straight back to zero
/// without re-testing the current byte, and after a full match it restarts from
/// zero as well. Overlapping or self-similar occurrences can therefore be
/// under-counted (`"AA"` occurs once in `"AAA"`); declared pattern counts are
/// checked against exactly this behaviour.
pub fn search_bytes<R: Read>(reader: &mut R, pattern: &[u8], buffer_size: usize) -> Result<Vec<u64>> {
    let mut offsets = Vec::new();
    if pattern.is_empty() {
        return Ok(offsets);
    }

    let mut buf = vec![0u8; buffer_size.max(1)];
    let mut total_read: u64 = 0;
    let mut index = 0usize;

    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                return Err(PatchError::Io {
                    context: "read buffer failed",
                    source: e,
                })
            }
        };

        for (i, &b) in buf[..n].iter().enumerate() {
            if b != pattern[index] {
                index = 0;
                continue;
            }

            index += 1;
            if index == pattern.len() {
                offsets.push(total_read + i as u64 + 1 - index as u64);
                index = 0;
            }
        }

        total_read += n as u64;
    }

    Ok(offsets)
}

/// Write `replace` at each offset, then sync. Returns the number of bytes written.
pub fn replace_bytes(file: &mut File, offsets: &[u64], replace: &[u8]) -> Result<u64> {
    let mut written: u64 = 0;

    for &offset in offsets {
        file.seek(SeekFrom::Start(offset)).ctx("patch seek failed")?;
        file.write_all(replace).ctx("patching file failed")?;
        written += replace.len() as u64;
    }

    file.sync_all().ctx("patched file sync failed")?;
    Ok(written)
}

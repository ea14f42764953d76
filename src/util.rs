use anyhow::{Context, Result};
use std::collections::BTreeSet;
use std::ffi::OsString;
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::error::{self, IoContext};

/// Expand the command-line targets into a sorted, de-duplicated list of files.
/// Directories are walked recursively; symlinks are not followed. The
/// `side_dir` subtree (where `.raw`/`.cpio` side files live) is never entered.
pub fn collect_targets(targets: &[PathBuf], side_dir: Option<&Path>) -> Result<Vec<PathBuf>> {
    let side_dir = side_dir.and_then(|d| d.canonicalize().ok());
    let mut files = BTreeSet::new();

    for target in targets {
        let meta = std::fs::metadata(target)
            .with_context(|| format!("Failed to read metadata: {}", target.display()))?;

        if !meta.is_dir() {
            files.insert(target.clone());
            continue;
        }

        let walker = WalkDir::new(target)
            .min_depth(1)
            .into_iter()
            .filter_entry(|e| !is_side_dir(e, side_dir.as_deref()));
        for entry in walker {
            let entry = entry
                .with_context(|| format!("Failed to read directory entry in {}", target.display()))?;
            if entry.file_type().is_file() && !is_side_file(entry.path()) {
                files.insert(entry.into_path());
            }
        }
    }

    Ok(files.into_iter().collect())
}

fn is_side_dir(entry: &walkdir::DirEntry, side_dir: Option<&Path>) -> bool {
    match side_dir {
        Some(dir) if entry.file_type().is_dir() => {
            entry.path().canonicalize().is_ok_and(|p| p == dir)
        }
        _ => false,
    }
}

/// Backups from an earlier run are never treated as targets.
fn is_side_file(path: &Path) -> bool {
    path.extension().is_some_and(|e| e == "bak")
}

/// `<path>.bak`, next to the original.
pub fn backup_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".bak");
    PathBuf::from(name)
}

/// Copy `reader` into a freshly created `dst` and sync it to storage.
pub fn clone_reader<R: Read>(reader: &mut R, dst: &Path) -> error::Result<u64> {
    let mut file = File::create(dst).ctx("clone reader create dst failed")?;
    let copied = io::copy(reader, &mut file).ctx("clone reader copy failed")?;
    file.sync_all().ctx("clone reader sync dst failed")?;
    Ok(copied)
}

/// BLAKE3 digest of everything left in `reader`, read in 256 KB chunks.
pub fn hash_reader<R: Read>(reader: R) -> error::Result<blake3::Hash> {
    let mut reader = BufReader::with_capacity(256 * 1024, reader);
    let mut hasher = blake3::Hasher::new();
    io::copy(&mut reader, &mut hasher).ctx("hash read failed")?;
    Ok(hasher.finalize())
}

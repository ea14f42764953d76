//! Per-file patch pipeline.
//!
//! ```text
//! open -> sniff -> [cut cpio] -> unpack -> (search, validate, replace)* -> [backup]
//!      -> truncate -> [write cpio header + padding] -> pack gz
//! ```
//!
//! The original file is not modified until every pattern has been applied to
//! the decompressed side copy, so a failure anywhere before truncation leaves
//! it untouched.

use log::Level;
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use crate::codec;
use crate::cpio_frame;
use crate::error::{IoContext, PatchError, Result};
use crate::format::{self, HeaderType, MAGIC_LEN};
use crate::logging::Logger;
use crate::pattern::{self, Pattern};
use crate::search;
use crate::util;

/// Tuning shared by every engine in a batch.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Block size for searching and padding scans.
    pub buffer_size: usize,
    /// Cap on a decompressed gzip payload.
    pub max_decompress_bytes: u64,
    /// Write `<path>.bak` before rewriting a patched file.
    pub backup: bool,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            buffer_size: search::BUFFER_SIZE,
            max_decompress_bytes: codec::MAX_DECOMPRESS_BYTES,
            backup: false,
        }
    }
}

/// Outcome for one target file.
#[derive(Debug)]
pub struct PatchResult {
    pub path: PathBuf,
    /// Bytes replaced across all patterns (0 = nothing to do), or the first error.
    pub outcome: Result<u64>,
}

impl PatchResult {
    pub fn bytes_patched(&self) -> Option<u64> {
        self.outcome.as_ref().ok().copied()
    }

    pub fn error(&self) -> Option<&PatchError> {
        self.outcome.as_ref().err()
    }

    pub fn is_ok(&self) -> bool {
        self.outcome.is_ok()
    }
}

/// Saved cpio framing, carried from unwrap to rewrap.
struct CpioFrame {
    header: File,
    footer_len: u64,
}

pub struct PatchEngine {
    temp_dir: PathBuf,
    path: PathBuf,
    file_name: String,
    options: EngineOptions,
    logger: Logger,
}

impl PatchEngine {
    pub fn new(temp_dir: impl Into<PathBuf>, path: impl Into<PathBuf>, options: EngineOptions) -> Self {
        let path = path.into();
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        Self {
            temp_dir: temp_dir.into(),
            path,
            file_name,
            options,
            logger: Logger::installed(),
        }
    }

    /// Send this engine's records to `logger` instead of the installed logger.
    pub fn with_logger(mut self, logger: Logger) -> Self {
        self.logger = logger;
        self
    }

    fn log(&self, level: Level, args: fmt::Arguments<'_>) {
        self.logger
            .log(level, format_args!("{}: {}", self.path.display(), args));
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `<temp_dir>/<base name>.<ext>`
    pub fn side_file(&self, ext: &str) -> PathBuf {
        self.temp_dir.join(format!("{}.{}", self.file_name, ext))
    }

    /// Run the whole pipeline for this file. Never panics on bad input; every
    /// failure ends up in the returned result.
    pub fn patch(&self, patterns: &[Pattern]) -> PatchResult {
        PatchResult {
            path: self.path.clone(),
            outcome: self.run(patterns),
        }
    }

    fn run(&self, patterns: &[Pattern]) -> Result<u64> {
        pattern::validate_all(patterns)?;

        let mut in_file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&self.path)
            .ctx("open target failed")?;

        let mut file_type = format::classify(&mut in_file)?;
        let mut frame = None;

        if file_type == HeaderType::Cpio {
            self.log(Level::Info, format_args!("cut cpio header"));

            let mut header = create_side_file(&self.side_file("cpio")).ctx("create cpio file failed")?;
            let (payload, footer_len) =
                cpio_frame::cut_header(&mut header, &mut in_file, self.options.buffer_size)?;
            header.sync_all().ctx("cpio file sync failed")?;

            self.log(Level::Debug, format_args!("cpio zero footer {} bytes", footer_len));
            file_type = payload;
            frame = Some(CpioFrame { header, footer_len });
        }

        let mut raw_file = create_side_file(&self.side_file("raw")).ctx("create raw file failed")?;
        self.unpack(&mut raw_file, &mut in_file, file_type)?;

        let replaced = self.apply_patterns(&mut raw_file, patterns)?;
        if replaced == 0 {
            self.log(Level::Info, format_args!("nothing replaced, left as is"));
            return Ok(0);
        }

        self.pack(&mut raw_file, &mut in_file, frame)?;
        Ok(replaced)
    }

    fn unpack(&self, raw_file: &mut File, in_file: &mut File, file_type: HeaderType) -> Result<()> {
        in_file
            .seek(SeekFrom::Current(-(MAGIC_LEN as i64)))
            .ctx("in file seek failed")?;

        match file_type {
            HeaderType::Xz => {
                self.log(Level::Info, format_args!("unpack xz"));
                codec::unpack_xz(raw_file, &mut *in_file)?;
            }
            HeaderType::Gz => {
                self.log(Level::Info, format_args!("unpack gz"));
                codec::unpack_gz(raw_file, &mut *in_file, self.options.max_decompress_bytes)?;
            }
            HeaderType::Cpio | HeaderType::Unknown => {
                return Err(PatchError::UnexpectedPayload { found: file_type });
            }
        }

        raw_file.sync_all().ctx("raw file sync failed")
    }

    fn apply_patterns(&self, raw_file: &mut File, patterns: &[Pattern]) -> Result<u64> {
        let mut replaced = 0;

        for (index, pattern) in patterns.iter().enumerate() {
            self.log(Level::Info, format_args!("search {} [{}]", index, pattern.description));

            raw_file.seek(SeekFrom::Start(0)).ctx("raw seek failed")?;
            let offsets = search::search_bytes(raw_file, &pattern.search, self.options.buffer_size)?;

            if offsets.is_empty() {
                return Err(PatchError::PatternNotFound { index });
            }
            if offsets.len() != pattern.count {
                return Err(PatchError::InvalidOffsetCount {
                    index,
                    expected: pattern.count,
                    found: offsets.len(),
                });
            }

            self.log(Level::Info, format_args!("patch {}", index));
            self.log(Level::Debug, format_args!("pattern {} offsets {:?}", index, offsets));
            replaced += search::replace_bytes(raw_file, &offsets, &pattern.replace)?;
        }

        Ok(replaced)
    }

    fn backup(&self, in_file: &mut File) -> Result<()> {
        self.log(Level::Info, format_args!("backup"));

        let bak = util::backup_path(&self.path);
        in_file.seek(SeekFrom::Start(0)).ctx("file seek failed")?;
        util::clone_reader(in_file, &bak)?;

        in_file.seek(SeekFrom::Start(0)).ctx("file seek failed")?;
        let original = util::hash_reader(&mut *in_file)?;
        let copy = util::hash_reader(File::open(&bak).ctx("open backup failed")?)?;
        if original != copy {
            return Err(PatchError::BackupMismatch { path: bak });
        }

        Ok(())
    }

    fn pack(&self, raw_file: &mut File, in_file: &mut File, frame: Option<CpioFrame>) -> Result<()> {
        if self.options.backup {
            self.backup(in_file)?;
        }

        raw_file.seek(SeekFrom::Start(0)).ctx("raw file seek failed")?;
        in_file.seek(SeekFrom::Start(0)).ctx("in file seek failed")?;
        in_file.set_len(0).ctx("in file truncate failed")?;

        if let Some(CpioFrame {
            mut header,
            footer_len,
        }) = frame
        {
            header.seek(SeekFrom::Start(0)).ctx("cpio file seek failed")?;
            cpio_frame::write_header(in_file, &mut header, footer_len)?;
            in_file.sync_all().ctx("in file sync failed")?;
        }

        self.log(Level::Info, format_args!("pack gz"));
        codec::pack_gz(BufWriter::with_capacity(256 * 1024, &mut *in_file), raw_file)?;
        in_file.sync_all().ctx("in file sync failed")
    }
}

fn create_side_file(path: &Path) -> std::io::Result<File> {
    OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::tests::Capture;
    use std::fs;
    use std::io::{Read, Write};

    fn gzip(data: &[u8]) -> Vec<u8> {
        let mut enc = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        enc.write_all(data).unwrap();
        enc.finish().unwrap()
    }

    fn gunzip(data: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        flate2::read::MultiGzDecoder::new(data).read_to_end(&mut out).unwrap();
        out
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        temp: PathBuf,
        target: PathBuf,
    }

    fn fixture(name: &str, content: &[u8]) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let temp = dir.path().join("tmp");
        fs::create_dir_all(&temp).unwrap();
        let target = dir.path().join(name);
        fs::write(&target, content).unwrap();
        Fixture {
            _dir: dir,
            temp,
            target,
        }
    }

    #[test]
    fn test_gz_single_replace() {
        let fx = fixture("payload.gz", &gzip(b"AAAXBBB"));
        let engine = PatchEngine::new(&fx.temp, &fx.target, EngineOptions::default());

        let result = engine.patch(&[Pattern::new("x to y", "X", "Y", 1)]);
        assert_eq!(result.bytes_patched(), Some(1));
        assert_eq!(gunzip(&fs::read(&fx.target).unwrap()), b"AAAYBBB");
        assert!(fx.temp.join("payload.gz.raw").exists());
        assert!(!fx.temp.join("payload.gz.cpio").exists());
    }

    #[test]
    fn test_pattern_not_found_leaves_file() {
        let original = gzip(b"AAAXBBB");
        let fx = fixture("payload.gz", &original);
        let engine = PatchEngine::new(&fx.temp, &fx.target, EngineOptions::default());

        let result = engine.patch(&[Pattern::new("missing", "Z", "Y", 1)]);
        let err = result.error().unwrap();
        assert!(matches!(err, PatchError::PatternNotFound { index: 0 }));
        assert_eq!(err.to_string(), "pattern 0 not found");
        assert_eq!(fs::read(&fx.target).unwrap(), original);
    }

    #[test]
    fn test_no_patterns_is_noop() {
        let original = gzip(b"AAAXBBB");
        let fx = fixture("payload.gz", &original);
        let options = EngineOptions {
            backup: true,
            ..EngineOptions::default()
        };
        let engine = PatchEngine::new(&fx.temp, &fx.target, options);

        let result = engine.patch(&[]);
        assert_eq!(result.bytes_patched(), Some(0));
        assert_eq!(fs::read(&fx.target).unwrap(), original);
        assert!(!util::backup_path(&fx.target).exists());
    }

    #[test]
    fn test_invalid_pattern_rejected_before_open() {
        let fx = fixture("payload.gz", &gzip(b"AAAXBBB"));
        let engine = PatchEngine::new(&fx.temp, &fx.target, EngineOptions::default());

        let result = engine.patch(&[Pattern::new("grow", "X", "YY", 1)]);
        assert!(matches!(result.error(), Some(PatchError::InvalidPattern { index: 0, .. })));
        assert!(!fx.temp.join("payload.gz.raw").exists());
    }

    #[test]
    fn test_unknown_format() {
        let fx = fixture("plain.bin", b"just some plain bytes");
        let engine = PatchEngine::new(&fx.temp, &fx.target, EngineOptions::default());

        let result = engine.patch(&[Pattern::new("", "p", "P", 1)]);
        assert!(matches!(result.error(), Some(PatchError::UnsupportedFormat { .. })));
        assert_eq!(fs::read(&fx.target).unwrap(), b"just some plain bytes");
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let engine = PatchEngine::new(dir.path(), dir.path().join("nope.gz"), EngineOptions::default());
        let result = engine.patch(&[Pattern::new("", "X", "Y", 1)]);
        assert!(matches!(result.error(), Some(PatchError::Io { context: "open target failed", .. })));
    }

    #[test]
    fn test_decompress_limit_leaves_file() {
        let original = gzip(&[0x41; 4096]);
        let fx = fixture("big.gz", &original);
        let options = EngineOptions {
            max_decompress_bytes: 100,
            ..EngineOptions::default()
        };
        let engine = PatchEngine::new(&fx.temp, &fx.target, options);

        let result = engine.patch(&[Pattern::new("", "A", "B", 4096)]);
        assert!(matches!(result.error(), Some(PatchError::DecompressLimit { limit: 100 })));
        assert_eq!(fs::read(&fx.target).unwrap(), original);
    }

    #[test]
    fn test_zero_count_with_one_match_is_count_mismatch() {
        let original = gzip(b"AAAXBBB");
        let fx = fixture("payload.gz", &original);
        let engine = PatchEngine::new(&fx.temp, &fx.target, EngineOptions::default());

        let result = engine.patch(&[Pattern::new("", "X", "Y", 0)]);
        let err = result.error().unwrap();
        assert!(matches!(
            err,
            PatchError::InvalidOffsetCount { index: 0, expected: 0, found: 1 }
        ));
        assert!(err.to_string().contains("found 1 != expected 0"));
        assert_eq!(fs::read(&fx.target).unwrap(), original);
    }

    #[test]
    fn test_zero_count_without_match_is_not_found() {
        let fx = fixture("payload.gz", &gzip(b"AAAXBBB"));
        let engine = PatchEngine::new(&fx.temp, &fx.target, EngineOptions::default());

        let result = engine.patch(&[Pattern::new("", "Z", "Y", 0)]);
        assert!(matches!(result.error(), Some(PatchError::PatternNotFound { index: 0 })));
    }

    #[test]
    fn test_records_go_to_injected_logger() {
        let fx = fixture("payload.gz", &gzip(b"AAAXBBB"));
        let capture = Capture::new(Level::Info);
        let engine = PatchEngine::new(&fx.temp, &fx.target, EngineOptions::default())
            .with_logger(Logger::new(capture.clone()));

        let result = engine.patch(&[Pattern::new("x to y", "X", "Y", 1)]);
        assert_eq!(result.bytes_patched(), Some(1));

        let prefix = format!("INFO {}: ", fx.target.display());
        let lines = capture.lines();
        assert!(lines.iter().all(|l| l.starts_with(&prefix)), "{:?}", lines);
        let steps: Vec<&str> = lines.iter().map(|l| &l[prefix.len()..]).collect();
        assert_eq!(
            steps,
            vec!["unpack gz", "search 0 [x to y]", "patch 0", "pack gz"]
        );
    }
}

//! In-place byte patching of gzip/xz payloads, optionally framed by a newc cpio
//! header (the layout used by early-microcode initramfs images).
//!
//! A target is unwrapped into a raw side file, every [`Pattern`] is applied to
//! it with exact-match search and equal-length replacement, and the original
//! file is then rewritten as `[cpio header + zero padding] + gzip(raw)`.
//! Repacking is always gzip, even when the input payload was xz.

pub mod codec;
pub mod config;
pub mod cpio_frame;
pub mod engine;
pub mod error;
pub mod format;
pub mod logging;
pub mod pattern;
pub mod scheduler;
pub mod search;
pub mod util;

pub use engine::{EngineOptions, PatchEngine, PatchResult};
pub use error::{ErrorKind, PatchError, Result};
pub use format::HeaderType;
pub use logging::Logger;
pub use pattern::Pattern;
pub use scheduler::Scheduler;

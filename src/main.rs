use anyhow::{bail, Context, Result};
use clap::Parser;
use cpio_patcher::config::Config;
use cpio_patcher::{util, Scheduler};
use std::path::PathBuf;
use std::time::Instant;

#[derive(Parser)]
#[command(
    name = "cpio-patcher",
    about = "Patch bytes inside gzip/xz payloads, optionally wrapped in a cpio header"
)]
struct Cli {
    /// YAML file with the patterns to apply
    #[arg(long, short)]
    config: PathBuf,
    /// Directory for side files; a private temporary directory is used if omitted
    #[arg(long)]
    temp_dir: Option<PathBuf>,
    /// Keep a `.bak` copy of every file that gets rewritten
    #[arg(long)]
    backup: bool,
    /// Read block size, overrides the config file
    #[arg(long)]
    buffer_size: Option<usize>,
    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
    /// Only log errors
    #[arg(short, long)]
    quiet: bool,
    /// Files or directories to patch
    #[arg(required = true)]
    targets: Vec<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = match (cli.verbose, cli.quiet) {
        (0, true) => "error",
        (0, false) => "warn",
        (1, _) => "info",
        (2, _) => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level)).init();

    let config = Config::load(&cli.config)?;
    let mut options = config.engine_options();
    options.backup |= cli.backup;
    if let Some(size) = cli.buffer_size {
        if size == 0 {
            bail!("--buffer-size must be greater than zero");
        }
        options.buffer_size = size;
    }

    // Removed on drop, after the batch is done.
    let scratch;
    let temp_dir = match &cli.temp_dir {
        Some(dir) => dir.clone(),
        None => {
            scratch = tempfile::tempdir().context("Failed to create temp directory")?;
            scratch.path().to_path_buf()
        }
    };
    std::fs::create_dir_all(&temp_dir)
        .with_context(|| format!("Failed to create temp directory: {}", temp_dir.display()))?;

    let targets = util::collect_targets(&cli.targets, Some(temp_dir.as_path()))?;
    if targets.is_empty() {
        bail!("No files found in the given targets");
    }

    println!("Patching {} file(s)...", targets.len());
    println!("  Config: {}", cli.config.display());
    println!("  Patterns: {}", config.patterns.len());
    println!("  Temp dir: {}", temp_dir.display());

    let start = Instant::now();
    let scheduler = Scheduler::new(&temp_dir, config.patterns, options);
    let mut results = scheduler.dispatch(targets);

    let mut patched = 0usize;
    let mut unchanged = 0usize;
    let mut failed = 0usize;
    let mut bytes = 0u64;

    while let Some(result) = results.recv().await {
        match &result.outcome {
            Ok(0) => {
                unchanged += 1;
                println!("  unchanged  {}", result.path.display());
            }
            Ok(n) => {
                patched += 1;
                bytes += n;
                println!("  patched    {} ({} bytes)", result.path.display(), n);
            }
            Err(e) => {
                failed += 1;
                println!("  FAILED     {}: {}", result.path.display(), e);
            }
        }
    }
    let elapsed = start.elapsed();

    println!("\nDone.");
    println!("  Files patched: {}", patched);
    println!("  Files unchanged: {}", unchanged);
    println!("  Files failed: {}", failed);
    println!("  Bytes patched: {}", bytes);
    println!("  Time elapsed: {:.3}s", elapsed.as_secs_f64());

    if failed > 0 {
        bail!("{} file(s) failed to patch", failed);
    }

    Ok(())
}

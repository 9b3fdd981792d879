//! parcrypt: chunked, parallel file encryption
//!
//! Commands:
//!   encrypt <in> [-o <out>]   - encrypt a file (default output: <in>.enc)
//!   decrypt <in> [-o <out>]   - decrypt a file written by `encrypt`
//!   algorithms [--json]       - list the cipher catalog and per-mode properties
//!   config show               - display the merged configuration

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use secrecy::SecretString;
use serde::Serialize;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use parcrypt_core::config::ParcryptConfig;
use parcrypt_core::Direction;
use parcrypt_crypto::{is_padded, is_parallelizable, iv_len, require, AlgorithmSpec, CATALOG};
use parcrypt_engine::{run_operation, OperationConfig, ProgressFn, ProgressSnapshot, SuccessInfo};

// ── CLI structure ──────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "parcrypt",
    version,
    about = "Chunked parallel file encryption",
    long_about = "parcrypt: encrypt and decrypt files, splitting CTR and ECB payloads across worker threads"
)]
struct Cli {
    /// Path to parcrypt.toml configuration file
    #[arg(long, short = 'c', env = "PARCRYPT_CONFIG", default_value = "parcrypt.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error); overrides logging.level
    #[arg(long, env = "PARCRYPT_LOG")]
    log: Option<String>,

    /// Log format; overrides logging.format
    #[arg(long, env = "PARCRYPT_LOG_FORMAT")]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, ValueEnum, PartialEq)]
enum LogFormat {
    Json,
    Text,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Encrypt a file
    ///
    /// The password is read from PARCRYPT_PASSWORD, or prompted for twice.
    Encrypt(FileArgs),

    /// Decrypt a file
    ///
    /// Algorithm, mode and KDF settings must match the ones used to encrypt.
    Decrypt(FileArgs),

    /// List supported algorithms and modes
    Algorithms {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the active configuration (merged defaults + config file)
    Show,
}

#[derive(Args, Debug)]
struct FileArgs {
    /// Input file
    input: PathBuf,

    /// Output file (default: derived from the input name)
    #[arg(long, short = 'o')]
    output: Option<PathBuf>,

    #[command(flatten)]
    cipher: CipherArgs,

    /// Do not draw a progress bar
    #[arg(long, short = 'q')]
    quiet: bool,
}

/// Flags that override `[crypto]` and `[engine]` values from the config file
#[derive(Args, Debug, Default)]
struct CipherArgs {
    /// Catalog identifier, e.g. aes-256, twofish-256, chacha20
    #[arg(long, short = 'a')]
    algorithm: Option<String>,

    /// Block mode: ctr, ecb, cbc, cfb, ofb, gcm, none
    #[arg(long, short = 'm')]
    mode: Option<String>,

    /// Worker threads (0 = available cores)
    #[arg(long, short = 'w')]
    workers: Option<usize>,

    /// Run every chunk on one thread even when the mode allows splitting
    #[arg(long)]
    no_parallel: bool,

    /// Smallest chunk handed to one worker, in KiB
    #[arg(long)]
    min_chunk_kib: Option<u64>,

    /// Stage chunk output in temp files instead of memory
    #[arg(long)]
    spill_to_disk: bool,
}

// ── Entry point ───────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    let level = cli.log.as_deref().unwrap_or(&config.logging.level);
    let format = match cli.log_format {
        Some(format) => format,
        None => LogFormat::from_str(&config.logging.format, true)
            .map_err(anyhow::Error::msg)
            .context("parsing logging.format")?,
    };
    init_logging(level, format);

    tracing::debug!(
        version = env!("CARGO_PKG_VERSION"),
        config = %cli.config.display(),
        "parcrypt starting"
    );

    match cli.command {
        Commands::Encrypt(args) => cmd_transform(config, Direction::Encrypt, args),
        Commands::Decrypt(args) => cmd_transform(config, Direction::Decrypt, args),
        Commands::Algorithms { json } => cmd_algorithms(json),
        Commands::Config { action: ConfigAction::Show } => cmd_config_show(&config, &cli.config),
    }
}

// ── Config loading ────────────────────────────────────────────────────────────

fn load_config(path: &Path) -> Result<ParcryptConfig> {
    ParcryptConfig::load_or_default(path)
        .with_context(|| format!("loading config: {}", path.display()))
}

fn init_logging(level: &str, format: LogFormat) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    // logs go to stderr so they never mix with JSON output on stdout
    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}

/// Fold command-line flags into the loaded config.
fn apply_overrides(config: &mut ParcryptConfig, args: &CipherArgs) -> Result<()> {
    if let Some(algorithm) = &args.algorithm {
        let spec = require(algorithm)?;
        config.crypto.algorithm = spec.id.to_string();
        if args.mode.is_none() && !spec.supports(config.crypto.mode.parse()?) {
            config.crypto.mode = spec.default_mode().to_string();
        }
    }
    if let Some(mode) = &args.mode {
        config.crypto.mode = mode.to_ascii_lowercase();
    }
    if let Some(workers) = args.workers {
        config.engine.workers = workers;
    }
    if args.no_parallel {
        config.engine.parallel = false;
    }
    if let Some(kib) = args.min_chunk_kib {
        config.engine.min_chunk_kib = kib;
    }
    if args.spill_to_disk {
        config.engine.spill_to_disk = true;
    }
    Ok(())
}

/// `<in>.enc` when encrypting; strip `.enc` (or append `.dec`) when decrypting.
fn default_output(input: &Path, direction: Direction) -> PathBuf {
    let with_suffix = |suffix: &str| {
        let mut name = OsString::from(input.as_os_str());
        name.push(suffix);
        PathBuf::from(name)
    };
    match direction {
        Direction::Encrypt => with_suffix(".enc"),
        Direction::Decrypt if input.extension().is_some_and(|e| e == "enc") => {
            input.with_extension("")
        }
        Direction::Decrypt => with_suffix(".dec"),
    }
}

fn read_password(confirm: bool) -> Result<SecretString> {
    if let Ok(password) = std::env::var("PARCRYPT_PASSWORD") {
        tracing::debug!("using password from PARCRYPT_PASSWORD");
        return Ok(SecretString::from(password));
    }
    let password = rpassword::prompt_password("Password: ").context("reading password")?;
    if confirm {
        let again =
            rpassword::prompt_password("Confirm password: ").context("reading password")?;
        if again != password {
            anyhow::bail!("passwords do not match");
        }
    }
    Ok(SecretString::from(password))
}

// ── Progress bar helpers ──────────────────────────────────────────────────────

fn make_progress_bar(total: u64, prefix: &str) -> Result<ProgressBar> {
    let pb = ProgressBar::new(total);
    pb.set_style(
        ProgressStyle::with_template(
            "{prefix:.bold} [{bar:40.cyan/blue}] {bytes}/{total_bytes} {bytes_per_sec} {msg}",
        )
        .context("building progress style")?
        .progress_chars("=>-"),
    );
    pb.set_prefix(prefix.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    Ok(pb)
}

fn progress_callback(pb: &ProgressBar) -> ProgressFn {
    let pb = pb.clone();
    Arc::new(move |snap: ProgressSnapshot| {
        pb.set_length(snap.total_bytes);
        pb.set_position(snap.bytes_processed);
        pb.set_message(format!(
            "{}/{} chunks",
            snap.chunks_completed, snap.total_chunks
        ));
    })
}

// ── `parcrypt encrypt` / `parcrypt decrypt` ───────────────────────────────────

fn cmd_transform(mut config: ParcryptConfig, direction: Direction, args: FileArgs) -> Result<()> {
    apply_overrides(&mut config, &args.cipher)?;
    let output = args
        .output
        .clone()
        .unwrap_or_else(|| default_output(&args.input, direction));

    let password = read_password(direction.is_encrypt())?;
    let op = OperationConfig::from_config(&config, direction, password, &args.input, &output)
        .context("building operation")?;

    let pb = if args.quiet {
        None
    } else {
        Some(make_progress_bar(0, &direction.to_string())?)
    };
    let result = run_operation(&op, pb.as_ref().map(progress_callback));

    let info = match result {
        Ok(info) => {
            if let Some(pb) = &pb {
                pb.finish_with_message("done");
            }
            info
        }
        Err(e) => {
            if let Some(pb) = &pb {
                pb.abandon_with_message("failed");
            }
            return Err(e).with_context(|| format!("{direction}ing {}", args.input.display()));
        }
    };

    print_summary(&op, &info, direction);
    Ok(())
}

fn print_summary(op: &OperationConfig, info: &SuccessInfo, direction: Direction) {
    let verb = match direction {
        Direction::Encrypt => "Encrypted",
        Direction::Decrypt => "Decrypted",
    };
    println!(
        "{verb} {} → {}",
        op.input_path.display(),
        info.output_path.display()
    );
    println!("  cipher:  {}/{}", op.algorithm.id, op.mode);
    println!(
        "  chunks:  {} ({} worker{}{})",
        info.chunks,
        info.workers,
        if info.workers == 1 { "" } else { "s" },
        if info.parallel { ", parallel" } else { "" }
    );
    println!(
        "  bytes:   {} → {}",
        fmt_bytes(info.bytes_in),
        fmt_bytes(info.bytes_out)
    );
    println!("  elapsed: {:.2?}", info.elapsed);
}

// ── `parcrypt algorithms` ─────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct AlgorithmRow {
    id: &'static str,
    family: String,
    key_bits: u32,
    block_bytes: usize,
    default_mode: String,
    modes: Vec<ModeRow>,
}

#[derive(Debug, Serialize)]
struct ModeRow {
    mode: String,
    parallel: bool,
    iv_bytes: usize,
    padded: bool,
}

fn catalog_rows() -> Vec<AlgorithmRow> {
    CATALOG.iter().map(algorithm_row).collect()
}

fn algorithm_row(spec: &AlgorithmSpec) -> AlgorithmRow {
    AlgorithmRow {
        id: spec.id,
        family: spec.family.to_string(),
        key_bits: spec.key_size_bits,
        block_bytes: spec.block_size_bytes,
        default_mode: spec.default_mode().to_string(),
        modes: spec
            .supported_modes
            .iter()
            .map(|&mode| ModeRow {
                mode: mode.to_string(),
                parallel: is_parallelizable(spec.family, mode),
                iv_bytes: iv_len(spec, mode),
                padded: is_padded(mode),
            })
            .collect(),
    }
}

fn cmd_algorithms(json: bool) -> Result<()> {
    let rows = catalog_rows();
    if json {
        let rendered = serde_json::to_string_pretty(&rows).context("serializing catalog")?;
        println!("{rendered}");
        return Ok(());
    }

    println!(
        "{:<12} {:>4} {:>6}  {:<5} {:<9} {:>3}  {}",
        "ALGORITHM", "KEY", "BLOCK", "MODE", "PARALLEL", "IV", "PADDED"
    );
    for row in &rows {
        for mode in &row.modes {
            let marker = if mode.mode == row.default_mode { "*" } else { "" };
            println!(
                "{:<12} {:>4} {:>6}  {:<5} {:<9} {:>3}  {}",
                row.id,
                row.key_bits,
                row.block_bytes,
                format!("{}{marker}", mode.mode),
                if mode.parallel { "yes" } else { "no" },
                mode.iv_bytes,
                if mode.padded { "yes" } else { "no" },
            );
        }
    }
    println!();
    println!("* default mode when only --algorithm is given");
    Ok(())
}

// ── `parcrypt config show` ────────────────────────────────────────────────────

fn cmd_config_show(config: &ParcryptConfig, config_path: &Path) -> Result<()> {
    if config_path.exists() {
        println!("# Configuration from: {}", config_path.display());
    } else {
        println!("# Configuration: defaults (no file at {})", config_path.display());
    }
    println!();
    let rendered = toml::to_string_pretty(config).context("serializing config to TOML")?;
    print!("{rendered}");
    Ok(())
}

fn fmt_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;
    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{bytes} B")
    }
}

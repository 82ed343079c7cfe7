use ab_buckets::{BucketConverter, ConverterConfig, Error, NearestBucket, files};
use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use std::fs;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Convert CIELab ab-values to palette buckets and back.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// JSON config naming the palette and index files
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Palette file (.npy or .json); overrides the config
    #[arg(short, long)]
    palette: Option<PathBuf>,

    /// Nearest-neighbor index file; overrides the config
    #[arg(short, long)]
    index: Option<PathBuf>,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Bucket H x W x C Lab arrays (.npy) into H x W bucket arrays
    Quantize {
        #[command(flatten)]
        target: Target,

        /// Output filename prefix
        #[arg(long, default_value = "buckets_")]
        prefix: String,
    },
    /// Expand H x W (or B x H x W) bucket arrays (.npy) into ab-values
    Dequantize {
        #[command(flatten)]
        target: Target,

        /// Output filename prefix
        #[arg(long, default_value = "ab_")]
        prefix: String,
    },
    /// Print a summary of the loaded palette and index as JSON
    Inspect,
}

#[derive(clap::Args, Debug)]
struct Target {
    /// One or more input .npy paths
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Output file; only with a single input
    #[arg(short, long, conflicts_with = "out_dir")]
    output: Option<PathBuf>,

    /// Output directory (current by default)
    #[arg(short = 'd', long)]
    out_dir: Option<PathBuf>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_level.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let config = resolve_config(&args)?;
    let converter = BucketConverter::from_config(&config).with_context(|| {
        format!(
            "failed to load {} and {}",
            config.palette_path.display(),
            config.index_path.display(),
        )
    })?;

    match &args.command {
        Command::Quantize { target, prefix } => {
            convert(target, prefix, "quantize", |bytes| files::quantize_npy(&converter, bytes))?;
        }
        Command::Dequantize { target, prefix } => {
            convert(target, prefix, "dequantize", |bytes| {
                files::dequantize_npy(&converter, bytes)
            })?;
        }
        Command::Inspect => {
            let summary = serde_json::json!({
                "palette": config.palette_path,
                "index": config.index_path,
                "buckets": converter.palette().len(),
                "algorithm": converter.index().algorithm(),
                "n_features": converter.index().n_features(),
                "index_points": converter.index().len(),
            });
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
    }

    Ok(())
}

fn resolve_config(args: &Args) -> Result<ConverterConfig> {
    let config = match &args.config {
        Some(path) => ConverterConfig::from_json_file(path)
            .with_context(|| format!("failed to read config {}", path.display()))?,
        None => ConverterConfig::default(),
    };

    Ok(config.with_overrides(args.palette.clone(), args.index.clone()))
}

fn convert<F>(target: &Target, prefix: &str, verb: &str, run: F) -> Result<()>
where
    F: Fn(&[u8]) -> Result<Vec<u8>, Error>,
{
    if target.output.is_some() && target.inputs.len() > 1 {
        bail!("--output takes a single input, got {}", target.inputs.len());
    }

    for input in &target.inputs {
        let Some(out_path) = files::output_path(
            input,
            target.output.as_deref(),
            target.out_dir.as_deref(),
            prefix,
        ) else {
            bail!("{} has no file name", input.display());
        };

        let bytes =
            fs::read(input).with_context(|| format!("failed to read {}", input.display()))?;
        let out = run(&bytes).with_context(|| format!("{verb} {} failed", input.display()))?;

        if let Some(dir) = out_path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;
        }
        fs::write(&out_path, out)
            .with_context(|| format!("failed to write {}", out_path.display()))?;
        info!("saved → {}", out_path.display());
    }

    Ok(())
}

use anyhow::{Context, Result, bail};
use clap::{ArgAction, Parser, ValueEnum};
use rayon::prelude::*;
use sheethtml_core::{Converter, ConverterConfig};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

mod formatter;

use formatter::FileReport;

#[derive(Parser)]
#[command(name = "sheethtml")]
#[command(about = "Render XLSX workbooks as self-contained HTML documents", long_about = None)]
#[command(version)]
struct Cli {
    /// Workbooks to convert
    #[arg(value_name = "FILE", required = true)]
    files: Vec<PathBuf>,

    /// Output file, or output directory when several files are given
    #[arg(short, long, value_name = "OUT")]
    output: Option<PathBuf>,

    /// Locale for number formatting (overrides the config file)
    #[arg(long)]
    locale: Option<String>,

    /// Path to configuration file (TOML)
    #[arg(short, long, value_name = "CONFIG")]
    config: Option<PathBuf>,

    /// Apply conditional formatting
    #[arg(long)]
    apply_cf: bool,

    /// Output format
    #[arg(short, long, value_enum, default_value = "human")]
    format: OutputFormat,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Human-readable colored output
    Human,
    /// JSON output for scripting
    Json,
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(path: Option<&Path>) -> Result<ConverterConfig> {
    if let Some(config_path) = path {
        return ConverterConfig::from_file(config_path)
            .with_context(|| format!("Failed to load config from {}", config_path.display()));
    }
    // Try to load default config from current directory if it exists
    let default_config_path = PathBuf::from("sheethtml.toml");
    if default_config_path.exists() {
        ConverterConfig::from_file(&default_config_path).with_context(|| {
            format!(
                "Failed to load config from {}",
                default_config_path.display()
            )
        })
    } else {
        Ok(ConverterConfig::default())
    }
}

/// Where the document for `source` goes
fn destination(source: &Path, output: Option<&Path>, batch: bool) -> PathBuf {
    let file_name = Path::new(source.file_stem().unwrap_or(source.as_os_str())).with_extension("html");
    match output {
        Some(dir) if batch || dir.is_dir() => dir.join(file_name),
        Some(file) => file.to_path_buf(),
        None => source.with_file_name(file_name),
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let mut config = load_config(cli.config.as_deref())?;
    if let Some(locale) = cli.locale {
        config.options.locale = locale;
    }
    if cli.apply_cf {
        config.options.apply_conditional_formatting = true;
    }

    let templates = config.load_templates()?;
    let converter = Converter::new(templates, config.options).context("Invalid configuration")?;

    let batch = cli.files.len() > 1;
    if let Some(dir) = &cli.output
        && batch
        && dir.exists()
        && !dir.is_dir()
    {
        bail!(
            "{} must be a directory when converting several files",
            dir.display()
        );
    }

    let reports: Vec<FileReport> = cli
        .files
        .par_iter()
        .map(|source| {
            let dest = destination(source, cli.output.as_deref(), batch);
            let outcome = converter.convert(source, &dest);
            FileReport {
                source: source.clone(),
                destination: dest,
                outcome,
            }
        })
        .collect();

    match cli.format {
        OutputFormat::Human => formatter::print_human(&reports),
        OutputFormat::Json => formatter::print_json(&reports)?,
    }

    let exit_code = if reports.iter().all(|r| r.outcome.ok) {
        0
    } else {
        1
    };
    std::process::exit(exit_code);
}

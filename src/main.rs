use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

use complaint_register::config::Config;
use complaint_register::observability::{self, metrics};
use complaint_register::pipeline::parser::columns::canonical_field;
use complaint_register::pipeline::parser::{RawRecord, SourceFormat};
use complaint_register::pipeline::storage::{check_register, quarantine_register, RegisterHealth};
use complaint_register::pipeline::{Pipeline, PipelineResult};

#[derive(Parser)]
#[command(name = "complaint_register")]
#[command(about = "Build a deduplicated complaint register from CSV, Excel and PDF uploads")]
#[command(version)]
struct Cli {
    /// Config file (defaults to $COMPLAINT_REGISTER_CONFIG or complaint_register.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Register workbook to read and write, overriding the config
    #[arg(long, global = true)]
    register: Option<PathBuf>,

    /// Print the run summary as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Write a Prometheus text snapshot here on exit
    #[arg(long, global = true)]
    metrics_out: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse an upload and merge it into the register
    Ingest {
        file: PathBuf,
        /// Override the format implied by the file extension
        #[arg(long, value_enum)]
        format: Option<FormatArg>,
    },
    /// Register a single complaint given as field=value pairs
    Submit {
        #[arg(long = "field", value_name = "KEY=VALUE", required = true)]
        fields: Vec<String>,
    },
    /// Reload the register and rewrite every derived sheet
    Rebuild,
    /// Inspect the register file
    Check {
        /// Rename a corrupt register aside so the next run starts fresh
        #[arg(long)]
        fix: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum FormatArg {
    Csv,
    Xlsx,
    Xls,
    Pdf,
}

impl From<FormatArg> for SourceFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Csv => SourceFormat::Csv,
            FormatArg::Xlsx => SourceFormat::Xlsx,
            FormatArg::Xls => SourceFormat::Xls,
            FormatArg::Pdf => SourceFormat::Pdf,
        }
    }
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::load_from(path).with_context(|| format!("loading config {}", path.display()))?,
        None => Config::load().context("loading config")?,
    };
    if let Some(register) = &cli.register {
        config.register.path = register.clone();
    }
    Ok(config)
}

/// `key=value` pairs to a raw record. Keys go through the same header
/// aliases as uploaded columns.
fn form_record(fields: &[String]) -> Result<RawRecord> {
    let mut record = RawRecord::new();
    for pair in fields {
        let (key, value) = pair
            .split_once('=')
            .ok_or_else(|| anyhow!("--field expects KEY=VALUE, got '{}'", pair))?;
        let field = canonical_field(key).ok_or_else(|| anyhow!("unknown field '{}'", key.trim()))?;
        record.insert(field, value.trim());
    }
    Ok(record)
}

fn print_result(result: &PipelineResult, json: bool) -> Result<()> {
    if json {
        return print_json(result);
    }
    println!("Register: {}", result.output_file.display());
    if let Some(format) = result.source_format {
        println!("   Source format: {}", format);
    }
    println!("   Parsed: {}", result.parsed);
    println!("   Added: {}", result.added);
    println!("   Already registered: {} ({} status updates)", result.duplicate_ids, result.status_updates);
    println!("   Skipped (no name or contact): {}", result.skipped_unparsed);
    println!("   Total records: {}", result.total_records);
    println!("   High value cases: {}", result.high_value_cases);
    println!("   Possible duplicate groups: {}", result.duplicate_groups);
    println!("   Sheets: {}", result.sheets.join(", "));

    if !result.field_warnings.is_empty() {
        println!("\nField warnings:");
        for record in &result.field_warnings {
            for w in &record.warnings {
                println!("   - {} {}: '{}' ({})", record.id, w.field, w.value, w.reason);
            }
        }
    }
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn run_check(path: &Path, fix: bool, json: bool) -> Result<()> {
    let health = check_register(path).with_context(|| format!("checking {}", path.display()))?;
    if json {
        print_json(&health)?;
    } else {
        match &health {
            RegisterHealth::Missing => println!("{}: no register yet", path.display()),
            RegisterHealth::Valid { records } => println!("{}: ok, {} records", path.display(), records),
            RegisterHealth::Corrupt { reason } => println!("{}: corrupt ({})", path.display(), reason),
        }
    }

    if let RegisterHealth::Corrupt { reason } = health {
        if !fix {
            bail!("register {} is corrupt: {}", path.display(), reason);
        }
        let moved = quarantine_register(path).context("moving corrupt register aside")?;
        warn!("Corrupt register moved to {}", moved.display());
        if !json {
            println!("Moved to {}; the next run starts a fresh register", moved.display());
        }
    }
    Ok(())
}

fn run(cli: &Cli, config: &Config) -> Result<()> {
    let build = || Pipeline::from_config(config).context("building pipeline");
    let result = match &cli.command {
        Commands::Check { fix } => return run_check(&config.register.path, *fix, cli.json),
        Commands::Ingest { file, format } => build()?
            .ingest_file(file, format.map(SourceFormat::from))
            .with_context(|| format!("ingesting {}", file.display()))?,
        Commands::Submit { fields } => build()?
            .submit_form(form_record(fields)?)
            .context("registering form submission")?,
        Commands::Rebuild => build()?.rebuild().context("rebuilding register")?,
    };
    info!(
        "Run {} finished: {} added, {} total",
        result.run_id, result.added, result.total_records
    );
    print_result(&result, cli.json)
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;

    observability::init_logging(&config.logging);
    if cli.metrics_out.is_some() {
        metrics::init().map_err(|e| anyhow!("{}", e))?;
    }

    let outcome = run(&cli, &config);
    if let Err(e) = &outcome {
        error!("{:#}", e);
    }

    if let Some(path) = &cli.metrics_out {
        metrics::write_snapshot(path).with_context(|| format!("writing metrics to {}", path.display()))?;
    }
    outcome
}

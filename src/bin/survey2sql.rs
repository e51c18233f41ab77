//! Command-line front end: generate an insert script from a GeoPackage layer,
//! or load the layer straight into a SQLite database.

use clap::{Args, Parser, Subcommand};
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use survey_sql::{
    Dialect, DirectWriter, ExportConfig, Gpkg, RunContext, ScriptEmitter, SqliteExecutor,
    TableSchema, preset, preset_names,
};
use tracing::{Level, info};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(
    name = "survey2sql",
    version,
    about = "Convert survey feature layers into SQL insert statements"
)]
struct Cli {
    /// Enable verbose (INFO level) logging output.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Enable debug (DEBUG level) logging output.
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a SQL script to review and run by hand.
    Script {
        #[command(flatten)]
        export: ExportArgs,

        /// Script to write.
        #[arg(short, long, value_name = "FILE")]
        output: PathBuf,
    },

    /// Execute the statements against a SQLite database, one commit per row.
    Load {
        #[command(flatten)]
        export: ExportArgs,

        /// SQLite database to load into.
        #[arg(short, long, value_name = "DATABASE")]
        target: PathBuf,

        /// Run log to write; defaults to the target path with a `.log` extension.
        #[arg(long, value_name = "FILE")]
        log: Option<PathBuf>,
    },

    /// List the feature layers of a GeoPackage.
    Layers {
        #[arg(value_name = "GPKG")]
        source: PathBuf,
    },

    /// List the built-in table schemas.
    Presets,
}

#[derive(Args)]
struct ExportArgs {
    /// GeoPackage holding the survey features.
    #[arg(short, long, value_name = "GPKG")]
    source: PathBuf,

    /// Layer to read; may be left out when the GeoPackage has a single layer.
    #[arg(short, long)]
    layer: Option<String>,

    /// Built-in table schema (see `presets`).
    #[arg(long, conflicts_with = "schema", required_unless_present = "schema")]
    table: Option<String>,

    /// Table schema YAML file.
    #[arg(long, value_name = "FILE")]
    schema: Option<PathBuf>,

    /// Run parameter such as `survey_id=DENA-2024`; repeatable.
    #[arg(short, long = "param", value_name = "NAME=VALUE", value_parser = parse_param)]
    params: Vec<(String, String)>,

    /// Run configuration YAML file.
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,
}

fn main() {
    if let Err(err) = run() {
        eprintln!("survey2sql failed: {err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let log_level = if cli.debug {
        Level::DEBUG
    } else if cli.verbose {
        Level::INFO
    } else {
        Level::WARN
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Script { export, output } => {
            let (schema, context) = prepare(&export, None)?;
            let gpkg = Gpkg::open_read_only(&export.source)?;
            let layer = gpkg
                .layer(&layer_name(&gpkg, export.layer.as_deref())?)?
                .with_batch_size(context.config.batch_size);

            let summary = ScriptEmitter::new(&schema, &context).emit_to_path(&layer, &output)?;
            println!("{summary}");
            println!("Output written to {}", output.display());
        }
        Commands::Load {
            export,
            target,
            log,
        } => {
            let (schema, context) = prepare(&export, Some(Dialect::Sqlite))?;
            let gpkg = Gpkg::open_read_only(&export.source)?;
            let layer = gpkg
                .layer(&layer_name(&gpkg, export.layer.as_deref())?)?
                .with_batch_size(context.config.batch_size);

            let log_path = log.unwrap_or_else(|| target.with_extension("log"));
            let log_file = BufWriter::new(File::create(&log_path)?);
            let mut executor = SqliteExecutor::open(&target, context.config.busy_timeout())?;
            info!(target = %target.display(), "loading");

            let summary =
                DirectWriter::new(&schema, &context).run(&layer, &mut executor, log_file)?;
            println!("{summary}");
            println!(
                "{} queries failed to execute. See {} for details.",
                summary.failure_count(),
                log_path.display()
            );
        }
        Commands::Layers { source } => {
            let gpkg = Gpkg::open_read_only(&source)?;
            for layer in gpkg.list_layers()? {
                println!("{layer}");
            }
        }
        Commands::Presets => {
            for name in preset_names() {
                let schema = preset(name)?;
                println!("{name}: {}", schema.table);
            }
        }
    }

    Ok(())
}

fn prepare(
    export: &ExportArgs,
    dialect: Option<Dialect>,
) -> Result<(TableSchema, RunContext), Box<dyn std::error::Error>> {
    let mut config = match &export.config {
        Some(path) => ExportConfig::load(path)?,
        None => ExportConfig::default(),
    };
    if let Some(dialect) = dialect {
        config = config.with_dialect(dialect);
    }

    let schema = match (&export.table, &export.schema) {
        (Some(name), _) => preset(name)?,
        (None, Some(path)) => TableSchema::load(path)?,
        (None, None) => return Err("either --table or --schema is required".into()),
    };

    let mut context = RunContext::new(config);
    for (name, value) in &export.params {
        context = context.with_parameter(name.clone(), value.clone());
    }
    Ok((schema, context))
}

fn layer_name(gpkg: &Gpkg, requested: Option<&str>) -> Result<String, Box<dyn std::error::Error>> {
    if let Some(name) = requested {
        return Ok(name.to_string());
    }
    let layers = gpkg.list_layers()?;
    match layers.as_slice() {
        [single] => Ok(single.clone()),
        _ => Err(format!(
            "{} has {} layers ({}); choose one with --layer",
            display_name(gpkg.path()),
            layers.len(),
            layers.join(", ")
        )
        .into()),
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn parse_param(raw: &str) -> Result<(String, String), String> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=VALUE, got '{raw}'"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("missing parameter name in '{raw}'"));
    }
    Ok((name.to_string(), value.to_string()))
}

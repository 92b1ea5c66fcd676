use clap::{Parser, Subcommand};
use rand::SeedableRng;
use rand::rngs::StdRng;
use schemaboard::core::Schema;
use schemaboard::core::auto_layout::auto_layout;
use schemaboard::core::config::Config;
use schemaboard::core::export::json::{export_json, import_json};
use schemaboard::core::export::{ExportError, ExportFormat, ExportOptions, export_schema};
use schemaboard::core::sql_parser::{ImportError, parse_sql};
use schemaboard::core::validation::validate_schema;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use thiserror::Error;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "schemaboard", version, about = "Schema board import, lint and export")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Render a board as SQL, JSON, Prisma or TypeORM
    Export {
        /// DDL (.sql) or interchange JSON (.json) input
        input: PathBuf,
        #[arg(short, long, default_value = "sql")]
        format: ExportFormat,
        /// Append generated sample rows (sql and json only)
        #[arg(long)]
        fake_data: bool,
        /// Rows per table when generating sample data
        #[arg(long)]
        rows: Option<usize>,
        /// Seed for reproducible sample data
        #[arg(long)]
        seed: Option<u64>,
        /// Write to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Print advisory warnings for a board
    Lint { input: PathBuf },
    /// Auto-layout a board and print it as interchange JSON
    Layout {
        input: PathBuf,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Debug, Error)]
enum CliError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to import {path}: {source}")]
    Import { path: PathBuf, source: ImportError },
    #[error(transparent)]
    Export(#[from] ExportError),
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum InputKind {
    Sql,
    Json,
}

fn detect_input(path: &Path, text: &str) -> InputKind {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("json") => InputKind::Json,
        Some(ext) if ext.eq_ignore_ascii_case("sql") => InputKind::Sql,
        _ if text.trim_start().starts_with('{') => InputKind::Json,
        _ => InputKind::Sql,
    }
}

fn load_schema(path: &Path) -> Result<Schema, CliError> {
    let text = fs::read_to_string(path).map_err(|source| CliError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let name = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("board")
        .to_string();
    let import_error = |source| CliError::Import {
        path: path.to_path_buf(),
        source,
    };

    let kind = detect_input(path, &text);
    debug!(path = %path.display(), ?kind, "loading board");
    let schema = match kind {
        InputKind::Json => import_json(&text, &name).map_err(import_error)?.schema,
        InputKind::Sql => {
            let parsed = parse_sql(&text).map_err(import_error)?;
            let mut schema = Schema::new(name);
            schema.tables = parsed.tables;
            schema.relationships = parsed.relationships;
            schema.enums = parsed.enums;
            schema
        }
    };
    info!(
        tables = schema.tables.len(),
        relationships = schema.relationships.len(),
        "loaded board"
    );
    Ok(schema)
}

fn emit(content: &str, output: Option<&Path>) -> Result<(), CliError> {
    match output {
        Some(path) => {
            fs::write(path, content).map_err(|source| CliError::Write {
                path: path.to_path_buf(),
                source,
            })?;
            info!(path = %path.display(), "wrote output");
        }
        None => print!("{content}"),
    }
    Ok(())
}

fn run(cli: Cli, config: &Config) -> Result<ExitCode, CliError> {
    match cli.command {
        Command::Export {
            input,
            format,
            fake_data,
            rows,
            seed,
            output,
        } => {
            let schema = load_schema(&input)?;
            let mut options = ExportOptions {
                default_rows: config.export_rows,
                ..Default::default()
            };
            if fake_data {
                if !format.supports_fake_data() {
                    warn!(%format, "format does not support sample data, ignoring --fake-data");
                }
                options = options.with_fake_data(rows.unwrap_or(config.export_rows));
            }
            let mut rng = match seed {
                Some(seed) => StdRng::seed_from_u64(seed),
                None => StdRng::from_entropy(),
            };
            let artifact = export_schema(&schema, format, &options, &mut rng)?;
            emit(&artifact.content, output.as_deref())?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Lint { input } => {
            let schema = load_schema(&input)?;
            let warnings = validate_schema(&schema);
            for warning in &warnings {
                println!("{:<22} {warning}", warning.code());
            }
            info!(warnings = warnings.len(), "lint finished");
            Ok(if warnings.is_empty() {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(1)
            })
        }
        Command::Layout { input, output } => {
            let mut schema = load_schema(&input)?;
            auto_layout(&mut schema);
            let mut rng = StdRng::seed_from_u64(0);
            let json = export_json(&schema, &ExportOptions::default(), &mut rng)?;
            emit(&json, output.as_deref())?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn main() -> ExitCode {
    // Load .env file (if exists)
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("schemaboard=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = Config::from_env();
    debug!(?config, "config loaded");

    match run(Cli::parse(), &config) {
        Ok(code) => code,
        Err(err) => {
            tracing::error!(error = %err, "command failed");
            eprintln!("error: {err}");
            ExitCode::from(2)
        }
    }
}

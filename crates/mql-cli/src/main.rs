//! mqlc - compile SQL logical plans to aggregation pipelines
//!
//! Usage:
//!   mqlc compile --schema <schema.yaml> --plan <plan.json> [--max-rows N] [--pretty]
//!   mqlc tables --schema <schema.yaml>
//!   mqlc explain --schema <schema.yaml> --plan <plan.json>
//!
//! Every subcommand accepts `--config <config.yaml>`. `MQLC_SCHEMA` and
//! `MQLC_MAX_ROWS` supply defaults for `--schema` and `--max-rows`.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use mql_compiler::{CompileOptions, QueryCompiler};
use tracing::debug;

mod commands;
mod config;
mod logging;

use config::Config;

#[derive(Parser)]
#[command(name = "mqlc")]
#[command(about = "Compiles SQL logical plans into aggregation pipelines")]
#[command(version)]
struct Cli {
    /// YAML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a plan and print the query context as JSON
    Compile {
        /// Schema description (YAML, or JSON with a .json extension)
        #[arg(short, long)]
        schema: Option<PathBuf>,

        /// Plan in JSON form
        #[arg(short, long)]
        plan: PathBuf,

        /// Cap on returned rows, 0 for none
        #[arg(long)]
        max_rows: Option<u64>,

        /// Indent the output
        #[arg(long)]
        pretty: bool,
    },

    /// List the relational tables of a schema
    Tables {
        #[arg(short, long)]
        schema: Option<PathBuf>,
    },

    /// Show which plan nodes can run as pipeline stages and at what cost
    Explain {
        #[arg(short, long)]
        schema: Option<PathBuf>,

        #[arg(short, long)]
        plan: PathBuf,
    },
}

fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let config = match &cli.config {
        Some(path) => Config::load(path).with_context(|| format!("Failed to load config '{}'", path.display()))?,
        None => Config::from_env()?,
    };
    logging::init(&config.logging)?;
    debug!(?config, "Configuration loaded");

    match cli.command {
        Commands::Compile {
            schema,
            plan,
            max_rows,
            pretty,
        } => {
            let schema = commands::load_schema(&schema_path(schema, &config)?)?;
            let plan = commands::load_plan(&plan)?;
            let options = CompileOptions::with_max_rows(max_rows.unwrap_or(config.compile.max_rows));
            let compiler = QueryCompiler::new(Arc::new(schema));
            println!("{}", commands::compile(&compiler, &plan, &options, pretty)?);
        }
        Commands::Tables { schema } => {
            let schema = commands::load_schema(&schema_path(schema, &config)?)?;
            print!("{}", commands::tables_markdown(&schema));
        }
        Commands::Explain { schema, plan } => {
            let schema = commands::load_schema(&schema_path(schema, &config)?)?;
            let plan = commands::load_plan(&plan)?;
            let compiler = QueryCompiler::new(Arc::new(schema));
            println!("{}", commands::explain(compiler.operators(), &plan)?);
        }
    }
    Ok(())
}

/// `--schema`, falling back to the configured schema path
fn schema_path(arg: Option<PathBuf>, config: &Config) -> anyhow::Result<PathBuf> {
    arg.or_else(|| config.compile.schema_path.clone())
        .context("No schema given: pass --schema or set MQLC_SCHEMA")
}

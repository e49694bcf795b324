//! udfkit command line
//!
//! Inspects the built-in function library: dumps the catalogue, shows how a
//! call resolves for given argument types and evaluates aggregates over
//! literal rows.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{debug, info};
use udfkit_exec::AggregatePlan;
use udfkit_registry::{default_library, Lowering, Resolver};

mod catalog;
mod config;
mod input;
mod logging;

use catalog::CatalogFormat;
use config::Config;

#[derive(Debug, Parser)]
#[command(name = "udfkit", about = "Inspect and exercise the udfkit function library")]
struct Cli {
    /// YAML configuration file (defaults to $UDFKIT_CONFIG)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Dump every function with its aliases, docs and signatures
    Catalog {
        #[arg(long, value_enum)]
        format: Option<CatalogFormat>,
    },
    /// Show the variant chosen for a call with the given argument types
    Resolve {
        name: String,
        /// Argument types, e.g. `int64` or `string?` for nullable
        types: Vec<String>,
    },
    /// Evaluate an aggregate over literal rows
    Aggregate {
        name: String,

        #[arg(long, value_delimiter = ',')]
        types: Vec<String>,

        /// JSON array of rows, e.g. '[[1, "x"], [2, "y"]]'
        #[arg(long)]
        rows: String,
    },
}

fn load_config(path: Option<PathBuf>) -> Result<Config> {
    let path = path.or_else(|| std::env::var_os("UDFKIT_CONFIG").map(PathBuf::from));
    match path {
        Some(path) => Config::load(&path)
            .with_context(|| format!("failed to load config {}", path.display())),
        None => Ok(Config::from_env()?),
    }
}

fn resolve(name: &str, types: &[String]) -> Result<()> {
    let types = input::parse_types(types)?;
    let resolver = Resolver::new(default_library());
    let resolved = resolver.resolve_types(name, &types)?;

    println!("function: {}", resolved.name);
    println!("signature: ({})", resolved.variant.signature);
    println!("kind: {}", resolved.variant.variant.kind());
    match &resolved.lowering {
        Lowering::CallNative {
            symbol,
            return_by_arg,
        } => {
            println!("symbol: {}", symbol);
            println!("return_by_arg: {}", return_by_arg);
        }
        Lowering::Expand(expr) => println!("expansion: {}", expr),
        Lowering::EmitInline | Lowering::Aggregate => {}
    }
    println!("output: {}", resolved.output);
    Ok(())
}

fn aggregate(name: &str, types: &[String], rows: &str) -> Result<()> {
    let types = input::parse_types(types)?;
    let rows = input::parse_rows(rows, &types)?;
    let plan = AggregatePlan::compile(default_library(), name, &types)?;
    debug!(aggregate = plan.name(), rows = rows.len(), "evaluating aggregate");
    let result = plan.evaluate(&rows)?;
    println!("{}", result);
    Ok(())
}

fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let config = load_config(cli.config)?;
    logging::init(&config.logging);
    info!(functions = default_library().len(), "udfkit ready");

    match cli.command {
        Command::Catalog { format } => {
            let format = format.unwrap_or(config.catalog.format);
            let docs = default_library().describe();
            print!(
                "{}",
                catalog::render(&docs, format, config.catalog.include_aliases)?
            );
        }
        Command::Resolve { name, types } => resolve(&name, &types)?,
        Command::Aggregate { name, types, rows } => aggregate(&name, &types, &rows)?,
    }
    Ok(())
}

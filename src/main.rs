use anyhow::{Context, Result};
use clap::{error::ErrorKind, Args, Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;

mod commands;
mod config;
mod connection;
mod datasource;
mod env;
mod error_codes;
mod exit_codes;
mod introspect;
mod output;
mod psl;
mod reconcile;
mod redact;
mod session;
use config::Config;
use error_codes::PullError;
use output::{JsonError, Output};
use session::TimeoutConfig;

/// Version from Cargo.toml
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Timeouts with resolution order: CLI > schemapull.toml > defaults.
fn parse_timeout_config(cli: &Cli, config: &Config) -> Result<TimeoutConfig> {
    let connect_timeout = match cli.connect_timeout.as_deref() {
        Some(s) => Some(session::parse_duration(s).context("Invalid --connect-timeout")?),
        None => config.connect_timeout()?,
    };

    let statement_timeout = match cli.statement_timeout.as_deref() {
        Some(s) => Some(session::parse_duration(s).context("Invalid --statement-timeout")?),
        None => config.statement_timeout()?,
    };

    Ok(TimeoutConfig::new(connect_timeout, statement_timeout))
}

#[derive(Parser)]
#[command(name = "schemapull")]
#[command(version = VERSION)]
#[command(
    about = "Introspect a live database and write the result into a Prisma schema",
    long_about = None
)]
#[command(subcommand_required = true, arg_required_else_help = true)]
struct Cli {
    /// Path to config file (default: ./schemapull.toml)
    #[arg(long = "config", global = true)]
    config_path: Option<PathBuf>,

    /// Minimal output (errors only)
    #[arg(long, global = true)]
    quiet: bool,

    /// Show connection and catalog tracing on stderr
    #[arg(long, global = true)]
    verbose: bool,

    /// Output as JSON instead of human-readable text
    #[arg(long, global = true)]
    json: bool,

    /// Connection timeout (e.g., "5s", "500ms"). Default: 5s
    #[arg(long = "connect-timeout", global = true, value_name = "DURATION")]
    connect_timeout: Option<String>,

    /// Statement timeout (e.g., "30s", "1m"). Default: 30s
    #[arg(long = "statement-timeout", global = true, value_name = "DURATION")]
    statement_timeout: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Database commands
    Db {
        #[command(subcommand)]
        command: DbCommands,
    },
    /// Same as `db pull`
    Introspect(PullArgs),
}

#[derive(Subcommand)]
enum DbCommands {
    /// Pull the state from the database into the schema file
    Pull(PullArgs),
}

#[derive(Args, Clone)]
struct PullArgs {
    /// Schema file (default: ./schema.prisma, then ./prisma/schema.prisma)
    #[arg(long)]
    schema: Option<PathBuf>,

    /// Connection string to introspect (overrides the schema datasource)
    #[arg(long)]
    url: Option<String>,

    /// Print the reconciled schema to stdout instead of writing the file
    #[arg(long)]
    print: bool,

    /// Ignore existing models and enums and regenerate them
    #[arg(long)]
    force: bool,
}

#[tokio::main]
async fn main() {
    // Check for --json flag early (before full parsing) for error handling
    let json_mode = std::env::args().any(|arg| arg == "--json");

    // Use try_parse to handle clap errors in JSON mode
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            if json_mode
                && !matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion)
            {
                let output = Output::new(true, false, false);
                JsonError::new(&PullError::uncoded(e.to_string().trim_end())).print(&output);
                std::process::exit(2);
            }
            e.exit();
        }
    };

    let output = Output::new(cli.json, cli.quiet, cli.verbose);

    if let Err(e) = run(cli, &output).await {
        // Failures that never went through the classifier are unexpected.
        let operational = e.downcast_ref::<PullError>().is_none();
        let err = error_codes::classify(&e);
        if output.is_json() {
            JsonError::new(&err).print(&output);
        } else {
            output.error(&render_error(&err));
        }
        std::process::exit(exit_codes::for_error(&err, operational));
    }
}

async fn run(cli: Cli, output: &Output) -> Result<()> {
    let base_dir = std::env::current_dir().context("Failed to determine working directory")?;
    let config = Config::load(cli.config_path.as_deref(), &base_dir).map_err(config_error)?;
    let timeouts = parse_timeout_config(&cli, &config).map_err(config_error)?;

    match cli.command {
        Commands::Db {
            command: DbCommands::Pull(args),
        }
        | Commands::Introspect(args) => {
            let opts = commands::PullOptions {
                base_dir,
                schema: args.schema,
                config_schema: config.schema_path().map(str::to_string),
                url: args.url,
                print: args.print,
                force: args.force,
                timeouts,
            };
            let outcome =
                commands::db_pull(&opts, env::Environment::from_process(), output).await?;
            // Print mode keeps stderr clean.
            if !outcome.is_printed() {
                output.verbose(&outcome.describe());
            }
        }
    }

    Ok(())
}

/// Bad flags and config files are configuration errors, not operational ones.
fn config_error(e: anyhow::Error) -> anyhow::Error {
    PullError::uncoded(format!("{e:#}")).into()
}

fn render_error(err: &PullError) -> String {
    match err.code {
        Some(code) => format!("{} {}\n\n{}", "Error:".red().bold(), code, err.message),
        None => format!("{} {}", "Error:".red().bold(), err.message),
    }
}

//! pgup CLI entry point.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use colored::Colorize;

use pgup::config::{ConnectionDescriptor, RetryBudget};
use pgup::dump::DumpOptions;
use pgup::migrate::Direction;
use pgup::reconcile::{ensure_running, wait_until_ready};
use pgup::runtime::DockerCli;
use pgup::{dump, migrate, util};

#[derive(Parser)]
#[command(
    name = "pgup",
    version,
    about = "PostgreSQL lifecycle CLI - container provisioning, migrations, and schema dumps",
    long_about = "pgup is a developer CLI for managing a local PostgreSQL instance.\n\n\
        Every command first ensures the Postgres docker container is running and\n\
        accepting connections — creating, starting, or adopting a container as\n\
        needed — so no external scripts are required.\n\n\
        Configuration is read from DB_HOST, DB_PORT, DB_USER, DB_PASSWORD,\n\
        DB_NAME, DB_SSLMODE, CONTAINER_NAME, and POSTGRES_IMAGE."
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run database migrations (up / down / status)
    Migrate {
        /// Operation to perform
        #[arg(value_enum)]
        direction: MigrateDirection,

        /// Number of migrations to roll back (only used with `down`)
        #[arg(short, long, default_value_t = 1)]
        steps: u32,
    },

    /// Export the database schema to a SQL file using pg_dump
    Dump {
        /// Output file path for the SQL dump
        #[arg(short, long, default_value = "schema.sql")]
        output: PathBuf,

        /// Dump only the schema (no data)
        #[arg(long, default_value_t = true, action = ArgAction::Set)]
        schema_only: bool,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum MigrateDirection {
    /// Apply all pending migrations
    Up,
    /// Roll back migrations (see --steps)
    Down,
    /// Print the current migration version
    Status,
}

#[tokio::main]
async fn main() -> ExitCode {
    if let Err(err) = run().await {
        eprintln!("\n{} {err:#}", "error:".red().bold());
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    let runtime = DockerCli;

    let desc = ConnectionDescriptor::from_env();
    let desc = ensure_running(&runtime, desc)?;
    wait_until_ready(&runtime, &desc, &RetryBudget::default()).await?;

    match cli.command {
        Command::Migrate { direction, steps } => {
            let migrations_dir = util::project_root().join("migrations");
            let direction = match direction {
                MigrateDirection::Up => Direction::Up,
                MigrateDirection::Down => Direction::Down { steps },
                MigrateDirection::Status => Direction::Status,
            };
            migrate::apply(direction, &desc, &migrations_dir).await
        }
        Command::Dump {
            output,
            schema_only,
        } => dump::run(&runtime, &desc, &DumpOptions {
            output,
            schema_only,
        }),
    }
}

use anyhow::Result;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "txsync")]
#[command(about = "Transaction total synchronization CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one synchronization against the configured stores
    Sync {
        /// Fetch and aggregate only; print the updates that would be issued
        #[arg(long, default_value_t = false)]
        dry_run: bool,

        /// Calendar day to reconcile (YYYY-MM-DD); defaults to today in the reporting zone
        #[arg(long)]
        date: Option<NaiveDate>,
    },

    /// Configuration commands
    Config {
        #[command(subcommand)]
        cmd: ConfigCmd,
    },

    /// Database commands (Postgres backend / mirror)
    Db {
        #[command(subcommand)]
        cmd: DbCmd,
    },
}

#[derive(Subcommand)]
enum ConfigCmd {
    /// Print the resolved configuration as JSON, secrets redacted
    Show,
}

#[derive(Subcommand)]
enum DbCmd {
    Status,
    /// Apply SQL migrations
    Migrate,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Dev convenience; silent if the file does not exist.
    let _ = dotenvy::from_filename(".env.local");
    init_tracing();

    let cli = Cli::parse();

    match cli.cmd {
        Commands::Sync { dry_run, date } => commands::sync::run(dry_run, date).await?,

        Commands::Config { cmd } => match cmd {
            ConfigCmd::Show => commands::config_show()?,
        },

        Commands::Db { cmd } => {
            let pool = txsync_db::connect_from_env().await?;
            match cmd {
                DbCmd::Status => {
                    let s = txsync_db::status(&pool).await?;
                    println!("db_ok={} has_mirror_table={}", s.ok, s.has_mirror_table);
                }
                DbCmd::Migrate => {
                    txsync_db::migrate(&pool).await?;
                    println!("migrations_applied=true");
                }
            }
        }
    }

    Ok(())
}

/// Logs go to stderr; stdout carries command output only.
fn init_tracing() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()),
        )
        .init();
}

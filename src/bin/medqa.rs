use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use medqa_portal::auth::{ensure_superadmin, Bootstrap};
use medqa_portal::db::{establish_connection, run_migrations};
use medqa_portal::server::app::run_server;
use medqa_portal::settings::Settings;
use medqa_portal::telemetry::init_tracing;

#[derive(Parser)]
#[clap(author, version, about, long_about = None)]
struct Cli {
    /// TOML settings file, read on top of ./medqa.toml
    #[clap(long, short)]
    config: Option<PathBuf>,
    #[clap(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run migrations and serve the HTTP API
    Serve,
    /// Apply pending migrations and exit
    Migrate,
    /// Create the first super-admin account
    CreateSuperadmin {
        #[clap(long)]
        username: String,
        #[clap(long)]
        email: String,
        #[clap(long)]
        password: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init_tracing();
    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_deref()).context("Invalid settings")?;

    let pool = establish_connection(&settings.database.url, settings.database.max_connections)
        .await
        .context("Cannot connect to DB")?;
    tracing::info!("Running db migrations...");
    run_migrations(&pool).await?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => run_server(pool, &settings).await?,
        Command::Migrate => tracing::info!("Migrations applied"),
        Command::CreateSuperadmin {
            username,
            email,
            password,
        } => match ensure_superadmin(&pool, &username, &email, &password).await? {
            Bootstrap::Created(id) => tracing::info!(user_id = id, "Super-admin created"),
            Bootstrap::AlreadyExists(id) => {
                tracing::warn!(user_id = id, "An account with this email already exists")
            }
        },
    }
    Ok(())
}

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use medqa_portal::db::{establish_connection, run_migrations};
use medqa_portal::telemetry::init_tracing;
use medqa_portal::transfer::{export_data, import_data};

#[derive(Parser)]
#[clap(author, version, about, long_about = None)]
struct Cli {
    /// Database url, e.g. sqlite:medqa.db
    db_url: String,
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Import categories.csv and questions.csv from a directory
    Import { path: PathBuf },
    /// Export categories and questions as CSV into a directory
    Export { path: PathBuf },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init_tracing();
    let cli = Cli::parse();
    let pool = establish_connection(&cli.db_url, 1)
        .await
        .context("Cannot connect to DB")?;
    run_migrations(&pool).await?;

    let summary = match cli.command {
        Commands::Export { path } => export_data(&pool, &path).await.context("Cannot export")?,
        Commands::Import { path } => import_data(&pool, &path).await.context("Cannot import")?,
    };
    tracing::info!(
        categories = summary.categories,
        questions = summary.questions,
        "Done"
    );
    Ok(())
}

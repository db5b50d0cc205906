use clap::{Parser, Subcommand};
use configuration::{load_settings, ServerOverrides};
use database::connection::{connect, run_migrations};

/// The main entry point for the health information system.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file, if there is one.
    dotenvy::dotenv().ok();
    configuration::telemetry::init_tracing()?;

    // Parse command-line arguments
    let cli = Cli::parse();
    let mut settings = load_settings()?;

    // Execute the appropriate command
    match cli.command {
        Commands::Serve(overrides) => {
            settings.server.apply_overrides(&overrides);
            web_server::run_server(settings).await?;
        }
        Commands::Migrate => {
            let db_pool = connect(&settings.database.url, settings.database.max_connections).await?;
            run_migrations(&db_pool).await?;
            db_pool.close().await;
            tracing::info!(url = %settings.database.url, "Schema is up to date.");
        }
    }

    Ok(())
}

// ==============================================================================
// CLI Structure
// ==============================================================================

/// A backend for managing health programs, clients and their enrollments.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP API.
    Serve(ServerOverrides),
    /// Create the database tables and exit.
    Migrate,
}

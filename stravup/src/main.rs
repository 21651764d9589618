use anyhow::Result;
use clap::Parser;
use strava_api::Client;

use stravup::cli::{Cli, Command};
use stravup::logging::init_logging;
use stravup::App;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let (log_path, _guard) = init_logging()?;
    tracing::info!(log = %log_path.display(), "stravup starting");

    let settings = stravup_auth::load_settings()?;
    let manager = stravup_auth::terminal_manager(&settings)?;
    let client = Client::new(settings.api_config())?;
    let app = App::new(manager, client);

    match cli.command {
        Command::Upload(args) => {
            app.upload(&args).await?;
        }
        Command::Login => {
            app.login().await?;
        }
        Command::Logout => app.logout().await?,
    }

    Ok(())
}

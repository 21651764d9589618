mod consent;
mod manager;
mod settings;
mod token_storage;

pub use consent::{
    generate_state_token, AppHandoff, AppLauncher, AuthorizationRequest, ConsentOutcome,
    ConsentResult, ConsentStrategy, ConsentSurface, TerminalConsent, WebConsent,
};
pub use manager::{LifecycleState, OAuthConfig, TokenLifecycleManager};
pub use settings::Settings;
pub use token_storage::{FileTokenStore, TokenStore};

use std::sync::Arc;
use strava_api::{Client, Credential};

use crate::error::AuthError;

/// Load and validate settings, printing setup help when that fails
pub fn load_settings() -> Result<Settings, AuthError> {
    let settings = Settings::new().map_err(|e| {
        eprintln!("Failed to load configuration: {}", e);
        eprintln!("\nPlease create a config.toml file with the following content:");
        eprintln!("\nclient_id = \"12345\"");
        eprintln!("client_secret = \"your-client-secret\"");
        eprintln!("# redirect_uri = \"http://localhost/exchange_token\"");
        eprintln!("\nor set STRAVUP__CLIENT_ID and STRAVUP__CLIENT_SECRET.");
        AuthError::Configuration(e.to_string())
    })?;

    settings.validate().map_err(|e| {
        eprintln!("Configuration validation failed: {}", e);
        AuthError::Configuration(e)
    })?;

    Ok(settings)
}

/// A manager wired for the terminal: file-backed storage and browser consent
pub fn terminal_manager(settings: &Settings) -> Result<TokenLifecycleManager, AuthError> {
    let client = Client::new(settings.api_config())?;
    let store = FileTokenStore::new()?;

    Ok(TokenLifecycleManager::new(client, settings.oauth_config())
        .with_web_consent(Arc::new(TerminalConsent))
        .with_store(Arc::new(store)))
}

/// Get a usable credential before doing any work, authorizing interactively
/// when the stored one is missing or cannot be refreshed.
pub async fn authenticate(manager: &TokenLifecycleManager) -> Result<Credential, AuthError> {
    if manager.current_credential().is_some_and(|c| !c.is_valid()) {
        println!("Token expired, attempting to refresh...");
    }

    match manager.ensure_valid().await {
        Ok(Some(credential)) => return Ok(credential),
        Ok(None) => {}
        Err(e) => eprintln!("Failed to refresh token: {}", e),
    }

    println!("\n=== Strava Authorization Required ===\n");
    println!("This will open your browser to authorize the application.");
    println!("Strava will then redirect to an address this tool cannot serve;");
    println!("copy that address from the browser and paste it here.\n");

    let credential = manager.authorize().await?;

    match &credential.subject {
        Some(athlete) => println!("✓ Authorized as {}\n", athlete.display_name()),
        None => println!("✓ Authorization successful!\n"),
    }

    Ok(credential)
}

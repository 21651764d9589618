// Session credential lifecycle for the Strava API
mod client;
mod error;

// Always expose testing module (downstream crates test against it)
pub mod testing;

pub use client::{
    authenticate, generate_state_token, load_settings, terminal_manager, AppHandoff, AppLauncher,
    AuthorizationRequest, ConsentOutcome, ConsentResult, ConsentStrategy, ConsentSurface,
    FileTokenStore, LifecycleState, OAuthConfig, Settings, TerminalConsent, TokenLifecycleManager,
    TokenStore, WebConsent,
};
pub use error::AuthError;

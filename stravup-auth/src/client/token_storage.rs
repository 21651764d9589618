use crate::error::AuthError;
use std::fs;
use std::path::{Path, PathBuf};
use strava_api::Credential;

/// Persistence for the session credential
pub trait TokenStore: Send + Sync {
    fn load(&self) -> Result<Option<Credential>, AuthError>;
    fn save(&self, credential: &Credential) -> Result<(), AuthError>;
    fn delete(&self) -> Result<(), AuthError>;
}

/// Credential as JSON in the user cache directory, readable by the owner only
pub struct FileTokenStore {
    token_path: PathBuf,
}

impl FileTokenStore {
    pub fn new() -> Result<Self, AuthError> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| AuthError::TokenStorage("No cache directory on this system".into()))?
            .join("stravup");
        Self::with_path(cache_dir.join("token.json"))
    }

    pub fn with_path(token_path: impl Into<PathBuf>) -> Result<Self, AuthError> {
        let token_path = token_path.into();

        if let Some(dir) = token_path.parent() {
            if !dir.exists() {
                fs::create_dir_all(dir).map_err(|e| {
                    AuthError::TokenStorage(format!("Failed to create cache directory: {}", e))
                })?;
            }
        }

        Ok(Self { token_path })
    }

    pub fn path(&self) -> &Path {
        &self.token_path
    }
}

impl TokenStore for FileTokenStore {
    fn save(&self, credential: &Credential) -> Result<(), AuthError> {
        let json = serde_json::to_string_pretty(credential)?;

        fs::write(&self.token_path, json)
            .map_err(|e| AuthError::TokenStorage(format!("Failed to save token: {}", e)))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&self.token_path, fs::Permissions::from_mode(0o600)).map_err(
                |e| AuthError::TokenStorage(format!("Failed to set file permissions: {}", e)),
            )?;
        }

        tracing::debug!(path = %self.token_path.display(), "Credential saved");
        Ok(())
    }

    fn load(&self) -> Result<Option<Credential>, AuthError> {
        if !self.token_path.exists() {
            return Ok(None);
        }

        let json = fs::read_to_string(&self.token_path)
            .map_err(|e| AuthError::TokenStorage(format!("Failed to read token: {}", e)))?;

        let credential: Credential = serde_json::from_str(&json)?;
        Ok(Some(credential))
    }

    fn delete(&self) -> Result<(), AuthError> {
        if self.token_path.exists() {
            fs::remove_file(&self.token_path)
                .map_err(|e| AuthError::TokenStorage(format!("Failed to delete token: {}", e)))?;
        }
        Ok(())
    }
}

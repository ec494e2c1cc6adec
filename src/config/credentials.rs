//! Platform credentials
//!
//! The credential file is owned by an external configuration tool; this
//! module only reads it. Credentials are handed to spawned services through
//! their environment and to the daily processing trigger.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Errors reading the credential file
#[derive(Debug, thiserror::Error)]
pub enum CredentialsError {
    /// No credential file at the expected location
    #[error("credentials not found at {0} (run the platform configuration tool first)")]
    Missing(PathBuf),

    #[error("failed to read credentials at {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed credentials at {path}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// API credentials for the content platform
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub client_id: String,
    pub client_secret: String,
    pub user_agent: String,
    pub username: String,
    pub password: String,
}

impl Credentials {
    /// Load credentials from a JSON file.
    ///
    /// A missing file is a distinct error so callers can print setup
    /// guidance instead of a raw IO failure.
    pub fn load(path: &Path) -> Result<Self, CredentialsError> {
        let contents = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(CredentialsError::Missing(path.to_path_buf()));
            }
            Err(e) => {
                return Err(CredentialsError::Io {
                    path: path.to_path_buf(),
                    source: e,
                });
            }
        };

        serde_json::from_str(&contents).map_err(|e| CredentialsError::Malformed {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Environment variables injected into every spawned service
    pub fn as_env(&self) -> Vec<(String, String)> {
        vec![
            ("PLATFORM_CLIENT_ID".to_string(), self.client_id.clone()),
            (
                "PLATFORM_CLIENT_SECRET".to_string(),
                self.client_secret.clone(),
            ),
            ("PLATFORM_USER_AGENT".to_string(), self.user_agent.clone()),
            ("PLATFORM_USERNAME".to_string(), self.username.clone()),
            ("PLATFORM_PASSWORD".to_string(), self.password.clone()),
        ]
    }
}

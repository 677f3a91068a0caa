#![forbid(unsafe_code)]

//! Service-account authentication for the Sheets API.

use std::fs;
use std::io;
use std::path::Path;

use tracing::debug;
use yup_oauth2::authenticator::DefaultAuthenticator;
use yup_oauth2::{ServiceAccountAuthenticator, ServiceAccountKey};

use crate::error::{Service, SyncError, SyncResult};

pub const SHEETS_SCOPE: &str = "https://www.googleapis.com/auth/spreadsheets";

/// Reads and parses the service-account key file.
pub fn read_service_account(path: &Path) -> SyncResult<ServiceAccountKey> {
    let raw = fs::read_to_string(path).map_err(|source| {
        if source.kind() == io::ErrorKind::NotFound {
            SyncError::CredentialsMissing {
                path: path.to_path_buf(),
                source,
            }
        } else {
            SyncError::Unknown(
                anyhow::Error::new(source).context(format!("reading {}", path.display())),
            )
        }
    })?;
    serde_json::from_str(&raw).map_err(|source| SyncError::CredentialsParse {
        path: path.to_path_buf(),
        source,
    })
}

/// Authenticated session with Google's token endpoint.
///
/// The rest of the run is blocking, so the session owns a current-thread
/// runtime that only drives the authenticator.
pub struct SheetsAuth {
    runtime: tokio::runtime::Runtime,
    authenticator: DefaultAuthenticator,
}

impl SheetsAuth {
    /// Loads the signing key into an authenticator. No request is sent yet,
    /// so a key that cannot sign fails here as a credential error.
    pub fn connect(key: ServiceAccountKey) -> SyncResult<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|err| {
                SyncError::Unknown(anyhow::Error::new(err).context("starting runtime"))
            })?;
        let client_email = key.client_email.clone();
        let authenticator = runtime
            .block_on(ServiceAccountAuthenticator::builder(key).build())
            .map_err(|source| SyncError::CredentialsInvalid {
                client_email,
                source,
            })?;
        Ok(SheetsAuth {
            runtime,
            authenticator,
        })
    }

    /// Exchanges the signed assertion for a bearer token.
    pub fn access_token(&self) -> SyncResult<String> {
        let token = self
            .runtime
            .block_on(self.authenticator.token(&[SHEETS_SCOPE]))
            .map_err(|err| SyncError::api(Service::OAuth, err.to_string()))?;
        debug!(expires = ?token.expiration_time(), "obtained access token");
        token
            .token()
            .map(str::to_string)
            .ok_or_else(|| SyncError::api(Service::OAuth, "token response carried no access token"))
    }
}

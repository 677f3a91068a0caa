#![forbid(unsafe_code)]

//! Error kinds surfaced by a sync run. Every variant is terminal: the binary
//! logs it once and exits with [`SyncError::exit_code`].

use std::fmt;
use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Remote service that produced an [`SyncError::Api`] failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Service {
    Search,
    Statistics,
    OAuth,
    Sheets,
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Service::Search => "video search",
            Service::Statistics => "video statistics",
            Service::OAuth => "oauth token",
            Service::Sheets => "google sheets",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("credential file {} not found", .path.display())]
    CredentialsMissing {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("could not parse credential file {}", .path.display())]
    CredentialsParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("service-account key for {client_email} was rejected")]
    CredentialsInvalid {
        client_email: String,
        #[source]
        source: io::Error,
    },
    #[error("{service} request failed: {detail}")]
    Api { service: Service, detail: String },
    #[error(transparent)]
    Unknown(#[from] anyhow::Error),
}

impl SyncError {
    pub fn api(service: Service, detail: impl Into<String>) -> Self {
        SyncError::Api {
            service,
            detail: detail.into(),
        }
    }

    /// Converts a `ureq` failure into an API error, keeping the status code and
    /// as much of the response body as the server sent back.
    pub fn from_http(service: Service, err: ureq::Error) -> Self {
        match err {
            ureq::Error::Status(code, response) => {
                let body = response.into_string().unwrap_or_default();
                let body = body.trim();
                if body.is_empty() {
                    SyncError::api(service, format!("HTTP {code}"))
                } else {
                    SyncError::api(service, format!("HTTP {code}: {body}"))
                }
            }
            ureq::Error::Transport(transport) => SyncError::api(service, transport.to_string()),
        }
    }

    /// Short label used in the final log line.
    pub fn kind(&self) -> &'static str {
        match self {
            SyncError::CredentialsMissing { .. } => "credential-file-missing",
            SyncError::CredentialsParse { .. } | SyncError::CredentialsInvalid { .. } => {
                "credential-parse-error"
            }
            SyncError::Api { .. } => "remote-api-error",
            SyncError::Unknown(_) => "unknown-error",
        }
    }

    pub fn exit_code(&self) -> u8 {
        match self {
            SyncError::CredentialsMissing { .. }
            | SyncError::CredentialsParse { .. }
            | SyncError::CredentialsInvalid { .. } => 2,
            SyncError::Api { .. } => 3,
            SyncError::Unknown(_) => 1,
        }
    }
}

pub type SyncResult<T> = std::result::Result<T, SyncError>;

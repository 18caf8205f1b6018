//! Service-account credential material and the connector that turns it into an
//! authenticated spreadsheet client.
//!
//! Material is read into memory on every connect and handed straight to the
//! auth library, so concurrent runs never share a file on disk and a rotated
//! secret is picked up without a restart.

use crate::config::{Config, CredentialSource, GoogleApi};
use crate::errors::SplitterError;
use crate::sheets::{GoogleSheets, SpreadsheetService};
use google_cloud_auth::credentials::service_account::{AccessSpecifier, Builder};
use google_cloud_auth::credentials::Credentials;
use serde_json::Value;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(thiserror::Error, Debug)]
pub enum CredentialsError {
    #[error("environment variable {0} is not set")]
    MissingEnv(String),

    #[error("credentials file {path} could not be read: {source}")]
    File {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("credentials are not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("credentials are not a service account key: {0}")]
    NotServiceAccount(String),

    #[error("credentials rejected: {0}")]
    Build(String),
}

pub struct CredentialLoader {
    source: CredentialSource,
    scopes: Vec<String>,
}

impl CredentialLoader {
    pub fn new(source: CredentialSource, scopes: Vec<String>) -> Self {
        CredentialLoader { source, scopes }
    }

    /// Reads and parses the raw credential JSON.
    pub fn load_material(&self) -> Result<Value, CredentialsError> {
        let raw = match &self.source {
            CredentialSource::Env { var } => match std::env::var(var) {
                Ok(value) if !value.trim().is_empty() => value,
                _ => return Err(CredentialsError::MissingEnv(var.clone())),
            },
            CredentialSource::File { path } => {
                std::fs::read_to_string(path).map_err(|source| CredentialsError::File {
                    path: path.clone(),
                    source,
                })?
            }
        };

        let material: Value = serde_json::from_str(&raw)?;
        match material.get("type").and_then(Value::as_str) {
            Some("service_account") => Ok(material),
            Some(other) => Err(CredentialsError::NotServiceAccount(format!(
                "type is {other}"
            ))),
            None => Err(CredentialsError::NotServiceAccount(
                "missing type field".into(),
            )),
        }
    }

    pub fn credentials(&self) -> Result<Credentials, CredentialsError> {
        let material = self.load_material()?;
        Builder::new(material)
            .with_access_specifier(AccessSpecifier::from_scopes(self.scopes.clone()))
            .build()
            .map_err(|e| CredentialsError::Build(e.to_string()))
    }

    /// Cheap presence check used by the readiness probe. Does not parse.
    pub fn check_available(&self) -> Result<(), String> {
        match &self.source {
            CredentialSource::Env { var } => match std::env::var(var) {
                Ok(value) if !value.trim().is_empty() => Ok(()),
                _ => Err(format!("{var} is not set")),
            },
            CredentialSource::File { path } if path.is_file() => Ok(()),
            CredentialSource::File { path } => {
                Err(format!("credentials file {} not found", path.display()))
            }
        }
    }
}

/// Hands out an authenticated spreadsheet client for one run.
pub trait Connector: Send + Sync {
    fn connect(&self) -> Result<Arc<dyn SpreadsheetService>, SplitterError>;

    fn readiness(&self) -> Result<(), String>;
}

pub struct GoogleConnector {
    loader: CredentialLoader,
    google: GoogleApi,
    client: reqwest::Client,
}

impl GoogleConnector {
    pub fn new(config: &Config) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.google.timeout_secs))
            .build()?;

        Ok(GoogleConnector {
            loader: CredentialLoader::new(
                config.credentials.clone(),
                config.google.scopes.clone(),
            ),
            google: config.google.clone(),
            client,
        })
    }
}

impl Connector for GoogleConnector {
    fn connect(&self) -> Result<Arc<dyn SpreadsheetService>, SplitterError> {
        let credentials = self.loader.credentials()?;

        Ok(Arc::new(GoogleSheets::new(
            self.client.clone(),
            self.google.sheets_url.clone(),
            self.google.drive_url.clone(),
            self.google.value_input_option.clone(),
            Arc::new(credentials),
        )))
    }

    fn readiness(&self) -> Result<(), String> {
        self.loader.check_available()
    }
}

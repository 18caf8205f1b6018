//! Minimal Google Sheets v4 / Drive v3 client covering the calls a run needs.

use crate::config::SpreadsheetRef;
use async_trait::async_trait;
use google_cloud_auth::credentials::{CacheableResource, Credentials};
use http::{Extensions, HeaderMap};
use reqwest::{RequestBuilder, StatusCode};
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;
use url::Url;

const SPREADSHEET_MIME_TYPE: &str = "application/vnd.google-apps.spreadsheet";

#[derive(thiserror::Error, Debug)]
pub enum SheetsError {
    #[error("Spreadsheet not found: {0}")]
    SpreadsheetNotFound(String),

    #[error("Worksheet not found: {worksheet} (spreadsheet {spreadsheet})")]
    WorksheetNotFound {
        spreadsheet: String,
        worksheet: String,
    },

    #[error("Google Sheets API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Invalid API base URL: {0}")]
    InvalidUrl(String),
}

/// Produces the headers that authorize a single API call.
#[async_trait]
pub trait AuthHeaders: Send + Sync {
    async fn auth_headers(&self) -> Result<HeaderMap, SheetsError>;
}

#[async_trait]
impl AuthHeaders for Credentials {
    async fn auth_headers(&self) -> Result<HeaderMap, SheetsError> {
        let headers = Credentials::headers(self, Extensions::new())
            .await
            .map_err(|e| SheetsError::Auth(e.to_string()))?;

        match headers {
            CacheableResource::New { data, .. } => Ok(data),
            CacheableResource::NotModified => Err(SheetsError::Auth(
                "credentials returned no headers".into(),
            )),
        }
    }
}

/// Fixed headers, e.g. a pre-issued bearer token.
#[async_trait]
impl AuthHeaders for HeaderMap {
    async fn auth_headers(&self) -> Result<HeaderMap, SheetsError> {
        Ok(self.clone())
    }
}

/// The spreadsheet operations a run is built from. Worksheets are addressed
/// by title within a spreadsheet id.
#[async_trait]
pub trait SpreadsheetService: Send + Sync {
    /// Resolves a reference to a spreadsheet id.
    async fn resolve(&self, spreadsheet: &SpreadsheetRef) -> Result<String, SheetsError>;

    async fn worksheet_titles(&self, spreadsheet_id: &str) -> Result<Vec<String>, SheetsError>;

    /// All populated rows of the worksheet, first row included. Trailing
    /// empty cells of a row may be omitted.
    async fn read_values(
        &self,
        spreadsheet_id: &str,
        worksheet: &str,
    ) -> Result<Vec<Vec<String>>, SheetsError>;

    async fn clear(&self, spreadsheet_id: &str, worksheet: &str) -> Result<(), SheetsError>;

    /// Writes `rows` starting at A1.
    async fn write_values(
        &self,
        spreadsheet_id: &str,
        worksheet: &str,
        rows: &[Vec<String>],
    ) -> Result<(), SheetsError>;

    async fn add_worksheet(&self, spreadsheet_id: &str, worksheet: &str)
    -> Result<(), SheetsError>;
}

#[derive(Deserialize)]
struct FileList {
    #[serde(default)]
    files: Vec<DriveFile>,
}

#[derive(Deserialize)]
struct DriveFile {
    id: String,
}

#[derive(Deserialize)]
struct SpreadsheetMetadata {
    #[serde(default)]
    sheets: Vec<SheetEntry>,
}

#[derive(Deserialize)]
struct SheetEntry {
    properties: SheetProperties,
}

#[derive(Deserialize)]
struct SheetProperties {
    title: String,
}

#[derive(Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

#[derive(Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Deserialize)]
struct ApiErrorDetail {
    #[serde(default)]
    message: String,
}

pub struct GoogleSheets {
    client: reqwest::Client,
    sheets_url: Url,
    drive_url: Url,
    value_input_option: String,
    auth: Arc<dyn AuthHeaders>,
}

impl GoogleSheets {
    pub fn new(
        client: reqwest::Client,
        sheets_url: Url,
        drive_url: Url,
        value_input_option: String,
        auth: Arc<dyn AuthHeaders>,
    ) -> Self {
        GoogleSheets {
            client,
            sheets_url,
            drive_url,
            value_input_option,
            auth,
        }
    }

    async fn send(&self, request: RequestBuilder) -> Result<reqwest::Response, SheetsError> {
        let headers = self.auth.auth_headers().await?;
        let response = request.headers(headers).send().await?;

        if response.status().is_success() {
            return Ok(response);
        }
        Err(api_error(response).await)
    }
}

#[async_trait]
impl SpreadsheetService for GoogleSheets {
    async fn resolve(&self, spreadsheet: &SpreadsheetRef) -> Result<String, SheetsError> {
        let title = match spreadsheet {
            SpreadsheetRef::Id(id) => return Ok(id.clone()),
            SpreadsheetRef::Title(title) => title,
        };

        let url = endpoint(&self.drive_url, &["files"])?;
        let query = format!(
            "name = '{}' and mimeType = '{SPREADSHEET_MIME_TYPE}' and trashed = false",
            escape_drive_query(title)
        );
        let request = self.client.get(url).query(&[
            ("q", query.as_str()),
            ("fields", "files(id)"),
            ("supportsAllDrives", "true"),
            ("includeItemsFromAllDrives", "true"),
        ]);

        let listing: FileList = self.send(request).await?.json().await?;
        let file = listing
            .files
            .into_iter()
            .next()
            .ok_or_else(|| SheetsError::SpreadsheetNotFound(title.clone()))?;

        tracing::debug!(%title, id = %file.id, "resolved spreadsheet title");
        Ok(file.id)
    }

    async fn worksheet_titles(&self, spreadsheet_id: &str) -> Result<Vec<String>, SheetsError> {
        let url = endpoint(&self.sheets_url, &["spreadsheets", spreadsheet_id])?;
        let request = self
            .client
            .get(url)
            .query(&[("fields", "sheets.properties.title")]);

        let metadata: SpreadsheetMetadata = match self.send(request).await {
            Ok(response) => response.json().await?,
            Err(SheetsError::Api { status, .. }) if status == StatusCode::NOT_FOUND.as_u16() => {
                return Err(SheetsError::SpreadsheetNotFound(spreadsheet_id.to_string()));
            }
            Err(e) => return Err(e),
        };

        Ok(metadata
            .sheets
            .into_iter()
            .map(|sheet| sheet.properties.title)
            .collect())
    }

    async fn read_values(
        &self,
        spreadsheet_id: &str,
        worksheet: &str,
    ) -> Result<Vec<Vec<String>>, SheetsError> {
        let range = a1_range(worksheet);
        let url = endpoint(
            &self.sheets_url,
            &["spreadsheets", spreadsheet_id, "values", &range],
        )?;
        let request = self.client.get(url).query(&[("majorDimension", "ROWS")]);

        let value_range: ValueRange = self.send(request).await?.json().await?;

        Ok(value_range
            .values
            .into_iter()
            .map(|row| row.into_iter().map(cell_text).collect())
            .collect())
    }

    async fn clear(&self, spreadsheet_id: &str, worksheet: &str) -> Result<(), SheetsError> {
        let action = format!("{}:clear", a1_range(worksheet));
        let url = endpoint(
            &self.sheets_url,
            &["spreadsheets", spreadsheet_id, "values", &action],
        )?;

        self.send(self.client.post(url).json(&json!({}))).await?;
        Ok(())
    }

    async fn write_values(
        &self,
        spreadsheet_id: &str,
        worksheet: &str,
        rows: &[Vec<String>],
    ) -> Result<(), SheetsError> {
        if rows.is_empty() {
            return Ok(());
        }

        let range = a1_range(worksheet);
        let url = endpoint(
            &self.sheets_url,
            &["spreadsheets", spreadsheet_id, "values", &range],
        )?;
        let body = json!({
            "range": range,
            "majorDimension": "ROWS",
            "values": rows,
        });
        let request = self
            .client
            .put(url)
            .query(&[("valueInputOption", self.value_input_option.as_str())])
            .json(&body);

        self.send(request).await?;
        Ok(())
    }

    async fn add_worksheet(
        &self,
        spreadsheet_id: &str,
        worksheet: &str,
    ) -> Result<(), SheetsError> {
        let action = format!("{spreadsheet_id}:batchUpdate");
        let url = endpoint(&self.sheets_url, &["spreadsheets", &action])?;
        let body = json!({
            "requests": [
                {"addSheet": {"properties": {"title": worksheet}}}
            ]
        });

        self.send(self.client.post(url).json(&body)).await?;
        tracing::info!(spreadsheet = %spreadsheet_id, %worksheet, "created worksheet");
        Ok(())
    }
}

/// Appends percent-encoded path segments to `base`.
fn endpoint(base: &Url, segments: &[&str]) -> Result<Url, SheetsError> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| SheetsError::InvalidUrl(base.to_string()))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

/// A1 notation for a whole worksheet. Titles are always quoted so names that
/// look like cell references or contain spaces are unambiguous.
pub fn a1_range(worksheet: &str) -> String {
    format!("'{}'", worksheet.replace('\'', "''"))
}

fn escape_drive_query(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

fn cell_text(value: Value) -> String {
    match value {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

async fn api_error(response: reqwest::Response) -> SheetsError {
    let status = response.status().as_u16();
    let text = response.text().await.unwrap_or_default();
    let message = match serde_json::from_str::<ApiErrorBody>(&text) {
        Ok(body) => body.error.message,
        Err(_) => text,
    };

    SheetsError::Api { status, message }
}

use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;
use url::Url;

pub const DEFAULT_CREDENTIALS_VAR: &str = "GOOGLE_CREDENTIALS";

#[derive(Error, Debug, PartialEq)]
pub enum ValidationError {
    #[error("Port cannot be 0")]
    InvalidPort,

    #[error("Empty worksheet name in {0}")]
    EmptyWorksheet(&'static str),

    #[error("Empty spreadsheet reference in {0}")]
    EmptySpreadsheet(&'static str),

    #[error("Empty project name in {0}")]
    EmptyProject(&'static str),

    #[error("Project name has surrounding whitespace in {0}: {1:?}")]
    PaddedProject(&'static str, String),

    #[error("Empty project column name")]
    EmptyProjectColumn,

    #[error("Worksheet is pinned more than once: {0}")]
    DuplicatePinnedWorksheet(String),

    #[error("Empty credentials source")]
    EmptyCredentialSource,

    #[error("Request timeout cannot be 0")]
    ZeroTimeout,
}

/// Network listener configuration
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Listener {
    pub host: String,
    pub port: u16,
}

impl Listener {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.port == 0 {
            return Err(ValidationError::InvalidPort);
        }
        Ok(())
    }
}

fn default_listener() -> Listener {
    Listener {
        host: "0.0.0.0".into(),
        port: 5000,
    }
}

fn default_admin_listener() -> Listener {
    Listener {
        host: "127.0.0.1".into(),
        port: 5001,
    }
}

/// Where the service-account JSON is read from on every run.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
#[serde(tag = "type")]
pub enum CredentialSource {
    Env {
        #[serde(default = "default_credentials_var")]
        var: String,
    },
    File {
        path: PathBuf,
    },
}

fn default_credentials_var() -> String {
    DEFAULT_CREDENTIALS_VAR.into()
}

impl Default for CredentialSource {
    fn default() -> Self {
        CredentialSource::Env {
            var: default_credentials_var(),
        }
    }
}

impl CredentialSource {
    fn validate(&self) -> Result<(), ValidationError> {
        let empty = match self {
            CredentialSource::Env { var } => var.trim().is_empty(),
            CredentialSource::File { path } => path.as_os_str().is_empty(),
        };
        if empty {
            return Err(ValidationError::EmptyCredentialSource);
        }
        Ok(())
    }
}

/// A spreadsheet is addressed either by its id or by its exact title.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum SpreadsheetRef {
    Id(String),
    Title(String),
}

impl SpreadsheetRef {
    fn is_empty(&self) -> bool {
        match self {
            SpreadsheetRef::Id(id) => id.trim().is_empty(),
            SpreadsheetRef::Title(title) => title.is_empty(),
        }
    }
}

impl fmt::Display for SpreadsheetRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpreadsheetRef::Id(id) => write!(f, "id {id}"),
            SpreadsheetRef::Title(title) => write!(f, "\"{title}\""),
        }
    }
}

/// Google API endpoints and client settings
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct GoogleApi {
    #[serde(default = "default_sheets_url")]
    pub sheets_url: Url,
    #[serde(default = "default_drive_url")]
    pub drive_url: Url,
    #[serde(default = "default_scopes")]
    pub scopes: Vec<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// `USER_ENTERED` lets the sheet parse numbers, dates and formulas the way
    /// typing them would; `RAW` stores every cell as text.
    #[serde(default = "default_value_input_option")]
    pub value_input_option: String,
}

fn default_sheets_url() -> Url {
    Url::parse("https://sheets.googleapis.com/v4/").expect("static url")
}

fn default_drive_url() -> Url {
    Url::parse("https://www.googleapis.com/drive/v3/").expect("static url")
}

fn default_scopes() -> Vec<String> {
    vec![
        "https://www.googleapis.com/auth/spreadsheets".into(),
        "https://www.googleapis.com/auth/drive.readonly".into(),
    ]
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_value_input_option() -> String {
    "USER_ENTERED".into()
}

impl Default for GoogleApi {
    fn default() -> Self {
        GoogleApi {
            sheets_url: default_sheets_url(),
            drive_url: default_drive_url(),
            scopes: default_scopes(),
            timeout_secs: default_timeout_secs(),
            value_input_option: default_value_input_option(),
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Source {
    #[serde(with = "serde_yaml::with::singleton_map")]
    pub spreadsheet: SpreadsheetRef,
    pub worksheet: String,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Destination {
    #[serde(with = "serde_yaml::with::singleton_map")]
    pub spreadsheet: SpreadsheetRef,
    /// Worksheet receiving the partition when a single project is requested.
    #[serde(default)]
    pub single_worksheet: Option<String>,
    /// Explicit project to worksheet mapping. Unmapped projects are written to
    /// a worksheet named after the project.
    #[serde(default)]
    pub worksheets: HashMap<String, String>,
}

impl Destination {
    pub fn worksheet_for<'a>(&'a self, project: &'a str) -> &'a str {
        self.worksheets
            .get(project)
            .map(String::as_str)
            .unwrap_or(project)
    }
}

/// What a run processes when the caller names no project.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
#[serde(tag = "type")]
pub enum Fallback {
    #[default]
    AllProjects,
    Projects { values: Vec<String> },
}

/// A partition rewritten on every run regardless of the request.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Pinned {
    pub project: String,
    pub worksheet: String,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default = "default_listener")]
    pub listener: Listener,
    #[serde(default = "default_admin_listener")]
    pub admin_listener: Listener,
    #[serde(default)]
    pub credentials: CredentialSource,
    #[serde(default)]
    pub google: GoogleApi,
    pub source: Source,
    #[serde(default = "default_project_column")]
    pub project_column: String,
    pub destination: Destination,
    #[serde(default)]
    pub fallback: Fallback,
    /// Projects whose row counts are reported without being written.
    #[serde(default)]
    pub tracked_projects: Vec<String>,
    #[serde(default)]
    pub pinned: Vec<Pinned>,
}

fn default_project_column() -> String {
    "Project".into()
}

impl Config {
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.listener.validate()?;
        self.admin_listener.validate()?;
        self.credentials.validate()?;

        if self.google.timeout_secs == 0 {
            return Err(ValidationError::ZeroTimeout);
        }

        if self.source.spreadsheet.is_empty() {
            return Err(ValidationError::EmptySpreadsheet("source"));
        }
        if self.source.worksheet.trim().is_empty() {
            return Err(ValidationError::EmptyWorksheet("source"));
        }
        if self.project_column.trim().is_empty() {
            return Err(ValidationError::EmptyProjectColumn);
        }

        if self.destination.spreadsheet.is_empty() {
            return Err(ValidationError::EmptySpreadsheet("destination"));
        }
        if let Some(single) = &self.destination.single_worksheet
            && single.trim().is_empty()
        {
            return Err(ValidationError::EmptyWorksheet("destination.single_worksheet"));
        }
        for (project, worksheet) in &self.destination.worksheets {
            if project.trim().is_empty() {
                return Err(ValidationError::EmptyProject("destination.worksheets"));
            }
            if project.trim() != project {
                return Err(ValidationError::PaddedProject(
                    "destination.worksheets",
                    project.clone(),
                ));
            }
            if worksheet.trim().is_empty() {
                return Err(ValidationError::EmptyWorksheet("destination.worksheets"));
            }
        }

        if let Fallback::Projects { values } = &self.fallback
            && (values.is_empty() || values.iter().any(|v| v.trim().is_empty()))
        {
            return Err(ValidationError::EmptyProject("fallback"));
        }

        if self.tracked_projects.iter().any(|p| p.trim().is_empty()) {
            return Err(ValidationError::EmptyProject("tracked_projects"));
        }

        let mut pinned_worksheets = HashSet::new();
        for pinned in &self.pinned {
            if pinned.project.trim().is_empty() {
                return Err(ValidationError::EmptyProject("pinned"));
            }
            if pinned.worksheet.trim().is_empty() {
                return Err(ValidationError::EmptyWorksheet("pinned"));
            }
            // Worksheet titles are unique regardless of case.
            if !pinned_worksheets.insert(pinned.worksheet.to_lowercase()) {
                return Err(ValidationError::DuplicatePinnedWorksheet(
                    pinned.worksheet.clone(),
                ));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL_YAML: &str = r#"
listener:
    host: "0.0.0.0"
    port: 8080
admin_listener:
    host: "127.0.0.1"
    port: 8081
credentials:
    type: file
    path: /etc/sheetsync/service-account.json
google:
    timeout_secs: 10
source:
    spreadsheet:
        title: Test_BTS_10
    worksheet: Sheet1
destination:
    spreadsheet:
        id: 1AbCdEf
    single_worksheet: Sheet3
    worksheets:
        AIPPL_GAIMUKH: Sheet4
fallback:
    type: projects
    values: [AIPPL_JAIGAD]
tracked_projects:
    - ABL_AROOR-THURAVOOR_KERALA
    - AIPPL_JAIGAD
pinned:
    - project: AIPPL_GAIMUKH
      worksheet: Sheet4
"#;

    const MINIMAL_YAML: &str = r#"
source:
    spreadsheet: {id: src}
    worksheet: Sheet1
destination:
    spreadsheet: {title: "SCRIPT FOR DATA "}
"#;

    #[test]
    fn test_parse_full_config() {
        let config: Config = serde_yaml::from_str(FULL_YAML).unwrap();
        assert!(config.validate().is_ok());

        assert_eq!(config.listener.port, 8080);
        assert_eq!(
            config.credentials,
            CredentialSource::File {
                path: "/etc/sheetsync/service-account.json".into()
            }
        );
        assert_eq!(config.google.timeout_secs, 10);
        assert_eq!(config.google.sheets_url.as_str(), "https://sheets.googleapis.com/v4/");
        assert_eq!(
            config.source.spreadsheet,
            SpreadsheetRef::Title("Test_BTS_10".into())
        );
        assert_eq!(config.destination.single_worksheet.as_deref(), Some("Sheet3"));
        assert_eq!(
            config.fallback,
            Fallback::Projects {
                values: vec!["AIPPL_JAIGAD".into()]
            }
        );
        assert_eq!(config.tracked_projects.len(), 2);
        assert_eq!(config.pinned[0].worksheet, "Sheet4");
    }

    #[test]
    fn test_defaults() {
        let config: Config = serde_yaml::from_str(MINIMAL_YAML).unwrap();
        assert!(config.validate().is_ok());

        assert_eq!(config.listener, default_listener());
        assert_eq!(config.admin_listener, default_admin_listener());
        assert_eq!(
            config.credentials,
            CredentialSource::Env {
                var: "GOOGLE_CREDENTIALS".into()
            }
        );
        assert_eq!(config.project_column, "Project");
        assert_eq!(config.fallback, Fallback::AllProjects);
        assert_eq!(config.google.value_input_option, "USER_ENTERED");
        // trailing whitespace in titles is significant
        assert_eq!(
            config.destination.spreadsheet,
            SpreadsheetRef::Title("SCRIPT FOR DATA ".into())
        );
    }

    #[test]
    fn test_worksheet_for() {
        let config: Config = serde_yaml::from_str(FULL_YAML).unwrap();
        assert_eq!(config.destination.worksheet_for("AIPPL_GAIMUKH"), "Sheet4");
        assert_eq!(config.destination.worksheet_for("OTHER"), "OTHER");
    }

    #[test]
    fn test_validation_errors() {
        let base: Config = serde_yaml::from_str(FULL_YAML).unwrap();

        let mut config = base.clone();
        config.admin_listener.port = 0;
        assert_eq!(config.validate(), Err(ValidationError::InvalidPort));

        let mut config = base.clone();
        config.source.worksheet = " ".into();
        assert_eq!(
            config.validate(),
            Err(ValidationError::EmptyWorksheet("source"))
        );

        let mut config = base.clone();
        config.destination.spreadsheet = SpreadsheetRef::Id("".into());
        assert_eq!(
            config.validate(),
            Err(ValidationError::EmptySpreadsheet("destination"))
        );

        let mut config = base.clone();
        config.fallback = Fallback::Projects { values: vec![] };
        assert_eq!(
            config.validate(),
            Err(ValidationError::EmptyProject("fallback"))
        );

        let mut config = base.clone();
        config.pinned.push(Pinned {
            project: "OTHER".into(),
            worksheet: "Sheet4".into(),
        });
        assert_eq!(
            config.validate(),
            Err(ValidationError::DuplicatePinnedWorksheet("Sheet4".into()))
        );

        let mut config = base.clone();
        config.pinned.push(Pinned {
            project: "OTHER".into(),
            worksheet: "SHEET4".into(),
        });
        assert_eq!(
            config.validate(),
            Err(ValidationError::DuplicatePinnedWorksheet("SHEET4".into()))
        );

        let mut config = base.clone();
        config
            .destination
            .worksheets
            .insert(" AIPPL_JAIGAD".into(), "Sheet5".into());
        assert_eq!(
            config.validate(),
            Err(ValidationError::PaddedProject(
                "destination.worksheets",
                " AIPPL_JAIGAD".into()
            ))
        );

        let mut config = base.clone();
        config.credentials = CredentialSource::Env { var: "".into() };
        assert_eq!(
            config.validate(),
            Err(ValidationError::EmptyCredentialSource)
        );

        let mut config = base;
        config.google.timeout_secs = 0;
        assert_eq!(config.validate(), Err(ValidationError::ZeroTimeout));
    }

    #[test]
    fn test_deserialization_errors() {
        // Missing source
        assert!(
            serde_yaml::from_str::<Config>(
                r#"
destination:
    spreadsheet: {id: dst}
"#
            )
            .is_err()
        );

        // Unknown credential source type
        assert!(serde_yaml::from_str::<CredentialSource>("type: vault").is_err());

        // Spreadsheet reference that is neither an id nor a title
        assert!(
            serde_yaml::from_str::<Source>("spreadsheet: {name: x}\nworksheet: Sheet1").is_err()
        );

        // Invalid URL
        assert!(serde_yaml::from_str::<GoogleApi>("sheets_url: not-a-url").is_err());
    }
}

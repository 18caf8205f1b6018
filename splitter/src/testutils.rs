//! In-memory spreadsheet service and fixtures shared by the unit tests.

use crate::config::{Config, SpreadsheetRef};
use crate::credentials::Connector;
use crate::errors::SplitterError;
use crate::sheets::{SheetsError, SpreadsheetService};
use async_trait::async_trait;
use indexmap::IndexMap;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

const TEST_CONFIG: &str = r#"
source:
    spreadsheet: {title: Test_BTS_10}
    worksheet: Sheet1
destination:
    spreadsheet: {title: "SCRIPT FOR DATA "}
    single_worksheet: Sheet3
    worksheets:
        AIPPL_GAIMUKH: Sheet4
fallback:
    type: projects
    values: [AIPPL_JAIGAD]
tracked_projects:
    - ABL_AROOR-THURAVOOR_KERALA
    - AIPPL_JAIGAD
    - AIPPL_GAIMUKH
pinned:
    - project: AIPPL_GAIMUKH
      worksheet: Sheet4
"#;

pub fn test_config() -> Config {
    let config: Config = serde_yaml::from_str(TEST_CONFIG).expect("parse test config");
    config.validate().expect("valid test config");
    config
}

pub fn rows(rows: &[&[&str]]) -> Vec<Vec<String>> {
    rows.iter()
        .map(|row| row.iter().map(|cell| cell.to_string()).collect())
        .collect()
}

pub fn sample_source() -> Vec<Vec<String>> {
    rows(&[
        &["Name", "Project", "Qty"],
        &["r1", "AIPPL_JAIGAD", "1"],
        &["r2", "AIPPL_GAIMUKH", "2"],
        &["r3", " AIPPL_JAIGAD ", "3"],
        &["r4", "ABL_AROOR-THURAVOOR_KERALA", "4"],
        &["r5", "AIPPL_GAIMUKH", "5"],
        &["r6", "AIPPL_GAIMUKH"],
    ])
}

#[derive(Default)]
struct State {
    titles: HashMap<String, String>,
    books: HashMap<String, IndexMap<String, Vec<Vec<String>>>>,
    writes: Vec<String>,
}

#[derive(Default)]
pub struct FakeSpreadsheets {
    state: Mutex<State>,
    connects: AtomicUsize,
    failing_reads: bool,
}

impl FakeSpreadsheets {
    /// Source "Test_BTS_10" (id `src`) holding [`sample_source`] in Sheet1, and
    /// destination "SCRIPT FOR DATA " (id `dst`) with a stale Sheet3 and an
    /// empty Sheet4.
    pub fn standard() -> Self {
        let stale = (0..10).map(|i| vec![format!("stale{i}")]).collect();

        FakeSpreadsheets::default()
            .with_spreadsheet("src", "Test_BTS_10")
            .with_worksheet("src", "Sheet1", sample_source())
            .with_spreadsheet("dst", "SCRIPT FOR DATA ")
            .with_worksheet("dst", "Sheet3", stale)
            .with_worksheet("dst", "Sheet4", vec![])
    }

    pub fn with_spreadsheet(self, id: &str, title: &str) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            state.titles.insert(title.into(), id.into());
            state.books.entry(id.into()).or_default();
        }
        self
    }

    pub fn with_worksheet(self, id: &str, worksheet: &str, values: Vec<Vec<String>>) -> Self {
        self.state
            .lock()
            .unwrap()
            .books
            .entry(id.into())
            .or_default()
            .insert(worksheet.into(), values);
        self
    }

    pub fn failing_reads(mut self) -> Self {
        self.failing_reads = true;
        self
    }

    pub fn worksheet(&self, id: &str, worksheet: &str) -> Option<Vec<Vec<String>>> {
        let state = self.state.lock().unwrap();
        state.books.get(id)?.get(worksheet).cloned()
    }

    /// Every mutating call, in order, as `op:spreadsheet:worksheet`.
    pub fn writes(&self) -> Vec<String> {
        self.state.lock().unwrap().writes.clone()
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::Relaxed)
    }

    fn with_worksheet_mut<T>(
        &self,
        id: &str,
        worksheet: &str,
        op: &str,
        f: impl FnOnce(&mut Vec<Vec<String>>) -> T,
    ) -> Result<T, SheetsError> {
        let mut state = self.state.lock().unwrap();
        state.writes.push(format!("{op}:{id}:{worksheet}"));
        let values = state
            .books
            .get_mut(id)
            .ok_or_else(|| SheetsError::SpreadsheetNotFound(id.into()))?
            .get_mut(worksheet)
            .ok_or_else(|| SheetsError::Api {
                status: 400,
                message: format!("Unable to parse range: {worksheet}"),
            })?;
        Ok(f(values))
    }
}

#[async_trait]
impl SpreadsheetService for FakeSpreadsheets {
    async fn resolve(&self, spreadsheet: &SpreadsheetRef) -> Result<String, SheetsError> {
        let state = self.state.lock().unwrap();
        match spreadsheet {
            SpreadsheetRef::Id(id) if state.books.contains_key(id) => Ok(id.clone()),
            SpreadsheetRef::Id(id) => Err(SheetsError::SpreadsheetNotFound(id.clone())),
            SpreadsheetRef::Title(title) => state
                .titles
                .get(title)
                .cloned()
                .ok_or_else(|| SheetsError::SpreadsheetNotFound(title.clone())),
        }
    }

    async fn worksheet_titles(&self, spreadsheet_id: &str) -> Result<Vec<String>, SheetsError> {
        let state = self.state.lock().unwrap();
        state
            .books
            .get(spreadsheet_id)
            .map(|book| book.keys().cloned().collect())
            .ok_or_else(|| SheetsError::SpreadsheetNotFound(spreadsheet_id.into()))
    }

    async fn read_values(
        &self,
        spreadsheet_id: &str,
        worksheet: &str,
    ) -> Result<Vec<Vec<String>>, SheetsError> {
        if self.failing_reads {
            return Err(SheetsError::Api {
                status: 503,
                message: "The service is currently unavailable.".into(),
            });
        }
        self.worksheet(spreadsheet_id, worksheet)
            .ok_or_else(|| SheetsError::Api {
                status: 400,
                message: format!("Unable to parse range: {worksheet}"),
            })
    }

    async fn clear(&self, spreadsheet_id: &str, worksheet: &str) -> Result<(), SheetsError> {
        self.with_worksheet_mut(spreadsheet_id, worksheet, "clear", |values| values.clear())
    }

    async fn write_values(
        &self,
        spreadsheet_id: &str,
        worksheet: &str,
        rows: &[Vec<String>],
    ) -> Result<(), SheetsError> {
        // Overwrites from A1 like the real API; rows below the written range stay.
        self.with_worksheet_mut(spreadsheet_id, worksheet, "write", |values| {
            for (i, row) in rows.iter().enumerate() {
                match values.get_mut(i) {
                    Some(existing) => *existing = row.clone(),
                    None => values.push(row.clone()),
                }
            }
        })
    }

    async fn add_worksheet(
        &self,
        spreadsheet_id: &str,
        worksheet: &str,
    ) -> Result<(), SheetsError> {
        let mut state = self.state.lock().unwrap();
        state.writes.push(format!("add:{spreadsheet_id}:{worksheet}"));
        let book = state
            .books
            .get_mut(spreadsheet_id)
            .ok_or_else(|| SheetsError::SpreadsheetNotFound(spreadsheet_id.into()))?;
        // Titles are unique regardless of case.
        let folded = worksheet.to_lowercase();
        if book.keys().any(|title| title.to_lowercase() == folded) {
            return Err(SheetsError::Api {
                status: 400,
                message: format!("A sheet with the name \"{worksheet}\" already exists."),
            });
        }
        book.insert(worksheet.into(), vec![]);
        Ok(())
    }
}

pub struct FakeConnector {
    sheets: Arc<FakeSpreadsheets>,
    readiness: Result<(), String>,
}

impl FakeConnector {
    pub fn new(sheets: Arc<FakeSpreadsheets>) -> Self {
        FakeConnector {
            sheets,
            readiness: Ok(()),
        }
    }

    pub fn not_ready(sheets: Arc<FakeSpreadsheets>, reason: &str) -> Self {
        FakeConnector {
            sheets,
            readiness: Err(reason.into()),
        }
    }
}

impl Connector for FakeConnector {
    fn connect(&self) -> Result<Arc<dyn SpreadsheetService>, SplitterError> {
        self.sheets.connects.fetch_add(1, Ordering::Relaxed);
        Ok(self.sheets.clone())
    }

    fn readiness(&self) -> Result<(), String> {
        self.readiness.clone()
    }
}

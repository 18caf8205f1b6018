use crate::config::{Config, Fallback, SpreadsheetRef};
use crate::credentials::Connector;
use crate::errors::SplitterError;
use crate::metrics_defs::{
    ROWS_WRITTEN, RUN_DURATION, RUN_FAILURES, RUN_REQUESTS, SOURCE_ROWS, WORKSHEETS_CREATED,
};
use crate::sheets::{SheetsError, SpreadsheetService};
use crate::table::Table;
use indexmap::IndexMap;
use serde::Serialize;
use shared::{counter, histogram};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

/// Projects named by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProjectSelection {
    /// Nothing named; the configured fallback applies.
    Default,
    One(String),
    Many(Vec<String>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// One project written to a worksheet that must already exist.
    Single,
    /// Each project written to its own worksheet, created when absent.
    Multi,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProjectOutcome {
    pub project: String,
    pub worksheet: String,
    pub count: usize,
    pub created: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub status: String,
    pub mode: Mode,
    pub total_rows: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filtered_project: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filtered_count: Option<usize>,
    pub projects: Vec<ProjectOutcome>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub pinned: Vec<ProjectOutcome>,
    pub tracked: IndexMap<String, usize>,
}

/// `requested` is set when the caller named the projects.
enum Plan {
    Single { project: String, requested: bool },
    Multi { projects: Vec<String>, requested: bool },
    AllProjects,
}

impl Plan {
    fn requested(&self) -> bool {
        match self {
            Plan::Single { requested, .. } | Plan::Multi { requested, .. } => *requested,
            Plan::AllProjects => false,
        }
    }
}

struct Target {
    project: String,
    worksheet: String,
    create_missing: bool,
    pinned: bool,
}

/// Reads the source worksheet, partitions it by project and rewrites the
/// destination worksheets. Holds no state between runs.
pub struct Processor {
    config: Arc<Config>,
    connector: Arc<dyn Connector>,
}

impl Processor {
    pub fn new(config: Arc<Config>, connector: Arc<dyn Connector>) -> Self {
        Processor { config, connector }
    }

    pub fn readiness(&self) -> Result<(), String> {
        self.connector.readiness()
    }

    pub async fn run(&self, selection: ProjectSelection) -> Result<RunSummary, SplitterError> {
        let start = Instant::now();
        counter!(RUN_REQUESTS).increment(1);

        let result = self.process(selection).await;
        histogram!(RUN_DURATION).record(start.elapsed().as_secs_f64());

        match &result {
            Ok(summary) => tracing::info!(
                mode = ?summary.mode,
                total_rows = summary.total_rows,
                projects = summary.projects.len(),
                "run completed"
            ),
            Err(e) => {
                counter!(RUN_FAILURES).increment(1);
                tracing::error!(error = %e, category = ?e.category(), "run failed");
            }
        }

        result
    }

    async fn process(&self, selection: ProjectSelection) -> Result<RunSummary, SplitterError> {
        let config = &self.config;
        // Reject bad input before touching credentials or the network.
        let plan = self.plan(selection)?;
        let requested = plan.requested();
        let service = self.connector.connect()?;

        let source_id = service.resolve(&config.source.spreadsheet).await?;
        require_worksheet(
            service.as_ref(),
            &config.source.spreadsheet,
            &source_id,
            &config.source.worksheet,
        )
        .await?;
        let values = service
            .read_values(&source_id, &config.source.worksheet)
            .await?;
        let table = Table::from_values(values)?;
        histogram!(SOURCE_ROWS).record(table.len() as f64);

        let column = table.column_index(&config.project_column)?;
        let groups = table.partition(column);

        let (mode, projects) = match plan {
            Plan::Single { project, .. } => (Mode::Single, vec![project]),
            Plan::Multi { projects, .. } => (Mode::Multi, projects),
            Plan::AllProjects => (Mode::Multi, groups.keys().cloned().collect()),
        };
        let targets = self.targets(mode, projects, requested)?;

        let destination_id = service.resolve(&config.destination.spreadsheet).await?;
        // Keyed by folded title; the sheet keeps the casing it was created with.
        let mut existing: HashMap<String, String> = service
            .worksheet_titles(&destination_id)
            .await?
            .into_iter()
            .map(|title| (title.to_lowercase(), title))
            .collect();

        // Worksheets that are never created must all exist before anything is cleared.
        if let Some(missing) = targets
            .iter()
            .find(|t| !t.create_missing && !existing.contains_key(&t.worksheet.to_lowercase()))
        {
            return Err(SheetsError::WorksheetNotFound {
                spreadsheet: config.destination.spreadsheet.to_string(),
                worksheet: missing.worksheet.clone(),
            }
            .into());
        }

        let mut outcomes = Vec::new();
        let mut pinned = Vec::new();

        for mut target in targets {
            let key = target.worksheet.to_lowercase();
            let created = match existing.get(&key) {
                Some(title) => {
                    target.worksheet = title.clone();
                    false
                }
                None => {
                    service
                        .add_worksheet(&destination_id, &target.worksheet)
                        .await?;
                    counter!(WORKSHEETS_CREATED).increment(1);
                    existing.insert(key, target.worksheet.clone());
                    true
                }
            };

            let partition = match groups.get(&target.project) {
                Some(indices) => table.select(indices),
                None => table.select(&[]),
            };

            if partition.is_empty() {
                tracing::warn!(project = %target.project, "no source rows for project");
            }

            service.clear(&destination_id, &target.worksheet).await?;
            service
                .write_values(&destination_id, &target.worksheet, &partition.to_values())
                .await?;
            counter!(ROWS_WRITTEN).increment(partition.len() as u64);

            tracing::info!(
                project = %target.project,
                worksheet = %target.worksheet,
                rows = partition.len(),
                created,
                "wrote partition"
            );

            let outcome = ProjectOutcome {
                project: target.project,
                worksheet: target.worksheet,
                count: partition.len(),
                created,
            };
            if target.pinned {
                pinned.push(outcome);
            } else {
                outcomes.push(outcome);
            }
        }

        let tracked = config
            .tracked_projects
            .iter()
            .map(|project| {
                let project = project.trim();
                (
                    project.to_string(),
                    groups.get(project).map_or(0, Vec::len),
                )
            })
            .collect();

        let (filtered_project, filtered_count) = match (mode, outcomes.first()) {
            (Mode::Single, Some(outcome)) => (Some(outcome.project.clone()), Some(outcome.count)),
            _ => (None, None),
        };

        Ok(RunSummary {
            status: "success".into(),
            mode,
            total_rows: table.len(),
            filtered_project,
            filtered_count,
            projects: outcomes,
            pinned,
            tracked,
        })
    }

    fn plan(&self, selection: ProjectSelection) -> Result<Plan, SplitterError> {
        match selection {
            ProjectSelection::One(project) => Ok(Plan::Single {
                project: normalize(&project)?,
                requested: true,
            }),
            ProjectSelection::Many(projects) if !projects.is_empty() => multi(&projects, true),
            ProjectSelection::Many(_) | ProjectSelection::Default => match &self.config.fallback {
                Fallback::AllProjects => Ok(Plan::AllProjects),
                Fallback::Projects { values } if values.len() == 1 => Ok(Plan::Single {
                    project: normalize(&values[0])?,
                    requested: false,
                }),
                Fallback::Projects { values } => multi(values, false),
            },
        }
    }

    /// Destination worksheet for every project plus the pinned partitions.
    /// A worksheet is written at most once per run; titles differing only in
    /// case name the same worksheet.
    ///
    /// A collision is the caller's fault only when the caller named the
    /// projects; otherwise it comes from the source data or the config.
    fn targets(
        &self,
        mode: Mode,
        projects: Vec<String>,
        requested: bool,
    ) -> Result<Vec<Target>, SplitterError> {
        let destination = &self.config.destination;

        let wanted = projects.into_iter().map(|project| {
            let worksheet = match (mode, &destination.single_worksheet) {
                (Mode::Single, Some(single)) => single.clone(),
                _ => destination.worksheet_for(&project).to_string(),
            };
            Target {
                project,
                worksheet,
                create_missing: mode == Mode::Multi,
                pinned: false,
            }
        });
        let pinned = self.config.pinned.iter().map(|pin| Target {
            project: pin.project.trim().to_string(),
            worksheet: pin.worksheet.clone(),
            create_missing: false,
            pinned: true,
        });

        let mut owners: HashMap<String, String> = HashMap::new();
        let mut targets = Vec::new();

        for target in wanted.chain(pinned) {
            let key = target.worksheet.to_lowercase();
            match owners.get(&key) {
                Some(owner) if *owner == target.project => continue,
                Some(owner) if requested => {
                    return Err(SplitterError::ConflictingDestination {
                        worksheet: target.worksheet,
                        first: owner.clone(),
                        second: target.project,
                    });
                }
                Some(owner) => {
                    return Err(SplitterError::DestinationCollision {
                        worksheet: target.worksheet,
                        first: owner.clone(),
                        second: target.project,
                    });
                }
                None => {
                    owners.insert(key, target.project.clone());
                    targets.push(target);
                }
            }
        }

        Ok(targets)
    }
}

fn normalize(project: &str) -> Result<String, SplitterError> {
    let project = project.trim();
    if project.is_empty() {
        return Err(SplitterError::InvalidRequest(
            "project identifiers must not be empty".into(),
        ));
    }
    Ok(project.to_string())
}

fn multi(projects: &[String], requested: bool) -> Result<Plan, SplitterError> {
    let mut seen = HashSet::new();
    let mut unique = Vec::new();
    for project in projects {
        let project = normalize(project)?;
        if seen.insert(project.clone()) {
            unique.push(project);
        }
    }
    Ok(Plan::Multi {
        projects: unique,
        requested,
    })
}

async fn require_worksheet(
    service: &dyn SpreadsheetService,
    spreadsheet: &SpreadsheetRef,
    spreadsheet_id: &str,
    worksheet: &str,
) -> Result<(), SheetsError> {
    let titles = service.worksheet_titles(spreadsheet_id).await?;
    if titles.iter().any(|title| title == worksheet) {
        return Ok(());
    }
    Err(SheetsError::WorksheetNotFound {
        spreadsheet: spreadsheet.to_string(),
        worksheet: worksheet.to_string(),
    })
}

mod config;
mod observability;

use clap::{Parser, Subcommand};
use config::Config;
use splitter::processor::ProjectSelection;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(version, about = "Splits a source worksheet into per-project worksheets")]
struct Cli {
    #[arg(long, short, global = true, default_value = "sheetsync.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Subcommand)]
enum CliCommand {
    /// Serve the run API and the admin endpoints.
    Serve {
        /// Overrides the configured API listener port.
        #[arg(long, env = "PORT")]
        port: Option<u16>,
    },
    /// Process once and print the run summary as JSON.
    Run {
        /// Project to process; repeat for several. Defaults to the configured fallback.
        #[arg(long = "project")]
        projects: Vec<String>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut config = match Config::from_file(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}: {e}", cli.config.display());
            return ExitCode::FAILURE;
        }
    };

    let _sentry = observability::init_sentry(&config.common.logging);
    observability::init_logging(&config.common.logging);

    if let Some(metrics) = &config.common.metrics
        && let Err(e) = observability::init_metrics(metrics)
    {
        tracing::error!(error = %e, "could not initialise metrics");
        return ExitCode::FAILURE;
    }

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            tracing::error!(error = %e, "could not start runtime");
            return ExitCode::FAILURE;
        }
    };

    match cli.command {
        CliCommand::Serve { port } => {
            if let Some(port) = port {
                config.splitter.listener.port = port;
                if let Err(e) = config.splitter.validate() {
                    tracing::error!(error = %e, "invalid listener port");
                    return ExitCode::FAILURE;
                }
            }

            tracing::info!("starting sheetsync");
            match rt.block_on(splitter::run(config.splitter)) {
                Ok(()) => ExitCode::SUCCESS,
                Err(e) => {
                    tracing::error!(error = %e, "server stopped");
                    ExitCode::FAILURE
                }
            }
        }
        CliCommand::Run { projects } => {
            let selection = selection(projects);
            match rt.block_on(splitter::run_once(config.splitter, selection)) {
                Ok(summary) => match serde_json::to_string_pretty(&summary) {
                    Ok(json) => {
                        println!("{json}");
                        ExitCode::SUCCESS
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "could not encode summary");
                        ExitCode::FAILURE
                    }
                },
                Err(e) => {
                    eprintln!("{e}");
                    ExitCode::FAILURE
                }
            }
        }
    }
}

fn selection(mut projects: Vec<String>) -> ProjectSelection {
    match projects.len() {
        0 => ProjectSelection::Default,
        1 => ProjectSelection::One(projects.remove(0)),
        _ => ProjectSelection::Many(projects),
    }
}

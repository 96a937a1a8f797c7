pub mod config;

pub use self::config::GateflowConfig;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use crate::agent;
use crate::client::GateflowClient;
use crate::engine::types::{Payload, RunStatus};
use crate::engine::{RunController, RunView};
use crate::storage::JsonRunStore;
use crate::workflow::WorkflowRegistry;

use self::config::{DEFAULT_HOST, DEFAULT_MAX_BODY, DEFAULT_PORT, DEFAULT_STORE_DIR};

#[derive(Parser)]
#[command(name = "gateflow", version, about = "Resumable step pipelines with approval gates")]
pub struct Cli {
    /// Path to a .env file to load (default: auto-detect .env in cwd)
    #[arg(long, global = true)]
    dotenv: Option<PathBuf>,

    /// Path to a config file (default: auto-detect gateflow.yaml in cwd)
    #[arg(long, global = true, env = "GATEFLOW_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start a run of a registered workflow
    Start {
        /// Workflow id
        workflow: String,

        /// Initial input as JSON string
        #[arg(short, long, conflicts_with = "input_file")]
        input: Option<String>,

        /// Read the initial input from a JSON file
        #[arg(long)]
        input_file: Option<PathBuf>,

        /// Run store directory
        #[arg(long, env = "STORE_DIR")]
        store_dir: Option<PathBuf>,
    },

    /// Resume a suspended run
    Resume {
        /// Run ID
        run_id: String,

        /// Id of the step the run is suspended at
        step_id: String,

        /// Resume payload as JSON string
        #[arg(short, long, conflicts_with = "data_file")]
        data: Option<String>,

        /// Read the resume payload from a JSON file
        #[arg(long)]
        data_file: Option<PathBuf>,

        /// Run store directory
        #[arg(long, env = "STORE_DIR")]
        store_dir: Option<PathBuf>,
    },

    /// Show the state of a run
    Status {
        /// Run ID
        run_id: String,

        /// Run store directory
        #[arg(long, env = "STORE_DIR")]
        store_dir: Option<PathBuf>,
    },

    /// List runs
    List {
        /// Filter by status (running, suspended, completed, failed)
        #[arg(short, long)]
        status: Option<String>,

        /// Run store directory
        #[arg(long, env = "STORE_DIR")]
        store_dir: Option<PathBuf>,

        /// Output format (table, json)
        #[arg(long, default_value = "table")]
        format: String,
    },

    /// List registered workflows
    Workflows,

    /// Start the REST API server
    Serve {
        /// Host to bind to
        #[arg(long, env = "HOST")]
        host: Option<String>,

        /// Port to listen on
        #[arg(short, long, env = "PORT")]
        port: Option<u16>,

        /// Run store directory
        #[arg(long, env = "STORE_DIR")]
        store_dir: Option<PathBuf>,

        /// Maximum request body size in bytes (default: 1048576 = 1 MB)
        #[arg(long, env = "MAX_BODY")]
        max_body: Option<usize>,
    },

    /// Poll a server until a run stops running
    Wait {
        /// Run ID
        run_id: String,

        /// Base URL of the gateflow server
        #[arg(long, default_value = "http://localhost:3000", env = "GATEFLOW_SERVER")]
        server: String,

        /// Delay between status checks in milliseconds
        #[arg(long)]
        interval_ms: Option<u64>,

        /// Maximum number of status checks
        #[arg(long)]
        max_attempts: Option<u32>,
    },
}

pub async fn run_cli() -> Result<()> {
    let cli = Cli::parse();

    // Load .env file
    load_dotenv(cli.dotenv.as_deref());

    let config = GateflowConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Start {
            workflow,
            input,
            input_file,
            store_dir,
        } => {
            let input = read_payload(input, input_file.as_deref(), "--input")?;
            let controller = local_controller(&config, store_dir)?;
            let record = controller.start(&workflow, input).await?;
            print_view(&controller.to_view(record))
        }
        Commands::Resume {
            run_id,
            step_id,
            data,
            data_file,
            store_dir,
        } => {
            let payload = read_payload(data, data_file.as_deref(), "--data")?;
            let controller = local_controller(&config, store_dir)?;
            let record = controller.resume(&run_id, &step_id, payload).await?;
            print_view(&controller.to_view(record))
        }
        Commands::Status { run_id, store_dir } => {
            let controller = local_controller(&config, store_dir)?;
            let view = controller.view(&run_id).await?;
            println!("{}", serde_json::to_string_pretty(&view)?);
            Ok(())
        }
        Commands::List {
            status,
            store_dir,
            format,
        } => cmd_list(&config, status, store_dir, format).await,
        Commands::Workflows => cmd_workflows(),
        Commands::Serve {
            host,
            port,
            store_dir,
            max_body,
        } => {
            let host = host
                .or_else(|| config.host.clone())
                .unwrap_or_else(|| DEFAULT_HOST.to_string());
            let port = port.or(config.port).unwrap_or(DEFAULT_PORT);
            let max_body = max_body.or(config.max_body).unwrap_or(DEFAULT_MAX_BODY);
            let controller = local_controller(&config, store_dir)?;
            crate::api::serve(&host, port, max_body, controller).await
        }
        Commands::Wait {
            run_id,
            server,
            interval_ms,
            max_attempts,
        } => {
            let mut poll = config.poll.to_poll_config();
            if let Some(ms) = interval_ms {
                poll.interval = Duration::from_millis(ms);
            }
            if let Some(n) = max_attempts {
                poll.max_attempts = n;
            }
            let view = GateflowClient::new(server).wait(&run_id, poll).await?;
            print_view(&view)
        }
    }
}

/// Load environment variables from a .env file.
/// If an explicit path is given, load from that path (error if missing).
/// Otherwise, auto-detect .env in the current working directory (silently skip if absent).
fn load_dotenv(explicit_path: Option<&Path>) {
    match explicit_path {
        Some(path) => match dotenvy::from_path(path) {
            Ok(()) => info!("Loaded env from {}", path.display()),
            Err(e) => {
                eprintln!(
                    "Warning: Failed to load dotenv file '{}': {}",
                    path.display(),
                    e
                );
            }
        },
        None => match dotenvy::dotenv() {
            Ok(path) => info!("Loaded env from {}", path.display()),
            Err(dotenvy::Error::Io(_)) => {}
            Err(e) => {
                eprintln!("Warning: Failed to parse .env file: {}", e);
            }
        },
    }
}

/// Controller over the on-disk run store, so separate invocations share runs.
fn local_controller(config: &GateflowConfig, store_dir: Option<PathBuf>) -> Result<RunController> {
    let store_dir = store_dir
        .or_else(|| config.store_dir.as_ref().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_STORE_DIR));
    let registry = WorkflowRegistry::with_builtins()?;
    let store = Arc::new(JsonRunStore::new(store_dir));
    let agent = agent::from_settings(config.agent.clone());
    Ok(RunController::new(registry, store, agent))
}

fn read_payload(inline: Option<String>, file: Option<&Path>, flag: &str) -> Result<Payload> {
    match (inline, file) {
        (Some(json), _) => {
            serde_json::from_str(&json).with_context(|| format!("Failed to parse {} JSON", flag))
        }
        (None, Some(path)) => {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse JSON in {}", path.display()))
        }
        (None, None) => Ok(Payload::Object(Default::default())),
    }
}

fn print_view(view: &RunView) -> Result<()> {
    println!("Run ID: {}", view.run_id);
    println!("Workflow: {}", view.workflow_id);
    println!("Status: {}", view.status);
    if let Some(step) = &view.current_step_id {
        println!("Step: {} (index {})", step, view.current_step_index);
    }

    match view.status {
        RunStatus::Suspended => {
            if let Some(env) = &view.suspend_envelope {
                println!("\nWaiting: {}", env.description);
                println!("Action: {}", env.required_action.instructions);
                if !env.resume_conditions.required_inputs.is_empty() {
                    println!(
                        "Required inputs: {}",
                        env.resume_conditions.required_inputs.join(", ")
                    );
                }
            }
        }
        RunStatus::Completed => {
            if let Some(result) = &view.final_result {
                println!("\nResult:");
                println!("{}", serde_json::to_string_pretty(result)?);
            }
        }
        RunStatus::Failed => {
            if let Some(err) = &view.error {
                println!("\nError ({}) in step '{}': {}", err.kind, err.step_id, err.message);
            }
        }
        RunStatus::Running => {}
    }

    Ok(())
}

async fn cmd_list(
    config: &GateflowConfig,
    status_filter: Option<String>,
    store_dir: Option<PathBuf>,
    format: String,
) -> Result<()> {
    let status = status_filter
        .as_deref()
        .map(str::parse::<RunStatus>)
        .transpose()
        .map_err(anyhow::Error::msg)?;

    let controller = local_controller(config, store_dir)?;
    let runs = controller.list_runs(status).await?;

    if runs.is_empty() {
        println!("No runs found.");
        return Ok(());
    }

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&runs)?);
        return Ok(());
    }

    // Table format
    println!(
        "{:<38} {:<30} {:<10} {:<5} {:<20}",
        "RUN ID", "WORKFLOW", "STATUS", "STEP", "CREATED"
    );
    println!("{}", "-".repeat(106));

    for run in &runs {
        println!(
            "{:<38} {:<30} {:<10} {:<5} {:<20}",
            run.run_id,
            run.workflow_id,
            run.status().to_string(),
            run.current_step_index,
            run.created_at.format("%Y-%m-%d %H:%M:%S")
        );
    }

    println!("\nTotal: {} run(s)", runs.len());
    Ok(())
}

fn cmd_workflows() -> Result<()> {
    let registry = WorkflowRegistry::with_builtins()?;
    let workflows = registry.list();

    println!("{:<30} DESCRIPTION", "WORKFLOW");
    println!("{}", "-".repeat(70));

    for wf in &workflows {
        println!("{:<30} {}", wf.id(), wf.description());
        for step in wf.steps() {
            let gate = if step.resume_shape().is_some() { " (gate)" } else { "" };
            println!("  - {}{}", step.id(), gate);
        }
    }

    println!("\nTotal: {} workflow(s)", workflows.len());
    Ok(())
}

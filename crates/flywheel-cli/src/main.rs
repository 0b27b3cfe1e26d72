//! flywheel CLI
//!
//! # Configuration
//!
//! - `DATABASE_URL`, `DATABASE_MIN_CONNECTIONS`, `DATABASE_MAX_CONNECTIONS`:
//!   conexión Postgres (también desde `.env`).
//! - `FLYWHEEL_MACHINE_ID`: nodo del generador de ids.
//! - `FLYWHEEL_USER_ID`, `FLYWHEEL_NICKNAME`, `FLYWHEEL_ROLES`: sesión.
//! - `RUST_LOG`: filtro de logs (por defecto `warn`, `debug` con `--debug`).
//!
//! Los resultados se imprimen como JSON en stdout. Un error de dominio se
//! imprime como `ErrorBody` en stderr con código de salida 2.

mod args;

use std::fs;
use std::io::{self, Read};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use flywheel::{AppConfig, PgApp};
use flywheel_core::workflow::{WorkflowCreation, WorkflowQuery, WorkflowStateUpdating};
use flywheel_core::{ErrorBody, EventRecord, FlywheelError, WorkStateTransitionBrief};
use serde::Serialize;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use crate::args::{Args, Command, OutboxCommand, StateCommand, WorkflowCommand};

fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    let args = Args::parse();
    init_tracing(args.debug);

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => match e.downcast_ref::<FlywheelError>() {
            Some(domain) => {
                let body = ErrorBody::from(domain);
                match serde_json::to_string(&body) {
                    Ok(json) => eprintln!("{json}"),
                    Err(_) => eprintln!("{}: {}", body.code, body.message),
                }
                ExitCode::from(2)
            }
            None => {
                eprintln!("error: {e:#}");
                ExitCode::FAILURE
            }
        },
    }
}

fn init_tracing(debug: bool) {
    let fallback = if debug { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    tracing_subscriber::fmt().with_env_filter(filter)
                             .with_writer(io::stderr)
                             .init();
}

fn load_config(args: &Args) -> Result<AppConfig> {
    let mut cfg = match &args.database_url {
        // la URL explícita no exige DATABASE_URL en el entorno
        Some(url) => AppConfig::from_vars(|key| match key {
                         "DATABASE_URL" => Some(url.clone()),
                         other => std::env::var(other).ok(),
                     })?,
        None => AppConfig::from_env()?,
    };
    if let Some(machine_id) = args.machine_id {
        cfg.machine_id = machine_id;
    }
    Ok(cfg)
}

fn run(args: Args) -> Result<()> {
    let cfg = load_config(&args)?;
    if let Command::Migrate = args.command {
        let applied = flywheel_persistence::migrate_url(&cfg.database.url)?;
        info!(applied, "migrations applied");
        return print_json(&serde_json::json!({ "applied": applied }));
    }

    let app = PgApp::connect(&cfg).context("connecting to database")?;
    let session = args.session.to_session();
    debug!(user = %session.identity.id, roles = session.roles.len(), "session");

    match args.command {
        Command::Migrate => Ok(()),
        Command::Workflow(WorkflowCommand::List { project, name }) => {
            let query = WorkflowQuery { project_id: project,
                                        name };
            print_json(&app.workflows.query(&query, &session)?)
        }
        Command::Workflow(WorkflowCommand::Show { id }) => print_json(&app.workflows.detail(id, &session)?),
        Command::Workflow(WorkflowCommand::Create { file }) => {
            let raw = read_input(&file)?;
            let creation: WorkflowCreation =
                serde_json::from_str(&raw).with_context(|| format!("parsing workflow from {}", file.display()))?;
            print_json(&app.workflows.create(&creation, &session)?)
        }
        Command::Workflow(WorkflowCommand::Delete { id }) => {
            app.workflows.delete(id, &session)?;
            print_json(&serde_json::json!({ "deleted": id }))
        }
        Command::State(StateCommand::Rename { flow_id, from, to, order }) => {
            let order = match order {
                Some(order) => order,
                None => app.workflows
                           .detail(flow_id, &session)?
                           .state_machine
                           .find_state(&from)
                           .map(|s| s.order)
                           .ok_or_else(|| FlywheelError::NotFound(format!("state {from}")))?,
            };
            let updating = WorkflowStateUpdating { origin_name: from,
                                                   name: to,
                                                   order };
            app.workflows.update_state(flow_id, &updating, &session)?;
            print_json(&app.workflows.detail(flow_id, &session)?)
        }
        Command::Transition { work_id, flow_id, from, to } => {
            let brief = WorkStateTransitionBrief::new(work_id, flow_id, from, to);
            print_json(&app.engine.transition(&brief, &session)?)
        }
        Command::Steps { work_id } => print_json(&app.engine.query_process_steps(work_id, &session)?),
        Command::Outbox(OutboxCommand::Drain { limit }) => {
            let handler = |event: &EventRecord| -> Result<(), FlywheelError> {
                let line = serde_json::to_string(event).map_err(|e| FlywheelError::EventSink(e.to_string()))?;
                println!("{line}");
                Ok(())
            };
            let delivered = app.dispatcher.drain(&handler, limit)?;
            info!(delivered, "outbox drained");
            Ok(())
        }
    }
}

fn read_input(path: &std::path::Path) -> Result<String> {
    if path.as_os_str() == "-" {
        let mut buf = String::new();
        io::stdin().read_to_string(&mut buf).context("reading stdin")?;
        return Ok(buf);
    }
    fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

//! Definición de la línea de comandos.

use std::path::PathBuf;

use clap::{Args as ClapArgs, Parser, Subcommand};
use flywheel_core::{Id, Identity, Session};

/// flywheel: workflows y transiciones de work items sobre Postgres.
#[derive(Parser, Debug)]
#[command(name = "flywheel")]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Enable debug logging (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    pub debug: bool,

    /// Postgres connection URL (default: DATABASE_URL from env/.env)
    #[arg(long, global = true)]
    pub database_url: Option<String>,

    /// Id generator node (default: FLYWHEEL_MACHINE_ID or 1)
    #[arg(long, global = true)]
    pub machine_id: Option<u16>,

    #[command(flatten)]
    pub session: SessionArgs,

    #[command(subcommand)]
    pub command: Command,
}

/// Identidad y roles con los que se ejecuta el comando.
#[derive(ClapArgs, Debug, Clone)]
pub struct SessionArgs {
    #[arg(long, env = "FLYWHEEL_USER_ID", default_value_t = 0, global = true)]
    pub user_id: i64,

    #[arg(long, env = "FLYWHEEL_NICKNAME", default_value = "cli", global = true)]
    pub nickname: String,

    /// Roles `<role>_<projectId>` separados por coma, p.ej. `manager_1,member_2`
    #[arg(long, env = "FLYWHEEL_ROLES", value_delimiter = ',', global = true)]
    pub roles: Vec<String>,
}

impl SessionArgs {
    pub fn to_session(&self) -> Session {
        Session::from_role_strings(Identity { id: Id(self.user_id),
                                              nickname: self.nickname.clone() },
                                   &self.roles)
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Apply pending database migrations
    Migrate,
    /// Workflow management
    #[command(subcommand)]
    Workflow(WorkflowCommand),
    /// State management inside a workflow
    #[command(subcommand)]
    State(StateCommand),
    /// Move a work item between two states
    Transition {
        work_id: Id,
        flow_id: Id,
        from: String,
        to: String,
    },
    /// Process-step history of a work item
    Steps { work_id: Id },
    /// Outbox operations
    #[command(subcommand)]
    Outbox(OutboxCommand),
}

#[derive(Subcommand, Debug)]
pub enum WorkflowCommand {
    /// List workflows visible to the session
    List {
        #[arg(long)]
        project: Option<Id>,
        /// Case-insensitive substring of the name
        #[arg(long)]
        name: Option<String>,
    },
    /// Show a workflow with its state machine
    Show { id: Id },
    /// Create a workflow from a JSON document (`-` reads stdin)
    Create { file: PathBuf },
    /// Delete an unreferenced workflow
    Delete { id: Id },
}

#[derive(Subcommand, Debug)]
pub enum StateCommand {
    /// Rename a state (and reorder it), cascading to works and history
    Rename {
        flow_id: Id,
        from: String,
        to: String,
        /// New order; keeps the current one when omitted
        #[arg(long)]
        order: Option<i32>,
    },
}

#[derive(Subcommand, Debug)]
pub enum OutboxCommand {
    /// Deliver pending events to stdout as JSON lines
    Drain {
        #[arg(long, default_value_t = 100)]
        limit: usize,
    },
}

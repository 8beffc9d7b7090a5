//! Command-line interface definitions using clap.
//!
//! Argument structs carry the clap derives and convert into the plain core
//! parameter types with `From`, so the engine stays free of CLI concerns:
//!
//! ```text
//! User Input → CLI Args (clap) → Core Params → Orchestrator
//! ```
//!
//! The session is a global flag; conversions that need it go through
//! [`WithSession`].

use std::path::PathBuf;

use clap::{Args as ClapArgs, Parser, Subcommand};
use stepwise_core::{
    dispatch::{DispatchMode, DispatchSchedule},
    params::{ApproveStep, CreatePlan, PlanRef},
};

/// Human-gated plan orchestration for specialist agents
///
/// Stepwise turns an objective into an ordered plan of agent steps, waits
/// for each step to be approved, and executes approved steps in dependency
/// order while keeping a per-session message log.
#[derive(Parser)]
#[command(version, about, name = "sw")]
pub struct Args {
    /// Path to the SQLite database file. Defaults to
    /// $XDG_DATA_HOME/stepwise/stepwise.db
    #[arg(long, global = true)]
    pub database_file: Option<PathBuf>,

    /// Disable colored output and use plain text
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Conversation session the command operates in
    #[arg(long, global = true, default_value = "default")]
    pub session: String,

    /// Register an agent backed by an external program (repeatable)
    #[arg(
        long = "agent",
        global = true,
        value_name = "NAME=PROGRAM",
        value_parser = parse_agent_spec,
        help = "Register an agent backed by an external program, e.g. company=./company.sh"
    )]
    pub agents: Vec<AgentSpec>,

    /// Agent that receives the full session context (repeatable)
    #[arg(long = "synthesis-agent", global = true, value_name = "NAME")]
    pub synthesis_agents: Vec<String>,

    /// Program that proposes plans; reads the prompt on stdin
    #[arg(long, global = true, value_name = "PROGRAM")]
    pub planner: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands for the stepwise CLI
#[derive(Subcommand)]
pub enum Commands {
    /// Create, run and inspect plans
    #[command(alias = "p")]
    Plan {
        #[command(subcommand)]
        command: PlanCommands,
    },
    /// Approve or reject steps
    #[command(alias = "s")]
    Step {
        #[command(subcommand)]
        command: StepCommands,
    },
    /// Manage sessions
    Session {
        #[command(subcommand)]
        command: SessionCommands,
    },
}

impl Commands {
    /// Canned proposal file given to `plan create`, if any.
    pub fn proposal_file(&self) -> Option<&PathBuf> {
        match self {
            Commands::Plan {
                command: PlanCommands::Create(args),
            } => args.proposal.as_ref(),
            _ => None,
        }
    }

    /// Batch size override given to `plan execute`, if any.
    pub fn max_parallel(&self) -> Option<usize> {
        match self {
            Commands::Plan {
                command: PlanCommands::Execute(args),
            } => args.max_parallel,
            _ => None,
        }
    }
}

/// An agent registered on the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentSpec {
    pub name: String,
    pub program: String,
}

fn parse_agent_spec(value: &str) -> Result<AgentSpec, String> {
    let (name, program) = value
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=PROGRAM, got '{value}'"))?;
    let (name, program) = (name.trim(), program.trim());
    if name.is_empty() || program.is_empty() {
        return Err(format!("expected NAME=PROGRAM, got '{value}'"));
    }
    Ok(AgentSpec {
        name: name.to_string(),
        program: program.to_string(),
    })
}

/// Pairs CLI arguments with the global session before conversion.
pub struct WithSession<T> {
    pub session_id: String,
    pub args: T,
}

impl<T> WithSession<T> {
    pub fn new(session_id: &str, args: T) -> Self {
        Self {
            session_id: session_id.to_string(),
            args,
        }
    }
}

/// Plan an objective
///
/// The configured planner (or a canned `--proposal` file) drafts the
/// steps. Every step starts PENDING and needs an approval before it runs.
#[derive(ClapArgs)]
pub struct CreatePlanArgs {
    /// What the plan should achieve
    pub objective: String,
    /// User the plan is created for
    #[arg(long, default_value = "local", help = "User the plan is created for")]
    pub user: String,
    /// Files or tool manifests the objective refers to
    #[arg(
        long = "file-ref",
        value_delimiter = ',',
        help = "Files or tool manifests the objective refers to (comma-separated)"
    )]
    pub file_refs: Vec<String>,
    /// Fail the whole plan on the first failed or rejected step
    #[arg(long, help = "Fail the whole plan on the first failed or rejected step")]
    pub fail_fast: bool,
    /// Use the JSON proposal in FILE instead of calling the planner
    #[arg(long, value_name = "FILE", help = "Use a canned proposal instead of the planner")]
    pub proposal: Option<PathBuf>,
}

impl From<WithSession<CreatePlanArgs>> for CreatePlan {
    fn from(val: WithSession<CreatePlanArgs>) -> Self {
        CreatePlan {
            session_id: val.session_id,
            user_id: val.args.user,
            objective: val.args.objective,
            file_refs: val.args.file_refs,
            fail_fast: val.args.fail_fast,
        }
    }
}

/// Refer to a plan by ID
#[derive(ClapArgs)]
pub struct PlanIdArgs {
    /// ID of the plan
    #[arg(help = "Unique identifier of the plan")]
    pub id: u64,
}

impl From<WithSession<PlanIdArgs>> for PlanRef {
    fn from(val: WithSession<PlanIdArgs>) -> Self {
        PlanRef {
            session_id: val.session_id,
            plan_id: val.args.id,
        }
    }
}

/// Run the approved steps of a plan
///
/// Ready steps are dispatched in dependency order. The run stops when
/// nothing approved is left, a step needs approval, the plan finishes or
/// Ctrl-C requests cancellation.
#[derive(ClapArgs)]
pub struct ExecutePlanArgs {
    /// ID of the plan to run
    #[arg(help = "Unique identifier of the plan to run")]
    pub id: u64,
    /// Dispatch mode for the whole plan
    #[arg(long, default_value_t = DispatchMode::Concurrent, help = "Dispatch mode: concurrent or sequential")]
    pub mode: DispatchMode,
    /// Switch to sequential dispatch from this step order on
    #[arg(long, value_name = "ORDER", help = "Run steps from this order on one at a time")]
    pub sequential_from: Option<u32>,
    /// Largest concurrent batch
    #[arg(long, value_name = "N", help = "Largest number of steps run at once")]
    pub max_parallel: Option<usize>,
}

impl ExecutePlanArgs {
    pub fn schedule(&self) -> DispatchSchedule {
        let schedule = DispatchSchedule::uniform(self.mode);
        match self.sequential_from {
            Some(order) => schedule.then_from(order, DispatchMode::Sequential),
            None => schedule,
        }
    }
}

#[derive(Subcommand)]
pub enum PlanCommands {
    /// Plan an objective
    #[command(alias = "c")]
    Create(CreatePlanArgs),
    /// Show a plan with its steps
    #[command(alias = "s")]
    Show(PlanIdArgs),
    /// Show progress, current steps and recent messages
    #[command(alias = "st")]
    Status(PlanIdArgs),
    /// List the messages a plan produced
    #[command(alias = "m")]
    Messages(PlanIdArgs),
    /// Run the approved steps of a plan
    #[command(aliases = ["x", "run"])]
    Execute(ExecutePlanArgs),
    /// Stop a plan from starting new steps
    Cancel(PlanIdArgs),
}

/// Approve a step for execution
#[derive(ClapArgs)]
pub struct ApproveStepArgs {
    /// ID of the step
    #[arg(help = "Unique identifier of the step to approve")]
    pub id: u64,
    /// Note for the agent running the step
    #[arg(short, long, help = "Note passed to the agent with the step context")]
    pub feedback: Option<String>,
}

impl From<WithSession<ApproveStepArgs>> for ApproveStep {
    fn from(val: WithSession<ApproveStepArgs>) -> Self {
        ApproveStep {
            session_id: val.session_id,
            step_id: val.args.id,
            approved: true,
            feedback: val.args.feedback,
        }
    }
}

/// Reject a step; its open dependents are skipped
#[derive(ClapArgs)]
pub struct RejectStepArgs {
    /// ID of the step
    #[arg(help = "Unique identifier of the step to reject")]
    pub id: u64,
    /// Why the step was rejected
    #[arg(short, long, help = "Why the step was rejected")]
    pub reason: String,
}

impl From<WithSession<RejectStepArgs>> for ApproveStep {
    fn from(val: WithSession<RejectStepArgs>) -> Self {
        ApproveStep {
            session_id: val.session_id,
            step_id: val.args.id,
            approved: false,
            feedback: Some(val.args.reason),
        }
    }
}

#[derive(Subcommand)]
pub enum StepCommands {
    /// Approve a step for execution
    #[command(alias = "a")]
    Approve(ApproveStepArgs),
    /// Reject a step
    #[command(alias = "r")]
    Reject(RejectStepArgs),
}

/// Delete every plan, step and message of a session
#[derive(ClapArgs)]
pub struct DeleteSessionArgs {
    /// ID of the session to delete
    #[arg(help = "Identifier of the session to delete")]
    pub id: String,
    /// Confirm the deletion (required to prevent accidental deletion)
    #[arg(long)]
    pub confirm: bool,
}

#[derive(Subcommand)]
pub enum SessionCommands {
    /// Delete a session and everything in it
    #[command(aliases = ["d", "rm"])]
    Delete(DeleteSessionArgs),
}

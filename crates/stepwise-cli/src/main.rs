//! Stepwise CLI Application
//!
//! Command-line front end for the stepwise orchestration engine. Agents
//! and the planner are external programs registered with `--agent` and
//! `--planner`.

mod args;
mod cli;
mod process;
mod renderer;

use std::{fs, sync::Arc};

use anyhow::{Context, Result};
use args::{AgentSpec, Args, Commands};
use clap::Parser;
use cli::Cli;
use log::info;
use process::{CommandProposer, ProcessAgent};
use renderer::TerminalRenderer;
use stepwise_core::{EngineConfig, OrchestratorBuilder, StaticProposer};
use Commands::*;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let Args {
        database_file,
        no_color,
        session,
        agents,
        synthesis_agents,
        planner,
        command,
    } = Args::parse();

    let mut config = EngineConfig::default();
    if !synthesis_agents.is_empty() {
        config.synthesis_agents = synthesis_agents;
    }
    if let Some(max_parallel) = command.max_parallel() {
        config.max_parallel = max_parallel.max(1);
    }

    let mut builder = OrchestratorBuilder::new()
        .with_database_path(database_file)
        .with_config(config);
    for AgentSpec { name, program } in agents {
        builder = builder.with_agent(Arc::new(ProcessAgent::new(name, program)));
    }
    if let Some(path) = command.proposal_file() {
        let proposal = fs::read_to_string(path)
            .with_context(|| format!("Failed to read proposal file {}", path.display()))?;
        builder = builder.with_proposer(Arc::new(StaticProposer::new(proposal)));
    } else if let Some(program) = planner {
        builder = builder.with_proposer(Arc::new(CommandProposer::new(program)));
    }

    let orchestrator = builder
        .build()
        .await
        .context("Failed to initialize orchestrator")?;

    let renderer = TerminalRenderer::new(!no_color);
    let cli = Cli::new(orchestrator, renderer, session);

    info!("Stepwise started");

    match command {
        Plan { command } => cli.handle_plan_command(command).await,
        Step { command } => cli.handle_step_command(command).await,
        Session { command } => cli.handle_session_command(command).await,
    }
}

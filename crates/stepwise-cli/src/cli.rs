//! Command handlers.
//!
//! Each handler converts its clap arguments into core parameters, calls the
//! orchestrator and renders the result through the core display wrappers.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use log::{info, warn};
use stepwise_core::{
    display::{ApprovalResult, CreateResult, DeletionResult, Messages, OperationStatus},
    params::{ApproveStep, CreatePlan, ExecutePlan, ListMessages, PlanRef},
    Orchestrator, StatusUpdate,
};
use tokio_stream::StreamExt;

use crate::{
    args::{
        DeleteSessionArgs, ExecutePlanArgs, PlanCommands, PlanIdArgs, SessionCommands,
        StepCommands, WithSession,
    },
    renderer::TerminalRenderer,
};

pub struct Cli {
    orchestrator: Arc<Orchestrator>,
    renderer: TerminalRenderer,
    session: String,
}

impl Cli {
    pub fn new(orchestrator: Orchestrator, renderer: TerminalRenderer, session: String) -> Self {
        Self {
            orchestrator: Arc::new(orchestrator),
            renderer,
            session,
        }
    }

    fn plan_ref(&self, args: PlanIdArgs) -> PlanRef {
        WithSession::new(&self.session, args).into()
    }

    pub async fn handle_plan_command(&self, command: PlanCommands) -> Result<()> {
        match command {
            PlanCommands::Create(args) => {
                let params: CreatePlan = WithSession::new(&self.session, args).into();
                let plan = self
                    .orchestrator
                    .create_plan(&params)
                    .await
                    .context("Failed to create plan")?;
                self.renderer.render(&CreateResult::new(plan).to_string());
            }
            PlanCommands::Show(args) => {
                let params = self.plan_ref(args);
                let plan = self
                    .orchestrator
                    .get_plan(&params)
                    .await
                    .context("Failed to load plan")?;
                match plan {
                    Some(plan) => self.renderer.render(&plan.to_string()),
                    None => bail!("Plan with ID {} not found", params.plan_id),
                }
            }
            PlanCommands::Status(args) => {
                let snapshot = self
                    .orchestrator
                    .get_status(&self.plan_ref(args))
                    .await
                    .context("Failed to get plan status")?;
                self.renderer.render(&snapshot.to_string());
            }
            PlanCommands::Messages(args) => {
                let params = ListMessages {
                    session_id: self.session.clone(),
                    plan_id: Some(args.id),
                };
                let messages = self
                    .orchestrator
                    .get_messages(&params)
                    .await
                    .context("Failed to list messages")?;
                self.renderer.render(&Messages(messages).to_string());
            }
            PlanCommands::Execute(args) => self.execute(args).await?,
            PlanCommands::Cancel(args) => {
                let params = self.plan_ref(args);
                self.orchestrator
                    .cancel_plan(&params)
                    .await
                    .context("Failed to cancel plan")?;
                let status = OperationStatus::success(format!(
                    "Cancellation requested for plan {}",
                    params.plan_id
                ));
                self.renderer.render(&status.to_string());
            }
        }
        Ok(())
    }

    /// Streams progress while the plan runs; Ctrl-C requests cancellation
    /// and waits for the executing steps to finish.
    async fn execute(&self, args: ExecutePlanArgs) -> Result<()> {
        let params = ExecutePlan {
            session_id: self.session.clone(),
            plan_id: args.id,
            schedule: args.schedule(),
        };
        let plan_ref = PlanRef {
            session_id: params.session_id.clone(),
            plan_id: params.plan_id,
        };

        let (mut updates, handle) = self.orchestrator.execute_plan_stream(params);
        let mut cancelled = false;
        loop {
            tokio::select! {
                update = updates.next() => match update {
                    Some(StatusUpdate::Finished(_)) => {}
                    Some(update) => self.renderer.progress(&update.to_string()),
                    None => break,
                },
                signal = tokio::signal::ctrl_c(), if !cancelled => {
                    cancelled = true;
                    if let Err(e) = signal {
                        warn!("Failed to listen for Ctrl-C: {e}");
                        continue;
                    }
                    info!("Interrupted; cancelling plan {}", plan_ref.plan_id);
                    self.orchestrator
                        .cancel_plan(&plan_ref)
                        .await
                        .context("Failed to cancel plan")?;
                    self.renderer
                        .progress("Cancellation requested; waiting for running steps to finish");
                }
            }
        }

        let outcome = handle
            .await
            .context("Execution task panicked")?
            .context("Failed to execute plan")?;
        self.renderer.render(&outcome.to_string());
        Ok(())
    }

    pub async fn handle_step_command(&self, command: StepCommands) -> Result<()> {
        let params: ApproveStep = match command {
            StepCommands::Approve(args) => WithSession::new(&self.session, args).into(),
            StepCommands::Reject(args) => WithSession::new(&self.session, args).into(),
        };
        let action = if params.approved { "approve" } else { "reject" };
        let step = self
            .orchestrator
            .approve_step(&params)
            .await
            .with_context(|| format!("Failed to {action} step {}", params.step_id))?;
        self.renderer.render(&ApprovalResult::new(step).to_string());
        Ok(())
    }

    pub async fn handle_session_command(&self, command: SessionCommands) -> Result<()> {
        match command {
            SessionCommands::Delete(DeleteSessionArgs { id, confirm }) => {
                if !confirm {
                    bail!("Refusing to delete session '{id}' without --confirm");
                }
                let deletion = self
                    .orchestrator
                    .delete_session(&id)
                    .await
                    .context("Failed to delete session")?;
                let result = DeletionResult {
                    session_id: &id,
                    deletion,
                };
                self.renderer.render(&result.to_string());
            }
        }
        Ok(())
    }
}

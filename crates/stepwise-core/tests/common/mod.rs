//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::{
    sync::{
        atomic::{AtomicU32, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;
use serde_json::Value;
use stepwise_core::{
    agent::{Agent, AgentError, AgentReply},
    models::{DraftStep, ExecutionOutcome, Plan, Step},
    params::{ApproveStep, CreatePlan, CreatePlanWithSteps, ExecutePlan, PlanRef},
    DispatchSchedule, EngineConfig, Orchestrator, OrchestratorBuilder, Result, RetryPolicy,
};
use tempfile::TempDir;
use tokio::sync::mpsc;

pub const SESSION: &str = "s1";

/// One recorded invocation.
#[derive(Debug, Clone)]
pub struct Call {
    pub task: String,
    pub context: Value,
}

/// Replies with `"<name>: <task>"` and records every call.
pub struct Recorder {
    name: &'static str,
    delay: Duration,
    calls: Mutex<Vec<Call>>,
}

impl Recorder {
    pub fn new(name: &'static str) -> Arc<Self> {
        Self::slow(name, Duration::ZERO)
    }

    pub fn slow(name: &'static str, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            name,
            delay,
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl Agent for Recorder {
    fn name(&self) -> &str {
        self.name
    }

    fn capabilities(&self) -> Vec<String> {
        vec![self.name.to_string()]
    }

    async fn run(&self, task: &str, context: &Value) -> std::result::Result<AgentReply, AgentError> {
        self.calls.lock().unwrap().push(Call {
            task: task.to_string(),
            context: context.clone(),
        });
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(AgentReply::text(format!("{}: {task}", self.name)))
    }
}

/// Fails with `error` for the first `failures` calls, then succeeds.
pub struct Flaky {
    name: &'static str,
    failures: u32,
    error: AgentError,
    calls: AtomicU32,
}

impl Flaky {
    pub fn new(name: &'static str, failures: u32, error: AgentError) -> Arc<Self> {
        Arc::new(Self {
            name,
            failures,
            error,
            calls: AtomicU32::new(0),
        })
    }

    /// Never succeeds.
    pub fn always(name: &'static str, error: AgentError) -> Arc<Self> {
        Self::new(name, u32::MAX, error)
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Agent for Flaky {
    fn name(&self) -> &str {
        self.name
    }

    fn capabilities(&self) -> Vec<String> {
        Vec::new()
    }

    async fn run(&self, task: &str, _context: &Value) -> std::result::Result<AgentReply, AgentError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call <= self.failures {
            Err(self.error.clone())
        } else {
            Ok(AgentReply::text(format!("{}: {task}", self.name)))
        }
    }
}

/// Engine settings with short retry delays.
pub fn test_config() -> EngineConfig {
    EngineConfig {
        retry: RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(5),
            max_delay: Duration::from_millis(20),
        },
        agent_timeout: Duration::from_secs(5),
        ..EngineConfig::default()
    }
}

pub async fn create_test_orchestrator(
    agents: Vec<Arc<dyn Agent>>,
    config: EngineConfig,
) -> (Arc<Orchestrator>, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let mut builder = OrchestratorBuilder::new()
        .with_database_path(Some(temp_dir.path().join("test.db")))
        .with_config(config);
    for agent in agents {
        builder = builder.with_agent(agent);
    }
    (Arc::new(builder.build().await.unwrap()), temp_dir)
}

pub async fn create_plan(orchestrator: &Orchestrator, steps: Vec<DraftStep>, fail_fast: bool) -> Plan {
    orchestrator
        .create_plan_with_steps(&CreatePlanWithSteps {
            plan: CreatePlan {
                session_id: SESSION.to_string(),
                user_id: "u1".to_string(),
                objective: "Analyze AAPL".to_string(),
                file_refs: Vec::new(),
                fail_fast,
            },
            steps,
        })
        .await
        .unwrap()
}

pub async fn decide(orchestrator: &Orchestrator, step_id: u64, approved: bool) -> Result<Step> {
    orchestrator
        .approve_step(&ApproveStep {
            session_id: SESSION.to_string(),
            step_id,
            approved,
            feedback: None,
        })
        .await
}

pub async fn approve(orchestrator: &Orchestrator, step_id: u64) -> Step {
    decide(orchestrator, step_id, true).await.unwrap()
}

pub async fn execute(orchestrator: &Orchestrator, plan_id: u64) -> Result<ExecutionOutcome> {
    execute_with(orchestrator, plan_id, DispatchSchedule::default()).await
}

pub async fn execute_with(
    orchestrator: &Orchestrator,
    plan_id: u64,
    schedule: DispatchSchedule,
) -> Result<ExecutionOutcome> {
    let (sender, _receiver) = mpsc::unbounded_channel();
    orchestrator
        .execute_plan(
            &ExecutePlan {
                session_id: SESSION.to_string(),
                plan_id,
                schedule,
            },
            &sender,
        )
        .await
}

pub async fn reload(orchestrator: &Orchestrator, plan_id: u64) -> Plan {
    orchestrator
        .get_plan(&PlanRef {
            session_id: SESSION.to_string(),
            plan_id,
        })
        .await
        .unwrap()
        .unwrap()
}

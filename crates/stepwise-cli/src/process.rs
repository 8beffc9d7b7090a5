//! Agents and planners backed by external programs.
//!
//! An agent program receives `{"task": ..., "context": ...}` as JSON on
//! stdin and answers on stdout, either with `{"content": ..., "metadata":
//! ...}` or with plain text. Exit status 75 (`EX_TEMPFAIL`) reports a
//! transient failure worth retrying; any other non-zero status is
//! permanent. Timeouts are enforced by the dispatcher, which drops the
//! invocation and with it the child process.

use std::process::{Output, Stdio};

use async_trait::async_trait;
use log::debug;
use serde::Serialize;
use serde_json::Value;
use stepwise_core::{
    planning::{PlanProposer, ProposalRequest},
    Agent, AgentError, AgentReply,
};
use tokio::{io::AsyncWriteExt, process::Command};

const EX_TEMPFAIL: i32 = 75;

#[derive(Serialize)]
struct AgentRequest<'a> {
    task: &'a str,
    context: &'a Value,
}

/// Splits `PROGRAM` into the executable and its arguments.
fn command_for(program: &str) -> Option<Command> {
    let mut words = program.split_whitespace();
    let executable = words.next()?;
    let mut command = Command::new(executable);
    command
        .args(words)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    Some(command)
}

/// Runs `program` with `input` on stdin and collects its output.
async fn run_program(program: &str, input: &[u8]) -> std::io::Result<Output> {
    let mut command = command_for(program).ok_or_else(|| {
        std::io::Error::new(std::io::ErrorKind::InvalidInput, "empty program")
    })?;
    let mut child = command.spawn()?;

    if let Some(mut stdin) = child.stdin.take() {
        // Programs that ignore their input may exit before reading it.
        if let Err(e) = stdin.write_all(input).await {
            if e.kind() != std::io::ErrorKind::BrokenPipe {
                return Err(e);
            }
        }
    }

    child.wait_with_output().await
}

fn stderr_text(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).trim().to_string()
}

/// Interprets agent stdout: a JSON reply object, or plain text.
fn parse_reply(stdout: &[u8]) -> Result<AgentReply, AgentError> {
    let text = String::from_utf8_lossy(stdout);
    let text = text.trim();
    if text.is_empty() {
        return Err(AgentError::MalformedResponse("agent produced no output".to_string()));
    }
    match serde_json::from_str::<AgentReply>(text) {
        Ok(reply) => Ok(reply),
        Err(_) => Ok(AgentReply::text(text)),
    }
}

/// An agent implemented by an external program.
pub struct ProcessAgent {
    name: String,
    program: String,
}

impl ProcessAgent {
    pub fn new(name: impl Into<String>, program: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            program: program.into(),
        }
    }
}

#[async_trait]
impl Agent for ProcessAgent {
    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> Vec<String> {
        vec![self.name.clone()]
    }

    async fn run(&self, task: &str, context: &Value) -> Result<AgentReply, AgentError> {
        let input = serde_json::to_vec(&AgentRequest { task, context })
            .map_err(|e| AgentError::InvalidInput(e.to_string()))?;

        debug!("Running agent {} via '{}'", self.name, self.program);
        let output = run_program(&self.program, &input).await.map_err(|e| {
            AgentError::Permanent(format!("failed to run '{}': {e}", self.program))
        })?;

        match output.status.code() {
            Some(0) => parse_reply(&output.stdout),
            Some(EX_TEMPFAIL) => Err(AgentError::Transient(stderr_text(&output))),
            _ => Err(AgentError::Permanent(format!(
                "'{}' exited with {}: {}",
                self.program,
                output.status,
                stderr_text(&output)
            ))),
        }
    }
}

/// A plan proposer implemented by an external program.
///
/// The program reads the rendered planning prompt on stdin and writes its
/// proposal to stdout.
pub struct CommandProposer {
    program: String,
}

impl CommandProposer {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

#[async_trait]
impl PlanProposer for CommandProposer {
    async fn propose(&self, request: &ProposalRequest<'_>) -> Result<String, String> {
        let output = run_program(&self.program, request.prompt().as_bytes())
            .await
            .map_err(|e| format!("failed to run planner '{}': {e}", self.program))?;

        if !output.status.success() {
            return Err(format!(
                "planner '{}' exited with {}: {}",
                self.program,
                output.status,
                stderr_text(&output)
            ));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

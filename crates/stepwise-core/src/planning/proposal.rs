//! Parsing and validation of proposed plans.

use std::fmt::Write;

use serde::Deserialize;
use thiserror::Error;

use crate::{
    agent::{AgentDescriptor, AgentRegistry},
    error::EngineError,
    graph::validate_dependencies,
    models::DraftStep,
};

/// Why a proposal was refused. The message is fed back to the proposer as
/// the corrective instruction for the next attempt.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProposalError {
    #[error("the response did not contain a JSON object")]
    NoJson,
    #[error("the JSON did not match the plan schema: {0}")]
    Schema(String),
    #[error("the plan has {count} steps but must have between {min} and {max}")]
    StepCount { count: usize, min: usize, max: usize },
    #[error("step {index} has an empty description")]
    EmptyDescription { index: usize },
    #[error("step {index} names neither an agent nor a capability")]
    MissingAgent { index: usize },
    #[error("step {index} uses unknown agent '{name}'")]
    UnknownAgent { index: usize, name: String },
    #[error("step {index} asks for capability '{capability}', which no agent provides")]
    UnknownCapability { index: usize, capability: String },
    #[error("step {step} depends on step {dependency}; dependencies must point to earlier steps")]
    ForwardDependency { step: u32, dependency: u32 },
    #[error("the proposer failed: {0}")]
    Proposer(String),
}

#[derive(Debug, Deserialize)]
struct RawProposal {
    steps: Vec<RawStep>,
}

#[derive(Debug, Deserialize)]
struct RawStep {
    description: String,
    #[serde(default)]
    agent: Option<String>,
    #[serde(default)]
    capability: Option<String>,
    #[serde(default)]
    depends_on: Vec<u32>,
}

/// What a proposer is asked for.
#[derive(Debug, Clone, Copy)]
pub struct ProposalRequest<'a> {
    pub objective: &'a str,
    pub file_refs: &'a [String],
    pub catalog: &'a [AgentDescriptor],
    pub min_steps: usize,
    pub max_steps: usize,
    /// 1-based attempt number
    pub attempt: u32,
    /// Why the previous attempt was refused
    pub correction: Option<&'a str>,
}

impl ProposalRequest<'_> {
    /// Renders the request as a prompt for text-completion proposers.
    pub fn prompt(&self) -> String {
        let mut prompt = String::new();
        let _ = writeln!(prompt, "Objective:\n{}\n", self.objective.trim());

        if !self.file_refs.is_empty() {
            prompt.push_str("Referenced files:\n");
            for file in self.file_refs {
                let _ = writeln!(prompt, "- {file}");
            }
            prompt.push('\n');
        }

        prompt.push_str("Agent Catalog:\n");
        for agent in self.catalog {
            let _ = writeln!(
                prompt,
                "- name: {}\n  capabilities: {}",
                agent.name,
                agent.capabilities.join(", ")
            );
        }

        prompt.push_str("\nPlanning Rules:\n");
        let _ = writeln!(
            prompt,
            "1) Use between {} and {} steps.",
            self.min_steps, self.max_steps
        );
        prompt.push_str("2) Every step names an agent from the catalog, or a capability one of them lists.\n");
        prompt.push_str("3) depends_on lists indexes (0-based) of earlier steps only.\n");
        prompt.push_str("4) Return ONLY one JSON object of the shape:\n");
        prompt.push_str(
            r#"{"steps":[{"description":"...","agent":"agent_name","depends_on":[0]}]}"#,
        );
        prompt.push('\n');

        if let Some(correction) = self.correction {
            let _ = writeln!(
                prompt,
                "\nYour previous answer (attempt {}) was rejected: {correction}\nFix it and answer again.",
                self.attempt.saturating_sub(1)
            );
        }
        prompt
    }
}

/// Returns the outermost `{...}` of `text`, dropping surrounding prose or
/// code fences.
pub fn extract_json(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

/// Parses and validates a proposal into ordered draft steps.
///
/// Capabilities are resolved to a concrete agent through the registry.
pub fn parse_proposal(
    text: &str,
    registry: &AgentRegistry,
    min_steps: usize,
    max_steps: usize,
) -> Result<Vec<DraftStep>, ProposalError> {
    let json = extract_json(text).ok_or(ProposalError::NoJson)?;
    let raw: RawProposal =
        serde_json::from_str(json).map_err(|e| ProposalError::Schema(e.to_string()))?;

    let count = raw.steps.len();
    if count < min_steps || count > max_steps {
        return Err(ProposalError::StepCount {
            count,
            min: min_steps,
            max: max_steps,
        });
    }

    let drafts = raw
        .steps
        .into_iter()
        .enumerate()
        .map(|(index, step)| resolve_step(index, step, registry))
        .collect::<Result<Vec<_>, _>>()?;

    let dependencies: Vec<Vec<u32>> = drafts.iter().map(|d| d.depends_on.clone()).collect();
    validate_dependencies(&dependencies).map_err(|e| match e {
        EngineError::DependencyCycle { step, dependency } => {
            ProposalError::ForwardDependency { step, dependency }
        }
        other => ProposalError::Schema(other.to_string()),
    })?;

    Ok(drafts)
}

fn resolve_step(
    index: usize,
    step: RawStep,
    registry: &AgentRegistry,
) -> Result<DraftStep, ProposalError> {
    let description = step.description.trim();
    if description.is_empty() {
        return Err(ProposalError::EmptyDescription { index });
    }

    let agent_name = match (step.agent, step.capability) {
        (Some(name), _) if registry.contains(&name) => name,
        (Some(name), None) => return Err(ProposalError::UnknownAgent { index, name }),
        // an unknown agent name with a usable capability still resolves
        (_, Some(capability)) => registry
            .find_by_capability(&capability)
            .map(str::to_string)
            .ok_or(ProposalError::UnknownCapability { index, capability })?,
        (None, None) => return Err(ProposalError::MissingAgent { index }),
    };

    let mut depends_on = step.depends_on;
    depends_on.sort_unstable();
    depends_on.dedup();

    Ok(DraftStep {
        description: description.to_string(),
        agent_name,
        depends_on,
    })
}

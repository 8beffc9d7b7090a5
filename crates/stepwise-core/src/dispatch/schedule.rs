//! Per-phase dispatch modes.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::models::Step;

/// How a batch of ready steps is dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DispatchMode {
    /// One step at a time, in order; each step's message is committed
    /// before the next step starts
    Sequential,
    /// Every ready step of the phase at once, joined before readiness is
    /// re-evaluated
    #[default]
    Concurrent,
}

impl FromStr for DispatchMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sequential" => Ok(DispatchMode::Sequential),
            "concurrent" => Ok(DispatchMode::Concurrent),
            _ => Err(format!("Invalid dispatch mode: {s}")),
        }
    }
}

impl fmt::Display for DispatchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchMode::Sequential => write!(f, "sequential"),
            DispatchMode::Concurrent => write!(f, "concurrent"),
        }
    }
}

/// Mode that applies from `from_order` up to the next phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Phase {
    pub from_order: u32,
    pub mode: DispatchMode,
}

/// Dispatch modes keyed by step order ranges.
///
/// ```rust
/// use stepwise_core::dispatch::{DispatchMode, DispatchSchedule};
///
/// // Fan out the data-gathering steps, then narrate the rest in order.
/// let schedule = DispatchSchedule::concurrent().then_from(3, DispatchMode::Sequential);
/// assert_eq!(schedule.mode_for(1), DispatchMode::Concurrent);
/// assert_eq!(schedule.mode_for(4), DispatchMode::Sequential);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchSchedule {
    phases: Vec<Phase>,
}

impl DispatchSchedule {
    pub fn uniform(mode: DispatchMode) -> Self {
        Self {
            phases: vec![Phase {
                from_order: 0,
                mode,
            }],
        }
    }

    pub fn sequential() -> Self {
        Self::uniform(DispatchMode::Sequential)
    }

    pub fn concurrent() -> Self {
        Self::uniform(DispatchMode::Concurrent)
    }

    /// Switches to `mode` for steps with order ≥ `from_order`.
    pub fn then_from(mut self, from_order: u32, mode: DispatchMode) -> Self {
        self.phases.retain(|phase| phase.from_order != from_order);
        self.phases.push(Phase { from_order, mode });
        self.phases.sort_by_key(|phase| phase.from_order);
        self
    }

    pub fn phases(&self) -> &[Phase] {
        &self.phases
    }

    /// Index of the phase covering `order`.
    fn phase_index(&self, order: u32) -> Option<usize> {
        self.phases.iter().rposition(|phase| phase.from_order <= order)
    }

    pub fn mode_for(&self, order: u32) -> DispatchMode {
        self.phase_index(order)
            .map(|i| self.phases[i].mode)
            .unwrap_or_default()
    }

    /// Picks the next batch from `ready` (sorted by order).
    ///
    /// The lowest-order ready step decides the phase. Sequential phases
    /// dispatch that step alone; concurrent phases dispatch every ready step
    /// in the same phase, up to `max_parallel`.
    pub fn select_batch<'a>(&self, ready: &[&'a Step], max_parallel: usize) -> Vec<&'a Step> {
        let Some(first) = ready.first() else {
            return Vec::new();
        };
        let phase = self.phase_index(first.order);
        match self.mode_for(first.order) {
            DispatchMode::Sequential => vec![*first],
            DispatchMode::Concurrent => ready
                .iter()
                .copied()
                .filter(|step| self.phase_index(step.order) == phase)
                .take(max_parallel.max(1))
                .collect(),
        }
    }
}

impl Default for DispatchSchedule {
    fn default() -> Self {
        Self::concurrent()
    }
}

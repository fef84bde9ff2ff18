//! Per-statement run state machine

use crate::error::ResolutionError;
use std::time::{Duration, Instant};

/// Phases a statement passes through, in order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RunPhase {
    Unstarted,
    CteResolution,
    SubqueryHoisting,
    TableResolution,
    SharedConditionHarvest,
    ProjectionResolution,
    Done,
    /// Terminal state of a statement that raised in any phase
    Unprocessed,
}

impl std::fmt::Display for RunPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Unstarted => "unstarted",
            Self::CteResolution => "cte_resolution",
            Self::SubqueryHoisting => "subquery_hoisting",
            Self::TableResolution => "table_resolution",
            Self::SharedConditionHarvest => "shared_condition_harvest",
            Self::ProjectionResolution => "projection_resolution",
            Self::Done => "done",
            Self::Unprocessed => "unprocessed",
        };
        f.write_str(name)
    }
}

/// Current phase plus the statement's wall-clock budget
#[derive(Debug)]
pub struct RunState {
    phase: RunPhase,
    started: Instant,
    budget: Option<Duration>,
}

impl RunState {
    pub fn new(budget: Option<Duration>) -> Self {
        Self {
            phase: RunPhase::Unstarted,
            started: Instant::now(),
            budget,
        }
    }

    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    /// Move forward to `next`; phases may be skipped but never revisited
    pub fn advance(&mut self, next: RunPhase) -> Result<(), ResolutionError> {
        if next <= self.phase || self.phase >= RunPhase::Done || next == RunPhase::Unprocessed {
            return Err(ResolutionError::PhaseOrder {
                from: self.phase,
                to: next,
            });
        }
        self.check_budget()?;

        tracing::trace!(from = %self.phase, to = %next, "phase transition");
        self.phase = next;
        Ok(())
    }

    /// Mark the statement as unprocessed
    pub fn fail(&mut self) {
        self.phase = RunPhase::Unprocessed;
    }

    /// Error if the budget has run out
    pub fn check_budget(&self) -> Result<(), ResolutionError> {
        match self.budget {
            Some(budget) if self.started.elapsed() >= budget => {
                Err(ResolutionError::BudgetExceeded {
                    budget_ms: budget.as_millis(),
                })
            }
            _ => Ok(()),
        }
    }
}

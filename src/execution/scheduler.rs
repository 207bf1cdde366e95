//! Job scheduler - determines which jobs to run next

use crate::core::Workflow;
use std::fmt;
use std::str::FromStr;

/// Strategy for scheduling job execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SchedulingStrategy {
    /// Execute jobs in dependency order, one at a time
    #[default]
    Sequential,

    /// Execute all ready jobs in parallel
    Parallel,

    /// Limited parallelism (max N concurrent jobs)
    LimitedParallel(usize),
}

impl FromStr for SchedulingStrategy {
    type Err = anyhow::Error;

    /// `sequential`, `parallel`, or `limited:<n>`
    fn from_str(raw: &str) -> anyhow::Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "sequential" | "seq" => Ok(SchedulingStrategy::Sequential),
            "parallel" => Ok(SchedulingStrategy::Parallel),
            other => {
                let Some(n) = other.strip_prefix("limited:") else {
                    anyhow::bail!(
                        "unknown strategy '{}' (expected sequential, parallel or limited:<n>)",
                        raw
                    );
                };
                match n.parse::<usize>() {
                    Ok(0) | Err(_) => anyhow::bail!("'{}' needs a positive job limit", raw),
                    Ok(n) => Ok(SchedulingStrategy::LimitedParallel(n)),
                }
            }
        }
    }
}

impl fmt::Display for SchedulingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchedulingStrategy::Sequential => write!(f, "sequential"),
            SchedulingStrategy::Parallel => write!(f, "parallel"),
            SchedulingStrategy::LimitedParallel(n) => write!(f, "limited:{}", n),
        }
    }
}

/// Scheduler for determining which jobs to run
#[derive(Debug, Clone, Default)]
pub struct JobScheduler {
    strategy: SchedulingStrategy,
}

impl JobScheduler {
    pub fn new(strategy: SchedulingStrategy) -> Self {
        Self { strategy }
    }

    pub fn strategy(&self) -> SchedulingStrategy {
        self.strategy
    }

    /// Get the next batch of jobs to execute, in execution order
    pub fn next_jobs(&self, workflow: &Workflow) -> Vec<String> {
        let ready = workflow.ready_jobs();
        let limit = match self.strategy {
            SchedulingStrategy::Sequential => 1,
            SchedulingStrategy::Parallel => ready.len(),
            SchedulingStrategy::LimitedParallel(max) => {
                max.saturating_sub(workflow.running_jobs().len())
            }
        };

        ready.into_iter().take(limit).map(|j| j.id.clone()).collect()
    }
}

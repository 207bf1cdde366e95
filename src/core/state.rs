//! Execution state models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Overall run status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionStatus {
    /// Run has not started
    Pending,
    /// Run is in progress
    Running,
    /// Every job succeeded
    Completed,
    /// At least one job failed
    Failed,
    /// The event did not match the workflow triggers
    Ignored,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Pending => "Pending",
            ExecutionStatus::Running => "Running",
            ExecutionStatus::Completed => "Completed",
            ExecutionStatus::Failed => "Failed",
            ExecutionStatus::Ignored => "Ignored",
        }
    }

    pub fn parse(raw: &str) -> Self {
        match raw {
            "Running" => ExecutionStatus::Running,
            "Completed" => ExecutionStatus::Completed,
            "Failed" => ExecutionStatus::Failed,
            "Ignored" => ExecutionStatus::Ignored,
            _ => ExecutionStatus::Pending,
        }
    }
}

/// State of a single step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StepState {
    /// Step has not run yet
    Pending,
    /// Step is currently running
    Running {
        started_at: DateTime<Utc>,
        attempt: usize,
    },
    /// Step succeeded
    Completed {
        exit_code: i32,
        output: String,
        attempts: usize,
        started_at: DateTime<Utc>,
        completed_at: DateTime<Utc>,
    },
    /// Step failed in a tolerated way (cache unavailable, continue-on-error)
    Degraded {
        reason: String,
        exit_code: Option<i32>,
        output: String,
        started_at: DateTime<Utc>,
        completed_at: DateTime<Utc>,
    },
    /// Step failed and halted its job
    Failed {
        error: String,
        exit_code: Option<i32>,
        output: String,
        attempts: usize,
        last_started_at: DateTime<Utc>,
        failed_at: DateTime<Utc>,
    },
    /// Step did not run
    Skipped {
        reason: String,
    },
}

impl StepState {
    /// Check if step is in a terminal state
    pub fn is_terminal(&self) -> bool {
        !matches!(self, StepState::Pending | StepState::Running { .. })
    }

    /// Completed or degraded
    pub fn succeeded(&self) -> bool {
        matches!(self, StepState::Completed { .. } | StepState::Degraded { .. })
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, StepState::Failed { .. })
    }
}

/// State of a job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum JobState {
    Pending,
    Running {
        started_at: DateTime<Utc>,
    },
    Completed {
        started_at: DateTime<Utc>,
        completed_at: DateTime<Utc>,
    },
    Failed {
        error: String,
        started_at: DateTime<Utc>,
        failed_at: DateTime<Utc>,
    },
    Skipped {
        reason: String,
    },
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Completed { .. } | JobState::Failed { .. } | JobState::Skipped { .. }
        )
    }

    pub fn succeeded(&self) -> bool {
        matches!(self, JobState::Completed { .. })
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, JobState::Failed { .. })
    }
}

/// Overall run state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunState {
    /// Unique run ID
    pub run_id: Uuid,

    /// Current status
    pub status: ExecutionStatus,

    /// When the run started
    pub started_at: Option<DateTime<Utc>>,

    /// When the run finished
    pub completed_at: Option<DateTime<Utc>>,

    pub total_jobs: usize,
    pub completed_jobs: usize,
    pub failed_jobs: usize,
    pub skipped_jobs: usize,
    pub running_jobs: usize,
}

impl RunState {
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            status: ExecutionStatus::Pending,
            started_at: None,
            completed_at: None,
            total_jobs: 0,
            completed_jobs: 0,
            failed_jobs: 0,
            skipped_jobs: 0,
            running_jobs: 0,
        }
    }

    /// Mark run as started
    pub fn start(&mut self, total_jobs: usize) {
        self.status = ExecutionStatus::Running;
        self.started_at = Some(Utc::now());
        self.total_jobs = total_jobs;
    }

    pub fn complete(&mut self) {
        self.status = ExecutionStatus::Completed;
        self.completed_at = Some(Utc::now());
    }

    pub fn fail(&mut self) {
        self.status = ExecutionStatus::Failed;
        self.completed_at = Some(Utc::now());
    }

    /// Mark run as not triggered
    pub fn ignore(&mut self) {
        let now = Utc::now();
        self.status = ExecutionStatus::Ignored;
        self.started_at = Some(now);
        self.completed_at = Some(now);
    }

    pub fn update_counts(&mut self, completed: usize, failed: usize, skipped: usize, running: usize) {
        self.completed_jobs = completed;
        self.failed_jobs = failed;
        self.skipped_jobs = skipped;
        self.running_jobs = running;
    }

    /// Fraction of jobs in a terminal state (0.0 to 1.0)
    pub fn progress(&self) -> f64 {
        if self.total_jobs == 0 {
            return 0.0;
        }
        (self.completed_jobs + self.failed_jobs + self.skipped_jobs) as f64 / self.total_jobs as f64
    }
}

impl Default for RunState {
    fn default() -> Self {
        Self::new()
    }
}

//! cirun - run push and pull-request CI workflows on the local host

pub mod cache;
pub mod cli;
pub mod core;
pub mod execution;
pub mod persistence;
pub mod runner;
pub mod settings;

// Re-export commonly used types
pub use cache::{CacheConfig, CacheKey, CacheStatus, CompileCache};
pub use core::{
    EventKind, ExecutionStatus, Job, JobContext, RepositoryEvent, Step, StepState, TriggerDecision,
    Workflow,
};
pub use execution::{ExecutionEngine, ExecutionEvent, JobExecutor, SchedulingStrategy};
pub use runner::{LocalRunner, RunnerError, StepOutput, StepRunner};
pub use settings::RunnerSettings;

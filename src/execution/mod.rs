//! Workflow execution engine

pub mod engine;
pub mod events;
pub mod executor;
pub mod scheduler;

pub use engine::ExecutionEngine;
pub use events::{EventBus, EventHandler, ExecutionEvent};
pub use executor::JobExecutor;
pub use scheduler::{JobScheduler, SchedulingStrategy};

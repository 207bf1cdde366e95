//! Execution events and their dispatch

use crate::core::ExecutionStatus;
use std::sync::{Arc, RwLock};
use uuid::Uuid;

/// Events that can occur during a run
#[derive(Debug, Clone)]
pub enum ExecutionEvent {
    RunIgnored {
        run_id: Uuid,
        workflow_name: String,
        reason: String,
    },
    RunStarted {
        run_id: Uuid,
        workflow_name: String,
        total_jobs: usize,
    },
    JobStarted {
        job_id: String,
        runner: String,
        total_steps: usize,
    },
    JobSkipped {
        job_id: String,
        reason: String,
    },
    StepStarted {
        job_id: String,
        step_index: usize,
        step_name: String,
        attempt: usize,
    },
    StepCompleted {
        job_id: String,
        step_index: usize,
        step_name: String,
        duration_ms: u64,
    },
    /// Step failed in a tolerated way
    StepDegraded {
        job_id: String,
        step_index: usize,
        step_name: String,
        reason: String,
    },
    StepFailed {
        job_id: String,
        step_index: usize,
        step_name: String,
        error: String,
        output: String,
    },
    StepSkipped {
        job_id: String,
        step_index: usize,
        step_name: String,
        reason: String,
    },
    StepRetrying {
        job_id: String,
        step_index: usize,
        step_name: String,
        attempt: usize,
        reason: String,
    },
    JobCompleted {
        job_id: String,
        status: ExecutionStatus,
    },
    RunCompleted {
        run_id: Uuid,
        status: ExecutionStatus,
    },
}

/// Type for event handlers
pub type EventHandler = Arc<dyn Fn(ExecutionEvent) + Send + Sync>;

/// Fan-out of events to registered handlers
#[derive(Default)]
pub struct EventBus {
    handlers: RwLock<Vec<EventHandler>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, handler: F)
    where
        F: Fn(ExecutionEvent) + Send + Sync + 'static,
    {
        if let Ok(mut handlers) = self.handlers.write() {
            handlers.push(Arc::new(handler));
        }
    }

    /// Emit an event to all handlers
    pub fn emit(&self, event: ExecutionEvent) {
        // Lock is released before handlers run
        let handlers: Vec<EventHandler> = match self.handlers.read() {
            Ok(handlers) => handlers.clone(),
            Err(_) => return,
        };
        for handler in handlers {
            handler(event.clone());
        }
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count = self.handlers.read().map(|h| h.len()).unwrap_or(0);
        f.debug_struct("EventBus").field("handlers", &count).finish()
    }
}

//! Core domain models for cirun
//!
//! This module defines the workflow definition (triggers, jobs, steps), its
//! YAML configuration, and the runtime state of a run.

pub mod condition;
pub mod config;
pub mod context;
pub mod job;
pub mod state;
pub mod step;
pub mod trigger;
pub mod workflow;

pub use context::*;
pub use job::*;
pub use state::*;
pub use step::*;
pub use trigger::*;
pub use workflow::*;

//! Core domain models for Pipeline
//!
//! This module defines the fundamental data structures that represent
//! pipelines, matrix jobs, steps, and their configuration.

pub mod config;
pub mod context;
pub mod expression;
pub mod job;
pub mod matrix;
pub mod pipeline;
pub mod result;
pub mod secret;
pub mod state;
pub mod step;
pub mod trigger;

pub use context::*;
pub use job::*;
pub use matrix::*;
pub use pipeline::*;
pub use result::*;
pub use secret::*;
pub use state::*;
pub use step::*;
pub use trigger::*;

//! Core types shared across grove: errors and run-scoped context.
//!
//! - [`GroveError`] and [`ErrorContext`] for typed, user-presentable failures
//! - [`GroveContext`] carrying the settings of one invocation
//! - [`OperationContext`] deduplicating messages within one run

pub mod context;
pub mod error;
pub mod operation_context;

pub use context::GroveContext;
pub use error::{ErrorContext, GroveError, user_friendly_error};
pub use operation_context::OperationContext;

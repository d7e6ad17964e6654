//! Utility functions for the posture engine
//!
//! Provides environment variable handling, tracing setup and audit event helpers.

pub mod audit;
pub mod env;
pub mod logging;

pub use audit::create_audit_event;
pub use env::{get_var, load_env, parse_var};
pub use logging::{init_tracing, LogConfig, LogFormat};

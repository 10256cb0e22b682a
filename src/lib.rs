//! Orgstruct - organizational structure and assignment engine
//!
//! Per-organization settings decide which structural concepts exist
//! (divisions, departments, scoped positions, levels, concurrent
//! assignments). Every mutation of the hierarchy is validated against the
//! organization's current settings and tree before it is committed.

pub mod config;
pub mod db;
pub mod entity;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod org;
pub mod routes;
pub mod state;

// Re-export commonly used types
pub use config::Config;
pub use error::{AppError, AppResult};
pub use state::AppState;

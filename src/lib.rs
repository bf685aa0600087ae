//! Deptree - department hierarchy service
//!
//! This crate maintains an organization's department forest: materialized
//! paths, cached child flags, tree-shaped reads and invariant-preserving
//! moves, exposed over a small HTTP API.

pub mod config;
pub mod db;
pub mod entity;
pub mod error;
pub mod handlers;
pub mod hierarchy;
pub mod middleware;
pub mod routes;
pub mod state;
pub mod store;

// Re-export commonly used types
pub use config::Config;
pub use hierarchy::DepartmentHierarchy;
pub use state::AppState;

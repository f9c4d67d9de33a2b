// Library root - exposes modules for integration tests

pub mod auth;
pub mod config;
pub mod database;
pub mod errors;
pub mod handlers;
pub mod logging;
pub mod metrics;
pub mod middleware;
pub mod models;

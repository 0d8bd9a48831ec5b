//! # FinClaw Gateway
//! Localhost HTTP API over the scheduler service, consumed by the dashboard.

pub mod routes;
pub mod server;

pub use server::{AppState, build_router, start};

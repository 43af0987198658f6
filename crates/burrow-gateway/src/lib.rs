//! HTTP gateway for the Burrow URL shortener.
//!
//! Exposes the storage contract over axum routes, issues the owner cookie
//! that ties links to a client, and maps storage errors onto status codes.

pub mod app;
pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod model;
pub mod state;
pub mod telemetry;

pub use app::App;
pub use config::{GatewayConfig, CLI};
pub use state::AppState;

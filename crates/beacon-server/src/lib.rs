//! # beacon-server
//!
//! Axum HTTP + `WebSocket` presence hub.
//!
//! - `WebSocket` gateway: identity assignment, per-connection dispatch
//!   loops, cursor-position fan-out to peers
//! - HTTP endpoints: health check, upgrade route with Origin allow-list
//! - Graceful shutdown via `tokio::signal` + `CancellationToken`

#![deny(unsafe_code)]

pub mod config;
pub mod health;
pub mod server;
pub mod shutdown;
pub mod ws;

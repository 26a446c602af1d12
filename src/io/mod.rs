//! IO modules - external system interfaces
//!
//! This module contains all external IO operations:
//! - `api` - HTTP API for staff devices (hyper)
//! - `remote` - HTTP client implementing the store and auth contracts
//! - `drink_log` - Registered drinks to file (JSONL format)
//! - `prometheus` - Prometheus text exposition served at /metrics

pub mod api;
pub mod drink_log;
pub mod prometheus;
pub mod remote;

// Re-export commonly used types
pub use api::{serve, start_api_server, ApiState, GuestPayload};
pub use drink_log::{create_drink_log, DrinkEntry, DrinkLogSender, DrinkLogWriter};
pub use remote::RemoteBackend;

//! Drinks gateway library
//!
//! Guest code validation, the drink ledger and staff sessions, plus the HTTP
//! surface shared by the gateway and desk binaries and the integration tests.

pub mod domain;
pub mod infra;
pub mod io;
pub mod services;

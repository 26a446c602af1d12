//! Services - business logic and state management
//!
//! This module contains the core business logic services:
//! - `store` - The two-operation guest store interface
//! - `ledger` - In-memory guest ledger with per-code mutation lanes
//! - `session` - Staff login gate and client-side session holder

pub mod ledger;
pub mod session;
pub mod store;

// Re-export commonly used types
pub use ledger::GuestLedger;
pub use session::{Authenticator, Session, SessionGate, SessionToken};
pub use store::GuestStore;

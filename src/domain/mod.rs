//! Domain models - guest codes, guest records and the error taxonomy
//!
//! This module contains the canonical types used throughout the system:
//! - `GuestCode` - validated 6-character code, plus the normalization rules
//! - `GuestRecord` - a guest's drink allowance and consumption
//! - `DrinksError` - every user-visible failure

pub mod code;
pub mod error;
pub mod guest;

// Re-export commonly used types at module level
pub use code::{parse_code, GuestCode, InputSource};
pub use error::{DrinksError, Result};
pub use guest::GuestRecord;

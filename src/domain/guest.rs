//! Guest record and its drink allowance state

use crate::domain::code::GuestCode;
use serde::{Deserialize, Serialize};

/// A guest and how many drinks they have registered against their allowance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuestRecord {
    pub code: GuestCode,
    #[serde(default)]
    pub name: Option<String>,
    pub allowance: u32,
    #[serde(default)]
    pub consumed: u32,
}

impl GuestRecord {
    /// Fresh record with nothing consumed
    ///
    /// # Example
    ///
    /// ```
    /// use drinks_gateway::domain::{GuestCode, GuestRecord};
    ///
    /// let code: GuestCode = "ABC123".parse().unwrap();
    /// let guest = GuestRecord::new(code, Some("João Silva"), 3);
    /// assert!(guest.can_consume_more());
    /// assert_eq!(guest.remaining(), 3);
    /// ```
    pub fn new(code: GuestCode, name: Option<&str>, allowance: u32) -> Self {
        Self { code, name: name.map(str::to_string), allowance, consumed: 0 }
    }

    pub fn with_consumed(mut self, consumed: u32) -> Self {
        self.consumed = consumed;
        self
    }

    #[inline]
    pub fn can_consume_more(&self) -> bool {
        self.consumed < self.allowance
    }

    #[inline]
    pub fn remaining(&self) -> u32 {
        self.allowance.saturating_sub(self.consumed)
    }

    /// Name to show on screen; unnamed guests are labeled by their code
    pub fn display_name(&self) -> String {
        match self.name.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => format!("Guest {}", self.code),
        }
    }

    /// Bump `consumed` by one if the allowance permits.
    ///
    /// Returns false and leaves the record untouched at the limit.
    pub(crate) fn try_consume(&mut self) -> bool {
        if !self.can_consume_more() {
            return false;
        }
        self.consumed += 1;
        true
    }
}

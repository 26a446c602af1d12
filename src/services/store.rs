//! Guest store interface
//!
//! The staff flow only ever needs these two operations, so anything that
//! implements them (the in-memory ledger, the HTTP client) can back it.

use crate::domain::{GuestCode, GuestRecord, Result};
use async_trait::async_trait;
use std::sync::Arc;

#[async_trait]
pub trait GuestStore: Send + Sync {
    /// Fetch the current record for `code`, or `GuestNotFound`
    async fn lookup(&self, code: &GuestCode) -> Result<GuestRecord>;

    /// Add exactly one drink, or fail with `GuestNotFound` / `LimitReached`
    async fn register_drink(&self, code: &GuestCode) -> Result<GuestRecord>;
}

#[async_trait]
impl<S: GuestStore + ?Sized> GuestStore for Arc<S> {
    async fn lookup(&self, code: &GuestCode) -> Result<GuestRecord> {
        (**self).lookup(code).await
    }

    async fn register_drink(&self, code: &GuestCode) -> Result<GuestRecord> {
        (**self).register_drink(code).await
    }
}

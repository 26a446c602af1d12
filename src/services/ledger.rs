//! In-memory guest ledger
//!
//! Owns the code -> record map. Drink registrations for the same code are
//! queued on a per-code async lane and the allowance is re-checked under the
//! map write lock at commit, so rapid repeated taps can never push `consumed`
//! past `allowance`.

use crate::domain::{DrinksError, GuestCode, GuestRecord, Result};
use crate::infra::config::Config;
use crate::infra::metrics::Metrics;
use crate::services::store::GuestStore;
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Per-code mutation lane
type Lane = Arc<tokio::sync::Mutex<()>>;

pub struct GuestLedger {
    records: RwLock<FxHashMap<GuestCode, GuestRecord>>,
    lanes: Mutex<FxHashMap<GuestCode, Lane>>,
    /// Simulated backend latency between queueing and commit
    commit_delay: Duration,
    metrics: Option<Arc<Metrics>>,
}

impl GuestLedger {
    /// Build a ledger from seed records. A later record with the same code
    /// replaces an earlier one.
    pub fn new(guests: impl IntoIterator<Item = GuestRecord>) -> Self {
        let records: FxHashMap<GuestCode, GuestRecord> =
            guests.into_iter().map(|g| (g.code.clone(), g)).collect();

        Self {
            records: RwLock::new(records),
            lanes: Mutex::new(FxHashMap::default()),
            commit_delay: Duration::ZERO,
            metrics: None,
        }
    }

    /// Seed from config, including the configured commit delay
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.guests().iter().cloned())
            .with_commit_delay(Duration::from_millis(config.commit_delay_ms()))
    }

    pub fn with_commit_delay(mut self, delay: Duration) -> Self {
        self.commit_delay = delay;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        metrics.set_guests_seeded(self.len() as u64);
        self.metrics = Some(metrics);
        self
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    /// All records ordered by code
    pub fn snapshot(&self) -> Vec<GuestRecord> {
        let mut guests: Vec<GuestRecord> = self.records.read().values().cloned().collect();
        guests.sort_by(|a, b| a.code.cmp(&b.code));
        guests
    }

    /// Side-effect free read of a single record
    pub fn get(&self, code: &GuestCode) -> Result<GuestRecord> {
        let found = self.records.read().get(code).cloned();

        if let Some(metrics) = &self.metrics {
            metrics.record_lookup(found.is_some());
        }

        match found {
            Some(record) => {
                debug!(code = %code, consumed = %record.consumed, "guest_lookup");
                Ok(record)
            }
            None => {
                debug!(code = %code, "guest_not_found");
                Err(DrinksError::GuestNotFound { code: code.to_string() })
            }
        }
    }

    fn lane(&self, code: &GuestCode) -> Lane {
        self.lanes.lock().entry(code.clone()).or_default().clone()
    }

    /// Register one drink for `code`.
    ///
    /// Callers for the same code are served one at a time. The limit check
    /// happens at commit, after any queueing and commit delay.
    pub async fn register(&self, code: &GuestCode) -> Result<GuestRecord> {
        // Unknown codes never get a lane
        if !self.records.read().contains_key(code) {
            debug!(code = %code, "guest_not_found");
            return Err(DrinksError::GuestNotFound { code: code.to_string() });
        }

        let lane = self.lane(code);
        let _in_flight = lane.lock().await;

        if !self.commit_delay.is_zero() {
            tokio::time::sleep(self.commit_delay).await;
        }

        let outcome = {
            let mut records = self.records.write();
            match records.get_mut(code) {
                None => Err(DrinksError::GuestNotFound { code: code.to_string() }),
                Some(record) => {
                    if record.try_consume() {
                        Ok(record.clone())
                    } else {
                        Err(DrinksError::LimitReached {
                            code: code.to_string(),
                            allowance: record.allowance,
                        })
                    }
                }
            }
        };

        match &outcome {
            Ok(record) => {
                info!(
                    code = %code,
                    consumed = %record.consumed,
                    allowance = %record.allowance,
                    "drink_registered"
                );
                if let Some(metrics) = &self.metrics {
                    metrics.record_drink_registered();
                }
            }
            Err(DrinksError::LimitReached { allowance, .. }) => {
                info!(code = %code, allowance = %allowance, "drink_limit_reached");
                if let Some(metrics) = &self.metrics {
                    metrics.record_limit_reached();
                }
            }
            Err(_) => {}
        }

        outcome
    }
}

#[async_trait]
impl GuestStore for GuestLedger {
    async fn lookup(&self, code: &GuestCode) -> Result<GuestRecord> {
        self.get(code)
    }

    async fn register_drink(&self, code: &GuestCode) -> Result<GuestRecord> {
        self.register(code).await
    }
}

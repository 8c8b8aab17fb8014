//! Per-provider consecutive-failure tracking and circuit breaking

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::BreakerConfig;

use super::ProviderId;

#[derive(Debug, Clone, Copy, Default)]
struct Breaker {
    consecutive_failures: u32,
    /// Set while the circuit is open
    open_until: Option<Instant>,
}

/// Health snapshot of one provider, published over IPC
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderStatus {
    pub provider: ProviderId,
    pub consecutive_failures: u32,
    /// Circuit currently open; calls are skipped
    pub open: bool,
}

/// Consecutive-failure counters and circuit state for every provider
///
/// Owned by the session; components only ever see a `&mut` borrow while the
/// state machine is calling them.
#[derive(Debug, Clone)]
pub struct ProviderHealth {
    failure_threshold: u32,
    cooldown: Duration,
    breakers: BTreeMap<ProviderId, Breaker>,
}

impl ProviderHealth {
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            failure_threshold: config.failure_threshold.max(1),
            cooldown: config.cooldown(),
            breakers: BTreeMap::new(),
        }
    }

    /// Whether a call to `provider` may be attempted at `now`
    ///
    /// An open circuit whose cooldown has expired admits a trial call.
    pub fn is_available(&self, provider: ProviderId, now: Instant) -> bool {
        match self.breakers.get(&provider).and_then(|b| b.open_until) {
            Some(until) => now >= until,
            None => true,
        }
    }

    pub fn consecutive_failures(&self, provider: ProviderId) -> u32 {
        self.breakers
            .get(&provider)
            .map_or(0, |b| b.consecutive_failures)
    }

    /// Reset the provider after a successful call
    pub fn record_success(&mut self, provider: ProviderId) {
        if let Some(breaker) = self.breakers.remove(&provider) {
            if breaker.consecutive_failures > 0 {
                info!(
                    %provider,
                    failures = breaker.consecutive_failures,
                    "provider recovered"
                );
            }
        }
    }

    /// Count a failure; returns true if this failure opened the circuit
    pub fn record_failure(&mut self, provider: ProviderId, now: Instant) -> bool {
        let threshold = self.failure_threshold;
        let cooldown = self.cooldown;
        let breaker = self.breakers.entry(provider).or_default();
        breaker.consecutive_failures = breaker.consecutive_failures.saturating_add(1);

        debug!(
            %provider,
            failures = breaker.consecutive_failures,
            "provider failure recorded"
        );

        if breaker.consecutive_failures >= threshold {
            breaker.open_until = Some(now + cooldown);
            warn!(
                %provider,
                failures = breaker.consecutive_failures,
                cooldown_ms = cooldown.as_millis() as u64,
                "circuit opened"
            );
            true
        } else {
            false
        }
    }

    /// Open the circuit immediately, e.g. when a quota is exhausted
    pub fn trip(&mut self, provider: ProviderId, now: Instant) {
        let threshold = self.failure_threshold;
        let breaker = self.breakers.entry(provider).or_default();
        breaker.consecutive_failures = breaker.consecutive_failures.max(threshold);
        breaker.open_until = Some(now + self.cooldown);
        warn!(%provider, cooldown_ms = self.cooldown.as_millis() as u64, "circuit tripped");
    }

    /// Providers with recorded failures, for status reporting
    pub fn snapshot(&self, now: Instant) -> Vec<ProviderStatus> {
        self.breakers
            .iter()
            .map(|(provider, breaker)| ProviderStatus {
                provider: *provider,
                consecutive_failures: breaker.consecutive_failures,
                open: breaker.open_until.is_some_and(|until| now < until),
            })
            .collect()
    }
}

//! Ambient counters for the broker and agent daemons.
//!
//! Scoped down from the messaging fabric's HTTP-exposed, ring-buffered
//! metrics collector: this system has no queryable metrics endpoint, so a
//! handful of atomic counters logged periodically at `info` level is the
//! whole of it.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters tracked by the broker's event loop.
#[derive(Debug, Default)]
pub struct BrokerMetrics {
    pub requests_accepted: AtomicU64,
    pub requests_rejected: AtomicU64,
    pub results_sunk: AtomicU64,
    pub management_commands: AtomicU64,
}

impl BrokerMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_request_accepted(&self) {
        self.requests_accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_request_rejected(&self) {
        self.requests_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_result_sunk(&self) {
        self.results_sunk.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_management_command(&self) {
        self.management_commands.fetch_add(1, Ordering::Relaxed);
    }

    pub fn log(&self) {
        tracing::info!(
            requests_accepted = self.requests_accepted.load(Ordering::Relaxed),
            requests_rejected = self.requests_rejected.load(Ordering::Relaxed),
            results_sunk = self.results_sunk.load(Ordering::Relaxed),
            management_commands = self.management_commands.load(Ordering::Relaxed),
            "broker metrics"
        );
    }
}

/// Counters tracked by the agent's event loop.
#[derive(Debug, Default)]
pub struct AgentMetrics {
    pub requests_executed: AtomicU64,
    pub requests_rejected: AtomicU64,
    pub management_commands: AtomicU64,
}

impl AgentMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_request_executed(&self) {
        self.requests_executed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_request_rejected(&self) {
        self.requests_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_management_command(&self) {
        self.management_commands.fetch_add(1, Ordering::Relaxed);
    }

    pub fn log(&self) {
        tracing::info!(
            requests_executed = self.requests_executed.load(Ordering::Relaxed),
            requests_rejected = self.requests_rejected.load(Ordering::Relaxed),
            management_commands = self.management_commands.load(Ordering::Relaxed),
            "agent metrics"
        );
    }
}

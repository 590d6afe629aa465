//! Test doubles and common utilities for contract tests
//!
//! The mock client stands in for the appliance: it keeps a protection flag
//! that writes update and reads return, and can be told to fail or stall.

#![allow(dead_code)]

use aghsync_core::error::{Error, Result};
use aghsync_core::{EndpointConfig, EngineEvent, ProtectionClient};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

/// A mock ProtectionClient that tracks calls
pub struct MockProtectionClient {
    /// Protection flag on the fake appliance
    enabled: Arc<AtomicBool>,
    /// Fail every read with Unreachable
    fail_reads: Arc<AtomicBool>,
    /// Fail every write with Unreachable
    fail_writes: Arc<AtomicBool>,
    /// Delay applied to each read
    read_delay: Arc<Mutex<Duration>>,
    /// Call counter for read_status()
    read_count: Arc<AtomicUsize>,
    /// Values passed to write_protection(), in order
    writes: Arc<Mutex<Vec<bool>>>,
    /// Reported session epoch
    epoch: Arc<AtomicU64>,
}

impl MockProtectionClient {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled: Arc::new(AtomicBool::new(enabled)),
            fail_reads: Arc::new(AtomicBool::new(false)),
            fail_writes: Arc::new(AtomicBool::new(false)),
            read_delay: Arc::new(Mutex::new(Duration::ZERO)),
            read_count: Arc::new(AtomicUsize::new(0)),
            writes: Arc::new(Mutex::new(Vec::new())),
            epoch: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Create a new MockProtectionClient that shares state with an existing one
    pub fn sharing_counters_with(other: &Self) -> Self {
        Self {
            enabled: Arc::clone(&other.enabled),
            fail_reads: Arc::clone(&other.fail_reads),
            fail_writes: Arc::clone(&other.fail_writes),
            read_delay: Arc::clone(&other.read_delay),
            read_count: Arc::clone(&other.read_count),
            writes: Arc::clone(&other.writes),
            epoch: Arc::clone(&other.epoch),
        }
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    pub fn enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn set_read_delay(&self, delay: Duration) {
        *self.read_delay.lock().unwrap() = delay;
    }

    /// Simulate a fresh login
    pub fn bump_epoch(&self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
    }

    pub fn read_count(&self) -> usize {
        self.read_count.load(Ordering::SeqCst)
    }

    pub fn writes(&self) -> Vec<bool> {
        self.writes.lock().unwrap().clone()
    }

    pub fn write_count(&self) -> usize {
        self.writes.lock().unwrap().len()
    }
}

#[async_trait::async_trait]
impl ProtectionClient for MockProtectionClient {
    async fn read_status(&self) -> Result<bool> {
        self.read_count.fetch_add(1, Ordering::SeqCst);

        let delay = *self.read_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(Error::unreachable("mock appliance offline"));
        }
        Ok(self.enabled())
    }

    async fn write_protection(&self, enabled: bool) -> Result<()> {
        self.writes.lock().unwrap().push(enabled);

        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Error::unreachable("mock appliance offline"));
        }
        self.set_enabled(enabled);
        Ok(())
    }

    fn session_epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    fn client_name(&self) -> &'static str {
        "mock"
    }
}

/// Create a minimal endpoint configuration for testing
pub fn minimal_config() -> EndpointConfig {
    let mut config = EndpointConfig::new("localhost");
    config.name = "test".to_string();
    config.poll_interval_ms = 50;
    config
}

/// Drain every event currently queued
pub fn drain_events(rx: &mut mpsc::Receiver<EngineEvent>) -> Vec<EngineEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// Let spawned tasks run to completion
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(20)).await;
}

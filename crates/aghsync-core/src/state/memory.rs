// # Memory Timer Store
//
// In-memory implementation of TimerStore.
//
// ## Crash Behavior
//
// - The record is lost on restart
// - A countdown interrupted by a restart is not replayed
//
// ## When to Use
//
// - Testing environments
// - Deployments without a writable storage location

use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::RwLock;

use crate::Error;
use crate::traits::timer_store::{IDLE_RECORD, TimerStore};

/// In-memory timer store implementation
///
/// Clones share the same record, so a test can keep a handle while the
/// scheduler owns another.
#[derive(Debug, Clone, Default)]
pub struct MemoryTimerStore {
    value: Arc<RwLock<Option<String>>>,
    writes: Arc<AtomicUsize>,
}

impl MemoryTimerStore {
    /// Create a store with no record
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store already holding `value`
    pub fn with_value(value: impl Into<String>) -> Self {
        Self {
            value: Arc::new(RwLock::new(Some(value.into()))),
            writes: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Current raw value, if the record exists
    pub async fn peek(&self) -> Option<String> {
        self.value.read().await.clone()
    }

    /// Number of writes performed (including initialization)
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TimerStore for MemoryTimerStore {
    async fn check_or_init(&self) -> Result<(), Error> {
        let mut guard = self.value.write().await;
        if guard.is_none() {
            *guard = Some(IDLE_RECORD.to_string());
            self.writes.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    async fn read(&self) -> Result<String, Error> {
        self.value
            .read()
            .await
            .clone()
            .ok_or_else(|| Error::storage("Timer record not initialized"))
    }

    async fn write(&self, value: &str) -> Result<(), Error> {
        *self.value.write().await = Some(value.to_string());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// # aghsync-core
//
// Core library keeping an AdGuard Home "protection" toggle in sync with a
// smart-home host.
//
// ## Architecture Overview
//
// - **ProtectionClient**: Trait for reading/writing the protection flag (direct or via router)
// - **TimerStore**: Trait for the durable auto-on deadline record
// - **AutoOnScheduler**: Single-slot delayed "turn protection back on" task
// - **ReconciliationEngine**: Polls the appliance and reconciles current vs target
// - **ClientRegistry**: Plugin-based registry for client implementations
//
// ## Design Principles
//
// 1. **Never block the host**: `get` returns cached state; writes run in the background
// 2. **Never lie about reachability**: failures show up as `Jammed`, never as a fake on/off
// 3. **Interval-driven recovery**: no retry loops, the next poll is the retry
// 4. **Durable timers**: a pending auto-on survives a restart

pub mod config;
pub mod device;
pub mod engine;
pub mod error;
pub mod registry;
pub mod scheduler;
pub mod state;
pub mod traits;

// Re-export core types for convenience
pub use config::{EndpointConfig, EngineConfig, WriteEndpoint};
pub use device::{AccessoryKind, DeviceState, HostValue, LockState, TriState};
pub use engine::{EngineEvent, ReconciliationEngine};
pub use error::{Error, Result};
pub use registry::ClientRegistry;
pub use scheduler::{AutoOnScheduler, MAX_AUTO_ON_DELAY};
pub use state::{FileTimerStore, MemoryTimerStore};
pub use traits::{ClientFactory, ProtectionClient, TimerRecord, TimerStore};

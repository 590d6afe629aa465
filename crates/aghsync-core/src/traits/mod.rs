//! Core traits for the aghsync system
//!
//! This module defines the abstract interfaces that all implementations must follow.
//!
//! - [`ProtectionClient`]: Read and write the appliance's protection flag
//! - [`TimerStore`]: Durable record of the pending auto-on deadline

pub mod protection_client;
pub mod timer_store;

pub use protection_client::{ClientFactory, ProtectionClient};
pub use timer_store::{TimerRecord, TimerStore, IDLE_RECORD};

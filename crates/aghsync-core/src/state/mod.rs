// # Timer Store Implementations
//
// This module provides implementations of the TimerStore trait for
// different persistence strategies.

pub mod file;
pub mod memory;

pub use file::FileTimerStore;
pub use memory::MemoryTimerStore;

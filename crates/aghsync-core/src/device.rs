//! Device state model
//!
//! The appliance only has two real states (protection on or off). A third,
//! local-only state, [`TriState::Jammed`], stands for "the last attempt to
//! reach the appliance failed". How these values are shown to the host
//! depends on the [`AccessoryKind`] and nothing else.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Observed state of the appliance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriState {
    /// Protection enabled
    On,
    /// Protection disabled
    Off,
    /// Last reachability check failed; the true state is unknown
    Jammed,
}

impl TriState {
    /// Map an observed protection flag to a tri-state
    pub fn from_enabled(enabled: bool) -> Self {
        if enabled { Self::On } else { Self::Off }
    }

    /// Whether this is the local "unreachable" marker
    pub fn is_jammed(self) -> bool {
        self == Self::Jammed
    }

    /// The protection flag, if known
    pub fn as_bool(self) -> Option<bool> {
        match self {
            Self::On => Some(true),
            Self::Off => Some(false),
            Self::Jammed => None,
        }
    }
}

impl fmt::Display for TriState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::On => f.write_str("on"),
            Self::Off => f.write_str("off"),
            Self::Jammed => f.write_str("jammed"),
        }
    }
}

/// Current/target pair tracked by the reconciliation engine
///
/// `target` never holds `Jammed`: a failed poll only touches `current`, so
/// the last valid intent survives until the appliance is reachable again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceState {
    /// Last known actual state
    pub current: TriState,
    /// Last requested (or last observed) protection flag
    pub target: bool,
}

impl DeviceState {
    /// Initial state: off/off
    pub fn new() -> Self {
        Self {
            current: TriState::Off,
            target: false,
        }
    }
}

impl Default for DeviceState {
    fn default() -> Self {
        Self::new()
    }
}

/// How the accessory is presented to the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum AccessoryKind {
    /// A plain on/off switch
    #[default]
    Switch,
    /// A lock: secured means protection on
    Lock,
}

/// Lock mechanism values understood by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LockState {
    /// Protection on
    Secured,
    /// Protection off
    Unsecured,
    /// Appliance unreachable
    Jammed,
}

/// A state rendered for the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HostValue {
    /// Switch characteristic value
    Switch(bool),
    /// Lock characteristic value
    Lock(LockState),
}

impl AccessoryKind {
    /// Render the current state for the host
    ///
    /// Switches have no way to express "unknown", so `Jammed` renders as off.
    pub fn render_current(self, state: TriState) -> HostValue {
        match self {
            Self::Switch => HostValue::Switch(state == TriState::On),
            Self::Lock => HostValue::Lock(match state {
                TriState::On => LockState::Secured,
                TriState::Off => LockState::Unsecured,
                TriState::Jammed => LockState::Jammed,
            }),
        }
    }

    /// Render the target state for the host
    pub fn render_target(self, target: bool) -> HostValue {
        self.render_current(TriState::from_enabled(target))
    }

    /// Name used in configuration files
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Switch => "SWITCH",
            Self::Lock => "LOCK",
        }
    }
}

impl FromStr for AccessoryKind {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "SWITCH" => Ok(Self::Switch),
            "LOCK" => Ok(Self::Lock),
            other => Err(crate::Error::config(format!(
                "Unknown accessory type '{}' (expected SWITCH or LOCK)",
                other
            ))),
        }
    }
}

impl TryFrom<String> for AccessoryKind {
    type Error = crate::Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<AccessoryKind> for String {
    fn from(kind: AccessoryKind) -> Self {
        kind.as_str().to_string()
    }
}

impl fmt::Display for AccessoryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

//! Miner status model.
//!
//! Everything here is plain data. Values read from the miner stay as the
//! text the device sent; turning them into numbers is left to the
//! presentation helpers in [`crate::view`].

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Fields of the `VERSION` block. Empty when the miner did not report them.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct VersionInfo {
    pub cgminer: String,
    pub api: String,
    pub prod: String,
    pub model: String,
    pub mac: String,
}

/// Fields of the `SUMMARY` block. Empty when the miner did not report them.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct SummaryInfo {
    /// Seconds since the miner software started.
    pub elapsed: String,
    /// Average hashrate in MH/s.
    pub mhs_av: String,
    pub mhs_5s: String,
    pub accepted: String,
    pub rejected: String,
    pub hw_errors: String,
}

/// Avalon power/performance profile.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Display, EnumString, Deserialize, Serialize,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum WorkMode {
    #[default]
    Unknown,
    Eco,
    #[strum(to_string = "standard", serialize = "normal")]
    Standard,
    Super,
}

impl WorkMode {
    /// Parse a mode requested by the operator.
    ///
    /// Accepts `eco`, `standard`, `normal` (alias of standard) and `super`.
    /// `unknown` is a state, not something that can be requested.
    pub fn from_request(text: &str) -> Option<Self> {
        match text.parse() {
            Ok(WorkMode::Unknown) | Err(_) => None,
            Ok(mode) => Some(mode),
        }
    }

    /// Map the `WORKMODE[n]` index reported by `estats`.
    pub fn from_index(index: &str) -> Option<Self> {
        match index {
            "0" => Some(WorkMode::Eco),
            "1" => Some(WorkMode::Standard),
            "2" => Some(WorkMode::Super),
            _ => None,
        }
    }

    /// Index used by `ascset|0,workmode,set,<n>`.
    pub fn index(self) -> Option<u8> {
        match self {
            WorkMode::Eco => Some(0),
            WorkMode::Standard => Some(1),
            WorkMode::Super => Some(2),
            WorkMode::Unknown => None,
        }
    }
}

/// Snapshot of everything known about the miner.
///
/// Handed out by value; holders never see live session state.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct MinerStatus {
    pub ip: String,
    pub version: VersionInfo,
    pub summary: SummaryInfo,
    pub work_mode: WorkMode,
    /// Instantaneous power draw in watts, last value of `PS[...]`.
    pub power: Option<String>,
    pub last_error: Option<String>,
    /// Raw text after `Work:` in `SYSTEMSTATU[...]`.
    pub work_state: String,
    /// Whether the miner is hashing, derived from `work_state`.
    pub is_active: bool,
}

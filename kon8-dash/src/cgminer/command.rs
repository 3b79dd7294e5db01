//! CGMiner API commands understood by Avalon miners.

use std::fmt;

/// A single request sent to the miner API.
///
/// Each command travels on its own connection, written verbatim with no
/// line terminator.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    Version,
    Summary,
    Stats,
    /// Extended stats: work mode, power supply and work state.
    Estats,
    /// `ascset|0,workmode,set,<index>`
    SetWorkMode(u8),
    /// Schedule soft-off (idle) at a Unix timestamp.
    SoftOff(u64),
    /// Schedule soft-on (hashing) at a Unix timestamp.
    SoftOn(u64),
}

impl Command {
    /// Whether `response` reports this command as accepted.
    ///
    /// Queries are accepted whenever the miner answered at all. Mode
    /// changes report `STATUS=S`; soft-off/soft-on report `STATUS=I`
    /// together with an operation-specific `success <op>:` message.
    pub fn accepted(&self, response: &str) -> bool {
        match self {
            Command::Version | Command::Summary | Command::Stats | Command::Estats => {
                !response.is_empty()
            }
            Command::SetWorkMode(_) => response.contains("STATUS=S"),
            Command::SoftOff(_) => {
                response.contains("STATUS=I") && response.contains("success softoff:")
            }
            Command::SoftOn(_) => {
                response.contains("STATUS=I") && response.contains("success softon:")
            }
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Version => f.write_str("version"),
            Command::Summary => f.write_str("summary"),
            Command::Stats => f.write_str("stats"),
            Command::Estats => f.write_str("estats"),
            Command::SetWorkMode(index) => write!(f, "ascset|0,workmode,set,{index}"),
            Command::SoftOff(at) => write!(f, "ascset|0,softoff,1:{at}"),
            Command::SoftOn(at) => write!(f, "ascset|0,softon,1:{at}"),
        }
    }
}

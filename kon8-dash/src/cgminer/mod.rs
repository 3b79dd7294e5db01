//! CGMiner API client for Avalon miners.
//!
//! The API is plain ASCII over TCP, one command per connection. Replies are
//! `|`-separated records of comma-separated `KEY=VALUE` fields, scanned by
//! the functions in [`parser`].

pub mod command;
pub mod error;
pub mod parser;
pub mod transport;

pub use command::Command;
pub use error::{MinerError, MinerResult, Step};
pub use parser::EstatsInfo;
pub use transport::{DEFAULT_PORT, DEFAULT_TIMEOUT, TcpTransport, Transport};

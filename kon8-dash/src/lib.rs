//! Dashboard and controller for Avalon miners.
//!
//! Talks to the miner over the CGMiner API, keeps its settings in a small
//! namespaced store, and drives a two-button panel showing miner, clock and
//! climate pages.

pub mod cgminer;
pub mod climate;
pub mod config;
pub mod daemon;
pub mod device;
pub mod panel;
pub mod session;
pub mod status;
pub mod store;
pub mod tracing;
pub mod view;

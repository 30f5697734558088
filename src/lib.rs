// VHOSTPIN LIBRARY CRATE
// PURE-RUST DECISION ENGINE: ZERO BPF DEPENDENCIES
// SHARED BETWEEN THE BINARY (main.rs, probe.rs) AND THE TESTS

pub mod affinity;
pub mod config;
pub mod cpulist;
pub mod driver;
pub mod error;
pub mod event;
pub mod pinner;
pub mod policy;
pub mod status;

pub use error::PinError;

// VHOSTPIN ERRORS
// PER-CANDIDATE ERRORS NEVER LEAVE THE PINNER. ONLY Config IS FATAL.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PinError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("no status record for pid {pid}")]
    NotFound { pid: u32 },

    #[error("status record of pid {pid} has no {field} line")]
    MissingField { pid: u32, field: &'static str },

    #[error("reading status record of pid {pid}: {source}")]
    Io {
        pid: u32,
        #[source]
        source: io::Error,
    },

    #[error("cannot parse cpu list {input:?}: {reason}")]
    Parse { input: String, reason: String },

    #[error("could not read proc directory {dir:?}: {source}")]
    Scan {
        dir: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid pin-mode {0:?}")]
    InvalidPolicy(String),

    #[error("sched_setaffinity for pid {pid} failed: {source}")]
    Affinity {
        pid: u32,
        #[source]
        source: io::Error,
    },

    #[error("could not pin process; PID: {pid}, Name: {name}, PinMode: {policy}: {source}")]
    Pin {
        pid: u32,
        name: String,
        policy: String,
        #[source]
        source: Box<PinError>,
    },
}

impl PinError {
    pub(crate) fn parse(input: &str, reason: impl Into<String>) -> Self {
        Self::Parse {
            input: input.to_string(),
            reason: reason.into(),
        }
    }

    // TRUE WHEN THE TARGET EXITED BETWEEN DISCOVERY AND ACTION.
    // EXPECTED DURING SWEEPS -- CALLERS LOG THESE AT DEBUG ONLY.
    pub fn is_vanished(&self) -> bool {
        match self {
            Self::NotFound { .. } => true,
            Self::Io { source, .. } => {
                source.kind() == io::ErrorKind::NotFound
                    || source.raw_os_error() == Some(libc::ESRCH)
            }
            Self::Affinity { source, .. } => source.raw_os_error() == Some(libc::ESRCH),
            Self::Pin { source, .. } => source.is_vanished(),
            _ => false,
        }
    }
}

// VHOSTPIN CONFIGURATION
// SET ONCE BEFORE THE EVENT LOOP STARTS. VALIDATED BY Pinner::new.

use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_NAME_FILTER: &str = "^vhost-.*";
pub const PROC_DIR: &str = "/proc";

// CONTAINERIZED: THE HOST'S /proc IS MOUNTED HERE
pub const HOST_MOUNT: &str = "/host";

pub const DEFAULT_SWEEP_DELAY: Duration = Duration::from_secs(2);

#[derive(Clone, Debug)]
pub struct Config {
    pub discovery_mode: bool,
    pub pin_mode: String,
    pub name_filter: String,
    pub proc_dir: PathBuf,
    pub scan_threads: bool,
    pub sweep_delay: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            discovery_mode: false,
            pin_mode: String::new(),
            name_filter: DEFAULT_NAME_FILTER.to_string(),
            proc_dir: default_proc_dir(),
            scan_threads: false,
            sweep_delay: DEFAULT_SWEEP_DELAY,
        }
    }
}

pub fn default_proc_dir() -> PathBuf {
    proc_dir_under(Path::new(HOST_MOUNT))
}

// <host_mount>/proc IF IT EXISTS, ELSE /proc
pub fn proc_dir_under(host_mount: &Path) -> PathBuf {
    let host_proc = host_mount.join(PROC_DIR.trim_start_matches('/'));
    if host_proc.is_dir() {
        host_proc
    } else {
        PathBuf::from(PROC_DIR)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn host_proc_preferred_when_present() {
        let root = std::env::temp_dir().join(format!("vhostpin-config-{}", std::process::id()));
        fs::create_dir_all(root.join("proc")).unwrap();
        assert_eq!(proc_dir_under(&root), root.join("proc"));
        fs::remove_dir_all(&root).unwrap();
    }

    #[test]
    fn falls_back_to_proc() {
        let root = std::env::temp_dir().join(format!("vhostpin-config-missing-{}", std::process::id()));
        assert_eq!(proc_dir_under(&root), PathBuf::from("/proc"));
    }

    #[test]
    fn defaults() {
        let cfg = Config::default();
        assert!(!cfg.discovery_mode);
        assert!(cfg.pin_mode.is_empty());
        assert_eq!(cfg.name_filter, "^vhost-.*");
        assert_eq!(cfg.sweep_delay, Duration::from_secs(2));
    }
}

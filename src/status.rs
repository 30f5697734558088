// VHOSTPIN PROCESS ATTRIBUTE READER
// READS Name: AND Cpus_allowed_list: FROM <proc>/<pid>/status.
// NO CACHING: AFFINITY CAN CHANGE BETWEEN ANY TWO READS.

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};

use crate::error::PinError;

const STATUS_FILE: &str = "status";
const NAME_LABEL: &[u8] = b"Name:";
const CPUS_ALLOWED_LIST_LABEL: &[u8] = b"Cpus_allowed_list:";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TaskAttributes {
    pub name: String,
    pub cpus_allowed_list: String,
}

pub fn status_path(proc_dir: &Path, pid: u32) -> PathBuf {
    proc_dir.join(pid.to_string()).join(STATUS_FILE)
}

pub fn read_attributes(proc_dir: &Path, pid: u32) -> Result<TaskAttributes, PinError> {
    let file = match File::open(status_path(proc_dir, pid)) {
        Ok(f) => f,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Err(PinError::NotFound { pid }),
        Err(e) => return Err(PinError::Io { pid, source: e }),
    };
    parse_attributes(BufReader::new(file), pid)
}

// SPLIT OUT FOR TESTS. STOPS READING AS SOON AS BOTH FIELDS ARE KNOWN.
pub fn parse_attributes<R: BufRead>(reader: R, pid: u32) -> Result<TaskAttributes, PinError> {
    let mut name: Option<String> = None;
    let mut cpus: Option<String> = None;

    for line in reader.split(b'\n') {
        // A PROCESS EXITING MID-READ SURFACES HERE AS ESRCH
        let line = line.map_err(|e| PinError::Io { pid, source: e })?;

        if let Some(value) = line.strip_prefix(NAME_LABEL) {
            name = Some(trimmed(value));
        } else if let Some(value) = line.strip_prefix(CPUS_ALLOWED_LIST_LABEL) {
            cpus = Some(trimmed(value));
        }

        if let (Some(name), Some(cpus)) = (&name, &cpus) {
            return Ok(TaskAttributes {
                name: name.clone(),
                cpus_allowed_list: cpus.clone(),
            });
        }
    }

    let field = if name.is_none() { "Name:" } else { "Cpus_allowed_list:" };
    Err(PinError::MissingField { pid, field })
}

// comm IS NOT GUARANTEED UTF-8
fn trimmed(value: &[u8]) -> String {
    String::from_utf8_lossy(value.trim_ascii()).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    const VHOST_STATUS: &str = "Name:\tvhost-4242\n\
Umask:\t0022\n\
State:\tS (sleeping)\n\
Tgid:\t4243\n\
Pid:\t4243\n\
Cpus_allowed:\tff\n\
Cpus_allowed_list:\t0-7\n\
Mems_allowed_list:\t0\n";

    fn parse(s: &str) -> Result<TaskAttributes, PinError> {
        parse_attributes(s.as_bytes(), 4243)
    }

    #[test]
    fn reads_both_fields() {
        let attrs = parse(VHOST_STATUS).unwrap();
        assert_eq!(attrs.name, "vhost-4242");
        assert_eq!(attrs.cpus_allowed_list, "0-7");
    }

    #[test]
    fn cpus_allowed_is_not_mistaken_for_the_list() {
        // "Cpus_allowed:" (HEX MASK) PRECEDES "Cpus_allowed_list:"
        let attrs = parse("Cpus_allowed:\tf\nName:\tvhost-1\nCpus_allowed_list:\t0-3\n").unwrap();
        assert_eq!(attrs.cpus_allowed_list, "0-3");
    }

    #[test]
    fn trims_surrounding_whitespace() {
        let attrs = parse("Name:   vhost-9  \r\nCpus_allowed_list: \t 2,4,7 \n").unwrap();
        assert_eq!(attrs.name, "vhost-9");
        assert_eq!(attrs.cpus_allowed_list, "2,4,7");
    }

    #[test]
    fn short_lines_do_not_panic() {
        let attrs = parse("\nN\nCpus\nName:\tx\n\nCpus_allowed_list:\t1\n").unwrap();
        assert_eq!(attrs.name, "x");
        assert_eq!(attrs.cpus_allowed_list, "1");
    }

    #[test]
    fn missing_name_is_reported() {
        match parse("Cpus_allowed_list:\t0-3\n") {
            Err(PinError::MissingField { pid, field }) => {
                assert_eq!(pid, 4243);
                assert_eq!(field, "Name:");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn missing_cpu_list_is_reported() {
        match parse("Name:\tvhost-1\nState:\tS\n") {
            Err(PinError::MissingField { field, .. }) => assert_eq!(field, "Cpus_allowed_list:"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn empty_record_is_missing_field() {
        assert!(matches!(parse(""), Err(PinError::MissingField { .. })));
    }

    #[test]
    fn absent_record_is_not_found() {
        let dir = std::env::temp_dir().join(format!("vhostpin-status-{}", std::process::id()));
        match read_attributes(&dir, 1) {
            Err(PinError::NotFound { pid }) => assert_eq!(pid, 1),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn status_path_layout() {
        assert_eq!(status_path(Path::new("/host/proc"), 12), PathBuf::from("/host/proc/12/status"));
    }
}

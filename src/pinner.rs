// VHOSTPIN PINNING INSTANCE
// READ STATUS -> FILTER BY NAME -> RESOLVE POLICY -> APPLY IF NEEDED
//
// EVERYTHING HERE IS IMMUTABLE AFTER new(). ONE Arc<Pinner> IS SHARED BY
// ALL DISPATCH THREADS WITH NO LOCKING.

use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use regex::Regex;

use crate::affinity::{self, AffinitySetter, SchedAffinity};
use crate::config::Config;
use crate::cpulist::CpuSet;
use crate::error::PinError;
use crate::policy::{PinPolicy, Resolver};
use crate::status;

const TASK_DIR: &str = "task";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Mode {
    Discovery,
    Pin(PinPolicy),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    Ignored,
    Observed,
    AlreadyPinned,
    Pinned(CpuSet),
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub scanned: usize,
    pub ignored: usize,
    pub observed: usize,
    pub already_pinned: usize,
    pub pinned: usize,
    pub vanished: usize,
    pub failed: usize,
}

impl SweepReport {
    fn record(&mut self, pid: u32, result: Result<Outcome, PinError>) {
        self.scanned += 1;
        match result {
            Ok(Outcome::Ignored) => self.ignored += 1,
            Ok(Outcome::Observed) => self.observed += 1,
            Ok(Outcome::AlreadyPinned) => self.already_pinned += 1,
            Ok(Outcome::Pinned(_)) => self.pinned += 1,
            Err(e) if e.is_vanished() => {
                debug!("pid {} vanished during sweep: {}", pid, e);
                self.vanished += 1;
            }
            Err(e) => {
                warn!("{}", e);
                self.failed += 1;
            }
        }
    }
}

pub struct Pinner<A: AffinitySetter = SchedAffinity> {
    proc_dir: PathBuf,
    mode: Mode,
    name_filter: Regex,
    resolver: Resolver,
    scan_threads: bool,
    setter: A,
}

impl<A: AffinitySetter> Pinner<A> {
    pub fn new(config: &Config, setter: A) -> Result<Self, PinError> {
        let resolver = Resolver::new().map_err(|e| PinError::Config(e.to_string()))?;

        let mode = if config.discovery_mode {
            if !config.pin_mode.is_empty() {
                return Err(PinError::Config("cannot provide a pin-mode in discovery-mode".into()));
            }
            Mode::Discovery
        } else {
            let policy = resolver.parse_policy(&config.pin_mode).map_err(|e| {
                PinError::Config(format!("must provide a valid pin-mode when discovery mode is off: {}", e))
            })?;
            Mode::Pin(policy)
        };

        let name_filter = Regex::new(&config.name_filter).map_err(|e| {
            PinError::Config(format!("invalid proc-name-filter {:?}: {}", config.name_filter, e))
        })?;

        Ok(Self {
            proc_dir: config.proc_dir.clone(),
            mode,
            name_filter,
            resolver,
            scan_threads: config.scan_threads,
            setter,
        })
    }

    pub fn proc_dir(&self) -> &Path {
        &self.proc_dir
    }

    pub fn mode(&self) -> &Mode {
        &self.mode
    }

    pub fn setter(&self) -> &A {
        &self.setter
    }

    // READ ERRORS ARE RETURNED UNTOUCHED (MOSTLY "PROCESS GONE").
    // RESOLVE AND APPLY ERRORS ARE WRAPPED WITH pid, name AND pin-mode.
    pub fn pin(&self, pid: u32) -> Result<Outcome, PinError> {
        self.pin_in(&self.proc_dir, pid)
    }

    // dir IS THE PROC DIR FOR PROCESSES, <proc>/<pid>/task FOR THREADS
    fn pin_in(&self, dir: &Path, pid: u32) -> Result<Outcome, PinError> {
        let attrs = status::read_attributes(dir, pid)?;

        if !self.name_filter.is_match(&attrs.name) {
            return Ok(Outcome::Ignored);
        }

        let policy = match &self.mode {
            Mode::Discovery => {
                info!("PID: {}, Name: {}, cpus_allowed_list: {}", pid, attrs.name, attrs.cpus_allowed_list);
                return Ok(Outcome::Observed);
            }
            Mode::Pin(policy) => policy,
        };

        let wrap = |e: PinError| PinError::Pin {
            pid,
            name: attrs.name.clone(),
            policy: policy.to_string(),
            source: Box::new(e),
        };

        let decision = self.resolver.resolve(&attrs.cpus_allowed_list, policy).map_err(&wrap)?;
        if !decision.needs_apply {
            debug!("pid {} ({}) already pinned to {}", pid, attrs.name, decision.cpus);
            return Ok(Outcome::AlreadyPinned);
        }

        info!(
            "Pinning pid {} ({}). Configured pin-mode: {}. Current cpus_allowed_list: {}. New CPU set: {}",
            pid, attrs.name, policy, attrs.cpus_allowed_list, decision.cpus
        );
        let cpus = affinity::apply(&self.setter, pid, &decision.cpus).map_err(&wrap)?;
        Ok(Outcome::Pinned(cpus))
    }

    // BEST EFFORT: EVERY ID IS ATTEMPTED. ONLY AN UNREADABLE PROC DIR FAILS.
    pub fn pin_all(&self) -> Result<SweepReport, PinError> {
        let mut report = SweepReport::default();

        for pid in numeric_dirs(&self.proc_dir)? {
            report.record(pid, self.pin(pid));

            if !self.scan_threads {
                continue;
            }
            // THE TASK DIR VANISHES WITH THE PROCESS. NOTHING TO REPORT THEN.
            let task_dir = self.proc_dir.join(pid.to_string()).join(TASK_DIR);
            let tids = match numeric_dirs(&task_dir) {
                Ok(tids) => tids,
                Err(e) => {
                    debug!("skipping threads of pid {}: {}", pid, e);
                    continue;
                }
            };
            for tid in tids.into_iter().filter(|&tid| tid != pid) {
                report.record(tid, self.pin_in(&task_dir, tid));
            }
        }

        debug!("sweep of {:?} done: {:?}", self.proc_dir, report);
        Ok(report)
    }
}

fn numeric_dirs(dir: &Path) -> Result<Vec<u32>, PinError> {
    let entries = fs::read_dir(dir).map_err(|e| PinError::Scan { dir: dir.to_path_buf(), source: e })?;

    let mut ids: Vec<u32> = entries
        .flatten()
        .filter(|entry| entry.file_type().map(|t| t.is_dir()).unwrap_or(false))
        .filter_map(|entry| entry.file_name().to_str().and_then(|name| name.parse().ok()))
        .collect();
    ids.sort_unstable();
    Ok(ids)
}

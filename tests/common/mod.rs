// SHARED FIXTURES: A FAKE /proc TREE AND A RECORDING AFFINITY SETTER

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crossbeam::channel::Sender;
use vhostpin::affinity::AffinitySetter;
use vhostpin::cpulist::CpuSet;
use vhostpin::PinError;

pub struct FakeProc {
    root: PathBuf,
}

impl FakeProc {
    pub fn new(test: &str) -> Self {
        let root = std::env::temp_dir().join(format!("vhostpin-{}-{}", test, std::process::id()));
        let _ = fs::remove_dir_all(&root);
        fs::create_dir_all(&root).unwrap();
        Self { root }
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    pub fn add(&self, pid: u32, name: &str, cpus: &str) {
        write_status(&self.root.join(pid.to_string()), name, cpus);
    }

    pub fn add_thread(&self, pid: u32, tid: u32, name: &str, cpus: &str) {
        let dir = self.root.join(pid.to_string()).join("task").join(tid.to_string());
        write_status(&dir, name, cpus);
    }

    // PROCESS EXITED BETWEEN readdir AND open
    pub fn add_vanished(&self, pid: u32) {
        fs::create_dir_all(self.root.join(pid.to_string())).unwrap();
    }

    pub fn add_raw(&self, pid: u32, status: &str) {
        let dir = self.root.join(pid.to_string());
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("status"), status).unwrap();
    }

    // NON-PID ENTRIES LIVE IN /proc TOO
    pub fn add_noise(&self) {
        fs::create_dir_all(self.root.join("sys")).unwrap();
        fs::create_dir_all(self.root.join("self-ish")).unwrap();
        fs::write(self.root.join("uptime"), "1.0 1.0\n").unwrap();
    }
}

impl Drop for FakeProc {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.root);
    }
}

fn write_status(dir: &Path, name: &str, cpus: &str) {
    fs::create_dir_all(dir).unwrap();
    let status = format!(
        "Name:\t{}\nUmask:\t0000\nState:\tS (sleeping)\nCpus_allowed:\tff\nCpus_allowed_list:\t{}\nMems_allowed_list:\t0\n",
        name, cpus
    );
    fs::write(dir.join("status"), status).unwrap();
}

#[derive(Default)]
pub struct Recorder {
    pub calls: Mutex<Vec<(u32, Vec<usize>)>>,
    pub fail_with: Option<i32>,
    pub notify: Option<Mutex<Sender<(u32, Vec<usize>)>>>,
}

impl Recorder {
    pub fn failing(errno: i32) -> Self {
        Self { fail_with: Some(errno), ..Self::default() }
    }

    pub fn notifying(tx: Sender<(u32, Vec<usize>)>) -> Self {
        Self { notify: Some(Mutex::new(tx)), ..Self::default() }
    }

    pub fn calls(&self) -> Vec<(u32, Vec<usize>)> {
        let mut calls = self.calls.lock().unwrap().clone();
        calls.sort();
        calls
    }
}

impl AffinitySetter for Recorder {
    fn set_affinity(&self, pid: u32, cpus: &CpuSet) -> Result<(), PinError> {
        let call = (pid, cpus.iter().collect::<Vec<_>>());
        self.calls.lock().unwrap().push(call.clone());
        if let Some(tx) = &self.notify {
            let _ = tx.lock().unwrap().send(call);
        }
        match self.fail_with {
            Some(errno) => Err(PinError::Affinity {
                pid,
                source: std::io::Error::from_raw_os_error(errno),
            }),
            None => Ok(()),
        }
    }
}

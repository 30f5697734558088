// VHOSTPIN CPU LIST CODEC
// THE KERNEL'S LIST FORMAT: "0-3", "2,4,7", "1-2,5". SAME SYNTAX AS
// Cpus_allowed_list IN /proc/<pid>/status AND /sys/devices/system/cpu/online.

use std::collections::BTreeSet;
use std::fmt;

use crate::error::PinError;

// cpu_set_t HOLDS CPU_SETSIZE BITS. ANYTHING ABOVE CANNOT BE APPLIED.
pub const MAX_CPUS: usize = libc::CPU_SETSIZE as usize;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CpuSet {
    cpus: BTreeSet<usize>,
}

impl CpuSet {
    pub fn parse(list: &str) -> Result<Self, PinError> {
        let list = list.trim();
        if list.is_empty() {
            return Err(PinError::parse(list, "empty cpu list"));
        }

        let mut cpus = BTreeSet::new();
        for range in list.split(',') {
            let (lo, hi) = match range.split_once('-') {
                Some((lo, hi)) => (parse_cpu(list, lo)?, parse_cpu(list, hi)?),
                None => {
                    let cpu = parse_cpu(list, range)?;
                    (cpu, cpu)
                }
            };
            if lo > hi {
                return Err(PinError::parse(list, format!("reversed range {}-{}", lo, hi)));
            }
            cpus.extend(lo..=hi);
        }
        Ok(Self { cpus })
    }

    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.cpus.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.cpus.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cpus.is_empty()
    }

    pub fn contains(&self, cpu: usize) -> bool {
        self.cpus.contains(&cpu)
    }
}

fn parse_cpu(list: &str, token: &str) -> Result<usize, PinError> {
    if token.is_empty() || !token.bytes().all(|b| b.is_ascii_digit()) {
        return Err(PinError::parse(list, format!("invalid cpu {:?}", token)));
    }
    let cpu: usize = token
        .parse()
        .map_err(|_| PinError::parse(list, format!("invalid cpu {:?}", token)))?;
    if cpu >= MAX_CPUS {
        return Err(PinError::parse(list, format!("cpu {} exceeds mask size {}", cpu, MAX_CPUS)));
    }
    Ok(cpu)
}

// CANONICAL FORM: ASCENDING, CONSECUTIVE RUNS COLLAPSED ("0-2,5")
impl fmt::Display for CpuSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut iter = self.iter().peekable();
        let mut first = true;
        while let Some(start) = iter.next() {
            let mut end = start;
            while iter.peek() == Some(&(end + 1)) {
                end += 1;
                iter.next();
            }
            if !first {
                f.write_str(",")?;
            }
            first = false;
            if start == end {
                write!(f, "{}", start)?;
            } else {
                write!(f, "{}-{}", start, end)?;
            }
        }
        Ok(())
    }
}

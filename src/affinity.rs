// VHOSTPIN AFFINITY APPLIER
// CPU LIST STRING -> cpu_set_t -> sched_setaffinity(pid)
// THE SYSCALL SITS BEHIND AffinitySetter SO DECISIONS CAN BE TESTED
// WITHOUT CAP_SYS_NICE.

use std::io;
use std::mem;

use crate::cpulist::CpuSet;
use crate::error::PinError;

pub trait AffinitySetter: Send + Sync {
    fn set_affinity(&self, pid: u32, cpus: &CpuSet) -> Result<(), PinError>;
}

// REAL IMPLEMENTATION. A pid OF A KTHREAD OR ANY TID IS ACCEPTED --
// sched_setaffinity ACTS ON A SINGLE TASK.
#[derive(Clone, Copy, Debug, Default)]
pub struct SchedAffinity;

impl AffinitySetter for SchedAffinity {
    fn set_affinity(&self, pid: u32, cpus: &CpuSet) -> Result<(), PinError> {
        let pid_t = libc::pid_t::try_from(pid).map_err(|_| PinError::Affinity {
            pid,
            source: io::Error::from_raw_os_error(libc::ESRCH),
        })?;

        let rc = unsafe {
            let mut mask: libc::cpu_set_t = mem::zeroed();
            libc::CPU_ZERO(&mut mask);
            for cpu in cpus.iter() {
                libc::CPU_SET(cpu, &mut mask);
            }
            libc::sched_setaffinity(pid_t, mem::size_of::<libc::cpu_set_t>(), &mask)
        };

        if rc == 0 {
            Ok(())
        } else {
            Err(PinError::Affinity { pid, source: io::Error::last_os_error() })
        }
    }
}

pub fn apply<S: AffinitySetter + ?Sized>(setter: &S, pid: u32, desired: &str) -> Result<CpuSet, PinError> {
    let cpus = CpuSet::parse(desired)?;
    setter.set_affinity(pid, &cpus)?;
    Ok(cpus)
}

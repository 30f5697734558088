// VHOSTPIN PROBE
// WRAPS THE BPF SKELETON: OPEN, PICK TRIGGER, LOAD, ATTACH, RING BUFFER

use std::mem::MaybeUninit;

use anyhow::{bail, Context, Result};
use clap::ValueEnum;
use crossbeam::channel::Sender;
use libbpf_rs::skel::{OpenSkel, Skel, SkelBuilder};
use libbpf_rs::{OpenObject, RingBuffer, RingBufferBuilder};

use crate::bpf_skel::*;
use vhostpin::event::{self, Trigger};

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum TriggerMode {
    // fexit/__kthread_create_on_node: PIN EACH NEW vhost-* KTHREAD BY PID
    Kthread,
    // kprobe/vhost_net_ioctl: DELAYED SWEEP AFTER VHOST_SET_OWNER
    Ioctl,
}

impl TriggerMode {
    pub fn probe_name(self) -> &'static str {
        match self {
            Self::Kthread => "fexit/__kthread_create_on_node",
            Self::Ioctl => "kprobe/vhost_net_ioctl",
        }
    }
}

pub struct Probe<'a> {
    skel: MainSkel<'a>,
    trigger: TriggerMode,
}

impl<'a> Probe<'a> {
    pub fn attach(
        open_object: &'a mut MaybeUninit<OpenObject>,
        trigger: TriggerMode,
    ) -> Result<Self> {
        bump_memlock_rlimit()?;

        // OPEN
        let builder = MainSkelBuilder::default();
        let mut open_skel = builder.open(open_object).context("opening BPF object")?;

        // ONLY ONE TRIGGER IS LOADED. fexit NEEDS KERNEL BTF, THE kprobe
        // NEEDS vhost_net LOADED -- NEITHER SHOULD BLOCK THE OTHER.
        match trigger {
            TriggerMode::Kthread => {
                open_skel.progs.kprobe_vhost_net_ioctl.set_autoload(false);
            }
            TriggerMode::Ioctl => {
                open_skel.progs.kthread_create_on_node.set_autoload(false);
            }
        }

        // LOAD (VALIDATES BPF WITH KERNEL)
        let mut skel = open_skel.load().context("loading BPF object")?;

        // ATTACH
        skel.attach()
            .with_context(|| format!("attaching {}", trigger.probe_name()))?;

        Ok(Self { skel, trigger })
    }

    pub fn trigger(&self) -> TriggerMode {
        self.trigger
    }

    // EVERY DECODED RECORD IS FORWARDED TO THE DRIVER. THE RETURNED RingBuffer
    // OWNS THE ONLY SENDER -- DROPPING IT CLOSES THE DRIVER'S CHANNEL.
    pub fn ring_buffer(&self, tx: Sender<Trigger>) -> Result<RingBuffer<'static>> {
        let (map, decode): (_, fn(&[u8]) -> Option<Trigger>) = match self.trigger {
            TriggerMode::Kthread => (&self.skel.maps.kthread_events, event::decode_kthread),
            TriggerMode::Ioctl => (&self.skel.maps.ioctl_events, event::decode_ioctl),
        };

        let mut builder = RingBufferBuilder::new();
        builder.add(map, move |data: &[u8]| -> i32 {
            if let Some(trigger) = decode(data) {
                // SEND ONLY FAILS WHILE THE DRIVER IS ALREADY DRAINING
                let _ = tx.send(trigger);
            }
            0
        })?;
        Ok(builder.build()?)
    }
}

// KERNELS BEFORE 5.11 CHARGE BPF MAPS AGAINST RLIMIT_MEMLOCK
fn bump_memlock_rlimit() -> Result<()> {
    let rlimit = libc::rlimit {
        rlim_cur: libc::RLIM_INFINITY,
        rlim_max: libc::RLIM_INFINITY,
    };
    if unsafe { libc::setrlimit(libc::RLIMIT_MEMLOCK, &rlimit) } != 0 {
        bail!("failed to remove memlock limit: {}", std::io::Error::last_os_error());
    }
    Ok(())
}

// VHOSTPIN RECONCILIATION DRIVER
// INITIALIZING -> RECONCILING -> LISTENING -> DRAINING -> TERMINATED
//
// ONE LOOP READS TRIGGERS. EVERY TRIGGER BECOMES ITS OWN DETACHED THREAD:
// NO ORDERING, NO DEDUP, NO BACKPRESSURE. TWO DISPATCHES FOR ONE PID MAY
// RACE; THE LAST sched_setaffinity WINS. IN-FLIGHT DISPATCHES ARE NOT
// AWAITED ON SHUTDOWN.
//
// THE CHANNEL CLOSING (EVERY SENDER DROPPED) IS THE SHUTDOWN SIGNAL.

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam::channel::Receiver;
use log::{debug, info, warn};

use crate::affinity::AffinitySetter;
use crate::event::Trigger;
use crate::pinner::{Pinner, SweepReport};

#[repr(u8)]
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Phase {
    Initializing = 0,
    Reconciling = 1,
    Listening = 2,
    Draining = 3,
    Terminated = 4,
}

impl Phase {
    pub fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Initializing,
            1 => Self::Reconciling,
            2 => Self::Listening,
            3 => Self::Draining,
            _ => Self::Terminated,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Initializing => "INITIALIZING",
            Self::Reconciling => "RECONCILING",
            Self::Listening => "LISTENING",
            Self::Draining => "DRAINING",
            Self::Terminated => "TERMINATED",
        }
    }
}

pub struct Driver<A: AffinitySetter + 'static> {
    pinner: Arc<Pinner<A>>,
    sweep_delay: Duration,
    phase: AtomicU8,
    dispatched: AtomicU64,
}

impl<A: AffinitySetter + 'static> Driver<A> {
    pub fn new(pinner: Arc<Pinner<A>>, sweep_delay: Duration) -> Self {
        Self {
            pinner,
            sweep_delay,
            phase: AtomicU8::new(Phase::Initializing as u8),
            dispatched: AtomicU64::new(0),
        }
    }

    pub fn phase(&self) -> Phase {
        Phase::from_u8(self.phase.load(Ordering::Relaxed))
    }

    fn set_phase(&self, phase: Phase) {
        debug!("driver phase: {}", phase.label());
        self.phase.store(phase as u8, Ordering::Relaxed);
    }

    pub fn dispatched(&self) -> u64 {
        self.dispatched.load(Ordering::Relaxed)
    }

    // FULL LIFE CYCLE AFTER INITIALIZATION. RETURNS ONCE THE CHANNEL CLOSES.
    pub fn run(&self, events: Receiver<Trigger>) {
        self.reconcile();
        self.listen(&events);
        self.set_phase(Phase::Terminated);
    }

    // ONE SWEEP FOR THREADS THAT PREDATE THE PROBE. PARTIAL FAILURE IS FINE.
    pub fn reconcile(&self) -> Option<SweepReport> {
        self.set_phase(Phase::Reconciling);
        info!("Scanning directory {:?} for vhost processes", self.pinner.proc_dir());
        match self.pinner.pin_all() {
            Ok(report) => {
                info!(
                    "startup sweep: scanned {} pinned {} already pinned {} observed {} failed {}",
                    report.scanned, report.pinned, report.already_pinned, report.observed, report.failed
                );
                Some(report)
            }
            Err(e) => {
                warn!("startup sweep failed: {}", e);
                None
            }
        }
    }

    pub fn listen(&self, events: &Receiver<Trigger>) {
        self.set_phase(Phase::Listening);
        info!("Waiting for events..");

        // recv() ONLY FAILS ONCE EVERY SENDER IS GONE
        while let Ok(trigger) = events.recv() {
            self.dispatch(trigger);
        }

        self.set_phase(Phase::Draining);
        info!("Event source closed, exiting..");
    }

    pub fn dispatch(&self, trigger: Trigger) {
        let pinner = Arc::clone(&self.pinner);
        let delay = self.sweep_delay;

        let spawned = match trigger {
            Trigger::Pin(pid) => thread::Builder::new()
                .name(format!("vhostpin-pin-{}", pid))
                .spawn(move || pin_one(&pinner, pid)),
            Trigger::Sweep => thread::Builder::new()
                .name("vhostpin-sweep".into())
                .spawn(move || {
                    // LET THE vhost WORKER FINISH STARTING BEFORE READING /proc
                    thread::sleep(delay);
                    if let Err(e) = pinner.pin_all() {
                        warn!("triggered sweep failed: {}", e);
                    }
                }),
        };

        match spawned {
            Ok(_) => {
                self.dispatched.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => warn!("could not dispatch {:?}: {}", trigger, e),
        }
    }
}

fn pin_one<A: AffinitySetter>(pinner: &Pinner<A>, pid: u32) {
    match pinner.pin(pid) {
        Ok(outcome) => debug!("pid {}: {:?}", pid, outcome),
        Err(e) if e.is_vanished() => debug!("pid {} vanished: {}", pid, e),
        Err(e) => warn!("{}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::affinity::SchedAffinity;
    use crate::config::Config;
    use crossbeam::channel;

    fn driver(proc_dir: &str) -> Driver<SchedAffinity> {
        let cfg = Config {
            discovery_mode: true,
            proc_dir: proc_dir.into(),
            ..Config::default()
        };
        let pinner = Pinner::new(&cfg, SchedAffinity).unwrap();
        Driver::new(Arc::new(pinner), Duration::from_millis(0))
    }

    #[test]
    fn phase_round_trip() {
        for p in [Phase::Initializing, Phase::Reconciling, Phase::Listening, Phase::Draining, Phase::Terminated] {
            assert_eq!(Phase::from_u8(p as u8), p);
        }
        assert_eq!(Phase::from_u8(200), Phase::Terminated);
        assert_eq!(Phase::Draining.label(), "DRAINING");
    }

    #[test]
    fn starts_initializing() {
        assert_eq!(driver("/nonexistent").phase(), Phase::Initializing);
    }

    #[test]
    fn closed_channel_terminates() {
        let d = driver("/nonexistent");
        let (tx, rx) = channel::unbounded::<Trigger>();
        drop(tx);
        d.run(rx);
        assert_eq!(d.phase(), Phase::Terminated);
        assert_eq!(d.dispatched(), 0);
    }

    #[test]
    fn failed_startup_sweep_still_listens() {
        let d = driver("/nonexistent");
        assert!(d.reconcile().is_none());
        let (tx, rx) = channel::unbounded();
        tx.send(Trigger::Pin(1)).unwrap();
        drop(tx);
        d.listen(&rx);
        assert_eq!(d.phase(), Phase::Draining);
        assert_eq!(d.dispatched(), 1);
    }
}

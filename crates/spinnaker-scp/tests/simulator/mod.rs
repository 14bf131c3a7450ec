// crates/spinnaker-scp/tests/simulator/mod.rs
#![allow(dead_code)]

pub mod machine;

pub use machine::{NackRule, SimulatedMachine};

use spinnaker_scp::Clock;
use std::cell::Cell;
use std::rc::Rc;

/// A clock advanced by hand (or by the simulated machine while "waiting").
#[derive(Debug, Clone, Default)]
pub struct ManualClock(Rc<Cell<u64>>);

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, duration_us: u64) {
        self.0.set(self.0.get() + duration_us);
    }

    pub fn set(&self, now_us: u64) {
        self.0.set(now_us);
    }
}

impl Clock for ManualClock {
    fn now_us(&self) -> u64 {
        self.0.get()
    }
}

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

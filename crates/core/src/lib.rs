//! Core primitives shared by the cartridge crates: logging, the I/O dispatcher
//! contract and the wall-clock abstraction.

pub mod logging;

use std::cell::Cell;
use std::rc::Rc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Game Boy CPU clock in T-cycles per second (4.194304 MHz).
pub const CPU_CLOCK_HZ: u32 = 4_194_304;

/// The shared I/O dispatcher that owns every address outside cartridge space
/// (VRAM, WRAM, OAM, I/O registers, HRAM, IE).
///
/// The cartridge facade hands any address it does not decode to this trait.
pub trait IoBus {
    fn common_read(&mut self, addr: u16) -> u8;
    fn common_write(&mut self, addr: u16, val: u8);
}

/// Open bus: reads float high and writes are discarded.
///
/// Stand-in dispatcher for tools and tests that only exercise cartridge space.
#[derive(Debug, Default, Clone, Copy)]
pub struct OpenBus;

impl IoBus for OpenBus {
    fn common_read(&mut self, _addr: u16) -> u8 {
        0xFF
    }

    fn common_write(&mut self, _addr: u16, _val: u8) {}
}

/// Source of wall-clock time, in whole seconds since the Unix epoch.
///
/// Only used where emulated time has to be reconciled with real time (RTC
/// fast-forward and the timestamp stored next to the RTC registers).
pub trait WallClock: std::fmt::Debug {
    fn now(&self) -> i64;
}

/// The host clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl WallClock for SystemClock {
    fn now(&self) -> i64 {
        match SystemTime::now().duration_since(UNIX_EPOCH) {
            Ok(elapsed) => elapsed.as_secs() as i64,
            // Host clock set before 1970
            Err(before) => -(before.duration().as_secs() as i64),
        }
    }
}

/// Manually driven clock. Clones share the same time, so a test can keep one
/// handle and move time forward while the cartridge holds another.
#[derive(Debug, Default, Clone)]
pub struct ManualClock {
    now: Rc<Cell<i64>>,
}

impl ManualClock {
    pub fn new(now: i64) -> Self {
        Self {
            now: Rc::new(Cell::new(now)),
        }
    }

    pub fn set(&self, now: i64) {
        self.now.set(now);
    }

    pub fn advance(&self, seconds: i64) {
        self.now.set(self.now.get() + seconds);
    }
}

impl WallClock for ManualClock {
    fn now(&self) -> i64 {
        self.now.get()
    }
}

//! MBC3 real-time clock
//!
//! The clock chip keeps two copies of its five registers: the **live** set,
//! which counts, and the **latched** set, a frozen snapshot that the CPU reads
//! through the RTC window. Latching copies live into latched; direct register
//! writes land in both.
//!
//! # Registers
//!
//! - 0x08: Seconds (0-59)
//! - 0x09: Minutes (0-59)
//! - 0x0A: Hours (0-23)
//! - 0x0B: Day counter, low 8 bits
//! - 0x0C: Day high: bit 0 = day counter bit 8, bit 6 = halt, bit 7 = day carry
//!
//! # Timekeeping
//!
//! While the emulator runs the clock is driven by CPU cycles, so it speeds up
//! and slows down together with emulation. While the emulator is closed the
//! gap is covered once at load time from the wall-clock timestamp stored next
//! to the registers.
//!
//! # Persisted block (22 bytes, little-endian)
//!
//! ```text
//! live s m h dl dh | latched s m h dl dh | cycle counter u32 | last save i64
//! ```

use gbcart_core::logging::{log, LogCategory, LogLevel};
use gbcart_core::CPU_CLOCK_HZ;
use serde::Serialize;

/// CPU cycles per emulated RTC second.
pub const RTC_TICK_FREQUENCY: u32 = CPU_CLOCK_HZ;

pub const RTC_BLOCK_LEN: usize = 22;

const DAY_HIGH_BIT: u8 = 0x01;
const HALT_BIT: u8 = 0x40;
const CARRY_BIT: u8 = 0x80;

const SECONDS_PER_DAY: u64 = 24 * 60 * 60;

/// RTC register selected through 0x4000-0x5FFF.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RtcRegister {
    Seconds,
    Minutes,
    Hours,
    DayLow,
    DayHigh,
}

impl RtcRegister {
    /// Map a selector value (0x08-0x0C) to its register.
    pub fn from_selector(selector: u8) -> Option<Self> {
        match selector {
            0x08 => Some(RtcRegister::Seconds),
            0x09 => Some(RtcRegister::Minutes),
            0x0A => Some(RtcRegister::Hours),
            0x0B => Some(RtcRegister::DayLow),
            0x0C => Some(RtcRegister::DayHigh),
            _ => None,
        }
    }
}

/// One set of clock registers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RtcRegisters {
    pub seconds: u8,
    pub minutes: u8,
    pub hours: u8,
    pub day_low: u8,
    pub day_high: u8,
}

impl RtcRegisters {
    /// 9-bit day counter.
    pub fn days(&self) -> u16 {
        (((self.day_high & DAY_HIGH_BIT) as u16) << 8) | self.day_low as u16
    }

    fn set_days(&mut self, days: u16) {
        self.day_low = days as u8;
        self.day_high = (self.day_high & !DAY_HIGH_BIT) | ((days >> 8) as u8 & DAY_HIGH_BIT);
    }

    pub fn halted(&self) -> bool {
        self.day_high & HALT_BIT != 0
    }

    pub fn day_carry(&self) -> bool {
        self.day_high & CARRY_BIT != 0
    }

    pub fn read(&self, reg: RtcRegister) -> u8 {
        match reg {
            RtcRegister::Seconds => self.seconds,
            RtcRegister::Minutes => self.minutes,
            RtcRegister::Hours => self.hours,
            RtcRegister::DayLow => self.day_low,
            RtcRegister::DayHigh => self.day_high,
        }
    }

    fn write(&mut self, reg: RtcRegister, val: u8) {
        match reg {
            RtcRegister::Seconds => self.seconds = val,
            RtcRegister::Minutes => self.minutes = val,
            RtcRegister::Hours => self.hours = val,
            RtcRegister::DayLow => self.day_low = val,
            RtcRegister::DayHigh => self.day_high = val,
        }
    }

    /// Out-of-range values loaded from a save roll over like 59.
    pub fn advance_second(&mut self) {
        if self.seconds >= 59 {
            self.seconds = 0;
            self.advance_minute();
        } else {
            self.seconds += 1;
        }
    }

    pub fn advance_minute(&mut self) {
        if self.minutes >= 59 {
            self.minutes = 0;
            self.advance_hour();
        } else {
            self.minutes += 1;
        }
    }

    pub fn advance_hour(&mut self) {
        if self.hours >= 23 {
            self.hours = 0;
            self.advance_day();
        } else {
            self.hours += 1;
        }
    }

    /// The day counter wraps at 512 and sets the carry, which stays set.
    pub fn advance_day(&mut self) {
        let days = self.days() + 1;
        if days > 0x1FF {
            self.set_days(0);
            self.day_high |= CARRY_BIT;
        } else {
            self.set_days(days);
        }
    }

    fn to_bytes(self) -> [u8; 5] {
        [
            self.seconds,
            self.minutes,
            self.hours,
            self.day_low,
            self.day_high,
        ]
    }

    fn from_bytes(bytes: &[u8]) -> Self {
        Self {
            seconds: bytes[0],
            minutes: bytes[1],
            hours: bytes[2],
            day_low: bytes[3],
            day_high: bytes[4],
        }
    }
}

/// Live and latched registers plus the cycle accumulator and save timestamp.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Rtc {
    pub live: RtcRegisters,
    pub latched: RtcRegisters,
    /// CPU cycles accumulated towards the next second
    cycle_counter: u32,
    /// Wall-clock time (unix seconds) of the last persist
    last_saved: i64,
}

impl Rtc {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cycle_counter(&self) -> u32 {
        self.cycle_counter
    }

    pub fn last_saved(&self) -> i64 {
        self.last_saved
    }

    /// Freeze the current live time into the readable snapshot.
    pub fn latch(&mut self) {
        self.latched = self.live;
        log(LogCategory::Rtc, LogLevel::Trace, || {
            format!("RTC latched {:?}", self.latched)
        });
    }

    pub fn read(&self, reg: RtcRegister) -> u8 {
        self.latched.read(reg)
    }

    /// Direct register write. Seconds and minutes must be below 60, hours
    /// below 24; anything else is ignored. Accepted values go to both the live
    /// and latched copies. Returns whether the write was accepted.
    pub fn write(&mut self, reg: RtcRegister, val: u8) -> bool {
        let valid = match reg {
            RtcRegister::Seconds | RtcRegister::Minutes => val < 60,
            RtcRegister::Hours => val < 24,
            RtcRegister::DayLow | RtcRegister::DayHigh => true,
        };
        if !valid {
            log(LogCategory::Rtc, LogLevel::Debug, || {
                format!("Ignoring out-of-range RTC write {:?} = {}", reg, val)
            });
            return false;
        }
        self.live.write(reg, val);
        self.latched.write(reg, val);
        true
    }

    /// Accumulate CPU cycles and emit at most one second per call.
    ///
    /// Cycles accumulate even while halted; the halt bit only suppresses the
    /// second itself. Once a second is emitted the counter is reduced modulo
    /// the tick period, so a batch spanning several seconds (or time piled up
    /// while halted) yields a single second. Returns whether a second elapsed.
    pub fn tick(&mut self, cycles: u32) -> bool {
        self.cycle_counter = self.cycle_counter.wrapping_add(cycles);
        if self.live.halted() || self.cycle_counter < RTC_TICK_FREQUENCY {
            return false;
        }
        self.live.advance_second();
        self.cycle_counter %= RTC_TICK_FREQUENCY;
        true
    }

    /// Catch up with the wall-clock time that passed since the last save.
    ///
    /// Applied as discrete cascading steps: whole days first, then the
    /// remaining hours, minutes and seconds. A halted clock is not advanced.
    /// The save timestamp moves to `now` either way.
    pub fn fast_forward(&mut self, now: i64) {
        if !self.live.halted() {
            let elapsed = now.saturating_sub(self.last_saved).max(0) as u64;
            let days = elapsed / SECONDS_PER_DAY;
            let hours = (elapsed % SECONDS_PER_DAY) / 3600;
            let minutes = (elapsed % 3600) / 60;
            let seconds = elapsed % 60;

            log(LogCategory::Rtc, LogLevel::Info, || {
                format!(
                    "RTC fast-forward {}s ({}d {}h {}m {}s)",
                    elapsed, days, hours, minutes, seconds
                )
            });

            for _ in 0..days {
                self.live.advance_day();
            }
            for _ in 0..hours {
                self.live.advance_hour();
            }
            for _ in 0..minutes {
                self.live.advance_minute();
            }
            for _ in 0..seconds {
                self.live.advance_second();
            }
        }
        self.last_saved = now;
    }

    /// Encode as the persisted block, stamping it with `now`.
    pub fn to_block(&mut self, now: i64) -> [u8; RTC_BLOCK_LEN] {
        self.last_saved = now;
        let mut block = [0; RTC_BLOCK_LEN];
        block[0..5].copy_from_slice(&self.live.to_bytes());
        block[5..10].copy_from_slice(&self.latched.to_bytes());
        block[10..14].copy_from_slice(&self.cycle_counter.to_le_bytes());
        block[14..22].copy_from_slice(&self.last_saved.to_le_bytes());
        block
    }

    pub fn from_block(block: &[u8; RTC_BLOCK_LEN]) -> Self {
        let mut counter = [0; 4];
        counter.copy_from_slice(&block[10..14]);
        let mut timestamp = [0; 8];
        timestamp.copy_from_slice(&block[14..22]);
        Self {
            live: RtcRegisters::from_bytes(&block[0..5]),
            latched: RtcRegisters::from_bytes(&block[5..10]),
            cycle_counter: u32::from_le_bytes(counter),
            last_saved: i64::from_le_bytes(timestamp),
        }
    }
}

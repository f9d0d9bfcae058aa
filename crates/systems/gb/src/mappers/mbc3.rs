//! MBC3 (Memory Bank Controller 3)
//!
//! 7-bit ROM banking, up to four 8 KiB RAM banks and, on the timer variants
//! (0x0F, 0x10), a real-time clock mapped into the RAM window.
//!
//! # Register Map
//!
//! - 0x0000-0x1FFF: RAM and Timer Enable (low nibble 0xA enables)
//! - 0x2000-0x3FFF: ROM Bank Number (0 reads as 1, then masked to 7 bits)
//! - 0x4000-0x5FFF: RAM Bank Number (0-3) or RTC Register Select (0x08-0x0C)
//! - 0x6000-0x7FFF: Latch Clock Data (0x00 followed by 0x01 latches)
//!
//! # Save file
//!
//! RAM writes go through to the save file one byte at a time. On timer carts
//! the RTC block follows the RAM and is rewritten whenever the clock advances
//! or a register is written.

use crate::battery::BatteryFile;
use crate::header::{RAM_BANK_SIZE, ROM_BANK_SIZE};
use crate::rtc::{Rtc, RtcRegister, RTC_BLOCK_LEN};
use crate::CartridgeError;
use gbcart_core::logging::{log, LogCategory, LogLevel};
use gbcart_core::WallClock;
use serde_json::json;
use std::path::Path;

#[derive(Debug)]
pub struct Mbc3 {
    rom: Vec<u8>,
    ram: Vec<u8>,
    battery: Option<BatteryFile>,
    /// Present on timer carts only
    rtc: Option<Rtc>,
    clock: Box<dyn WallClock>,
    ram_timer_enabled: bool,
    rom_bank: u8,
    selector: u8,
    latch: u8,
}

impl Mbc3 {
    pub fn new(rom: Vec<u8>, ram: Vec<u8>, timer: bool, clock: Box<dyn WallClock>) -> Self {
        Self {
            rom,
            ram,
            battery: None,
            rtc: timer.then(Rtc::new),
            clock,
            ram_timer_enabled: false,
            rom_bank: 1,
            selector: 0,
            latch: 0xFF,
        }
    }

    /// Build a battery-backed MBC3 from the save file at `path`.
    ///
    /// RAM and, on timer carts, the RTC block are loaded from the file (or
    /// the file is created from fresh state). The clock is then brought up to
    /// date with the time that passed since the block was last written.
    pub fn with_battery(
        rom: Vec<u8>,
        ram: Vec<u8>,
        timer: bool,
        clock: Box<dyn WallClock>,
        path: &Path,
        durable: bool,
    ) -> Result<Self, CartridgeError> {
        let mut mbc = Self::new(rom, ram, timer, clock);
        let now = mbc.clock.now();
        let ram_len = mbc.ram.len();

        let mut snapshot = mbc.ram.clone();
        if let Some(rtc) = mbc.rtc.as_mut() {
            snapshot.extend_from_slice(&rtc.to_block(now));
        }

        mbc.battery = Some(super::open_battery(path, &mut snapshot, durable)?);
        mbc.ram.copy_from_slice(&snapshot[..ram_len]);

        if let Some(rtc) = mbc.rtc.as_mut() {
            let mut block = [0; RTC_BLOCK_LEN];
            block.copy_from_slice(&snapshot[ram_len..]);
            *rtc = Rtc::from_block(&block);
            rtc.fast_forward(now);
        }
        mbc.persist_rtc();

        Ok(mbc)
    }

    fn rom_bank_count(&self) -> usize {
        self.rom.len().div_ceil(ROM_BANK_SIZE).max(1)
    }

    /// Write the RTC block after the RAM image, stamped with the current time.
    fn persist_rtc(&mut self) {
        let now = self.clock.now();
        if let (Some(rtc), Some(battery)) = (self.rtc.as_mut(), self.battery.as_mut()) {
            let block = rtc.to_block(now);
            battery.write_range(self.ram.len() as u64, &block);
        }
    }

    pub fn read_rom(&self, addr: u16) -> u8 {
        let bank = if addr < 0x4000 {
            0
        } else {
            (self.rom_bank as usize) % self.rom_bank_count()
        };

        let offset = (bank * ROM_BANK_SIZE) + ((addr & 0x3FFF) as usize);
        self.rom.get(offset).copied().unwrap_or(0xFF)
    }

    pub fn write_rom(&mut self, addr: u16, val: u8) {
        match addr {
            0x0000..=0x1FFF => self.ram_timer_enabled = (val & 0x0F) == 0x0A,
            0x2000..=0x3FFF => {
                let bank = if val == 0 { 1 } else { val };
                self.rom_bank = bank & 0x7F;
            }
            0x4000..=0x5FFF => self.selector = val,
            0x6000..=0x7FFF => {
                if self.latch == 0x00 && val == 0x01 {
                    if let Some(rtc) = self.rtc.as_mut() {
                        rtc.latch();
                    }
                }
                self.latch = val;
            }
            _ => {}
        }
    }

    fn ram_index(&self, addr: u16) -> usize {
        let offset = (addr - 0xA000) as usize;
        let index = (self.selector as usize) * RAM_BANK_SIZE + offset;
        assert!(
            index < self.ram.len(),
            "MBC3 RAM access out of range: bank {}, offset {:#06X}, RAM size {:#X}",
            self.selector,
            offset,
            self.ram.len()
        );
        index
    }

    /// RTC register behind the current selector, if this cart has a clock.
    fn rtc_register(&self) -> Option<RtcRegister> {
        self.rtc.as_ref()?;
        RtcRegister::from_selector(self.selector)
    }

    pub fn read_ram(&self, addr: u16) -> u8 {
        if !self.ram_timer_enabled {
            log(LogCategory::Cartridge, LogLevel::Warn, || {
                format!("MBC3 read from {:04X} while RAM/timer disabled", addr)
            });
            return 0;
        }

        if self.selector <= 0x03 {
            return self.ram[self.ram_index(addr)];
        }

        match (self.rtc_register(), self.rtc.as_ref()) {
            (Some(reg), Some(rtc)) => rtc.read(reg),
            _ => {
                log(LogCategory::Cartridge, LogLevel::Warn, || {
                    format!("MBC3 read with invalid selector {:02X}", self.selector)
                });
                0
            }
        }
    }

    pub fn write_ram(&mut self, addr: u16, val: u8) {
        if !self.ram_timer_enabled {
            log(LogCategory::Cartridge, LogLevel::Warn, || {
                format!(
                    "MBC3 write {:04X} = {:02X} dropped, RAM/timer disabled",
                    addr, val
                )
            });
            return;
        }

        if self.selector <= 0x03 {
            let index = self.ram_index(addr);
            self.ram[index] = val;
            if let Some(battery) = self.battery.as_mut() {
                battery.write_byte(index as u64, val);
            }
            return;
        }

        let accepted = match (self.rtc_register(), self.rtc.as_mut()) {
            (Some(reg), Some(rtc)) => rtc.write(reg, val),
            _ => {
                log(LogCategory::Cartridge, LogLevel::Warn, || {
                    format!(
                        "MBC3 write {:02X} dropped, invalid selector {:02X}",
                        val, self.selector
                    )
                });
                false
            }
        };
        if accepted {
            self.persist_rtc();
        }
    }

    /// Feed executed CPU cycles to the clock. Every emulated second is
    /// written to the save file.
    pub fn tick(&mut self, cycles: u32) {
        let advanced = match self.rtc.as_mut() {
            Some(rtc) => rtc.tick(cycles),
            None => false,
        };
        if advanced {
            self.persist_rtc();
        }
    }

    /// Write the clock state one last time and close the save file. Safe to
    /// call twice.
    pub fn finalize(&mut self) {
        self.persist_rtc();
        if let Some(battery) = self.battery.take() {
            battery.close();
        }
    }

    pub fn debug_state(&self) -> serde_json::Value {
        json!({
            "rom_bank": self.rom_bank,
            "selector": self.selector,
            "latch": self.latch,
            "ram_timer_enabled": self.ram_timer_enabled,
            "ram_size": self.ram.len(),
            "rtc": self.rtc,
            "battery": self.battery.as_ref().map(|b| b.path().display().to_string()),
        })
    }
}

//! ROM only cartridge
//!
//! 32 KiB mapped straight into 0x0000-0x7FFF. There are no registers and no
//! external RAM, so the RAM window floats high.

use gbcart_core::logging::{log, LogCategory, LogLevel};
use serde_json::json;

#[derive(Debug)]
pub struct Mbc0 {
    rom: Vec<u8>,
}

impl Mbc0 {
    pub fn new(rom: Vec<u8>) -> Self {
        Self { rom }
    }

    pub fn read_rom(&self, addr: u16) -> u8 {
        self.rom.get(addr as usize).copied().unwrap_or(0xFF)
    }

    pub fn write_rom(&mut self, addr: u16, val: u8) {
        log(LogCategory::Cartridge, LogLevel::Trace, || {
            format!("ROM-only write {:04X} = {:02X} ignored", addr, val)
        });
    }

    pub fn read_ram(&self, addr: u16) -> u8 {
        log(LogCategory::Cartridge, LogLevel::Warn, || {
            format!("Read from {:04X} on a cartridge without RAM", addr)
        });
        0xFF
    }

    pub fn write_ram(&mut self, addr: u16, val: u8) {
        log(LogCategory::Cartridge, LogLevel::Warn, || {
            format!(
                "Dropped write {:04X} = {:02X} on a cartridge without RAM",
                addr, val
            )
        });
    }

    pub fn debug_state(&self) -> serde_json::Value {
        json!({
            "rom_size": self.rom.len(),
        })
    }
}

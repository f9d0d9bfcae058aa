//! MBC5 (Memory Bank Controller 5)
//!
//! 9-bit ROM banking where bank 0 can be mapped at 0x4000, and no clock.
//!
//! # Register Map
//!
//! - 0x0000-0x1FFF: RAM Enable (low nibble 0xA enables)
//! - 0x2000-0x2FFF: ROM Bank Number (lower 8 bits)
//! - 0x3000-0x3FFF: ROM Bank Number (bit 8)
//! - 0x4000-0x5FFF: RAM Bank Number (values above 0x0F are ignored, low 2 bits used)
//!
//! On rumble carts (0x1C-0x1E) bit 3 of the RAM bank write drives the motor.

use crate::battery::BatteryFile;
use crate::header::{RAM_BANK_SIZE, ROM_BANK_SIZE};
use gbcart_core::logging::{log, LogCategory, LogLevel};
use serde_json::json;

#[derive(Debug)]
pub struct Mbc5 {
    rom: Vec<u8>,
    ram: Vec<u8>,
    battery: Option<BatteryFile>,
    ram_enabled: bool,
    rom_bank_low: u8,
    rom_bank_high: u8, // 1 bit
    ram_bank: u8,      // 2 bits
    rumble: bool,
    motor_on: bool,
}

impl Mbc5 {
    pub fn new(rom: Vec<u8>, ram: Vec<u8>, battery: Option<BatteryFile>, rumble: bool) -> Self {
        Self {
            rom,
            ram,
            battery,
            ram_enabled: false,
            rom_bank_low: 1,
            rom_bank_high: 0,
            ram_bank: 0,
            rumble,
            motor_on: false,
        }
    }

    fn rom_bank_count(&self) -> usize {
        self.rom.len().div_ceil(ROM_BANK_SIZE).max(1)
    }

    fn rom_bank(&self) -> usize {
        ((self.rom_bank_high as usize) << 8) | self.rom_bank_low as usize
    }

    pub fn read_rom(&self, addr: u16) -> u8 {
        let bank = if addr < 0x4000 {
            0
        } else {
            self.rom_bank() % self.rom_bank_count()
        };

        let offset = (bank * ROM_BANK_SIZE) + ((addr & 0x3FFF) as usize);
        self.rom.get(offset).copied().unwrap_or(0xFF)
    }

    pub fn write_rom(&mut self, addr: u16, val: u8) {
        match addr {
            0x0000..=0x1FFF => self.ram_enabled = (val & 0x0F) == 0x0A,
            0x2000..=0x2FFF => self.rom_bank_low = val,
            0x3000..=0x3FFF => self.rom_bank_high = val & 0x01,
            0x4000..=0x5FFF => {
                if val > 0x0F {
                    log(LogCategory::Cartridge, LogLevel::Debug, || {
                        format!("MBC5 RAM bank write {:02X} ignored", val)
                    });
                    return;
                }
                if self.rumble {
                    self.motor_on = val & 0x08 != 0;
                }
                self.ram_bank = val & 0x03;
            }
            _ => {}
        }
    }

    fn ram_index(&self, addr: u16) -> usize {
        let offset = (addr - 0xA000) as usize;
        let index = (self.ram_bank as usize) * RAM_BANK_SIZE + offset;
        assert!(
            index < self.ram.len(),
            "MBC5 RAM access out of range: bank {}, offset {:#06X}, RAM size {:#X}",
            self.ram_bank,
            offset,
            self.ram.len()
        );
        index
    }

    pub fn read_ram(&self, addr: u16) -> u8 {
        if !self.ram_enabled {
            log(LogCategory::Cartridge, LogLevel::Warn, || {
                format!("MBC5 read from {:04X} while RAM disabled", addr)
            });
            return 0;
        }
        self.ram[self.ram_index(addr)]
    }

    pub fn write_ram(&mut self, addr: u16, val: u8) {
        if !self.ram_enabled {
            log(LogCategory::Cartridge, LogLevel::Warn, || {
                format!(
                    "MBC5 write {:04X} = {:02X} dropped, RAM disabled",
                    addr, val
                )
            });
            return;
        }
        let index = self.ram_index(addr);
        self.ram[index] = val;
        if let Some(battery) = self.battery.as_mut() {
            battery.write_byte(index as u64, val);
        }
    }

    pub fn finalize(&mut self) {
        if let Some(battery) = self.battery.take() {
            battery.close();
        }
    }

    pub fn debug_state(&self) -> serde_json::Value {
        json!({
            "rom_bank": self.rom_bank(),
            "ram_bank": self.ram_bank,
            "ram_enabled": self.ram_enabled,
            "ram_size": self.ram.len(),
            "rumble": self.rumble,
            "motor_on": self.motor_on,
            "battery": self.battery.as_ref().map(|b| b.path().display().to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::battery::tests::TestDir;

    fn banked_rom(banks: usize) -> Vec<u8> {
        let mut rom = vec![0; banks * ROM_BANK_SIZE];
        for bank in 0..banks {
            rom[bank * ROM_BANK_SIZE] = (bank & 0xFF) as u8;
            rom[bank * ROM_BANK_SIZE + 1] = (bank >> 8) as u8;
        }
        rom
    }

    #[test]
    fn test_mbc5_default_banks() {
        let mbc = Mbc5::new(banked_rom(4), vec![], None, false);
        assert_eq!(mbc.rom_bank(), 1);
        assert_eq!(mbc.ram_bank, 0);
        assert_eq!(mbc.read_rom(0x4000), 1);
    }

    #[test]
    fn test_mbc5_bank_zero_selectable() {
        let mut mbc = Mbc5::new(banked_rom(128), vec![], None, false);

        mbc.write_rom(0x2000, 127);
        assert_eq!(mbc.read_rom(0x4000), 127);

        mbc.write_rom(0x2000, 0);
        assert_eq!(mbc.read_rom(0x4000), 0);
    }

    #[test]
    fn test_mbc5_9bit_rom_banking() {
        let mut mbc = Mbc5::new(banked_rom(512), vec![], None, false);

        mbc.write_rom(0x2000, 0x2C);
        mbc.write_rom(0x3000, 0x01);
        assert_eq!(mbc.rom_bank(), 0x12C);
        assert_eq!(mbc.read_rom(0x4000), 0x2C);
        assert_eq!(mbc.read_rom(0x4001), 0x01);

        // Only bit 0 of the high register counts
        mbc.write_rom(0x3FFF, 0xFE);
        assert_eq!(mbc.rom_bank(), 0x2C);

        mbc.write_rom(0x2FFF, 0xFF);
        mbc.write_rom(0x3000, 0x01);
        assert_eq!(mbc.read_rom(0x4000), 0xFF);
        assert_eq!(mbc.read_rom(0x4001), 0x01);
    }

    #[test]
    fn test_mbc5_bank_wraps_to_rom_size() {
        let mut mbc = Mbc5::new(banked_rom(64), vec![], None, false);
        mbc.write_rom(0x2000, 65);
        assert_eq!(mbc.read_rom(0x4000), 1);
    }

    #[test]
    fn test_mbc5_ram_read_write() {
        let mut mbc = Mbc5::new(vec![0; 0x8000], vec![0; 0x2000], None, false);

        mbc.write_ram(0xA000, 0x42);
        assert_eq!(mbc.read_ram(0xA000), 0);

        mbc.write_rom(0x0000, 0x0A);
        assert_eq!(mbc.read_ram(0xA000), 0);
        mbc.write_ram(0xA000, 0x42);
        assert_eq!(mbc.read_ram(0xA000), 0x42);
    }

    #[test]
    fn test_mbc5_ram_bank_register() {
        let mut ram = vec![0; 0x8000];
        for bank in 0..4 {
            ram[bank * RAM_BANK_SIZE] = bank as u8;
        }
        let mut mbc = Mbc5::new(vec![0; 0x8000], ram, None, false);
        mbc.write_rom(0x0000, 0x0A);

        mbc.write_rom(0x4000, 0x02);
        assert_eq!(mbc.read_ram(0xA000), 2);

        // Accepted, but only the low 2 bits are kept
        mbc.write_rom(0x4000, 0x0F);
        assert_eq!(mbc.ram_bank, 3);
        assert_eq!(mbc.read_ram(0xA000), 3);

        // Out of range writes leave the bank alone
        mbc.write_rom(0x4000, 0x10);
        assert_eq!(mbc.ram_bank, 3);
        mbc.write_rom(0x4000, 0xFF);
        assert_eq!(mbc.ram_bank, 3);
    }

    #[test]
    fn test_mbc5_rumble_motor() {
        let mut mbc = Mbc5::new(vec![0; 0x8000], vec![0; 0x8000], None, true);
        mbc.write_rom(0x4000, 0x09);
        assert!(mbc.motor_on);
        assert_eq!(mbc.ram_bank, 1);

        mbc.write_rom(0x4000, 0x01);
        assert!(!mbc.motor_on);

        let mut plain = Mbc5::new(vec![0; 0x8000], vec![0; 0x8000], None, false);
        plain.write_rom(0x4000, 0x08);
        assert!(!plain.motor_on);
    }

    #[test]
    #[should_panic(expected = "MBC5 RAM access out of range")]
    fn test_mbc5_enabled_access_without_ram() {
        let mut mbc = Mbc5::new(vec![0; 0x8000], vec![], None, false);
        mbc.write_rom(0x0000, 0x0A);
        mbc.read_ram(0xA000);
    }

    #[test]
    fn test_mbc5_ram_written_through() {
        let dir = TestDir::new("mbc5_write_through");
        let path = dir.join("game.bat");

        let mut ram = vec![0; 0x4000];
        let battery = BatteryFile::open(&path, &mut ram, false).unwrap();
        let mut mbc = Mbc5::new(vec![0; 0x8000], ram, Some(battery), false);

        mbc.write_rom(0x0000, 0x0A);
        mbc.write_rom(0x4000, 0x01);
        mbc.write_ram(0xA003, 0xC3);

        let on_disk = std::fs::read(&path).unwrap();
        assert_eq!(on_disk.len(), 0x4000);
        assert_eq!(on_disk[RAM_BANK_SIZE + 3], 0xC3);

        mbc.finalize();
        mbc.finalize();
    }
}

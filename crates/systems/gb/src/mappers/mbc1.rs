//! MBC1 (Memory Bank Controller 1)
//!
//! Linear banking with a 5-bit ROM bank register and a single external RAM
//! window. Battery-backed RAM is not written through: the whole buffer is
//! loaded from the save file when RAM gets enabled and written back when it
//! gets disabled (and once more at shutdown if it was left enabled).
//!
//! # Register Map
//!
//! - 0x0000-0x1FFF: RAM Enable (low nibble 0xA enables, anything else disables)
//! - 0x2000-0x3FFF: ROM Bank Number (0 reads as 1, then masked to 5 bits)
//! - 0x4000-0x5FFF: Bank Select (bit 1 only)
//! - 0x6000-0x7FFF: Mode Select (taken from address bit 0, not the value)
//!
//! # Switchable bank
//!
//! ```text
//! bank = (mode == 0 ? bank_select << 2 : 0) | rom_bank
//! ```
//!
//! The RAM window always maps the first 8 KiB of external RAM.

use crate::battery::BatteryFile;
use crate::header::ROM_BANK_SIZE;
use gbcart_core::logging::{log, LogCategory, LogLevel};
use serde_json::json;

#[derive(Debug)]
pub struct Mbc1 {
    rom: Vec<u8>,
    ram: Vec<u8>,
    battery: Option<BatteryFile>,
    ram_enabled: bool,
    rom_bank: u8,    // 5-bit register (0x2000-0x3FFF)
    bank_select: u8, // 0x4000-0x5FFF, bit 1
    mode_select: u8, // 0x6000-0x7FFF, address bit 0
}

impl Mbc1 {
    pub fn new(rom: Vec<u8>, ram: Vec<u8>, battery: Option<BatteryFile>) -> Self {
        Self {
            rom,
            ram,
            battery,
            ram_enabled: false,
            rom_bank: 1,
            bank_select: 0,
            mode_select: 0,
        }
    }

    fn rom_bank_count(&self) -> usize {
        self.rom.len().div_ceil(ROM_BANK_SIZE).max(1)
    }

    /// Bank mapped at 0x4000-0x7FFF, before wrapping to the ROM size.
    fn switchable_bank(&self) -> usize {
        let upper = if self.mode_select == 0 {
            (self.bank_select as usize) << 2
        } else {
            0
        };
        upper | self.rom_bank as usize
    }

    pub fn read_rom(&self, addr: u16) -> u8 {
        let bank = if addr < 0x4000 {
            0
        } else {
            self.switchable_bank() % self.rom_bank_count()
        };

        let offset = (bank * ROM_BANK_SIZE) + ((addr & 0x3FFF) as usize);
        self.rom.get(offset).copied().unwrap_or(0xFF)
    }

    pub fn write_rom(&mut self, addr: u16, val: u8) {
        match addr {
            0x0000..=0x1FFF => self.set_ram_enabled((val & 0x0F) == 0x0A),
            0x2000..=0x3FFF => {
                let bank = if val == 0 { 1 } else { val };
                self.rom_bank = bank & 0x1F;
            }
            0x4000..=0x5FFF => self.bank_select = val & 0x02,
            0x6000..=0x7FFF => self.mode_select = (addr & 0x01) as u8,
            _ => {}
        }
    }

    /// Enable edges move the whole RAM buffer between memory and the save file.
    fn set_ram_enabled(&mut self, enabled: bool) {
        if enabled && !self.ram_enabled {
            if let Some(battery) = self.battery.as_mut() {
                battery.read_range(0, &mut self.ram);
            }
        } else if !enabled && self.ram_enabled {
            self.save_ram();
        }
        self.ram_enabled = enabled;
    }

    fn save_ram(&mut self) {
        if let Some(battery) = self.battery.as_mut() {
            log(LogCategory::Battery, LogLevel::Debug, || {
                format!("Saving {} bytes of MBC1 RAM", self.ram.len())
            });
            battery.write_range(0, &self.ram);
        }
    }

    fn ram_index(&self, addr: u16) -> usize {
        let offset = (addr - 0xA000) as usize;
        assert!(
            offset < self.ram.len(),
            "MBC1 RAM access out of range: bank 0, offset {:#06X}, RAM size {:#X}",
            offset,
            self.ram.len()
        );
        offset
    }

    pub fn read_ram(&self, addr: u16) -> u8 {
        if !self.ram_enabled {
            log(LogCategory::Cartridge, LogLevel::Warn, || {
                format!("MBC1 read from {:04X} while RAM disabled", addr)
            });
            return 0;
        }
        self.ram[self.ram_index(addr)]
    }

    pub fn write_ram(&mut self, addr: u16, val: u8) {
        if !self.ram_enabled {
            log(LogCategory::Cartridge, LogLevel::Warn, || {
                format!(
                    "MBC1 write {:04X} = {:02X} dropped, RAM disabled",
                    addr, val
                )
            });
            return;
        }
        let index = self.ram_index(addr);
        self.ram[index] = val;
    }

    /// Save RAM if still enabled and close the save file. Safe to call twice.
    pub fn finalize(&mut self) {
        if self.ram_enabled {
            self.save_ram();
        }
        if let Some(battery) = self.battery.take() {
            battery.close();
        }
    }

    pub fn debug_state(&self) -> serde_json::Value {
        json!({
            "rom_bank": self.rom_bank,
            "bank_select": self.bank_select,
            "mode_select": self.mode_select,
            "effective_bank": self.switchable_bank() % self.rom_bank_count(),
            "ram_enabled": self.ram_enabled,
            "ram_size": self.ram.len(),
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
            rom[bank * ROM_BANK_SIZE] = bank as u8;
        }
        rom
    }

    #[test]
    fn test_mbc1_default_banks() {
        let mbc = Mbc1::new(banked_rom(32), vec![], None);
        assert_eq!(mbc.read_rom(0x0000), 0);
        assert_eq!(mbc.read_rom(0x4000), 1);
    }

    #[test]
    fn test_mbc1_rom_banking() {
        let mut mbc = Mbc1::new(banked_rom(32), vec![], None);

        mbc.write_rom(0x2000, 5);
        assert_eq!(mbc.read_rom(0x4000), 5);

        // Bank 0 is not selectable
        mbc.write_rom(0x2000, 0);
        assert_eq!(mbc.read_rom(0x4000), 1);

        mbc.write_rom(0x2000, 0x1F);
        assert_eq!(mbc.read_rom(0x4000), 31);
    }

    #[test]
    fn test_mbc1_zero_translation_happens_before_mask() {
        let mut mbc = Mbc1::new(banked_rom(32), vec![], None);

        // 0x20 is non-zero, so it is masked straight down to bank 0
        mbc.write_rom(0x2000, 0x20);
        assert_eq!(mbc.rom_bank, 0);
        assert_eq!(mbc.read_rom(0x4000), 0);

        mbc.write_rom(0x2000, 0x21);
        assert_eq!(mbc.read_rom(0x4000), 1);
    }

    #[test]
    fn test_mbc1_bank_select_in_mode_zero() {
        let mut mbc = Mbc1::new(banked_rom(16), vec![], None);
        mbc.write_rom(0x2000, 0x03);

        // Only bit 1 is kept and lands on bit 3 of the bank number
        mbc.write_rom(0x4000, 0x01);
        assert_eq!(mbc.read_rom(0x4000), 3);

        mbc.write_rom(0x4000, 0x02);
        assert_eq!(mbc.read_rom(0x4000), 0x0B);

        mbc.write_rom(0x4000, 0x03);
        assert_eq!(mbc.read_rom(0x4000), 0x0B);
    }

    #[test]
    fn test_mbc1_mode_select_uses_address_bit() {
        let mut mbc = Mbc1::new(banked_rom(16), vec![], None);
        mbc.write_rom(0x2000, 0x03);
        mbc.write_rom(0x4000, 0x02);

        // Value is ignored, odd address selects mode 1
        mbc.write_rom(0x6000, 0x01);
        assert_eq!(mbc.mode_select, 0);
        assert_eq!(mbc.read_rom(0x4000), 0x0B);

        mbc.write_rom(0x6001, 0x00);
        assert_eq!(mbc.mode_select, 1);
        assert_eq!(mbc.read_rom(0x4000), 0x03);

        // Bank 0 stays fixed in both modes
        assert_eq!(mbc.read_rom(0x0000), 0);
    }

    #[test]
    fn test_mbc1_bank_wrapping() {
        let mut mbc = Mbc1::new(banked_rom(8), vec![], None);
        mbc.write_rom(0x2000, 9);
        assert_eq!(mbc.read_rom(0x4000), 1);
    }

    #[test]
    fn test_mbc1_ram_enable() {
        let mut mbc = Mbc1::new(vec![0; 0x8000], vec![0; 0x2000], None);
        assert!(!mbc.ram_enabled);

        mbc.write_rom(0x0000, 0x0A);
        assert!(mbc.ram_enabled);

        mbc.write_rom(0x1FFF, 0x1A);
        assert!(mbc.ram_enabled);

        mbc.write_rom(0x0000, 0x00);
        assert!(!mbc.ram_enabled);
    }

    #[test]
    fn test_mbc1_ram_read_write() {
        let mut mbc = Mbc1::new(vec![0; 0x8000], vec![0; 0x2000], None);

        // Disabled reads return 0
        assert_eq!(mbc.read_ram(0xA000), 0x00);

        mbc.write_rom(0x0000, 0x0A);
        mbc.write_ram(0xA000, 0x42);
        mbc.write_ram(0xBFFF, 0x24);
        assert_eq!(mbc.read_ram(0xA000), 0x42);
        assert_eq!(mbc.read_ram(0xBFFF), 0x24);

        // Disabled writes are dropped
        mbc.write_rom(0x0000, 0x00);
        mbc.write_ram(0xA000, 0xFF);
        mbc.write_rom(0x0000, 0x0A);
        assert_eq!(mbc.read_ram(0xA000), 0x42);
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn test_mbc1_ram_index_past_declared_size() {
        let mut mbc = Mbc1::new(vec![0; 0x8000], vec![0; 0x800], None);
        mbc.write_rom(0x0000, 0x0A);
        mbc.read_ram(0xA800);
    }

    #[test]
    #[should_panic(expected = "RAM size 0x0")]
    fn test_mbc1_enabled_access_without_ram() {
        let mut mbc = Mbc1::new(vec![0; 0x8000], vec![], None);
        mbc.write_rom(0x0000, 0x0A);
        mbc.write_ram(0xA000, 0x01);
    }

    #[test]
    fn test_mbc1_enable_edges_move_buffer() {
        let dir = TestDir::new("mbc1_edges");
        let path = dir.join("game.bat");

        let mut ram = vec![0; 0x2000];
        let battery = BatteryFile::open(&path, &mut ram, false).unwrap();
        let mut mbc = Mbc1::new(vec![0; 0x8000], ram, Some(battery));

        mbc.write_rom(0x0000, 0x0A);
        mbc.write_ram(0xA010, 0x99);

        // Not written through
        assert_eq!(std::fs::read(&path).unwrap()[0x10], 0x00);

        // Falling edge saves the buffer
        mbc.write_rom(0x0000, 0x00);
        assert_eq!(std::fs::read(&path).unwrap()[0x10], 0x99);

        // Rising edge reloads it from the file
        let mut on_disk = std::fs::read(&path).unwrap();
        on_disk[0x20] = 0x77;
        std::fs::write(&path, &on_disk).unwrap();
        mbc.write_rom(0x0000, 0x0A);
        assert_eq!(mbc.read_ram(0xA020), 0x77);
        assert_eq!(mbc.read_ram(0xA010), 0x99);
    }

    #[test]
    fn test_mbc1_finalize_saves_enabled_ram() {
        let dir = TestDir::new("mbc1_finalize");
        let path = dir.join("game.bat");

        let mut ram = vec![0; 0x2000];
        let battery = BatteryFile::open(&path, &mut ram, false).unwrap();
        let mut mbc = Mbc1::new(vec![0; 0x8000], ram, Some(battery));

        mbc.write_rom(0x0000, 0x0A);
        mbc.write_ram(0xA001, 0x5A);
        mbc.finalize();
        mbc.finalize();

        assert_eq!(std::fs::read(&path).unwrap()[1], 0x5A);
    }
}

//! Cartridge header (0x0100-0x014F)
//!
//! ```text
//! $0134-$0143  Title (upper-case ASCII, NUL padded; CGB carts shorten it)
//! $0143        CGB flag (0x80 / 0xC0)
//! $0147        Cartridge type (controller + extra hardware)
//! $0148        ROM size code (32 KiB << n)
//! $0149        RAM size code
//! $014D        Header checksum over $0134-$014C
//! ```

use crate::CartridgeError;
use gbcart_core::logging::{log, LogCategory, LogLevel};
use serde::Serialize;

pub const ROM_BANK_SIZE: usize = 0x4000;
pub const RAM_BANK_SIZE: usize = 0x2000;

const HEADER_END: usize = 0x0150;
const TITLE_START: usize = 0x0134;
const CGB_FLAG: usize = 0x0143;
const CART_TYPE: usize = 0x0147;
const ROM_SIZE: usize = 0x0148;
const RAM_SIZE: usize = 0x0149;
const HEADER_CHECKSUM: usize = 0x014D;

/// Which bank controller a cartridge carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ControllerKind {
    /// Plain 32 KiB ROM, no banking
    RomOnly,
    /// MBC1: 5-bit ROM bank, whole-buffer RAM persistence
    Linear,
    /// MBC3: 7-bit ROM bank, RAM banks 0-3 and the RTC window
    WideWithClock,
    /// MBC5: 9-bit ROM bank, bank 0 selectable
    Wide,
}

/// Capabilities decoded from the cartridge-type code at 0x0147.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CartridgeType {
    pub code: u8,
    pub controller: ControllerKind,
    pub ram: bool,
    pub battery: bool,
    pub timer: bool,
    pub rumble: bool,
}

impl CartridgeType {
    /// Decode a type code. Every code outside the table is unsupported.
    pub fn from_code(code: u8) -> Result<Self, CartridgeError> {
        use ControllerKind::*;

        #[rustfmt::skip]
        let (controller, ram, battery, timer, rumble) = match code {
            0x00 => (RomOnly,       false, false, false, false),
            0x01 => (Linear,        false, false, false, false),
            0x02 => (Linear,        true,  false, false, false),
            0x03 => (Linear,        true,  true,  false, false),
            0x0F => (WideWithClock, false, true,  true,  false),
            0x10 => (WideWithClock, true,  true,  true,  false),
            0x11 => (WideWithClock, false, false, false, false),
            0x12 => (WideWithClock, true,  false, false, false),
            0x13 => (WideWithClock, true,  true,  false, false),
            0x19 => (Wide,          false, false, false, false),
            0x1A => (Wide,          true,  false, false, false),
            0x1B => (Wide,          true,  true,  false, false),
            0x1C => (Wide,          false, false, false, true),
            0x1D => (Wide,          true,  false, false, true),
            0x1E => (Wide,          true,  true,  false, true),
            _ => return Err(CartridgeError::UnsupportedCartridgeType(code)),
        };

        Ok(Self {
            code,
            controller,
            ram,
            battery,
            timer,
            rumble,
        })
    }

    /// Name as printed in cartridge databases.
    pub fn name(&self) -> &'static str {
        type_name(self.code)
    }
}

/// Human readable name of any type code, including the ones this crate refuses
/// to load.
pub fn type_name(code: u8) -> &'static str {
    match code {
        0x00 => "ROM ONLY",
        0x01 => "MBC1",
        0x02 => "MBC1+RAM",
        0x03 => "MBC1+RAM+BATTERY",
        0x05 => "MBC2",
        0x06 => "MBC2+BATTERY",
        0x08 => "ROM+RAM",
        0x09 => "ROM+RAM+BATTERY",
        0x0B => "MMM01",
        0x0C => "MMM01+RAM",
        0x0D => "MMM01+RAM+BATTERY",
        0x0F => "MBC3+TIMER+BATTERY",
        0x10 => "MBC3+TIMER+RAM+BATTERY",
        0x11 => "MBC3",
        0x12 => "MBC3+RAM",
        0x13 => "MBC3+RAM+BATTERY",
        0x19 => "MBC5",
        0x1A => "MBC5+RAM",
        0x1B => "MBC5+RAM+BATTERY",
        0x1C => "MBC5+RUMBLE",
        0x1D => "MBC5+RUMBLE+RAM",
        0x1E => "MBC5+RUMBLE+RAM+BATTERY",
        0x20 => "MBC6",
        0x22 => "MBC7+SENSOR+RUMBLE+RAM+BATTERY",
        0xFC => "POCKET CAMERA",
        0xFD => "BANDAI TAMA5",
        0xFE => "HuC3",
        0xFF => "HuC1+RAM+BATTERY",
        _ => "UNKNOWN",
    }
}

/// External RAM size in bytes for the code at 0x0149.
pub fn ram_size_from_code(code: u8) -> Result<usize, CartridgeError> {
    match code {
        0x00 => Ok(0),
        0x01 => Ok(2 * 1024),
        0x02 => Ok(8 * 1024),
        0x03 => Ok(32 * 1024),
        0x04 => Ok(128 * 1024),
        0x05 => Ok(64 * 1024),
        _ => Err(CartridgeError::UnknownRamSize(code)),
    }
}

/// Parsed cartridge header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CartridgeHeader {
    pub title: String,
    pub cart_type: u8,
    pub rom_size_code: u8,
    pub ram_size_code: u8,
    /// Declared RAM size in bytes
    pub ram_size: usize,
    pub checksum_ok: bool,
}

impl CartridgeHeader {
    pub fn parse(rom: &[u8]) -> Result<Self, CartridgeError> {
        if rom.len() < HEADER_END {
            return Err(CartridgeError::RomTooSmall(rom.len()));
        }

        let title_end = if rom[CGB_FLAG] & 0x80 != 0 {
            CGB_FLAG
        } else {
            CGB_FLAG + 1
        };
        let title = rom[TITLE_START..title_end]
            .iter()
            .take_while(|&&b| b != 0)
            .map(|&b| b as char)
            .collect::<String>();

        let checksum = rom[TITLE_START..HEADER_CHECKSUM]
            .iter()
            .fold(0u8, |acc, &b| acc.wrapping_sub(b).wrapping_sub(1));
        let checksum_ok = checksum == rom[HEADER_CHECKSUM];
        if !checksum_ok {
            log(LogCategory::Cartridge, LogLevel::Warn, || {
                format!(
                    "Header checksum mismatch: computed {:02X}, header says {:02X}",
                    checksum, rom[HEADER_CHECKSUM]
                )
            });
        }

        let ram_size_code = rom[RAM_SIZE];
        Ok(Self {
            title: title.trim_end().to_string(),
            cart_type: rom[CART_TYPE],
            rom_size_code: rom[ROM_SIZE],
            ram_size_code,
            ram_size: ram_size_from_code(ram_size_code)?,
            checksum_ok,
        })
    }

    /// Declared ROM size in bytes (32 KiB << code), if the code is standard.
    pub fn rom_size(&self) -> Option<usize> {
        (self.rom_size_code <= 0x08).then(|| (32 * 1024) << self.rom_size_code)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Minimal ROM image with a valid header for the given type and RAM codes.
    pub(crate) fn rom_with_header(banks: usize, cart_type: u8, ram_code: u8) -> Vec<u8> {
        let mut rom = vec![0; banks * ROM_BANK_SIZE];
        rom[TITLE_START..TITLE_START + 7].copy_from_slice(b"POCKETS");
        rom[CART_TYPE] = cart_type;
        rom[ROM_SIZE] = (banks / 2).trailing_zeros() as u8;
        rom[RAM_SIZE] = ram_code;
        let checksum = rom[TITLE_START..HEADER_CHECKSUM]
            .iter()
            .fold(0u8, |acc, &b| acc.wrapping_sub(b).wrapping_sub(1));
        rom[HEADER_CHECKSUM] = checksum;
        rom
    }

    #[test]
    fn test_parse_header() {
        let rom = rom_with_header(8, 0x10, 0x03);
        let header = CartridgeHeader::parse(&rom).unwrap();

        assert_eq!(header.title, "POCKETS");
        assert_eq!(header.cart_type, 0x10);
        assert_eq!(header.ram_size, 32 * 1024);
        assert_eq!(header.rom_size(), Some(128 * 1024));
        assert!(header.checksum_ok);
    }

    #[test]
    fn test_bad_checksum_still_parses() {
        let mut rom = rom_with_header(2, 0x00, 0x00);
        rom[HEADER_CHECKSUM] ^= 0xFF;
        let header = CartridgeHeader::parse(&rom).unwrap();
        assert!(!header.checksum_ok);
    }

    #[test]
    fn test_cgb_title_is_shortened() {
        let mut rom = rom_with_header(2, 0x00, 0x00);
        rom[TITLE_START..CGB_FLAG].copy_from_slice(b"ABCDEFGHIJKLMNO");
        rom[CGB_FLAG] = 0x80;
        let header = CartridgeHeader::parse(&rom).unwrap();
        assert_eq!(header.title, "ABCDEFGHIJKLMNO");
    }

    #[test]
    fn test_rom_too_small() {
        let err = CartridgeHeader::parse(&[0; 0x100]).unwrap_err();
        assert!(matches!(err, CartridgeError::RomTooSmall(0x100)));
    }

    #[test]
    fn test_unknown_ram_size() {
        let rom = rom_with_header(2, 0x00, 0x07);
        let err = CartridgeHeader::parse(&rom).unwrap_err();
        assert!(matches!(err, CartridgeError::UnknownRamSize(0x07)));
    }

    #[test]
    fn test_type_table() {
        let mbc3 = CartridgeType::from_code(0x10).unwrap();
        assert_eq!(mbc3.controller, ControllerKind::WideWithClock);
        assert!(mbc3.ram && mbc3.battery && mbc3.timer);

        let mbc3_no_clock = CartridgeType::from_code(0x13).unwrap();
        assert!(mbc3_no_clock.battery);
        assert!(!mbc3_no_clock.timer);

        let mbc1 = CartridgeType::from_code(0x03).unwrap();
        assert_eq!(mbc1.controller, ControllerKind::Linear);
        assert!(mbc1.battery);

        let rumble = CartridgeType::from_code(0x1E).unwrap();
        assert_eq!(rumble.controller, ControllerKind::Wide);
        assert!(rumble.rumble && rumble.battery);

        assert_eq!(rumble.name(), "MBC5+RUMBLE+RAM+BATTERY");
    }

    #[test]
    fn test_unsupported_types_are_errors() {
        for code in [0x05, 0x06, 0x08, 0x09, 0x0B, 0x20, 0xFC, 0xFE, 0xFF, 0xAA] {
            assert!(
                matches!(
                    CartridgeType::from_code(code),
                    Err(CartridgeError::UnsupportedCartridgeType(c)) if c == code
                ),
                "code {:02X} should be rejected",
                code
            );
        }
    }
}

//! Game Boy Memory Bank Controllers (MBCs)
//!
//! Each controller decodes the cartridge half of the address space:
//!
//! - 0x0000-0x3FFF: fixed ROM bank 0
//! - 0x4000-0x7FFF: switchable ROM bank; writes hit the controller registers
//! - 0xA000-0xBFFF: external RAM, or the RTC window on MBC3

mod mbc0;
mod mbc1;
mod mbc3;
mod mbc5;

pub use mbc0::Mbc0;
pub use mbc1::Mbc1;
pub use mbc3::Mbc3;
pub use mbc5::Mbc5;

use crate::battery::BatteryFile;
use crate::config::SaveConfig;
use crate::header::{CartridgeType, ControllerKind};
use crate::CartridgeError;
use gbcart_core::logging::{log, LogCategory, LogLevel};
use gbcart_core::WallClock;
use std::path::Path;

/// Open a save file, tagging failures with its path.
pub(crate) fn open_battery(
    path: &Path,
    snapshot: &mut [u8],
    durable: bool,
) -> Result<BatteryFile, CartridgeError> {
    BatteryFile::open(path, snapshot, durable).map_err(|source| CartridgeError::Battery {
        path: path.to_path_buf(),
        source,
    })
}

/// Unified mapper enum that dispatches to specific implementations
#[derive(Debug)]
pub enum Mapper {
    Mbc0(Mbc0),
    Mbc1(Mbc1),
    Mbc3(Mbc3),
    Mbc5(Mbc5),
}

impl Mapper {
    /// Build the controller for `cart_type`.
    ///
    /// Battery-backed carts open (or create) their save file under the
    /// configured save root, named after `rom_path`. `clock` is only consulted
    /// by carts with a timer.
    pub fn from_cart(
        rom: Vec<u8>,
        cart_type: CartridgeType,
        ram_size: usize,
        rom_path: &Path,
        config: &SaveConfig,
        clock: Box<dyn WallClock>,
    ) -> Result<Self, CartridgeError> {
        let mut ram = vec![0; if cart_type.ram { ram_size } else { 0 }];
        let battery_path = cart_type.battery.then(|| config.battery_path(rom_path));

        log(LogCategory::Cartridge, LogLevel::Info, || {
            format!(
                "Cartridge type {:02X} ({}), {} KiB ROM, {} KiB RAM, save file {}",
                cart_type.code,
                cart_type.name(),
                rom.len() / 1024,
                ram.len() / 1024,
                battery_path
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| "none".to_string())
            )
        });

        let durable = config.durable_writes;
        let mapper = match cart_type.controller {
            ControllerKind::RomOnly => Mapper::Mbc0(Mbc0::new(rom)),
            ControllerKind::Linear => {
                let battery = match &battery_path {
                    Some(path) => Some(open_battery(path, &mut ram, durable)?),
                    None => None,
                };
                Mapper::Mbc1(Mbc1::new(rom, ram, battery))
            }
            ControllerKind::WideWithClock => match &battery_path {
                Some(path) => Mapper::Mbc3(Mbc3::with_battery(
                    rom,
                    ram,
                    cart_type.timer,
                    clock,
                    path,
                    durable,
                )?),
                None => Mapper::Mbc3(Mbc3::new(rom, ram, cart_type.timer, clock)),
            },
            ControllerKind::Wide => {
                let battery = match &battery_path {
                    Some(path) => Some(open_battery(path, &mut ram, durable)?),
                    None => None,
                };
                Mapper::Mbc5(Mbc5::new(rom, ram, battery, cart_type.rumble))
            }
        };
        Ok(mapper)
    }

    /// Read from ROM address space
    pub fn read_rom(&self, addr: u16) -> u8 {
        match self {
            Mapper::Mbc0(m) => m.read_rom(addr),
            Mapper::Mbc1(m) => m.read_rom(addr),
            Mapper::Mbc3(m) => m.read_rom(addr),
            Mapper::Mbc5(m) => m.read_rom(addr),
        }
    }

    /// Write to ROM address space (for mapper registers)
    pub fn write_rom(&mut self, addr: u16, val: u8) {
        match self {
            Mapper::Mbc0(m) => m.write_rom(addr, val),
            Mapper::Mbc1(m) => m.write_rom(addr, val),
            Mapper::Mbc3(m) => m.write_rom(addr, val),
            Mapper::Mbc5(m) => m.write_rom(addr, val),
        }
    }

    /// Read from RAM address space
    pub fn read_ram(&self, addr: u16) -> u8 {
        match self {
            Mapper::Mbc0(m) => m.read_ram(addr),
            Mapper::Mbc1(m) => m.read_ram(addr),
            Mapper::Mbc3(m) => m.read_ram(addr),
            Mapper::Mbc5(m) => m.read_ram(addr),
        }
    }

    /// Write to RAM address space
    pub fn write_ram(&mut self, addr: u16, val: u8) {
        match self {
            Mapper::Mbc0(m) => m.write_ram(addr, val),
            Mapper::Mbc1(m) => m.write_ram(addr, val),
            Mapper::Mbc3(m) => m.write_ram(addr, val),
            Mapper::Mbc5(m) => m.write_ram(addr, val),
        }
    }

    /// Read any cartridge address. Addresses outside cartridge space read 0xFF.
    pub fn read(&self, addr: u16) -> u8 {
        match addr {
            0x0000..=0x7FFF => self.read_rom(addr),
            0xA000..=0xBFFF => self.read_ram(addr),
            _ => {
                log(LogCategory::Bus, LogLevel::Debug, || {
                    format!("Mapper read outside cartridge space: {:04X}", addr)
                });
                0xFF
            }
        }
    }

    /// Write any cartridge address. Addresses outside cartridge space are dropped.
    pub fn write(&mut self, addr: u16, val: u8) {
        match addr {
            0x0000..=0x7FFF => self.write_rom(addr, val),
            0xA000..=0xBFFF => self.write_ram(addr, val),
            _ => log(LogCategory::Bus, LogLevel::Debug, || {
                format!("Mapper write outside cartridge space: {:04X}", addr)
            }),
        }
    }

    /// Advance cartridge hardware by executed CPU cycles (only the MBC3 clock).
    pub fn tick(&mut self, cycles: u32) {
        if let Mapper::Mbc3(m) = self {
            m.tick(cycles);
        }
    }

    /// Flush and close the save file, if any.
    pub fn finalize(&mut self) {
        match self {
            Mapper::Mbc0(_) => {}
            Mapper::Mbc1(m) => m.finalize(),
            Mapper::Mbc3(m) => m.finalize(),
            Mapper::Mbc5(m) => m.finalize(),
        }
    }

    /// Get the cartridge type name
    pub fn name(&self) -> &'static str {
        match self {
            Mapper::Mbc0(_) => "MBC0",
            Mapper::Mbc1(_) => "MBC1",
            Mapper::Mbc3(_) => "MBC3",
            Mapper::Mbc5(_) => "MBC5",
        }
    }

    pub fn debug_state(&self) -> serde_json::Value {
        let mut state = match self {
            Mapper::Mbc0(m) => m.debug_state(),
            Mapper::Mbc1(m) => m.debug_state(),
            Mapper::Mbc3(m) => m.debug_state(),
            Mapper::Mbc5(m) => m.debug_state(),
        };
        if let Some(fields) = state.as_object_mut() {
            fields.insert("mapper".to_string(), self.name().into());
        }
        state
    }
}

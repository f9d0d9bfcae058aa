//! Cartridge facade
//!
//! Owns the bank controller and sits on the CPU's memory bus. Cartridge
//! addresses go to the controller, everything else goes to the shared I/O
//! dispatcher.
//!
//! # Memory Map
//!
//! - 0x0000-0x7FFF: ROM (controller registers on write)
//! - 0x8000-0x9FFF: VRAM (I/O dispatcher)
//! - 0xA000-0xBFFF: External RAM / RTC
//! - 0xC000-0xFFFF: WRAM, echo, OAM, I/O, HRAM, IE (I/O dispatcher)

use crate::config::SaveConfig;
use crate::header::{CartridgeHeader, CartridgeType, ROM_BANK_SIZE};
use crate::mappers::Mapper;
use crate::CartridgeError;
use gbcart_core::logging::{log, LogCategory, LogLevel};
use gbcart_core::{IoBus, SystemClock, WallClock};
use std::path::Path;

fn is_cartridge_address(addr: u16) -> bool {
    matches!(addr, 0x0000..=0x7FFF | 0xA000..=0xBFFF)
}

pub struct Cartridge<B: IoBus> {
    mapper: Mapper,
    header: Option<CartridgeHeader>,
    io: B,
    finalized: bool,
}

impl<B: IoBus> Cartridge<B> {
    /// Wrap an already built controller.
    pub fn new(mapper: Mapper, io: B) -> Self {
        Self {
            mapper,
            header: None,
            io,
            finalized: false,
        }
    }

    /// Load a ROM image using the host clock for the RTC.
    pub fn from_rom(
        rom: Vec<u8>,
        rom_path: &Path,
        config: &SaveConfig,
        io: B,
    ) -> Result<Self, CartridgeError> {
        Self::from_rom_with_clock(rom, rom_path, config, io, Box::new(SystemClock))
    }

    /// Load a ROM image: parse the header, pick the controller and open the
    /// save file if the cartridge has a battery.
    pub fn from_rom_with_clock(
        rom: Vec<u8>,
        rom_path: &Path,
        config: &SaveConfig,
        io: B,
        clock: Box<dyn WallClock>,
    ) -> Result<Self, CartridgeError> {
        let header = CartridgeHeader::parse(&rom)?;
        if rom.len() % ROM_BANK_SIZE != 0 {
            return Err(CartridgeError::RomNotBankAligned(rom.len()));
        }
        let cart_type = CartridgeType::from_code(header.cart_type)?;

        if let Some(declared) = header.rom_size() {
            if declared != rom.len() {
                log(LogCategory::Cartridge, LogLevel::Warn, || {
                    format!(
                        "Header declares {} KiB of ROM, image is {} KiB",
                        declared / 1024,
                        rom.len() / 1024
                    )
                });
            }
        }
        log(LogCategory::Cartridge, LogLevel::Info, || {
            format!("Loading \"{}\" from {}", header.title, rom_path.display())
        });

        let mapper = Mapper::from_cart(rom, cart_type, header.ram_size, rom_path, config, clock)?;
        let mut cart = Self::new(mapper, io);
        cart.header = Some(header);
        Ok(cart)
    }

    pub fn header(&self) -> Option<&CartridgeHeader> {
        self.header.as_ref()
    }

    pub fn mapper(&self) -> &Mapper {
        &self.mapper
    }

    pub fn io(&mut self) -> &mut B {
        &mut self.io
    }

    pub fn read(&mut self, addr: u16) -> u8 {
        if is_cartridge_address(addr) {
            self.mapper.read(addr)
        } else {
            self.io.common_read(addr)
        }
    }

    pub fn write(&mut self, addr: u16, val: u8) {
        if is_cartridge_address(addr) {
            self.mapper.write(addr, val);
        } else {
            self.io.common_write(addr, val);
        }
    }

    /// Called once per executed batch of CPU cycles.
    pub fn tick(&mut self, cycles: u32) {
        self.mapper.tick(cycles);
    }

    /// Flush and close the save file. Further calls do nothing.
    pub fn finalize(&mut self) {
        if self.finalized {
            return;
        }
        self.finalized = true;
        self.mapper.finalize();
        log(LogCategory::Cartridge, LogLevel::Debug, || {
            format!("{} finalized", self.mapper.name())
        });
    }

    pub fn debug_state(&self) -> serde_json::Value {
        let mut state = self.mapper.debug_state();
        if let (Some(fields), Some(header)) = (state.as_object_mut(), &self.header) {
            fields.insert("title".to_string(), header.title.clone().into());
            fields.insert("cart_type".to_string(), header.cart_type.into());
        }
        state
    }
}

impl<B: IoBus> Drop for Cartridge<B> {
    fn drop(&mut self) {
        self.finalize();
    }
}

//! Game Boy cartridge subsystem
//!
//! Bank controllers (ROM only, MBC1, MBC3, MBC5), battery-backed save files
//! and the MBC3 real-time clock, behind a [`Cartridge`] facade that the CPU
//! bus talks to.

pub mod battery;
mod cartridge;
pub mod config;
pub mod header;
pub mod mappers;
pub mod rtc;

use std::path::PathBuf;

pub use cartridge::Cartridge;
pub use config::{ConfigError, SaveConfig};
pub use header::{CartridgeHeader, CartridgeType, ControllerKind};
pub use mappers::Mapper;
pub use rtc::{Rtc, RtcRegisters, RTC_BLOCK_LEN};

fn type_label(code: &u8) -> &'static str {
    header::type_name(*code)
}

#[derive(thiserror::Error, Debug)]
pub enum CartridgeError {
    #[error("Unsupported cartridge type {:#04X} ({})", .0, type_label(.0))]
    UnsupportedCartridgeType(u8),
    #[error("ROM is {0} bytes, too small to hold a header")]
    RomTooSmall(usize),
    #[error("ROM size {0} is not a multiple of 16 KiB")]
    RomNotBankAligned(usize),
    #[error("Unknown RAM size code {0:#04X}")]
    UnknownRamSize(u8),
    #[error("Battery file {}: {source}", .path.display())]
    Battery {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

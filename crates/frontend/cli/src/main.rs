use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use gbcart_core::logging::{LogCategory, LogConfig, LogLevel};
use gbcart_core::{OpenBus, CPU_CLOCK_HZ};
use gbcart_gb::{Cartridge, CartridgeHeader, CartridgeType, Rtc, SaveConfig, RTC_BLOCK_LEN};
use std::fs;
use std::path::{Path, PathBuf};

/// One frame worth of CPU cycles.
const CYCLES_PER_FRAME: u32 = 70_224;

#[derive(Parser)]
#[command(name = "gbcart", about = "Game Boy cartridge and save-file tool")]
struct Args {
    /// Config file (JSON); defaults to `~/.gbcart/config.json`
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override the save root (`<dir>/Battery/<rom>.bat`)
    #[arg(long, global = true)]
    save_dir: Option<PathBuf>,

    /// Sync save files to disk after every write
    #[arg(long, global = true, default_value_t = false)]
    durable: bool,

    /// Global log level (off, error, warn, info, debug, trace)
    #[arg(long, global = true)]
    log_level: Option<LogLevel>,

    /// Per-category override, e.g. `rtc=debug` (repeatable)
    #[arg(long, global = true, value_parser = parse_category_level)]
    log_category: Vec<(LogCategory, LogLevel)>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the header, controller capabilities and save-file location
    Info { rom: PathBuf },
    /// Load the cartridge and run its clock for a number of emulated seconds
    Run {
        rom: PathBuf,

        #[arg(long, default_value_t = 1)]
        seconds: u32,

        /// CPU cycles per tick call
        #[arg(long, default_value_t = CYCLES_PER_FRAME)]
        batch: u32,
    },
    /// Decode the RTC block of an existing save file without touching it
    Rtc { rom: PathBuf },
}

fn parse_category_level(s: &str) -> Result<(LogCategory, LogLevel), String> {
    let (category, level) = s
        .split_once('=')
        .ok_or_else(|| format!("expected <category>=<level>, got {}", s))?;
    let category = category.parse::<LogCategory>()?;
    let level = level.parse::<LogLevel>().map_err(|e| e.to_string())?;
    Ok((category, level))
}

fn read_rom(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).with_context(|| format!("reading ROM {}", path.display()))
}

fn info(rom_path: &Path, config: &SaveConfig) -> Result<()> {
    let rom = read_rom(rom_path)?;
    let header = CartridgeHeader::parse(&rom)?;
    println!("{}", serde_json::to_string_pretty(&header)?);

    let cart_type = CartridgeType::from_code(header.cart_type)?;
    println!("{}", serde_json::to_string_pretty(&cart_type)?);

    if cart_type.battery {
        println!("save file: {}", config.battery_path(rom_path).display());
    }
    Ok(())
}

fn run(rom_path: &Path, config: &SaveConfig, seconds: u32, batch: u32) -> Result<()> {
    if batch == 0 {
        bail!("--batch must be at least 1 cycle");
    }
    let rom = read_rom(rom_path)?;
    let mut cart = Cartridge::from_rom(rom, rom_path, config, OpenBus)?;

    let mut remaining = seconds as u64 * CPU_CLOCK_HZ as u64;
    while remaining > 0 {
        let cycles = remaining.min(batch as u64) as u32;
        cart.tick(cycles);
        remaining -= cycles as u64;
    }

    println!("{}", serde_json::to_string_pretty(&cart.debug_state())?);
    cart.finalize();
    Ok(())
}

fn rtc(rom_path: &Path, config: &SaveConfig) -> Result<()> {
    let rom = read_rom(rom_path)?;
    let header = CartridgeHeader::parse(&rom)?;
    let cart_type = CartridgeType::from_code(header.cart_type)?;
    if !(cart_type.timer && cart_type.battery) {
        bail!("{} has no battery-backed clock", cart_type.name());
    }

    let save_path = config.battery_path(rom_path);
    let save = fs::read(&save_path)
        .with_context(|| format!("reading save file {}", save_path.display()))?;

    let ram_len = if cart_type.ram { header.ram_size } else { 0 };
    let block: &[u8; RTC_BLOCK_LEN] = save
        .get(ram_len..ram_len + RTC_BLOCK_LEN)
        .and_then(|bytes| bytes.try_into().ok())
        .with_context(|| {
            format!(
                "{} is {} bytes, expected {}",
                save_path.display(),
                save.len(),
                ram_len + RTC_BLOCK_LEN
            )
        })?;

    let rtc = Rtc::from_block(block);
    println!("{}", serde_json::to_string_pretty(&rtc)?);
    println!(
        "live: day {} {:02}:{:02}:{:02}{}{}",
        rtc.live.days(),
        rtc.live.hours,
        rtc.live.minutes,
        rtc.live.seconds,
        if rtc.live.halted() { " (halted)" } else { "" },
        if rtc.live.day_carry() { " (day carry)" } else { "" },
    );
    Ok(())
}

fn main() -> Result<()> {
    // LogConfig does the filtering; let everything it admits through.
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("trace")).init();
    let args = Args::parse();

    let config_path = args.config.clone().unwrap_or_else(SaveConfig::default_path);
    let mut config = SaveConfig::load(&config_path);
    if let Some(dir) = args.save_dir {
        config.save_root = Some(dir);
    }
    if args.durable {
        config.durable_writes = true;
    }
    if let Some(level) = args.log_level {
        config.log_level = level;
    }

    let log_config = LogConfig::global();
    log_config.set_global_level(config.log_level);
    for (category, level) in args.log_category {
        log_config.set_level(category, level);
    }

    match args.command {
        Command::Info { rom } => info(&rom, &config),
        Command::Run {
            rom,
            seconds,
            batch,
        } => run(&rom, &config, seconds, batch),
        Command::Rtc { rom } => rtc(&rom, &config),
    }
}

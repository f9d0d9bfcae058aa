//! Battery-backed save file
//!
//! A save file mirrors the cartridge's volatile state byte for byte:
//!
//! ```text
//! [external RAM][RTC block, MBC3 with timer only]
//! ```
//!
//! Opening is create-or-load: an existing file always wins over the in-memory
//! snapshot, a missing one is created from it. Writes go straight to the file
//! and are flushed before returning; nothing is buffered in between.
//!
//! Short reads and writes are logged and otherwise tolerated; the emulator keeps
//! running with whatever made it across.

use gbcart_core::logging::{log, LogCategory, LogLevel};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Open save file owned by one bank controller.
#[derive(Debug)]
pub struct BatteryFile {
    file: File,
    path: PathBuf,
    durable: bool,
}

impl BatteryFile {
    /// Open `path`, or create it from `snapshot`.
    ///
    /// If the file exists its contents are copied over `snapshot`. If it does
    /// not, parent directories are created and the file is written from
    /// `snapshot` so its length matches exactly.
    pub fn open(path: &Path, snapshot: &mut [u8], durable: bool) -> io::Result<Self> {
        let mut battery = if path.exists() {
            let file = OpenOptions::new().read(true).write(true).open(path)?;
            let mut battery = Self {
                file,
                path: path.to_path_buf(),
                durable,
            };
            battery.load(snapshot)?;
            battery
        } else {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            let file = OpenOptions::new()
                .read(true)
                .write(true)
                .create_new(true)
                .open(path)?;
            log(LogCategory::Battery, LogLevel::Info, || {
                format!("Creating battery file {} ({} bytes)", path.display(), snapshot.len())
            });
            let mut battery = Self {
                file,
                path: path.to_path_buf(),
                durable,
            };
            battery.write_range(0, snapshot);
            battery
        };
        battery.sync();
        Ok(battery)
    }

    fn load(&mut self, snapshot: &mut [u8]) -> io::Result<()> {
        let len = self.file.metadata()?.len();
        log(LogCategory::Battery, LogLevel::Info, || {
            format!("Loading battery file {} ({} bytes)", self.path.display(), len)
        });
        if len > snapshot.len() as u64 {
            log(LogCategory::Battery, LogLevel::Warn, || {
                format!(
                    "{} is {} bytes, expected {}; trailing bytes ignored",
                    self.path.display(),
                    len,
                    snapshot.len()
                )
            });
        }
        self.read_range(0, snapshot);
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write one byte at `offset` and flush before returning.
    pub fn write_byte(&mut self, offset: u64, value: u8) {
        self.write_range(offset, &[value]);
    }

    /// Write `bytes` at `offset` and flush before returning.
    pub fn write_range(&mut self, offset: u64, bytes: &[u8]) {
        match self.write_at(offset, bytes) {
            Ok(written) if written == bytes.len() => {}
            Ok(written) => log(LogCategory::Battery, LogLevel::Warn, || {
                format!(
                    "Short write to {} at {:#X}: {} of {} bytes",
                    self.path.display(),
                    offset,
                    written,
                    bytes.len()
                )
            }),
            Err(e) => log(LogCategory::Battery, LogLevel::Error, || {
                format!("Write to {} at {:#X} failed: {}", self.path.display(), offset, e)
            }),
        }
    }

    /// Fill `buf` from `offset`. On a short read the tail of `buf` is left as is.
    pub fn read_range(&mut self, offset: u64, buf: &mut [u8]) {
        match self.read_at(offset, buf) {
            Ok(read) if read == buf.len() => {}
            Ok(read) => log(LogCategory::Battery, LogLevel::Warn, || {
                format!(
                    "Short read from {} at {:#X}: {} of {} bytes",
                    self.path.display(),
                    offset,
                    read,
                    buf.len()
                )
            }),
            Err(e) => log(LogCategory::Battery, LogLevel::Error, || {
                format!("Read from {} at {:#X} failed: {}", self.path.display(), offset, e)
            }),
        }
    }

    fn write_at(&mut self, offset: u64, bytes: &[u8]) -> io::Result<usize> {
        self.file.seek(SeekFrom::Start(offset))?;
        let mut written = 0;
        while written < bytes.len() {
            match self.file.write(&bytes[written..]) {
                Ok(0) => break,
                Ok(n) => written += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
        self.file.flush()?;
        if self.durable {
            self.file.sync_data()?;
        }
        Ok(written)
    }

    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        self.file.seek(SeekFrom::Start(offset))?;
        let mut read = 0;
        while read < buf.len() {
            match self.file.read(&mut buf[read..]) {
                Ok(0) => break,
                Ok(n) => read += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
        Ok(read)
    }

    fn sync(&mut self) {
        if let Err(e) = self.file.sync_all() {
            log(LogCategory::Battery, LogLevel::Warn, || {
                format!("Failed to sync {}: {}", self.path.display(), e)
            });
        }
    }

    /// Flush to disk and release the handle.
    pub fn close(mut self) {
        self.sync();
        log(LogCategory::Battery, LogLevel::Debug, || {
            format!("Closed battery file {}", self.path.display())
        });
    }
}

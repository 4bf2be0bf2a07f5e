use alloc::format;
use alloc::vec::Vec;

use embassy_time::Delay;
use embedded_hal_bus::spi::ExclusiveDevice;
use embedded_sdmmc::{
    BlockDevice, Error, Mode, SdCard, TimeSource, Timestamp, VolumeIdx, VolumeManager,
};
use esp_hal::gpio::Output;
use esp_hal::spi::master::Spi;
use esp_hal::time::Rate;
use esp_hal::{spi, Blocking};
use log::{info, warn};
use readerplayer::registry::{parse_lines, Assignment, MemoryStore, RegistryStore, StoreError};
use readerplayer::config::CONFIG_FILES;
use readerplayer::{DeviceConfig, PrintErr};

const REGISTRY_FILE: &str = "TAGS.JSL";

pub type SdSpi = ExclusiveDevice<Spi<'static, Blocking>, Output<'static>, Delay>;
pub type Card = SdCard<SdSpi, Delay>;

/// Code from https://github.com/rp-rs/rp-hal-boards/blob/main/boards/rp-pico/examples/pico_spi_sd_card.rs
/// A dummy timesource, which is mostly important for creating files.
#[derive(Default)]
pub struct DummyTimesource();

impl TimeSource for DummyTimesource {
    // In theory you could use the RTC of the rp2040 here, if you had
    // any external time synchronizing device.
    fn get_timestamp(&self) -> Timestamp {
        Timestamp {
            year_since_1970: 0,
            zero_indexed_month: 0,
            zero_indexed_day: 0,
            hours: 0,
            minutes: 0,
            seconds: 0,
        }
    }
}

/// Files in the root directory of the first FAT volume.
pub struct SdStorage<D: BlockDevice, T: TimeSource> {
    volume_mgr: VolumeManager<D, T>,
}

impl<D: BlockDevice, T: TimeSource> SdStorage<D, T> {
    pub fn new(volume_mgr: VolumeManager<D, T>) -> Self {
        Self { volume_mgr }
    }

    pub fn read_file(&self, name: &str) -> Result<Vec<u8>, Error<D::Error>> {
        let volume = self.volume_mgr.open_volume(VolumeIdx(0))?;
        let root_dir = volume.open_root_dir()?;
        let file = root_dir.open_file_in_dir(name, Mode::ReadOnly)?;

        let mut bytes = Vec::new();
        let mut buffer = [0u8; 128];
        while !file.is_eof() {
            let n = file.read(&mut buffer)?;
            bytes.extend(&buffer[..n]);
        }
        Ok(bytes)
    }

    pub fn append_file(&self, name: &str, bytes: &[u8]) -> Result<(), Error<D::Error>> {
        let volume = self.volume_mgr.open_volume(VolumeIdx(0))?;
        let root_dir = volume.open_root_dir()?;
        let file = root_dir.open_file_in_dir(name, Mode::ReadWriteCreateOrAppend)?;
        file.write(bytes)?;
        file.close()
    }
}

impl<D: BlockDevice, T: TimeSource> RegistryStore for SdStorage<D, T> {
    fn load(&mut self) -> Result<Vec<Assignment>, StoreError> {
        let bytes = match self.read_file(REGISTRY_FILE) {
            Ok(bytes) => bytes,
            Err(Error::NotFound) => return Ok(Vec::new()),
            Err(err) => return Err(StoreError::Io(format!("{:?}", err))),
        };
        let text = core::str::from_utf8(&bytes).map_err(|_| StoreError::InvalidUtf8)?;
        Ok(parse_lines(text))
    }

    fn append(&mut self, assignment: &Assignment) -> Result<(), StoreError> {
        let line = readerplayer::registry::encode_line(assignment)?;
        self.append_file(REGISTRY_FILE, line.as_bytes())
            .map_err(|err| StoreError::Io(format!("{:?}", err)))
    }
}

/// Where tag assignments go: the SD card, or RAM when no card is inserted.
pub enum Storage {
    Card(SdStorage<Card, DummyTimesource>),
    Memory(MemoryStore),
}

impl Storage {
    pub fn init(spi_bus: Spi<'static, Blocking>, cs: Output<'static>) -> Self {
        let spi_dev = match ExclusiveDevice::new(spi_bus, cs, Delay) {
            Ok(spi_dev) => spi_dev,
            Err(err) => {
                warn!("SD card chip select unusable: {:?}", err);
                return Self::Memory(MemoryStore::new());
            }
        };

        let sdcard = SdCard::new(spi_dev, Delay);
        match sdcard.num_bytes() {
            Ok(size) => info!("Card size is {} bytes", size),
            Err(err) => {
                warn!("No SD card, tag assignments will not be saved: {:?}", err);
                return Self::Memory(MemoryStore::new());
            }
        }

        sdcard.spi(|spi| {
            spi.bus_mut().apply_config(
                &spi::master::Config::default()
                    .with_frequency(Rate::from_mhz(8))
                    .with_mode(spi::Mode::_0),
            )
        })
        .print_err("Failed to speed up SD card bus");

        Self::Card(SdStorage::new(VolumeManager::new(
            sdcard,
            DummyTimesource::default(),
        )))
    }

    /// Missing or invalid configuration falls back to the defaults.
    pub fn read_config(&self) -> DeviceConfig {
        let Self::Card(card) = self else {
            return DeviceConfig::default();
        };

        let Some(bytes) = CONFIG_FILES
            .iter()
            .find_map(|name| card.read_file(name).ok())
        else {
            info!("No configuration file, using defaults");
            return DeviceConfig::default();
        };

        DeviceConfig::from_json(&bytes)
            .print_err("Ignoring configuration file")
            .unwrap_or_default()
    }
}

impl RegistryStore for Storage {
    fn load(&mut self) -> Result<Vec<Assignment>, StoreError> {
        match self {
            Self::Card(card) => card.load(),
            Self::Memory(memory) => memory.load(),
        }
    }

    fn append(&mut self, assignment: &Assignment) -> Result<(), StoreError> {
        match self {
            Self::Card(card) => card.append(assignment),
            Self::Memory(memory) => memory.append(assignment),
        }
    }
}

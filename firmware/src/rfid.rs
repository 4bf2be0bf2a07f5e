use embassy_time::Delay;
use embedded_hal_bus::spi::ExclusiveDevice;
use esp_hal::gpio::{AnyPin, Level, Output, OutputConfig};
use esp_hal::spi::master::{AnySpi, Spi};
use esp_hal::time::Rate;
use esp_hal::{spi, Blocking};
use mfrc522::comm::blocking::spi::{DummyDelay, SpiInterface};
use mfrc522::Mfrc522;
use readerplayer::reader::Mfrc522Reader;

pub type Reader = Mfrc522Reader<
    SpiInterface<ExclusiveDevice<Spi<'static, Blocking>, Output<'static>, Delay>, DummyDelay>,
>;

/// Brings up the MFRC522 on its own SPI bus. The firmware cannot do
/// anything useful without the reader, so failures here are fatal.
pub fn init_reader(
    spi: AnySpi<'static>,
    sck: AnyPin<'static>,
    mosi: AnyPin<'static>,
    miso: AnyPin<'static>,
    cs: AnyPin<'static>,
) -> Reader {
    let rfid_spi_bus = Spi::new(
        spi,
        spi::master::Config::default()
            .with_frequency(Rate::from_mhz(5))
            .with_mode(spi::Mode::_0),
    )
    .unwrap()
    .with_sck(sck)
    .with_mosi(mosi)
    .with_miso(miso);

    let rfid_cs = Output::new(cs, Level::High, OutputConfig::default());

    let spi_dev = ExclusiveDevice::new(rfid_spi_bus, rfid_cs, Delay).unwrap();

    let spi_interface = SpiInterface::new(spi_dev);
    let rfid = Mfrc522::new(spi_interface)
        .init()
        .expect("Failed to initialize RFID reader");

    Mfrc522Reader::new(rfid)
}

#![no_std]
#![no_main]
#![deny(
    clippy::mem_forget,
    reason = "mem::forget is generally not safe to do with esp_hal types, especially those \
    holding buffers for the duration of a data transfer."
)]

use embassy_executor::Spawner;
use embassy_futures::select::{select, Either};
use embassy_sync::blocking_mutex::raw::NoopRawMutex;
use embassy_sync::mutex::Mutex;
use embassy_time::{Duration, Instant, Timer};
use esp_hal::clock::CpuClock;
use esp_hal::gpio::{Input, InputConfig, Level, Output, OutputConfig, Pull};
use esp_hal::spi::master::Spi;
use esp_hal::time::Rate;
use esp_hal::timer::timg::TimerGroup;
use esp_hal::uart::{self, Uart};
use esp_hal::spi;
use esp_wifi::EspWifiController;
use firmware::mk_static;
use firmware::sd::Storage;
use firmware::wifi::Credentials;
use log::{info, warn};
use readerplayer::dfplayer::DfPlayer;
use readerplayer::{ReaderPlayer, SharedPlayer, TagRegistry};
use {esp_backtrace as _, esp_println as _};

extern crate alloc;

// This creates a default app-descriptor required by the esp-idf bootloader.
// For more information see: <https://docs.espressif.com/projects/esp-idf/en/stable/esp32/api-reference/system/app_image_format.html#application-description>
esp_bootloader_esp_idf::esp_app_desc!();

#[esp_hal_embassy::main]
async fn main(spawner: Spawner) {
    esp_println::logger::init_logger_from_env();

    let config = esp_hal::Config::default().with_cpu_clock(CpuClock::max());
    let peripherals = esp_hal::init(config);

    esp_alloc::heap_allocator!(size: 72 * 1024);

    let timer0 = TimerGroup::new(peripherals.TIMG1);
    esp_hal_embassy::init(timer0.timer0);

    info!("Embassy initialized!");

    // SD card: configuration and tag assignments
    let sd_spi_bus = Spi::new(
        peripherals.SPI3,
        spi::master::Config::default()
            .with_frequency(Rate::from_khz(400))
            .with_mode(spi::Mode::_0),
    )
    .unwrap()
    .with_sck(peripherals.GPIO18)
    .with_mosi(peripherals.GPIO23)
    .with_miso(peripherals.GPIO19);
    let sd_cs = Output::new(peripherals.GPIO5, Level::High, OutputConfig::default());
    let storage = Storage::init(sd_spi_bus, sd_cs);
    let device_config = storage.read_config();
    info!("Config: {:?}", &device_config);

    let reader = firmware::rfid::init_reader(
        peripherals.SPI2.into(),
        peripherals.GPIO14.into(),
        peripherals.GPIO13.into(),
        peripherals.GPIO27.into(),
        peripherals.GPIO26.into(),
    );

    // DFPlayer Mini talks 9600 8N1
    let uart = Uart::new(
        peripherals.UART2,
        uart::Config::default().with_baudrate(9600),
    )
    .unwrap()
    .with_rx(peripherals.GPIO16)
    .with_tx(peripherals.GPIO17)
    .into_async();
    let player = Mutex::<NoopRawMutex, _>::new(DfPlayer::new(uart));

    let led = Output::new(peripherals.GPIO2, Level::Low, OutputConfig::default());
    let button = Input::new(
        peripherals.GPIO4,
        InputConfig::default().with_pull(Pull::Up),
    );

    let rng = esp_hal::rng::Rng::new(peripherals.RNG);
    let timer1 = TimerGroup::new(peripherals.TIMG0);
    let wifi_init = &*mk_static!(
        EspWifiController<'static>,
        esp_wifi::init(timer1.timer0, rng).expect("Failed to initialize WIFI controller")
    );

    let mut machine = ReaderPlayer::new(
        reader,
        SharedPlayer::new(&player),
        button,
        led,
        TagRegistry::open(storage),
        device_config.special_tokens.clone(),
        Instant::now(),
    );
    machine.start(device_config.volume()).await;
    info!("Reader player started");

    let credentials = Credentials::from_config(&device_config);
    let web = async {
        let stack =
            firmware::wifi::start_wifi(wifi_init, peripherals.WIFI, rng, credentials, &spawner)
                .await;
        firmware::web::serve(stack, SharedPlayer::new(&player)).await
    };

    match select(machine.run(), web).await {
        Either::First(()) => info!("Program ended"),
        Either::Second(()) => warn!("Web server stopped"),
    }

    // nothing runs after the end-of-program tag until the next reset
    loop {
        Timer::after(Duration::from_secs(3600)).await;
    }
}

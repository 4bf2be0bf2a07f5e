use alloc::string::String;
use core::net::Ipv4Addr;

use embassy_executor::Spawner;
use embassy_net::{DhcpConfig, Ipv4Cidr, Runner, Stack, StackResources, StaticConfigV4};
use embassy_time::{Duration, Timer};
use enumset::EnumSet;
use esp_hal::{peripherals::WIFI, rng::Rng};
use esp_wifi::{
    wifi::{
        self, AccessPointConfiguration, WifiController, WifiDevice, WifiError, WifiEvent, WifiState,
    },
    EspWifiController,
};
use heapless::Vec;
use log::{info, warn};
use static_cell::make_static;

const AP_SSID: &str = "readerplayer";
const AP_PASSWORD: &str = "12345678";
const CONNECT_ATTEMPTS: usize = 5;

/// Network to join in station mode.
#[derive(Clone)]
pub struct Credentials {
    pub ssid: String,
    pub password: String,
}

impl Credentials {
    pub fn from_config(config: &readerplayer::DeviceConfig) -> Option<Self> {
        config.credentials().map(|(ssid, password)| Self {
            ssid: ssid.into(),
            password: password.into(),
        })
    }
}

/// Joins the configured network, or opens an access point when there is none
/// or it cannot be reached.
pub async fn start_wifi(
    esp_wifi_ctrl: &'static EspWifiController<'static>,
    wifi: WIFI<'static>,
    mut rng: Rng,
    credentials: Option<Credentials>,
    spawner: &Spawner,
) -> Stack<'static> {
    let (controller, interfaces) = esp_wifi::wifi::new(esp_wifi_ctrl, wifi).unwrap();

    if let Some(credentials) = credentials {
        match start_wifi_sta(controller, interfaces.sta, &mut rng, credentials, spawner).await {
            Ok(stack) => stack,
            Err((err, controller)) => {
                warn!("Falling back to access point: {:?}", err);
                start_wifi_ap(controller, interfaces.ap, &mut rng, spawner).await
            }
        }
    } else {
        start_wifi_ap(controller, interfaces.ap, &mut rng, spawner).await
    }
}

fn net_seed(rng: &mut Rng) -> u64 {
    rng.random() as u64 | ((rng.random() as u64) << 32)
}

pub async fn start_wifi_ap(
    mut controller: WifiController<'static>,
    device: WifiDevice<'static>,
    rng: &mut Rng,
    spawner: &Spawner,
) -> Stack<'static> {
    let net_config = embassy_net::Config::ipv4_static(StaticConfigV4 {
        address: Ipv4Cidr::new(Ipv4Addr::new(192, 168, 42, 1), 24),
        gateway: None,
        dns_servers: Vec::new(),
    });

    let (stack, runner) = embassy_net::new(
        device,
        net_config,
        make_static!(StackResources::<3>::new()),
        net_seed(rng),
    );

    let ap_config = AccessPointConfiguration {
        ssid: AP_SSID.into(),
        password: AP_PASSWORD.into(),
        channel: 6,
        auth_method: wifi::AuthMethod::WPA2Personal,
        ..Default::default()
    };

    controller
        .set_configuration(&wifi::Configuration::AccessPoint(ap_config))
        .unwrap();
    controller.start_async().await.unwrap();

    spawner.spawn(connection_task(None, controller)).ok();
    spawner.spawn(net_task(runner)).ok();

    wait_for_connection(stack).await;

    stack
}

pub async fn start_wifi_sta(
    mut controller: WifiController<'static>,
    device: WifiDevice<'static>,
    rng: &mut Rng,
    credentials: Credentials,
    spawner: &Spawner,
) -> Result<Stack<'static>, (WifiError, WifiController<'static>)> {
    let net_config = embassy_net::Config::dhcpv4(DhcpConfig::default());

    let (stack, runner) = embassy_net::new(
        device,
        net_config,
        make_static!(StackResources::<3>::new()),
        net_seed(rng),
    );

    let mut last_error = None;
    for _ in 0..CONNECT_ATTEMPTS {
        match wifi_connect(&credentials, &mut controller).await {
            Ok(_) => {
                last_error = None;
                break;
            }
            Err(err) => last_error = Some(err),
        }
    }
    if let Some(err) = last_error {
        controller.stop_async().await.ok();
        return Err((err, controller));
    }

    spawner
        .spawn(connection_task(Some(credentials), controller))
        .ok();
    spawner.spawn(net_task(runner)).ok();

    wait_for_connection(stack).await;

    Ok(stack)
}

async fn wait_for_connection(stack: Stack<'_>) {
    info!("Waiting for link to be up");
    loop {
        if stack.is_link_up() {
            break;
        }
        Timer::after(Duration::from_millis(500)).await;
    }

    info!("Waiting to get IP address...");
    loop {
        if let Some(config) = stack.config_v4() {
            info!("Got IP: {}", config.address);
            break;
        }
        Timer::after(Duration::from_millis(500)).await;
    }
}

/// Reconnects in station mode whenever the link drops.
#[embassy_executor::task]
async fn connection_task(credentials: Option<Credentials>, mut controller: WifiController<'static>) {
    let started_states = [WifiState::StaConnected, WifiState::ApStarted];
    let stopped_events = EnumSet::from_iter([WifiEvent::StaDisconnected, WifiEvent::ApStop]);
    loop {
        if started_states.contains(&esp_wifi::wifi::wifi_state()) {
            // wait until we're no longer connected
            controller.wait_for_events(stopped_events, false).await;
            Timer::after(Duration::from_millis(5000)).await
        }
        if let Some(credentials) = &credentials {
            wifi_connect(credentials, &mut controller).await.ok();
        }
    }
}

async fn wifi_connect(
    credentials: &Credentials,
    controller: &mut WifiController<'static>,
) -> Result<(), WifiError> {
    if !matches!(controller.is_started(), Ok(true)) {
        let client_config = wifi::Configuration::Client(wifi::ClientConfiguration {
            ssid: credentials.ssid.as_str().into(),
            password: credentials.password.as_str().into(),
            ..Default::default()
        });
        controller.set_configuration(&client_config)?;
        info!("Starting wifi");
        controller.start_async().await?;
    }
    info!("Connecting to {}", credentials.ssid.as_str());

    let connect_result = controller.connect_async().await;
    match connect_result {
        Ok(_) => info!("Wifi connected!"),
        Err(e) => {
            warn!("Failed to connect to wifi: {:?}", e);
            Timer::after(Duration::from_millis(5000)).await;
        }
    }

    connect_result
}

#[embassy_executor::task]
async fn net_task(mut runner: Runner<'static, WifiDevice<'static>>) {
    runner.run().await
}

//! tinymcp firmware entry point (ESP32-C6).
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │  Wi-Fi STA ── IP/WIFI events ──▶ LINK_EVENTS ──▶ Lifecycle   │
//! │                                                  │           │
//! │                                   SocketTransport (TCP :8080)│
//! │  UART1 ─────────────────────────▶ SerialTransport (framed)   │
//! │                                          │                   │
//! │                      Dispatcher ◀────────┘                   │
//! │                      echo · system_info · gpio_control       │
//! └──────────────────────────────────────────────────────────────┘
//! ```
#![deny(unused_must_use)]

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use esp_idf_svc::eventloop::EspSystemEventLoop;
use esp_idf_svc::hal::gpio::{AnyIOPin, PinDriver, Pull};
use esp_idf_svc::hal::peripherals::Peripherals;
use esp_idf_svc::hal::uart::{UartDriver, config::Config as UartConfig};
use esp_idf_svc::hal::units::Hertz;
use esp_idf_svc::ipv4::IpEvent;
use esp_idf_svc::nvs::EspDefaultNvsPartition;
use esp_idf_svc::wifi::{
    AuthMethod, BlockingWifi, ClientConfiguration, Configuration, EspWifi, WifiEvent,
};
use log::{error, info, warn};

use tinymcp::adapters::uart;
use tinymcp::drivers::button::{self, PressCounter};
use tinymcp::tools::{self, GpioTool};
use tinymcp::{
    Dispatcher, LifecycleController, LinkEvent, SerialConfig, SerialTransport, ServerConfig,
    SocketConfig, SocketTransport, ToolRegistry, Transport, post_link_event,
};

const WIFI_SSID: &str = match option_env!("TINYMCP_WIFI_SSID") {
    Some(s) => s,
    None => "",
};
const WIFI_PASS: &str = match option_env!("TINYMCP_WIFI_PASS") {
    Some(s) => s,
    None => "",
};

const BUTTON_GPIO: i32 = 9;
const MAIN_POLL: Duration = Duration::from_millis(100);
const RECONNECT_INTERVAL: Duration = Duration::from_secs(5);

fn main() -> Result<()> {
    // ── 1. ESP-IDF bootstrap ──────────────────────────────────
    esp_idf_svc::sys::link_patches();
    esp_idf_logger::init()?;

    info!("tinymcp v{} starting", env!("CARGO_PKG_VERSION"));

    let server_config = ServerConfig::default();
    let socket_config = SocketConfig::default();
    let serial_config = SerialConfig::default();
    server_config.validate()?;
    socket_config.validate()?;
    serial_config.validate()?;

    let peripherals = Peripherals::take()?;
    let sysloop = EspSystemEventLoop::take()?;
    let nvs = EspDefaultNvsPartition::take()?;

    // ── 2. Tools ──────────────────────────────────────────────
    let mut registry = ToolRegistry::new();
    tools::register_builtin(&mut registry, &server_config)?;

    if server_config.enable_gpio_tool {
        let led = PinDriver::output(peripherals.pins.gpio8)?;
        let mut btn = PinDriver::input(peripherals.pins.gpio9)?;
        btn.set_pull(Pull::Up)?;
        let presses = Arc::new(PressCounter::new());
        if let Err(e) = button::attach(BUTTON_GPIO, Arc::clone(&presses)) {
            warn!("button ISR unavailable ({}), press count stays 0", e);
        }
        registry.register(Box::new(GpioTool::new(led, btn, presses)))?;
    }

    let dispatcher = Arc::new(Dispatcher::new(server_config, registry));

    // ── 3. Serial transport (always up) ───────────────────────
    let uart_driver = UartDriver::new(
        peripherals.uart1,
        peripherals.pins.gpio16,
        peripherals.pins.gpio17,
        Option::<AnyIOPin>::None,
        Option::<AnyIOPin>::None,
        &UartConfig::default().baudrate(Hertz(serial_config.baud_rate)),
    )?;
    let (rx, tx) = uart::split(uart_driver, Duration::from_millis(20));
    let mut serial = SerialTransport::new(serial_config, rx, tx);
    serial.set_message_handler(dispatcher.message_handler());
    serial.start().context("serial transport")?;

    // ── 4. Wi-Fi + connectivity events ────────────────────────
    let _ip_sub = sysloop.subscribe::<IpEvent, _>(|event| {
        if let IpEvent::DhcpIpAssigned(_) = event {
            post_link_event(LinkEvent::Up);
        }
    })?;
    let _wifi_sub = sysloop.subscribe::<WifiEvent, _>(|event| {
        if let WifiEvent::StaDisconnected(_) = event {
            post_link_event(LinkEvent::Down);
        }
    })?;

    let mut wifi = BlockingWifi::wrap(
        EspWifi::new(peripherals.modem, sysloop.clone(), Some(nvs))?,
        sysloop,
    )?;
    wifi.set_configuration(&Configuration::Client(ClientConfiguration {
        ssid: WIFI_SSID
            .try_into()
            .map_err(|()| anyhow::anyhow!("SSID too long"))?,
        password: WIFI_PASS
            .try_into()
            .map_err(|()| anyhow::anyhow!("password too long"))?,
        auth_method: if WIFI_PASS.is_empty() {
            AuthMethod::None
        } else {
            AuthMethod::WPA2Personal
        },
        ..Default::default()
    }))?;
    wifi.start()?;
    if let Err(e) = wifi.wifi_mut().connect() {
        warn!("Wi-Fi connect failed: {}", e);
    }

    // ── 5. Lifecycle loop ─────────────────────────────────────
    let mut lifecycle =
        LifecycleController::new(SocketTransport::new(socket_config), Arc::clone(&dispatcher));
    let mut last_attempt = Instant::now();

    loop {
        lifecycle.poll_link_events();

        if last_attempt.elapsed() >= RECONNECT_INTERVAL {
            if !lifecycle.is_link_up() {
                last_attempt = Instant::now();
                if let Err(e) = wifi.wifi_mut().connect() {
                    warn!("Wi-Fi reconnect failed: {}", e);
                }
            } else if !lifecycle.transport().is_running() {
                // Bind failed on the last Up.
                last_attempt = Instant::now();
                if let Err(e) = lifecycle.on_link_up() {
                    error!("socket transport retry: {}", e);
                }
            }
        }

        std::thread::sleep(MAIN_POLL);
    }
}

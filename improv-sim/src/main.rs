//! Simulated Improv device
//!
//! Runs the provisioning engine against a simulated radio and exposes the
//! serial line on a TCP port, so `improv-cli` (or any Improv host bridged
//! to TCP) can provision it.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use improv_mcu::{ErrorCode, JsonFileStorage, PollStatus, Provisioner, Storage, SystemClock};
use improv_sim::{SerialBridge, SimConfig, SimWifi, improv_home};
use log::{info, warn};

const CONFIG_FILE: &str = "sim.json";
const CREDENTIALS_FILE: &str = "wifi.json";
const POLL_INTERVAL: Duration = Duration::from_millis(10);
const RESTART_DELAY: Duration = Duration::from_secs(5);

#[derive(Parser)]
#[command(name = "improv-sim")]
#[command(about = "Simulated Improv serial device")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the device, serving its serial line over TCP
    Run {
        /// Address to listen on
        #[arg(short, long, default_value = "127.0.0.1:3333")]
        listen: String,
        /// Config file (default: $IMPROV_HOME/sim.json)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Write the default config to $IMPROV_HOME/sim.json
    InitConfig,
    /// Forget stored WiFi credentials
    Forget,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let home = improv_home()?;
    let storage = JsonFileStorage::new(home.join(CREDENTIALS_FILE));

    match cli.command {
        Commands::Run { listen, config } => {
            let path = config.unwrap_or_else(|| home.join(CONFIG_FILE));
            let config = SimConfig::load(&path)?;
            run(&listen, config, storage)?;
        }
        Commands::InitConfig => {
            let path = home.join(CONFIG_FILE);
            if path.exists() {
                return Err(format!("{} already exists", path.display()).into());
            }
            std::fs::write(&path, serde_json::to_vec_pretty(&SimConfig::default())?)?;
            println!("Wrote {}", path.display());
        }
        Commands::Forget => {
            let mut storage = storage;
            storage.clear_wifi_credentials()?;
            println!("Cleared {}", storage.path().display());
        }
    }

    Ok(())
}

fn run(
    listen: &str,
    config: SimConfig,
    storage: JsonFileStorage,
) -> Result<(), Box<dyn std::error::Error>> {
    let bridge = SerialBridge::bind(listen)?;
    info!("Serial line listening on {}", bridge.local_addr()?);
    info!(
        "Device: {} ({} {}, {})",
        config.device.device_name,
        config.device.firmware_name,
        config.device.firmware_version,
        config.device.chip_family.as_str()
    );

    let wifi = SimWifi::from_config(&config);
    let mut device = Provisioner::new(
        bridge,
        wifi,
        storage,
        SystemClock::new(),
        config.device,
        config.engine,
    );

    device.on_connected(|ssid, _password| info!("Connected to '{ssid}'"));
    device.on_disconnected(|| warn!("WiFi link lost"));
    device.on_error(|code| match code {
        ErrorCode::ConnectGiveup => warn!("Reconnection gave up"),
        code => info!("Error: {code}"),
    });

    let mut last = None;
    loop {
        let status = device.poll();
        if last != Some(status) {
            info!("Status: {status:?}");
            last = Some(status);
        }

        if status == PollStatus::GaveUp {
            // firmware would reboot here
            std::thread::sleep(RESTART_DELAY);
            info!("Restarting connection attempts");
            device.clear_failure();
        }
        std::thread::sleep(POLL_INTERVAL);
    }
}

//! Improv provisioning tool
//!
//! Talks the Improv serial protocol to a device whose serial line is
//! reachable over TCP (for example `improv-sim`, or a ser2net bridge).

mod client;

use std::time::Duration;

use clap::{Parser, Subcommand};
use client::Client;
use improv_proto::State;
use tokio::net::TcpStream;

#[derive(Parser)]
#[command(name = "improv")]
#[command(about = "Improv serial provisioning tool")]
struct Cli {
    /// Address of the device's serial bridge
    #[arg(short, long, default_value = "127.0.0.1:3333", global = true)]
    device: String,
    /// Seconds to wait for each reply
    #[arg(short, long, default_value = "15", global = true)]
    timeout: u64,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the provisioning state
    State,
    /// Show firmware and hardware details
    Info,
    /// List the networks the device can see
    Scan,
    /// Send WiFi credentials to the device
    Provision {
        /// Network name (overrides the credentials file)
        #[arg(short, long)]
        ssid: Option<String>,
        /// Network password, used together with --ssid
        #[arg(short, long, default_value = "")]
        password: String,
        /// WiFi credentials file (SSID on line 1, password on line 2)
        #[arg(short, long, default_value = "wifi_credentials.txt")]
        file: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();
    let stream = TcpStream::connect(&cli.device).await?;
    let mut client = Client::new(stream, Duration::from_secs(cli.timeout));

    match cli.command {
        Commands::State => {
            let (state, url) = client.current_state().await?;
            println!("State: {}", state_name(state));
            if let Some(url) = url {
                println!("URL:   {url}");
            }
        }
        Commands::Info => {
            let fields = client.device_info().await?;
            let labels = ["Firmware", "Version", "Chip", "Device"];
            for (label, value) in labels.iter().zip(&fields) {
                println!("{label:<9} {value}");
            }
        }
        Commands::Scan => {
            let networks = client.scan().await?;
            println!("Found {} networks:", networks.len());
            for network in networks {
                let lock = if network.auth_required { "secured" } else { "open" };
                println!("  {:<32} {:>4} dBm  {}", network.ssid, network.rssi, lock);
            }
        }
        Commands::Provision {
            ssid,
            password,
            file,
        } => {
            let (ssid, password) = match ssid {
                Some(ssid) => (ssid, password),
                None => read_wifi_credentials(&file)?,
            };

            println!("Sending WiFi credentials...");
            println!("  SSID: {ssid}");
            let url = client
                .provision(&ssid, &password, |state| println!("  -> {}", state_name(state)))
                .await?;

            println!("Device joined '{ssid}'");
            if let Some(url) = url {
                println!("Continue setup at {url}");
            }
        }
    }

    Ok(())
}

fn read_wifi_credentials(file: &str) -> Result<(String, String), Box<dyn std::error::Error>> {
    let content = std::fs::read_to_string(file)?;
    let mut lines = content.lines();
    let ssid = lines.next().ok_or("Missing SSID in credentials file")?.trim().to_string();
    let password = lines.next().unwrap_or_default().trim().to_string();
    Ok((ssid, password))
}

fn state_name(state: State) -> &'static str {
    match state {
        State::Stopped => "stopped",
        State::Authorized => "ready",
        State::Provisioning => "provisioning",
        State::Provisioned => "provisioned",
    }
}

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use mbus_decode::util::parse_hex_lenient;
use mbus_decode::{
    init_logger, log_debug, log_error, log_info, log_warn, MBusConnection, MBusMessage, MBusResponse, SerialConfig, SyncConfig,
    VariableDataStructure,
};
use std::time::Duration;

#[derive(Parser)]
#[command(name = "mbus-cli")]
#[command(about = "Decode M-Bus telegrams and read meters")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Decode a long frame given as hex (spaces allowed)
    Decode {
        hex: String,
        #[arg(long)]
        json: bool,
    },
    /// Read a meter over a serial port
    Serial {
        port: String,
        #[arg(short, long)]
        address: u8,
        #[arg(short, long, default_value = "2400")]
        baudrate: u32,
        #[arg(long)]
        json: bool,
    },
    /// Read a meter through a TCP level converter
    Tcp {
        addr: String,
        #[arg(short, long)]
        address: u8,
        /// Read timeout in milliseconds
        #[arg(long, default_value = "500")]
        timeout_ms: u64,
        #[arg(long)]
        json: bool,
    },
}

fn print_data(data: &VariableDataStructure, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(data)?);
    } else {
        print!("{data}");
    }
    Ok(())
}

fn print_response(response: &MBusResponse, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(response)?);
    } else {
        println!(
            "Address {} ({} telegram(s))",
            response.address_field, response.telegram_count
        );
        print!("{}", response.data);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logger();

    let cli = Cli::parse();

    if let Err(e) = run(cli.command).await {
        log_error(&format!("{e:#}"));
        return Err(e);
    }
    Ok(())
}

async fn run(command: Commands) -> Result<()> {
    match command {
        Commands::Decode { hex, json } => {
            let bytes = parse_hex_lenient(&hex).context("invalid hex telegram")?;
            log_debug(&format!("Decoding {} bytes", bytes.len()));
            let message = MBusMessage::decode(&bytes, bytes.len()).context("invalid frame")?;
            let mut data = VariableDataStructure::new();
            let decoded = message.decode_variable_data(&mut data);
            print_data(&data, json)?;
            if decoded.is_err() {
                log_warn(&format!("Kept {} records before the failing one", data.records().len()));
            }
            decoded.context("data block decoded only partially")?;
        }
        Commands::Serial {
            port,
            address,
            baudrate,
            json,
        } => {
            let mut connection =
                MBusConnection::connect_serial(&port, SerialConfig::for_baudrate(baudrate))
                    .with_context(|| format!("cannot open {port}"))?;
            let response = connection
                .read(address)
                .await
                .with_context(|| format!("readout of address {address} failed"))?;
            log_info(&format!("Received {} records", response.records().len()));
            print_response(&response, json)?;
        }
        Commands::Tcp {
            addr,
            address,
            timeout_ms,
            json,
        } => {
            let config = SyncConfig::default().with_read_timeout(Duration::from_millis(timeout_ms));
            let mut connection = MBusConnection::connect_tcp(&addr, config)
                .await
                .with_context(|| format!("cannot connect to {addr}"))?;
            let response = connection
                .read(address)
                .await
                .with_context(|| format!("readout of address {address} failed"))?;
            log_info(&format!("Received {} records", response.records().len()));
            print_response(&response, json)?;
        }
    }

    Ok(())
}

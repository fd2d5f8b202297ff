use anyhow::{Context, Result};
use clap::Parser;
use clap_verbosity_flag::{InfoLevel, Verbosity};
use daqboard_lib::{BoardConfig, list_boards};
use daqboard_rs::cli::setup_logging;
use tracing::info;

/// Lists attached DAQ boards.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// List every USB device, not only DAQ boards.
    #[arg(short, long)]
    all: bool,
    #[command(flatten)]
    verbose: Verbosity<InfoLevel>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let _guard = setup_logging(None, &cli.verbose)?;

    if cli.all {
        return list_all_devices();
    }

    let boards = list_boards(&BoardConfig::default()).context("Failed to list USB devices")?;
    if boards.is_empty() {
        info!("No DAQ board found.");
    }
    for (i, board) in boards.iter().enumerate() {
        info!(
            "Board #{}: Bus: {:03}, Address: {:03}, Serial: {}, Product: {}",
            i + 1,
            board.bus_number,
            board.device_address,
            board.serial_number.as_deref().unwrap_or("<Not available>"),
            board.product.as_deref().unwrap_or("<Not available>"),
        );
    }
    Ok(())
}

fn list_all_devices() -> Result<()> {
    info!("Listing connected USB devices...");
    let mut count = 0;
    for device_info in nusb::list_devices().context("Failed to list USB devices")? {
        count += 1;
        info!(
            "Device #{}: VID: {:#06x}, PID: {:#06x}, Bus: {:03}, Address: {:03}, Speed: {:?}",
            count,
            device_info.vendor_id(),
            device_info.product_id(),
            device_info.bus_number(),
            device_info.device_address(),
            device_info.speed()
        );
        info!(
            "  Manufacturer: {}",
            device_info.manufacturer_string().unwrap_or("<Not available>")
        );
        info!("  Product: {}", device_info.product_string().unwrap_or("<Not available>"));
    }
    if count == 0 {
        info!("No USB devices found.");
    }
    Ok(())
}

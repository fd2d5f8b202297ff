use anyhow::{Context, Result};
use clap::Parser;
use clap_verbosity_flag::{InfoLevel, Verbosity};
use daqboard_lib::protocol::DEFAULT_RESET_DURATION;
use daqboard_lib::telemetry::kelvin_to_celsius;
use daqboard_rs::cli::{BoardArgs, setup_logging};
use std::path::PathBuf;
use std::process;
use tracing::{error, info, warn};

/// Prints identification and supply monitoring of a DAQ board.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(flatten)]
    board: BoardArgs,
    /// Soft-reset the FPGA before reading anything.
    #[arg(long)]
    reset_fpga: bool,
    /// Reset pulse duration.
    #[arg(long, default_value_t = DEFAULT_RESET_DURATION)]
    reset_duration: u32,
    /// Optional path to a file to write logs to, in addition to the console.
    #[arg(short, long)]
    log_file: Option<PathBuf>,
    #[command(flatten)]
    verbose: Verbosity<InfoLevel>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let _guard = setup_logging(cli.log_file.clone(), &cli.verbose)?;

    if let Err(e) = run(cli).await {
        error!("Board info failed: {:?}", e);
        process::exit(1);
    }
    Ok(())
}

async fn run(cli: Cli) -> Result<()> {
    let (_, mut board) = cli.board.open().await?;

    if cli.reset_fpga {
        board
            .reset_fpga(cli.reset_duration)
            .await
            .context("FPGA reset failed")?;
    }

    let firmware = board.read_firmware_version().await.context("Failed to read firmware")?;
    let address = board.board_address().await.context("Failed to read board address")?;
    info!("Firmware:       {}", firmware);
    info!("Firmware type:  {:#04x}", firmware.firmware_type());
    info!("Board address:  {}", address);

    let kelvin = board.read_temperature().await?;
    info!("Temperature:    {:.1} °C", kelvin_to_celsius(kelvin));
    info!("I(1.8 V digital) = {:.2} mA", board.read_digital_current().await?);
    info!("I(1.8 V output)  = {:.2} mA", board.read_output_current().await?);
    info!("I(1.8 V analog)  = {:.2} mA", board.read_analog_current().await?);

    let status = board.ldo_status().await.context("Failed to read LDO status")?;
    if status.all_on() {
        info!("LDOs on");
    } else {
        warn!("LDOs off: {:?}", status.ldo_on);
    }
    if status.overflow.digital {
        warn!("Overflow in digital current");
    }
    if status.overflow.digital_io {
        warn!("Overflow in digital I/O current");
    }
    if status.overflow.analog {
        warn!("Overflow in analogue current");
    }
    Ok(())
}

use anyhow::{Context, Result};
use clap::Args;
use clap_verbosity_flag::{InfoLevel, Verbosity};
use daqboard_lib::{BoardConfig, DaqBoard, UsbTransport, open_board};
use std::fs::File;
use std::path::PathBuf;
use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Board selection options shared by every tool.
#[derive(Args, Debug)]
pub struct BoardArgs {
    /// Board settings file (TOML).
    #[arg(short, long)]
    pub config: Option<PathBuf>,
    /// USB bus of the board, when several are attached.
    #[arg(long, requires = "address")]
    pub bus: Option<u8>,
    /// USB device address of the board.
    #[arg(long, requires = "bus")]
    pub address: Option<u8>,
    /// Do not reset the USB port on open.
    #[arg(long)]
    pub no_reset: bool,
}

impl BoardArgs {
    pub fn board_config(&self) -> Result<BoardConfig> {
        let mut config = match &self.config {
            Some(path) => BoardConfig::load(path)
                .with_context(|| format!("Failed to load board config from {}", path.display()))?,
            None => BoardConfig::default(),
        };
        if let (Some(bus), Some(address)) = (self.bus, self.address) {
            config = config.with_location(bus, address);
        }
        if self.no_reset {
            config = config.skip_reset(true);
        }
        Ok(config)
    }

    /// Loads the settings once and opens the board with them.
    pub async fn open(&self) -> Result<(BoardConfig, DaqBoard<UsbTransport>)> {
        let config = self.board_config()?;
        let board = open_board(&config).await.context("Failed to open DAQ board")?;
        Ok((config, board))
    }
}

/// Console logging, plus an optional plain-text copy in `log_file`.
pub fn setup_logging(log_file: Option<PathBuf>, verbosity: &Verbosity<InfoLevel>) -> Result<Option<WorkerGuard>> {
    let console_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stdout)
        .with_target(false)
        .without_time();

    let (file_layer, guard) = if let Some(ref path) = log_file {
        let file = File::create(path).with_context(|| format!("Failed to create log file at: {:?}", path))?;
        let (writer, guard) = tracing_appender::non_blocking(file);
        let layer = tracing_subscriber::fmt::layer()
            .with_writer(writer)
            .with_ansi(false)
            .with_target(false);
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    let filter = EnvFilter::builder()
        .with_default_directive(verbosity.tracing_level_filter().into())
        .from_env_lossy();

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    if let Some(path) = log_file {
        info!("Logging to file: {:?}", path);
    }
    Ok(guard)
}

/// Keeps the first error of a shutdown sequence and logs the ones after it.
pub fn first_error<I>(results: I) -> Result<()>
where
    I: IntoIterator<Item = Result<()>>,
{
    let mut first = Ok(());
    for result in results {
        if let Err(e) = result {
            if first.is_ok() {
                first = Err(e);
            } else {
                error!("{:?}", e);
            }
        }
    }
    first
}

/// Accepts decimal or `0x`-prefixed hexadecimal.
pub fn parse_u32(s: &str) -> Result<u32, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|e| format!("invalid number {s:?}: {e}"))
}

pub fn parse_u8(s: &str) -> Result<u8, String> {
    let value = parse_u32(s)?;
    u8::try_from(value).map_err(|_| format!("{s} does not fit in 8 bits"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use clap::Parser;

    #[derive(Parser, Debug)]
    struct TestCli {
        #[command(flatten)]
        board: BoardArgs,
    }

    #[test]
    fn test_board_config_merges_file_and_flags() {
        let path = std::env::temp_dir().join(format!("daqboard-cli-{}.toml", std::process::id()));
        std::fs::write(&path, "adc_read_len = 2048\nbus_number = 1\ndevice_address = 2\n").unwrap();
        let args = TestCli::parse_from([
            "test",
            "--config",
            path.to_str().unwrap(),
            "--bus",
            "3",
            "--address",
            "9",
            "--no-reset",
        ]);
        let config = args.board.board_config().unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(config.adc_read_len, 2048);
        assert_eq!(config.bus_number, Some(3));
        assert_eq!(config.device_address, Some(9));
        assert!(config.skip_reset);
        // the file is gone, so nothing may read it again
        assert!(args.board.board_config().is_err());
    }

    #[test]
    fn test_first_error_keeps_the_earliest() {
        assert!(first_error([Ok(()), Ok(())]).is_ok());
        let err = first_error([Ok(()), Err(anyhow!("stop failed")), Err(anyhow!("flush failed"))]).unwrap_err();
        assert_eq!(err.to_string(), "stop failed");
        let err = first_error([Err(anyhow!("read failed")), Ok(()), Err(anyhow!("stop failed"))]).unwrap_err();
        assert_eq!(err.to_string(), "read failed");
    }

    #[test]
    fn test_parse_numbers() {
        assert_eq!(parse_u32("13"), Ok(13));
        assert_eq!(parse_u32("0xCAFEFADE"), Ok(0xCAFE_FADE));
        assert!(parse_u32("0xZZ").is_err());
        assert_eq!(parse_u8("0x7"), Ok(7));
        assert!(parse_u8("256").is_err());
    }
}

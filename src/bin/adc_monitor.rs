use anyhow::{Context, Result};
use clap::Parser;
use clap_verbosity_flag::{InfoLevel, Verbosity};
use daqboard_lib::protocol::{AdcConfig0Settings, DaqBoard, Transport};
use daqboard_lib::stream::{AdcStreamDecoder, RawStreamTracker};
use daqboard_lib::telemetry::kelvin_to_celsius;
use daqboard_lib::{DaqError, RegisterScript};
use daqboard_rs::cli::{BoardArgs, first_error, setup_logging};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use tokio::signal;
use tracing::{debug, error, info, warn};

/// Streams the ADC monitoring records of a DAQ board.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(flatten)]
    board: BoardArgs,
    /// Register script applied before streaming starts.
    #[arg(short, long)]
    script: Option<PathBuf>,
    /// Reference currents Iref0, Iref1, Iref2.
    #[arg(long, num_args = 3, value_names = ["IREF0", "IREF1", "IREF2"])]
    iref: Option<Vec<u32>>,
    /// Let the firmware stop the stream by itself.
    #[arg(long)]
    self_stop: bool,
    /// Stop after this many records.
    #[arg(short = 'n', long)]
    max_records: Option<u64>,
    /// Log every Nth record.
    #[arg(long, default_value_t = 1)]
    every: u64,
    /// Archive the raw stream bit-exactly instead of decoding it.
    #[arg(short, long)]
    raw_output: Option<PathBuf>,
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
        error!("Acquisition failed: {:?}", e);
        std::process::exit(1);
    }
    Ok(())
}

async fn run(cli: Cli) -> Result<()> {
    let (config, mut board) = cli.board.open().await?;
    let firmware = board.read_firmware_version().await?;
    info!(%firmware, address = board.board_address().await?, "Board ready");

    if let Some(path) = &cli.script {
        let script = RegisterScript::load(path)?;
        board.apply_script(&script).await?;
    }

    let mut settings = AdcConfig0Settings {
        stream_adc: true,
        self_stop: cli.self_stop,
        ..AdcConfig0Settings::default()
    };
    if let Some(iref) = &cli.iref {
        settings.iref0 = iref[0];
        settings.iref1 = iref[1];
        board.send_adc_config1(iref[2]).await?;
    }

    let mut sink = match &cli.raw_output {
        Some(path) => Sink::Raw {
            writer: BufWriter::new(
                File::create(path).with_context(|| format!("Failed to create {}", path.display()))?,
            ),
            tracker: RawStreamTracker::new(),
        },
        None => Sink::Decoded(AdcStreamDecoder::new()),
    };

    info!("--- Starting ADC stream ---");
    board.send_adc_config0(&settings).await?;

    let outcome = tokio::select! {
        res = acquire(&mut board, &mut sink, config.adc_read_len, &cli) => res,
        _ = signal::ctrl_c() => {
            info!("Ctrl+C received, stopping stream.");
            Ok(())
        }
    };

    let closed = sink.close();
    let stopped = board
        .stop_adc_stream()
        .await
        .map(|_| ())
        .context("Failed to stop ADC stream");
    first_error([outcome, closed, stopped])
}

enum Sink {
    Decoded(AdcStreamDecoder),
    Raw {
        writer: BufWriter<File>,
        tracker: RawStreamTracker,
    },
}

impl Sink {
    fn records(&self) -> u64 {
        match self {
            Sink::Decoded(decoder) => decoder.records_decoded(),
            Sink::Raw { tracker, .. } => tracker.total_records(),
        }
    }

    /// Consumes one read; true at the end of the run.
    fn consume(&mut self, chunk: &[u8], every: u64) -> Result<bool> {
        match self {
            Sink::Decoded(decoder) => {
                let first = decoder.records_decoded();
                let decoded = decoder.decode_chunk(chunk);
                for (i, record) in decoded.records.iter().enumerate() {
                    if (first + i as u64) % every.max(1) == 0 {
                        info!(
                            "{} T={:.1}°C Id={:.1}mA Io={:.1}mA Ia={:.1}mA",
                            record,
                            kelvin_to_celsius(record.temperature_k()),
                            record.digital_current_ma(),
                            record.output_current_ma(),
                            record.analog_current_ma()
                        );
                    }
                }
                Ok(decoded.end_of_run)
            }
            Sink::Raw { writer, tracker } => {
                writer.write_all(chunk).context("Failed to write raw data")?;
                let raw = tracker.track(chunk);
                debug!(bytes = chunk.len(), records = raw.records, "Archived chunk");
                Ok(raw.end_of_run)
            }
        }
    }

    fn close(self) -> Result<()> {
        match self {
            Sink::Decoded(mut decoder) => {
                let records = decoder.records_decoded();
                if let Err(e) = decoder.finish() {
                    warn!("{}", e);
                }
                info!(records, "Stream closed");
            }
            Sink::Raw { mut writer, tracker } => {
                writer.flush().context("Failed to flush raw data")?;
                info!(
                    records = tracker.total_records(),
                    bytes = tracker.total_bytes(),
                    leftover_words = tracker.leftover_words(),
                    "Raw archive closed"
                );
            }
        }
        Ok(())
    }
}

async fn acquire<T: Transport>(board: &mut DaqBoard<T>, sink: &mut Sink, read_len: usize, cli: &Cli) -> Result<()> {
    loop {
        let chunk = match board.read_adc_chunk(read_len).await {
            Ok(chunk) => chunk,
            // nothing buffered yet
            Err(DaqError::Timeout(_)) => continue,
            Err(e) => return Err(e.into()),
        };
        if sink.consume(&chunk, cli.every)? {
            info!("End of run marker received.");
            return Ok(());
        }
        if cli.max_records.is_some_and(|max| sink.records() >= max) {
            info!("Record limit reached.");
            return Ok(());
        }
    }
}

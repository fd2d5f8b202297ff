use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use clap_verbosity_flag::{InfoLevel, Verbosity};
use daqboard_lib::RegisterScript;
use daqboard_lib::catalog::{Module, describe};
use daqboard_lib::wire::RegisterAddress;
use daqboard_rs::cli::{BoardArgs, parse_u32, parse_u8, setup_logging};
use std::path::PathBuf;
use std::process;
use tracing::{error, info};

/// Raw register access and register scripts.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(flatten)]
    board: BoardArgs,
    #[command(subcommand)]
    command: Command,
    #[command(flatten)]
    verbose: Verbosity<InfoLevel>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Read one register.
    Read {
        #[arg(value_parser = parse_u8)]
        module: u8,
        #[arg(value_parser = parse_u8)]
        register: u8,
    },
    /// Write one register.
    Write {
        #[arg(value_parser = parse_u8)]
        module: u8,
        #[arg(value_parser = parse_u8)]
        register: u8,
        #[arg(value_parser = parse_u32)]
        value: u32,
    },
    /// Set one named field and write its register.
    Field {
        name: String,
        #[arg(value_parser = parse_u32)]
        value: u32,
    },
    /// Apply a TOML register script.
    Script {
        path: PathBuf,
        /// Print the writes without touching the board.
        #[arg(long)]
        dry_run: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let _guard = setup_logging(None, &cli.verbose)?;

    if let Err(e) = run(cli).await {
        error!("Register access failed: {:?}", e);
        process::exit(1);
    }
    Ok(())
}

fn label(module: u8, register: u8) -> String {
    let address = RegisterAddress::new(module, register);
    let module_name = Module::try_from(module)
        .map(|m| m.to_string())
        .unwrap_or_else(|_| format!("{module:#x}"));
    match describe(address) {
        Some(name) => format!("{name} ({module_name}:{register:#04x})"),
        None => format!("{module_name}:{register:#04x}"),
    }
}

async fn run(cli: Cli) -> Result<()> {
    if let Command::Script { path, dry_run: true } = &cli.command {
        let script = RegisterScript::load(path)?;
        for w in script.ordered_writes() {
            info!(
                "[{:>3}] {} <- {:#010x} {}",
                w.priority,
                label(w.module, w.register),
                w.value,
                w.name.as_deref().unwrap_or("")
            );
        }
        return Ok(());
    }

    let (_, mut board) = cli.board.open().await?;
    match cli.command {
        Command::Read { module, register } => {
            let value = board.read_raw(module, register).await?;
            info!("{} = {:#010x} ({})", label(module, register), value, value);
        }
        Command::Write {
            module,
            register,
            value,
        } => {
            let ack = board.write_raw(module, register, value).await?;
            info!(
                "{} <- {:#010x} (ack {:#x} {:#010x})",
                label(module, register),
                value,
                ack.header,
                ack.data
            );
        }
        Command::Field { name, value } => {
            board
                .send_field_value(&name, value)
                .await
                .with_context(|| format!("Failed to set {name}"))?;
            info!("{} <- {}", name, value);
        }
        Command::Script { path, .. } => {
            let script = RegisterScript::load(&path)?;
            let applied = board.apply_script(&script).await?;
            info!("Applied {} writes from {}", applied, path.display());
        }
    }
    Ok(())
}

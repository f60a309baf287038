//! Loads one of the LED/button modules on a GPIO chip and keeps it loaded
//! until stdin is closed or a `q` line is read.
//!
//! ```bash
//! # debounced LED on the default Raspberry Pi 4B pins
//! ledctrl irq
//!
//! # LED sequence, custom wiring, debug logs
//! ledctrl -v -c board.toml wq
//! ```

use std::{
    io::{self, BufRead},
    path::PathBuf,
    process::ExitCode,
    sync::Arc,
};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::{error, info};

use gpio_ledctrl::{
    backend::{CdevBackend, GpioBackend},
    drivers::{DebouncedLed, Hello, LedSequence},
    init_logging, load, Config, Module,
};

#[derive(Parser)]
#[command(name = "ledctrl")]
#[command(version)]
#[command(about = "Load a GPIO LED/button module on a GPIO chip")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Config file; built-in defaults are used without one
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// GPIO chip, overriding the config
    #[arg(long, global = true)]
    chip: Option<PathBuf>,

    /// More logging (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand, Clone, Copy)]
enum Command {
    /// Module that only logs on load and unload
    Hello,
    /// LED toggled by a debounced button interrupt
    Irq,
    /// LED sequence run from a work item on each button press
    Wq,
    /// Print module metadata and the effective config
    Info,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode> {
    let mut config = match &cli.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => Config::default(),
    };
    if let Some(chip) = cli.chip {
        config.chip = chip;
    }

    if let Command::Info = cli.command {
        println!("{}\n", <Hello as Module<CdevBackend>>::INFO);
        println!("{}\n", <DebouncedLed<CdevBackend> as Module<CdevBackend>>::INFO);
        println!("{}\n", <LedSequence<CdevBackend> as Module<CdevBackend>>::INFO);
        match CdevBackend::open(&config.chip, config.gpio_base) {
            Ok(chip) => {
                let info = chip.chip_info();
                println!(
                    "chip:        {} ({} [{}], {} lines)\n",
                    chip.path().display(),
                    info.name,
                    info.label,
                    info.lines
                );
            }
            Err(e) => println!("chip:        {} unavailable: {e}\n", config.chip.display()),
        }
        print!("{}", toml::to_string_pretty(&config)?);
        return Ok(ExitCode::SUCCESS);
    }

    let chip = CdevBackend::open(&config.chip, config.gpio_base)
        .with_context(|| format!("opening {}", config.chip.display()))?;
    let chip = Arc::new(chip);
    match cli.command {
        Command::Hello => serve::<Hello, _>(&chip, &config),
        Command::Irq => serve::<DebouncedLed<_>, _>(&chip, &config),
        Command::Wq => serve::<LedSequence<_>, _>(&chip, &config),
        Command::Info => Ok(ExitCode::SUCCESS),
    }
}

fn serve<M, B>(backend: &Arc<B>, config: &Config) -> Result<ExitCode>
where
    M: Module<B>,
    B: GpioBackend,
{
    let module = match load::<M, B>(backend, config) {
        Ok(module) => module,
        Err(status) => return Ok(ExitCode::from(u8::try_from(-status).unwrap_or(1))),
    };
    info!("{}: running, enter `q` or close stdin to unload", module.info().name);
    for line in io::stdin().lock().lines() {
        if line?.trim() == "q" {
            break;
        }
    }
    module.unload();
    Ok(ExitCode::SUCCESS)
}

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::{fmt, EnvFilter};

use monc_lib::il::{module_listing, IlModule};
use monc_lib::vm::{Interpreter, Stop};

use std::io::stdout;
use std::path::PathBuf;

mod debugger;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// a linked module, as written by the compiler
    module: PathBuf,

    /// arguments for the entry function
    #[arg(allow_negative_numbers = true)]
    args: Vec<i32>,

    #[arg(short, long, default_value = "main")]
    entry: String,

    /// run the entry function in the interactive debugger
    #[arg(short, long)]
    debug: bool,

    /// print the listing of the module and exit
    #[arg(short, long)]
    listing: bool,

    #[cfg(feature = "dev")]
    #[arg(long)]
    dump_module: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging()?;

    let bytes = std::fs::read(&cli.module)
        .with_context(|| format!("Could not read {}", cli.module.display()))?;
    let module = IlModule::from_bytes(&bytes)
        .with_context(|| format!("Could not load {}", cli.module.display()))?;

    #[cfg(feature = "dev")]
    if cli.dump_module {
        println!("{:#?}", module);
        return Ok(());
    }

    if cli.listing {
        print!("{}", module_listing(&module)?);
        return Ok(());
    }

    if cli.debug {
        return debugger::run(module, &cli.entry, &cli.args, &mut stdout());
    }

    let res = match run(module, &cli.entry, &cli.args) {
        Ok(res) => res,
        Err(e) => {
            eprintln!("{}", e);
            1
        }
    };
    std::process::exit(res);
}

pub fn run(module: IlModule, entry: &str, args: &[i32]) -> Result<i32> {
    let mut vm = Interpreter::new();
    vm.load_module(module);
    match vm.call(entry, args)? {
        Stop::Finished(res) => Ok(res),
        Stop::Paused => {
            let location = vm
                .stack_frame(0)
                .map(|frame| frame.to_string())
                .unwrap_or_default();
            anyhow::bail!("Hit a break instruction at {}", location)
        }
    }
}

/// Logs go to stderr. The filter is read from MONC_LOG, then RUST_LOG, and defaults
/// to warn
fn init_logging() -> Result<()> {
    let filter = EnvFilter::try_from_env("MONC_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .or_else(|_| EnvFilter::try_new("warn"))?;

    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
    Ok(())
}

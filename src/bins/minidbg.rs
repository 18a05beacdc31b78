use std::path::PathBuf;

use clap::Parser;
use tracing::debug;

use minidbg::debugger::Debugger;
use minidbg::errors::DebuggerError;
use minidbg::ui::cli::CliUi;

/// Launch a program under the debugger
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Path of the executable to debug
    executable: PathBuf,

    /// Log everything the core does
    #[clap(short, long)]
    verbose: bool,
}

fn main() -> Result<(), DebuggerError> {
    let args = Args::parse();
    setup_logger(args.verbose);
    debug!("set up the logger");

    let ui = CliUi::build();
    let mut debugger = Debugger::build(ui);
    debugger.launch(&args.executable, &[])?;
    debugger.run_debugger()?;

    Ok(())
}

fn setup_logger(verbose: bool) {
    let level = if verbose {
        tracing::Level::TRACE
    } else {
        tracing::Level::INFO
    };
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .without_time()
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("could not setup logger");
}

mod cli;
mod commands;
mod config;
mod error;
mod logging;
mod utils;

use crate::cli::{Cli, Commands};
use crate::config::FileConfig;
use crate::error::{CliError, Result};
use clap::Parser;
use tracing::{debug, error, info};

fn main() {
    if let Err(e) = run_app() {
        eprintln!("\n❌ Error: {e}");
        std::process::exit(1);
    }
}

fn install_panic_reporting() -> Result<()> {
    let (panic_hook, eyre_hook) = color_eyre::config::HookBuilder::default().into_hooks();
    eyre_hook.install().map_err(|e| CliError::Other(e.into()))?;
    std::panic::set_hook(Box::new(move |info| {
        error!("{}", panic_hook.panic_report(info));
    }));
    Ok(())
}

fn configure_thread_pool(threads: Option<usize>) -> Result<()> {
    let Some(threads) = threads else {
        return Ok(());
    };
    debug!(threads, "Configuring global Rayon pool.");
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .map_err(|e| CliError::Other(anyhow::anyhow!("Failed to build global thread pool: {e}")))
}

fn dispatch(command: Commands, file_config: FileConfig) -> Result<()> {
    match command {
        Commands::Info(args) => commands::info::run(args),
        Commands::Convert(args) => commands::convert::run(args, file_config.convert),
        Commands::Rmsd(args) => commands::rmsd::run(args, file_config.rmsd),
        Commands::Rdf(args) => commands::rdf::run(args, file_config.rdf),
    }
}

fn run_app() -> Result<()> {
    let cli = Cli::parse();
    let global = &cli.global;
    logging::setup_logging(global.verbose, global.quiet, global.log_file.as_deref())?;
    install_panic_reporting()?;

    info!("🚀 chemtraj v{} starting up.", env!("CARGO_PKG_VERSION"));
    debug!("Parsed arguments: {:?}", &cli);

    let result = configure_thread_pool(global.threads)
        .and_then(|()| FileConfig::load(global.config.as_deref()))
        .and_then(|file_config| dispatch(cli.command, file_config));

    match &result {
        Ok(()) => info!("✅ Command completed successfully."),
        Err(e) => error!("❌ Command failed: {e}"),
    }
    result
}

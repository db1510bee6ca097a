//! Aurora CLI - Recording Studio Audio Core
//!
//! Command-line interface for rendering and exporting recordings through the
//! Aurora effects chain.

use clap::Parser;
use env_logger::Env;
use log::info;

use aurora::cli::commands;
use aurora::cli::{Cli, Commands};

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logger
    let default_filter = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(Env::default().default_filter_or(default_filter)).init();

    info!("Aurora Audio Studio v{}", env!("CARGO_PKG_VERSION"));

    let config = commands::load_config(cli.config.as_deref())?;

    match cli.command {
        Some(cmd) => handle_command(cmd, config),
        None => {
            println!("Aurora Audio Studio v{}", env!("CARGO_PKG_VERSION"));
            println!("Use --help for available commands");
            Ok(())
        }
    }
}

fn handle_command(cmd: Commands, config: aurora::EngineConfig) -> anyhow::Result<()> {
    match cmd {
        Commands::Render {
            input,
            output,
            params,
        } => commands::render(config, &input, output.as_deref(), &params),
        Commands::ExportRaw { input, output } => {
            commands::export_raw(config, &input, output.as_deref())
        }
        Commands::Params { json } => commands::list_params(json),
        Commands::Presets { json } => commands::list_presets(json),
        Commands::Impulse {
            output,
            sample_rate,
            channels,
            seconds,
            decay,
            seed,
        } => commands::write_impulse(&output, sample_rate, channels, seconds, decay, seed),
        Commands::Play { input, raw, params } => commands::play(config, &input, raw, &params),
    }
}

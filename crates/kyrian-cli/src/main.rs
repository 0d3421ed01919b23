mod cli;
mod cmd;
mod dispatch;
mod format;
mod progress;
mod signal;
mod table;

use clap::Parser;

use kyrian_core::app::load_runtime_config;
use kyrian_core::config;

use cli::Cli;
use dispatch::dispatch_command;
use progress::ProgressAwareStderr;

fn main() {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(ProgressAwareStderr)
        .init();

    signal::install_signal_handlers();

    let mut runtime = match load_runtime_config(cli.config.as_deref()) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Error: {e}");
            if cli.config.is_none() {
                if let Some(path) = config::default_config_path() {
                    eprintln!("Default configuration: {}", path.display());
                }
                eprintln!("Set ${} or pass --config to use another file.", config::CONFIG_ENV_VAR);
            }
            std::process::exit(1);
        }
    };

    tracing::info!("Using config: {}", runtime.source);

    if let Err(e) = dispatch_command(&cli.command, &mut runtime) {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

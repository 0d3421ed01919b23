use kyrian_core::app::RuntimeConfig;

use crate::cli::Commands;
use crate::cmd::{self, CmdResult};

pub(crate) fn dispatch_command(command: &Commands, runtime: &mut RuntimeConfig) -> CmdResult {
    if let Commands::Profiles { use_profile } = command {
        return cmd::profiles::run_profiles(runtime, use_profile.as_deref());
    }

    let profile = runtime.profile_name()?.to_string();
    tracing::info!(command = command.name(), profile = %profile, "running");
    let coord = runtime.coordinator()?;

    let result = match command {
        Commands::Chains => cmd::chains::run_chains(&coord),
        Commands::Tree {
            time,
            highlight,
            depth,
        } => cmd::tree::run_tree(&coord, *time, *highlight, *depth),
        Commands::Backup => cmd::backup::run_backup(&coord, runtime.settings()),
        Commands::Recover {
            path,
            time,
            dest,
            force,
        } => cmd::restore::run_recover(&coord, path.clone(), *time, dest, *force),
        Commands::Restore { time, dest, force } => {
            cmd::restore::run_restore(&coord, *time, dest, *force)
        }
        Commands::Profiles { .. } => Ok(()),
    };
    coord.shutdown();
    result
}

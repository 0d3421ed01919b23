use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "kyrian",
    version,
    about = "Browse, back up and recover duplicity snapshots",
    after_help = "\
Configuration file lookup order:
  1. --config <path>             (explicit flag)
  2. $KYRIAN_CONFIG              (environment variable)
  3. Platform user config dir + /kyrian/config.yaml (e.g. ~/.config)

A minimal configuration is created at the default location on first use."
)]
pub(crate) struct Cli {
    /// Path to configuration file (overrides KYRIAN_CONFIG and default location)
    #[arg(short, long)]
    pub config: Option<String>,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub(crate) enum Commands {
    /// List backup chains at the profile's target
    Chains,

    /// Show the file tree of one snapshot
    Tree {
        /// Snapshot time as a Unix timestamp (default: newest chain)
        #[arg(short, long)]
        time: Option<i64>,

        /// Mark entries that differ from the live source
        #[arg(long)]
        highlight: bool,

        /// Only show entries up to this depth
        #[arg(long)]
        depth: Option<usize>,
    },

    /// Back up the profile's source to its target
    Backup,

    /// Recover a single path from a snapshot
    Recover {
        /// Path relative to the snapshot root
        path: String,

        /// Snapshot time as a Unix timestamp (default: newest)
        #[arg(short, long)]
        time: Option<i64>,

        /// Where to write the recovered file or directory
        #[arg(short, long)]
        dest: String,

        /// Overwrite a non-empty destination
        #[arg(long)]
        force: bool,
    },

    /// Restore a whole snapshot into a directory
    Restore {
        /// Snapshot time as a Unix timestamp (default: newest)
        #[arg(short, long)]
        time: Option<i64>,

        /// Destination directory
        #[arg(short, long)]
        dest: String,

        /// Overwrite a non-empty destination
        #[arg(long)]
        force: bool,
    },

    /// List profiles, or switch the active one
    Profiles {
        /// Make this profile active and save the configuration
        #[arg(long = "use", value_name = "NAME")]
        use_profile: Option<String>,
    },
}

impl Commands {
    pub(crate) fn name(&self) -> &'static str {
        match self {
            Self::Chains => "chains",
            Self::Tree { .. } => "tree",
            Self::Backup => "backup",
            Self::Recover { .. } => "recover",
            Self::Restore { .. } => "restore",
            Self::Profiles { .. } => "profiles",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_tree_options() {
        let cli = Cli::try_parse_from(["kyrian", "tree", "--time", "200", "--highlight"]).unwrap();
        let Commands::Tree {
            time,
            highlight,
            depth,
        } = cli.command
        else {
            panic!("expected tree");
        };
        assert_eq!(time, Some(200));
        assert!(highlight);
        assert_eq!(depth, None);
    }

    #[test]
    fn recover_requires_destination() {
        assert!(Cli::try_parse_from(["kyrian", "recover", "a/b.txt"]).is_err());
        let cli = Cli::try_parse_from([
            "kyrian", "-vv", "-c", "k.yaml", "recover", "a/b.txt", "--dest", "/tmp/out", "--force",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.config.as_deref(), Some("k.yaml"));
        let Commands::Recover {
            path, dest, force, ..
        } = cli.command
        else {
            panic!("expected recover");
        };
        assert_eq!(path, "a/b.txt");
        assert_eq!(dest, "/tmp/out");
        assert!(force);
    }

    #[test]
    fn profiles_use_flag() {
        let cli = Cli::try_parse_from(["kyrian", "profiles", "--use", "work"]).unwrap();
        assert_eq!(cli.command.name(), "profiles");
        assert!(matches!(
            cli.command,
            Commands::Profiles { use_profile: Some(ref n) } if n == "work"
        ));
    }

    #[test]
    fn subcommand_is_required() {
        assert!(Cli::try_parse_from(["kyrian"]).is_err());
    }

    #[test]
    fn timestamps_must_be_numeric() {
        assert!(Cli::try_parse_from(["kyrian", "restore", "--time", "yesterday", "--dest", "x"]).is_err());
    }
}

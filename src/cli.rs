use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Top-level CLI entry point for the mod installer.
#[derive(Parser, Debug)]
#[command(
    name = "mod-installer",
    about = "Resumable, dependency-ordered mod installer with snapshot rollback",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(flatten)]
    pub global: GlobalOpts,
}

/// Options shared across all subcommands.
#[derive(Parser, Debug, Clone)]
pub struct GlobalOpts {
    /// Preview changes without applying
    #[arg(short = 'd', long, global = true)]
    pub dry_run: bool,

    /// Installer settings file (TOML)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Disable concurrent file operations (enabled by default)
    #[arg(long = "no-parallel", global = true, action = clap::ArgAction::SetFalse)]
    pub parallel: bool,

    /// Match paths ignoring case
    #[arg(long, global = true)]
    pub case_insensitive: bool,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Install the selected components
    Install(InstallOpts),
    /// Print the resolved install order
    Order(OrderOpts),
    /// Roll the destination back to its snapshot
    Restore(RestoreOpts),
    /// Capture a snapshot of the destination
    Snapshot(SnapshotOpts),
    /// Show the saved session for a destination
    Status(DestinationOpts),
    /// Print version information
    Version,
}

/// Options for the `install` subcommand.
#[derive(Parser, Debug, Clone)]
pub struct InstallOpts {
    /// Component definitions (TOML)
    #[arg(long)]
    pub components: PathBuf,

    /// Mod workspace, overriding the settings file
    #[arg(long)]
    pub source: Option<PathBuf>,

    /// Game directory, overriding the settings file
    #[arg(long)]
    pub destination: Option<PathBuf>,

    /// Answer prompts automatically
    #[arg(short, long)]
    pub yes: bool,
}

/// Options for the `order` subcommand.
#[derive(Parser, Debug, Clone)]
pub struct OrderOpts {
    /// Component definitions (TOML)
    #[arg(long)]
    pub components: PathBuf,
}

/// Options for subcommands that act on a destination.
#[derive(Parser, Debug, Clone)]
pub struct DestinationOpts {
    /// Game directory, overriding the settings file
    #[arg(long)]
    pub destination: Option<PathBuf>,
}

/// Options for the `restore` subcommand.
#[derive(Parser, Debug, Clone)]
pub struct RestoreOpts {
    #[command(flatten)]
    pub target: DestinationOpts,

    /// Skip the confirmation prompt
    #[arg(short, long)]
    pub yes: bool,
}

/// Options for the `snapshot` subcommand.
#[derive(Parser, Debug, Clone)]
pub struct SnapshotOpts {
    #[command(flatten)]
    pub target: DestinationOpts,

    /// Replace an existing snapshot with the current tree
    #[arg(long)]
    pub promote: bool,
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parse_install() {
        let cli = Cli::parse_from([
            "mod-installer",
            "install",
            "--components",
            "mods.toml",
            "--destination",
            "/game",
            "-y",
        ]);
        let Command::Install(opts) = cli.command else {
            panic!("expected install");
        };
        assert_eq!(opts.components, PathBuf::from("mods.toml"));
        assert_eq!(opts.destination, Some(PathBuf::from("/game")));
        assert!(opts.yes);
    }

    #[test]
    fn parse_global_flags_after_subcommand() {
        let cli = Cli::parse_from([
            "mod-installer",
            "order",
            "--components",
            "mods.toml",
            "--dry-run",
            "--config",
            "settings.toml",
            "-v",
        ]);
        assert!(cli.global.dry_run);
        assert!(cli.verbose);
        assert_eq!(cli.global.config, Some(PathBuf::from("settings.toml")));
    }

    #[test]
    fn parallel_is_enabled_by_default() {
        let cli = Cli::parse_from(["mod-installer", "version"]);
        assert!(cli.global.parallel);
        let cli = Cli::parse_from(["mod-installer", "--no-parallel", "version"]);
        assert!(!cli.global.parallel);
    }

    #[test]
    fn parse_snapshot_promote() {
        let cli = Cli::parse_from([
            "mod-installer",
            "snapshot",
            "--destination",
            "/game",
            "--promote",
        ]);
        let Command::Snapshot(opts) = cli.command else {
            panic!("expected snapshot");
        };
        assert!(opts.promote);
        assert_eq!(opts.target.destination, Some(PathBuf::from("/game")));
    }

    #[test]
    fn parse_restore_yes() {
        let cli = Cli::parse_from(["mod-installer", "restore", "--destination", "/game", "-y"]);
        let Command::Restore(opts) = cli.command else {
            panic!("expected restore");
        };
        assert!(opts.yes);
    }

    #[test]
    fn install_requires_components() {
        assert!(Cli::try_parse_from(["mod-installer", "install"]).is_err());
    }
}

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;

use mod_installer::cancel::CancellationToken;
use mod_installer::{cli, commands, logging};

fn main() -> Result<()> {
    let _ = enable_ansi_support::enable_ansi_support();
    let args = cli::Cli::parse();

    let command_name = match &args.command {
        cli::Command::Install(_) => "install",
        cli::Command::Order(_) => "order",
        cli::Command::Restore(_) => "restore",
        cli::Command::Snapshot(_) => "snapshot",
        cli::Command::Status(_) => "status",
        cli::Command::Version => "version",
    };
    logging::init_subscriber(args.verbose, command_name);
    let log = Arc::new(logging::Logger::new(command_name));

    let cancel = CancellationToken::new();
    let handler_token = cancel.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        tracing::warn!("interrupt received, stopping after the current step");
        handler_token.cancel();
    }) {
        log.warn(&format!("could not install interrupt handler: {e}"));
    }

    match args.command {
        cli::Command::Install(opts) => commands::install::run(&args.global, &opts, &log, cancel),
        cli::Command::Order(opts) => commands::order::run(&args.global, &opts, &log),
        cli::Command::Restore(opts) => commands::restore::run(&args.global, &opts, &log, &cancel),
        cli::Command::Snapshot(opts) => {
            commands::snapshot::run(&args.global, &opts, &log, &cancel)
        }
        cli::Command::Status(opts) => commands::status::run(&args.global, &opts, &log),
        cli::Command::Version => {
            commands::version::run();
            Ok(())
        }
    }
}

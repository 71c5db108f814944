//! Resumable mod component installer.
//!
//! Installs an ordered set of mod components into a game directory. Each
//! component is a list of file-level instructions (extract, move, copy,
//! rename, delete, run the patcher, ...). Progress is checkpointed so an
//! interrupted run resumes where it stopped, and the destination is
//! snapshotted before the first change so it can be rolled back.
//!
//! The public API is organised into these layers:
//!
//! - **[`config`]**: settings and component definitions
//! - **[`resolver`]**: dependency and ordering constraints into an install order
//! - **[`provider`]**: every filesystem side effect, real or simulated
//! - **[`instructions`]**: one instruction at a time, mapped to an exit code
//! - **[`checkpoint`]** / **[`snapshot`]**: crash-safe resume and rollback
//! - **[`coordinator`]**: the end-to-end install of a component set
//! - **[`commands`]**: top-level subcommand orchestration
#![deny(clippy::or_fun_call)]
#![deny(clippy::bool_to_int_with_if)]

pub mod cancel;
pub mod checkpoint;
pub mod cli;
pub mod commands;
pub mod config;
pub mod context;
pub mod coordinator;
pub mod dialog;
pub mod error;
pub mod exec;
pub mod instructions;
pub mod logging;
pub mod model;
pub mod provider;
pub mod resolver;
pub mod snapshot;

/// Build version: `MOD_INSTALLER_VERSION` when set at build time, otherwise
/// the package version marked as a development build.
#[must_use]
pub fn version() -> &'static str {
    option_env!("MOD_INSTALLER_VERSION").unwrap_or(concat!("dev-", env!("CARGO_PKG_VERSION")))
}

//! CLI-level error taxonomy. Every subcommand returns an [anyhow::Result];
//! this enum only exists for the handful of diagnostics the CLI itself
//! raises (as opposed to wrapping an error `?`-propagated from
//! `nix-compat`, `nixforge-pkgs`, or `nixforge-daemon`). `anyhow` is for
//! display at this boundary; the library crates never use it.
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("could not read {path}: {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("'{0}' is not a valid store path")]
    NotAStorePath(String),

    #[error("exactly one of --text or --source must be given")]
    AmbiguousStorePathMode,
}

//! Command-line surface: one subcommand per core operation or daemon-client
//! call, each a thin shell that maps directly onto a library function -
//! this layer has no logic of its own.
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::Level;

#[derive(Parser)]
#[command(
    name = "nixforge",
    about = "Computes Nix-compatible store paths and derivations without building anything.",
    long_about = None,
)]
pub struct Args {
    /// A global log level to use when printing logs. `RUST_LOG` takes
    /// priority if set.
    #[arg(long, global = true, default_value_t = Level::INFO)]
    pub log_level: Level,

    /// Path to the build daemon's Unix-domain socket, for subcommands that
    /// talk to one.
    #[arg(long, env = "NIX_REMOTE", default_value = nixforge_daemon::DEFAULT_SOCKET_PATH)]
    pub nix_remote: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Hash a filesystem subtree the way a source-addressed store path
    /// would: serialize it as a NAR archive, then SHA-256 the archive
    /// bytes.
    HashPath {
        /// Path to the file, symlink, or directory to hash.
        path: PathBuf,
    },

    /// Hash a single file's raw bytes (the "flat" hashing mode fixed-output
    /// derivations use when `outputHashMode = "flat"`).
    HashFile {
        path: PathBuf,
        #[arg(long, default_value = "sha256")]
        algo: String,
    },

    /// Compute the store path for text- or source-addressed content
    /// without touching the daemon.
    StorePath {
        /// The name component of the resulting store path.
        #[arg(long)]
        name: String,

        /// Treat `path` as plain text content (`builtins.toFile`-style);
        /// mutually exclusive with `--source`.
        #[arg(long)]
        text: Option<PathBuf>,

        /// Treat `path` as a filesystem subtree to archive and hash
        /// (source-addressed); mutually exclusive with `--text`.
        #[arg(long)]
        source: Option<PathBuf>,
    },

    /// Parse a derivation's ATerm encoding and pretty-print it as JSON.
    DerivationShow {
        /// Path to a `.drv` file. Reads stdin if omitted.
        drv_path: Option<PathBuf>,
    },

    /// Query whether a store path is registered as valid with the daemon.
    IsValid { path: String },

    /// Fetch a store path's metadata (deriver, NAR hash, references, ...)
    /// from the daemon.
    PathInfo { path: String },

    /// Add a file's content to the store by text-addressing it, via the
    /// daemon's `add_text_to_store`.
    AddText {
        name: String,
        /// File to read the content from; reads stdin if omitted.
        #[arg(long)]
        content_file: Option<PathBuf>,
        /// Store paths this content textually references.
        #[arg(long = "reference")]
        references: Vec<String>,
    },

    /// Request the daemon build one or more store paths (or specific
    /// outputs, given as `<drv-path>!<output-name>`).
    Build { paths: Vec<String> },
}

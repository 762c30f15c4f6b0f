//! Errors raised while constructing a [crate::Package].
use nix_compat::derivation::DerivationError;
use nix_compat::nixhash;
use nix_compat::store_path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PackageError {
    #[error("an output with the name '{0}' is already defined")]
    DuplicateOutput(String),

    #[error("fixed-output derivations can only have the default `out` output")]
    ConflictingOutputTypes,

    #[error("invalid output hash: {0}")]
    InvalidOutputHash(#[from] nixhash::Error),

    #[error("invalid output hash mode: '{0}', only 'recursive' and 'flat' are supported")]
    InvalidOutputHashMode(String),

    #[error("invalid derivation parameters for '{name}': {source}")]
    InvalidDerivation {
        name: String,
        #[source]
        source: DerivationError,
    },

    #[error(
        "missing input hash for dependency derivation '{0}': its modular hash was not \
         precomputed before hashing the dependent"
    )]
    MissingInputHash(String),

    #[error("invalid store path referenced by '{name}': {source}")]
    InvalidStorePath {
        name: String,
        #[source]
        source: store_path::Error,
    },
}

/// Errors raised while forcing an attribute out of a [crate::overlay::PackageSet].
#[derive(Debug, Error)]
pub enum OverlayError {
    #[error("attribute '{0}' is not defined in this package set")]
    NoSuchAttribute(String),

    #[error("dependency cycle detected while evaluating attribute '{0}'")]
    Cycle(String),

    #[error(transparent)]
    Package(#[from] PackageError),
}

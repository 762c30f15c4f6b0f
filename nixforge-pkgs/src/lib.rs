//! Package construction: derivations, fixed-output fetches, the
//! `mkDerivation` convention shell, and the overlay-based package set used
//! to compose them.
mod args;
mod construct;
mod errors;
mod fetch;
mod mk_derivation;
mod overlay;
mod package;

pub use args::{DerivationArgs, FixedOutputSpec, OutputHashMode, DEFAULT_SYSTEM};
pub use construct::{build_package, references};
pub use errors::{OverlayError, PackageError};
pub use fetch::{fetchurl_hex, fetchurl_nixbase32, fetchurl_sri, FetchUrlArgs, IMPURE_ENV_VARS};
pub use mk_derivation::{mk_derivation, MkDerivationArgs, BOOTSTRAP_SCRIPTS, CONVENTIONAL_FLAGS};
pub use overlay::{def, Definition, Overlay, PackageSet, PackageSetBuilder};
pub use package::{Package, PackageRef};

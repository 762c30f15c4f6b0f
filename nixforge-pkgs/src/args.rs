//! Typed argument record accepted by [crate::construct::build_package].
//!
//! This is the Rust-native equivalent of the attribute set threaded into
//! `builtins.derivationStrict` by a Nix language evaluator (see
//! `glue/src/builtins/derivation.rs`): here it's a plain struct instead of a
//! dynamically-typed `NixAttrs`, since this workspace has no general-purpose
//! lazy language to evaluate.
use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;

use crate::package::Package;

pub const DEFAULT_SYSTEM: &str = "x86_64-linux";

/// The two calling conventions for `outputHashMode`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputHashMode {
    Flat,
    Recursive,
}

impl OutputHashMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputHashMode::Flat => "flat",
            OutputHashMode::Recursive => "recursive",
        }
    }
}

/// Fixed-output parameters: present only for derivations whose single `out`
/// output is content-addressed directly.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FixedOutputSpec {
    /// The hash, in any of the three calling conventions a fixed-output
    /// fetch must support: hex, SRI, or nixbase32. Parsed via
    /// `nix_compat::nixhash::from_str`.
    pub hash: String,
    /// The algorithm, out-of-band. `None` when `hash` is self-describing
    /// (SRI, or a `algo:digest` nix hash string).
    pub algo: Option<String>,
    pub mode: OutputHashMode,
}

/// Typed arguments accepted by the high-level derivation constructor.
#[derive(Clone, Debug, PartialEq)]
pub struct DerivationArgs {
    pub name: String,
    pub builder: String,
    pub system: String,
    pub args: Vec<String>,
    pub env: BTreeMap<String, String>,
    pub output_names: Vec<String>,
    pub deps: Vec<Rc<Package>>,
    /// Explicit output-name overrides for a given dep's drv path, used when
    /// only a subset of a dependency's outputs are actually consumed.
    pub dep_output_overrides: BTreeMap<String, BTreeSet<String>>,
    pub input_srcs: BTreeSet<String>,
    pub fixed_output: Option<FixedOutputSpec>,
}

impl Default for DerivationArgs {
    fn default() -> Self {
        DerivationArgs {
            name: String::new(),
            builder: String::new(),
            system: DEFAULT_SYSTEM.to_string(),
            args: Vec::new(),
            env: BTreeMap::new(),
            output_names: vec!["out".to_string()],
            deps: Vec::new(),
            dep_output_overrides: BTreeMap::new(),
            input_srcs: BTreeSet::new(),
            fixed_output: None,
        }
    }
}

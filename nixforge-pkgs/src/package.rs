//! Resolved [Package]: a derivation plus its computed output store paths and
//! a retained argument record.
use std::collections::BTreeMap;
use std::rc::Rc;

use nix_compat::derivation::Derivation;
use nix_compat::nixhash::NixHash;

use crate::args::DerivationArgs;
use crate::construct::build_package;
use crate::errors::PackageError;

/// A resolved derivation: its store path, its per-output store paths, the
/// [Derivation] value itself, and the argument record that produced it (kept
/// around so [Package::override_with] can rebuild without re-parsing
/// anything).
#[derive(Clone, Debug, PartialEq)]
pub struct Package {
    pub name: String,
    /// Absolute store path of this package's own serialized `.drv`.
    pub drv_path: String,
    /// Absolute store paths, keyed by output name.
    pub outputs: BTreeMap<String, String>,
    pub derivation: Derivation,
    /// The modular hash of this (fully resolved) derivation - this is the
    /// value a dependent looks up when it references this package's
    /// `drv_path` in its own `input_drvs` table.
    pub(crate) hash_modulo: NixHash,
    args: DerivationArgs,
}

impl Package {
    pub(crate) fn new(
        name: String,
        drv_path: String,
        outputs: BTreeMap<String, String>,
        derivation: Derivation,
        hash_modulo: NixHash,
        args: DerivationArgs,
    ) -> Self {
        Package {
            name,
            drv_path,
            outputs,
            derivation,
            hash_modulo,
            args,
        }
    }

    /// The store path of this package's primary ("out") output. Falls back
    /// to the first output by name if there's no "out" (this only happens
    /// for multi-output derivations that deliberately omit it, which the
    /// constructor otherwise defaults to including).
    pub fn out_path(&self) -> &str {
        self.outputs
            .get("out")
            .or_else(|| self.outputs.values().next())
            .expect("a resolved Package always has at least one output")
    }

    /// Rebuilds this package with its argument record modified by `f`,
    /// returning a fresh [Package]. This is `pkg.override(...)` - a shallow
    /// merge of the retained typed arguments, re-run through the full
    /// construction pipeline.
    pub fn override_with<F>(&self, f: F) -> Result<Package, PackageError>
    where
        F: FnOnce(&mut DerivationArgs),
    {
        let mut new_args = self.args.clone();
        f(&mut new_args);
        build_package(new_args)
    }

    /// Exposes the retained argument record, e.g. so an overlay stage can
    /// inspect how a package it wants to override was originally built.
    pub fn args(&self) -> &DerivationArgs {
        &self.args
    }
}

impl std::fmt::Display for Package {
    /// A [Package]'s string form is its primary output path, matching the
    /// way Nix coerces a derivation result to a string (e.g. when
    /// interpolated into another derivation's `args`/`env`).
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.out_path())
    }
}

pub type PackageRef = Rc<Package>;

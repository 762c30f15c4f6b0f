//! The high-level derivation constructor.
//!
//! Grounded on `glue/src/builtins/derivation.rs`'s `derivationStrict`
//! builtin and `glue/src/known_paths.rs`'s hash-modulo memoization, but
//! reworked around a typed [DerivationArgs] record instead of a dynamically
//! typed Nix attribute set - there is no lazy language to evaluate here.
use std::collections::{BTreeMap, BTreeSet, HashMap};

use bstr::BString;
use nix_compat::derivation::{CAHash, Derivation, Output};
use nix_compat::nixhash;
use nix_compat::store_path::StorePathRef;
use tracing::instrument;

use crate::args::{DerivationArgs, OutputHashMode};
use crate::errors::PackageError;
use crate::package::Package;

/// Runs the full construction pipeline: blank outputs -> compute modular
/// hash -> fill output paths -> serialize -> compute this derivation's own
/// store path.
#[instrument(level = "debug", skip_all, fields(name = %args.name))]
pub fn build_package(args: DerivationArgs) -> Result<Package, PackageError> {
    let mut drv = Derivation::default();
    drv.builder = args.builder.clone();
    drv.system = args.system.clone();
    drv.arguments = args.args.clone();

    // Step 1: input_drvs from deps, plus the lookup table for each dep's
    // already-computed modular hash. Because deps are themselves fully
    // resolved Packages, their hash_modulo values are already on hand -
    // there is no need to recurse any further down the dependency graph.
    let mut hash_table: HashMap<String, nix_compat::nixhash::NixHash> = HashMap::new();
    for dep in &args.deps {
        let output_names = args
            .dep_output_overrides
            .get(&dep.drv_path)
            .cloned()
            .unwrap_or_else(|| dep.outputs.keys().cloned().collect());
        drv.input_derivations
            .insert(dep.drv_path.clone(), output_names);
        hash_table.insert(dep.drv_path.clone(), dep.hash_modulo.clone());
    }
    drv.input_sources = args.input_srcs.clone();

    // Step 2: blank outputs, conventional env vars.
    for output_name in &args.output_names {
        if drv
            .outputs
            .insert(output_name.clone(), Output::default())
            .is_some()
        {
            return Err(PackageError::DuplicateOutput(output_name.clone()));
        }
    }

    for (k, v) in &args.env {
        drv.environment.insert(k.clone(), BString::from(v.clone()));
    }
    drv.environment
        .entry("name".to_string())
        .or_insert_with(|| BString::from(args.name.clone()));
    drv.environment
        .entry("builder".to_string())
        .or_insert_with(|| BString::from(args.builder.clone()));
    drv.environment
        .entry("system".to_string())
        .or_insert_with(|| BString::from(args.system.clone()));
    for output_name in &args.output_names {
        drv.environment
            .entry(output_name.clone())
            .or_insert_with(BString::default);
    }

    // Fixed-output derivations: exactly one "out" output, content-addressed
    // directly instead of through the modular hash.
    if let Some(fo) = &args.fixed_output {
        if args.output_names != ["out".to_string()] {
            return Err(PackageError::ConflictingOutputTypes);
        }

        let nix_hash = nixhash::from_str(&fo.hash, fo.algo.as_deref())?;
        let ca_hash = match fo.mode {
            OutputHashMode::Flat => CAHash::Flat(nix_hash),
            OutputHashMode::Recursive => CAHash::Nar(nix_hash),
        };
        drv.outputs.insert(
            "out".to_string(),
            Output {
                path: String::new(),
                ca_hash: Some(ca_hash),
            },
        );
    }

    drv.validate(false).map_err(|source| PackageError::InvalidDerivation {
        name: args.name.clone(),
        source,
    })?;

    // Every input_drv referenced must have a precomputed hash.
    for drv_path in drv.input_derivations.keys() {
        if !hash_table.contains_key(drv_path) {
            return Err(PackageError::MissingInputHash(drv_path.clone()));
        }
    }
    let lookup = |drv_path: &StorePathRef| -> nix_compat::nixhash::NixHash {
        hash_table
            .get(&drv_path.to_absolute_path())
            .cloned()
            .expect("checked above: all input_drvs have a precomputed hash")
    };

    // Step 3/4: the modular hash computed on the still-blank derivation
    // (`mask_outputs = true`) is what determines this derivation's own
    // output paths.
    let hash_for_output_paths = drv.derivation_or_fod_hash(lookup);

    // Step 5/6: fill in the output paths and the matching env vars.
    drv.calculate_output_paths(&args.name, &hash_for_output_paths)
        .map_err(|source| PackageError::InvalidDerivation {
            name: args.name.clone(),
            source,
        })?;

    // Step 8: this derivation's own store path.
    let drv_path = drv
        .calculate_derivation_path(&args.name)
        .map_err(|source| PackageError::InvalidDerivation {
            name: args.name.clone(),
            source,
        })?;

    // The hash a dependent will look up for *this* package is computed on
    // the now-resolved derivation (`mask_outputs = false`), since our own
    // output paths are no longer blank.
    let hash_modulo = drv.derivation_or_fod_hash(lookup);

    let outputs: BTreeMap<String, String> = drv
        .outputs
        .iter()
        .map(|(name, output)| (name.clone(), output.path.clone()))
        .collect();

    Ok(Package::new(
        args.name.clone(),
        drv_path.to_absolute_path(),
        outputs,
        drv,
        hash_modulo,
        args,
    ))
}

/// Sorted union of input derivation paths and input source paths - the
/// `references` set fed to the drv's own text-addressed store path.
/// Exposed separately for callers (e.g. `derivation-show`) that want to
/// recompute it without re-running the whole pipeline.
pub fn references(drv: &Derivation) -> BTreeSet<String> {
    let mut refs: BTreeSet<String> = drv.input_sources.clone();
    refs.extend(drv.input_derivations.keys().cloned());
    refs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::args::{FixedOutputSpec, OutputHashMode};

    fn base_args() -> DerivationArgs {
        DerivationArgs {
            name: "hello".to_string(),
            builder: "/bin/sh".to_string(),
            args: vec!["-c".to_string(), "echo hi".to_string()],
            env: BTreeMap::from([("foo".to_string(), "bar".to_string())]),
            ..Default::default()
        }
    }

    #[test]
    fn store_path_is_stable_across_invocations() {
        let a = build_package(base_args()).unwrap();
        let b = build_package(base_args()).unwrap();
        assert_eq!(a.drv_path, b.drv_path);
        assert_eq!(a.outputs, b.outputs);
    }

    #[test]
    fn changing_name_changes_output_path() {
        let a = build_package(base_args()).unwrap();
        let mut other = base_args();
        other.name = "goodbye".to_string();
        let b = build_package(other).unwrap();
        assert_ne!(a.drv_path, b.drv_path);
        assert_ne!(a.out_path(), b.out_path());
    }

    #[test]
    fn changing_builder_changes_output_path() {
        let a = build_package(base_args()).unwrap();
        let mut other = base_args();
        other.builder = "/bin/bash".to_string();
        let b = build_package(other).unwrap();
        assert_ne!(a.out_path(), b.out_path());
    }

    #[test]
    fn changing_args_changes_output_path() {
        let a = build_package(base_args()).unwrap();
        let mut other = base_args();
        other.args.push("--extra".to_string());
        let b = build_package(other).unwrap();
        assert_ne!(a.out_path(), b.out_path());
    }

    #[test]
    fn changing_env_changes_output_path() {
        let a = build_package(base_args()).unwrap();
        let mut other = base_args();
        other.env.insert("baz".to_string(), "qux".to_string());
        let b = build_package(other).unwrap();
        assert_ne!(a.out_path(), b.out_path());
    }

    #[test]
    fn changing_deps_changes_output_path() {
        let dep = build_package(DerivationArgs {
            name: "dep".to_string(),
            builder: "/bin/sh".to_string(),
            ..Default::default()
        })
        .unwrap();
        let a = build_package(base_args()).unwrap();
        let mut other = base_args();
        other.deps = vec![std::rc::Rc::new(dep)];
        let b = build_package(other).unwrap();
        assert_ne!(a.out_path(), b.out_path());
    }

    #[test]
    fn changing_input_srcs_changes_output_path() {
        let a = build_package(base_args()).unwrap();
        let mut other = base_args();
        other
            .input_srcs
            .insert("/nix/store/00000000000000000000000000000000-src".to_string());
        let b = build_package(other).unwrap();
        assert_ne!(a.out_path(), b.out_path());
    }

    #[test]
    fn fixed_output_insensitive_to_builder_args_env() {
        let hex = "e".repeat(64);
        let a = build_package(DerivationArgs {
            name: "busybox".to_string(),
            builder: "/bin/one-builder".to_string(),
            args: vec!["a".to_string()],
            env: BTreeMap::from([("x".to_string(), "1".to_string())]),
            fixed_output: Some(FixedOutputSpec {
                hash: hex.clone(),
                algo: Some("sha256".to_string()),
                mode: OutputHashMode::Flat,
            }),
            ..Default::default()
        })
        .unwrap();
        let b = build_package(DerivationArgs {
            name: "busybox".to_string(),
            builder: "/bin/completely-different-builder".to_string(),
            args: vec!["b".to_string(), "c".to_string()],
            env: BTreeMap::from([("y".to_string(), "2".to_string())]),
            fixed_output: Some(FixedOutputSpec {
                hash: hex,
                algo: Some("sha256".to_string()),
                mode: OutputHashMode::Flat,
            }),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(a.out_path(), b.out_path());
        // But the drv itself differs, since the recipe differs.
        assert_ne!(a.drv_path, b.drv_path);
    }

    #[test]
    fn override_with_no_changes_is_idempotent() {
        let pkg = build_package(base_args()).unwrap();
        let same = pkg.override_with(|_| {}).unwrap();
        assert_eq!(pkg, same);
    }

    #[test]
    fn override_changes_name_and_rebuilds() {
        let pkg = build_package(base_args()).unwrap();
        let renamed = pkg
            .override_with(|args| args.name = "hello2".to_string())
            .unwrap();
        assert_ne!(pkg.out_path(), renamed.out_path());
        assert_eq!(renamed.name, "hello2");
    }

    #[test]
    fn duplicate_output_name_is_rejected() {
        let args = DerivationArgs {
            name: "dup".to_string(),
            builder: "/bin/sh".to_string(),
            output_names: vec!["out".to_string(), "out".to_string()],
            ..Default::default()
        };
        assert!(matches!(
            build_package(args),
            Err(PackageError::DuplicateOutput(_))
        ));
    }

    #[test]
    fn dependency_closure_propagates_into_input_drvs() {
        let leaf = build_package(DerivationArgs {
            name: "leaf".to_string(),
            builder: "/bin/sh".to_string(),
            ..Default::default()
        })
        .unwrap();
        let mid = build_package(DerivationArgs {
            name: "mid".to_string(),
            builder: "/bin/sh".to_string(),
            deps: vec![std::rc::Rc::new(leaf.clone())],
            ..Default::default()
        })
        .unwrap();
        assert!(mid.derivation.input_derivations.contains_key(&leaf.drv_path));

        let top = build_package(DerivationArgs {
            name: "top".to_string(),
            builder: "/bin/sh".to_string(),
            deps: vec![std::rc::Rc::new(mid.clone())],
            ..Default::default()
        })
        .unwrap();
        assert!(top.derivation.input_derivations.contains_key(&mid.drv_path));
        // Rebuilding the exact same closure is deterministic end to end.
        let top2 = build_package(DerivationArgs {
            name: "top".to_string(),
            builder: "/bin/sh".to_string(),
            deps: vec![std::rc::Rc::new(mid)],
            ..Default::default()
        })
        .unwrap();
        assert_eq!(top.drv_path, top2.drv_path);
    }
}

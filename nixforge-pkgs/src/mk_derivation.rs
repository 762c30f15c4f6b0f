//! `mkDerivation`-equivalent convention shell.
//!
//! Nothing in the core derivation constructor depends on this layer; it exists purely to
//! keep per-package recipes short, the same way nixpkgs' `mkDerivation`
//! sits on top of `builtins.derivation` without changing its semantics.
use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;

use crate::args::DerivationArgs;
use crate::construct::build_package;
use crate::errors::PackageError;
use crate::package::Package;

/// Feature flags nixpkgs' `mkDerivation` conventionally defaults to the
/// empty string (meaning "off") unless a package explicitly opts in. Kept
/// as a fixed catalog rather than a bitflag type, matching the reference's
/// "a dozen empty env vars" convention.
pub const CONVENTIONAL_FLAGS: &[&str] = &[
    "dontUnpack",
    "dontPatch",
    "dontConfigure",
    "dontBuild",
    "dontInstall",
    "dontFixup",
    "dontStrip",
    "dontPatchELF",
    "dontPatchShebangs",
    "dontDisableStatic",
    "dontAddPrefix",
    "dontMoveLib64",
    "dontMoveSbin",
    "dontUseCmakeConfigure",
    "dontUseMesonConfigure",
    "dontWrapQtApps",
    "outputsToInstall",
];

/// The two vendored bootstrap scripts `mkDerivation` wires in as additional
/// input sources for every package, regardless of what the package itself
/// needs - grounded on nixpkgs' `stdenv/generic/setup.sh` plus the
/// `default-builder.sh` every `mkDerivation` call implicitly uses as its
/// `args = ["-e" default-builder.sh]`.
pub const BOOTSTRAP_SCRIPTS: &[&str] = &["setup.sh", "default-builder.sh"];

#[derive(Clone, Debug)]
pub struct MkDerivationArgs {
    pub pname: String,
    pub version: String,
    pub system: String,
    pub builder: String,
    pub env: BTreeMap<String, String>,
    pub output_names: Vec<String>,
    pub deps: Vec<Rc<Package>>,
    pub dep_output_overrides: BTreeMap<String, BTreeSet<String>>,
    /// Store paths of the two bootstrap scripts above, already imported
    /// into the store by the caller - the core never reads local
    /// filesystem paths on its own.
    pub bootstrap_script_paths: BTreeSet<String>,
}

impl MkDerivationArgs {
    pub fn name(&self) -> String {
        format!("{}-{}", self.pname, self.version)
    }
}

/// Builds a package the way `mkDerivation` would: conventional flags
/// defaulted to empty, `pname`/`version` recorded and combined into `name`,
/// and the bootstrap scripts added to `input_srcs`.
pub fn mk_derivation(args: MkDerivationArgs) -> Result<Package, PackageError> {
    let name = args.name();

    let mut env = BTreeMap::new();
    for flag in CONVENTIONAL_FLAGS {
        env.insert((*flag).to_string(), String::new());
    }
    env.insert("pname".to_string(), args.pname.clone());
    env.insert("version".to_string(), args.version.clone());
    for (k, v) in &args.env {
        env.insert(k.clone(), v.clone());
    }

    let drv_args = DerivationArgs {
        name,
        builder: args.builder,
        system: args.system,
        args: Vec::new(),
        env,
        output_names: args.output_names,
        deps: args.deps,
        dep_output_overrides: args.dep_output_overrides,
        input_srcs: args.bootstrap_script_paths,
        fixed_output: None,
    };

    build_package(drv_args)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_args() -> MkDerivationArgs {
        MkDerivationArgs {
            pname: "hello".to_string(),
            version: "2.12".to_string(),
            system: crate::args::DEFAULT_SYSTEM.to_string(),
            builder: "/bin/sh".to_string(),
            env: BTreeMap::new(),
            output_names: vec!["out".to_string()],
            deps: Vec::new(),
            dep_output_overrides: BTreeMap::new(),
            bootstrap_script_paths: BTreeSet::from([
                "/nix/store/00bgd045z0d4icpbc2yyz4gx48ak44la-setup.sh".to_string(),
                "/nix/store/0c5b8vw40dy178xlpddw65q9gf1h2186-default-builder.sh".to_string(),
            ]),
        }
    }

    #[test]
    fn name_combines_pname_and_version() {
        let args = base_args();
        assert_eq!(args.name(), "hello-2.12");
    }

    #[test]
    fn conventional_flags_default_to_empty_and_are_overridable() {
        let mut args = base_args();
        args.env.insert("dontStrip".to_string(), "1".to_string());
        let pkg = mk_derivation(args).unwrap();

        assert_eq!(pkg.derivation.environment.get("dontFixup").unwrap(), "");
        assert_eq!(pkg.derivation.environment.get("dontStrip").unwrap(), "1");
        assert_eq!(pkg.derivation.environment.get("pname").unwrap(), "hello");
        assert_eq!(pkg.derivation.environment.get("version").unwrap(), "2.12");
    }

    #[test]
    fn bootstrap_scripts_are_recorded_as_input_sources() {
        let args = base_args();
        let expected = args.bootstrap_script_paths.clone();
        let pkg = mk_derivation(args).unwrap();
        assert_eq!(pkg.derivation.input_sources, expected);
    }
}

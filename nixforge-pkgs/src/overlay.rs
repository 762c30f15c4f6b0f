//! Package set / overlay composition core.
//!
//! tvix doesn't implement nixpkgs' overlay mechanism itself, only the Nix
//! language evaluator that *executes* overlay expressions written by users.
//! This reimplements the `final`/`prev` knot-tying nixpkgs' `lib.extends`/`lib.fix`
//! perform at the Nix-language level, but as an explicit Rust data
//! structure: each stage is a `Layer` holding an overlay closure and its own
//! memoization caches, chained through a shared, append-only `Vec<Layer>`.
//!
//! Late binding falls out of where `final`/`prev` views point: `final`
//! always resolves to the *last* layer of the chain a [PackageSet] was
//! built from, while `prev` for layer `i` resolves only through layers
//! `0..i`. Building a longer chain later (extending the stage list, then
//! calling [PackageSetBuilder::build] again) produces an independent
//! [PackageSet] whose `final` points further out - mirroring how, in Nix,
//! `lib.fix (f1)` and `lib.fix (f2)` (where `f2 = extends overlay2 f1`) are
//! different fixed points even though `f1` is reused verbatim inside `f2`.
use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::rc::Rc;

use crate::errors::OverlayError;
use crate::package::Package;

/// A lazily-evaluated attribute: given the `final` and `prev` views for the
/// stage it was defined in, produces a [Package]. Cheap to construct (it's
/// just a closure) - the actual derivation construction work only happens
/// the first time [PackageSet::get] forces it.
pub type Definition = Rc<dyn Fn(&PackageSet, &PackageSet) -> Result<Package, OverlayError>>;

/// `(final, prev) -> {name: definition}` - an overlay. A plain stage that
/// ignores `final`/`prev` entirely is just an overlay
/// that doesn't happen to call either argument; there's no separate "Stage"
/// type, since the distinction is only ever in how a given overlay chooses
/// to use its arguments.
pub type Overlay = Rc<dyn Fn(&PackageSet, &PackageSet) -> HashMap<String, Definition>>;

enum CacheEntry {
    InProgress,
    Done(Rc<Package>),
}

struct Layer {
    overlay: Overlay,
    defs: RefCell<Option<Rc<HashMap<String, Definition>>>>,
    attrs: RefCell<HashMap<String, CacheEntry>>,
}

/// Builds a chain of overlays, producing an independent [PackageSet] each
/// time [PackageSetBuilder::build] is called. Overlays already pushed are
/// shared (by `Rc`) with any [PackageSet] built earlier from a shorter
/// prefix of the same builder; their caches are not.
#[derive(Default)]
pub struct PackageSetBuilder {
    overlays: Vec<Overlay>,
}

impl PackageSetBuilder {
    pub fn new() -> Self {
        PackageSetBuilder::default()
    }

    /// Appends one stage to the chain. Each call adds exactly one layer,
    /// whether you think of it as "the base package set" (the first call)
    /// or as an override of later attributes (any subsequent call).
    pub fn overlay<F>(mut self, overlay: F) -> Self
    where
        F: Fn(&PackageSet, &PackageSet) -> HashMap<String, Definition> + 'static,
    {
        self.overlays.push(Rc::new(overlay));
        self
    }

    /// Folds a list of overlay functions into the chain left to right,
    /// producing a set with identical semantics to pushing stages one at a
    /// time.
    pub fn compose(mut self, overlays: impl IntoIterator<Item = Overlay>) -> Self {
        self.overlays.extend(overlays);
        self
    }

    /// Materializes the chain built so far into a [PackageSet] whose
    /// `final` is this chain's own last stage. The builder can keep
    /// growing afterwards; earlier [PackageSet]s built from it are
    /// unaffected.
    pub fn build(&self) -> PackageSet {
        let layers: Vec<Layer> = self
            .overlays
            .iter()
            .map(|overlay| Layer {
                overlay: overlay.clone(),
                defs: RefCell::new(None),
                attrs: RefCell::new(HashMap::new()),
            })
            .collect();

        let index = if layers.is_empty() {
            None
        } else {
            Some(layers.len() - 1)
        };

        PackageSet {
            layers: Rc::new(layers),
            index,
        }
    }
}

/// Convenience constructor for a [Definition] from a plain closure.
pub fn def<F>(f: F) -> Definition
where
    F: Fn(&PackageSet, &PackageSet) -> Result<Package, OverlayError> + 'static,
{
    Rc::new(f)
}

/// A view into one stage of a built overlay chain: exposes lazy, memoized
/// attribute lookup with open recursion through `final`, and explicit
/// previous-stage access through `prev`.
#[derive(Clone)]
pub struct PackageSet {
    layers: Rc<Vec<Layer>>,
    /// `None` represents the empty view before any stage - the `prev` seen
    /// by the very first stage in a chain.
    index: Option<usize>,
}

impl PackageSet {
    /// An empty package set: every lookup fails with `NoSuchAttribute`.
    /// Useful as a base `prev` when composing a chain that doesn't need
    /// one.
    pub fn empty() -> Self {
        PackageSet {
            layers: Rc::new(Vec::new()),
            index: None,
        }
    }

    fn final_view(&self) -> PackageSet {
        PackageSet {
            layers: self.layers.clone(),
            index: Some(self.layers.len() - 1),
        }
    }

    fn prev_view(&self, i: usize) -> PackageSet {
        PackageSet {
            layers: self.layers.clone(),
            index: if i == 0 { None } else { Some(i - 1) },
        }
    }

    /// Computes (once, cached) the map of definitions this stage
    /// contributes, by invoking its overlay function with this chain's
    /// `final`/`prev` views.
    fn layer_defs(&self, i: usize) -> Rc<HashMap<String, Definition>> {
        let layer = &self.layers[i];
        if let Some(defs) = layer.defs.borrow().as_ref() {
            return defs.clone();
        }
        let final_view = self.final_view();
        let prev_view = self.prev_view(i);
        let defs = Rc::new((layer.overlay)(&final_view, &prev_view));
        *layer.defs.borrow_mut() = Some(defs.clone());
        defs
    }

    /// Looks up an attribute, falling through to earlier stages when the
    /// current one doesn't define it, and failing with
    /// [OverlayError::Cycle] if forcing it re-enters its own evaluation.
    pub fn get(&self, name: &str) -> Result<Rc<Package>, OverlayError> {
        let Some(i) = self.index else {
            return Err(OverlayError::NoSuchAttribute(name.to_string()));
        };

        let defs = self.layer_defs(i);
        let Some(definition) = defs.get(name) else {
            return self.prev_view(i).get(name);
        };

        {
            let mut attrs = self.layers[i].attrs.borrow_mut();
            match attrs.get(name) {
                Some(CacheEntry::Done(pkg)) => return Ok(pkg.clone()),
                Some(CacheEntry::InProgress) => {
                    return Err(OverlayError::Cycle(name.to_string()))
                }
                None => {}
            }
            attrs.insert(name.to_string(), CacheEntry::InProgress);
        }

        let final_view = self.final_view();
        let prev_view = self.prev_view(i);
        let result = definition(&final_view, &prev_view).map(Rc::new);

        let mut attrs = self.layers[i].attrs.borrow_mut();
        match &result {
            Ok(pkg) => {
                attrs.insert(name.to_string(), CacheEntry::Done(pkg.clone()));
            }
            Err(_) => {
                // Allow a subsequent, independent access to retry rather
                // than permanently wedging this attribute as "in progress".
                attrs.remove(name);
            }
        }
        result
    }

    /// The union of attribute names known at this stage and every stage
    /// before it - forcing this is cheap (it only materializes each
    /// stage's definition map, never the packages themselves).
    pub fn attribute_names(&self) -> BTreeSet<String> {
        let Some(i) = self.index else {
            return BTreeSet::new();
        };
        let mut names = self.prev_view(i).attribute_names();
        names.extend(self.layer_defs(i).keys().cloned());
        names
    }

    /// Evaluates every known attribute, returning the full resolved
    /// package set. Used by tests asserting overlay monotonicity; not
    /// needed for ordinary attribute access.
    pub fn all_packages(&self) -> Result<BTreeMap<String, Rc<Package>>, OverlayError> {
        self.attribute_names()
            .into_iter()
            .map(|name| {
                let pkg = self.get(&name)?;
                Ok((name, pkg))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::args::DerivationArgs;
    use crate::construct::build_package;

    fn leaf(name: &str) -> Definition {
        let name = name.to_string();
        def(move |_final, _prev| {
            build_package(DerivationArgs {
                name: name.clone(),
                builder: "/bin/sh".to_string(),
                ..Default::default()
            })
            .map_err(OverlayError::from)
        })
    }

    #[test]
    fn fallthrough_to_earlier_stage() {
        let base = PackageSetBuilder::new().overlay(|_final, _prev| {
            let mut defs = HashMap::new();
            defs.insert("hello".to_string(), leaf("hello"));
            defs
        });
        let pkgs = base.build();
        assert!(pkgs.get("hello").is_ok());
        assert!(matches!(
            pkgs.get("missing"),
            Err(OverlayError::NoSuchAttribute(_))
        ));
    }

    #[test]
    fn later_stage_overrides_are_visible_through_self() {
        // Stage 0 defines `hello` and `greeter`, where `greeter` depends on
        // `self.hello` - late binding means a later stage overriding `hello`
        // changes what `greeter` resolves to, without `greeter` itself being
        // redefined.
        let builder = PackageSetBuilder::new()
            .overlay(|_final, _prev| {
                let mut defs = HashMap::new();
                defs.insert("hello".to_string(), leaf("hello-v1"));
                defs.insert(
                    "greeter".to_string(),
                    def(|final_, _prev| {
                        let hello = final_.get("hello")?;
                        build_package(DerivationArgs {
                            name: format!("greeter-for-{}", hello.name),
                            builder: "/bin/sh".to_string(),
                            ..Default::default()
                        })
                        .map_err(OverlayError::from)
                    }),
                );
                defs
            })
            .overlay(|_final, _prev| {
                let mut defs = HashMap::new();
                defs.insert("hello".to_string(), leaf("hello-v2"));
                defs
            });

        let pkgs = builder.build();
        let greeter = pkgs.get("greeter").unwrap();
        assert_eq!(greeter.name, "greeter-for-hello-v2");
    }

    #[test]
    fn prev_breaks_a_self_reference_cycle() {
        // An override that would otherwise recurse through `self.tool`
        // indefinitely can break the cycle by consulting `prev` instead.
        let builder = PackageSetBuilder::new()
            .overlay(|_final, _prev| {
                let mut defs = HashMap::new();
                defs.insert("tool".to_string(), leaf("tool-base"));
                defs
            })
            .overlay(|_final, _prev| {
                let mut defs = HashMap::new();
                defs.insert(
                    "tool".to_string(),
                    def(|_final, prev| {
                        let base = prev.get("tool")?;
                        build_package(DerivationArgs {
                            name: format!("wrapped-{}", base.name),
                            builder: "/bin/sh".to_string(),
                            ..Default::default()
                        })
                        .map_err(OverlayError::from)
                    }),
                );
                defs
            });

        let pkgs = builder.build();
        let tool = pkgs.get("tool").unwrap();
        assert_eq!(tool.name, "wrapped-tool-base");
    }

    #[test]
    fn genuine_self_cycle_is_detected() {
        let builder = PackageSetBuilder::new().overlay(|_final, _prev| {
            let mut defs = HashMap::new();
            defs.insert(
                "cyclic".to_string(),
                def(|final_, _prev| {
                    let _ = final_.get("cyclic")?;
                    unreachable!("cycle should be caught before this runs")
                }),
            );
            defs
        });

        let pkgs = builder.build();
        assert!(matches!(pkgs.get("cyclic"), Err(OverlayError::Cycle(_))));
    }

    #[test]
    fn attribute_is_memoized_across_accesses() {
        let builder = PackageSetBuilder::new().overlay(|_final, _prev| {
            let mut defs = HashMap::new();
            defs.insert("hello".to_string(), leaf("hello"));
            defs
        });
        let pkgs = builder.build();
        let a = pkgs.get("hello").unwrap();
        let b = pkgs.get("hello").unwrap();
        assert!(Rc::ptr_eq(&a, &b));
    }

    #[test]
    fn independently_built_stages_are_monotonic() {
        // Three increasingly-extended package sets, each built fresh from
        // the same overlays - stage N+1's attribute names are a superset of
        // stage N's, and attributes neither stage overrides stay identical.
        let base = PackageSetBuilder::new().overlay(|_final, _prev| {
            let mut defs = HashMap::new();
            defs.insert("shell".to_string(), leaf("bash"));
            defs
        });
        let stage0 = base.build();

        let with_tools = base.overlay(|_final, _prev| {
            let mut defs = HashMap::new();
            defs.insert("tools".to_string(), leaf("coreutils"));
            defs
        });
        let stage1 = with_tools.build();

        let with_app = with_tools.overlay(|final_, _prev| {
            let mut defs = HashMap::new();
            defs.insert(
                "app".to_string(),
                def(|final_, _prev| {
                    let tools = final_.get("tools")?;
                    build_package(DerivationArgs {
                        name: format!("app-using-{}", tools.name),
                        builder: "/bin/sh".to_string(),
                        ..Default::default()
                    })
                    .map_err(OverlayError::from)
                }),
            );
            let _ = final_;
            defs
        });
        let stage2 = with_app.build();

        assert!(stage0.attribute_names().is_subset(&stage1.attribute_names()));
        assert!(stage1.attribute_names().is_subset(&stage2.attribute_names()));

        assert_eq!(stage0.get("shell").unwrap().name, "bash");
        assert_eq!(stage1.get("shell").unwrap().name, "bash");
        assert_eq!(stage1.get("tools").unwrap().name, "coreutils");
        assert_eq!(stage2.get("tools").unwrap().name, "coreutils");
        assert_eq!(stage2.get("app").unwrap().name, "app-using-coreutils");
    }
}

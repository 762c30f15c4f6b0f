use crate::derivation::output::Output;
use crate::derivation::Derivation;
use crate::nixhash::{CAHash, NixHash};
use crate::store_path::StorePath;
use bstr::BString;
use std::collections::BTreeSet;
use std::str::FromStr;

/// This trims all output paths from a Derivation struct,
/// by setting outputs[$outputName].path and environment[$outputName] to the empty string.
fn derivation_with_trimmed_output_paths(derivation: &Derivation) -> Derivation {
    let mut trimmed_env = derivation.environment.clone();
    let mut trimmed_outputs = derivation.outputs.clone();

    for (output_name, output) in &derivation.outputs {
        trimmed_env.insert(output_name.clone(), "".into());
        assert!(trimmed_outputs.contains_key(output_name));
        trimmed_outputs.insert(
            output_name.to_string(),
            Output {
                path: "".to_string(),
                ..output.clone()
            },
        );
    }

    Derivation {
        environment: trimmed_env,
        outputs: trimmed_outputs,
        ..derivation.clone()
    }
}

/// A derivation should serialize to ATerm and parse back to an equal struct.
#[test]
fn serialize_parse_roundtrip() {
    let mut drv = Derivation {
        builder: "/bin/sh".to_string(),
        system: "x86_64-linux".to_string(),
        arguments: vec!["-c".to_string(), "echo hi > $out".to_string()],
        ..Default::default()
    };
    drv.environment.insert("builder".to_string(), "/bin/sh".into());
    drv.environment.insert("name".to_string(), "hello".into());
    drv.environment
        .insert("out".to_string(), "/nix/store/00000000000000000000000000000000-hello".into());
    drv.environment.insert("system".to_string(), "x86_64-linux".into());
    drv.outputs.insert(
        "out".to_string(),
        Output {
            path: "/nix/store/00000000000000000000000000000000-hello".to_string(),
            ca_hash: None,
        },
    );
    drv.input_sources
        .insert("/nix/store/0vpjlv8xmqfn89wkq4xg5f9yxwf5mh4k-builder.sh".to_string());

    let aterm_bytes = drv.to_aterm_bytes();
    let parsed = Derivation::from_aterm_bytes(&aterm_bytes).expect("must parse");

    assert_eq!(drv, parsed);
}

/// Exercises the output path calculation functions like a constructing client
/// (an implementation of `builtins.derivation`) would do:
///
/// ```nix
/// rec {
///   bar = builtins.derivation {
///     name = "bar";
///     builder = ":";
///     system = ":";
///     outputHash = "08813cbee9903c62be4c5027726a418a300da4500b2d369d3af9286f4815ceba";
///     outputHashAlgo = "sha256";
///     outputHashMode = "recursive";
///   };
///
///   foo = builtins.derivation {
///     name = "foo";
///     builder = ":";
///     system = ":";
///     inherit bar;
///   };
/// }
/// ```
///
/// It first assembles the bar derivation, does the output path calculation on
/// it, then continues with the foo derivation, which refers to bar's output
/// path and drv path.
#[test]
fn output_path_construction() {
    // create the bar derivation
    let mut bar_drv = Derivation {
        builder: ":".to_string(),
        system: ":".to_string(),
        ..Default::default()
    };

    let bar_env = &mut bar_drv.environment;
    bar_env.insert("builder".to_string(), ":".into());
    bar_env.insert("name".to_string(), "bar".into());
    bar_env.insert("out".to_string(), "".into()); // will be calculated
    bar_env.insert(
        "outputHash".to_string(),
        "08813cbee9903c62be4c5027726a418a300da4500b2d369d3af9286f4815ceba".into(),
    );
    bar_env.insert("outputHashAlgo".to_string(), "sha256".into());
    bar_env.insert("outputHashMode".to_string(), "recursive".into());
    bar_env.insert("system".to_string(), ":".into());

    bar_drv.outputs.insert(
        "out".to_string(),
        Output {
            path: "".to_string(), // will be calculated
            ca_hash: Some(CAHash::Nar(NixHash::Sha256(
                data_encoding::HEXLOWER
                    .decode(
                        b"08813cbee9903c62be4c5027726a418a300da4500b2d369d3af9286f4815ceba",
                    )
                    .unwrap()
                    .try_into()
                    .unwrap(),
            ))),
        },
    );

    let bar_calc_result = bar_drv.calculate_output_paths(
        "bar",
        &bar_drv.derivation_or_fod_hash(|_| panic!("is FOD, should not lookup")),
    );
    assert!(bar_calc_result.is_ok());

    let bar_out_path = bar_drv.outputs.get("out").expect("must exist").path.clone();
    assert!(bar_out_path.starts_with("/nix/store/"));
    assert_eq!(
        bar_out_path,
        bar_drv.environment.get("out").unwrap().to_string()
    );

    let bar_drv_derivation_or_fod_hash =
        bar_drv.derivation_or_fod_hash(|_| panic!("is FOD, should not lookup"));
    let bar_drv_path = bar_drv
        .calculate_derivation_path("bar")
        .expect("must succeed");
    assert!(bar_drv_path.to_string().ends_with("-bar.drv"));

    // now construct foo, which requires bar_drv
    let mut foo_drv = Derivation {
        builder: ":".to_string(),
        system: ":".to_string(),
        ..Default::default()
    };

    let foo_env = &mut foo_drv.environment;
    foo_env.insert("bar".to_string(), bar_out_path.clone().into());
    foo_env.insert("builder".to_string(), ":".into());
    foo_env.insert("name".to_string(), "foo".into());
    foo_env.insert("out".to_string(), "".into()); // will be calculated
    foo_env.insert("system".to_string(), ":".into());

    foo_drv.outputs.insert(
        "out".to_string(),
        Output {
            path: "".to_string(), // will be calculated
            ca_hash: None,
        },
    );

    foo_drv.input_derivations.insert(
        bar_drv_path.to_absolute_path(),
        BTreeSet::from(["out".to_string()]),
    );

    let foo_calc_result = foo_drv.calculate_output_paths(
        "foo",
        &foo_drv.derivation_or_fod_hash(|drv_path| {
            assert_eq!(bar_drv_path.to_absolute_path(), drv_path.to_absolute_path());
            bar_drv_derivation_or_fod_hash.clone()
        }),
    );
    assert!(foo_calc_result.is_ok());

    let foo_out_path = &foo_drv.outputs.get("out").expect("must exist").path;
    assert!(foo_out_path.starts_with("/nix/store/"));
    assert_ne!(foo_out_path, &bar_out_path);

    // A derivation with the output paths trimmed, then recalculated from
    // scratch, must produce the same struct we started with.
    let mut recalculated = derivation_with_trimmed_output_paths(&foo_drv);
    let recalc_hash = recalculated.derivation_or_fod_hash(|drv_path| {
        assert_eq!(bar_drv_path.to_absolute_path(), drv_path.to_absolute_path());
        bar_drv_derivation_or_fod_hash.clone()
    });
    recalculated
        .calculate_output_paths("foo", &recalc_hash)
        .unwrap();
    assert_eq!(foo_drv, recalculated);

    assert_eq!(
        foo_drv
            .calculate_derivation_path("foo")
            .expect("must succeed")
            .to_string(),
        foo_drv.calculate_derivation_path("foo").unwrap().to_string(),
    );
}

/// Non-ASCII bytes in an environment value must survive a serialize/parse
/// round trip unchanged (the ATerm wire format is binary-safe inside its
/// quoted strings, it's only [crate::store_path::StorePath] names that are
/// restricted to ASCII).
#[test]
fn non_ascii_environment_value_roundtrip() {
    let mut outputs = std::collections::BTreeMap::new();
    outputs.insert(
        "out".to_string(),
        Output {
            path: "/nix/store/s66mzxpvicwk07gjbjfw9izjfa797vsw-with-umlauts".to_string(),
            ca_hash: None,
        },
    );

    let mut environment = std::collections::BTreeMap::new();
    let chars: BString = vec![0xc5, 0xc4, 0xd6].into();
    environment.insert("builder".to_string(), ":".into());
    environment.insert("chars".to_string(), chars.clone());
    environment.insert("name".to_string(), "with-umlauts".into());
    environment.insert(
        "out".to_string(),
        "/nix/store/s66mzxpvicwk07gjbjfw9izjfa797vsw-with-umlauts".into(),
    );
    environment.insert("system".to_string(), ":".into());

    let drv = Derivation {
        builder: ":".to_string(),
        environment,
        outputs,
        system: ":".to_string(),
        ..Default::default()
    };

    let aterm_bytes = drv.to_aterm_bytes();
    let parsed = Derivation::from_aterm_bytes(&aterm_bytes).expect("must parse");

    assert_eq!(drv, parsed);
    assert_eq!(&chars, parsed.environment.get("chars").unwrap());
}

/// `calculate_derivation_path` is pure: calling it twice on the same struct
/// must produce the same [StorePath].
#[test]
fn derivation_path_is_deterministic() {
    let drv = Derivation {
        builder: "/bin/sh".to_string(),
        system: "x86_64-linux".to_string(),
        ..Default::default()
    };

    let a = drv.calculate_derivation_path("stable").unwrap();
    let b = drv.calculate_derivation_path("stable").unwrap();
    assert_eq!(a, b);
    assert_eq!(StorePath::from_str(&a.to_string()).unwrap(), a);
}

//! The fixed-output fetch helper: a thin builder over
//! [crate::construct::build_package] that fills in the conventional
//! environment variables used by the reference implementation's built-in
//! fetcher, grounded on `glue/src/fetchers/` and `glue/src/fetchurl.rs`.
use std::collections::{BTreeMap, BTreeSet};

use crate::args::{DerivationArgs, FixedOutputSpec, OutputHashMode};
use crate::construct::build_package;
use crate::errors::PackageError;
use crate::package::Package;

/// Ambient environment variable names the reference fetcher's builder is
/// allowed to see through the sandbox even though they aren't declared in
/// `env` - impure by nature, since the actual download needs them.
pub const IMPURE_ENV_VARS: &[&str] = &[
    "http_proxy",
    "https_proxy",
    "ftp_proxy",
    "all_proxy",
    "no_proxy",
    "NIX_SSL_CERT_FILE",
    "SSL_CERT_FILE",
];

/// The builder used for all three `fetchurl`-equivalent calling
/// conventions. It never executes the download itself - it only produces
/// the derivation that, if built, would.
#[derive(Clone, Debug)]
pub struct FetchUrlArgs {
    pub name: String,
    pub url: String,
    /// Additional mirrors; always includes `url` as the first entry.
    pub urls: Vec<String>,
    pub unpack: bool,
    pub executable: bool,
    pub system: String,
}

impl FetchUrlArgs {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        let url = url.into();
        FetchUrlArgs {
            name: name.into(),
            urls: vec![url.clone()],
            url,
            unpack: false,
            executable: false,
            system: crate::args::DEFAULT_SYSTEM.to_string(),
        }
    }
}

fn base_env(fetch: &FetchUrlArgs) -> BTreeMap<String, String> {
    let mut env = BTreeMap::new();
    env.insert("url".to_string(), fetch.url.clone());
    env.insert("urls".to_string(), fetch.urls.join(" "));
    env.insert(
        "unpack".to_string(),
        if fetch.unpack { "1" } else { "" }.to_string(),
    );
    env.insert(
        "executable".to_string(),
        if fetch.executable { "1" } else { "" }.to_string(),
    );
    for var in IMPURE_ENV_VARS {
        env.insert((*var).to_string(), String::new());
    }
    env
}

fn build(
    fetch: FetchUrlArgs,
    hash: String,
    algo: Option<String>,
    mode: OutputHashMode,
    extra_env: &[(&str, String)],
) -> Result<Package, PackageError> {
    let mut env = base_env(&fetch);
    env.insert("outputHash".to_string(), hash.clone());
    if let Some(algo) = &algo {
        env.insert("outputHashAlgo".to_string(), algo.clone());
    }
    env.insert("outputHashMode".to_string(), mode.as_str().to_string());
    for (k, v) in extra_env {
        env.insert((*k).to_string(), v.clone());
    }

    let args = DerivationArgs {
        name: fetch.name,
        builder: "builtin:fetchurl".to_string(),
        system: fetch.system,
        args: Vec::new(),
        env,
        output_names: vec!["out".to_string()],
        deps: Vec::new(),
        dep_output_overrides: BTreeMap::new(),
        input_srcs: BTreeSet::new(),
        fixed_output: Some(FixedOutputSpec { hash, algo, mode }),
    };

    build_package(args)
}

/// Calling convention 1: hash passed as plain hex, with the algorithm given
/// out-of-band in `outputHashAlgo`.
pub fn fetchurl_hex(
    fetch: FetchUrlArgs,
    hex_digest: impl Into<String>,
    algo: impl Into<String>,
    mode: OutputHashMode,
) -> Result<Package, PackageError> {
    build(fetch, hex_digest.into(), Some(algo.into()), mode, &[])
}

/// Calling convention 2: hash passed as a self-describing SRI string
/// (`sha256-<base64>`); `outputHashAlgo` is left unset, matching the
/// reference's behavior of inferring the algorithm from the SRI prefix.
pub fn fetchurl_sri(
    fetch: FetchUrlArgs,
    sri: impl Into<String>,
    mode: OutputHashMode,
) -> Result<Package, PackageError> {
    build(fetch, sri.into(), None, mode, &[])
}

/// Calling convention 3: hash passed as a bare nixbase32 string, algorithm
/// given out-of-band. Despite describing the same bytes as the hex and SRI
/// conventions, this produces a different serialized `outputHash` field and
/// therefore a different env - callers must pick the convention the
/// original recipe used to stay byte-compatible.
pub fn fetchurl_nixbase32(
    fetch: FetchUrlArgs,
    nixbase32_digest: impl Into<String>,
    algo: impl Into<String>,
    mode: OutputHashMode,
) -> Result<Package, PackageError> {
    build(fetch, nixbase32_digest.into(), Some(algo.into()), mode, &[])
}

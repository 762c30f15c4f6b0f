//! `nixforge`: a small CLI shell around `nix-compat`, `nixforge-pkgs`, and
//! `nixforge-daemon`. Every subcommand is a thin translation from parsed
//! arguments to a library call and back to stdout; the library crates hold
//! all the actual logic.
mod args;
mod errors;

use std::fs;
use std::io::Read as _;
use std::path::Path;

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::collections::BTreeMap;

use nix_compat::nar;
use nix_compat::nixbase32;
use nix_compat::nixhash::{self, HashAlgo, NixHash};
use nix_compat::store_path;
use nixforge_daemon::DaemonClient;

use args::{Args, Command};
use errors::CliError;

fn main() -> Result<()> {
    let args = Args::parse();

    nixforge_tracing::TracingBuilder::default()
        .level(args.log_level)
        .build()
        .context("failed to set up logging")?;

    match args.command {
        Command::HashPath { path } => hash_path(&path),
        Command::HashFile { path, algo } => hash_file(&path, &algo),
        Command::StorePath { name, text, source } => store_path_cmd(&name, text, source),
        Command::DerivationShow { drv_path } => derivation_show(drv_path),
        Command::IsValid { path } => is_valid(&args.nix_remote, &path),
        Command::PathInfo { path } => path_info(&args.nix_remote, &path),
        Command::AddText {
            name,
            content_file,
            references,
        } => add_text(&args.nix_remote, &name, content_file, &references),
        Command::Build { paths } => build(&args.nix_remote, &paths),
    }
}

fn read_file(path: &Path) -> Result<Vec<u8>, CliError> {
    fs::read(path).map_err(|source| CliError::ReadFile {
        path: path.to_path_buf(),
        source,
    })
}

/// `hash-path`: NAR-hash a filesystem subtree.
fn hash_path(path: &Path) -> Result<()> {
    use sha2::Digest;

    let mut buf = Vec::new();
    nar::dump_path(&mut buf, path)
        .with_context(|| format!("failed to archive {}", path.display()))?;
    let digest = sha2::Sha256::digest(&buf);
    println!("sha256:{}", nixbase32::encode(&digest));
    Ok(())
}

/// `hash-file`: flat-hash a single file's raw bytes.
fn hash_file(path: &Path, algo: &str) -> Result<()> {
    use sha2::Digest as _;

    let algo: HashAlgo = algo
        .try_into()
        .map_err(|e: nixhash::Error| anyhow::anyhow!(e))?;
    let data = read_file(path)?;

    let digest: Vec<u8> = match algo {
        HashAlgo::Md5 => md5::compute(&data).to_vec(),
        HashAlgo::Sha1 => sha1::Sha1::digest(&data).to_vec(),
        HashAlgo::Sha256 => sha2::Sha256::digest(&data).to_vec(),
        HashAlgo::Sha512 => sha2::Sha512::digest(&data).to_vec(),
    };
    let hash = nixhash::from_algo_and_digest(algo, &digest)?;
    println!("{}", hash.to_nix_hex_string());
    Ok(())
}

/// `store-path`: compute a content-addressed store path without touching
/// the daemon. Exactly one of `text`/`source` must be given.
fn store_path_cmd(name: &str, text: Option<std::path::PathBuf>, source: Option<std::path::PathBuf>) -> Result<()> {
    let sp = match (text, source) {
        (Some(text_path), None) => {
            let content = read_file(&text_path)?;
            store_path::build_text_path(name, &content, Vec::<String>::new())?.to_owned()
        }
        (None, Some(source_path)) => {
            use sha2::Digest;

            let mut buf = Vec::new();
            nar::dump_path(&mut buf, &source_path)
                .with_context(|| format!("failed to archive {}", source_path.display()))?;
            let digest: [u8; 32] = sha2::Sha256::digest(&buf).into();
            let ca_hash = nixhash::CAHash::Nar(NixHash::Sha256(digest));
            store_path::build_ca_path(name, &ca_hash, Vec::<String>::new(), false)?.to_owned()
        }
        _ => bail!(CliError::AmbiguousStorePathMode),
    };
    println!("{}", sp.to_absolute_path());
    Ok(())
}

/// `derivation-show`: parse a `.drv` file's ATerm encoding and pretty-print
/// it as JSON, in the same vein as `nix-compat/src/bin/drvfmt.rs`.
fn derivation_show(drv_path: Option<std::path::PathBuf>) -> Result<()> {
    let buf = match drv_path {
        Some(path) => read_file(&path)?,
        None => {
            let mut buf = Vec::new();
            std::io::stdin()
                .read_to_end(&mut buf)
                .context("failed to read derivation from stdin")?;
            buf
        }
    };

    let drv = nix_compat::derivation::Derivation::from_aterm_bytes(&buf)
        .map_err(|e| anyhow::anyhow!("unable to parse derivation: {e:#?}"))?;

    let value = serde_json::json!({
        "args": drv.arguments,
        "builder": drv.builder,
        "env": drv.environment.into_iter().map(|(k, v)| (k, v.to_string())).collect::<BTreeMap<String, String>>(),
        "inputDrvs": drv.input_derivations,
        "inputSrcs": drv.input_sources,
        "outputs": drv.outputs,
        "system": drv.system,
    });
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

/// `is-valid`: query path validity from the daemon, exiting non-zero on
/// invalid paths so the command is scriptable as a predicate.
fn is_valid(nix_remote: &str, path: &str) -> Result<()> {
    let mut client = DaemonClient::connect(nix_remote)
        .with_context(|| format!("failed to connect to daemon at {nix_remote}"))?;
    let valid = client.is_valid_path(path)?;
    println!("{}", if valid { "valid" } else { "invalid" });
    if !valid {
        std::process::exit(1);
    }
    Ok(())
}

/// `path-info`: fetch and print a store path's metadata.
fn path_info(nix_remote: &str, path: &str) -> Result<()> {
    let mut client = DaemonClient::connect(nix_remote)
        .with_context(|| format!("failed to connect to daemon at {nix_remote}"))?;
    let info = client.query_path_info(path)?;
    println!("deriver: {}", info.deriver);
    println!("nar-hash: {}", info.nar_hash);
    println!("nar-size: {}", info.nar_size);
    println!("references: {}", info.references.join(" "));
    println!("sigs: {}", info.signatures.join(" "));
    Ok(())
}

/// `add-text`: text-address content into the store via the daemon.
fn add_text(
    nix_remote: &str,
    name: &str,
    content_file: Option<std::path::PathBuf>,
    references: &[String],
) -> Result<()> {
    let content = match content_file {
        Some(path) => String::from_utf8(read_file(&path)?)
            .context("content file is not valid UTF-8")?,
        None => {
            let mut s = String::new();
            std::io::stdin()
                .read_to_string(&mut s)
                .context("failed to read content from stdin")?;
            s
        }
    };

    let mut client = DaemonClient::connect(nix_remote)
        .with_context(|| format!("failed to connect to daemon at {nix_remote}"))?;
    let path = client.add_text_to_store(name, &content, references)?;
    println!("{path}");
    Ok(())
}

/// `build`: request the daemon build one or more store paths.
fn build(nix_remote: &str, paths: &[String]) -> Result<()> {
    let mut client = DaemonClient::connect(nix_remote)
        .with_context(|| format!("failed to connect to daemon at {nix_remote}"))?;
    client.build_paths(paths)?;
    println!("build succeeded");
    Ok(())
}

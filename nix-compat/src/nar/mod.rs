//! Implements the Nix Archive (NAR) format.
//!
//! A NAR is a deterministic serialization of a filesystem tree: regular
//! files (optionally executable), symlinks, and directories (whose entries
//! must be written in strictly ascending order by name). It's the format
//! Nix hashes to produce output-path digests for non-fixed-output
//! derivations, and the format fixed-output derivations with `recursive`
//! hash mode hash directly.
//!
//! This only implements the writer side - producing a NAR from an existing
//! file hierarchy. There's no store to read existing NARs back out of.

pub mod ingest;
pub mod wire;
pub mod writer;

pub use ingest::dump_path;

//! `nix-compat` is the bit-for-bit compatibility layer with C++ Nix: the
//! parts of this workspace that other implementations (cppnix itself, Lix,
//! Guix) need to agree with byte-for-byte. It intentionally stays small and
//! dependency-light - no logging, no async, nothing that isn't needed to get
//! the wire formats and hashes exactly right.
extern crate self as nix_compat;

pub(crate) mod aterm;
pub mod derivation;
pub mod nar;
pub mod nixbase32;
pub mod nixhash;
pub mod store_path;

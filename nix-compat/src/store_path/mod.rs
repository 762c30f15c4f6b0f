use crate::nixbase32::{self, Nixbase32DecodeError};
use data_encoding::BASE64;
use std::{fmt, path::PathBuf, str::FromStr};
use thiserror;

#[cfg(target_family = "unix")]
use std::os::unix::ffi::OsStringExt;

mod utils;

pub use utils::*;

pub const DIGEST_SIZE: usize = 20;
// lazy_static doesn't allow us to call NIXBASE32.encode_len(), so we ran it
// manually and have an assert in the tests.
pub const ENCODED_DIGEST_SIZE: usize = 32;

// The store dir prefix, without trailing slash.
// That's usually where the Nix store is mounted at.
pub const STORE_DIR: &str = "/nix/store";
pub const STORE_DIR_WITH_SLASH: &str = "/nix/store/";

/// Errors that can occur when parsing a literal store path
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("Dash is missing between hash and name")]
    MissingDash(),
    #[error("Hash encoding is invalid: {0}")]
    InvalidHashEncoding(Nixbase32DecodeError),
    #[error("Invalid length")]
    InvalidLength(),
    #[error(
        "Invalid name: \"{}\", character at position {} is invalid",
        std::str::from_utf8(.0).unwrap_or(&BASE64.encode(.0)),
        .1,
    )]
    InvalidName(Vec<u8>, usize),
    #[error("Tried to parse an absolute path which was missing the store dir prefix.")]
    MissingStoreDir(),
}

/// Represents a path in the Nix store (a direct child of [STORE_DIR]).
///
/// It consists of a digest (20 bytes), and a name, which is a string.
/// The name may only contain ASCII alphanumeric, or one of the following
/// characters: `-`, `_`, `.`, `+`, `?`, `=`.
/// The name is usually used to describe the pname and version of a package.
/// Derivation paths can also be represented as store paths, their names just
/// end with the `.drv` prefix.
///
/// A [StorePath] does not encode any additional subpath "inside" the store
/// path.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct StorePath {
    pub digest: [u8; DIGEST_SIZE],
    pub name: String,
}

impl PartialOrd for StorePath {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        self.digest.partial_cmp(&other.digest)
    }
}

impl Ord for StorePath {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.digest.cmp(&other.digest)
    }
}

impl FromStr for StorePath {
    type Err = Error;

    /// Construct a [StorePath] by passing the `$digest-$name` string
    /// that comes after [STORE_DIR_WITH_SLASH].
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_bytes(s.as_bytes())
    }
}

impl StorePath {
    /// Construct a [StorePath] by passing the `$digest-$name` string
    /// that comes after [STORE_DIR_WITH_SLASH].
    pub fn from_bytes(s: &[u8]) -> Result<StorePath, Error> {
        // the whole string needs to be at least:
        //
        // - 32 characters (encoded hash)
        // - 1 dash
        // - 1 character for the name
        if s.len() < ENCODED_DIGEST_SIZE + 2 {
            Err(Error::InvalidLength())?
        }

        let digest = match nixbase32::decode(&s[..ENCODED_DIGEST_SIZE]) {
            Ok(decoded) => decoded,
            Err(decoder_error) => return Err(Error::InvalidHashEncoding(decoder_error)),
        };

        if s[ENCODED_DIGEST_SIZE] != b'-' {
            return Err(Error::MissingDash());
        }

        Ok(StorePath {
            name: validate_name(&s[ENCODED_DIGEST_SIZE + 1..])?,
            digest: digest.try_into().expect("size is known"),
        })
    }

    /// Construct a [StorePath] from an absolute store path string.
    /// This is equivalent to calling [StorePath::from_bytes], but stripping the
    /// [STORE_DIR_WITH_SLASH] prefix before.
    pub fn from_absolute_path(s: &[u8]) -> Result<StorePath, Error> {
        match s.strip_prefix(STORE_DIR_WITH_SLASH.as_bytes()) {
            Some(s_stripped) => Self::from_bytes(s_stripped),
            None => Err(Error::MissingStoreDir()),
        }
    }

    /// Construct a [StorePath] from a name and digest.
    pub fn from_name_and_digest(name: String, digest: &[u8]) -> Result<StorePath, Error> {
        Ok(Self {
            name: validate_name(name.as_bytes())?,
            digest: digest.try_into().map_err(|_| Error::InvalidLength())?,
        })
    }

    /// Decompose a string into a [StorePath] and a [PathBuf] containing the
    /// rest of the path, or an error.
    #[cfg(target_family = "unix")]
    pub fn from_absolute_path_full(s: &str) -> Result<(StorePath, PathBuf), Error> {
        // strip [STORE_DIR_WITH_SLASH] from s
        match s.strip_prefix(STORE_DIR_WITH_SLASH) {
            None => Err(Error::MissingStoreDir()),
            Some(rest) => {
                // put rest in a PathBuf
                let mut p = PathBuf::new();
                p.push(rest);

                let mut it = p.components();

                // The first component of the rest must be parse-able as a [StorePath]
                if let Some(first_component) = it.next() {
                    // convert first component to StorePath
                    let first_component_bytes = first_component.as_os_str().to_owned().into_vec();
                    let store_path = StorePath::from_bytes(&first_component_bytes)?;
                    // collect rest
                    let rest_buf: PathBuf = it.collect();
                    Ok((store_path, rest_buf))
                } else {
                    Err(Error::InvalidLength()) // Well, or missing "/"?
                }
            }
        }
    }

    /// Converts the [StorePath] to an absolute store path string.
    /// That is just the string representation, prefixed with the store prefix
    /// ([STORE_DIR_WITH_SLASH]),
    pub fn to_absolute_path(&self) -> String {
        format!("{}{}", STORE_DIR_WITH_SLASH, self)
    }
}

/// Checks a given &[u8] to match the restrictions for [StorePath::name], and
/// returns the name as string if successful.
pub(crate) fn validate_name(s: &[u8]) -> Result<String, Error> {
    // Empty names are not allowed.
    if s.is_empty() {
        return Err(Error::InvalidLength());
    }

    for (i, c) in s.iter().enumerate() {
        if c.is_ascii_alphanumeric()
            || (*c == b'.' && i != 0) // can't start with a dot
            || *c == b'-'
            || *c == b'_'
            || *c == b'+'
            || *c == b'?'
            || *c == b'='
        {
            continue;
        }

        return Err(Error::InvalidName(s.to_vec(), i));
    }

    Ok(String::from_utf8(s.to_vec()).unwrap())
}

/// Ensures the StorePath fulfils the requirements for store paths.
/// Useful when populating the struct manually instead of parsing.
pub fn validate(s: &StorePath) -> Result<(), Error> {
    validate_name(s.name.as_bytes())?;

    Ok(())
}

/// A borrowed variant of [StorePath], borrowing the name.
/// Useful for e.g. deriving a new [StorePath], from an existing one, without
/// needing to copy the name.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StorePathRef<'a> {
    digest: [u8; DIGEST_SIZE],
    name: &'a str,
}

impl<'a> StorePathRef<'a> {
    /// Construct a [StorePathRef] from a name and digest, validating the name
    /// in the process.
    pub fn from_parts(name: &'a str, digest: [u8; DIGEST_SIZE]) -> Result<Self, Error> {
        validate_name(name.as_bytes())?;
        Ok(Self { digest, name })
    }

    /// Construct a [StorePathRef] by passing the `$digest-$name` string
    /// that comes after [STORE_DIR_WITH_SLASH].
    pub fn from_bytes(s: &'a [u8]) -> Result<Self, Error> {
        if s.len() < ENCODED_DIGEST_SIZE + 2 {
            Err(Error::InvalidLength())?
        }

        let digest = match nixbase32::decode(&s[..ENCODED_DIGEST_SIZE]) {
            Ok(decoded) => decoded,
            Err(decoder_error) => return Err(Error::InvalidHashEncoding(decoder_error)),
        };

        if s[ENCODED_DIGEST_SIZE] != b'-' {
            return Err(Error::MissingDash());
        }

        let name = &s[ENCODED_DIGEST_SIZE + 1..];
        validate_name(name)?;

        Ok(Self {
            digest: digest.try_into().expect("size is known"),
            // Safe, as validate_name ensures the name only consists of
            // ASCII characters.
            name: std::str::from_utf8(name).expect("validated to be ascii"),
        })
    }

    /// Construct a [StorePathRef] from an absolute store path string.
    pub fn from_absolute_path(s: &'a [u8]) -> Result<Self, Error> {
        match s.strip_prefix(STORE_DIR_WITH_SLASH.as_bytes()) {
            Some(s_stripped) => Self::from_bytes(s_stripped),
            None => Err(Error::MissingStoreDir()),
        }
    }

    pub fn digest(&self) -> &[u8; DIGEST_SIZE] {
        &self.digest
    }

    pub fn name(&self) -> &'a str {
        self.name
    }

    /// Converts the [StorePathRef] to an absolute store path string.
    pub fn to_absolute_path(&self) -> String {
        format!("{}{}", STORE_DIR_WITH_SLASH, self)
    }

    /// Clones the borrowed name to construct an owned [StorePath].
    pub fn to_owned(&self) -> StorePath {
        StorePath {
            digest: self.digest,
            name: self.name.to_string(),
        }
    }
}

impl<'a> From<&'a StorePath> for StorePathRef<'a> {
    fn from(p: &'a StorePath) -> Self {
        Self {
            digest: p.digest,
            name: &p.name,
        }
    }
}

impl fmt::Display for StorePathRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", nixbase32::encode(&self.digest), self.name)
    }
}

/// Errors that can occur when calculating a store path for some content
/// addressed data ([build_text_path], [build_ca_path] or [build_output_path]).
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum BuildStorePathError {
    #[error("invalid store path: {0}")]
    InvalidStorePath(#[from] Error),
}

/// Returns the "prefix" used in the fixed-output hash fingerprint, for the
/// given [crate::nixhash::CAHash]. This is an empty string for [CAHash::Flat],
/// `"r:"` for [CAHash::Nar], and invalid for [CAHash::Text] (which is not a
/// valid mode to compute a standalone store path from).
fn ca_kind_prefix(ca_hash: &crate::nixhash::CAHash) -> &'static str {
    use crate::nixhash::CAHash;
    match ca_hash {
        CAHash::Flat(_) => "",
        CAHash::Nar(_) => "r:",
        CAHash::Text(_) => panic!("invalid ca hash for store path calculation: {:?}", ca_hash),
    }
}

/// Calculates the store path for plain text content (as used by
/// `builtins.toFile`, and derivation path calculation), given the name,
/// content, and references of the text.
pub fn build_text_path<'a, S: AsRef<str>, I: IntoIterator<Item = S>, C: AsRef<[u8]>>(
    name: &'a str,
    content: C,
    references: I,
) -> Result<StorePathRef<'a>, BuildStorePathError> {
    use sha2::{Digest, Sha256};

    let fingerprint = text_hash_string(name, content, references);
    let digest =
        compress_hash::<DIGEST_SIZE>(&Sha256::new_with_prefix(fingerprint.as_bytes()).finalize());

    StorePathRef::from_parts(name, digest).map_err(BuildStorePathError::InvalidStorePath)
}

/// Calculates the store path for a content-addressed store object (such as a
/// fixed-output derivation's output, or a fetched source), given the name
/// and the [crate::nixhash::CAHash] describing its contents.
///
/// `references` and `self_reference` are accepted for symmetry with upstream
/// Nix' `makeFixedOutputPathFromCA`, but (mirroring the stable, non-CA-derivation
/// codepath, which is the only one this crate needs to reproduce) they don't
/// currently influence the computed hash.
pub fn build_ca_path<'a, S: AsRef<str>, I: IntoIterator<Item = S>>(
    name: &'a str,
    ca_hash: &crate::nixhash::CAHash,
    _references: I,
    _self_reference: bool,
) -> Result<StorePathRef<'a>, BuildStorePathError> {
    use crate::nixhash::{CAHash, NixHash};
    use sha2::{Digest, Sha256};

    let digest = match ca_hash {
        CAHash::Nar(NixHash::Sha256(digest)) => compress_hash::<DIGEST_SIZE>(
            &Sha256::new_with_prefix(
                format!(
                    "source:sha256:{}:{}:{}",
                    data_encoding::HEXLOWER.encode(digest),
                    STORE_DIR,
                    name
                )
                .as_bytes(),
            )
            .finalize(),
        ),
        _ => {
            let inner_digest = Sha256::new_with_prefix(
                format!(
                    "fixed:out:{}{}:",
                    ca_kind_prefix(ca_hash),
                    ca_hash.hash().to_nix_hex_string(),
                )
                .as_bytes(),
            )
            .finalize();

            compress_hash::<DIGEST_SIZE>(
                &Sha256::new_with_prefix(
                    format!(
                        "output:out:sha256:{}:{}:{}",
                        data_encoding::HEXLOWER.encode(inner_digest),
                        STORE_DIR,
                        name
                    )
                    .as_bytes(),
                )
                .finalize(),
            )
        }
    };

    StorePathRef::from_parts(name, digest).map_err(BuildStorePathError::InvalidStorePath)
}

/// Calculates the store path of a non-fixed derivation output, given the
/// `derivation_or_fod_hash` (see [crate::derivation::Derivation::derivation_or_fod_hash]),
/// the output name, and the name of the output path (name, or name-outputname).
pub fn build_output_path<'a>(
    derivation_or_fod_hash: &crate::nixhash::NixHash,
    output_name: &str,
    path_name: &'a str,
) -> Result<StorePathRef<'a>, Error> {
    use sha2::{Digest, Sha256};

    let fingerprint = format!(
        "output:{}:{}:{}:{}",
        output_name,
        derivation_or_fod_hash.to_nix_hex_string(),
        STORE_DIR,
        path_name,
    );
    let digest = compress_hash::<DIGEST_SIZE>(&Sha256::new_with_prefix(fingerprint.as_bytes()).finalize());

    StorePathRef::from_parts(path_name, digest)
}

impl fmt::Display for StorePath {
    /// The string representation of a store path starts with a digest (20
    /// bytes), [crate::nixbase32]-encoded, followed by a `-`,
    /// and ends with the name.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", nixbase32::encode(&self.digest), self.name)
    }
}

//! Response shape of `query_path_info`.

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PathInfo {
    /// Absolute store path of the `.drv` that produced this path, or empty
    /// if unknown/not a derivation output.
    pub deriver: String,
    /// `<algo>:<base32-digest>` NAR hash, as the daemon hands it back.
    pub nar_hash: String,
    pub references: Vec<String>,
    pub registration_time: u64,
    pub nar_size: u64,
    pub signatures: Vec<String>,
}

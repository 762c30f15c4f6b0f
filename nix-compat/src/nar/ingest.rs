//! Walks a real filesystem subtree and feeds it into [`crate::nar::writer`].
//!
//! This is the other half of the archive serializer promised by the crate's
//! module doc: [`crate::nar::writer`] only knows how to emit NAR tokens for
//! nodes it's handed one at a time; `dump_path` is what actually looks at a
//! directory on disk, sorts its entries, and recurses.

use std::fs;
use std::io::{self, BufReader, Write};
use std::os::unix::ffi::OsStrExt;
use std::path::Path;

use super::writer;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("unsupported-node: {0} is neither a regular file, directory, nor symlink")]
    UnsupportedNode(String),

    #[error("io error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
}

fn io_err(path: &Path, source: io::Error) -> Error {
    Error::Io {
        path: path.display().to_string(),
        source,
    }
}

/// Serializes the filesystem node at `path` as a NAR, writing it to `w`.
///
/// `path` may refer to a regular file, a symlink, or a directory; in the
/// directory case, the subtree is walked recursively. Directory entries are
/// emitted in byte-lexicographic order of their name, which is what makes the
/// resulting bytes canonical. Only the owner-executable bit of regular files
/// is preserved; all other metadata (permissions, ownership, timestamps,
/// xattrs) is discarded, matching §4.4's contract.
pub fn dump_path<W: Write>(w: &mut W, path: &Path) -> Result<(), Error> {
    let node = writer::open(w).map_err(|e| io_err(path, e))?;
    dump_node(node, path)
}

fn dump_node<W: Write>(node: writer::Node<'_, W>, path: &Path) -> Result<(), Error> {
    let metadata = fs::symlink_metadata(path).map_err(|e| io_err(path, e))?;
    let file_type = metadata.file_type();

    if file_type.is_symlink() {
        let target = fs::read_link(path).map_err(|e| io_err(path, e))?;
        node.symlink(target.as_os_str().as_bytes())
            .map_err(|e| io_err(path, e))
    } else if file_type.is_file() {
        use std::os::unix::fs::PermissionsExt;
        let executable = metadata.permissions().mode() & 0o100 != 0;
        let mut reader = BufReader::new(fs::File::open(path).map_err(|e| io_err(path, e))?);
        node.file(executable, metadata.len(), &mut reader)
            .map_err(|e| io_err(path, e))
    } else if file_type.is_dir() {
        dump_directory(node, path)
    } else {
        Err(Error::UnsupportedNode(path.display().to_string()))
    }
}

fn dump_directory<W: Write>(node: writer::Node<'_, W>, path: &Path) -> Result<(), Error> {
    let mut entries: Vec<std::ffi::OsString> = fs::read_dir(path)
        .map_err(|e| io_err(path, e))?
        .map(|entry| entry.map(|e| e.file_name()))
        .collect::<io::Result<_>>()
        .map_err(|e| io_err(path, e))?;
    entries.sort_by(|a, b| a.as_bytes().cmp(b.as_bytes()));

    let mut directory = node.directory().map_err(|e| io_err(path, e))?;
    for name in &entries {
        let child_node = directory.entry(name.as_bytes()).map_err(|e| io_err(path, e))?;
        dump_node(child_node, &path.join(name))?;
    }
    directory.close().map_err(|e| io_err(path, e))
}

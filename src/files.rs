//! Filesystem primitives shared by page ingestion and output-tree upkeep.
//!
//! Everything here is synchronous and fails closed: the first error is
//! returned, nothing is retried. Errors carry the attempted operation and the
//! path through [`PathError`], so a caller that processes many files can
//! report each failure with its context intact.
//!
//! # Bottom-Up Traversal
//!
//! [`postfix_walk`] visits a directory's entries before the directory itself:
//!
//! ```text
//! dist/
//! ├── a/
//! │   └── x.html      1
//! │                   2  (a/)
//! ├── b/
//! │   └── c/          3  (b/c/)
//! │                   4  (b/)
//! └── index.html      5
//!                     6  (dist/)
//! ```
//!
//! Because every descendant has been seen by the time a directory is
//! visited, a visitor may delete that directory. This is what lets
//! [`remove_empty_directories`] collapse whole empty chains in one pass.

use std::error::Error as StdError;
use std::fs::{self, File, Metadata};
use std::io::{self, BufWriter, Read, Write};
use std::path::{Component, Path, PathBuf};
use thiserror::Error;

/// Number of leading bytes inspected by [`read_file_magic`].
pub const MAGIC_LEN: usize = 4;

type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// A failed filesystem operation: what was attempted, on which path, and why.
#[derive(Error, Debug)]
#[error("{op} {}: {source}", .path.display())]
pub struct PathError {
    pub op: String,
    pub path: PathBuf,
    #[source]
    pub source: BoxError,
}

impl PathError {
    /// Build a path error from a plain message.
    pub fn new(op: impl Into<String>, path: impl Into<PathBuf>, text: impl Into<String>) -> Self {
        Self {
            op: op.into(),
            path: path.into(),
            source: text.into().into(),
        }
    }

    /// Wrap `err` with an operation and path.
    ///
    /// Wrapping is idempotent: if `err` already is a `PathError` it is
    /// returned as-is, keeping the innermost operation and path.
    pub fn wrap<E>(err: E, op: impl Into<String>, path: impl Into<PathBuf>) -> Self
    where
        E: Into<BoxError>,
    {
        match err.into().downcast::<PathError>() {
            Ok(existing) => *existing,
            Err(source) => Self {
                op: op.into(),
                path: path.into(),
                source,
            },
        }
    }

    /// The underlying I/O error, if the cause is one.
    pub fn io_error(&self) -> Option<&io::Error> {
        self.source.downcast_ref::<io::Error>()
    }

    pub fn is_not_found(&self) -> bool {
        self.io_error()
            .is_some_and(|e| e.kind() == io::ErrorKind::NotFound)
    }

    pub fn is_not_empty(&self) -> bool {
        self.io_error().is_some_and(is_not_empty)
    }
}

/// Create (or truncate) `path` and hand a writer to `write`.
///
/// The file is released exactly once on every path:
///
/// - `write` fails: anything still buffered is discarded, the handle is
///   dropped, and the routine's own error is returned.
/// - `write` succeeds: the buffer is flushed as a separate step, and a
///   failure there is returned rather than lost in a drop.
pub fn visit_created_file<F, E>(path: &Path, write: F) -> Result<(), E>
where
    F: FnOnce(&mut dyn Write) -> Result<(), E>,
    E: From<PathError>,
{
    let file = File::create(path).map_err(|e| PathError::wrap(e, "create", path))?;
    let mut writer = BufWriter::new(file);
    if let Err(err) = write(&mut writer) {
        let (file, _unflushed) = writer.into_parts();
        drop(file);
        return Err(err);
    }
    let file = writer
        .into_inner()
        .map_err(|e| PathError::wrap(e.into_error(), "close", path))?;
    drop(file);
    Ok(())
}

/// Copy the contents of `src` to `dst`, creating `dst`'s parent directories.
///
/// Not atomic, and permissions and timestamps are not copied. A partially
/// written `dst` is removed when the copy fails.
pub fn copy_file_contents(dst: &Path, src: &Path) -> Result<(), PathError> {
    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent).map_err(|e| PathError::wrap(e, "mkdir", parent))?;
    }
    let mut input = File::open(src).map_err(|e| PathError::wrap(e, "open", src))?;
    let mut output = File::create(dst).map_err(|e| PathError::wrap(e, "create", dst))?;
    if let Err(e) = io::copy(&mut input, &mut output) {
        drop(output);
        let _ = fs::remove_file(dst);
        return Err(PathError::wrap(e, "copy", src));
    }
    drop(output);
    Ok(())
}

/// Make `path` absolute and fold away `.` and `..` components lexically.
///
/// An existing path is canonicalized instead, so symlinks are followed. A
/// `..` at the filesystem root stays at the root.
pub fn resolve_path(path: &Path) -> Result<PathBuf, PathError> {
    if let Ok(canonical) = fs::canonicalize(path) {
        return Ok(canonical);
    }
    let absolute = std::path::absolute(path).map_err(|e| PathError::wrap(e, "resolve", path))?;
    let mut resolved = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                resolved.pop();
            }
            other => resolved.push(other),
        }
    }
    Ok(resolved)
}

/// Read up to the first [`MAGIC_LEN`] bytes of a file.
///
/// Shorter files yield exactly the bytes they have. When the fourth byte is
/// `\r` it is reported as `\n`, so `---\r\n` and `---\n` sniff the same.
/// The file itself is never modified.
pub fn read_file_magic(path: &Path) -> Result<Vec<u8>, PathError> {
    let file = File::open(path).map_err(|e| PathError::wrap(e, "open", path))?;
    let mut magic = Vec::with_capacity(MAGIC_LEN);
    file.take(MAGIC_LEN as u64)
        .read_to_end(&mut magic)
        .map_err(|e| PathError::wrap(e, "read", path))?;
    if magic.len() == MAGIC_LEN && magic[MAGIC_LEN - 1] == b'\r' {
        magic[MAGIC_LEN - 1] = b'\n';
    }
    Ok(magic)
}

/// Walk `root` depth-first, visiting every entry before its parent directory.
///
/// Entries are visited in file-name order. Subdirectories are recursed into
/// (symlinks are visited but not followed); every other entry is passed to
/// `visit` with its own metadata. There is no way to skip a subtree.
///
/// A directory that cannot be listed is treated as having no children. The
/// root is looked up last, and the lookup result, `NotFound` included, is
/// always handed to `visit`. The first error returned by `visit` stops the
/// walk.
pub fn postfix_walk<F, E>(root: &Path, mut visit: F) -> Result<(), E>
where
    F: FnMut(&Path, io::Result<Metadata>) -> Result<(), E>,
{
    walk_recursive(root, &mut visit)
}

fn walk_recursive<F, E>(dir: &Path, visit: &mut F) -> Result<(), E>
where
    F: FnMut(&Path, io::Result<Metadata>) -> Result<(), E>,
{
    if let Ok(listing) = fs::read_dir(dir) {
        let mut entries: Vec<fs::DirEntry> = listing.filter_map(|e| e.ok()).collect();
        entries.sort_by_key(|e| e.file_name());
        for entry in entries {
            let path = entry.path();
            match entry.file_type() {
                Ok(kind) if kind.is_dir() => walk_recursive(&path, visit)?,
                _ => visit(&path, entry.metadata())?,
            }
        }
    }
    visit(dir, fs::metadata(dir))
}

/// Recursively remove empty directories under (and including) `root`.
///
/// Best-effort cleanup: a directory that is gone, was removed by someone else
/// mid-walk, or still has contents is left alone without error. Any other
/// failure aborts the pass.
pub fn remove_empty_directories(root: &Path) -> Result<(), PathError> {
    postfix_walk(root, |path, metadata| {
        let metadata = match metadata {
            Ok(m) => m,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(PathError::wrap(e, "stat", path)),
        };
        if !metadata.is_dir() {
            return Ok(());
        }
        match fs::remove_dir(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) if is_not_empty(&e) => Ok(()),
            Err(e) => Err(PathError::wrap(e, "remove", path)),
        }
    })
}

/// Whether `err` is the OS reporting that a directory is not empty.
///
/// Meant for errors from directory removal: POSIX lets `rmdir` report a
/// non-empty directory as either `ENOTEMPTY` or `EEXIST`.
pub fn is_not_empty(err: &io::Error) -> bool {
    match err.kind() {
        io::ErrorKind::DirectoryNotEmpty => true,
        io::ErrorKind::AlreadyExists => cfg!(unix),
        _ => false,
    }
}

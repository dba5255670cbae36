use std::ffi::OsString;
use std::fs::File;
use std::io::{self, Read, Seek};
use std::path::{Path, PathBuf};

/// Resolves the physical pieces of a cabinet by name.
///
/// A cabinet called `data` is stored as the sibling files `data1.cab`,
/// `data2.cab`, ... plus an optional `data1.hdr` sidecar carrying the file
/// table.  Implementations decide where those siblings live; the crate
/// ships [`DirectorySource`] for plain files on disk, and a host that keeps
/// its cabinets inside another archive can provide its own implementation.
///
/// Every call hands out a freshly opened stream, so multiple streams over
/// the same volume may be alive at once.
pub trait VolumeSource {
    /// The type of stream this source produces.
    type Stream: Read + Seek;

    /// Opens volume `index`, i.e. the sibling file `<base><index>.cab`.
    /// Returns `Ok(None)` when that sibling does not exist, which ends
    /// volume enumeration.
    fn open_volume(&self, index: u32) -> io::Result<Option<Self::Stream>>;

    /// Opens the header sidecar `<base>1.hdr`, if present.
    fn open_header(&self) -> io::Result<Option<Self::Stream>>;
}

/// A [`VolumeSource`] that opens volumes as files on the host filesystem.
pub struct DirectorySource {
    base: PathBuf,
}

impl DirectorySource {
    /// Creates a source from the path of any file in the cabinet family,
    /// e.g. `game/data1.cab` or `game/data1.hdr`.  The trailing volume
    /// digit and extension are stripped to form the base name.
    pub fn new<P: AsRef<Path>>(path: P) -> DirectorySource {
        DirectorySource { base: strip_archive_suffix(path.as_ref()) }
    }

    fn sibling(&self, suffix: &str) -> PathBuf {
        let mut name = self
            .base
            .file_name()
            .map(|name| name.to_os_string())
            .unwrap_or_else(OsString::new);
        name.push(suffix);
        self.base.with_file_name(name)
    }
}

impl VolumeSource for DirectorySource {
    type Stream = File;

    fn open_volume(&self, index: u32) -> io::Result<Option<File>> {
        open_optional(&self.sibling(&format!("{}.cab", index)))
    }

    fn open_header(&self) -> io::Result<Option<File>> {
        open_optional(&self.sibling("1.hdr"))
    }
}

fn open_optional(path: &Path) -> io::Result<Option<File>> {
    match File::open(path) {
        Ok(file) => Ok(Some(file)),
        Err(ref error) if error.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(error) => Err(error),
    }
}

// The volume number is part of the stored name, so `data1.cab` has base
// name `data`; five characters come off, not four.
fn strip_archive_suffix(path: &Path) -> PathBuf {
    let name = match path.file_name().and_then(|name| name.to_str()) {
        Some(name) => name,
        None => return path.to_path_buf(),
    };
    if name.len() >= 5 && (name.ends_with(".cab") || name.ends_with(".hdr")) {
        path.with_file_name(&name[..name.len() - 5])
    } else {
        path.to_path_buf()
    }
}

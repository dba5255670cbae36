//! A library for reading [InstallShield
//! cabinet](https://en.wikipedia.org/wiki/InstallShield) (.cab/.hdr)
//! archives, versions 5 through 13.
//!
//! An InstallShield cabinet is spread over numbered volume files
//! (`data1.cab`, `data2.cab`, ...), optionally with a `data1.hdr` sidecar
//! carrying the file table.  This crate maps those pieces to a flat,
//! case-insensitive catalog of logical paths and streams the packed files
//! back out, reassembling payloads that span volumes and inflating the
//! format's framed deflate encoding along the way.  Obfuscated entries are
//! listed but not extracted, and nothing here writes cabinets.
//!
//! ```no_run
//! use std::io::Read;
//!
//! let source = iscab::DirectorySource::new("game/data1.cab");
//! let cabinet = iscab::Cabinet::new(source)?;
//! for entry in cabinet.file_entries() {
//!     println!("{} ({} bytes)", entry.name(), entry.uncompressed_size());
//! }
//! let mut data = Vec::new();
//! cabinet.read_file("setup.ini")?.read_to_end(&mut data)?;
//! # Ok::<(), std::io::Error>(())
//! ```

#![warn(missing_docs)]

#[macro_use]
mod macros;

mod cabinet;
mod consts;
mod file;
mod inflate;
mod source;
mod string;
mod volume;

pub use crate::cabinet::Cabinet;
pub use crate::file::{FileEntries, FileEntry, FileReader};
pub use crate::source::{DirectorySource, VolumeSource};

use std::collections::hash_map;
use std::io::{self, Cursor, Read, Seek, SeekFrom};

use byteorder::{LittleEndian, ReadBytesExt};

use crate::consts;

/// An iterator over the file entries in a cabinet, in no particular order.
pub struct FileEntries<'a> {
    pub(crate) iter: hash_map::Values<'a, String, FileEntry>,
}

/// Metadata about one logical file packed in a cabinet.
#[derive(Debug, Clone)]
pub struct FileEntry {
    pub(crate) name: String,
    pub(crate) uncompressed_size: u32,
    pub(crate) compressed_size: u32,
    pub(crate) offset: u32,
    pub(crate) flags: u16,
    pub(crate) volume: u16,
}

impl<'a> Iterator for FileEntries<'a> {
    type Item = &'a FileEntry;

    fn next(&mut self) -> Option<&'a FileEntry> {
        self.iter.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.iter.size_hint()
    }
}

impl<'a> ExactSizeIterator for FileEntries<'a> {}

impl FileEntry {
    /// Returns the logical path of the file, with `\` separating the
    /// components, in the case the cabinet stores.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the total size of the file when decoded, in bytes.
    pub fn uncompressed_size(&self) -> u32 {
        self.uncompressed_size
    }

    /// Returns the size of the file's stored payload, in bytes.
    pub fn compressed_size(&self) -> u32 {
        self.compressed_size
    }

    /// Returns the 1-based index of the volume the file's payload starts
    /// in.
    pub fn volume(&self) -> u16 {
        self.volume
    }

    /// Returns true if the file's payload continues into later volumes.
    pub fn is_split(&self) -> bool {
        (self.flags & consts::FLAG_SPLIT) != 0
    }

    /// Returns true if the file's bytes are scrambled.  Obfuscated files
    /// are listed but cannot be extracted.
    pub fn is_obfuscated(&self) -> bool {
        (self.flags & consts::FLAG_OBFUSCATED) != 0
    }

    /// Returns true if the file's payload is deflate-compressed.
    pub fn is_compressed(&self) -> bool {
        (self.flags & consts::FLAG_COMPRESSED) != 0
    }
}

/// A file record as it sits in the file table, before the name string is
/// resolved.
pub(crate) struct RawFileEntry {
    pub(crate) flags: u16,
    pub(crate) uncompressed_size: u32,
    pub(crate) compressed_size: u32,
    pub(crate) offset: u32,
    pub(crate) name_offset: u32,
    pub(crate) volume: u16,
}

impl RawFileEntry {
    pub(crate) fn into_entry(self, name: String) -> FileEntry {
        FileEntry {
            name,
            uncompressed_size: self.uncompressed_size,
            compressed_size: self.compressed_size,
            offset: self.offset,
            flags: self.flags,
            volume: self.volume,
        }
    }
}

pub(crate) fn parse_file_record_v6<R: Read + Seek>(
    reader: &mut R,
) -> io::Result<RawFileEntry> {
    let flags = reader.read_u16::<LittleEndian>()?;
    let uncompressed_size = reader.read_u32::<LittleEndian>()?;
    reader.seek(SeekFrom::Current(4))?;
    let compressed_size = reader.read_u32::<LittleEndian>()?;
    reader.seek(SeekFrom::Current(4))?;
    let offset = reader.read_u32::<LittleEndian>()?;
    reader.seek(SeekFrom::Current(36))?;
    let name_offset = reader.read_u32::<LittleEndian>()?;
    let _directory_index = reader.read_u16::<LittleEndian>()?;
    reader.seek(SeekFrom::Current(12))?;
    let _link_prev = reader.read_u32::<LittleEndian>()?;
    let _link_next = reader.read_u32::<LittleEndian>()?;
    let _link_flags = reader.read_u8()?;
    let volume = reader.read_u16::<LittleEndian>()?;
    Ok(RawFileEntry {
        flags,
        uncompressed_size,
        compressed_size,
        offset,
        name_offset,
        volume,
    })
}

// Version 5 records carry no volume number; the owning volume is resolved
// from the per-volume file index ranges afterwards.
pub(crate) fn parse_file_record_v5<R: Read + Seek>(
    reader: &mut R,
) -> io::Result<RawFileEntry> {
    let name_offset = reader.read_u32::<LittleEndian>()?;
    let _directory_index = reader.read_u32::<LittleEndian>()?;
    let flags = reader.read_u16::<LittleEndian>()?;
    let uncompressed_size = reader.read_u32::<LittleEndian>()?;
    let compressed_size = reader.read_u32::<LittleEndian>()?;
    reader.seek(SeekFrom::Current(20))?;
    let offset = reader.read_u32::<LittleEndian>()?;
    Ok(RawFileEntry {
        flags,
        uncompressed_size,
        compressed_size,
        offset,
        name_offset,
        volume: 0,
    })
}

/// A seekable stream over the decoded bytes of one cabinet file.
///
/// Streams either own a buffer of decoded bytes (files that were split,
/// compressed, or otherwise materialized) or a window into a freshly opened
/// volume stream, which they carry with them.  Either way the stream's
/// length is the file's decoded size and it stays usable after the
/// [`Cabinet`](crate::Cabinet) that produced it is dropped.
#[derive(Debug)]
pub struct FileReader<R> {
    inner: FileReaderInner<R>,
}

#[derive(Debug)]
enum FileReaderInner<R> {
    Memory(Cursor<Vec<u8>>),
    Window { stream: R, start: u64, size: u64, pos: u64 },
}

impl<R> FileReader<R> {
    pub(crate) fn from_buffer(buffer: Vec<u8>) -> FileReader<R> {
        FileReader { inner: FileReaderInner::Memory(Cursor::new(buffer)) }
    }

    pub(crate) fn from_window(
        stream: R,
        start: u64,
        size: u64,
    ) -> FileReader<R> {
        FileReader {
            inner: FileReaderInner::Window { stream, start, size, pos: 0 },
        }
    }

    /// Returns the total number of decoded bytes in the stream.
    pub fn len(&self) -> u64 {
        match &self.inner {
            FileReaderInner::Memory(cursor) => cursor.get_ref().len() as u64,
            FileReaderInner::Window { size, .. } => *size,
        }
    }

    /// Returns true if the stream contains no bytes.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn position(&self) -> u64 {
        match &self.inner {
            FileReaderInner::Memory(cursor) => cursor.position(),
            FileReaderInner::Window { pos, .. } => *pos,
        }
    }
}

impl<R: Read + Seek> Read for FileReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match &mut self.inner {
            FileReaderInner::Memory(cursor) => cursor.read(buf),
            FileReaderInner::Window { stream, start, size, pos } => {
                let bytes_remaining = *size - *pos;
                let max_bytes = bytes_remaining.min(buf.len() as u64) as usize;
                if max_bytes == 0 {
                    return Ok(0);
                }
                // The volume stream may be shared state in disguise, so
                // position it explicitly on every read.
                stream.seek(SeekFrom::Start(*start + *pos))?;
                let bytes_read = stream.read(&mut buf[..max_bytes])?;
                *pos += bytes_read as u64;
                Ok(bytes_read)
            }
        }
    }
}

impl<R: Read + Seek> Seek for FileReader<R> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let new_offset = match pos {
            SeekFrom::Start(offset) => offset as i64,
            SeekFrom::Current(delta) => self.position() as i64 + delta,
            SeekFrom::End(delta) => self.len() as i64 + delta,
        };
        if new_offset < 0 || (new_offset as u64) > self.len() {
            invalid_input!(
                "Cannot seek to {}, file length is {}",
                new_offset,
                self.len()
            );
        }
        let new_offset = new_offset as u64;
        match &mut self.inner {
            FileReaderInner::Memory(cursor) => cursor.set_position(new_offset),
            FileReaderInner::Window { pos, .. } => *pos = new_offset,
        }
        Ok(new_offset)
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Cursor, Read, Seek, SeekFrom};

    use super::FileReader;

    #[test]
    fn window_reads_are_bounded() {
        let volume = Cursor::new(b"....hello, world....".to_vec());
        let mut reader: FileReader<_> = FileReader::from_window(volume, 4, 12);
        assert_eq!(reader.len(), 12);
        let mut data = Vec::new();
        reader.read_to_end(&mut data).unwrap();
        assert_eq!(data, b"hello, world");
    }

    #[test]
    fn window_seeks_are_clamped_to_the_file() {
        let volume = Cursor::new(b"....hello, world....".to_vec());
        let mut reader: FileReader<_> = FileReader::from_window(volume, 4, 12);
        reader.seek(SeekFrom::End(-5)).unwrap();
        let mut data = Vec::new();
        reader.read_to_end(&mut data).unwrap();
        assert_eq!(data, b"world");
        assert!(reader.seek(SeekFrom::Start(13)).is_err());
        assert!(reader.seek(SeekFrom::Current(-100)).is_err());
    }

    #[test]
    fn buffer_streams_seek_like_windows() {
        let mut reader: FileReader<Cursor<Vec<u8>>> =
            FileReader::from_buffer(b"hello, world".to_vec());
        assert_eq!(reader.len(), 12);
        reader.seek(SeekFrom::Start(7)).unwrap();
        let mut data = Vec::new();
        reader.read_to_end(&mut data).unwrap();
        assert_eq!(data, b"world");
        assert!(reader.seek(SeekFrom::Start(13)).is_err());
    }
}

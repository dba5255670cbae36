use std::collections::HashMap;
use std::io::{self, Read, Seek, SeekFrom};

use byteorder::{LittleEndian, ReadBytesExt};
use tracing::{debug, warn};

use crate::consts;
use crate::file::{
    parse_file_record_v5, parse_file_record_v6, FileEntries, FileEntry,
    FileReader,
};
use crate::inflate::inflate_payload;
use crate::source::VolumeSource;
use crate::string::read_null_terminated_string;
use crate::volume::{parse_volume_header, VolumeHeader};

/// A structure for reading an InstallShield cabinet.
///
/// A cabinet is a family of `<base><n>.cab` volume files plus an optional
/// `<base>1.hdr` sidecar; the [`VolumeSource`] decides where those live.
/// Opening the cabinet reads every volume header and the file table, after
/// which the catalog is immutable.  Each [`read_file`](Cabinet::read_file)
/// call opens its own volume streams, so readers handed out earlier stay
/// valid and calls do not disturb each other.
#[derive(Debug)]
pub struct Cabinet<S: VolumeSource> {
    source: S,
    version: u32,
    volume_headers: Vec<VolumeHeader>,
    files: HashMap<String, FileEntry>,
}

impl<S: VolumeSource> Cabinet<S> {
    /// Opens the cabinet reachable through `source`.
    ///
    /// Volumes are enumerated from 1 until a sibling is missing; the file
    /// table is then read from the `1.hdr` sidecar if present, or from
    /// volume 1 otherwise.  Any decode failure aborts the open and nothing
    /// of the cabinet is kept.
    pub fn new(source: S) -> io::Result<Cabinet<S>> {
        let mut volume_headers = Vec::new();
        let mut index = 1;
        while let Some(mut stream) = source.open_volume(index)? {
            let header = parse_volume_header(&mut stream)?;
            debug!(
                "volume {} has version {}, descriptor at {:#x}",
                index, header.version, header.cab_descriptor_offset
            );
            volume_headers.push(header);
            index += 1;
        }

        let mut carrier = match source.open_header()? {
            Some(stream) => stream,
            None => match source.open_volume(1)? {
                Some(stream) => stream,
                None => invalid_data!("Cabinet has no volumes and no header"),
            },
        };

        // The carrier's own header names the cabinet's version and locates
        // the cabinet descriptor, even when the carrier is volume 1.
        let carrier_header = parse_volume_header(&mut carrier)?;
        let version = carrier_header.version;
        let files =
            read_catalog(&mut carrier, &carrier_header, &volume_headers)?;
        Ok(Cabinet { source, version, volume_headers, files })
    }

    /// Returns the cabinet's format version, in the range 5 through 13.
    pub fn version(&self) -> u32 {
        self.version
    }

    /// Returns true if the cabinet contains a file with the given path.
    /// Paths use `\` as the component separator and match
    /// case-insensitively.
    pub fn has_file(&self, path: &str) -> bool {
        self.files.contains_key(&path.to_ascii_lowercase())
    }

    /// Returns an iterator over the file entries in the cabinet, in no
    /// particular order.
    pub fn file_entries(&self) -> FileEntries {
        FileEntries { iter: self.files.values() }
    }

    /// Returns the entry for the file with the given path, if any.
    pub fn get_file_entry(&self, path: &str) -> Option<&FileEntry> {
        self.files.get(&path.to_ascii_lowercase())
    }

    /// Returns a seekable reader over the decoded bytes of the file with
    /// the given path.
    ///
    /// Fails with [`io::ErrorKind::NotFound`] when the path is not in the
    /// catalog, when the file is obfuscated, or when a volume it needs
    /// cannot be opened; decode failures surface as
    /// [`io::ErrorKind::InvalidData`].  Failures never affect the cabinet
    /// itself.
    pub fn read_file(&self, path: &str) -> io::Result<FileReader<S::Stream>> {
        let entry = match self.get_file_entry(path) {
            Some(entry) => entry,
            None => not_found!("No such file in cabinet: {:?}", path),
        };

        if entry.is_obfuscated() {
            warn!("cannot extract obfuscated file {:?}", path);
            not_found!("File {:?} is obfuscated", path);
        }

        // Zero-length files decode to nothing; skip the volume entirely.
        if entry.uncompressed_size == 0 {
            return Ok(FileReader::from_buffer(Vec::new()));
        }

        let mut volume_stream =
            match self.open_required_volume(u32::from(entry.volume)) {
                Ok(stream) => stream,
                Err(error) => {
                    warn!(
                        "failed to open volume for file {:?}: {}",
                        path, error
                    );
                    return Err(error);
                }
            };

        let mut src: Option<Vec<u8>> = None;
        if entry.is_split() {
            src = Some(self.read_split_payload(
                path,
                entry,
                &mut volume_stream,
            )?);
        }

        if !entry.is_compressed() {
            return Ok(match src {
                Some(mut data) => {
                    data.resize(entry.uncompressed_size as usize, 0);
                    FileReader::from_buffer(data)
                }
                None => FileReader::from_window(
                    volume_stream,
                    u64::from(entry.offset),
                    u64::from(entry.uncompressed_size),
                ),
            });
        }

        // Entries with a zero compressed size are legal and carry no
        // deflate stream; their decoded bytes are all zero.
        if entry.compressed_size == 0 {
            let data = vec![0u8; entry.uncompressed_size as usize];
            return Ok(FileReader::from_buffer(data));
        }

        let src = match src {
            Some(data) => data,
            None => {
                let mut data = vec![0u8; entry.compressed_size as usize];
                volume_stream.seek(SeekFrom::Start(u64::from(entry.offset)))?;
                volume_stream.read_exact(&mut data)?;
                data
            }
        };

        match inflate_payload(&src, entry.uncompressed_size as usize) {
            Ok(mut data) => {
                if data.len() != entry.uncompressed_size as usize {
                    warn!(
                        "file {:?} inflated to {} bytes, expected {}",
                        path,
                        data.len(),
                        entry.uncompressed_size
                    );
                    data.resize(entry.uncompressed_size as usize, 0);
                }
                Ok(FileReader::from_buffer(data))
            }
            Err(error) => {
                warn!("failed to inflate file {:?}: {}", path, error);
                Err(error)
            }
        }
    }

    // Gathers the compressed bytes of a file whose payload spans volumes:
    // the tail segment of the starting volume, then the head segment of
    // each successor until the whole payload is in hand.
    fn read_split_payload(
        &self,
        path: &str,
        entry: &FileEntry,
        first: &mut S::Stream,
    ) -> io::Result<Vec<u8>> {
        let total = entry.compressed_size as usize;
        let mut data = vec![0u8; total];
        let mut volume = u32::from(entry.volume);
        let header = self.split_volume_header(volume)?;
        first.seek(SeekFrom::Start(u64::from(entry.offset)))?;
        let tail_len = (header.last_file_size_compressed as usize).min(total);
        first.read_exact(&mut data[..tail_len])?;
        let mut read = tail_len;
        while read < total {
            volume += 1;
            let mut stream = match self.open_required_volume(volume) {
                Ok(stream) => stream,
                Err(error) => {
                    warn!(
                        "failed to read split file {:?}: volume {} missing",
                        path, volume
                    );
                    return Err(error);
                }
            };
            let header = self.split_volume_header(volume)?;
            let segment_len = header.first_file_size_compressed as usize;
            if segment_len == 0 {
                invalid_data!(
                    "Split file {:?} has an empty continuation in volume {}",
                    path,
                    volume
                );
            }
            if segment_len > total - read {
                warn!(
                    "split segment in volume {} is longer than the {} bytes \
                     still owed to {:?}",
                    volume,
                    total - read,
                    path
                );
            }
            let segment_len = segment_len.min(total - read);
            stream
                .seek(SeekFrom::Start(u64::from(header.first_file_offset)))?;
            stream.read_exact(&mut data[read..read + segment_len])?;
            read += segment_len;
        }
        Ok(data)
    }

    fn open_required_volume(&self, volume: u32) -> io::Result<S::Stream> {
        match self.source.open_volume(volume)? {
            Some(stream) => Ok(stream),
            None => not_found!("Volume {} does not exist", volume),
        }
    }

    fn split_volume_header(&self, volume: u32) -> io::Result<&VolumeHeader> {
        match self.volume_headers.get((volume as usize).wrapping_sub(1)) {
            Some(header) => Ok(header),
            None => invalid_data!("No header was read for volume {}", volume),
        }
    }
}

fn read_catalog<R: Read + Seek>(
    reader: &mut R,
    carrier: &VolumeHeader,
    volume_headers: &[VolumeHeader],
) -> io::Result<HashMap<String, FileEntry>> {
    let descriptor = u64::from(carrier.cab_descriptor_offset);
    reader.seek(SeekFrom::Start(descriptor + 12))?;
    let file_table_offset = reader.read_u32::<LittleEndian>()?;
    reader.seek(SeekFrom::Current(4))?;
    let file_table_size = reader.read_u32::<LittleEndian>()?;
    let file_table_size2 = reader.read_u32::<LittleEndian>()?;
    let directory_count = reader.read_u32::<LittleEndian>()?;
    reader.seek(SeekFrom::Current(8))?;
    let file_count = reader.read_u32::<LittleEndian>()?;
    if file_table_size != file_table_size2 {
        warn!(
            "file table sizes do not match ({} vs {})",
            file_table_size, file_table_size2
        );
    }
    let file_table = descriptor + u64::from(file_table_offset);

    // File groups and components sit between the counts and the file
    // table; nothing here needs them.

    let mut files = HashMap::new();
    if carrier.version >= 6 {
        let file_table_offset2 = reader.read_u32::<LittleEndian>()?;
        for j in 0..u64::from(file_count) {
            reader.seek(SeekFrom::Start(
                file_table
                    + u64::from(file_table_offset2)
                    + j * consts::FILE_RECORD_SIZE,
            ))?;
            let raw = parse_file_record_v6(reader)?;
            if raw.name_offset == 0
                || raw.offset == 0
                || (raw.flags & consts::FLAG_INVALID) != 0
            {
                continue;
            }
            reader
                .seek(SeekFrom::Start(file_table + u64::from(raw.name_offset)))?;
            let name = read_null_terminated_string(reader)?;
            insert_entry(&mut files, raw.into_entry(name));
        }
    } else {
        reader.seek(SeekFrom::Start(file_table))?;
        let table_count =
            u64::from(directory_count) + u64::from(file_count);
        let mut offsets = Vec::with_capacity(table_count as usize);
        for _ in 0..table_count {
            offsets.push(reader.read_u32::<LittleEndian>()?);
        }

        // Records are indexed past the directory entries; the file index
        // counts only the records that make it into the catalog.
        let mut file_index: u32 = 0;
        for j in u64::from(directory_count)..table_count {
            reader.seek(SeekFrom::Start(
                file_table + u64::from(offsets[j as usize]),
            ))?;
            let mut raw = parse_file_record_v5(reader)?;
            if raw.name_offset == 0
                || raw.offset == 0
                || (raw.flags & consts::FLAG_INVALID) != 0
            {
                continue;
            }

            for (i, header) in volume_headers.iter().enumerate() {
                if file_index >= header.first_file_index
                    && file_index <= header.last_file_index
                {
                    raw.volume = (i + 1) as u16;
                    // A file that is the last in its volume but whose
                    // payload is bigger than the volume's trailing segment
                    // continues into the next volume.
                    if file_index == header.last_file_index
                        && raw.compressed_size
                            != header.last_file_size_compressed
                        && header.last_file_size_compressed != 0
                    {
                        raw.flags |= consts::FLAG_SPLIT;
                    }
                    break;
                }
            }

            reader
                .seek(SeekFrom::Start(file_table + u64::from(raw.name_offset)))?;
            let name = read_null_terminated_string(reader)?;
            if raw.volume == 0 {
                invalid_data!("Couldn't find the volume for file {:?}", name);
            }

            file_index += 1;
            insert_entry(&mut files, raw.into_entry(name));
        }
    }
    Ok(files)
}

// Entries can appear in multiple volumes, sometimes erroneously; the one
// with the lowest volume number wins.
fn insert_entry(files: &mut HashMap<String, FileEntry>, entry: FileEntry) {
    let key = entry.name.to_ascii_lowercase();
    match files.get(&key) {
        Some(existing) if existing.volume <= entry.volume => {}
        _ => {
            files.insert(key, entry);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::io::{self, Cursor};

    use byteorder::{LittleEndian, WriteBytesExt};

    use super::Cabinet;
    use crate::source::VolumeSource;

    #[derive(Debug)]
    struct MemorySource {
        header: Option<Vec<u8>>,
        volumes: HashMap<u32, Vec<u8>>,
    }

    impl VolumeSource for MemorySource {
        type Stream = Cursor<Vec<u8>>;

        fn open_volume(
            &self,
            index: u32,
        ) -> io::Result<Option<Cursor<Vec<u8>>>> {
            Ok(self.volumes.get(&index).cloned().map(Cursor::new))
        }

        fn open_header(&self) -> io::Result<Option<Cursor<Vec<u8>>>> {
            Ok(self.header.clone().map(Cursor::new))
        }
    }

    #[test]
    fn empty_source_fails_to_open() {
        let source =
            MemorySource { header: None, volumes: HashMap::new() };
        assert!(Cabinet::new(source).is_err());
    }

    #[test]
    fn bad_signature_fails_to_open() {
        let mut volumes = HashMap::new();
        volumes.insert(1, b"MSCF\0\0\0\0\0\0\0\0".to_vec());
        let source = MemorySource { header: None, volumes };
        let error = Cabinet::new(source).unwrap_err();
        assert_eq!(error.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn unsupported_version_fails_to_open() {
        let mut bytes = Vec::new();
        bytes.write_u32::<LittleEndian>(0x28635349).unwrap();
        bytes.write_u32::<LittleEndian>(1400).unwrap();
        bytes.extend_from_slice(&[0; 72]);
        let mut volumes = HashMap::new();
        volumes.insert(1, bytes);
        let source = MemorySource { header: None, volumes };
        let error = Cabinet::new(source).unwrap_err();
        assert_eq!(error.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn bad_volume_aborts_enumeration() {
        // Volume 1 is fine but volume 2 is garbage, so the open fails
        // before any catalog is read.
        let mut good = Vec::new();
        good.write_u32::<LittleEndian>(0x28635349).unwrap();
        good.write_u32::<LittleEndian>(500).unwrap();
        good.extend_from_slice(&[0; 72]);
        let mut volumes = HashMap::new();
        volumes.insert(1, good);
        volumes.insert(2, b"not a cabinet volume".to_vec());
        let source = MemorySource { header: None, volumes };
        assert!(Cabinet::new(source).is_err());
    }
}

use std::io::{self, Read, Seek, SeekFrom};

use byteorder::{LittleEndian, ReadBytesExt};

use crate::consts;

/// The decoded fixed-size prefix of one `.cab` or `.hdr` file.
///
/// The `first_file_*` fields describe the continuation segment at the start
/// of a volume when the previous volume ended mid-file; the
/// `last_file_size_compressed` field describes the trailing partial segment
/// at the volume's end.  Fields of the on-disk layout that nothing consumes
/// are skipped over rather than stored.
#[derive(Debug, Clone)]
pub(crate) struct VolumeHeader {
    pub(crate) version: u32,
    pub(crate) cab_descriptor_offset: u32,
    pub(crate) first_file_index: u32,
    pub(crate) last_file_index: u32,
    pub(crate) first_file_offset: u32,
    pub(crate) first_file_size_compressed: u32,
    pub(crate) last_file_size_compressed: u32,
}

/// Reads a volume header from the start of `reader`.
pub(crate) fn parse_volume_header<R: Read + Seek>(
    reader: &mut R,
) -> io::Result<VolumeHeader> {
    reader.seek(SeekFrom::Start(0))?;
    let signature = reader.read_u32::<LittleEndian>()?;
    if signature != consts::VOLUME_SIGNATURE {
        invalid_data!(
            "Not an InstallShield cabinet (expected signature {:08x}, \
             got {:08x})",
            consts::VOLUME_SIGNATURE,
            signature
        );
    }

    // Two version encodings are in use: newer cabinets put the version in
    // bits 12..16 and mark it with a shift byte of 1, older ones store it
    // as a decimal in the low half.  A decoded zero means 5.
    let magic = reader.read_u32::<LittleEndian>()?;
    let shift = magic >> 24;
    let mut version = if shift == 1 {
        (magic >> 12) & 0xf
    } else {
        (magic & 0xffff) / 100
    };
    if version == 0 {
        version = consts::VERSION_MIN;
    }
    if !(consts::VERSION_MIN..=consts::VERSION_MAX).contains(&version) {
        invalid_data!(
            "Unsupported cabinet version {} (magic bytes {:08x})",
            version,
            magic
        );
    }

    let _volume_info = reader.read_u32::<LittleEndian>()?;
    let cab_descriptor_offset = reader.read_u32::<LittleEndian>()?;
    let _cab_descriptor_size = reader.read_u32::<LittleEndian>()?;

    let _data_offset = reader.read_u32::<LittleEndian>()?;
    reader.seek(SeekFrom::Current(4))?;
    let first_file_index = reader.read_u32::<LittleEndian>()?;
    let last_file_index = reader.read_u32::<LittleEndian>()?;

    // From version 6 on, the remaining extents are stored as 64-bit values;
    // the high halves are skipped to keep the positions aligned.
    let (
        first_file_offset,
        first_file_size_compressed,
        last_file_size_compressed,
    ) = if version == 5 {
        let first_file_offset = reader.read_u32::<LittleEndian>()?;
        let _first_file_size_uncompressed = reader.read_u32::<LittleEndian>()?;
        let first_file_size_compressed = reader.read_u32::<LittleEndian>()?;
        let _last_file_offset = reader.read_u32::<LittleEndian>()?;
        let _last_file_size_uncompressed = reader.read_u32::<LittleEndian>()?;
        let last_file_size_compressed = reader.read_u32::<LittleEndian>()?;
        (
            first_file_offset,
            first_file_size_compressed,
            last_file_size_compressed,
        )
    } else {
        let first_file_offset = reader.read_u32::<LittleEndian>()?;
        reader.seek(SeekFrom::Current(4))?;
        let _first_file_size_uncompressed = reader.read_u32::<LittleEndian>()?;
        reader.seek(SeekFrom::Current(4))?;
        let first_file_size_compressed = reader.read_u32::<LittleEndian>()?;
        reader.seek(SeekFrom::Current(4))?;
        let _last_file_offset = reader.read_u32::<LittleEndian>()?;
        reader.seek(SeekFrom::Current(4))?;
        let _last_file_size_uncompressed = reader.read_u32::<LittleEndian>()?;
        reader.seek(SeekFrom::Current(4))?;
        let last_file_size_compressed = reader.read_u32::<LittleEndian>()?;
        reader.seek(SeekFrom::Current(4))?;
        (
            first_file_offset,
            first_file_size_compressed,
            last_file_size_compressed,
        )
    };

    Ok(VolumeHeader {
        version,
        cab_descriptor_offset,
        first_file_index,
        last_file_index,
        first_file_offset,
        first_file_size_compressed,
        last_file_size_compressed,
    })
}

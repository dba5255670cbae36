use std::io;

use byteorder::{BigEndian, ByteOrder, LittleEndian};
use flate2::{Decompress, FlushDecompress};

use crate::consts;

/// Decodes a file payload into at most `dst_len` bytes.
///
/// Payloads come in two shapes.  A payload whose last four bytes are the
/// sync marker `00 00 FF FF` is one headerless deflate stream.  Anything
/// else is a sequence of `(u16 length, chunk)` records, each chunk an
/// independent headerless deflate stream, decoded back to back until the
/// output is full or the input runs out.
pub(crate) fn inflate_payload(
    src: &[u8],
    dst_len: usize,
) -> io::Result<Vec<u8>> {
    let mut dst = Vec::with_capacity(dst_len);
    if src.len() >= 4
        && BigEndian::read_u32(&src[src.len() - 4..])
            == consts::SINGLE_STREAM_SENTINEL
    {
        inflate_chunk(src, &mut dst)?;
        return Ok(dst);
    }
    let mut pos = 0;
    while dst.len() < dst_len && pos < src.len() {
        if src.len() - pos < 2 {
            invalid_data!("Truncated chunk length in framed deflate payload");
        }
        let chunk_size = LittleEndian::read_u16(&src[pos..]) as usize;
        pos += 2;
        if src.len() - pos < chunk_size {
            invalid_data!(
                "Framed deflate chunk of {} bytes overruns payload \
                 ({} bytes left)",
                chunk_size,
                src.len() - pos
            );
        }
        inflate_chunk(&src[pos..pos + chunk_size], &mut dst)?;
        pos += chunk_size;
    }
    Ok(dst)
}

// Inflates one headerless deflate stream into the spare capacity of `dst`.
fn inflate_chunk(src: &[u8], dst: &mut Vec<u8>) -> io::Result<()> {
    let mut decompressor = Decompress::new(false);
    match decompressor.decompress_vec(src, dst, FlushDecompress::Finish) {
        Ok(_) => Ok(()),
        Err(error) => invalid_data!("Inflate failed: {}", error),
    }
}

#[cfg(test)]
mod tests {
    use byteorder::{LittleEndian, WriteBytesExt};
    use flate2::{Compress, Compression, FlushCompress, Status};

    use super::inflate_payload;

    fn deflate(data: &[u8], flush: FlushCompress) -> Vec<u8> {
        let finish = matches!(flush, FlushCompress::Finish);
        let mut compressor = Compress::new(Compression::default(), false);
        let mut out = Vec::with_capacity(data.len() * 2 + 1024);
        let status = compressor.compress_vec(data, &mut out, flush).unwrap();
        assert_eq!(compressor.total_in() as usize, data.len());
        if finish {
            assert!(matches!(status, Status::StreamEnd));
        }
        out
    }

    #[test]
    fn single_stream_payload_ends_with_sync_marker() {
        let original = lipsum::lipsum(200).into_bytes();
        let payload = deflate(&original, FlushCompress::Sync);
        assert_eq!(&payload[payload.len() - 4..], &[0, 0, 0xff, 0xff]);
        let inflated = inflate_payload(&payload, original.len()).unwrap();
        assert_eq!(inflated, original);
    }

    #[test]
    fn framed_payload_decodes_chunk_by_chunk() {
        let original = lipsum::lipsum(600).into_bytes();
        let mut payload = Vec::new();
        for chunk in original.chunks(1000) {
            let compressed = deflate(chunk, FlushCompress::Finish);
            payload
                .write_u16::<LittleEndian>(compressed.len() as u16)
                .unwrap();
            payload.extend_from_slice(&compressed);
        }
        let inflated = inflate_payload(&payload, original.len()).unwrap();
        assert_eq!(inflated, original);
    }

    #[test]
    fn output_is_capped_at_the_destination_size() {
        let original = lipsum::lipsum(200).into_bytes();
        let compressed = deflate(&original, FlushCompress::Finish);
        let mut payload = Vec::new();
        payload
            .write_u16::<LittleEndian>(compressed.len() as u16)
            .unwrap();
        payload.extend_from_slice(&compressed);
        let inflated = inflate_payload(&payload, 100).unwrap();
        assert_eq!(inflated, &original[..100]);
    }

    #[test]
    fn truncated_chunk_is_an_error() {
        // A one-byte payload where a chunk length is due.
        assert!(inflate_payload(&[0x42], 16).is_err());
        // A chunk length pointing past the end of the payload.
        let mut payload = Vec::new();
        payload.write_u16::<LittleEndian>(100).unwrap();
        payload.extend_from_slice(&[0x42; 10]);
        assert!(inflate_payload(&payload, 16).is_err());
    }

    #[test]
    fn garbage_chunk_is_an_error() {
        let mut payload = Vec::new();
        payload.write_u16::<LittleEndian>(4).unwrap();
        payload.extend_from_slice(&[0xfe, 0xed, 0xfa, 0xce]);
        assert!(inflate_payload(&payload, 16).is_err());
    }
}

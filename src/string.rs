use std::io::{self, Read};

use byteorder::ReadBytesExt;

use crate::consts;

pub(crate) fn read_null_terminated_string<R: Read>(
    reader: &mut R,
) -> io::Result<String> {
    let mut bytes = Vec::<u8>::new();
    loop {
        let byte = reader.read_u8()?;
        if byte == 0 {
            break;
        } else if bytes.len() == consts::MAX_STRING_SIZE {
            invalid_data!(
                "String longer than maximum of {} bytes",
                consts::MAX_STRING_SIZE
            );
        }
        bytes.push(byte);
    }
    Ok(String::from_utf8_lossy(&bytes).to_string())
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::read_null_terminated_string;

    #[test]
    fn reads_until_nul() {
        let mut cursor = Cursor::new(b"dir\\file.txt\0trailing".to_vec());
        let string = read_null_terminated_string(&mut cursor).unwrap();
        assert_eq!(string, "dir\\file.txt");
        assert_eq!(cursor.position(), 13);
    }

    #[test]
    fn missing_terminator_is_an_error() {
        let mut cursor = Cursor::new(b"no terminator".to_vec());
        assert!(read_null_terminated_string(&mut cursor).is_err());
    }
}

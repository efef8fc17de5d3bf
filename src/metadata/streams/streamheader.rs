use crate::{file::io::read_le, Error::OutOfBounds, Result};

/// Longest stream name accepted, excluding the terminator.
pub const MAX_STREAM_NAME: usize = 32;

/// One entry of the metadata root's stream directory (ECMA-335 II.24.2.2).
///
/// Offsets are relative to the metadata root. Unknown stream names are accepted; they are
/// carried through a rewrite unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamHeader {
    /// Offset of the stream, relative to the metadata root
    pub offset: u32,
    /// Size of the stream in bytes
    pub size: u32,
    /// Name of the stream, e.g. `#~` or `#Strings`
    pub name: String,
}

impl StreamHeader {
    /// Parses a stream header from the start of `data`.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] for truncated input, or a malformed error for an
    /// unterminated or overlong name.
    pub fn from(data: &[u8]) -> Result<StreamHeader> {
        if data.len() < 9 {
            return Err(OutOfBounds);
        }

        let name_bytes = &data[8..data.len().min(8 + MAX_STREAM_NAME + 1)];
        let Some(name_len) = name_bytes.iter().position(|&c| c == 0) else {
            return Err(malformed_error!("Unterminated stream header name"));
        };
        if name_len == 0 {
            return Err(malformed_error!("Empty stream header name"));
        }

        let name = String::from_utf8_lossy(&name_bytes[..name_len]).into_owned();

        Ok(StreamHeader {
            offset: read_le::<u32>(data)?,
            size: read_le::<u32>(&data[4..])?,
            name,
        })
    }

    /// Size of this header as stored, with the name padded to a 4-byte boundary.
    #[must_use]
    pub fn encoded_size(&self) -> usize {
        8 + ((self.name.len() + 1 + 3) & !3)
    }

    /// Appends the encoded header to `out`.
    pub fn write(&self, out: &mut Vec<u8>) {
        let start = out.len();
        out.extend_from_slice(&self.offset.to_le_bytes());
        out.extend_from_slice(&self.size.to_le_bytes());
        out.extend_from_slice(self.name.as_bytes());
        out.resize(start + self.encoded_size(), 0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crafted() {
        #[rustfmt::skip]
        let header_bytes = [
            0x6C, 0x00, 0x00, 0x00,
            0xA4, 0x45, 0x00, 0x00,
            0x23, 0x7E, 0x00,
        ];

        let parsed_header = StreamHeader::from(&header_bytes).unwrap();

        assert_eq!(parsed_header.offset, 0x6C);
        assert_eq!(parsed_header.size, 0x45A4);
        assert_eq!(parsed_header.name, "#~");
        assert_eq!(parsed_header.encoded_size(), 12);

        let mut out = Vec::new();
        parsed_header.write(&mut out);
        assert_eq!(&out[..11], &header_bytes);
        assert_eq!(out.len(), 12);
    }

    #[test]
    fn crafted_invalid() {
        assert!(StreamHeader::from(&[0x6C, 0x00, 0x00, 0x00, 0xA4]).is_err());

        let mut unterminated = vec![0u8; 8];
        unterminated.extend_from_slice(&[b'#'; 40]);
        assert!(StreamHeader::from(&unterminated).is_err());
    }
}

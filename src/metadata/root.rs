//! Metadata root (ECMA-335 II.24.2.1): signature, runtime version string and the stream
//! directory.

use crate::{
    file::io::{read_le, read_le_at},
    metadata::streams::StreamHeader,
    Error::OutOfBounds,
    Result,
};

/// Signature of the metadata root, `BSJB`.
pub const CIL_HEADER_MAGIC: u32 = 0x424A_5342;

/// Upper bound on the number of streams accepted in the directory.
const MAX_STREAMS: u16 = 16;

/// The metadata root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Root {
    /// Magic signature, 0x424A5342
    pub signature: u32,
    /// Major version, 1
    pub major_version: u16,
    /// Minor version, 1
    pub minor_version: u16,
    /// Reserved, always 0
    pub reserved: u32,
    /// Length of the version string including its padding
    pub length: u32,
    /// Runtime version string, without padding
    pub version: String,
    /// Reserved, always 0
    pub flags: u16,
    /// Stream directory in stored order
    pub stream_headers: Vec<StreamHeader>,
}

impl Root {
    /// Parses the metadata root at the start of `data`; `data` must span the whole metadata
    /// so stream bounds can be checked.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] or a malformed error for an invalid root or a
    /// stream outside of the metadata.
    pub fn read(data: &[u8]) -> Result<Root> {
        if data.len() < 36 {
            return Err(OutOfBounds);
        }

        let signature = read_le::<u32>(data)?;
        if signature != CIL_HEADER_MAGIC {
            return Err(malformed_error!(
                "CIL_HEADER_MAGIC does not match - {}",
                signature
            ));
        }

        let length = read_le_at::<u32>(data, &mut 12)?;
        let version_end = match (length as usize).checked_add(16) {
            Some(end) if end + 4 <= data.len() => end,
            _ => return Err(OutOfBounds),
        };

        let version_bytes = &data[16..version_end];
        let version_len = version_bytes
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(version_bytes.len());
        let version = String::from_utf8_lossy(&version_bytes[..version_len]).into_owned();

        let flags = read_le::<u16>(&data[version_end..])?;
        let stream_count = read_le::<u16>(&data[version_end + 2..])?;
        if stream_count == 0 || stream_count > MAX_STREAMS {
            return Err(malformed_error!("Invalid stream count - {}", stream_count));
        }

        let mut streams: Vec<StreamHeader> = Vec::with_capacity(stream_count as usize);
        let mut stream_offset = version_end + 4;
        for _ in 0..stream_count {
            if stream_offset > data.len() {
                return Err(OutOfBounds);
            }

            let new_stream = StreamHeader::from(&data[stream_offset..])?;
            match new_stream.offset.checked_add(new_stream.size) {
                Some(end) if end as usize <= data.len() => {}
                Some(_) => return Err(OutOfBounds),
                None => {
                    return Err(malformed_error!(
                        "Stream offset and size cause integer overflow - {} + {}",
                        new_stream.offset,
                        new_stream.size
                    ))
                }
            }

            if streams.iter().any(|stream| stream.name == new_stream.name) {
                return Err(malformed_error!("Duplicate stream - {}", new_stream.name));
            }

            stream_offset += new_stream.encoded_size();
            streams.push(new_stream);
        }

        Ok(Root {
            signature,
            major_version: read_le::<u16>(&data[4..])?,
            minor_version: read_le::<u16>(&data[6..])?,
            reserved: read_le::<u32>(&data[8..])?,
            length,
            version,
            flags,
            stream_headers: streams,
        })
    }

    /// Returns the directory entry for `name`.
    #[must_use]
    pub fn stream(&self, name: &str) -> Option<&StreamHeader> {
        self.stream_headers.iter().find(|stream| stream.name == name)
    }

    /// Size of the encoded root including the stream directory.
    #[must_use]
    pub fn encoded_size(&self) -> usize {
        20 + self.length as usize
            + self
                .stream_headers
                .iter()
                .map(StreamHeader::encoded_size)
                .sum::<usize>()
    }

    /// Encodes the root and its stream directory.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.encoded_size());
        out.extend_from_slice(&self.signature.to_le_bytes());
        out.extend_from_slice(&self.major_version.to_le_bytes());
        out.extend_from_slice(&self.minor_version.to_le_bytes());
        out.extend_from_slice(&self.reserved.to_le_bytes());
        out.extend_from_slice(&self.length.to_le_bytes());

        let version_start = out.len();
        out.extend_from_slice(self.version.as_bytes());
        out.resize(version_start + self.length as usize, 0);

        out.extend_from_slice(&self.flags.to_le_bytes());
        #[allow(clippy::cast_possible_truncation)]
        out.extend_from_slice(&(self.stream_headers.len() as u16).to_le_bytes());
        for stream in &self.stream_headers {
            stream.write(&mut out);
        }

        out
    }
}

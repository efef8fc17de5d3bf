//! CLR 2.0 runtime header (ECMA-335 II.25.3.3).
//!
//! The header is located through the CLR runtime header data directory and points at the
//! metadata root. The rewriter relocates metadata by patching [`META_DATA_DIRECTORY_OFFSET`].

use crate::{file::parser::Parser, Error::OutOfBounds, Result};

/// Size of the CLR header in bytes.
pub const COR20_HEADER_SIZE: usize = 72;

/// Offset of the metadata directory (RVA, size) inside the CLR header.
pub const META_DATA_DIRECTORY_OFFSET: usize = 8;

/// The CLR 2.0 header.
///
/// Only the fields this crate consumes are kept. `read` applies the structural checks a
/// runtime loader applies before it looks at the metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cor20Header {
    /// Size of the header; always 72
    pub cb: u32,
    /// Major runtime version required to run the program
    pub major_runtime_version: u16,
    /// Minor runtime version
    pub minor_runtime_version: u16,
    /// RVA of the metadata root
    pub meta_data_rva: u32,
    /// Size of the metadata
    pub meta_data_size: u32,
    /// Runtime flags (`COMIMAGE_FLAGS_*`)
    pub flags: u32,
    /// Token of the entry point method, or 0
    pub entry_point_token: u32,
    /// RVA of the strong name signature, or 0
    pub strong_name_signature_rva: u32,
    /// Size of the strong name signature, or 0
    pub strong_name_signature_size: u32,
}

impl Cor20Header {
    /// Reads the header from `data`.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if `data` is shorter than the header, or a
    /// malformed error if one of the fields is invalid.
    pub fn read(data: &[u8]) -> Result<Cor20Header> {
        if data.len() < COR20_HEADER_SIZE {
            return Err(OutOfBounds);
        }

        let mut parser = Parser::new(data);

        let cb = parser.read_le::<u32>()?;
        if cb as usize != COR20_HEADER_SIZE {
            return Err(malformed_error!(
                "Invalid CLR header size: expected 72, got {}",
                cb
            ));
        }

        let major_runtime_version = parser.read_le::<u16>()?;
        let minor_runtime_version = parser.read_le::<u16>()?;
        if major_runtime_version == 0 || major_runtime_version > 10 {
            return Err(malformed_error!(
                "Invalid major runtime version: {}",
                major_runtime_version
            ));
        }

        let meta_data_rva = parser.read_le::<u32>()?;
        if meta_data_rva == 0 {
            return Err(malformed_error!("Metadata RVA cannot be zero"));
        }

        let meta_data_size = parser.read_le::<u32>()?;
        if meta_data_size == 0 {
            return Err(malformed_error!("Metadata size cannot be zero"));
        } else if meta_data_size > 0x1000_0000 {
            return Err(malformed_error!(
                "Metadata size {} exceeds reasonable limit (256MB)",
                meta_data_size
            ));
        }

        let flags = parser.read_le::<u32>()?;
        let entry_point_token = parser.read_le::<u32>()?;

        // Resources
        parser.advance_by(8)?;

        let strong_name_signature_rva = parser.read_le::<u32>()?;
        let strong_name_signature_size = parser.read_le::<u32>()?;
        if (strong_name_signature_rva == 0) != (strong_name_signature_size == 0) {
            return Err(malformed_error!("Strong name values are invalid"));
        }

        Ok(Cor20Header {
            cb,
            major_runtime_version,
            minor_runtime_version,
            meta_data_rva,
            meta_data_size,
            flags,
            entry_point_token,
            strong_name_signature_rva,
            strong_name_signature_size,
        })
    }
}

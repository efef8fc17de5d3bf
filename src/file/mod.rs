//! PE container access for .NET assemblies.
//!
//! [`File`] owns the image bytes (memory-mapped from disk, or an in-memory buffer) together
//! with the `goblin` PE structure parsed from them, and offers the address translation and
//! header access the metadata layer and the rewriter need.
//!
//! # Key Components
//!
//! - [`crate::file::File`] - Owned, parsed PE image with a CLR runtime header
//! - [`crate::file::Backend`] - Trait over the data source
//! - [`crate::file::parser::Parser`] - Cursor-based reader used by the metadata layer
//! - [`crate::file::io`] - Little-endian read and write helpers
//!
//! # Examples
//!
//! ```rust,no_run
//! use dotboot::File;
//! use std::path::Path;
//!
//! let file = File::from_file(Path::new("bootstrapped/Combat/Combat.dll"))?;
//! let (clr_rva, clr_size) = file.clr()?;
//! let clr_offset = file.rva_to_offset(clr_rva)?;
//! println!("CLR header at 0x{:x} ({} bytes)", clr_offset, clr_size);
//! # Ok::<(), dotboot::Error>(())
//! ```

pub mod io;
pub mod parser;

mod memory;
mod physical;

use std::path::Path;

use crate::{
    Error::{Empty, GoblinErr},
    Result,
};
use goblin::pe::{optional_header::OptionalHeader, section_table::SectionTable, PE};
use memory::Memory;
use ouroboros::self_referencing;
use physical::Physical;

/// Offset of the `e_lfanew` field in the DOS header.
pub const DOS_LFANEW_OFFSET: usize = 0x3C;
/// Size of the COFF file header following the PE signature.
pub const COFF_HEADER_SIZE: usize = 20;
/// Size of one section table entry.
pub const SECTION_HEADER_SIZE: usize = 40;

/// Backend trait for file data sources.
///
/// All implementations must be thread-safe, since a [`File`] may be shared across threads
/// while the boot pipeline probes and rewrites it.
pub trait Backend: Send + Sync {
    /// Returns a bounds-checked slice of the data.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the range is outside the data.
    fn data_slice(&self, offset: usize, len: usize) -> Result<&[u8]>;

    /// Returns the entire data buffer.
    fn data(&self) -> &[u8];

    /// Returns the total length of the data buffer.
    fn len(&self) -> usize;
}

#[self_referencing]
/// A loaded PE image that carries a CLR runtime header.
///
/// Loading fails for empty input, for anything `goblin` cannot parse as PE, and for PE
/// images without an optional header or CLR runtime header directory. The directory
/// contents are not validated here; that happens when the metadata is read.
pub struct File {
    /// The underlying data source (memory or file).
    data: Box<dyn Backend>,
    /// The parsed PE structure, referencing the data.
    #[borrows(data)]
    #[not_covariant]
    pe: PE<'this>,
}

impl File {
    /// Loads and memory-maps a PE image from disk.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, is not a PE image, or has no CLR header.
    pub fn from_file(file: &Path) -> Result<File> {
        let input = Physical::new(file)?;

        Self::load(input)
    }

    /// Loads a PE image from an owned buffer.
    ///
    /// # Errors
    /// Returns an error if the buffer is empty, not a PE image, or has no CLR header.
    pub fn from_mem(data: Vec<u8>) -> Result<File> {
        let input = Memory::new(data);

        Self::load(input)
    }

    fn load<T: Backend + 'static>(data: T) -> Result<File> {
        if data.len() == 0 {
            return Err(Empty);
        }

        let data = Box::new(data);

        File::try_new(data, |data| {
            let data = data.as_ref();
            match PE::parse(data.data()) {
                Ok(pe) => match pe.header.optional_header {
                    Some(optional_header) => {
                        if optional_header
                            .data_directories
                            .get_clr_runtime_header()
                            .is_none()
                        {
                            Err(malformed_error!(
                                "File does not have a CLR runtime header directory"
                            ))
                        } else {
                            Ok(pe)
                        }
                    }
                    None => Err(malformed_error!("File does not have an OptionalHeader")),
                },
                Err(error) => Err(GoblinErr(error)),
            }
        })
    }

    /// Returns the total size of the image in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.with_data(|data| data.len())
    }

    /// Returns `true` if the image has no bytes; never the case for a loaded `File`.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the raw image bytes.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        self.with_data(|data| data.data())
    }

    /// Returns a bounds-checked slice of the image bytes.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the range is outside the image.
    pub fn data_slice(&self, offset: usize, len: usize) -> Result<&[u8]> {
        self.with_data(|data| data.data_slice(offset, len))
    }

    /// Returns the optional header, verified to exist at load time.
    ///
    /// # Errors
    /// Returns a malformed error if the header is absent.
    pub fn header_optional(&self) -> Result<&OptionalHeader> {
        self.with_pe(|pe| {
            pe.header
                .optional_header
                .as_ref()
                .ok_or_else(|| malformed_error!("File does not have an OptionalHeader"))
        })
    }

    /// Returns the RVA and size of the CLR runtime header.
    ///
    /// # Errors
    /// Returns a malformed error if the directory is missing.
    pub fn clr(&self) -> Result<(usize, usize)> {
        let optional_header = self.header_optional()?;
        match optional_header.data_directories.get_clr_runtime_header() {
            Some(clr_dir) => Ok((clr_dir.virtual_address as usize, clr_dir.size as usize)),
            None => Err(malformed_error!(
                "File does not have a CLR runtime header directory"
            )),
        }
    }

    /// Returns the section table entries.
    pub fn sections(&self) -> impl Iterator<Item = &SectionTable> {
        self.with_pe(|pe| pe.sections.iter())
    }

    /// Returns `true` for PE32+ images.
    #[must_use]
    pub fn is_pe32_plus(&self) -> bool {
        self.with_pe(|pe| pe.is_64)
    }

    /// Returns the file offset of the PE signature (`e_lfanew`).
    #[must_use]
    pub fn pe_signature_offset(&self) -> usize {
        self.with_pe(|pe| pe.header.dos_header.pe_pointer as usize)
    }

    /// Returns the file alignment from the optional header.
    ///
    /// # Errors
    /// Returns a malformed error if the optional header is absent.
    pub fn file_alignment(&self) -> Result<u32> {
        Ok(self.header_optional()?.windows_fields.file_alignment)
    }

    /// Returns the section alignment from the optional header.
    ///
    /// # Errors
    /// Returns a malformed error if the optional header is absent.
    pub fn section_alignment(&self) -> Result<u32> {
        Ok(self.header_optional()?.windows_fields.section_alignment)
    }

    /// Converts a relative virtual address into a file offset.
    ///
    /// # Errors
    /// Returns a malformed error if no section maps `rva`.
    pub fn rva_to_offset(&self, rva: usize) -> Result<usize> {
        for section in self.sections() {
            let start = section.virtual_address as usize;
            let span = section.virtual_size.max(section.size_of_raw_data) as usize;
            if rva >= start && rva < start + span {
                let delta = rva - start;
                if delta >= section.size_of_raw_data as usize {
                    return Err(malformed_error!(
                        "RVA 0x{:x} lies in the uninitialized tail of a section",
                        rva
                    ));
                }
                return Ok(delta + section.pointer_to_raw_data as usize);
            }
        }

        Err(malformed_error!(
            "RVA could not be converted to offset - {}",
            rva
        ))
    }

    /// Converts a file offset into a relative virtual address.
    ///
    /// # Errors
    /// Returns a malformed error if no section contains `offset`.
    pub fn offset_to_rva(&self, offset: usize) -> Result<usize> {
        for section in self.sections() {
            let start = section.pointer_to_raw_data as usize;
            let end = start + section.size_of_raw_data as usize;
            if offset >= start && offset < end {
                return Ok(offset - start + section.virtual_address as usize);
            }
        }

        Err(malformed_error!(
            "Offset could not be converted to RVA - {}",
            offset
        ))
    }
}

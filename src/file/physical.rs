//! Memory-mapped file backend for [`crate::File`].
//!
//! Addon images are located on a mounted filesystem and are mapped read-only; the mapping
//! stays alive as long as the owning [`crate::File`].

use super::Backend;
use crate::{Error::FileError, Result};

use memmap2::Mmap;
use std::{fs, path::Path};

/// Read-only memory mapping of a file on disk.
#[derive(Debug)]
pub struct Physical {
    data: Mmap,
}

impl Physical {
    /// Opens and maps the file at `path`.
    ///
    /// # Errors
    /// Returns [`crate::Error::FileError`] if the file cannot be opened or mapped.
    pub fn new(path: impl AsRef<Path>) -> Result<Physical> {
        let file = fs::File::open(path).map_err(FileError)?;

        // The mapping is read-only and owned; concurrent truncation of the file by another
        // process is outside of what this crate can guard against.
        let mmap = unsafe { Mmap::map(&file) }.map_err(FileError)?;

        Ok(Physical { data: mmap })
    }
}

impl Backend for Physical {
    fn data_slice(&self, offset: usize, len: usize) -> Result<&[u8]> {
        let Some(offset_end) = offset.checked_add(len) else {
            return Err(out_of_bounds_error!());
        };

        if offset_end > self.data.len() {
            return Err(out_of_bounds_error!());
        }

        Ok(&self.data[offset..offset_end])
    }

    fn data(&self) -> &[u8] {
        self.data.as_ref()
    }

    fn len(&self) -> usize {
        self.data.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn physical() {
        let temp_path = std::env::temp_dir().join("dotboot_physical_test.bin");
        std::fs::write(&temp_path, [0x4D, 0x5A, 0x90, 0x00, 0x03]).unwrap();

        let physical = Physical::new(&temp_path).unwrap();
        assert_eq!(physical.len(), 5);
        assert_eq!(physical.data()[0], 0x4D);
        assert_eq!(physical.data_slice(2, 3).unwrap(), &[0x90, 0x00, 0x03]);
        assert!(physical.data_slice(4, 2).is_err());

        drop(physical);
        let _ = std::fs::remove_file(&temp_path);
    }

    #[test]
    fn test_physical_invalid_file_path() {
        let result = Physical::new("/nonexistent/path/to/file.dll");
        match result {
            Err(FileError(io_error)) => {
                assert_eq!(io_error.kind(), std::io::ErrorKind::NotFound);
            }
            _ => panic!("Expected FileError"),
        }
    }
}

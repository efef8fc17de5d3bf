//! In-memory backend for [`crate::File`], used for images that were already read or
//! produced in memory (rewritten images, host content handles).

use super::Backend;
use crate::{Error::OutOfBounds, Result};

/// Owned byte buffer backend.
#[derive(Debug)]
pub struct Memory {
    data: Vec<u8>,
}

impl Memory {
    /// Wraps `data` as a backend.
    pub fn new(data: Vec<u8>) -> Memory {
        Memory { data }
    }
}

impl Backend for Memory {
    fn data_slice(&self, offset: usize, len: usize) -> Result<&[u8]> {
        let Some(offset_end) = offset.checked_add(len) else {
            return Err(OutOfBounds);
        };

        if offset_end > self.data.len() {
            return Err(OutOfBounds);
        }

        Ok(&self.data[offset..offset_end])
    }

    fn data(&self) -> &[u8] {
        self.data.as_slice()
    }

    fn len(&self) -> usize {
        self.data.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory() {
        let mut data = vec![0xCC_u8; 1048];
        data[10..15].copy_from_slice(&[0xBB; 5]);

        let memory = Memory::new(data);

        assert_eq!(memory.len(), 1048);
        assert_eq!(memory.data()[42], 0xCC);
        assert_eq!(memory.data_slice(10, 5).unwrap(), &[0xBB; 5]);

        assert!(memory.data_slice(u32::MAX as usize, u32::MAX as usize).is_err());
        assert!(memory.data_slice(0, 2048).is_err());
    }

    #[test]
    fn test_memory_offset_overflow() {
        let memory = Memory::new(vec![0x00; 100]);

        assert!(matches!(memory.data_slice(usize::MAX, 1), Err(OutOfBounds)));
        assert!(matches!(memory.data_slice(100, 1), Err(OutOfBounds)));
        assert!(matches!(memory.data_slice(99, 2), Err(OutOfBounds)));
        assert!(memory.data_slice(100, 0).unwrap().is_empty());
    }
}

use crate::{file::parser::Parser, Error::OutOfBounds, Result};

/// View over the `#Blob` heap (ECMA-335 II.24.2.4).
///
/// Each entry is prefixed by its compressed length. Index 0 is the empty blob.
pub struct Blob<'a> {
    data: &'a [u8],
}

impl<'a> Blob<'a> {
    /// Wraps a `#Blob` heap.
    ///
    /// # Errors
    /// Returns a malformed error if the heap is empty or does not start with the empty blob.
    pub fn from(data: &'a [u8]) -> Result<Blob<'a>> {
        if data.is_empty() || data[0] != 0 {
            return Err(malformed_error!("Invalid memory for #Blob heap"));
        }

        Ok(Blob { data })
    }

    /// Returns the blob at `index`.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the entry does not fit into the heap.
    pub fn get(&self, index: usize) -> Result<&'a [u8]> {
        if index >= self.data.len() {
            return Err(OutOfBounds);
        }

        let mut parser = Parser::new(&self.data[index..]);
        let len = parser.read_compressed_uint()? as usize;
        let skip = parser.pos();

        let Some(data_start) = index.checked_add(skip) else {
            return Err(OutOfBounds);
        };

        let Some(data_end) = data_start.checked_add(len) else {
            return Err(OutOfBounds);
        };

        if data_end > self.data.len() {
            return Err(OutOfBounds);
        }

        Ok(&self.data[data_start..data_end])
    }

    /// Size of the heap in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` if the heap holds nothing but the leading empty blob.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.len() <= 1
    }

    /// The raw heap bytes.
    #[must_use]
    pub fn data(&self) -> &'a [u8] {
        self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crafted() {
        #[rustfmt::skip]
        let data = [
            0x00,
            0x08, 0xB7, 0x7A, 0x5C, 0x56, 0x19, 0x34, 0xE0, 0x89,
            0x03, 0x20, 0x00, 0x01,
        ];

        let blob = Blob::from(&data).unwrap();
        assert!(blob.get(0).unwrap().is_empty());
        assert_eq!(
            blob.get(1).unwrap(),
            &[0xB7, 0x7A, 0x5C, 0x56, 0x19, 0x34, 0xE0, 0x89]
        );
        assert_eq!(blob.get(10).unwrap(), &[0x20, 0x00, 0x01]);
        assert!(blob.get(14).is_err());
    }

    #[test]
    fn truncated() {
        let blob = Blob::from(&[0x00, 0x05, 0x01, 0x02]).unwrap();
        assert!(matches!(blob.get(1), Err(OutOfBounds)));
    }
}

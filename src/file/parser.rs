//! Cursor-based parsing over a borrowed byte slice.
//!
//! [`Parser`] wraps a slice with a position and offers bounds-checked reads of
//! little-endian integers, ECMA-335 compressed integers (II.23.2) and NUL-terminated strings.
//! It is used by the metadata root, stream and blob readers.
//!
//! # Examples
//!
//! ```rust
//! use dotboot::Parser;
//!
//! let data = [0x01, 0x00, 0x81, 0x02, b'A', 0x00];
//! let mut parser = Parser::new(&data);
//!
//! assert_eq!(parser.read_le::<u16>()?, 1);
//! assert_eq!(parser.read_compressed_uint()?, 0x102);
//! assert_eq!(parser.read_string_utf8()?, "A");
//! # Ok::<(), dotboot::Error>(())
//! ```

use crate::{
    file::io::{read_le_at, CilIO},
    Result,
};

/// A bounds-checked reader over a byte slice.
pub struct Parser<'a> {
    data: &'a [u8],
    position: usize,
}

impl<'a> Parser<'a> {
    /// Creates a parser positioned at the start of `data`.
    #[must_use]
    pub fn new(data: &'a [u8]) -> Self {
        Parser { data, position: 0 }
    }

    /// Length of the underlying data.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` if the underlying data is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns `true` while unread bytes remain.
    #[must_use]
    pub fn has_more_data(&self) -> bool {
        self.position < self.data.len()
    }

    /// Moves the cursor to `pos`.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if `pos` lies past the end of the data.
    pub fn seek(&mut self, pos: usize) -> Result<()> {
        if pos > self.data.len() {
            return Err(out_of_bounds_error!());
        }

        self.position = pos;
        Ok(())
    }

    /// Advances the cursor by `step` bytes.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the new position lies past the end of the data.
    pub fn advance_by(&mut self, step: usize) -> Result<()> {
        match self.position.checked_add(step) {
            Some(next) if next <= self.data.len() => {
                self.position = next;
                Ok(())
            }
            _ => Err(out_of_bounds_error!()),
        }
    }

    /// Current cursor position.
    #[must_use]
    pub fn pos(&self) -> usize {
        self.position
    }

    /// The complete underlying data.
    #[must_use]
    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    /// Reads a value without moving the cursor.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the value does not fit.
    pub fn peek_le<T: CilIO>(&self) -> Result<T> {
        let mut temp_position = self.position;
        read_le_at::<T>(self.data, &mut temp_position)
    }

    /// Aligns the cursor up to the next multiple of `alignment`.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the aligned position lies past the end of the data.
    pub fn align(&mut self, alignment: usize) -> Result<()> {
        let padding = (alignment - (self.position % alignment)) % alignment;
        self.advance_by(padding)
    }

    /// Reads a little-endian value and advances the cursor.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the value does not fit.
    pub fn read_le<T: CilIO>(&mut self) -> Result<T> {
        read_le_at::<T>(self.data, &mut self.position)
    }

    /// Reads `len` raw bytes and advances the cursor.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if fewer than `len` bytes remain.
    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        let start = self.position;
        self.advance_by(len)?;
        Ok(&self.data[start..self.position])
    }

    /// Reads an ECMA-335 compressed unsigned integer (II.23.2).
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] on truncated input, or a malformed error for an
    /// invalid lead byte.
    pub fn read_compressed_uint(&mut self) -> Result<u32> {
        let first_byte = self.read_le::<u8>()?;

        // 0xxxxxxx
        if (first_byte & 0x80) == 0 {
            return Ok(u32::from(first_byte));
        }

        // 10xxxxxx xxxxxxxx
        if (first_byte & 0xC0) == 0x80 {
            let second_byte = self.read_le::<u8>()?;
            return Ok(((u32::from(first_byte) & 0x3F) << 8) | u32::from(second_byte));
        }

        // 110xxxxx xxxxxxxx xxxxxxxx xxxxxxxx
        if (first_byte & 0xE0) == 0xC0 {
            let b1 = u32::from(self.read_le::<u8>()?);
            let b2 = u32::from(self.read_le::<u8>()?);
            let b3 = u32::from(self.read_le::<u8>()?);
            return Ok(((u32::from(first_byte) & 0x1F) << 24) | (b1 << 16) | (b2 << 8) | b3);
        }

        Err(malformed_error!("Invalid compressed uint - {}", first_byte))
    }

    /// Reads a NUL-terminated UTF-8 string; a missing terminator ends the string at the data end.
    ///
    /// # Errors
    /// Returns a malformed error if the bytes are not valid UTF-8.
    pub fn read_string_utf8(&mut self) -> Result<String> {
        let start = self.position;
        let end = self.data[start..]
            .iter()
            .position(|&b| b == 0)
            .map_or(self.data.len(), |len| start + len);

        let string_data = &self.data[start..end];
        self.position = (end + 1).min(self.data.len());

        String::from_utf8(string_data.to_vec()).map_err(|e| {
            malformed_error!(
                "Invalid UTF-8 string at offset {}-{}: {}",
                start,
                end,
                e.utf8_error()
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_compressed_uint() {
        let test_cases = vec![
            (vec![0x03], 3),
            (vec![0x7F], 0x7F),
            (vec![0x80, 0x80], 0x80),
            (vec![0xAE, 0x57], 0x2E57),
            (vec![0xBF, 0xFF], 0x3FFF),
            (vec![0xC0, 0x00, 0x40, 0x00], 0x4000),
            (vec![0xDF, 0xFF, 0xFF, 0xFF], 0x1FFF_FFFF),
        ];

        for (input, expected) in test_cases {
            let mut parser = Parser::new(&input);
            let result = parser.read_compressed_uint().unwrap();
            assert_eq!(result, expected, "Failed for input: {:?}", input);
            assert!(!parser.has_more_data());
        }
    }

    #[test]
    fn test_read_compressed_uint_invalid() {
        let mut parser = Parser::new(&[0xFF, 0x00]);
        assert!(parser.read_compressed_uint().is_err());

        let mut parser = Parser::new(&[0xC0, 0x00]);
        assert!(parser.read_compressed_uint().is_err());
    }

    #[test]
    fn test_strings() {
        let data = b"Combat\0Dynamic.UI\0tail";
        let mut parser = Parser::new(data);
        assert_eq!(parser.read_string_utf8().unwrap(), "Combat");
        assert_eq!(parser.read_string_utf8().unwrap(), "Dynamic.UI");
        assert_eq!(parser.read_string_utf8().unwrap(), "tail");
        assert!(!parser.has_more_data());
    }

    #[test]
    fn test_seek_align_bytes() {
        let data = [1u8, 2, 3, 4, 5, 6, 7, 8];
        let mut parser = Parser::new(&data);
        parser.advance_by(1).unwrap();
        parser.align(4).unwrap();
        assert_eq!(parser.pos(), 4);
        assert_eq!(parser.read_bytes(2).unwrap(), &[5, 6]);
        assert_eq!(parser.peek_le::<u16>().unwrap(), 0x0807);
        assert!(parser.read_bytes(3).is_err());
        assert!(parser.seek(9).is_err());
        parser.seek(8).unwrap();
        assert!(!parser.has_more_data());
    }
}

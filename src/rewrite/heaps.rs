//! Append-only builders for the `#Strings` and `#Blob` heaps.
//!
//! Existing heap content is never moved: every index stored in the tables stays valid.
//! New entries go after the original bytes and the heap is padded to a 4-byte boundary
//! when it is finished.

use std::collections::HashMap;

use crate::{metadata::streams::Strings, Result};

/// Rounds `value` up to a multiple of `alignment`.
#[must_use]
pub fn align_to(value: usize, alignment: usize) -> usize {
    value.div_ceil(alignment) * alignment
}

/// Encodes `value` as an ECMA-335 compressed unsigned integer (II.23.2).
///
/// # Errors
/// Returns a malformed error for values above `0x1FFF_FFFF`.
pub fn write_compressed_uint(value: u32, out: &mut Vec<u8>) -> Result<()> {
    match value {
        0..=0x7F => out.push(value as u8),
        0x80..=0x3FFF => {
            out.push(0x80 | (value >> 8) as u8);
            out.push(value as u8);
        }
        0x4000..=0x1FFF_FFFF => {
            out.push(0xC0 | (value >> 24) as u8);
            out.push((value >> 16) as u8);
            out.push((value >> 8) as u8);
            out.push(value as u8);
        }
        _ => {
            return Err(malformed_error!(
                "Value {} is too large for a compressed integer",
                value
            ))
        }
    }

    Ok(())
}

fn heap_index(offset: usize) -> Result<u32> {
    u32::try_from(offset).map_err(|_| malformed_error!("Heap offset {} overflows u32", offset))
}

/// Builder for a `#Strings` heap that reuses existing entries.
pub struct StringHeapBuilder<'a> {
    original: Strings<'a>,
    appended: Vec<u8>,
    added: HashMap<String, u32>,
}

impl<'a> StringHeapBuilder<'a> {
    /// Starts from an existing heap.
    #[must_use]
    pub fn new(original: Strings<'a>) -> Self {
        StringHeapBuilder {
            original,
            appended: Vec::new(),
            added: HashMap::new(),
        }
    }

    /// Returns the index of `value`, appending it if the heap does not hold it yet.
    ///
    /// # Errors
    /// Returns a malformed error if `value` contains a NUL byte or the heap outgrows 4 GiB.
    pub fn intern(&mut self, value: &str) -> Result<u32> {
        if value.contains('\0') {
            return Err(malformed_error!("String '{}' contains a NUL byte", value.escape_default()));
        }

        if let Some(index) = self.original.find(value) {
            return Ok(index);
        }
        if let Some(&index) = self.added.get(value) {
            return Ok(index);
        }

        let index = heap_index(self.original.len() + self.appended.len())?;
        self.appended.extend_from_slice(value.as_bytes());
        self.appended.push(0);
        self.added.insert(value.to_string(), index);

        Ok(index)
    }

    /// Number of bytes appended so far.
    #[must_use]
    pub fn appended(&self) -> usize {
        self.appended.len()
    }

    /// Size of the finished heap, padding included.
    #[must_use]
    pub fn len(&self) -> usize {
        align_to(self.original.len() + self.appended.len(), 4)
    }

    /// Returns `true` if the finished heap would be empty; never the case for a valid heap.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Produces the heap bytes.
    #[must_use]
    pub fn finish(self) -> Vec<u8> {
        let len = self.len();
        let mut heap = Vec::with_capacity(len);
        heap.extend_from_slice(self.original.data());
        heap.extend_from_slice(&self.appended);
        heap.resize(len, 0);
        heap
    }
}

/// Builder for a `#Blob` heap.
pub struct BlobHeapBuilder<'a> {
    original: &'a [u8],
    appended: Vec<u8>,
    added: HashMap<Vec<u8>, u32>,
}

impl<'a> BlobHeapBuilder<'a> {
    /// Starts from an existing heap; `original` must begin with the empty blob.
    #[must_use]
    pub fn new(original: &'a [u8]) -> Self {
        BlobHeapBuilder {
            original,
            appended: Vec::new(),
            added: HashMap::new(),
        }
    }

    /// Appends `blob` and returns its index. The empty blob is always index 0, and a blob
    /// appended twice by the same builder is stored once.
    ///
    /// # Errors
    /// Returns a malformed error if the blob or the heap is too large to be indexed.
    pub fn append(&mut self, blob: &[u8]) -> Result<u32> {
        if blob.is_empty() {
            return Ok(0);
        }
        if let Some(&index) = self.added.get(blob) {
            return Ok(index);
        }

        let index = heap_index(self.original.len() + self.appended.len())?;
        write_compressed_uint(heap_index(blob.len())?, &mut self.appended)?;
        self.appended.extend_from_slice(blob);
        self.added.insert(blob.to_vec(), index);

        Ok(index)
    }

    /// Number of bytes appended so far.
    #[must_use]
    pub fn appended(&self) -> usize {
        self.appended.len()
    }

    /// Size of the finished heap, padding included.
    #[must_use]
    pub fn len(&self) -> usize {
        align_to(self.original.len() + self.appended.len(), 4)
    }

    /// Returns `true` if the finished heap would be empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Produces the heap bytes.
    #[must_use]
    pub fn finish(self) -> Vec<u8> {
        let len = self.len();
        let mut heap = Vec::with_capacity(len);
        heap.extend_from_slice(self.original);
        heap.extend_from_slice(&self.appended);
        heap.resize(len, 0);
        heap
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{file::parser::Parser, metadata::streams::Blob};

    const HEAP: &[u8] = b"\0<Module>\0Dynamic.Combat\0Combat.dll\0neutral\0";

    #[test]
    fn compressed_uint_widths() {
        for (value, expected) in [
            (0x03_u32, vec![0x03]),
            (0x80, vec![0x80, 0x80]),
            (0x2E57, vec![0xAE, 0x57]),
            (0x4000, vec![0xC0, 0x00, 0x40, 0x00]),
            (0x1FFF_FFFF, vec![0xDF, 0xFF, 0xFF, 0xFF]),
        ] {
            let mut out = Vec::new();
            write_compressed_uint(value, &mut out).unwrap();
            assert_eq!(out, expected);
            assert_eq!(Parser::new(&out).read_compressed_uint().unwrap(), value);
        }

        assert!(write_compressed_uint(0x2000_0000, &mut Vec::new()).is_err());
    }

    #[test]
    fn strings_reuse_and_append() {
        let mut builder = StringHeapBuilder::new(Strings::from(HEAP).unwrap());

        // Exact entry and suffix of an entry are reused
        assert_eq!(builder.intern("Dynamic.Combat").unwrap(), 10);
        assert_eq!(builder.intern("Combat").unwrap(), 18);
        assert_eq!(builder.intern("").unwrap(), 0);
        assert_eq!(builder.appended(), 0);

        let ui = builder.intern("Dynamic.UI").unwrap();
        assert_eq!(ui as usize, HEAP.len());
        assert_eq!(builder.intern("Dynamic.UI").unwrap(), ui);
        assert_eq!(builder.appended(), 11);
        assert!(builder.intern("bad\0name").is_err());

        let heap = builder.finish();
        assert_eq!(heap.len() % 4, 0);
        let strings = Strings::from(&heap).unwrap();
        assert_eq!(strings.get(ui as usize).unwrap(), "Dynamic.UI");
        assert_eq!(strings.get(10).unwrap(), "Dynamic.Combat");
    }

    #[test]
    fn blobs_append() {
        let original = [0x00, 0x01, 0xAA, 0x00];
        let mut builder = BlobHeapBuilder::new(&original);

        assert_eq!(builder.append(&[]).unwrap(), 0);
        let token = builder.append(&[0xB7, 0x7A, 0x5C, 0x56, 0x19, 0x34, 0xE0, 0x89]).unwrap();
        assert_eq!(token, 4);
        assert_eq!(builder.append(&[0xB7, 0x7A, 0x5C, 0x56, 0x19, 0x34, 0xE0, 0x89]).unwrap(), 4);
        assert_eq!(builder.len(), 16);

        let heap = builder.finish();
        let blob = Blob::from(&heap).unwrap();
        assert_eq!(blob.get(1).unwrap(), &[0xAA]);
        assert_eq!(
            blob.get(token as usize).unwrap(),
            &[0xB7, 0x7A, 0x5C, 0x56, 0x19, 0x34, 0xE0, 0x89]
        );
    }
}

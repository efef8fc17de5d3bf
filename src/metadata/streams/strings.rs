use std::ffi::CStr;

use crate::{Error::OutOfBounds, Result};

/// View over the `#Strings` heap (ECMA-335 II.24.2.3).
///
/// Entries are NUL-terminated UTF-8; an index may point into the middle of another entry
/// (suffix sharing). Index 0 is always the empty string.
pub struct Strings<'a> {
    data: &'a [u8],
}

impl<'a> Strings<'a> {
    /// Wraps a `#Strings` heap.
    ///
    /// # Errors
    /// Returns a malformed error if the heap is empty or does not start with the empty string.
    pub fn from(data: &'a [u8]) -> Result<Strings<'a>> {
        if data.is_empty() || data[0] != 0 {
            return Err(malformed_error!("Provided #String heap is empty"));
        }

        Ok(Strings { data })
    }

    /// Returns the string at `index`.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] for an index past the heap, or a malformed error
    /// for an unterminated or non-UTF-8 entry.
    pub fn get(&self, index: usize) -> Result<&'a str> {
        if index >= self.data.len() {
            return Err(OutOfBounds);
        }

        match CStr::from_bytes_until_nul(&self.data[index..]) {
            Ok(result) => match result.to_str() {
                Ok(result) => Ok(result),
                Err(_) => Err(malformed_error!("Invalid string at index - {}", index)),
            },
            Err(_) => Err(malformed_error!("Invalid string at index - {}", index)),
        }
    }

    /// Finds an index at which exactly `value` is stored, including suffixes of longer entries.
    #[must_use]
    pub fn find(&self, value: &str) -> Option<u32> {
        if value.is_empty() {
            return Some(0);
        }

        let needle = value.as_bytes();
        let last = self.data.len().checked_sub(needle.len() + 1)?;
        (1..=last)
            .find(|&start| {
                self.data[start + needle.len()] == 0
                    && &self.data[start..start + needle.len()] == needle
            })
            .and_then(|start| u32::try_from(start).ok())
    }

    /// Size of the heap in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` if the heap holds nothing but the leading empty string.
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

    const HEAP: &[u8] = b"\0<Module>\0Dynamic.Combat\0Combat.dll\0neutral\0";

    #[test]
    fn crafted() {
        let str_view = Strings::from(HEAP).unwrap();

        assert_eq!(str_view.get(0).unwrap(), "");
        assert_eq!(str_view.get(1).unwrap(), "<Module>");
        assert_eq!(str_view.get(10).unwrap(), "Dynamic.Combat");
        assert_eq!(str_view.get(18).unwrap(), "Combat");
        assert!(str_view.get(HEAP.len()).is_err());
    }

    #[test]
    fn find() {
        let str_view = Strings::from(HEAP).unwrap();

        assert_eq!(str_view.find(""), Some(0));
        assert_eq!(str_view.find("Dynamic.Combat"), Some(10));
        // Suffix of "Dynamic.Combat"
        assert_eq!(str_view.find("Combat"), Some(18));
        assert_eq!(str_view.find("neutral"), Some(36));
        assert_eq!(str_view.find("Combat.d"), None);
        assert_eq!(str_view.find("UI"), None);
    }

    #[test]
    fn invalid() {
        assert!(Strings::from(&[]).is_err());
        assert!(Strings::from(b"A\0").is_err());

        let str_view = Strings::from(b"\0ABC").unwrap();
        assert!(str_view.get(1).is_err());
    }
}

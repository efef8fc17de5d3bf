//! Metadata tokens (ECMA-335 II.22): the table id in the high byte, the 1-based row id in
//! the low three bytes.

use std::fmt;

/// A metadata token.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Token(u32);

impl Token {
    /// Wraps a raw token value.
    #[must_use]
    pub fn new(value: u32) -> Self {
        Token(value)
    }

    /// The raw token value.
    #[must_use]
    pub fn value(&self) -> u32 {
        self.0
    }

    /// The table id (high byte).
    #[must_use]
    pub fn table(&self) -> u8 {
        (self.0 >> 24) as u8
    }

    /// The row id (low three bytes).
    #[must_use]
    pub fn row(&self) -> u32 {
        self.0 & 0x00FF_FFFF
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Token(0x{:08x})", self.0)
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08x}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parts() {
        let token = Token::new(0x2300_0002);
        assert_eq!(token.table(), 0x23);
        assert_eq!(token.row(), 2);
        assert_eq!(token.to_string(), "0x23000002");
    }
}

use crate::{file::io::read_le, metadata::tables::AssemblyHashAlgorithm, Error, Result};

use md5::{Digest, Md5};
use sha1::Sha1;

/// Strong name of an assembly: either its full public key or the 8-byte public key token.
///
/// Tokens are kept as a `u64` whose little-endian bytes are the token bytes in the order
/// they are stored in metadata and printed in display names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identity {
    /// Full public key blob
    PubKey(Vec<u8>),
    /// Public key token
    Token(u64),
}

impl Identity {
    /// Interprets a `PublicKey` / `PublicKeyOrToken` blob.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if a token blob is shorter than 8 bytes.
    pub fn from(data: &[u8], is_pub: bool) -> Result<Self> {
        Ok(if is_pub {
            Identity::PubKey(data.to_vec())
        } else {
            Identity::Token(read_le::<u64>(data)?)
        })
    }

    /// Returns the public key token, hashing the key with `algo` if necessary.
    ///
    /// The token is the last 8 bytes of the key's hash in reverse order (ECMA-335 II.6.2.1.3).
    ///
    /// # Errors
    /// Returns [`crate::Error::NotSupported`] for hash algorithms other than MD5 and SHA1.
    pub fn to_token(&self, algo: u32) -> Result<u64> {
        match &self {
            Identity::PubKey(data) => {
                let digest: Vec<u8> = match algo {
                    AssemblyHashAlgorithm::MD5 => Md5::digest(data).to_vec(),
                    AssemblyHashAlgorithm::SHA1 => Sha1::digest(data).to_vec(),
                    _ => return Err(Error::NotSupported),
                };

                let mut tail = [0u8; 8];
                tail.copy_from_slice(&digest[digest.len() - 8..]);
                Ok(u64::from_be_bytes(tail))
            }
            Identity::Token(token) => Ok(*token),
        }
    }

    /// The token bytes as stored in an `AssemblyRef` blob.
    ///
    /// # Errors
    /// Returns [`crate::Error::NotSupported`] if the key cannot be hashed.
    pub fn token_bytes(&self) -> Result<[u8; 8]> {
        Ok(self.to_token(AssemblyHashAlgorithm::SHA1)?.to_le_bytes())
    }
}

//! Assembly identities and versions.
//!
//! An [`AssemblyIdentity`] is what the host and the addon agree on when a reference is bound:
//! simple name, four-part version, culture and public key token. Two identities denote the
//! same module exactly when their full names (display names) are equal.

use std::{fmt, fmt::Write as _, hash::Hash, str::FromStr};

use crate::{
    metadata::{identity::cryptographic::Identity, tables::AssemblyHashAlgorithm},
    Error, Result,
};

/// Identity of an assembly.
///
/// # Examples
///
/// ```rust
/// use dotboot::AssemblyIdentity;
///
/// let live = AssemblyIdentity::parse(
///     "Dynamic.Combat, Version=2.0.0.0, Culture=neutral, PublicKeyToken=null",
/// )?;
/// assert_eq!(live.name, "Dynamic.Combat");
/// assert_eq!(live.version.to_string(), "2.0.0.0");
/// assert_eq!(
///     live.full_name(),
///     "Dynamic.Combat, Version=2.0.0.0, Culture=neutral, PublicKeyToken=null"
/// );
/// # Ok::<(), dotboot::Error>(())
/// ```
#[derive(Debug, Clone)]
pub struct AssemblyIdentity {
    /// Simple name
    pub name: String,
    /// Four-part version
    pub version: AssemblyVersion,
    /// Culture, `None` for neutral
    pub culture: Option<String>,
    /// Public key or token, `None` for unsigned assemblies
    pub strong_name: Option<Identity>,
}

/// Four-part assembly version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct AssemblyVersion {
    /// Major version
    pub major: u16,
    /// Minor version
    pub minor: u16,
    /// Build number
    pub build: u16,
    /// Revision number
    pub revision: u16,
}

impl AssemblyIdentity {
    /// Creates an identity.
    pub fn new(
        name: impl Into<String>,
        version: AssemblyVersion,
        culture: Option<String>,
        strong_name: Option<Identity>,
    ) -> Self {
        Self {
            name: name.into(),
            version,
            culture,
            strong_name,
        }
    }

    /// Parses a display name such as
    /// `Dynamic.Combat, Version=2.0.0.0, Culture=neutral, PublicKeyToken=null`.
    ///
    /// Missing components default to version `0.0.0.0`, neutral culture and no strong name.
    /// Unknown components (`ProcessorArchitecture`, `Retargetable`, ...) are ignored.
    ///
    /// # Errors
    /// Returns a malformed error for an empty name, a bad version, or a token that is not
    /// 16 hex digits.
    pub fn parse(display_name: &str) -> Result<Self> {
        let mut parts = display_name.split(',').map(str::trim);

        let name = parts.next().unwrap_or_default().to_string();
        if name.is_empty() {
            return Err(malformed_error!("Assembly name cannot be empty"));
        }

        let mut version = AssemblyVersion::default();
        let mut culture = None;
        let mut strong_name = None;

        for part in parts {
            let Some((key, value)) = part.split_once('=') else {
                return Err(malformed_error!(
                    "Invalid display name component '{}' in '{}'",
                    part,
                    display_name
                ));
            };

            match key.trim() {
                "Version" => version = AssemblyVersion::parse(value.trim())?,
                "Culture" => {
                    let value = value.trim();
                    if !value.eq_ignore_ascii_case("neutral") && !value.is_empty() {
                        culture = Some(value.to_string());
                    }
                }
                "PublicKeyToken" => {
                    let value = value.trim();
                    if !value.eq_ignore_ascii_case("null") && !value.is_empty() {
                        let token_bytes = hex::decode(value).map_err(|e| {
                            malformed_error!("Invalid hex in PublicKeyToken '{}': {}", value, e)
                        })?;

                        let Ok(token_array) = <[u8; 8]>::try_from(token_bytes.as_slice()) else {
                            return Err(malformed_error!(
                                "PublicKeyToken must be exactly 8 bytes, got {} from '{}'",
                                token_bytes.len(),
                                value
                            ));
                        };

                        strong_name = Some(Identity::Token(u64::from_le_bytes(token_array)));
                    }
                }
                _ => {}
            }
        }

        Ok(Self {
            name,
            version,
            culture,
            strong_name,
        })
    }

    /// The public key token, derived from the key if only the key is known.
    ///
    /// Returns `None` for assemblies without a strong name, or with a key that cannot be hashed.
    #[must_use]
    pub fn public_key_token(&self) -> Option<[u8; 8]> {
        self.strong_name
            .as_ref()
            .and_then(|identity| identity.token_bytes().ok())
    }

    /// The full name: `Name, Version=a.b.c.d, Culture=xx|neutral, PublicKeyToken=hex|null`.
    #[must_use]
    pub fn full_name(&self) -> String {
        let mut result = String::with_capacity(self.name.len() + 80);

        result.push_str(&self.name);
        let _ = write!(result, ", Version={}", self.version);
        let _ = write!(
            result,
            ", Culture={}",
            self.culture.as_deref().unwrap_or("neutral")
        );

        result.push_str(", PublicKeyToken=");
        match self.public_key_token() {
            Some(token) => result.push_str(&hex::encode(token)),
            None => result.push_str("null"),
        }

        result
    }

    /// Returns `true` if both identities denote the same module (equal full names).
    #[must_use]
    pub fn is_same_module(&self, other: &AssemblyIdentity) -> bool {
        self.full_name() == other.full_name()
    }

    /// Returns `true` if the simple names match, ignoring ASCII case.
    #[must_use]
    pub fn is_name_compatible(&self, other: &AssemblyIdentity) -> bool {
        self.name.eq_ignore_ascii_case(&other.name)
    }

    /// Returns `true` if a strong name is present.
    #[must_use]
    pub fn is_strong_named(&self) -> bool {
        self.strong_name.is_some()
    }

    /// Returns a copy with the full public key reduced to its token.
    #[must_use]
    pub fn with_token(&self) -> AssemblyIdentity {
        let strong_name = self
            .strong_name
            .as_ref()
            .and_then(|identity| identity.to_token(AssemblyHashAlgorithm::SHA1).ok())
            .map(Identity::Token);

        AssemblyIdentity {
            strong_name,
            ..self.clone()
        }
    }
}

impl PartialEq for AssemblyIdentity {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.version == other.version
            && self.culture == other.culture
            && self.public_key_token() == other.public_key_token()
    }
}

impl Eq for AssemblyIdentity {}

impl Hash for AssemblyIdentity {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.name.hash(state);
        self.version.hash(state);
        self.culture.hash(state);
    }
}

impl fmt::Display for AssemblyIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.full_name())
    }
}

impl FromStr for AssemblyIdentity {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl AssemblyVersion {
    /// Creates a version.
    #[must_use]
    pub const fn new(major: u16, minor: u16, build: u16, revision: u16) -> Self {
        Self {
            major,
            minor,
            build,
            revision,
        }
    }

    /// Parses `major[.minor[.build[.revision]]]`; missing parts are zero.
    ///
    /// # Errors
    /// Returns a malformed error for more than four parts or a part that is not a `u16`.
    pub fn parse(version_str: &str) -> Result<Self> {
        let parts: Vec<&str> = version_str.split('.').collect();
        if parts.len() > 4 {
            return Err(malformed_error!(
                "Version '{}' has more than four parts",
                version_str
            ));
        }

        let mut numbers = [0u16; 4];
        for (slot, part) in numbers.iter_mut().zip(&parts) {
            *slot = part.parse::<u16>().map_err(|e| {
                malformed_error!("Invalid version part '{}' in '{}': {}", part, version_str, e)
            })?;
        }

        Ok(Self::new(numbers[0], numbers[1], numbers[2], numbers[3]))
    }
}

impl fmt::Display for AssemblyVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}.{}",
            self.major, self.minor, self.build, self.revision
        )
    }
}

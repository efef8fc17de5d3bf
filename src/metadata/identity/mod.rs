//! Assembly identity: names, versions and strong names.
//!
//! - [`AssemblyIdentity`] - name, version, culture and strong name, with display name
//!   formatting and parsing
//! - [`AssemblyVersion`] - four-part version
//! - [`Identity`] - public key or public key token, with token derivation

mod assembly;
mod cryptographic;

pub use assembly::{AssemblyIdentity, AssemblyVersion};
pub use cryptographic::Identity;

//! `Assembly` table (0x20): the identity of the module itself.

use bitflags::bitflags;

mod raw;

pub use raw::*;

bitflags! {
    #[derive(Clone, Copy, PartialEq, Eq, Debug)]
    /// Flags of the `Assembly` and `AssemblyRef` tables (ECMA-335 II.23.1.2)
    pub struct AssemblyFlags : u32 {
        /// The row holds the full (unhashed) public key
        const PUBLIC_KEY = 0x0001;
        /// The implementation used at runtime is not expected to match the version seen at compile time
        const RETARGETABLE = 0x0100;
        /// Windows Runtime assembly
        const WINDOWS_RUNTIME = 0x0200;
        /// Reserved
        const DISABLE_JIT_COMPILE_OPTIMIZER = 0x4000;
        /// Reserved
        const ENABLE_JIT_COMPILE_TRACKING = 0x8000;
    }
}

#[allow(non_snake_case)]
/// All possible values for `AssemblyHashAlgorithm`
pub mod AssemblyHashAlgorithm {
    /// No hash algorithm specified
    pub const NONE: u32 = 0x0000;
    /// MD5 hash algorithm
    pub const MD5: u32 = 0x8003;
    /// SHA1 hash algorithm
    pub const SHA1: u32 = 0x8004;
}

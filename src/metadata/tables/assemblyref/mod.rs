//! `AssemblyRef` table (0x23): the module's dependency table.

mod raw;

pub use raw::*;

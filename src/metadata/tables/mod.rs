//! Metadata tables.
//!
//! The full column schema of every table is known so that tables can be located and
//! re-encoded, but only the rows that carry assembly identity are decoded into typed
//! structures: [`AssemblyRaw`] for the module's own identity and [`AssemblyRefRaw`] for its
//! dependency table.

mod assembly;
mod assemblyref;
mod types;

pub use assembly::*;
pub use assemblyref::*;
pub use types::*;

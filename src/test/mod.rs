//! Test support: a synthetic assembly factory and an in-memory host.
//!
//! No sample binaries ship with the crate. [`factories::AssemblyBuilder`] emits minimal but
//! complete PE32 .NET images, and [`host::MockHost`] plays the host side of the capability
//! surface.

pub mod factories;

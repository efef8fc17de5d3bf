//! ECMA-335 metadata of .NET assemblies, read side.
//!
//! This module parses the part of an assembly's metadata that decides how it binds to other
//! modules: the CLR header, the metadata root and its streams, the `#~` tables with their
//! full row-size schema, and the `Assembly` / `AssemblyRef` rows.
//!
//! # Key Components
//!
//! - [`view::AssemblyView`] - Identity probe and dependency table of an image
//! - [`identity`] - Assembly identities, versions and strong-name tokens
//! - [`streams`] - Heap views and the tables stream header
//! - [`tables`] - Table schema, index widths and typed rows
//! - [`token`] - Metadata tokens
//!
//! # Examples
//!
//! ```rust,no_run
//! use dotboot::AssemblyView;
//!
//! let view = AssemblyView::from_mem(std::fs::read("Combat.dll")?)?;
//! let tables = view.tables();
//! println!("{} tables, schema {}.{}", tables.table_count(), tables.major_version, tables.minor_version);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

/// Implementation of the Header of CIL
pub mod cor20header;
/// Assembly identities and strong names
pub mod identity;
/// Implementation of the MetaData Root header
pub mod root;
/// Implementation of the metadata streams
pub mod streams;
/// Implementation of the metadata tables
pub mod tables;
/// Metadata tokens
pub mod token;
/// Identity probe and dependency table
pub mod view;

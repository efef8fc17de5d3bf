// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
#![allow(clippy::too_many_arguments)]
// - 'file/physical.rs' uses mmap to map a file into memory

//! # dotboot
//!
//! Loads externally supplied, pre-compiled .NET assemblies ("addons") into a host process
//! whose own assemblies are generated and named dynamically during the session.
//!
//! An addon is compiled against a stable assembly name (`Combat`), but at runtime the host
//! only knows a session-generated stand-in (`Dynamic.Combat, Version=2.0.0.0, ...`). Loading the
//! addon as-is fails the host's reference check. `dotboot` bridges that gap:
//!
//! 1. The [`host::CapabilityBinder`] binds the host's internal surface once (live assembly
//!    enumeration, byte-stream loading, resolution-miss hook) and reports precisely which member
//!    is missing when the host changed shape.
//! 2. The [`rewrite::MetadataRewriter`] patches the addon's `AssemblyRef` table so its references
//!    point at the live identities, producing a new, structurally valid PE image.
//! 3. The [`bootstrap::Bootstrapper`] orchestrates the whole pipeline, caches loaded addons per full
//!    assembly name, and answers the host's resolution misses from the live assembly set.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use dotboot::prelude::*;
//!
//! # fn host_surface() -> Arc<dyn HostSurface> { unimplemented!() }
//! let config = BootstrapConfig::default().with_addon_root("/srv/mount");
//! let bootstrapper = Bootstrapper::initialize(host_surface(), config)?;
//!
//! let request = BootRequest::builder("Combat")
//!     .lookup_marker("Combat.GameEntry")
//!     .on_loaded(|module| println!("loaded {}", module.identity()))
//!     .build()?;
//!
//! let module = bootstrapper.boot(request)?;
//! println!("{}", module.identity().full_name());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Error Handling
//!
//! Container and metadata parsing failures surface as [`Error`]; the pipeline stages use
//! dedicated error types ([`BindError`], [`LoadError`], [`RewriteError`], [`BootError`]) so a caller
//! can tell a host that changed shape from a broken addon or a local rewrite bug.
//!
//! ## Standards Compliance
//!
//! Metadata parsing and the dependency table rewrite follow the **ECMA-335 specification**
//! (6th edition), Partition II sections 22 (tables) and 24 (physical layout).

#[macro_use]
pub(crate) mod macros;

#[macro_use]
pub(crate) mod error;

/// Shared functionality which is used in unit tests
#[cfg(test)]
pub(crate) mod test;

/// Convenient re-exports of the most commonly used types and traits.
pub mod prelude;

/// PE container access: owned files, memory-mapped and in-memory backends, byte parsing.
///
/// The [`File`] type keeps the parsed `goblin` PE structure alongside its backing storage,
/// and the [`Parser`] provides bounds-checked cursor reads used throughout the metadata layer.
pub mod file;

/// Read side of the ECMA-335 metadata needed to identify an assembly and its dependencies.
///
/// # Key Components
///
/// - [`metadata::view::AssemblyView`] - Entry point: probes identity, lists the dependency table
/// - [`metadata::cor20header`] - CLR 2.0 header
/// - [`metadata::root`] - Metadata root and stream directory
/// - [`metadata::streams`] - `#Strings`, `#Blob` and `#~` stream access
/// - [`metadata::tables`] - Table schema, `Assembly` and `AssemblyRef` rows
/// - [`metadata::identity`] - Assembly identity, versions and strong names
pub mod metadata;

/// Capability binding against the host's internal assembly-loading surface.
pub mod host;

/// Dependency table rewriting of assembly images.
pub mod rewrite;

/// The boot pipeline: requests, locators, the load cache and the orchestrator.
pub mod bootstrap;

/// Runtime configuration for the boot pipeline and host bindings.
pub mod config;

/// `dotboot` Result type
///
/// A type alias for `std::result::Result<T, Error>` where the error type is always [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

pub use error::{BindError, BootError, Error, LoadError, RewriteError};

pub use file::{parser::Parser, File};

pub use metadata::{
    identity::{AssemblyIdentity, AssemblyVersion},
    view::{AssemblyView, DependencyDescriptor},
};

pub use bootstrap::{BootRequest, Bootstrapper};
pub use config::BootstrapConfig;

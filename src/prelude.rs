//! # dotboot Prelude
//!
//! Re-exports of the types needed to boot addons and to inspect or rewrite assemblies.
//!
//! ```rust,no_run
//! use dotboot::prelude::*;
//!
//! let view = AssemblyView::from_file(std::path::Path::new("Combat.dll"))?;
//! for dependency in view.dependencies()? {
//!     println!("{}", dependency.full_name());
//! }
//! # Ok::<(), dotboot::Error>(())
//! ```

// ================================================================================================
// Errors
// ================================================================================================

pub use crate::{BindError, BootError, Error, LoadError, Result, RewriteError};

// ================================================================================================
// Container and metadata
// ================================================================================================

pub use crate::{
    file::{parser::Parser, File},
    metadata::{
        identity::{AssemblyIdentity, AssemblyVersion, Identity},
        tables::AssemblyFlags,
        view::{AssemblyView, DependencyDescriptor},
    },
};

// ================================================================================================
// Host capabilities
// ================================================================================================

pub use crate::host::{
    Capability, CapabilityBinder, HostMember, HostModule, HostSurface, ModuleHandle, ModuleRc,
    Resolution, ResolutionHandler, ResolutionRequest, SurfaceMap,
};

// ================================================================================================
// Rewriting
// ================================================================================================

pub use crate::rewrite::{stable_name, MetadataRewriter, ReferenceRewriter, RewriteMapping};

// ================================================================================================
// Boot pipeline and configuration
// ================================================================================================

pub use crate::{
    bootstrap::{
        BootRequest, BootstrapState, Bootstrapper, FileSystemLocator, MemoryLocator,
        ModuleLocator,
    },
    config::{BootstrapConfig, HostBindings},
};

//! Capability binding against the host's internal assembly-loading surface.
//!
//! The host never offered a public interface for what the boot pipeline needs: the list of
//! live assemblies, loading an assembly from bytes, and a hook into its resolution misses
//! are all internal members. This module turns them into a small typed interface that is
//! checked once at startup.
//!
//! # Architecture
//!
//! - [`HostSurface`] - Adapter that finds members on the host by path
//! - [`Capability`] - The catalogue of what the pipeline needs, required and optional
//! - [`CapabilityBinder`] - Looks every capability up once and exposes typed operations
//! - [`HostModule`] / [`ModuleRc`] - Modules as the host reports them
//! - [`ResolutionRequest`] / [`Resolution`] - The resolution-miss protocol
//!
//! A host update that renames or reshapes one of the members is reported by
//! [`CapabilityBinder::bind`] as a [`crate::BindError`] naming the capability and the member
//! path, before any load is attempted.
//!
//! # Examples
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use dotboot::{config::HostBindings, host::{CapabilityBinder, HostSurface}};
//!
//! # fn host_surface() -> Arc<dyn HostSurface> { unimplemented!() }
//! let binder = CapabilityBinder::new(host_surface(), HostBindings::default());
//! match binder.bind() {
//!     Ok(()) => println!("{} live modules", binder.live_modules()?.len()),
//!     Err(error) => eprintln!("host changed shape: {error}"),
//! }
//! # Ok::<(), dotboot::BindError>(())
//! ```

mod binder;
mod module;
mod resolution;
mod surface;

pub use binder::CapabilityBinder;
pub use module::{HostModule, ModuleHandle, ModuleRc};
pub use resolution::{Resolution, ResolutionHandler, ResolutionRequest};
pub use surface::{
    AnnounceFn, EnumerateFn, HostMember, HostSurface, LoadFn, SubscribeFn, SurfaceMap,
};

use strum::{Display, EnumIter};

use crate::config::HostBindings;

/// A host capability the boot pipeline binds to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter)]
pub enum Capability {
    /// Enumerating the live modules
    #[strum(to_string = "live module enumeration")]
    LiveModuleEnumeration,
    /// Loading a module from a byte stream
    #[strum(to_string = "stream load")]
    StreamLoad,
    /// Subscribing to resolution misses
    #[strum(to_string = "resolution hook")]
    ResolutionHook,
    /// Announcing a loaded module to the host
    #[strum(to_string = "module announcement")]
    ModuleAnnouncement,
}

impl Capability {
    /// Returns `true` if binding fails without this capability.
    #[must_use]
    pub fn is_required(self) -> bool {
        !matches!(self, Capability::ModuleAnnouncement)
    }

    /// The member path this capability is bound to.
    #[must_use]
    pub fn member(self, bindings: &HostBindings) -> &str {
        match self {
            Capability::LiveModuleEnumeration => &bindings.live_modules,
            Capability::StreamLoad => &bindings.load_from_bytes,
            Capability::ResolutionHook => &bindings.resolving,
            Capability::ModuleAnnouncement => &bindings.announce,
        }
    }

    /// The member kind this capability expects, see [`HostMember::kind`].
    #[must_use]
    pub fn expected_kind(self) -> &'static str {
        match self {
            Capability::LiveModuleEnumeration => "enumerator",
            Capability::StreamLoad => "loader",
            Capability::ResolutionHook => "event",
            Capability::ModuleAnnouncement => "callback",
        }
    }
}

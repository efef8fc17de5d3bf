//! Configuration for the boot pipeline.
//!
//! [`BootstrapConfig`] holds everything that differs between deployments: where addon images
//! live, which name prefix marks a host-generated module, which host members the capability
//! binder looks up, and how careful the rewriter is. Named presets cover the common cases.

use std::path::{Path, PathBuf};

use crate::rewrite::DEFAULT_DYNAMIC_PREFIX;

/// Default location of an addon image below the addon root. `{name}` is the stable name.
pub const DEFAULT_ADDON_LAYOUT: &str = "bootstrapped/{name}/{name}.dll";

/// Host member paths the capability binder looks up.
///
/// The defaults are the member names of the host this crate was built against. When a host
/// release renames one of them, point the binding at the new name instead of rebuilding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostBindings {
    /// Enumeration of all live assemblies
    pub live_modules: String,
    /// Loading an assembly from a byte stream into the host's load context
    pub load_from_bytes: String,
    /// The load context's resolution-miss event
    pub resolving: String,
    /// Announcement of a newly loaded assembly to the host (optional)
    pub announce: String,
}

impl Default for HostBindings {
    fn default() -> Self {
        Self {
            live_modules: "Sandbox.AssemblyLibrary.All".to_string(),
            load_from_bytes: "Sandbox.GameAssemblyManager.LoadContext.LoadFromStream".to_string(),
            resolving: "Sandbox.GameAssemblyManager.LoadContext.Resolving".to_string(),
            announce: "Sandbox.ContextInterface.OnNewAssembly".to_string(),
        }
    }
}

/// Configuration of a [`crate::Bootstrapper`].
#[derive(Debug, Clone, PartialEq, Eq)]
#[allow(clippy::struct_excessive_bools)]
pub struct BootstrapConfig {
    /// Reserved first name segment of host-generated modules (default: `Dynamic`)
    pub dynamic_prefix: String,

    /// Root directory the filesystem locator searches
    pub addon_root: PathBuf,

    /// Path of an addon image relative to `addon_root`; `{name}` is replaced by the stable name
    pub addon_layout: String,

    /// Host member paths for every capability
    pub bindings: HostBindings,

    /// Re-parse every rewritten image and check its identity and dependency table
    pub verify_rewrite: bool,

    /// Recompute the PE checksum of rewritten images that carried one
    pub update_checksum: bool,

    /// Only map stable names the candidate actually references
    pub restrict_mapping_to_references: bool,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            dynamic_prefix: DEFAULT_DYNAMIC_PREFIX.to_string(),
            addon_root: PathBuf::from("."),
            addon_layout: DEFAULT_ADDON_LAYOUT.to_string(),
            bindings: HostBindings::default(),
            verify_rewrite: true,
            update_checksum: true,
            restrict_mapping_to_references: false,
        }
    }
}

impl BootstrapConfig {
    /// Verification on, and the mapping restricted to names the candidate references.
    #[must_use]
    pub fn strict() -> Self {
        Self {
            verify_rewrite: true,
            restrict_mapping_to_references: true,
            ..Self::default()
        }
    }

    /// Skips the post-rewrite verification.
    ///
    /// **Warning**: a faulty rewrite then only surfaces as a host loader failure.
    #[must_use]
    pub fn permissive() -> Self {
        Self {
            verify_rewrite: false,
            ..Self::default()
        }
    }

    /// Sets the addon root directory.
    #[must_use]
    pub fn with_addon_root(mut self, root: impl AsRef<Path>) -> Self {
        self.addon_root = root.as_ref().to_path_buf();
        self
    }

    /// Sets the addon layout below the root.
    #[must_use]
    pub fn with_addon_layout(mut self, layout: impl Into<String>) -> Self {
        self.addon_layout = layout.into();
        self
    }

    /// Sets the reserved prefix of host-generated modules.
    #[must_use]
    pub fn with_dynamic_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.dynamic_prefix = prefix.into();
        self
    }

    /// Replaces the host member bindings.
    #[must_use]
    pub fn with_bindings(mut self, bindings: HostBindings) -> Self {
        self.bindings = bindings;
        self
    }
}

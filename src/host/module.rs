use std::{fmt, sync::Arc};

use crate::metadata::identity::AssemblyIdentity;

/// A module as the host knows it: a live host-generated assembly or an assembly the host
/// loaded on request.
pub trait HostModule: Send + Sync + fmt::Debug {
    /// Identity the host reports for the module.
    fn identity(&self) -> &AssemblyIdentity;

    /// The module's image, if the host keeps it around.
    fn content(&self) -> Option<&[u8]> {
        None
    }
}

/// Shared handle to a [`HostModule`].
pub type ModuleRc = Arc<dyn HostModule>;

/// A plain [`HostModule`] for hosts that describe their modules by identity and bytes.
#[derive(Debug, Clone)]
pub struct ModuleHandle {
    identity: AssemblyIdentity,
    content: Option<Vec<u8>>,
}

impl ModuleHandle {
    /// A module known only by its identity.
    #[must_use]
    pub fn new(identity: AssemblyIdentity) -> Self {
        ModuleHandle {
            identity,
            content: None,
        }
    }

    /// A module with its image.
    #[must_use]
    pub fn with_content(identity: AssemblyIdentity, content: Vec<u8>) -> Self {
        ModuleHandle {
            identity,
            content: Some(content),
        }
    }

    /// Wraps the handle for sharing.
    #[must_use]
    pub fn into_rc(self) -> ModuleRc {
        Arc::new(self)
    }
}

impl HostModule for ModuleHandle {
    fn identity(&self) -> &AssemblyIdentity {
        &self.identity
    }

    fn content(&self) -> Option<&[u8]> {
        self.content.as_deref()
    }
}

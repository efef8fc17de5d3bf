//! Types exchanged with the host's resolution-miss hook.

use std::{fmt, sync::Arc};

use crate::{host::ModuleRc, metadata::identity::AssemblyIdentity, Result};

/// A dependency the host's loader could not satisfy on its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolutionRequest {
    /// Identity the reference asks for
    pub wanted: AssemblyIdentity,
    /// Module whose reference missed, if the host reports it
    pub requesting: Option<AssemblyIdentity>,
}

impl ResolutionRequest {
    /// A miss for `wanted` with an unknown requester.
    #[must_use]
    pub fn new(wanted: AssemblyIdentity) -> Self {
        ResolutionRequest {
            wanted,
            requesting: None,
        }
    }

    /// A miss for the display name `wanted`, as most hosts report it.
    ///
    /// # Errors
    /// Returns a malformed error if `wanted` is not a valid display name.
    pub fn from_display_name(wanted: &str) -> Result<Self> {
        Ok(Self::new(AssemblyIdentity::parse(wanted)?))
    }

    /// Sets the module whose reference missed.
    #[must_use]
    pub fn with_requesting(mut self, requesting: AssemblyIdentity) -> Self {
        self.requesting = Some(requesting);
        self
    }
}

impl fmt::Display for ResolutionRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.requesting {
            Some(requesting) => write!(f, "'{}' (from '{}')", self.wanted, requesting.name),
            None => write!(f, "'{}'", self.wanted),
        }
    }
}

/// Answer to a [`ResolutionRequest`].
#[derive(Debug, Clone)]
pub enum Resolution {
    /// The miss is satisfied by this module
    Resolved(ModuleRc),
    /// Nothing matched; the host continues with its own failure path
    Unresolved,
}

impl Resolution {
    /// Returns `true` for [`Resolution::Resolved`].
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        matches!(self, Resolution::Resolved(_))
    }

    /// The resolved module, if any.
    #[must_use]
    pub fn into_module(self) -> Option<ModuleRc> {
        match self {
            Resolution::Resolved(module) => Some(module),
            Resolution::Unresolved => None,
        }
    }
}

/// Callback answering resolution misses.
pub type ResolutionHandler = Arc<dyn Fn(&ResolutionRequest) -> Resolution + Send + Sync>;

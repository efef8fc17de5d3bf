//! Boot requests as handed in by the caller.

use std::fmt;

use crate::{error::BootError, host::ModuleRc};

/// Callback invoked with the module of a successful boot.
pub type LoadedCallback = Box<dyn FnOnce(&ModuleRc) + Send>;

/// A request to boot one addon.
///
/// The callback is invoked exactly once if the boot succeeds, including when the module was
/// already loaded by an earlier request, and never when it fails.
pub struct BootRequest {
    name: String,
    lookup_marker: Option<String>,
    on_loaded: Option<LoadedCallback>,
}

impl BootRequest {
    /// A request for the addon with stable name `name`, without marker or callback.
    ///
    /// The name is validated by [`crate::Bootstrapper::boot`]; use [`BootRequest::builder`] to
    /// validate up front.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        BootRequest {
            name: name.into(),
            lookup_marker: None,
            on_loaded: None,
        }
    }

    /// Starts building a request for `name`.
    #[must_use]
    pub fn builder(name: impl Into<String>) -> BootRequestBuilder {
        BootRequestBuilder {
            request: BootRequest::new(name),
        }
    }

    /// The stable name of the addon.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The opaque lookup marker, if any.
    #[must_use]
    pub fn lookup_marker(&self) -> Option<&str> {
        self.lookup_marker.as_deref()
    }

    /// Checks that the name can identify an addon.
    ///
    /// The name ends up in a filesystem path, so it must be a single, non-empty path segment
    /// without surrounding whitespace.
    ///
    /// # Errors
    /// Returns [`BootError::InvalidRequest`] describing the problem.
    pub fn validate(&self) -> Result<(), BootError> {
        let name = &self.name;
        let problem = if name.is_empty() {
            Some("stable name is empty")
        } else if name.trim() != name {
            Some("stable name has leading or trailing whitespace")
        } else if name.contains(['/', '\\', '\0']) {
            Some("stable name contains a path separator or NUL")
        } else if name.contains("..") {
            Some("stable name contains '..'")
        } else {
            None
        };

        match problem {
            Some(problem) => Err(BootError::InvalidRequest(format!("{problem}: {name:?}"))),
            None => Ok(()),
        }
    }

    pub(crate) fn take_callback(&mut self) -> Option<LoadedCallback> {
        self.on_loaded.take()
    }

    pub(crate) fn fire(&mut self, module: &ModuleRc) {
        if let Some(callback) = self.take_callback() {
            callback(module);
        }
    }
}

impl fmt::Debug for BootRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BootRequest")
            .field("name", &self.name)
            .field("lookup_marker", &self.lookup_marker)
            .field("on_loaded", &self.on_loaded.is_some())
            .finish()
    }
}

/// Builder for [`BootRequest`].
#[derive(Debug)]
pub struct BootRequestBuilder {
    request: BootRequest,
}

impl BootRequestBuilder {
    /// Sets the marker the module can later be found by, see
    /// [`crate::Bootstrapper::find_by_marker`]. Markers of requests answered from the cache
    /// or by a concurrent boot are recorded too.
    #[must_use]
    pub fn lookup_marker(mut self, marker: impl Into<String>) -> Self {
        self.request.lookup_marker = Some(marker.into());
        self
    }

    /// Sets the completion callback.
    #[must_use]
    pub fn on_loaded<F>(mut self, callback: F) -> Self
    where
        F: FnOnce(&ModuleRc) + Send + 'static,
    {
        self.request.on_loaded = Some(Box::new(callback));
        self
    }

    /// Validates and returns the request.
    ///
    /// # Errors
    /// Returns [`BootError::InvalidRequest`] if the name is unusable.
    pub fn build(self) -> Result<BootRequest, BootError> {
        self.request.validate()?;
        Ok(self.request)
    }
}

use thiserror::Error;

use crate::host::Capability;

macro_rules! malformed_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::Malformed {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Malformed {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

macro_rules! out_of_bounds_error {
    () => {
        crate::Error::OutOfBounds
    };
}

/// The generic Error type for container and metadata parsing.
///
/// This enum covers everything that can go wrong while reading a PE image and its
/// ECMA-335 metadata. The pipeline stages wrap it into their own error types
/// ([`RewriteError`], [`BootError`]) so callers can tell *where* a malformed image was hit.
///
/// # Examples
///
/// ```rust,no_run
/// use dotboot::{AssemblyView, Error};
/// use std::path::Path;
///
/// match AssemblyView::from_file(Path::new("addon.dll")) {
///     Ok(view) => println!("{}", view.identity()?.full_name()),
///     Err(Error::NotSupported) => eprintln!("not a supported .NET image"),
///     Err(Error::Malformed { message, file, line }) => {
///         eprintln!("Malformed file: {} ({}:{})", message, file, line);
///     }
///     Err(e) => eprintln!("Other error: {}", e),
/// }
/// # Ok::<(), dotboot::Error>(())
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// The file is damaged and could not be parsed.
    ///
    /// Includes the source location where the malformation was detected.
    #[error("Malformed - {file}:{line}: {message}")]
    Malformed {
        /// The message to be printed for the Malformed error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// An out of bound access was attempted while parsing the file.
    #[error("Out of Bound read would have occurred!")]
    OutOfBounds,

    /// This file type, or a feature used by it, is not supported.
    ///
    /// Raised for images without a compressed `#~` tables stream and for
    /// metadata tables outside of the ECMA-335 assembly table range.
    #[error("This file type is not supported")]
    NotSupported,

    /// Provided input was empty.
    #[error("Provided input was empty")]
    Empty,

    /// File I/O error.
    #[error("{0}")]
    FileError(#[from] std::io::Error),

    /// Error from the goblin crate during PE parsing.
    #[error("{0}")]
    GoblinErr(#[from] goblin::error::Error),
}

/// Failure to bind the host's internal surface.
///
/// A `BindError` means the host does not look the way this crate expects - usually because the
/// host was updated and one of its internal members was renamed or changed type. It is fatal for
/// the bootstrapper: once binding failed, every boot attempt is refused with
/// [`BootError::NotInitialized`] carrying this error.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BindError {
    /// The host does not expose the member a required capability is bound to.
    #[error("host capability '{capability}' is missing: member '{member}' was not found (host API changed?)")]
    MissingCapability {
        /// The capability that could not be bound
        capability: Capability,
        /// The host member path that was looked up
        member: String,
    },

    /// The host exposes the member, but it has a different shape than expected.
    #[error("host capability '{capability}' changed shape: member '{member}' is a {found}, expected a {expected}")]
    ShapeMismatch {
        /// The capability that could not be bound
        capability: Capability,
        /// The host member path that was looked up
        member: String,
        /// The member kind this crate expects
        expected: &'static str,
        /// The member kind the host reported
        found: &'static str,
    },

    /// A capability was used before [`crate::host::CapabilityBinder::bind`] succeeded.
    #[error("host capabilities are not bound yet")]
    NotBound,

    /// More than one capability failed to bind.
    #[error("{} host capabilities failed to bind: {}", .0.len(), join_errors(.0))]
    Incomplete(Vec<BindError>),
}

fn join_errors(errors: &[BindError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Failure reported by the host's own loader.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LoadError {
    /// The host could not parse the image it was given.
    #[error("host rejected a malformed image: {0}")]
    Malformed(String),

    /// The host could not satisfy a dependency of the image, even with the resolution fallback.
    #[error("host could not resolve dependency '{name}'")]
    MissingDependency {
        /// Display name of the dependency that could not be resolved
        name: String,
    },

    /// The host refused the image; the message is the host's diagnostic, verbatim.
    #[error("host rejected the image: {0}")]
    Rejected(String),

    /// The loader capability is not available.
    #[error("host loader unavailable: {0}")]
    Unavailable(BindError),
}

/// Failure of the dependency table rewrite.
///
/// A rewrite failure is a local problem - either the addon image could not be read, or the
/// patched image did not pass verification. It is never a missing dependency on the host side.
#[derive(Error, Debug)]
pub enum RewriteError {
    /// The input image could not be parsed.
    #[error("cannot rewrite malformed image: {0}")]
    Malformed(#[from] Error),

    /// The patched image failed the post-edit verification.
    #[error("rewritten image is inconsistent: {message}")]
    Inconsistent {
        /// What the verification found
        message: String,
    },

    /// The relocated metadata could not be placed into the image.
    #[error("cannot lay out rewritten image: {message}")]
    Layout {
        /// Why the layout failed
        message: String,
    },
}

/// Failure of a single boot attempt.
///
/// Every variant carries the stable name that was requested and, once known, the full
/// assembly name derived from the candidate image, so the failure can be reproduced.
/// A failed boot never poisons the load cache - a later attempt starts from scratch.
#[derive(Error, Debug)]
pub enum BootError {
    /// The request itself is unusable (caller error).
    #[error("invalid boot request: {0}")]
    InvalidRequest(String),

    /// Host binding failed earlier; loading is disabled.
    #[error("bootstrapper is not initialized: {0}")]
    NotInitialized(BindError),

    /// No candidate image exists for the requested name.
    #[error("module '{name}' not found (searched {searched})")]
    ModuleNotFound {
        /// Requested stable name
        name: String,
        /// Where the locator looked
        searched: String,
    },

    /// The locator failed while reading the candidate image.
    #[error("failed to read module '{name}': {source}")]
    Locator {
        /// Requested stable name
        name: String,
        /// The underlying error
        #[source]
        source: Error,
    },

    /// The candidate image exists but its identity could not be read.
    #[error("module '{name}' is malformed: {source}")]
    MalformedModule {
        /// Requested stable name
        name: String,
        /// The underlying parsing error
        #[source]
        source: Error,
    },

    /// Rewriting the candidate's dependency table failed.
    #[error("rewrite of '{name}' ({full_name}) failed: {source}")]
    Rewrite {
        /// Requested stable name
        name: String,
        /// Full assembly name of the candidate
        full_name: String,
        /// The underlying rewrite error
        #[source]
        source: RewriteError,
    },

    /// The host loader rejected the patched image.
    #[error("host failed to load '{name}' ({full_name}): {source}")]
    Load {
        /// Requested stable name
        name: String,
        /// Full assembly name of the candidate
        full_name: String,
        /// The host's error
        #[source]
        source: LoadError,
    },

    /// A boot for this identity was requested from within its own in-flight boot.
    #[error("reentrant boot of '{full_name}' while it is still loading")]
    Reentrant {
        /// Full assembly name of the in-flight module
        full_name: String,
    },

    /// A concurrent attempt for the same identity was awaited and failed.
    #[error("concurrent boot of '{full_name}' failed: {message}")]
    InFlightFailed {
        /// Full assembly name of the module
        full_name: String,
        /// The failure reported by the attempt that was awaited
        message: String,
    },
}

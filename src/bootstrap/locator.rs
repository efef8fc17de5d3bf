//! Finding the image of an addon by its stable name.

use std::{
    collections::HashMap,
    fmt, fs, io,
    path::{Path, PathBuf},
    sync::RwLock,
};

use crate::{config::BootstrapConfig, metadata::view::AssemblyView, Result};

/// Where a located addon image comes from.
#[derive(Clone, PartialEq, Eq)]
pub enum Located {
    /// An image file on disk
    Path(PathBuf),
    /// An image already in memory
    Bytes {
        /// Description of where the bytes came from, for diagnostics
        origin: String,
        /// The image
        data: Vec<u8>,
    },
}

impl Located {
    /// Opens the image for probing. Files are memory-mapped.
    ///
    /// # Errors
    /// Returns [`crate::Error::FileError`] if the file cannot be read, or a parsing error if
    /// it is not a supported .NET image.
    pub fn open(self) -> Result<AssemblyView> {
        match self {
            Located::Path(path) => AssemblyView::from_file(&path),
            Located::Bytes { data, .. } => AssemblyView::from_mem(data),
        }
    }

    /// Where the image comes from.
    #[must_use]
    pub fn origin(&self) -> String {
        match self {
            Located::Path(path) => path.display().to_string(),
            Located::Bytes { origin, .. } => origin.clone(),
        }
    }
}

impl fmt::Debug for Located {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Located::Path(path) => f.debug_tuple("Path").field(path).finish(),
            Located::Bytes { origin, data } => f
                .debug_struct("Bytes")
                .field("origin", origin)
                .field("len", &data.len())
                .finish(),
        }
    }
}

/// Resolves a stable name to the addon image.
pub trait ModuleLocator: Send + Sync {
    /// Finds the image for `name`. `Ok(None)` means there is none.
    ///
    /// # Errors
    /// Returns an error if looking failed, as opposed to finding nothing.
    fn locate(&self, name: &str) -> Result<Option<Located>>;

    /// Where `name` was searched, for the not-found diagnostic.
    fn describe(&self, name: &str) -> String;
}

/// Looks for addons below a root directory, at `<root>/<layout>` with `{name}` replaced.
#[derive(Debug, Clone)]
pub struct FileSystemLocator {
    root: PathBuf,
    layout: String,
}

impl FileSystemLocator {
    /// A locator for `layout` below `root`.
    #[must_use]
    pub fn new(root: impl AsRef<Path>, layout: impl Into<String>) -> Self {
        FileSystemLocator {
            root: root.as_ref().to_path_buf(),
            layout: layout.into(),
        }
    }

    /// A locator for the configured addon root and layout.
    #[must_use]
    pub fn from_config(config: &BootstrapConfig) -> Self {
        Self::new(&config.addon_root, config.addon_layout.clone())
    }

    /// The path the image of `name` is expected at.
    #[must_use]
    pub fn path_for(&self, name: &str) -> PathBuf {
        self.root.join(self.layout.replace("{name}", name))
    }
}

impl ModuleLocator for FileSystemLocator {
    fn locate(&self, name: &str) -> Result<Option<Located>> {
        let path = self.path_for(name);
        match fs::metadata(&path) {
            Ok(metadata) if metadata.is_file() => Ok(Some(Located::Path(path))),
            Ok(_) => Ok(None),
            Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(error) => Err(error.into()),
        }
    }

    fn describe(&self, name: &str) -> String {
        format!("'{}'", self.path_for(name).display())
    }
}

/// Serves addon images registered in memory, keyed by stable name (ASCII case-insensitive).
#[derive(Debug, Default)]
pub struct MemoryLocator {
    images: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryLocator {
    /// An empty locator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `image` as the addon `name`, replacing any earlier one.
    pub fn insert(&self, name: &str, image: Vec<u8>) {
        write_lock!(self.images).insert(name.to_ascii_lowercase(), image);
    }

    /// Unregisters the addon `name`.
    pub fn remove(&self, name: &str) -> Option<Vec<u8>> {
        write_lock!(self.images).remove(&name.to_ascii_lowercase())
    }
}

impl ModuleLocator for MemoryLocator {
    fn locate(&self, name: &str) -> Result<Option<Located>> {
        Ok(read_lock!(self.images)
            .get(&name.to_ascii_lowercase())
            .map(|data| Located::Bytes {
                origin: format!("memory:{name}"),
                data: data.clone(),
            }))
    }

    fn describe(&self, name: &str) -> String {
        format!("in-memory images for '{name}'")
    }
}

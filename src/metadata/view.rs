//! Read-only view of an assembly's metadata: identity probe and dependency table.
//!
//! [`AssemblyView`] parses only what is needed to tell which module an image is and which
//! modules it references: the CLR header, the metadata root, the `#Strings` and `#Blob`
//! heaps and the `#~` tables stream. Nothing is resolved beyond the `Assembly` and
//! `AssemblyRef` rows, which keeps the probe cheap enough to run before every boot.
//!
//! # Examples
//!
//! ```rust,no_run
//! use dotboot::AssemblyView;
//! use std::path::Path;
//!
//! let view = AssemblyView::from_file(Path::new("bootstrapped/Combat/Combat.dll"))?;
//! println!("{}", view.identity()?);
//! for dependency in view.dependencies()? {
//!     println!("  -> {}", dependency.identity);
//! }
//! # Ok::<(), dotboot::Error>(())
//! ```

use std::{path::Path, sync::Arc};

use ouroboros::self_referencing;

use crate::{
    file::File,
    metadata::{
        cor20header::Cor20Header,
        identity::AssemblyIdentity,
        root::Root,
        streams::{
            Blob, StreamHeader, Strings, TablesHeader, STREAM_BLOB, STREAM_STRINGS,
            STREAM_TABLES, STREAM_TABLES_UNCOMPRESSED,
        },
        tables::{AssemblyFlags, AssemblyRaw, AssemblyRefRaw},
    },
    Error::{NotSupported, OutOfBounds},
    Result,
};

/// Stand-in for a heap the image does not carry.
const EMPTY_HEAP: &[u8] = &[0];

/// One entry of a module's dependency table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyDescriptor {
    /// 1-based row id in the `AssemblyRef` table
    pub rid: u32,
    /// The referenced identity as stored; `identity.name` is the short name
    pub identity: AssemblyIdentity,
    /// Raw `AssemblyRef` flags
    pub flags: AssemblyFlags,
}

impl DependencyDescriptor {
    /// Short name of the referenced module.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.identity.name
    }

    /// Display name of the referenced module.
    #[must_use]
    pub fn full_name(&self) -> String {
        self.identity.full_name()
    }
}

/// Parsed metadata structures, borrowing from the image bytes.
pub struct AssemblyViewData<'a> {
    /// File offset of the CLR header
    pub cor20_offset: usize,
    /// The CLR header
    pub cor20header: Cor20Header,
    /// File offset of the metadata root
    pub metadata_offset: usize,
    /// The complete metadata, root included
    pub metadata: &'a [u8],
    /// Metadata root with the stream directory
    pub metadata_root: Root,
    /// The `#~` stream
    pub tables: TablesHeader<'a>,
    /// The `#Strings` heap
    pub strings: Strings<'a>,
    /// The `#Blob` heap, or an empty heap if the image has none
    pub blobs: Blob<'a>,
}

impl<'a> AssemblyViewData<'a> {
    fn from_file(file: &File, data: &'a [u8]) -> Result<Self> {
        let (clr_rva, clr_size) = file.clr()?;
        let cor20_offset = file.rva_to_offset(clr_rva)?;
        let Some(clr_end) = cor20_offset.checked_add(clr_size) else {
            return Err(OutOfBounds);
        };
        if clr_end > data.len() {
            return Err(OutOfBounds);
        }
        let cor20header = Cor20Header::read(&data[cor20_offset..clr_end])?;

        let metadata_offset = file.rva_to_offset(cor20header.meta_data_rva as usize)?;
        let metadata_end = metadata_offset + cor20header.meta_data_size as usize;
        if metadata_end > data.len() {
            return Err(OutOfBounds);
        }
        let metadata = &data[metadata_offset..metadata_end];
        let metadata_root = Root::read(metadata)?;

        if metadata_root.stream(STREAM_TABLES_UNCOMPRESSED).is_some() {
            return Err(NotSupported);
        }

        let stream_data = |stream: &StreamHeader| {
            &metadata[stream.offset as usize..(stream.offset + stream.size) as usize]
        };

        let tables = match metadata_root.stream(STREAM_TABLES) {
            Some(stream) => TablesHeader::from(stream_data(stream))?,
            None => return Err(malformed_error!("Metadata has no #~ stream")),
        };
        let strings = match metadata_root.stream(STREAM_STRINGS) {
            Some(stream) => Strings::from(stream_data(stream))?,
            None => return Err(malformed_error!("Metadata has no #Strings heap")),
        };
        let blobs = match metadata_root.stream(STREAM_BLOB) {
            Some(stream) => Blob::from(stream_data(stream))?,
            None => Blob::from(EMPTY_HEAP)?,
        };

        Ok(AssemblyViewData {
            cor20_offset,
            cor20header,
            metadata_offset,
            metadata,
            metadata_root,
            tables,
            strings,
            blobs,
        })
    }
}

#[self_referencing]
/// A read-only view of a .NET assembly's identity-relevant metadata.
///
/// The view owns the image (memory-mapped or in memory) and keeps the parsed structures
/// alongside it. It is `Send` and `Sync`; all accessors are read-only.
pub struct AssemblyView {
    file: Arc<File>,

    #[borrows(file)]
    #[not_covariant]
    data: AssemblyViewData<'this>,
}

impl AssemblyView {
    /// Opens and memory-maps an assembly from disk.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or is not a supported .NET image.
    pub fn from_file(file: &Path) -> Result<Self> {
        Self::from_pe(Arc::new(File::from_file(file)?))
    }

    /// Parses an assembly from an owned buffer.
    ///
    /// # Errors
    /// Returns an error if the buffer is not a supported .NET image.
    pub fn from_mem(data: Vec<u8>) -> Result<Self> {
        Self::from_pe(Arc::new(File::from_mem(data)?))
    }

    /// Builds the view over an already loaded PE image.
    ///
    /// # Errors
    /// Returns [`crate::Error::NotSupported`] for images with an uncompressed `#-` tables
    /// stream, or a malformed error if the metadata cannot be located or parsed.
    pub fn from_pe(file: Arc<File>) -> Result<Self> {
        AssemblyView::try_new(file, |file| AssemblyViewData::from_file(file, file.data()))
    }

    /// The underlying PE image.
    #[must_use]
    pub fn file(&self) -> &Arc<File> {
        self.borrow_file()
    }

    /// The raw image bytes.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        self.borrow_file().data()
    }

    /// The CLR header.
    #[must_use]
    pub fn cor20header(&self) -> &Cor20Header {
        self.with_data(|data| &data.cor20header)
    }

    /// File offset of the CLR header.
    #[must_use]
    pub fn cor20_offset(&self) -> usize {
        self.with_data(|data| data.cor20_offset)
    }

    /// File offset of the metadata root.
    #[must_use]
    pub fn metadata_offset(&self) -> usize {
        self.with_data(|data| data.metadata_offset)
    }

    /// The metadata root and its stream directory.
    #[must_use]
    pub fn metadata_root(&self) -> &Root {
        self.with_data(|data| &data.metadata_root)
    }

    /// The bytes of stream `name`, if present.
    #[must_use]
    pub fn stream_data(&self, name: &str) -> Option<&[u8]> {
        self.with_data(|data| {
            data.metadata_root.stream(name).map(|stream| {
                &data.metadata[stream.offset as usize..(stream.offset + stream.size) as usize]
            })
        })
    }

    /// The `#~` tables stream.
    #[must_use]
    pub fn tables(&self) -> &TablesHeader {
        self.with_data(|data| &data.tables)
    }

    /// The `#Strings` heap.
    #[must_use]
    pub fn strings(&self) -> &Strings {
        self.with_data(|data| &data.strings)
    }

    /// The `#Blob` heap.
    #[must_use]
    pub fn blobs(&self) -> &Blob {
        self.with_data(|data| &data.blobs)
    }

    /// Identity of the assembly, read from its `Assembly` row.
    ///
    /// # Errors
    /// Returns a malformed error for a module without an assembly manifest, or if the row
    /// points outside of the heaps.
    pub fn identity(&self) -> Result<AssemblyIdentity> {
        self.with_data(|data| {
            let Some(table) = data.tables.table::<AssemblyRaw>()? else {
                return Err(malformed_error!("Module has no Assembly manifest"));
            };
            match table.get(1) {
                Some(row) => row.to_identity(&data.strings, &data.blobs),
                None => Err(malformed_error!("Module has no Assembly manifest")),
            }
        })
    }

    /// The dependency table in row order.
    ///
    /// # Errors
    /// Returns an error if a row points outside of the heaps.
    pub fn dependencies(&self) -> Result<Vec<DependencyDescriptor>> {
        self.with_data(|data| {
            let Some(table) = data.tables.table::<AssemblyRefRaw>()? else {
                return Ok(Vec::new());
            };

            let mut dependencies = Vec::with_capacity(table.row_count() as usize);
            for row in table.iter() {
                dependencies.push(DependencyDescriptor {
                    rid: row.rid,
                    identity: row.to_identity(&data.strings, &data.blobs)?,
                    flags: AssemblyFlags::from_bits_retain(row.flags),
                });
            }

            Ok(dependencies)
        })
    }
}

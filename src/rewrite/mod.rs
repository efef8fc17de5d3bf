//! Reference Rewriter: retargets a module's dependency table at live identities.
//!
//! The rewriter is a pure function over byte buffers. Given an image and a
//! [`RewriteMapping`], it produces a new image whose `AssemblyRef` rows for mapped stable
//! names carry the live identity: name, version, culture and public key token. Everything
//! else in the image is preserved.
//!
//! # Architecture
//!
//! - [`heaps`] - Append-only `#Strings` and `#Blob` builders
//! - [`tables`] - Schema-driven row codec, used when heap indexes have to grow
//! - [`pe`] - Placement of the rebuilt metadata in a new section
//! - [`mapping`] - The mapping and the naming convention it is built from
//!
//! The metadata is rebuilt as a whole (root, stream directory and streams) and placed into a
//! new `.meta` section. The old metadata stays in the image, unreferenced. Rows of tables other
//! than `AssemblyRef` are byte-identical unless a heap crossed 64 KiB; then every table is
//! re-encoded with 4-byte heap indexes.
//!
//! # Examples
//!
//! ```rust,no_run
//! use dotboot::{
//!     rewrite::{MetadataRewriter, ReferenceRewriter, RewriteMapping},
//!     AssemblyIdentity,
//! };
//!
//! let live = AssemblyIdentity::parse(
//!     "Dynamic.Combat, Version=2.0.0.0, Culture=neutral, PublicKeyToken=null",
//! )?;
//! let mapping: RewriteMapping = [("Combat", live)].into_iter().collect();
//!
//! let image = std::fs::read("bootstrapped/Arena/Arena.dll")?;
//! let patched = MetadataRewriter::new().rewrite(&image, &mapping)?;
//! std::fs::write("Arena.patched.dll", patched)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod heaps;
pub mod pe;
pub mod tables;

mod mapping;

pub use mapping::{stable_name, MappingEntry, RewriteMapping, DEFAULT_DYNAMIC_PREFIX};

use std::collections::BTreeMap;

use crate::{
    config::BootstrapConfig,
    error::RewriteError,
    metadata::{
        identity::AssemblyIdentity,
        root::Root,
        streams::{
            StreamHeader, Strings, TablesHeader, STREAM_BLOB, STREAM_STRINGS, STREAM_TABLES,
        },
        tables::{
            AssemblyFlags, AssemblyRefRaw, RowReadable, RowWritable, TableId, HEAP_LARGE_BLOB,
            HEAP_LARGE_STRINGS,
        },
        view::AssemblyView,
    },
    rewrite::heaps::{align_to, BlobHeapBuilder, StringHeapBuilder},
};

/// Heaps of this size or larger need 4-byte indexes.
const SMALL_HEAP_LIMIT: usize = 0x1_0000;

/// Produces a copy of a module image with its dependency table retargeted.
///
/// Implementations must never modify `image`, must return an equal copy for an empty
/// mapping, and must leave dependencies without a mapping entry untouched.
pub trait ReferenceRewriter: Send + Sync {
    /// Rewrites the dependency table of `image` according to `mapping`.
    ///
    /// # Errors
    /// Returns [`RewriteError::Malformed`] if `image` cannot be read, and
    /// [`RewriteError::Inconsistent`] or [`RewriteError::Layout`] if the edit cannot be
    /// applied cleanly.
    fn rewrite(&self, image: &[u8], mapping: &RewriteMapping) -> Result<Vec<u8>, RewriteError>;
}

/// The ECMA-335 metadata rewriter.
#[derive(Debug, Clone)]
pub struct MetadataRewriter {
    prefix: String,
    verify: bool,
    update_checksum: bool,
}

impl Default for MetadataRewriter {
    fn default() -> Self {
        Self::new()
    }
}

impl MetadataRewriter {
    /// Creates a rewriter with the default prefix, verification and checksum update enabled.
    #[must_use]
    pub fn new() -> Self {
        MetadataRewriter {
            prefix: DEFAULT_DYNAMIC_PREFIX.to_string(),
            verify: true,
            update_checksum: true,
        }
    }

    /// Creates a rewriter following `config`.
    #[must_use]
    pub fn from_config(config: &BootstrapConfig) -> Self {
        MetadataRewriter {
            prefix: config.dynamic_prefix.clone(),
            verify: config.verify_rewrite,
            update_checksum: config.update_checksum,
        }
    }

    /// Sets the reserved prefix; references named `<prefix>.<stable name>` are matched by
    /// their stable name.
    #[must_use]
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Enables or disables re-parsing and checking the output.
    #[must_use]
    pub fn with_verification(mut self, verify: bool) -> Self {
        self.verify = verify;
        self
    }

    /// Enables or disables recomputing a non-zero PE checksum.
    #[must_use]
    pub fn with_checksum_update(mut self, update: bool) -> Self {
        self.update_checksum = update;
        self
    }

    /// Stable name a reference named `name` binds to.
    fn stable_name<'a>(&self, name: &'a str) -> &'a str {
        stable_name(name, &self.prefix).unwrap_or(name)
    }

    fn build_metadata(
        view: &AssemblyView,
        edits: &[(AssemblyRefRaw, &AssemblyIdentity)],
    ) -> Result<Vec<u8>, RewriteError> {
        let tables = view.tables();
        let mut strings = StringHeapBuilder::new(Strings::from(view.strings().data())?);
        let mut blobs = BlobHeapBuilder::new(view.blobs().data());

        let mut rows = Vec::with_capacity(edits.len());
        for (row, live) in edits {
            let token = match live.public_key_token() {
                Some(token) => blobs.append(&token)?,
                None if live.is_strong_named() => {
                    return Err(RewriteError::Inconsistent {
                        message: format!("cannot derive a public key token for '{live}'"),
                    })
                }
                None => 0,
            };

            rows.push(AssemblyRefRaw {
                major_version: live.version.major,
                minor_version: live.version.minor,
                build_number: live.version.build,
                revision_number: live.version.revision,
                flags: row.flags & !AssemblyFlags::PUBLIC_KEY.bits(),
                public_key_or_token: token,
                name: strings.intern(&live.name)?,
                culture: strings.intern(live.culture.as_deref().unwrap_or(""))?,
                ..row.clone()
            });
        }

        let old_heap_sizes = tables.info.heap_sizes();
        let mut heap_sizes = old_heap_sizes;
        if strings.len() >= SMALL_HEAP_LIMIT {
            heap_sizes |= HEAP_LARGE_STRINGS;
        }
        if blobs.appended() > 0 && blobs.len() >= SMALL_HEAP_LIMIT {
            heap_sizes |= HEAP_LARGE_BLOB;
        }

        let (mut table_stream, info) = if heap_sizes == old_heap_sizes {
            let data = tables.data();
            let mut stream = data.to_vec();
            stream.resize(align_to(data.len(), 4), 0);
            (stream, tables.info.clone())
        } else {
            log::debug!(
                "heap index widths grow (HeapSizes 0x{:02x} -> 0x{:02x}), re-encoding all tables",
                old_heap_sizes,
                heap_sizes
            );
            tables::reencode_tables(tables, heap_sizes)?
        };

        let range = {
            let reencoded = TablesHeader::from(&table_stream)?;
            reencoded.table_range(TableId::AssemblyRef)
        };
        let Some(range) = range else {
            return Err(RewriteError::Inconsistent {
                message: "AssemblyRef table disappeared while re-encoding".to_string(),
            });
        };
        let row_size = AssemblyRefRaw::row_size(&info) as usize;
        for row in &rows {
            let mut offset = range.start + (row.rid as usize - 1) * row_size;
            row.row_write(&mut table_stream, &mut offset, &info)?;
        }

        let mut replaced: BTreeMap<&str, Vec<u8>> = BTreeMap::new();
        replaced.insert(STREAM_TABLES, table_stream);
        replaced.insert(STREAM_STRINGS, strings.finish());
        if blobs.appended() > 0 || view.stream_data(STREAM_BLOB).is_some() {
            replaced.insert(STREAM_BLOB, blobs.finish());
        }

        let mut contents = Vec::with_capacity(view.metadata_root().stream_headers.len() + 1);
        for header in &view.metadata_root().stream_headers {
            let data = match replaced.remove(header.name.as_str()) {
                Some(data) => data,
                None => view
                    .stream_data(&header.name)
                    .map(<[u8]>::to_vec)
                    .unwrap_or_default(),
            };
            contents.push((header.name.clone(), data));
        }
        contents.extend(
            replaced
                .into_iter()
                .map(|(name, data)| (name.to_string(), data)),
        );

        Self::assemble(view.metadata_root(), &contents)
    }

    /// Lays out the metadata root followed by `streams`, each aligned to 4 bytes.
    fn assemble(root: &Root, streams: &[(String, Vec<u8>)]) -> Result<Vec<u8>, RewriteError> {
        let mut new_root = root.clone();
        new_root.stream_headers = streams
            .iter()
            .map(|(name, _)| StreamHeader {
                offset: 0,
                size: 0,
                name: name.clone(),
            })
            .collect();

        let mut offset = align_to(new_root.encoded_size(), 4);
        for (header, (_, data)) in new_root.stream_headers.iter_mut().zip(streams) {
            let size = align_to(data.len(), 4);
            header.offset = u32::try_from(offset).map_err(|_| RewriteError::Layout {
                message: "metadata exceeds 4 GiB".to_string(),
            })?;
            header.size = u32::try_from(size).map_err(|_| RewriteError::Layout {
                message: "stream exceeds 4 GiB".to_string(),
            })?;
            offset += size;
        }

        let mut metadata = new_root.to_bytes();
        metadata.resize(align_to(metadata.len(), 4), 0);
        for (_, data) in streams {
            let start = metadata.len();
            metadata.extend_from_slice(data);
            metadata.resize(start + align_to(data.len(), 4), 0);
        }

        Ok(metadata)
    }

    fn verify_output(
        output: Vec<u8>,
        identity: &AssemblyIdentity,
        expected: &[AssemblyIdentity],
    ) -> Result<Vec<u8>, RewriteError> {
        let inconsistent = |message: String| RewriteError::Inconsistent { message };

        let view = AssemblyView::from_mem(output)
            .map_err(|error| inconsistent(format!("output does not parse: {error}")))?;

        let actual = view
            .identity()
            .map_err(|error| inconsistent(format!("output identity unreadable: {error}")))?;
        if !actual.is_same_module(identity) {
            return Err(inconsistent(format!(
                "module identity changed from '{identity}' to '{actual}'"
            )));
        }

        let dependencies = view
            .dependencies()
            .map_err(|error| inconsistent(format!("output dependencies unreadable: {error}")))?;
        if dependencies.len() != expected.len() {
            return Err(inconsistent(format!(
                "expected {} dependencies, found {}",
                expected.len(),
                dependencies.len()
            )));
        }
        for (dependency, expected) in dependencies.iter().zip(expected) {
            if dependency.identity != *expected {
                return Err(inconsistent(format!(
                    "dependency {} is '{}', expected '{}'",
                    dependency.rid, dependency.identity, expected
                )));
            }
        }

        Ok(view.data().to_vec())
    }
}

impl ReferenceRewriter for MetadataRewriter {
    fn rewrite(&self, image: &[u8], mapping: &RewriteMapping) -> Result<Vec<u8>, RewriteError> {
        if mapping.is_empty() {
            return Ok(image.to_vec());
        }

        let view = AssemblyView::from_mem(image.to_vec())?;
        let Some(refs) = view.tables().table::<AssemblyRefRaw>()? else {
            log::debug!("image has no dependency table, nothing to rewrite");
            return Ok(image.to_vec());
        };

        let strings = view.strings();
        let blobs = view.blobs();
        let mut edits = Vec::new();
        let mut expected = Vec::with_capacity(refs.row_count() as usize);
        for row in refs.iter() {
            let current = row.to_identity(strings, blobs)?;
            match mapping.get(self.stable_name(&current.name)) {
                Some(live) => {
                    log::debug!(
                        "reference {} '{}' -> '{}'",
                        row.rid,
                        current.full_name(),
                        live.full_name()
                    );
                    expected.push(live.with_token());
                    edits.push((row, live));
                }
                None => {
                    log::debug!("reference {} '{}' kept", row.rid, current.full_name());
                    expected.push(current);
                }
            }
        }

        if edits.is_empty() {
            log::debug!("no reference matches the mapping, image left unchanged");
            return Ok(image.to_vec());
        }

        let metadata = Self::build_metadata(&view, &edits)?;
        let output = pe::place_metadata(&view, &metadata, self.update_checksum)?;

        if self.verify {
            let identity = view.identity()?;
            return Self::verify_output(output, &identity, &expected);
        }

        Ok(output)
    }
}

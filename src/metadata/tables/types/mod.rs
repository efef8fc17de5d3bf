//! Shared table infrastructure: table identifiers, row traits, and the generic table view.
//!
//! Rows are decoded lazily from the `#~` stream. The column widths of every row depend on
//! the heap size flags and on the row counts of referenced tables; [`TableInfo`] captures
//! both and is shared between all tables of one stream.

mod codedindex;
mod schema;
mod tableinfo;

pub use codedindex::CodedIndexType;
pub use schema::{columns, row_size, ColumnKind};
pub use tableinfo::{
    TableInfo, TableInfoRef, TableRowInfo, HEAP_LARGE_BLOB, HEAP_LARGE_GUID, HEAP_LARGE_STRINGS,
};

use std::marker::PhantomData;

use strum::{Display, EnumCount, EnumIter};

use crate::Result;

/// Identifiers of the ECMA-335 metadata tables (II.22).
///
/// Only the tables a compiled assembly can carry are listed. Images with valid bits beyond
/// [`TableId::GenericParamConstraint`] (portable PDB tables) are rejected as not supported.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, EnumIter, EnumCount, Display)]
#[allow(missing_docs)]
pub enum TableId {
    Module = 0x00,
    TypeRef = 0x01,
    TypeDef = 0x02,
    FieldPtr = 0x03,
    Field = 0x04,
    MethodPtr = 0x05,
    MethodDef = 0x06,
    ParamPtr = 0x07,
    Param = 0x08,
    InterfaceImpl = 0x09,
    MemberRef = 0x0A,
    Constant = 0x0B,
    CustomAttribute = 0x0C,
    FieldMarshal = 0x0D,
    DeclSecurity = 0x0E,
    ClassLayout = 0x0F,
    FieldLayout = 0x10,
    StandAloneSig = 0x11,
    EventMap = 0x12,
    EventPtr = 0x13,
    Event = 0x14,
    PropertyMap = 0x15,
    PropertyPtr = 0x16,
    Property = 0x17,
    MethodSemantics = 0x18,
    MethodImpl = 0x19,
    ModuleRef = 0x1A,
    TypeSpec = 0x1B,
    ImplMap = 0x1C,
    FieldRVA = 0x1D,
    EncLog = 0x1E,
    EncMap = 0x1F,
    Assembly = 0x20,
    AssemblyProcessor = 0x21,
    AssemblyOS = 0x22,
    AssemblyRef = 0x23,
    AssemblyRefProcessor = 0x24,
    AssemblyRefOS = 0x25,
    File = 0x26,
    ExportedType = 0x27,
    ManifestResource = 0x28,
    NestedClass = 0x29,
    GenericParam = 0x2A,
    MethodSpec = 0x2B,
    GenericParamConstraint = 0x2C,
}

impl TableId {
    /// Bit mask of all tables this crate understands in the `valid` vector.
    pub const SUPPORTED_MASK: u64 = (1 << (TableId::COUNT as u64)) - 1;

    /// Token prefix for rows of this table.
    #[must_use]
    pub fn token_base(self) -> u32 {
        (self as u32) << 24
    }
}

/// A row type that can be decoded from table data.
pub trait RowReadable: Sized + Send {
    /// Table this row type belongs to.
    const TABLE: TableId;

    /// Size in bytes of one row under the given index widths.
    fn row_size(sizes: &TableInfoRef) -> u32;

    /// Decodes one row at `offset`, advancing it. `rid` is the 1-based row id.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the row does not fit into `data`.
    fn row_read(data: &[u8], offset: &mut usize, rid: u32, sizes: &TableInfoRef) -> Result<Self>;
}

/// A row type that can be encoded back into table data.
pub trait RowWritable: RowReadable {
    /// Encodes this row at `offset`, advancing it.
    ///
    /// # Errors
    /// Returns an error if the row does not fit into `data`, or an index does not fit into
    /// its column width.
    fn row_write(&self, data: &mut [u8], offset: &mut usize, sizes: &TableInfoRef) -> Result<()>;
}

/// Typed view over the rows of one metadata table.
pub struct MetadataTable<'a, T> {
    data: &'a [u8],
    row_count: u32,
    row_size: u32,
    sizes: TableInfoRef,
    _phantom: PhantomData<T>,
}

impl<'a, T: RowReadable> MetadataTable<'a, T> {
    /// Creates a view over `row_count` rows at the start of `data`.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if `data` is too short for the rows.
    pub fn new(data: &'a [u8], row_count: u32, sizes: TableInfoRef) -> Result<Self> {
        let row_size = T::row_size(&sizes);
        let needed = u64::from(row_size) * u64::from(row_count);
        if needed > data.len() as u64 {
            return Err(out_of_bounds_error!());
        }

        Ok(MetadataTable {
            data,
            row_count,
            row_size,
            sizes,
            _phantom: PhantomData,
        })
    }

    /// Number of rows.
    #[must_use]
    pub fn row_count(&self) -> u32 {
        self.row_count
    }

    /// Size of a single row in bytes.
    #[must_use]
    pub fn row_size(&self) -> u32 {
        self.row_size
    }

    /// Total size of the table in bytes.
    #[must_use]
    pub fn size(&self) -> u64 {
        u64::from(self.row_size) * u64::from(self.row_count)
    }

    /// Returns the row with the 1-based id `rid`.
    #[must_use]
    pub fn get(&self, rid: u32) -> Option<T> {
        if rid == 0 || rid > self.row_count {
            return None;
        }

        let mut offset = (rid as usize - 1) * self.row_size as usize;
        T::row_read(self.data, &mut offset, rid, &self.sizes).ok()
    }

    /// Iterates over all rows in order.
    pub fn iter(&self) -> impl Iterator<Item = T> + '_ {
        (1..=self.row_count).filter_map(move |rid| self.get(rid))
    }
}

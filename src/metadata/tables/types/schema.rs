//! Column layout of every metadata table (ECMA-335 II.22).
//!
//! The layout is needed to locate tables inside the `#~` stream and to re-encode rows when
//! a heap index width changes.

use crate::metadata::tables::types::{CodedIndexType, TableId, TableInfo};

/// Kind of a single column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    /// Constant of the given byte width
    Fixed(u8),
    /// Index into `#Strings`
    Str,
    /// Index into `#GUID`
    Guid,
    /// Index into `#Blob`
    Blob,
    /// Simple index into a table
    Table(TableId),
    /// Coded index
    Coded(CodedIndexType),
}

impl ColumnKind {
    /// Width of this column under the given index widths.
    #[must_use]
    pub fn size(self, info: &TableInfo) -> u8 {
        match self {
            ColumnKind::Fixed(width) => width,
            ColumnKind::Str => info.str_bytes(),
            ColumnKind::Guid => info.guid_bytes(),
            ColumnKind::Blob => info.blob_bytes(),
            ColumnKind::Table(table) => info.table_index_bytes(table),
            ColumnKind::Coded(coded) => info.coded_index_bytes(coded),
        }
    }

    /// Returns `true` for heap index columns.
    #[must_use]
    pub fn is_heap_index(self) -> bool {
        matches!(self, ColumnKind::Str | ColumnKind::Guid | ColumnKind::Blob)
    }
}

use ColumnKind::{Blob, Coded, Fixed, Guid, Str, Table};

const U16: ColumnKind = Fixed(2);
const U32: ColumnKind = Fixed(4);

/// Returns the columns of `table` in storage order.
#[must_use]
pub fn columns(table: TableId) -> &'static [ColumnKind] {
    match table {
        TableId::Module => &[U16, Str, Guid, Guid, Guid],
        TableId::TypeRef => &[Coded(CodedIndexType::ResolutionScope), Str, Str],
        TableId::TypeDef => &[
            U32,
            Str,
            Str,
            Coded(CodedIndexType::TypeDefOrRef),
            Table(TableId::Field),
            Table(TableId::MethodDef),
        ],
        TableId::FieldPtr => &[Table(TableId::Field)],
        TableId::Field => &[U16, Str, Blob],
        TableId::MethodPtr => &[Table(TableId::MethodDef)],
        TableId::MethodDef => &[U32, U16, U16, Str, Blob, Table(TableId::Param)],
        TableId::ParamPtr => &[Table(TableId::Param)],
        TableId::Param => &[U16, U16, Str],
        TableId::InterfaceImpl => &[
            Table(TableId::TypeDef),
            Coded(CodedIndexType::TypeDefOrRef),
        ],
        TableId::MemberRef => &[Coded(CodedIndexType::MemberRefParent), Str, Blob],
        TableId::Constant => &[U16, Coded(CodedIndexType::HasConstant), Blob],
        TableId::CustomAttribute => &[
            Coded(CodedIndexType::HasCustomAttribute),
            Coded(CodedIndexType::CustomAttributeType),
            Blob,
        ],
        TableId::FieldMarshal => &[Coded(CodedIndexType::HasFieldMarshal), Blob],
        TableId::DeclSecurity => &[U16, Coded(CodedIndexType::HasDeclSecurity), Blob],
        TableId::ClassLayout => &[U16, U32, Table(TableId::TypeDef)],
        TableId::FieldLayout => &[U32, Table(TableId::Field)],
        TableId::StandAloneSig => &[Blob],
        TableId::EventMap => &[Table(TableId::TypeDef), Table(TableId::Event)],
        TableId::EventPtr => &[Table(TableId::Event)],
        TableId::Event => &[U16, Str, Coded(CodedIndexType::TypeDefOrRef)],
        TableId::PropertyMap => &[Table(TableId::TypeDef), Table(TableId::Property)],
        TableId::PropertyPtr => &[Table(TableId::Property)],
        TableId::Property => &[U16, Str, Blob],
        TableId::MethodSemantics => &[
            U16,
            Table(TableId::MethodDef),
            Coded(CodedIndexType::HasSemantics),
        ],
        TableId::MethodImpl => &[
            Table(TableId::TypeDef),
            Coded(CodedIndexType::MethodDefOrRef),
            Coded(CodedIndexType::MethodDefOrRef),
        ],
        TableId::ModuleRef => &[Str],
        TableId::TypeSpec => &[Blob],
        TableId::ImplMap => &[
            U16,
            Coded(CodedIndexType::MemberForwarded),
            Str,
            Table(TableId::ModuleRef),
        ],
        TableId::FieldRVA => &[U32, Table(TableId::Field)],
        TableId::EncLog => &[U32, U32],
        TableId::EncMap => &[U32],
        TableId::Assembly => &[U32, U16, U16, U16, U16, U32, Blob, Str, Str],
        TableId::AssemblyProcessor => &[U32],
        TableId::AssemblyOS => &[U32, U32, U32],
        TableId::AssemblyRef => &[U16, U16, U16, U16, U32, Blob, Str, Str, Blob],
        TableId::AssemblyRefProcessor => &[U32, Table(TableId::AssemblyRef)],
        TableId::AssemblyRefOS => &[U32, U32, U32, Table(TableId::AssemblyRef)],
        TableId::File => &[U32, Str, Blob],
        TableId::ExportedType => &[U32, U32, Str, Str, Coded(CodedIndexType::Implementation)],
        TableId::ManifestResource => &[U32, U32, Str, Coded(CodedIndexType::Implementation)],
        TableId::NestedClass => &[Table(TableId::TypeDef), Table(TableId::TypeDef)],
        TableId::GenericParam => &[
            U16,
            U16,
            Coded(CodedIndexType::TypeOrMethodDef),
            Str,
        ],
        TableId::MethodSpec => &[Coded(CodedIndexType::MethodDefOrRef), Blob],
        TableId::GenericParamConstraint => &[
            Table(TableId::GenericParam),
            Coded(CodedIndexType::TypeDefOrRef),
        ],
    }
}

/// Size of one row of `table` under the given index widths.
#[must_use]
pub fn row_size(table: TableId, info: &TableInfo) -> u32 {
    columns(table)
        .iter()
        .map(|column| u32::from(column.size(info)))
        .sum()
}

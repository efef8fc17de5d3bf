use strum::{EnumCount, EnumIter};

use crate::metadata::tables::TableId;

/// Coded index kinds (ECMA-335 II.24.2.6).
///
/// A coded index stores a table tag in its low bits and a row id in the rest; its width
/// depends on the largest table it can point into.
#[derive(Debug, Hash, Eq, PartialEq, Clone, Copy, EnumIter, EnumCount)]
#[repr(usize)]
#[allow(missing_docs)]
pub enum CodedIndexType {
    TypeDefOrRef,
    HasConstant,
    HasCustomAttribute,
    HasFieldMarshal,
    HasDeclSecurity,
    MemberRefParent,
    HasSemantics,
    MethodDefOrRef,
    MemberForwarded,
    Implementation,
    CustomAttributeType,
    ResolutionScope,
    TypeOrMethodDef,
}

impl CodedIndexType {
    /// Tables addressable by this coded index, in tag order.
    #[must_use]
    pub fn tables(&self) -> &'static [TableId] {
        match self {
            CodedIndexType::TypeDefOrRef => {
                &[TableId::TypeDef, TableId::TypeRef, TableId::TypeSpec]
            }
            CodedIndexType::HasConstant => &[TableId::Field, TableId::Param, TableId::Property],
            CodedIndexType::HasCustomAttribute => &[
                TableId::MethodDef,
                TableId::Field,
                TableId::TypeRef,
                TableId::TypeDef,
                TableId::Param,
                TableId::InterfaceImpl,
                TableId::MemberRef,
                TableId::Module,
                TableId::DeclSecurity,
                TableId::Property,
                TableId::Event,
                TableId::StandAloneSig,
                TableId::ModuleRef,
                TableId::TypeSpec,
                TableId::Assembly,
                TableId::AssemblyRef,
                TableId::File,
                TableId::ExportedType,
                TableId::ManifestResource,
                TableId::GenericParam,
                TableId::GenericParamConstraint,
                TableId::MethodSpec,
            ],
            CodedIndexType::HasFieldMarshal => &[TableId::Field, TableId::Param],
            CodedIndexType::HasDeclSecurity => {
                &[TableId::TypeDef, TableId::MethodDef, TableId::Assembly]
            }
            CodedIndexType::MemberRefParent => &[
                TableId::TypeDef,
                TableId::TypeRef,
                TableId::ModuleRef,
                TableId::MethodDef,
                TableId::TypeSpec,
            ],
            CodedIndexType::HasSemantics => &[TableId::Event, TableId::Property],
            CodedIndexType::MethodDefOrRef => &[TableId::MethodDef, TableId::MemberRef],
            CodedIndexType::MemberForwarded => &[TableId::Field, TableId::MethodDef],
            CodedIndexType::Implementation => {
                &[TableId::File, TableId::AssemblyRef, TableId::ExportedType]
            }
            // Tags 0, 1 and 4 are unused; only the tag count matters for the width
            CodedIndexType::CustomAttributeType => &[
                TableId::MethodDef,
                TableId::MethodDef,
                TableId::MethodDef,
                TableId::MemberRef,
                TableId::MemberRef,
            ],
            CodedIndexType::ResolutionScope => &[
                TableId::Module,
                TableId::ModuleRef,
                TableId::AssemblyRef,
                TableId::TypeRef,
            ],
            CodedIndexType::TypeOrMethodDef => &[TableId::TypeDef, TableId::MethodDef],
        }
    }

    /// Number of low bits used for the table tag.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn tag_bits(&self) -> u8 {
        let count = self.tables().len() as u32;
        // ceil(log2(count))
        (u32::BITS - (count - 1).leading_zeros()) as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn tag_bits() {
        assert_eq!(CodedIndexType::TypeDefOrRef.tag_bits(), 2);
        assert_eq!(CodedIndexType::HasCustomAttribute.tag_bits(), 5);
        assert_eq!(CodedIndexType::HasFieldMarshal.tag_bits(), 1);
        assert_eq!(CodedIndexType::MemberRefParent.tag_bits(), 3);
        assert_eq!(CodedIndexType::CustomAttributeType.tag_bits(), 3);
        assert_eq!(CodedIndexType::ResolutionScope.tag_bits(), 2);
        assert_eq!(CodedIndexType::iter().count(), CodedIndexType::COUNT);
    }
}

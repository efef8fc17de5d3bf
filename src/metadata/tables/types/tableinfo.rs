use std::sync::Arc;
use strum::{EnumCount, IntoEnumIterator};

use crate::{
    file::io::read_le_at,
    metadata::tables::types::{CodedIndexType, TableId},
    Error::OutOfBounds,
    Result,
};

/// `HeapSizes` bit for a 4-byte `#Strings` index.
pub const HEAP_LARGE_STRINGS: u8 = 0x01;
/// `HeapSizes` bit for a 4-byte `#GUID` index.
pub const HEAP_LARGE_GUID: u8 = 0x02;
/// `HeapSizes` bit for a 4-byte `#Blob` index.
pub const HEAP_LARGE_BLOB: u8 = 0x04;

/// Row count of one table and the derived index width.
#[derive(Clone, Copy, Default, PartialEq, Debug)]
pub struct TableRowInfo {
    /// Number of rows
    pub rows: u32,
    /// Bits needed to address every row; an empty table counts as 1
    pub bits: u8,
    /// `true` if a simple index into this table needs 4 bytes
    pub is_large: bool,
}

impl TableRowInfo {
    /// Derives the index width for `rows` rows.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn new(rows: u32) -> Self {
        let bits = if rows == 0 {
            1
        } else {
            (32 - rows.leading_zeros()) as u8
        };

        Self {
            rows,
            bits,
            is_large: rows > u32::from(u16::MAX),
        }
    }
}

/// Row counts and index widths of one `#~` stream.
#[derive(Clone, Debug)]
pub struct TableInfo {
    rows: Vec<TableRowInfo>,
    coded_indexes: Vec<u8>,
    heap_sizes: u8,
}

/// Shared reference to a [`TableInfo`].
pub type TableInfoRef = Arc<TableInfo>;

impl TableInfo {
    /// Reads the row count vector that follows the fixed 24-byte `#~` header.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] for a truncated header, or
    /// [`crate::Error::NotSupported`] if `valid_bitvec` names tables past
    /// [`TableId::GenericParamConstraint`].
    pub fn new(data: &[u8], valid_bitvec: u64) -> Result<Self> {
        if valid_bitvec & !TableId::SUPPORTED_MASK != 0 {
            return Err(crate::Error::NotSupported);
        }
        if data.len() < 24 {
            return Err(OutOfBounds);
        }

        let mut row_counts = [0u32; TableId::COUNT];
        let mut next_row_offset = 24;
        for table_id in TableId::iter() {
            if (valid_bitvec & (1 << table_id as usize)) == 0 {
                continue;
            }

            row_counts[table_id as usize] = read_le_at::<u32>(data, &mut next_row_offset)?;
        }

        Ok(Self::from_row_counts(&row_counts, data[6]))
    }

    /// Builds the widths from explicit row counts and a `HeapSizes` byte.
    #[must_use]
    pub fn from_row_counts(row_counts: &[u32; TableId::COUNT], heap_sizes: u8) -> Self {
        let mut table_info = TableInfo {
            rows: row_counts.iter().map(|&rows| TableRowInfo::new(rows)).collect(),
            coded_indexes: vec![0; CodedIndexType::COUNT],
            heap_sizes,
        };

        table_info.calculate_coded_index_bits();
        table_info
    }

    /// Table info with the given row counts and heap index widths.
    #[cfg(test)]
    pub fn new_test(
        valid_tables: &[(TableId, u32)],
        large_str: bool,
        large_blob: bool,
        large_guid: bool,
    ) -> Self {
        let mut row_counts = [0u32; TableId::COUNT];
        for (table, rows) in valid_tables {
            row_counts[*table as usize] = *rows;
        }

        let mut heap_sizes = 0;
        if large_str {
            heap_sizes |= HEAP_LARGE_STRINGS;
        }
        if large_guid {
            heap_sizes |= HEAP_LARGE_GUID;
        }
        if large_blob {
            heap_sizes |= HEAP_LARGE_BLOB;
        }

        Self::from_row_counts(&row_counts, heap_sizes)
    }

    /// The `HeapSizes` byte these widths were derived from.
    #[must_use]
    pub fn heap_sizes(&self) -> u8 {
        self.heap_sizes
    }

    /// Row count of `table`.
    #[must_use]
    pub fn row_count(&self, table: TableId) -> u32 {
        self.rows[table as usize].rows
    }

    /// Returns `true` if `#Strings` indexes are 4 bytes wide.
    #[must_use]
    pub fn is_large_str(&self) -> bool {
        self.heap_sizes & HEAP_LARGE_STRINGS != 0
    }

    /// Returns `true` if `#GUID` indexes are 4 bytes wide.
    #[must_use]
    pub fn is_large_guid(&self) -> bool {
        self.heap_sizes & HEAP_LARGE_GUID != 0
    }

    /// Returns `true` if `#Blob` indexes are 4 bytes wide.
    #[must_use]
    pub fn is_large_blob(&self) -> bool {
        self.heap_sizes & HEAP_LARGE_BLOB != 0
    }

    /// Width of a `#Strings` index.
    #[must_use]
    pub fn str_bytes(&self) -> u8 {
        if self.is_large_str() {
            4
        } else {
            2
        }
    }

    /// Width of a `#GUID` index.
    #[must_use]
    pub fn guid_bytes(&self) -> u8 {
        if self.is_large_guid() {
            4
        } else {
            2
        }
    }

    /// Width of a `#Blob` index.
    #[must_use]
    pub fn blob_bytes(&self) -> u8 {
        if self.is_large_blob() {
            4
        } else {
            2
        }
    }

    /// Width of a simple index into `table_id`.
    #[must_use]
    pub fn table_index_bytes(&self, table_id: TableId) -> u8 {
        if self.rows[table_id as usize].bits > 16 {
            4
        } else {
            2
        }
    }

    /// Width of a coded index.
    #[must_use]
    pub fn coded_index_bytes(&self, coded_index_type: CodedIndexType) -> u8 {
        if self.coded_indexes[coded_index_type as usize] > 16 {
            4
        } else {
            2
        }
    }

    fn calculate_coded_index_bits(&mut self) {
        for coded_index in CodedIndexType::iter() {
            let max_bits = coded_index
                .tables()
                .iter()
                .map(|table| self.rows[*table as usize].bits)
                .max()
                .unwrap_or(1);

            self.coded_indexes[coded_index as usize] = max_bits + coded_index.tag_bits();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_info() {
        assert_eq!(TableRowInfo::new(0).bits, 1);
        assert_eq!(TableRowInfo::new(1).bits, 1);
        assert_eq!(TableRowInfo::new(0xFFFF).bits, 16);
        assert!(!TableRowInfo::new(0xFFFF).is_large);
        assert!(TableRowInfo::new(0x1_0000).is_large);
    }

    #[test]
    fn widths() {
        let info = TableInfo::new_test(
            &[(TableId::TypeDef, 0x4000), (TableId::AssemblyRef, 2)],
            true,
            false,
            false,
        );

        assert_eq!(info.str_bytes(), 4);
        assert_eq!(info.blob_bytes(), 2);
        assert_eq!(info.guid_bytes(), 2);
        assert_eq!(info.table_index_bytes(TableId::TypeDef), 2);
        // 15 bits + 2 tag bits
        assert_eq!(info.coded_index_bytes(CodedIndexType::TypeDefOrRef), 4);
        assert_eq!(info.coded_index_bytes(CodedIndexType::ResolutionScope), 2);
        assert_eq!(info.row_count(TableId::AssemblyRef), 2);
    }

    #[test]
    fn parse_row_counts() {
        let mut data = vec![0u8; 24];
        data[6] = HEAP_LARGE_BLOB;
        data.extend_from_slice(&1u32.to_le_bytes()); // Module
        data.extend_from_slice(&3u32.to_le_bytes()); // AssemblyRef

        let valid = (1u64 << TableId::Module as u64) | (1u64 << TableId::AssemblyRef as u64);
        let info = TableInfo::new(&data, valid).unwrap();
        assert_eq!(info.row_count(TableId::Module), 1);
        assert_eq!(info.row_count(TableId::AssemblyRef), 3);
        assert!(info.is_large_blob());

        assert!(matches!(
            TableInfo::new(&data, valid | (1 << 0x30)),
            Err(crate::Error::NotSupported)
        ));
        assert!(TableInfo::new(&data[..26], valid).is_err());
    }
}

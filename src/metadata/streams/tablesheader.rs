use std::{ops::Range, sync::Arc};

use strum::{EnumCount, IntoEnumIterator};

use crate::{
    file::io::read_le,
    metadata::tables::{row_size, MetadataTable, RowReadable, TableId, TableInfo, TableInfoRef},
    Error::OutOfBounds,
    Result,
};

/// `HeapSizes` bit signalling four extra bytes after the row count vector.
const HEAP_EXTRA_DATA: u8 = 0x40;

/// Header of the compressed `#~` tables stream (ECMA-335 II.24.2.6) and the location of
/// every table it contains.
///
/// ```rust,ignore
/// let tables = TablesHeader::from(stream_data)?;
/// if let Some(refs) = tables.table::<AssemblyRefRaw>()? {
///     for row in refs.iter() {
///         println!("{}", row.name);
///     }
/// }
/// ```
pub struct TablesHeader<'a> {
    /// Major version of the table schema, 2
    pub major_version: u8,
    /// Minor version of the table schema, 0
    pub minor_version: u8,
    /// Bit vector of present tables
    pub valid: u64,
    /// Bit vector of sorted tables
    pub sorted: u64,
    /// Row counts and index widths
    pub info: TableInfoRef,
    /// Offset of the first table row within the stream
    pub tables_offset: usize,
    data: &'a [u8],
    ranges: [Option<Range<usize>>; TableId::COUNT],
}

impl<'a> TablesHeader<'a> {
    /// Parses the header and locates all tables inside `data`.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the tables do not fit into the stream,
    /// [`crate::Error::NotSupported`] for unknown tables, or a malformed error for a stream
    /// without any table.
    pub fn from(data: &'a [u8]) -> Result<TablesHeader<'a>> {
        if data.len() < 24 {
            return Err(OutOfBounds);
        }

        let valid_bitvec = read_le::<u64>(&data[8..])?;
        if valid_bitvec == 0 {
            return Err(malformed_error!("No valid rows in any of the tables"));
        }

        let info = TableInfo::new(data, valid_bitvec)?;
        let mut tables_offset = 24 + valid_bitvec.count_ones() as usize * 4;
        if info.heap_sizes() & HEAP_EXTRA_DATA != 0 {
            tables_offset += 4;
        }

        let mut ranges: [Option<Range<usize>>; TableId::COUNT] = std::array::from_fn(|_| None);
        let mut current_offset = tables_offset;
        for table_id in TableId::iter() {
            let rows = info.row_count(table_id);
            if rows == 0 {
                continue;
            }

            let size = row_size(table_id, &info) as usize * rows as usize;
            let Some(end) = current_offset.checked_add(size) else {
                return Err(OutOfBounds);
            };
            if end > data.len() {
                return Err(OutOfBounds);
            }

            ranges[table_id as usize] = Some(current_offset..end);
            current_offset = end;
        }

        Ok(TablesHeader {
            major_version: data[4],
            minor_version: data[5],
            valid: valid_bitvec,
            sorted: read_le::<u64>(&data[16..])?,
            info: Arc::new(info),
            tables_offset,
            data,
            ranges,
        })
    }

    /// Number of tables present.
    #[must_use]
    pub fn table_count(&self) -> u32 {
        self.valid.count_ones()
    }

    /// Returns `true` if `table_id` has at least one row.
    #[must_use]
    pub fn has_table(&self, table_id: TableId) -> bool {
        self.ranges[table_id as usize].is_some()
    }

    /// Row count of `table_id`.
    #[must_use]
    pub fn table_row_count(&self, table_id: TableId) -> u32 {
        self.info.row_count(table_id)
    }

    /// Byte range of `table_id` within the stream.
    #[must_use]
    pub fn table_range(&self, table_id: TableId) -> Option<Range<usize>> {
        self.ranges[table_id as usize].clone()
    }

    /// End offset of the last table within the stream.
    #[must_use]
    pub fn tables_end(&self) -> usize {
        self.ranges
            .iter()
            .flatten()
            .map(|range| range.end)
            .max()
            .unwrap_or(self.tables_offset)
    }

    /// The raw stream bytes.
    #[must_use]
    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    /// Typed view of the table for row type `T`, if present.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the table data is truncated.
    pub fn table<T: RowReadable>(&self) -> Result<Option<MetadataTable<'a, T>>> {
        match &self.ranges[T::TABLE as usize] {
            Some(range) => Ok(Some(MetadataTable::new(
                &self.data[range.clone()],
                self.info.row_count(T::TABLE),
                self.info.clone(),
            )?)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::tables::AssemblyRefRaw;

    fn stream() -> Vec<u8> {
        let mut data = vec![0u8; 24];
        data[4] = 2;
        let valid = (1u64 << TableId::Module as u64) | (1u64 << TableId::AssemblyRef as u64);
        data[8..16].copy_from_slice(&valid.to_le_bytes());
        data.extend_from_slice(&1u32.to_le_bytes());
        data.extend_from_slice(&2u32.to_le_bytes());
        // Module row
        data.extend_from_slice(&[0u8; 10]);
        // Two AssemblyRef rows
        for name in [0x10u16, 0x20] {
            data.extend_from_slice(&[1, 0, 0, 0, 0, 0, 0, 0]);
            data.extend_from_slice(&0u32.to_le_bytes());
            data.extend_from_slice(&0u16.to_le_bytes());
            data.extend_from_slice(&name.to_le_bytes());
            data.extend_from_slice(&0u16.to_le_bytes());
            data.extend_from_slice(&0u16.to_le_bytes());
        }
        data
    }

    #[test]
    fn crafted() {
        let data = stream();
        let header = TablesHeader::from(&data).unwrap();

        assert_eq!(header.major_version, 2);
        assert_eq!(header.table_count(), 2);
        assert_eq!(header.tables_offset, 32);
        assert_eq!(header.table_range(TableId::Module), Some(32..42));
        assert_eq!(header.table_range(TableId::AssemblyRef), Some(42..82));
        assert_eq!(header.tables_end(), 82);
        assert!(!header.has_table(TableId::TypeRef));

        let refs = header.table::<AssemblyRefRaw>().unwrap().unwrap();
        let names: Vec<u32> = refs.iter().map(|row| row.name).collect();
        assert_eq!(names, vec![0x10, 0x20]);
    }

    #[test]
    fn truncated() {
        let data = stream();
        assert!(matches!(
            TablesHeader::from(&data[..70]),
            Err(OutOfBounds)
        ));

        let mut empty = data.clone();
        empty[8..16].copy_from_slice(&[0; 8]);
        assert!(TablesHeader::from(&empty).is_err());
    }
}

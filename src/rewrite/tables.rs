//! Schema-driven encoding of the `#~` stream.
//!
//! When a heap crosses the 2-byte index limit every heap index column of every table grows,
//! so the stream has to be rebuilt row by row. Rows are decoded into their column values
//! with the old widths and encoded again with the new ones; nothing but the column widths
//! changes.

use std::sync::Arc;

use strum::{EnumCount, IntoEnumIterator};

use crate::{
    file::io::{patch_le, read_le_at},
    metadata::{
        streams::TablesHeader,
        tables::{columns, row_size, TableId, TableInfo, TableInfoRef},
    },
    Error::OutOfBounds,
    Result,
};

/// Offset of the `HeapSizes` byte in the `#~` header.
pub const HEAP_SIZES_OFFSET: usize = 6;

/// Decodes one row of `table` at `offset` into its column values, advancing `offset`.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if the row does not fit into `data`.
pub fn read_row(
    table: TableId,
    data: &[u8],
    offset: &mut usize,
    info: &TableInfo,
) -> Result<Vec<u32>> {
    columns(table)
        .iter()
        .map(|column| match column.size(info) {
            1 => read_le_at::<u8>(data, offset).map(u32::from),
            2 => read_le_at::<u16>(data, offset).map(u32::from),
            _ => read_le_at::<u32>(data, offset),
        })
        .collect()
}

/// Encodes one row of `table` from its column values.
///
/// # Errors
/// Returns a malformed error if the value count does not match the schema or a value does
/// not fit into its column.
pub fn write_row(table: TableId, values: &[u32], out: &mut Vec<u8>, info: &TableInfo) -> Result<()> {
    let schema = columns(table);
    if schema.len() != values.len() {
        return Err(malformed_error!(
            "Table {} expects {} columns, got {}",
            table,
            schema.len(),
            values.len()
        ));
    }

    for (column, &value) in schema.iter().zip(values) {
        let width = column.size(info);
        let fits = match width {
            1 => value <= u32::from(u8::MAX),
            2 => value <= u32::from(u16::MAX),
            _ => true,
        };
        if !fits {
            return Err(malformed_error!(
                "Value {} does not fit into a {}-byte column of table {}",
                value,
                width,
                table
            ));
        }
        out.extend_from_slice(&value.to_le_bytes()[..width as usize]);
    }

    Ok(())
}

/// Rebuilds the `#~` stream with a new `HeapSizes` byte, re-encoding every row.
///
/// The returned stream is padded to 4 bytes; its row counts and table order are those of
/// `header`. Returns the new stream and the index widths it was encoded with.
///
/// # Errors
/// Returns an error if a row cannot be decoded, or a value does not fit the new widths.
pub fn reencode_tables(header: &TablesHeader, heap_sizes: u8) -> Result<(Vec<u8>, TableInfoRef)> {
    let data = header.data();
    if header.tables_offset > data.len() {
        return Err(OutOfBounds);
    }

    let mut row_counts = [0u32; TableId::COUNT];
    for table in TableId::iter() {
        row_counts[table as usize] = header.table_row_count(table);
    }
    let new_info = Arc::new(TableInfo::from_row_counts(&row_counts, heap_sizes));

    let mut out = Vec::with_capacity(data.len() * 2);
    out.extend_from_slice(&data[..header.tables_offset]);
    patch_le(&mut out, HEAP_SIZES_OFFSET, heap_sizes)?;

    for table in TableId::iter() {
        let Some(range) = header.table_range(table) else {
            continue;
        };

        let mut offset = range.start;
        for _ in 0..header.table_row_count(table) {
            let values = read_row(table, data, &mut offset, &header.info)?;
            write_row(table, &values, &mut out, &new_info)?;
        }

        debug_assert_eq!(offset, range.end);
    }

    let expected = header.tables_offset
        + TableId::iter()
            .map(|table| row_size(table, &new_info) as usize * row_counts[table as usize] as usize)
            .sum::<usize>();
    if out.len() != expected {
        return Err(malformed_error!(
            "Re-encoded tables are {} bytes, expected {}",
            out.len(),
            expected
        ));
    }

    let padded = out.len().div_ceil(4) * 4;
    out.resize(padded, 0);

    Ok((out, new_info))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::tables::{AssemblyRefRaw, HEAP_LARGE_STRINGS};

    fn stream() -> Vec<u8> {
        let mut data = vec![0u8; 24];
        data[4] = 2;
        let valid = (1u64 << TableId::Module as u64)
            | (1u64 << TableId::TypeRef as u64)
            | (1u64 << TableId::AssemblyRef as u64);
        data[8..16].copy_from_slice(&valid.to_le_bytes());
        for rows in [1u32, 1, 1] {
            data.extend_from_slice(&rows.to_le_bytes());
        }

        let info = TableInfo::new_test(
            &[(TableId::Module, 1), (TableId::TypeRef, 1), (TableId::AssemblyRef, 1)],
            false,
            false,
            false,
        );
        write_row(TableId::Module, &[0, 0x0A, 1, 0, 0], &mut data, &info).unwrap();
        write_row(TableId::TypeRef, &[(1 << 2) | 2, 0x20, 0x30], &mut data, &info).unwrap();
        write_row(
            TableId::AssemblyRef,
            &[1, 2, 3, 4, 0, 0, 0x40, 0, 0],
            &mut data,
            &info,
        )
        .unwrap();
        data
    }

    #[test]
    fn row_round_trip() {
        let info = TableInfo::new_test(&[(TableId::AssemblyRef, 3)], false, false, false);
        let mut out = Vec::new();
        write_row(TableId::TypeRef, &[0x0E, 0x1234, 0x10], &mut out, &info).unwrap();
        assert_eq!(out.len(), 6);

        let mut offset = 0;
        assert_eq!(
            read_row(TableId::TypeRef, &out, &mut offset, &info).unwrap(),
            vec![0x0E, 0x1234, 0x10]
        );
        assert_eq!(offset, 6);
    }

    #[test]
    fn row_write_rejects() {
        let info = TableInfo::new_test(&[], false, false, false);
        let mut out = Vec::new();
        assert!(write_row(TableId::TypeRef, &[0, 0x1_0000, 0], &mut out, &info).is_err());
        assert!(write_row(TableId::TypeRef, &[0, 0], &mut out, &info).is_err());
    }

    #[test]
    fn widen_strings() {
        let data = stream();
        let header = TablesHeader::from(&data).unwrap();
        let (widened, info) = reencode_tables(&header, HEAP_LARGE_STRINGS).unwrap();

        assert!(info.is_large_str());
        assert_eq!(widened[HEAP_SIZES_OFFSET], HEAP_LARGE_STRINGS);
        assert_eq!(widened.len() % 4, 0);

        let reparsed = TablesHeader::from(&widened).unwrap();
        assert_eq!(reparsed.table_row_count(TableId::TypeRef), 1);

        // Module 2 + 4 + 2 + 2 + 2, TypeRef 2 + 4 + 4
        assert_eq!(reparsed.table_range(TableId::Module).map(|r| r.len()), Some(12));
        assert_eq!(reparsed.table_range(TableId::TypeRef).map(|r| r.len()), Some(10));

        let typeref = reparsed.table_range(TableId::TypeRef).unwrap();
        let mut offset = typeref.start;
        assert_eq!(
            read_row(TableId::TypeRef, &widened, &mut offset, &reparsed.info).unwrap(),
            vec![(1 << 2) | 2, 0x20, 0x30]
        );

        let refs = reparsed.table::<AssemblyRefRaw>().unwrap().unwrap();
        let row = refs.get(1).unwrap();
        assert_eq!(row.name, 0x40);
        assert_eq!(row.version().to_string(), "1.2.3.4");
    }
}

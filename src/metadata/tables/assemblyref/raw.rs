use crate::{
    file::io::{read_le_at, read_le_at_dyn, write_le_at, write_le_at_dyn},
    metadata::{
        identity::{AssemblyIdentity, AssemblyVersion, Identity},
        streams::{Blob, Strings},
        tables::{AssemblyFlags, RowReadable, RowWritable, TableId, TableInfoRef},
        token::Token,
    },
    Result,
};

#[derive(Clone, Debug, PartialEq, Eq)]
/// The `AssemblyRef` table holds one entry per referenced assembly, 0x23
pub struct AssemblyRefRaw {
    /// `RowID`
    pub rid: u32,
    /// `Token`
    pub token: Token,
    /// Offset
    pub offset: usize,
    /// a 2-byte constant
    pub major_version: u16,
    /// a 2-byte constant
    pub minor_version: u16,
    /// a 2-byte constant
    pub build_number: u16,
    /// a 2-byte constant
    pub revision_number: u16,
    /// a 4-byte bitmask of type `AssemblyFlags`
    pub flags: u32,
    /// an index into the Blob heap, a public key or token
    pub public_key_or_token: u32,
    /// an index into the String heap
    pub name: u32,
    /// an index into the String heap
    pub culture: u32,
    /// an index into the Blob heap
    pub hash_value: u32,
}

impl AssemblyRefRaw {
    /// Resolves the heap indexes into the referenced identity.
    ///
    /// # Errors
    /// Returns an error if a heap index is invalid or a token blob is truncated.
    pub fn to_identity(&self, strings: &Strings, blob: &Blob) -> Result<AssemblyIdentity> {
        let culture = match strings.get(self.culture as usize)? {
            "" => None,
            culture => Some(culture.to_string()),
        };

        let strong_name = match blob.get(self.public_key_or_token as usize)? {
            [] => None,
            data => Some(Identity::from(
                data,
                AssemblyFlags::from_bits_retain(self.flags).contains(AssemblyFlags::PUBLIC_KEY),
            )?),
        };

        Ok(AssemblyIdentity {
            name: strings.get(self.name as usize)?.to_string(),
            version: self.version(),
            culture,
            strong_name,
        })
    }

    /// The referenced version.
    #[must_use]
    pub fn version(&self) -> AssemblyVersion {
        AssemblyVersion::new(
            self.major_version,
            self.minor_version,
            self.build_number,
            self.revision_number,
        )
    }
}

impl RowReadable for AssemblyRefRaw {
    const TABLE: TableId = TableId::AssemblyRef;

    #[rustfmt::skip]
    fn row_size(sizes: &TableInfoRef) -> u32 {
        u32::from(
            /* major_version */       2 +
            /* minor_version */       2 +
            /* build_number */        2 +
            /* revision_number */     2 +
            /* flags */               4 +
            /* public_key_or_token */ sizes.blob_bytes() +
            /* name */                sizes.str_bytes() +
            /* culture */             sizes.str_bytes() +
            /* hash_value */          sizes.blob_bytes()
        )
    }

    fn row_read(data: &[u8], offset: &mut usize, rid: u32, sizes: &TableInfoRef) -> Result<Self> {
        Ok(AssemblyRefRaw {
            rid,
            token: Token::new(TableId::AssemblyRef.token_base() + rid),
            offset: *offset,
            major_version: read_le_at::<u16>(data, offset)?,
            minor_version: read_le_at::<u16>(data, offset)?,
            build_number: read_le_at::<u16>(data, offset)?,
            revision_number: read_le_at::<u16>(data, offset)?,
            flags: read_le_at::<u32>(data, offset)?,
            public_key_or_token: read_le_at_dyn(data, offset, sizes.is_large_blob())?,
            name: read_le_at_dyn(data, offset, sizes.is_large_str())?,
            culture: read_le_at_dyn(data, offset, sizes.is_large_str())?,
            hash_value: read_le_at_dyn(data, offset, sizes.is_large_blob())?,
        })
    }
}

impl RowWritable for AssemblyRefRaw {
    fn row_write(&self, data: &mut [u8], offset: &mut usize, sizes: &TableInfoRef) -> Result<()> {
        write_le_at(data, offset, self.major_version)?;
        write_le_at(data, offset, self.minor_version)?;
        write_le_at(data, offset, self.build_number)?;
        write_le_at(data, offset, self.revision_number)?;
        write_le_at(data, offset, self.flags)?;
        write_le_at_dyn(data, offset, self.public_key_or_token, sizes.is_large_blob())?;
        write_le_at_dyn(data, offset, self.name, sizes.is_large_str())?;
        write_le_at_dyn(data, offset, self.culture, sizes.is_large_str())?;
        write_le_at_dyn(data, offset, self.hash_value, sizes.is_large_blob())?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::metadata::tables::{MetadataTable, TableInfo};

    #[test]
    fn crafted_short() {
        let data = vec![
            0x01, 0x01, // major_version
            0x02, 0x02, // minor_version
            0x03, 0x03, // build_number
            0x04, 0x04, // revision_number
            0x05, 0x05, 0x05, 0x05, // flags
            0x06, 0x06, // public_key_or_token
            0x07, 0x07, // name
            0x08, 0x08, // culture
            0x09, 0x09, // hash_value
        ];

        let sizes = Arc::new(TableInfo::new_test(
            &[(TableId::AssemblyRef, 1)],
            false,
            false,
            false,
        ));
        let table = MetadataTable::<AssemblyRefRaw>::new(&data, 1, sizes.clone()).unwrap();

        let row = table.get(1).unwrap();
        assert_eq!(row.rid, 1);
        assert_eq!(row.token.value(), 0x23000001);
        assert_eq!(row.major_version, 0x0101);
        assert_eq!(row.minor_version, 0x0202);
        assert_eq!(row.build_number, 0x0303);
        assert_eq!(row.revision_number, 0x0404);
        assert_eq!(row.flags, 0x05050505);
        assert_eq!(row.public_key_or_token, 0x0606);
        assert_eq!(row.name, 0x0707);
        assert_eq!(row.culture, 0x0808);
        assert_eq!(row.hash_value, 0x0909);

        let mut written = vec![0u8; data.len()];
        let mut offset = 0;
        row.row_write(&mut written, &mut offset, &sizes).unwrap();
        assert_eq!(written, data);
        assert_eq!(offset, data.len());
    }

    #[test]
    fn crafted_long() {
        let data = vec![
            0x01, 0x01, // major_version
            0x02, 0x02, // minor_version
            0x03, 0x03, // build_number
            0x04, 0x04, // revision_number
            0x05, 0x05, 0x05, 0x05, // flags
            0x06, 0x06, 0x06, 0x06, // public_key_or_token
            0x07, 0x07, 0x07, 0x07, // name
            0x08, 0x08, 0x08, 0x08, // culture
            0x09, 0x09, 0x09, 0x09, // hash_value
        ];

        let sizes = Arc::new(TableInfo::new_test(
            &[(TableId::AssemblyRef, 1)],
            true,
            true,
            true,
        ));
        let table = MetadataTable::<AssemblyRefRaw>::new(&data, 1, sizes).unwrap();

        let row = table.get(1).unwrap();
        assert_eq!(row.public_key_or_token, 0x06060606);
        assert_eq!(row.name, 0x07070707);
        assert_eq!(row.culture, 0x08080808);
        assert_eq!(row.hash_value, 0x09090909);
    }

    #[test]
    fn narrow_column_overflow() {
        let sizes = Arc::new(TableInfo::new_test(
            &[(TableId::AssemblyRef, 1)],
            false,
            false,
            false,
        ));
        let row = AssemblyRefRaw {
            rid: 1,
            token: Token::new(0x2300_0001),
            offset: 0,
            major_version: 1,
            minor_version: 0,
            build_number: 0,
            revision_number: 0,
            flags: 0,
            public_key_or_token: 0,
            name: 0x1_0000,
            culture: 0,
            hash_value: 0,
        };

        let mut written = vec![0u8; 20];
        assert!(row.row_write(&mut written, &mut 0, &sizes).is_err());
    }

    #[test]
    fn identity() {
        let strings = Strings::from(b"\0Combat\0").unwrap();
        let blob_data = [0x00, 0x08, 0xB7, 0x7A, 0x5C, 0x56, 0x19, 0x34, 0xE0, 0x89];
        let blob = Blob::from(&blob_data).unwrap();

        let row = AssemblyRefRaw {
            rid: 1,
            token: Token::new(0x2300_0001),
            offset: 0,
            major_version: 1,
            minor_version: 0,
            build_number: 0,
            revision_number: 0,
            flags: 0,
            public_key_or_token: 1,
            name: 1,
            culture: 0,
            hash_value: 0,
        };

        let identity = row.to_identity(&strings, &blob).unwrap();
        assert_eq!(
            identity.full_name(),
            "Combat, Version=1.0.0.0, Culture=neutral, PublicKeyToken=b77a5c561934e089"
        );
    }
}

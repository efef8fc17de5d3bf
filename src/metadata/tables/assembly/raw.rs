use crate::{
    file::io::{read_le_at, read_le_at_dyn},
    metadata::{
        identity::{AssemblyIdentity, AssemblyVersion, Identity},
        streams::{Blob, Strings},
        tables::{AssemblyHashAlgorithm, RowReadable, TableId, TableInfoRef},
        token::Token,
    },
    Result,
};

#[derive(Clone, Debug)]
/// The `Assembly` table holds the identity of the current module, 0x20
pub struct AssemblyRaw {
    /// `RowID`
    pub rid: u32,
    /// `Token`
    pub token: Token,
    /// Offset
    pub offset: usize,
    /// a 4-byte constant of type `AssemblyHashAlgorithm`
    pub hash_alg_id: u32,
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
    /// an index into the Blob heap
    pub public_key: u32,
    /// an index into the String heap
    pub name: u32,
    /// an index into the String heap
    pub culture: u32,
}

impl AssemblyRaw {
    /// Resolves the heap indexes into the assembly's identity.
    ///
    /// The public key column always holds a full key. It is reduced to its SHA1 token, the
    /// form references carry, regardless of `hash_alg_id` (which governs file hashes).
    ///
    /// # Errors
    /// Returns an error if a heap index is invalid.
    pub fn to_identity(&self, strings: &Strings, blob: &Blob) -> Result<AssemblyIdentity> {
        let culture = match strings.get(self.culture as usize)? {
            "" => None,
            culture => Some(culture.to_string()),
        };

        let strong_name = match blob.get(self.public_key as usize)? {
            [] => None,
            key => {
                let identity = Identity::from(key, true)?;
                Some(Identity::Token(identity.to_token(AssemblyHashAlgorithm::SHA1)?))
            }
        };

        Ok(AssemblyIdentity {
            name: strings.get(self.name as usize)?.to_string(),
            version: AssemblyVersion::new(
                self.major_version,
                self.minor_version,
                self.build_number,
                self.revision_number,
            ),
            culture,
            strong_name,
        })
    }
}

impl RowReadable for AssemblyRaw {
    const TABLE: TableId = TableId::Assembly;

    #[rustfmt::skip]
    fn row_size(sizes: &TableInfoRef) -> u32 {
        u32::from(
            /* hash_alg_id */       4 +
            /* major_version */     2 +
            /* minor_version */     2 +
            /* build_number */      2 +
            /* revision_number */   2 +
            /* flags */             4 +
            /* public_key */        sizes.blob_bytes() +
            /* name */              sizes.str_bytes() +
            /* culture */           sizes.str_bytes()
        )
    }

    fn row_read(data: &[u8], offset: &mut usize, rid: u32, sizes: &TableInfoRef) -> Result<Self> {
        Ok(AssemblyRaw {
            rid,
            token: Token::new(TableId::Assembly.token_base() + rid),
            offset: *offset,
            hash_alg_id: read_le_at::<u32>(data, offset)?,
            major_version: read_le_at::<u16>(data, offset)?,
            minor_version: read_le_at::<u16>(data, offset)?,
            build_number: read_le_at::<u16>(data, offset)?,
            revision_number: read_le_at::<u16>(data, offset)?,
            flags: read_le_at::<u32>(data, offset)?,
            public_key: read_le_at_dyn(data, offset, sizes.is_large_blob())?,
            name: read_le_at_dyn(data, offset, sizes.is_large_str())?,
            culture: read_le_at_dyn(data, offset, sizes.is_large_str())?,
        })
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
            0x01, 0x01, 0x01, 0x01, // hash_alg_id
            0x02, 0x02, // major_version
            0x03, 0x03, // minor_version
            0x04, 0x04, // build_number
            0x05, 0x05, // revision_number
            0x06, 0x06, 0x06, 0x06, // flags
            0x07, 0x07, // public_key
            0x08, 0x08, // name
            0x09, 0x09, // culture
        ];

        let sizes = Arc::new(TableInfo::new_test(
            &[(TableId::Assembly, 1)],
            false,
            false,
            false,
        ));
        let table = MetadataTable::<AssemblyRaw>::new(&data, 1, sizes).unwrap();

        let row = table.get(1).unwrap();
        assert_eq!(row.rid, 1);
        assert_eq!(row.token.value(), 0x20000001);
        assert_eq!(row.hash_alg_id, 0x01010101);
        assert_eq!(row.major_version, 0x0202);
        assert_eq!(row.minor_version, 0x0303);
        assert_eq!(row.build_number, 0x0404);
        assert_eq!(row.revision_number, 0x0505);
        assert_eq!(row.flags, 0x06060606);
        assert_eq!(row.public_key, 0x0707);
        assert_eq!(row.name, 0x0808);
        assert_eq!(row.culture, 0x0909);
        assert!(table.get(2).is_none());
    }

    #[test]
    fn crafted_long() {
        let data = vec![
            0x01, 0x01, 0x01, 0x01, // hash_alg_id
            0x02, 0x02, // major_version
            0x03, 0x03, // minor_version
            0x04, 0x04, // build_number
            0x05, 0x05, // revision_number
            0x06, 0x06, 0x06, 0x06, // flags
            0x07, 0x07, 0x07, 0x07, // public_key
            0x08, 0x08, 0x08, 0x08, // name
            0x09, 0x09, 0x09, 0x09, // culture
        ];

        let sizes = Arc::new(TableInfo::new_test(
            &[(TableId::Assembly, 1)],
            true,
            true,
            true,
        ));
        let table = MetadataTable::<AssemblyRaw>::new(&data, 1, sizes).unwrap();

        let row = table.get(1).unwrap();
        assert_eq!(row.public_key, 0x07070707);
        assert_eq!(row.name, 0x08080808);
        assert_eq!(row.culture, 0x09090909);
    }

    #[test]
    fn identity() {
        let strings_data = b"\0Dynamic.Combat\0en-US\0";
        let blob_data = [0x00];
        let strings = Strings::from(strings_data).unwrap();
        let blob = Blob::from(&blob_data).unwrap();

        let row = AssemblyRaw {
            rid: 1,
            token: Token::new(0x2000_0001),
            offset: 0,
            hash_alg_id: 0x8004,
            major_version: 2,
            minor_version: 0,
            build_number: 0,
            revision_number: 0,
            flags: 0,
            public_key: 0,
            name: 1,
            culture: 16,
        };

        let identity = row.to_identity(&strings, &blob).unwrap();
        assert_eq!(identity.name, "Dynamic.Combat");
        assert_eq!(identity.culture.as_deref(), Some("en-US"));
        assert!(identity.strong_name.is_none());
        assert_eq!(
            identity.full_name(),
            "Dynamic.Combat, Version=2.0.0.0, Culture=en-US, PublicKeyToken=null"
        );
    }
}

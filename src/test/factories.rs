//! Synthetic .NET assembly images.
//!
//! Layout of a built image (PE32, file alignment 0x200, section alignment 0x2000):
//!
//! ```text
//! 0x000  DOS header, e_lfanew = 0x80
//! 0x080  PE signature, COFF header, optional header (16 data directories)
//! 0x178  section table
//! 0x200  .text  (RVA 0x2000): CLI header, metadata root, streams, debug directory
//! ....   extra sections, 0x200 bytes each
//! ```
//!
//! The metadata carries the streams `#~`, `#Strings`, `#US`, `#GUID`, `#Blob` in that order and
//! the tables `Module`, `TypeRef`, `Assembly` and `AssemblyRef`.

use strum::EnumCount;

use crate::{
    file::io::patch_le,
    metadata::{
        root::{Root, CIL_HEADER_MAGIC},
        streams::{StreamHeader, Strings},
        tables::{TableId, TableInfo, HEAP_LARGE_STRINGS},
    },
    rewrite::{
        heaps::{align_to, BlobHeapBuilder, StringHeapBuilder},
        pe::pe_checksum,
        tables::write_row,
    },
};

const PE_POINTER: usize = 0x80;
const OPTIONAL_HEADER: usize = PE_POINTER + 4 + 20;
const OPTIONAL_HEADER_SIZE: usize = 0xE0;
const SECTION_TABLE: usize = OPTIONAL_HEADER + OPTIONAL_HEADER_SIZE;
const FILE_ALIGNMENT: usize = 0x200;
const SECTION_ALIGNMENT: usize = 0x2000;
const TEXT_RVA: usize = 0x2000;
const CLI_HEADER_SIZE: usize = 72;
const RUNTIME_VERSION: &str = "v4.0.30319";
const DEBUG_ENTRY_SIZE: usize = 28;

struct Reference {
    name: String,
    version: (u16, u16, u16, u16),
    blob: Vec<u8>,
    flags: u32,
}

struct Section {
    name: [u8; 8],
    data: Vec<u8>,
    characteristics: u32,
}

/// Builder for a minimal PE32 .NET assembly image.
pub struct AssemblyBuilder {
    name: String,
    version: (u16, u16, u16, u16),
    culture: String,
    public_key: Vec<u8>,
    references: Vec<Reference>,
    type_refs: Vec<(u32, String, String)>,
    extra_sections: usize,
    string_padding: usize,
    debug_directory: bool,
    checksum: bool,
}

impl AssemblyBuilder {
    /// An assembly `name`, version 1.0.0.0, neutral, unsigned, without references.
    pub fn new(name: &str) -> Self {
        AssemblyBuilder {
            name: name.to_string(),
            version: (1, 0, 0, 0),
            culture: String::new(),
            public_key: Vec::new(),
            references: Vec::new(),
            type_refs: Vec::new(),
            extra_sections: 0,
            string_padding: 0,
            debug_directory: false,
            checksum: false,
        }
    }

    pub fn version(mut self, major: u16, minor: u16, build: u16, revision: u16) -> Self {
        self.version = (major, minor, build, revision);
        self
    }

    pub fn culture(mut self, culture: &str) -> Self {
        self.culture = culture.to_string();
        self
    }

    /// Signs the assembly with `key`.
    pub fn public_key(mut self, key: &[u8]) -> Self {
        self.public_key = key.to_vec();
        self
    }

    /// Adds an `AssemblyRef` row without strong name.
    pub fn reference(self, name: &str, version: (u16, u16, u16, u16)) -> Self {
        self.push_reference(name, version, Vec::new(), 0)
    }

    /// Adds an `AssemblyRef` row carrying a public key token.
    pub fn reference_with_token(
        self,
        name: &str,
        version: (u16, u16, u16, u16),
        token: [u8; 8],
    ) -> Self {
        self.push_reference(name, version, token.to_vec(), 0)
    }

    /// Adds an `AssemblyRef` row carrying a full public key.
    pub fn reference_with_public_key(
        self,
        name: &str,
        version: (u16, u16, u16, u16),
        key: &[u8],
    ) -> Self {
        self.push_reference(name, version, key.to_vec(), 0x0001)
    }

    /// Adds a `TypeRef` row scoped to the `AssemblyRef` row `scope`.
    pub fn type_ref(mut self, scope: u32, namespace: &str, name: &str) -> Self {
        self.type_refs
            .push((scope, namespace.to_string(), name.to_string()));
        self
    }

    /// Adds `count` initialized data sections after `.text`.
    pub fn extra_sections(mut self, count: usize) -> Self {
        self.extra_sections = count;
        self
    }

    /// Grows `#Strings` by an unreferenced entry of `bytes` bytes.
    pub fn string_padding(mut self, bytes: usize) -> Self {
        self.string_padding = bytes;
        self
    }

    /// Adds a CodeView debug directory entry to `.text`.
    pub fn with_debug_directory(mut self) -> Self {
        self.debug_directory = true;
        self
    }

    /// Stores a valid PE checksum.
    pub fn with_checksum(mut self) -> Self {
        self.checksum = true;
        self
    }

    fn push_reference(
        mut self,
        name: &str,
        version: (u16, u16, u16, u16),
        blob: Vec<u8>,
        flags: u32,
    ) -> Self {
        self.references.push(Reference {
            name: name.to_string(),
            version,
            blob,
            flags,
        });
        self
    }

    /// Produces the image.
    pub fn build(&self) -> Vec<u8> {
        let section_count = 1 + self.extra_sections;
        let size_of_headers = align_to(SECTION_TABLE + section_count * 40, FILE_ALIGNMENT);
        assert!(size_of_headers <= TEXT_RVA, "too many sections for the fixed layout");

        let metadata = self.metadata();
        let mut text = vec![0u8; CLI_HEADER_SIZE];
        text.extend_from_slice(&metadata);

        patch_le(&mut text, 0, CLI_HEADER_SIZE as u32).unwrap();
        patch_le(&mut text, 4, 2_u16).unwrap();
        patch_le(&mut text, 6, 5_u16).unwrap();
        patch_le(&mut text, 8, (TEXT_RVA + CLI_HEADER_SIZE) as u32).unwrap();
        patch_le(&mut text, 12, metadata.len() as u32).unwrap();
        patch_le(&mut text, 16, 1_u32).unwrap();

        let mut debug = None;
        if self.debug_directory {
            text.resize(align_to(text.len(), 4), 0);
            let entry = text.len();

            let mut payload = b"RSDS".to_vec();
            payload.extend_from_slice(&[0x5A; 16]);
            payload.extend_from_slice(&1_u32.to_le_bytes());
            payload.extend_from_slice(b"x.pdb\0");

            let data = entry + DEBUG_ENTRY_SIZE;
            text.resize(data, 0);
            text.extend_from_slice(&payload);

            patch_le(&mut text, entry + 12, 2_u32).unwrap();
            patch_le(&mut text, entry + 16, payload.len() as u32).unwrap();
            patch_le(&mut text, entry + 20, (TEXT_RVA + data) as u32).unwrap();
            patch_le(&mut text, entry + 24, (size_of_headers + data) as u32).unwrap();
            debug = Some(TEXT_RVA + entry);
        }

        let mut sections = vec![Section {
            name: *b".text\0\0\0",
            data: text,
            characteristics: 0x6000_0020,
        }];
        for index in 0..self.extra_sections {
            let mut name = [0u8; 8];
            let label = format!(".sec{index}");
            name[..label.len()].copy_from_slice(label.as_bytes());
            sections.push(Section {
                name,
                data: vec![index as u8 + 1; 0x200],
                characteristics: 0x4000_0040,
            });
        }

        let mut image = vec![0u8; size_of_headers];
        image[0..2].copy_from_slice(b"MZ");
        patch_le(&mut image, 0x3C, PE_POINTER as u32).unwrap();
        image[PE_POINTER..PE_POINTER + 4].copy_from_slice(b"PE\0\0");

        let coff = PE_POINTER + 4;
        patch_le(&mut image, coff, 0x014C_u16).unwrap();
        patch_le(&mut image, coff + 2, section_count as u16).unwrap();
        patch_le(&mut image, coff + 16, OPTIONAL_HEADER_SIZE as u16).unwrap();
        patch_le(&mut image, coff + 18, 0x2102_u16).unwrap();

        let mut virtual_address = TEXT_RVA;
        let mut initialized_data = 0;
        for (index, section) in sections.iter().enumerate() {
            let raw_pointer = image.len();
            let raw_size = align_to(section.data.len(), FILE_ALIGNMENT);
            image.extend_from_slice(&section.data);
            image.resize(raw_pointer + raw_size, 0);

            let header = SECTION_TABLE + index * 40;
            image[header..header + 8].copy_from_slice(&section.name);
            patch_le(&mut image, header + 8, section.data.len() as u32).unwrap();
            patch_le(&mut image, header + 12, virtual_address as u32).unwrap();
            patch_le(&mut image, header + 16, raw_size as u32).unwrap();
            patch_le(&mut image, header + 20, raw_pointer as u32).unwrap();
            patch_le(&mut image, header + 36, section.characteristics).unwrap();

            if index > 0 {
                initialized_data += raw_size;
            }
            virtual_address = align_to(virtual_address + section.data.len(), SECTION_ALIGNMENT);
        }

        let optional = OPTIONAL_HEADER;
        let text_raw_size = align_to(sections[0].data.len(), FILE_ALIGNMENT);
        patch_le(&mut image, optional, 0x010B_u16).unwrap();
        image[optional + 2] = 8;
        patch_le(&mut image, optional + 4, text_raw_size as u32).unwrap();
        patch_le(&mut image, optional + 8, initialized_data as u32).unwrap();
        patch_le(&mut image, optional + 20, TEXT_RVA as u32).unwrap();
        patch_le(&mut image, optional + 28, 0x0040_0000_u32).unwrap();
        patch_le(&mut image, optional + 32, SECTION_ALIGNMENT as u32).unwrap();
        patch_le(&mut image, optional + 36, FILE_ALIGNMENT as u32).unwrap();
        patch_le(&mut image, optional + 40, 4_u16).unwrap();
        patch_le(&mut image, optional + 48, 4_u16).unwrap();
        patch_le(&mut image, optional + 56, virtual_address as u32).unwrap();
        patch_le(&mut image, optional + 60, size_of_headers as u32).unwrap();
        patch_le(&mut image, optional + 68, 3_u16).unwrap();
        patch_le(&mut image, optional + 70, 0x8540_u16).unwrap();
        patch_le(&mut image, optional + 72, 0x0010_0000_u32).unwrap();
        patch_le(&mut image, optional + 76, 0x1000_u32).unwrap();
        patch_le(&mut image, optional + 80, 0x0010_0000_u32).unwrap();
        patch_le(&mut image, optional + 84, 0x1000_u32).unwrap();
        patch_le(&mut image, optional + 92, 16_u32).unwrap();

        let directories = optional + 96;
        if let Some(rva) = debug {
            patch_le(&mut image, directories + 6 * 8, rva as u32).unwrap();
            patch_le(&mut image, directories + 6 * 8 + 4, DEBUG_ENTRY_SIZE as u32).unwrap();
        }
        patch_le(&mut image, directories + 14 * 8, TEXT_RVA as u32).unwrap();
        patch_le(&mut image, directories + 14 * 8 + 4, CLI_HEADER_SIZE as u32).unwrap();

        if self.checksum {
            let offset = optional + 64;
            let checksum = pe_checksum(&image, offset);
            patch_le(&mut image, offset, checksum).unwrap();
        }

        image
    }

    fn metadata(&self) -> Vec<u8> {
        let mut strings = StringHeapBuilder::new(Strings::from(&[0]).unwrap());
        let mut blobs = BlobHeapBuilder::new(&[0]);

        let module_name = strings.intern(&format!("{}.dll", self.name)).unwrap();
        let name = strings.intern(&self.name).unwrap();
        let culture = strings.intern(&self.culture).unwrap();
        let public_key = blobs.append(&self.public_key).unwrap();

        let references: Vec<Vec<u32>> = self
            .references
            .iter()
            .map(|reference| {
                let (major, minor, build, revision) = reference.version;
                vec![
                    u32::from(major),
                    u32::from(minor),
                    u32::from(build),
                    u32::from(revision),
                    reference.flags,
                    blobs.append(&reference.blob).unwrap(),
                    strings.intern(&reference.name).unwrap(),
                    0,
                    0,
                ]
            })
            .collect();
        let type_refs: Vec<Vec<u32>> = self
            .type_refs
            .iter()
            .map(|(scope, namespace, name)| {
                vec![
                    (scope << 2) | 2,
                    strings.intern(name).unwrap(),
                    strings.intern(namespace).unwrap(),
                ]
            })
            .collect();

        if self.string_padding > 0 {
            strings
                .intern(&"x".repeat(self.string_padding - 1))
                .unwrap();
        }

        let heap_sizes = if strings.len() >= 0x1_0000 {
            HEAP_LARGE_STRINGS
        } else {
            0
        };

        let (major, minor, build, revision) = self.version;
        let assembly = vec![
            0x8004,
            u32::from(major),
            u32::from(minor),
            u32::from(build),
            u32::from(revision),
            if self.public_key.is_empty() { 0 } else { 0x0001 },
            public_key,
            name,
            culture,
        ];

        let mut rows: Vec<(TableId, Vec<Vec<u32>>)> =
            vec![(TableId::Module, vec![vec![0, module_name, 1, 0, 0]])];
        if !type_refs.is_empty() {
            rows.push((TableId::TypeRef, type_refs));
        }
        rows.push((TableId::Assembly, vec![assembly]));
        if !references.is_empty() {
            rows.push((TableId::AssemblyRef, references));
        }

        let mut row_counts = [0u32; TableId::COUNT];
        let mut valid = 0u64;
        for (table, table_rows) in &rows {
            row_counts[*table as usize] = table_rows.len() as u32;
            valid |= 1 << (*table as u64);
        }
        let info = TableInfo::from_row_counts(&row_counts, heap_sizes);

        let mut tables = vec![0u8; 24];
        tables[4] = 2;
        tables[6] = heap_sizes;
        tables[7] = 1;
        tables[8..16].copy_from_slice(&valid.to_le_bytes());
        for (_, table_rows) in &rows {
            tables.extend_from_slice(&(table_rows.len() as u32).to_le_bytes());
        }
        for (table, table_rows) in &rows {
            for values in table_rows {
                write_row(*table, values, &mut tables, &info).unwrap();
            }
        }
        tables.resize(align_to(tables.len(), 4), 0);

        let streams = [
            ("#~", tables),
            ("#Strings", strings.finish()),
            ("#US", vec![0; 4]),
            ("#GUID", (1..=16).collect()),
            ("#Blob", blobs.finish()),
        ];

        let mut root = Root {
            signature: CIL_HEADER_MAGIC,
            major_version: 1,
            minor_version: 1,
            reserved: 0,
            length: align_to(RUNTIME_VERSION.len() + 1, 4) as u32,
            version: RUNTIME_VERSION.to_string(),
            flags: 0,
            stream_headers: streams
                .iter()
                .map(|(name, _)| StreamHeader {
                    offset: 0,
                    size: 0,
                    name: (*name).to_string(),
                })
                .collect(),
        };

        let mut offset = root.encoded_size();
        for (header, (_, data)) in root.stream_headers.iter_mut().zip(&streams) {
            header.offset = offset as u32;
            header.size = data.len() as u32;
            offset += data.len();
        }

        let mut metadata = root.to_bytes();
        for (_, data) in &streams {
            metadata.extend_from_slice(data);
        }
        metadata
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::view::AssemblyView;

    #[test]
    fn builds_parseable_image() {
        let image = AssemblyBuilder::new("Arena")
            .reference("Combat", (1, 0, 0, 0))
            .type_ref(1, "Combat", "Weapon")
            .build();
        let view = AssemblyView::from_mem(image).unwrap();

        assert_eq!(view.metadata_root().stream_headers.len(), 5);
        assert_eq!(view.metadata_root().stream_headers[0].name, "#~");
        assert_eq!(view.tables().table_row_count(TableId::TypeRef), 1);
        assert_eq!(view.dependencies().unwrap()[0].name(), "Combat");
    }

    #[test]
    fn padding_selects_wide_indexes() {
        let narrow = AssemblyView::from_mem(AssemblyBuilder::new("A").string_padding(0xFF00).build())
            .unwrap();
        assert!(!narrow.tables().info.is_large_str());

        let wide = AssemblyView::from_mem(AssemblyBuilder::new("A").string_padding(0x10000).build())
            .unwrap();
        assert!(wide.tables().info.is_large_str());
        assert_eq!(wide.identity().unwrap().name, "A");
    }
}

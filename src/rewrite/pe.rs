//! Placement of rebuilt metadata into a new PE section.
//!
//! The original metadata stays where it is and becomes dead data; the rebuilt metadata goes
//! into a `.meta` section appended after the last section, and the CLR header is re-pointed
//! at it. Growing the section table by one entry may need more header space than the image
//! has. In that case all section raw data moves back by a multiple of the file alignment and
//! every file-offset based structure that survives the edit follows it.

use crate::{
    error::RewriteError,
    file::{
        io::{patch_le, read_le},
        COFF_HEADER_SIZE, SECTION_HEADER_SIZE,
    },
    metadata::{cor20header::META_DATA_DIRECTORY_OFFSET, view::AssemblyView},
    rewrite::heaps::align_to,
};

/// Name of the section that receives rebuilt metadata.
pub const METADATA_SECTION_NAME: &[u8; 8] = b".meta\0\0\0";

/// `IMAGE_SCN_CNT_INITIALIZED_DATA | IMAGE_SCN_MEM_READ`
pub const METADATA_SECTION_CHARACTERISTICS: u32 = 0x4000_0040;

const OPT_SIZE_OF_INITIALIZED_DATA: usize = 8;
const OPT_SIZE_OF_IMAGE: usize = 56;
const OPT_SIZE_OF_HEADERS: usize = 60;
const OPT_CHECKSUM: usize = 64;
const OPT_DATA_DIRECTORIES_PE32: usize = 96;
const OPT_DATA_DIRECTORIES_PE32_PLUS: usize = 112;

const DIRECTORY_CERTIFICATE: usize = 4;
const DIRECTORY_DEBUG: usize = 6;

const DEBUG_DIRECTORY_ENTRY_SIZE: usize = 28;
const DEBUG_POINTER_TO_RAW_DATA: usize = 24;

/// Computes the PE image checksum, skipping the 4-byte field at `checksum_offset`.
///
/// The image is summed as 16-bit little-endian words with end-around carry; an odd trailing
/// byte counts as a word. The image length is added last.
#[must_use]
pub fn pe_checksum(data: &[u8], checksum_offset: usize) -> u32 {
    let mut checksum: u64 = 0;
    let mut offset = 0;
    while offset < data.len() {
        if offset >= checksum_offset && offset < checksum_offset + 4 {
            offset += 2;
            continue;
        }

        let word = if offset + 1 < data.len() {
            u64::from(u16::from_le_bytes([data[offset], data[offset + 1]]))
        } else {
            u64::from(data[offset])
        };

        checksum += word;
        checksum = (checksum & 0xFFFF) + (checksum >> 16);
        offset += 2;
    }

    checksum = (checksum & 0xFFFF) + (checksum >> 16);
    checksum += data.len() as u64;

    #[allow(clippy::cast_possible_truncation)]
    let checksum = checksum as u32;
    checksum
}

fn layout_error(message: impl Into<String>) -> RewriteError {
    RewriteError::Layout {
        message: message.into(),
    }
}

fn to_u32(value: usize, what: &str) -> Result<u32, RewriteError> {
    u32::try_from(value).map_err(|_| layout_error(format!("{what} 0x{value:x} overflows u32")))
}

/// Header offsets of the image being edited.
#[derive(Debug, Clone, Copy)]
struct HeaderLayout {
    coff: usize,
    optional: usize,
    section_table: usize,
    section_count: usize,
    data_directories: usize,
    data_directory_count: usize,
    file_alignment: usize,
    section_alignment: usize,
    size_of_headers: usize,
}

impl HeaderLayout {
    fn read(view: &AssemblyView) -> Result<Self, RewriteError> {
        let file = view.file();
        let data = file.data();

        let coff = file.pe_signature_offset() + 4;
        let optional = coff + COFF_HEADER_SIZE;
        let read_u16 = |offset: usize| -> Result<usize, RewriteError> {
            let bytes = data.get(offset..).ok_or(crate::Error::OutOfBounds)?;
            Ok(read_le::<u16>(bytes)? as usize)
        };
        let read_u32 = |offset: usize| -> Result<usize, RewriteError> {
            let bytes = data.get(offset..).ok_or(crate::Error::OutOfBounds)?;
            Ok(read_le::<u32>(bytes)? as usize)
        };

        let section_count = read_u16(coff + 2)?;
        let optional_size = read_u16(coff + 16)?;
        let (data_directories, count_offset) = if file.is_pe32_plus() {
            (optional + OPT_DATA_DIRECTORIES_PE32_PLUS, optional + 108)
        } else {
            (optional + OPT_DATA_DIRECTORIES_PE32, optional + 92)
        };

        let file_alignment = file.file_alignment()? as usize;
        let section_alignment = file.section_alignment()? as usize;
        if !file_alignment.is_power_of_two() || !section_alignment.is_power_of_two() {
            return Err(layout_error(format!(
                "invalid alignment: file 0x{file_alignment:x}, section 0x{section_alignment:x}"
            )));
        }

        Ok(HeaderLayout {
            coff,
            optional,
            section_table: optional + optional_size,
            section_count,
            data_directories,
            data_directory_count: read_u32(count_offset)?,
            file_alignment,
            section_alignment,
            size_of_headers: read_u32(optional + OPT_SIZE_OF_HEADERS)?,
        })
    }

    fn directory_offset(&self, index: usize) -> Option<usize> {
        (index < self.data_directory_count).then(|| self.data_directories + index * 8)
    }
}

/// Writes `metadata` into a new section of the image behind `view` and re-points the CLR
/// header at it. Returns the new image; the input is not modified.
///
/// # Errors
/// Returns [`RewriteError::Layout`] if the section table cannot grow or a size overflows,
/// and [`RewriteError::Malformed`] if the headers cannot be read.
pub fn place_metadata(
    view: &AssemblyView,
    metadata: &[u8],
    update_checksum: bool,
) -> Result<Vec<u8>, RewriteError> {
    let file = view.file();
    let data = file.data();
    let layout = HeaderLayout::read(view)?;

    let sections: Vec<_> = file.sections().cloned().collect();
    if sections.len() != layout.section_count {
        return Err(layout_error("section count does not match the section table"));
    }

    let first_raw = sections
        .iter()
        .filter(|section| section.size_of_raw_data > 0 && section.pointer_to_raw_data > 0)
        .map(|section| section.pointer_to_raw_data as usize)
        .min()
        .unwrap_or_else(|| align_to(data.len(), layout.file_alignment));
    let first_virtual = sections
        .iter()
        .map(|section| section.virtual_address as usize)
        .min()
        .unwrap_or(usize::MAX);

    let headers_end = layout.section_table + (layout.section_count + 1) * SECTION_HEADER_SIZE;
    let shift = if headers_end > first_raw {
        align_to(headers_end - first_raw, layout.file_alignment)
    } else {
        0
    };
    let size_of_headers = layout
        .size_of_headers
        .max(align_to(headers_end, layout.file_alignment));
    if size_of_headers > first_virtual {
        return Err(layout_error(format!(
            "no room for another section header: headers would reach 0x{size_of_headers:x}, first section starts at 0x{first_virtual:x}"
        )));
    }
    if shift > 0 {
        log::debug!(
            "growing PE headers to 0x{:x}, moving section data by 0x{:x}",
            size_of_headers,
            shift
        );
    }

    let mut out = Vec::with_capacity(data.len() + shift + metadata.len() + layout.file_alignment);
    let head = first_raw.min(data.len());
    out.extend_from_slice(&data[..head]);
    out.resize(head + shift, 0);
    out.extend_from_slice(&data[head..]);

    for (index, section) in sections.iter().enumerate() {
        if shift > 0 && section.pointer_to_raw_data != 0 {
            let entry = layout.section_table + index * SECTION_HEADER_SIZE;
            let moved = to_u32(section.pointer_to_raw_data as usize + shift, "section pointer")?;
            patch_le(&mut out, entry + 20, moved)?;
        }
    }

    if shift > 0 {
        if let Some(entry) = layout.directory_offset(DIRECTORY_DEBUG) {
            let rva = read_le::<u32>(&out[entry..])? as usize;
            let size = read_le::<u32>(&out[entry + 4..])? as usize;
            if rva != 0 && size != 0 {
                let start = file.rva_to_offset(rva)? + shift;
                for record in (start..start + size).step_by(DEBUG_DIRECTORY_ENTRY_SIZE) {
                    let pointer = record + DEBUG_POINTER_TO_RAW_DATA;
                    let raw = read_le::<u32>(out.get(pointer..).ok_or(crate::Error::OutOfBounds)?)?;
                    if raw != 0 {
                        patch_le(&mut out, pointer, to_u32(raw as usize + shift, "debug data")?)?;
                    }
                }
            }
        }
    }

    if let Some(entry) = layout.directory_offset(DIRECTORY_CERTIFICATE) {
        if read_le::<u64>(&out[entry..])? != 0 {
            log::warn!("dropping the Authenticode signature of the rewritten image");
            patch_le(&mut out, entry, 0_u64)?;
        }
    }

    let raw_pointer = align_to(out.len(), layout.file_alignment);
    let raw_size = align_to(metadata.len(), layout.file_alignment);
    let virtual_address = align_to(
        sections
            .iter()
            .map(|section| {
                section.virtual_address as usize
                    + section.virtual_size.max(section.size_of_raw_data) as usize
            })
            .max()
            .unwrap_or(size_of_headers),
        layout.section_alignment,
    );

    out.resize(raw_pointer, 0);
    out.extend_from_slice(metadata);
    out.resize(raw_pointer + raw_size, 0);

    let mut header = [0u8; SECTION_HEADER_SIZE];
    header[..8].copy_from_slice(METADATA_SECTION_NAME);
    patch_le(&mut header, 8, to_u32(metadata.len(), "metadata size")?)?;
    patch_le(&mut header, 12, to_u32(virtual_address, "section address")?)?;
    patch_le(&mut header, 16, to_u32(raw_size, "section size")?)?;
    patch_le(&mut header, 20, to_u32(raw_pointer, "section pointer")?)?;
    patch_le(&mut header, 36, METADATA_SECTION_CHARACTERISTICS)?;
    let entry = layout.section_table + layout.section_count * SECTION_HEADER_SIZE;
    out[entry..entry + SECTION_HEADER_SIZE].copy_from_slice(&header);

    let section_count = u16::try_from(layout.section_count + 1)
        .map_err(|_| layout_error("too many sections"))?;
    patch_le(&mut out, layout.coff + 2, section_count)?;

    let initialized = read_le::<u32>(&out[layout.optional + OPT_SIZE_OF_INITIALIZED_DATA..])?;
    patch_le(
        &mut out,
        layout.optional + OPT_SIZE_OF_INITIALIZED_DATA,
        initialized.saturating_add(to_u32(raw_size, "section size")?),
    )?;
    patch_le(
        &mut out,
        layout.optional + OPT_SIZE_OF_IMAGE,
        to_u32(
            align_to(virtual_address + metadata.len(), layout.section_alignment),
            "image size",
        )?,
    )?;
    patch_le(
        &mut out,
        layout.optional + OPT_SIZE_OF_HEADERS,
        to_u32(size_of_headers, "header size")?,
    )?;

    let directory = view.cor20_offset() + shift + META_DATA_DIRECTORY_OFFSET;
    patch_le(&mut out, directory, to_u32(virtual_address, "metadata address")?)?;
    patch_le(&mut out, directory + 4, to_u32(metadata.len(), "metadata size")?)?;

    let checksum_offset = layout.optional + OPT_CHECKSUM;
    if update_checksum && read_le::<u32>(&out[checksum_offset..])? != 0 {
        let checksum = pe_checksum(&out, checksum_offset);
        patch_le(&mut out, checksum_offset, checksum)?;
    }

    Ok(out)
}

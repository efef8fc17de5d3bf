//! Little-endian binary I/O for PE and metadata structures.
//!
//! All PE and ECMA-335 structures are little-endian. The helpers in this module perform
//! bounds-checked reads and in-place writes of fixed-size integers, plus the 2-or-4 byte
//! "dynamic" width used by heap and table indexes.
//!
//! Reads that run past the end of the buffer return [`crate::Error::OutOfBounds`]; they
//! never panic.

use crate::{Error::OutOfBounds, Result};

/// Integer types that can be read from and written to little-endian byte buffers.
pub trait CilIO: Sized + Copy {
    /// Fixed-size byte representation of this type.
    type Bytes: Sized + AsRef<[u8]> + for<'a> TryFrom<&'a [u8]>;

    /// Decodes a value from its little-endian bytes.
    fn from_le_bytes(bytes: Self::Bytes) -> Self;

    /// Encodes the value into its little-endian bytes.
    fn to_le_bytes(self) -> Self::Bytes;
}

macro_rules! impl_cil_io {
    ($($ty:ty => $len:expr),* $(,)?) => {
        $(
            impl CilIO for $ty {
                type Bytes = [u8; $len];

                fn from_le_bytes(bytes: Self::Bytes) -> Self {
                    <$ty>::from_le_bytes(bytes)
                }

                fn to_le_bytes(self) -> Self::Bytes {
                    <$ty>::to_le_bytes(self)
                }
            }
        )*
    };
}

impl_cil_io!(u8 => 1, u16 => 2, u32 => 4, u64 => 8, i32 => 4);

/// Reads a value of type `T` from the start of `data`.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if `data` is too short.
pub fn read_le<T: CilIO>(data: &[u8]) -> Result<T> {
    let mut offset = 0_usize;
    read_le_at(data, &mut offset)
}

/// Reads a value of type `T` at `offset` and advances `offset` past it.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if the value does not fit into `data`.
pub fn read_le_at<T: CilIO>(data: &[u8], offset: &mut usize) -> Result<T> {
    let type_len = std::mem::size_of::<T>();
    let Some(end) = offset.checked_add(type_len) else {
        return Err(OutOfBounds);
    };
    if end > data.len() {
        return Err(OutOfBounds);
    }

    let Ok(read) = data[*offset..end].try_into() else {
        return Err(OutOfBounds);
    };

    *offset = end;
    Ok(T::from_le_bytes(read))
}

/// Reads either a 2-byte or a 4-byte index at `offset`, widened to `u32`.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if the value does not fit into `data`.
pub fn read_le_at_dyn(data: &[u8], offset: &mut usize, is_large: bool) -> Result<u32> {
    let res = if is_large {
        read_le_at::<u32>(data, offset)?
    } else {
        u32::from(read_le_at::<u16>(data, offset)?)
    };

    Ok(res)
}

/// Writes `value` at `offset` and advances `offset` past it.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if the value does not fit into `data`.
pub fn write_le_at<T: CilIO>(data: &mut [u8], offset: &mut usize, value: T) -> Result<()> {
    let bytes = value.to_le_bytes();
    let bytes = bytes.as_ref();
    let Some(end) = offset.checked_add(bytes.len()) else {
        return Err(OutOfBounds);
    };
    if end > data.len() {
        return Err(OutOfBounds);
    }

    data[*offset..end].copy_from_slice(bytes);
    *offset = end;

    Ok(())
}

/// Writes `value` as a 2-byte or 4-byte index at `offset`.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if the value does not fit into `data`, or a
/// malformed error if a small index cannot hold `value`.
pub fn write_le_at_dyn(
    data: &mut [u8],
    offset: &mut usize,
    value: u32,
    is_large: bool,
) -> Result<()> {
    if is_large {
        write_le_at::<u32>(data, offset, value)
    } else {
        let Ok(small) = u16::try_from(value) else {
            return Err(malformed_error!(
                "Index {} does not fit into a 2-byte column",
                value
            ));
        };
        write_le_at::<u16>(data, offset, small)
    }
}

/// Patches a value at a fixed `offset` without tracking a cursor.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if the value does not fit into `data`.
pub fn patch_le<T: CilIO>(data: &mut [u8], offset: usize, value: T) -> Result<()> {
    let mut offset = offset;
    write_le_at(data, &mut offset, value)
}

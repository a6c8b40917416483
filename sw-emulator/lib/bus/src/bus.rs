/*++

Licensed under the Apache-2.0 license.

File Name:

    bus.rs

Abstract:

    File contains definition of the Bus trait.

--*/

use chaos_error::ChaosError;
use zerocopy::{FromBytes, Immutable, IntoBytes};

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum BusError {
    /// Load address misaligned exception
    LoadAddrMisaligned,

    /// Load access fault exception
    LoadAccessFault,

    /// Store address misaligned exception
    StoreAddrMisaligned,

    /// Store access fault exception
    StoreAccessFault,
}

impl From<BusError> for ChaosError {
    fn from(err: BusError) -> ChaosError {
        match err {
            BusError::LoadAddrMisaligned => ChaosError::BUS_LOAD_ADDR_MISALIGNED,
            BusError::LoadAccessFault => ChaosError::BUS_LOAD_ACCESS_FAULT,
            BusError::StoreAddrMisaligned => ChaosError::BUS_STORE_ADDR_MISALIGNED,
            BusError::StoreAccessFault => ChaosError::BUS_STORE_ACCESS_FAULT,
        }
    }
}

/// Represents a bounds-checked view of a shared memory region. Offsets are
/// relative to the start of the region; every access outside of it fails
/// without touching memory.
pub trait Bus {
    /// Size of the region in bytes
    fn len(&self) -> usize;

    /// Read `buf.len()` bytes starting at `offset`
    ///
    /// # Arguments
    ///
    /// * `offset` - Offset to read from
    /// * `buf` - Destination buffer
    ///
    /// # Error
    ///
    /// * `BusError::LoadAccessFault` - Range is not fully inside the region
    fn read_bytes(&self, offset: usize, buf: &mut [u8]) -> Result<(), BusError>;

    /// Write `data` starting at `offset`
    ///
    /// # Arguments
    ///
    /// * `offset` - Offset to write
    /// * `data` - Data to write
    ///
    /// # Error
    ///
    /// * `BusError::StoreAccessFault` - Range is not fully inside the region
    fn write_bytes(&self, offset: usize, data: &[u8]) -> Result<(), BusError>;

    /// Fill `len` bytes starting at `offset` with `val`
    fn fill(&self, offset: usize, len: usize, val: u8) -> Result<(), BusError>;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns true if `[offset, offset + len)` lies inside the region
    fn contains(&self, offset: usize, len: usize) -> bool {
        offset
            .checked_add(len)
            .map(|end| end <= self.len())
            .unwrap_or(false)
    }

    /// Read a plain-old-data value at `offset`
    fn read_obj<T: FromBytes + IntoBytes>(&self, offset: usize) -> Result<T, BusError> {
        let mut val = T::new_zeroed();
        self.read_bytes(offset, val.as_mut_bytes())?;
        Ok(val)
    }

    /// Write a plain-old-data value at `offset`
    fn write_obj<T: IntoBytes + Immutable>(&self, offset: usize, val: &T) -> Result<(), BusError> {
        self.write_bytes(offset, val.as_bytes())
    }
}

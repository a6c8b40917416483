/*++

Licensed under the Apache-2.0 license.

File Name:

    buffer.rs

Abstract:

    File contains the bounded scratch buffer used to move data in and out of
    the sandboxed child.

--*/

use crate::Inferior;
use chaos_error::{ChaosError, ChaosResult};

/// Bounded, non-empty byte buffer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Buffer {
    data: Vec<u8>,
}

impl Buffer {
    /// Largest transfer accepted from the child
    pub const MAX_SIZE: usize = 0x10_0000;

    /// Zeroed buffer of `size` bytes
    pub fn new(size: usize) -> ChaosResult<Self> {
        Self::check_size(size)?;
        Ok(Self {
            data: vec![0u8; size],
        })
    }

    pub fn from_slice(data: &[u8]) -> ChaosResult<Self> {
        Self::check_size(data.len())?;
        Ok(Self {
            data: data.to_vec(),
        })
    }

    fn check_size(size: usize) -> ChaosResult<()> {
        if size == 0 || size > Self::MAX_SIZE {
            return Err(ChaosError::SANDBOX_BUFFER_INVALID_SIZE);
        }
        Ok(())
    }

    /// Copy `size` bytes out of the child
    ///
    /// # Arguments
    ///
    /// * `inferior` - Child to read from
    /// * `addr` - Child address
    /// * `size` - Transfer size
    pub fn from_inferior<I: Inferior + ?Sized>(
        inferior: &mut I,
        addr: u64,
        size: usize,
    ) -> ChaosResult<Self> {
        let mut buf = Self::new(size)?;
        inferior.read_memory(addr, &mut buf.data)?;
        Ok(buf)
    }

    /// Copy the whole buffer into the child at `addr`
    pub fn to_inferior<I: Inferior + ?Sized>(&self, inferior: &mut I, addr: u64) -> ChaosResult<()> {
        inferior.write_memory(addr, &self.data)
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/*++

Licensed under the Apache-2.0 license.

File Name:

    dram.rs

Abstract:

    File contains the allocator that carves the shared DRAM region into
    rings, request scratch and client buffers.

--*/

use chaos_error::{ChaosError, ChaosResult};
use std::sync::{Mutex, MutexGuard};

/// Allocation granule; the widest atomic access of the transport
pub const DRAM_GRANULE: usize = 8;

/// A range of the shared DRAM region.
///
/// Owned by whoever allocated it and released by passing it back to
/// [`DramPool::free`].
#[derive(Debug, PartialEq, Eq)]
pub struct Resource {
    offset: usize,
    size: usize,
}

impl Resource {
    /// Offset of the range from the start of DRAM, as seen by the device
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Size in bytes, rounded up to the granule
    pub fn size(&self) -> usize {
        self.size
    }

    /// Process-local address of the range inside a mapping at `base`
    pub fn addr(&self, base: usize) -> usize {
        base + self.offset
    }

    pub fn end(&self) -> usize {
        self.offset + self.size
    }
}

struct PoolState {
    /// Free ranges as (offset, size), sorted by offset, never adjacent
    free: Vec<(usize, usize)>,
    available: usize,
}

/// First-fit allocator over the DRAM region
pub struct DramPool {
    capacity: usize,
    granule: usize,
    state: Mutex<PoolState>,
}

impl DramPool {
    /// Create a pool
    ///
    /// # Arguments
    ///
    /// * `region_size` - Size of DRAM; rounded down to the granule
    /// * `granule` - Allocation granule; a non-zero power of two
    pub fn new(region_size: usize, granule: usize) -> ChaosResult<Self> {
        if granule == 0 || !granule.is_power_of_two() {
            return Err(ChaosError::DRIVER_DRAM_INVALID_SIZE);
        }
        let capacity = region_size & !(granule - 1);
        if capacity == 0 {
            return Err(ChaosError::DRIVER_DRAM_INVALID_SIZE);
        }
        Ok(Self {
            capacity,
            granule,
            state: Mutex::new(PoolState {
                free: vec![(0, capacity)],
                available: capacity,
            }),
        })
    }

    fn lock(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Bytes not handed out
    pub fn available(&self) -> usize {
        self.lock().available
    }

    /// Allocate at least `size` bytes
    ///
    /// # Error
    ///
    /// * `DRIVER_DRAM_INVALID_SIZE` - `size` is zero
    /// * `DRIVER_DRAM_NO_SPACE` - No free range is large enough
    pub fn allocate(&self, size: usize) -> ChaosResult<Resource> {
        if size == 0 {
            return Err(ChaosError::DRIVER_DRAM_INVALID_SIZE);
        }
        let size = size
            .checked_add(self.granule - 1)
            .map(|size| size & !(self.granule - 1))
            .ok_or(ChaosError::DRIVER_DRAM_NO_SPACE)?;

        let mut state = self.lock();
        let Some(idx) = state.free.iter().position(|&(_, len)| len >= size) else {
            log::debug!(
                "no room for {size:#x} bytes, {:#x} available",
                state.available
            );
            return Err(ChaosError::DRIVER_DRAM_NO_SPACE);
        };
        let (offset, len) = state.free[idx];
        if len == size {
            state.free.remove(idx);
        } else {
            state.free[idx] = (offset + size, len - size);
        }
        state.available -= size;
        Ok(Resource { offset, size })
    }

    /// Return `resource` to the pool
    ///
    /// # Error
    ///
    /// * `DRIVER_DRAM_INVALID_FREE` - The range does not belong to this pool
    ///   or overlaps a free range
    pub fn free(&self, resource: Resource) -> ChaosResult<()> {
        if resource.end() > self.capacity || resource.size == 0 {
            return Err(ChaosError::DRIVER_DRAM_INVALID_FREE);
        }
        let mut state = self.lock();
        let idx = state
            .free
            .partition_point(|&(offset, _)| offset < resource.offset);

        let prev = idx.checked_sub(1).map(|i| state.free[i]);
        let next = state.free.get(idx).copied();
        if prev.is_some_and(|(offset, len)| offset + len > resource.offset)
            || next.is_some_and(|(offset, _)| offset < resource.end())
        {
            log::error!(
                "free of {:#x}+{:#x} overlaps a free range",
                resource.offset,
                resource.size
            );
            return Err(ChaosError::DRIVER_DRAM_INVALID_FREE);
        }

        let merge_prev = prev.is_some_and(|(offset, len)| offset + len == resource.offset);
        let merge_next = next.is_some_and(|(offset, _)| offset == resource.end());
        match (merge_prev, merge_next) {
            (true, true) => {
                let (_, next_len) = state.free.remove(idx);
                state.free[idx - 1].1 += resource.size + next_len;
            }
            (true, false) => state.free[idx - 1].1 += resource.size,
            (false, true) => {
                let next_len = state.free[idx].1;
                state.free[idx] = (resource.offset, resource.size + next_len);
            }
            (false, false) => state.free.insert(idx, (resource.offset, resource.size)),
        }
        state.available += resource.size;
        Ok(())
    }
}

impl Drop for DramPool {
    fn drop(&mut self) {
        let available = self.available();
        if available != self.capacity && !std::thread::panicking() {
            panic!(
                "DRAM pool dropped with {:#x} bytes still allocated",
                self.capacity - available
            );
        }
    }
}

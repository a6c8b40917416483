/*++

Licensed under the Apache-2.0 license.

File Name:

    shared.rs

Abstract:

    File contains the shared memory regions backing the register file and
    DRAM. The mappings are MAP_SHARED so that a forked firmware context
    observes and mutates the same pages as the host.

--*/

use crate::{Bus, BusError};
use chaos_error::{ChaosError, ChaosResult};
use core::marker::PhantomData;
use core::ptr::NonNull;
use core::sync::atomic::{AtomicU64, Ordering};

/// Owned anonymous shared mapping.
pub struct SharedMemory {
    base: NonNull<u8>,
    len: usize,
}

// The mapping is plain memory; concurrent access is coordinated through the
// atomic register accessors.
unsafe impl Send for SharedMemory {}
unsafe impl Sync for SharedMemory {}

impl SharedMemory {
    /// Map `len` zeroed bytes anywhere in the address space
    pub fn new(len: usize) -> ChaosResult<Self> {
        Self::map(len, 0)
    }

    /// Map `len` zeroed bytes entirely below 4 GiB, so that every address in
    /// the region fits the 32-bit pointer half of a packed buffer.
    pub fn new_low(len: usize) -> ChaosResult<Self> {
        #[cfg(all(target_os = "linux", target_arch = "x86_64"))]
        let mem = Self::map(len, libc::MAP_32BIT)?;
        #[cfg(not(all(target_os = "linux", target_arch = "x86_64")))]
        let mem = Self::map(len, 0)?;

        if mem.base_addr() as u64 + len as u64 > u32::MAX as u64 {
            log::error!(
                "shared region at {:#x} is not addressable with 32 bits",
                mem.base_addr()
            );
            return Err(ChaosError::DEVICE_DRAM_NOT_ADDRESSABLE);
        }
        Ok(mem)
    }

    fn map(len: usize, extra_flags: libc::c_int) -> ChaosResult<Self> {
        if len == 0 {
            return Err(ChaosError::BUS_MMAP_FAILED);
        }
        // SAFETY: anonymous mapping with no fixed address; the kernel picks
        // a range that does not alias existing memory.
        let ptr = unsafe {
            libc::mmap(
                core::ptr::null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED | libc::MAP_ANONYMOUS | extra_flags,
                -1,
                0,
            )
        };
        if ptr == libc::MAP_FAILED {
            log::error!(
                "mmap of {len:#x} shared bytes failed: {}",
                std::io::Error::last_os_error()
            );
            return Err(ChaosError::BUS_MMAP_FAILED);
        }
        let base = NonNull::new(ptr as *mut u8).ok_or(ChaosError::BUS_MMAP_FAILED)?;
        Ok(Self { base, len })
    }

    /// Process-local address of the first byte
    pub fn base_addr(&self) -> usize {
        self.base.as_ptr() as usize
    }

    /// Borrow the region as a [`MemoryView`]
    pub fn view(&self) -> MemoryView<'_> {
        MemoryView {
            base: self.base,
            len: self.len,
            _marker: PhantomData,
        }
    }
}

impl Drop for SharedMemory {
    fn drop(&mut self) {
        // SAFETY: base/len describe the mapping created in `map`.
        unsafe {
            libc::munmap(self.base.as_ptr() as *mut libc::c_void, self.len);
        }
    }
}

impl Bus for SharedMemory {
    fn len(&self) -> usize {
        self.len
    }

    fn read_bytes(&self, offset: usize, buf: &mut [u8]) -> Result<(), BusError> {
        self.view().read_bytes(offset, buf)
    }

    fn write_bytes(&self, offset: usize, data: &[u8]) -> Result<(), BusError> {
        self.view().write_bytes(offset, data)
    }

    fn fill(&self, offset: usize, len: usize, val: u8) -> Result<(), BusError> {
        self.view().fill(offset, len, val)
    }
}

/// Non-owning view of a memory region.
///
/// Used by the firmware context, which receives raw base addresses, and by
/// components that borrow a [`SharedMemory`].
#[derive(Clone, Copy)]
pub struct MemoryView<'a> {
    base: NonNull<u8>,
    len: usize,
    _marker: PhantomData<&'a ()>,
}

// Same reasoning as SharedMemory: plain memory, synchronized externally.
unsafe impl Send for MemoryView<'_> {}
unsafe impl Sync for MemoryView<'_> {}

impl<'a> MemoryView<'a> {
    /// Build a view from a raw base address
    ///
    /// # Safety
    ///
    /// `[base, base + len)` must be mapped readable and writable for `'a`.
    pub unsafe fn from_raw(base: *mut u8, len: usize) -> Option<Self> {
        Some(Self {
            base: NonNull::new(base)?,
            len,
            _marker: PhantomData,
        })
    }

    pub fn base_addr(&self) -> usize {
        self.base.as_ptr() as usize
    }

    /// Atomic 64-bit load of an aligned register
    pub fn load_u64(&self, offset: usize, order: Ordering) -> Result<u64, BusError> {
        let reg = self.atomic(
            offset,
            BusError::LoadAddrMisaligned,
            BusError::LoadAccessFault,
        )?;
        Ok(reg.load(order))
    }

    /// Atomic 64-bit store to an aligned register
    pub fn store_u64(&self, offset: usize, val: u64, order: Ordering) -> Result<(), BusError> {
        let reg = self.atomic(
            offset,
            BusError::StoreAddrMisaligned,
            BusError::StoreAccessFault,
        )?;
        reg.store(val, order);
        Ok(())
    }

    fn atomic(
        &self,
        offset: usize,
        misaligned: BusError,
        fault: BusError,
    ) -> Result<&AtomicU64, BusError> {
        if offset % 8 != 0 || self.base_addr() % 8 != 0 {
            return Err(misaligned);
        }
        if !self.contains(offset, 8) {
            return Err(fault);
        }
        // SAFETY: in bounds and 8-byte aligned; AtomicU64 has the layout of u64.
        Ok(unsafe { &*(self.base.as_ptr().add(offset) as *const AtomicU64) })
    }
}

impl Bus for MemoryView<'_> {
    fn len(&self) -> usize {
        self.len
    }

    fn read_bytes(&self, offset: usize, buf: &mut [u8]) -> Result<(), BusError> {
        if !self.contains(offset, buf.len()) {
            return Err(BusError::LoadAccessFault);
        }
        // SAFETY: range checked above; the destination is a distinct Rust
        // allocation so the ranges cannot overlap.
        unsafe {
            core::ptr::copy_nonoverlapping(
                self.base.as_ptr().add(offset),
                buf.as_mut_ptr(),
                buf.len(),
            );
        }
        Ok(())
    }

    fn write_bytes(&self, offset: usize, data: &[u8]) -> Result<(), BusError> {
        if !self.contains(offset, data.len()) {
            return Err(BusError::StoreAccessFault);
        }
        // SAFETY: range checked above. `copy` tolerates a source slice that
        // was itself read out of this region.
        unsafe {
            core::ptr::copy(data.as_ptr(), self.base.as_ptr().add(offset), data.len());
        }
        Ok(())
    }

    fn fill(&self, offset: usize, len: usize, val: u8) -> Result<(), BusError> {
        if !self.contains(offset, len) {
            return Err(BusError::StoreAccessFault);
        }
        // SAFETY: range checked above.
        unsafe {
            core::ptr::write_bytes(self.base.as_ptr().add(offset), val, len);
        }
        Ok(())
    }
}

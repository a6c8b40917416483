/*++

Licensed under the Apache-2.0 license.

File Name:

    region.rs

Abstract:

    File contains the private execution and stack mappings of the sandbox.
    Both are placed low in the address space so the firmware can hand their
    addresses through 32-bit packed pointers.

--*/

use chaos_error::{ChaosError, ChaosResult};
use core::ptr::NonNull;

struct Mapping {
    base: NonNull<u8>,
    len: usize,
}

// Plain process-private memory; only the owning device thread touches it.
unsafe impl Send for Mapping {}

impl Mapping {
    fn new(len: usize, prot: libc::c_int) -> ChaosResult<Self> {
        if len == 0 {
            return Err(ChaosError::SANDBOX_REGION_MAP_FAILED);
        }
        #[cfg(all(target_os = "linux", target_arch = "x86_64"))]
        let flags = libc::MAP_PRIVATE | libc::MAP_ANONYMOUS | libc::MAP_32BIT;
        #[cfg(not(all(target_os = "linux", target_arch = "x86_64")))]
        let flags = libc::MAP_PRIVATE | libc::MAP_ANONYMOUS;

        // SAFETY: anonymous mapping at a kernel-chosen address.
        let ptr = unsafe { libc::mmap(core::ptr::null_mut(), len, prot, flags, -1, 0) };
        if ptr == libc::MAP_FAILED {
            log::error!(
                "mapping {len:#x} byte sandbox region failed: {}",
                std::io::Error::last_os_error()
            );
            return Err(ChaosError::SANDBOX_REGION_MAP_FAILED);
        }
        let base = NonNull::new(ptr as *mut u8).ok_or(ChaosError::SANDBOX_REGION_MAP_FAILED)?;
        Ok(Self { base, len })
    }

    fn addr(&self) -> u64 {
        self.base.as_ptr() as u64
    }

    fn as_mut_slice(&mut self) -> &mut [u8] {
        // SAFETY: base/len describe a live read-write mapping owned by self.
        unsafe { core::slice::from_raw_parts_mut(self.base.as_ptr(), self.len) }
    }
}

impl Drop for Mapping {
    fn drop(&mut self) {
        // SAFETY: base/len describe the mapping created in `new`.
        unsafe {
            libc::munmap(self.base.as_ptr() as *mut libc::c_void, self.len);
        }
    }
}

/// Executable region holding the loaded firmware code
pub struct ExecRegion {
    mem: Mapping,
}

impl ExecRegion {
    pub const DEFAULT_SIZE: usize = 0x10_0000;

    pub fn new(size: usize) -> ChaosResult<Self> {
        let mem = Mapping::new(
            size,
            libc::PROT_READ | libc::PROT_WRITE | libc::PROT_EXEC,
        )?;
        Ok(Self { mem })
    }

    /// Address of the first instruction
    pub fn entry(&self) -> u64 {
        self.mem.addr()
    }

    pub fn capacity(&self) -> usize {
        self.mem.len
    }

    /// Zero the region, then copy `code` to its start
    pub fn load(&mut self, code: &[u8]) -> ChaosResult<()> {
        if code.len() > self.capacity() {
            return Err(ChaosError::SANDBOX_CODE_TOO_LARGE);
        }
        let region = self.mem.as_mut_slice();
        region.fill(0);
        region[..code.len()].copy_from_slice(code);
        Ok(())
    }

    /// Zero the region
    pub fn clear(&mut self) {
        self.mem.as_mut_slice().fill(0);
    }
}

/// Stack for the firmware
pub struct StackRegion {
    mem: Mapping,
}

impl StackRegion {
    pub const DEFAULT_SIZE: usize = 0x1_0000;

    pub fn new(size: usize) -> ChaosResult<Self> {
        let mem = Mapping::new(size, libc::PROT_READ | libc::PROT_WRITE)?;
        Ok(Self { mem })
    }

    /// Initial stack pointer: the 16-byte aligned end of the region
    pub fn top(&self) -> u64 {
        (self.mem.addr() + self.mem.len as u64) & !0xf
    }
}

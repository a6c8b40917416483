/*++

Licensed under the Apache-2.0 license.

File Name:

    syscalls.rs

Abstract:

    File contains the crypto capability as seen from the firmware.

--*/

use chaos_api::errno;
use chaos_api::{Algorithm, PackedBuf};
use chaos_emu_bus::{Bus, MemoryView};
use chaos_emu_crypto::CryptoBackend;

/// The one capability the firmware is allowed to use
pub trait Syscalls {
    /// Run `algo` over `input` and `key`, writing into `output`
    ///
    /// # Arguments
    ///
    /// * `algo` - Raw algorithm code
    /// * `input` - Input buffer
    /// * `key` - Key buffer
    /// * `output` - Output buffer
    ///
    /// # Returns
    ///
    /// * `i64` - Bytes produced, or a negative errno
    fn crypto(&self, algo: u32, input: PackedBuf, key: PackedBuf, output: PackedBuf) -> i64;
}

impl<T: Syscalls + ?Sized> Syscalls for &T {
    fn crypto(&self, algo: u32, input: PackedBuf, key: PackedBuf, output: PackedBuf) -> i64 {
        (**self).crypto(algo, input, key, output)
    }
}

/// Issues the capability with the `syscall` instruction; the sandbox
/// emulates it.
#[cfg(all(target_os = "linux", target_arch = "x86_64"))]
#[derive(Debug, Default, Clone, Copy)]
pub struct RawSyscalls;

#[cfg(all(target_os = "linux", target_arch = "x86_64"))]
impl Syscalls for RawSyscalls {
    fn crypto(&self, algo: u32, input: PackedBuf, key: PackedBuf, output: PackedBuf) -> i64 {
        let ret: i64;
        // SAFETY: the call takes register arguments only. The tracer may
        // write the output buffer, which the compiler already assumes since
        // the block is not marked `nomem`.
        unsafe {
            core::arch::asm!(
                "syscall",
                inlateout("rax") chaos_api::syscall::SYS_CHAOS_CRYPTO as i64 => ret,
                in("rdi") algo as u64,
                in("rsi") input.pack(),
                in("rdx") key.pack(),
                in("r10") output.pack(),
                lateout("rcx") _,
                lateout("r11") _,
                options(nostack),
            );
        }
        ret
    }
}

/// Terminate the firmware with `code`
#[cfg(all(target_os = "linux", target_arch = "x86_64"))]
pub fn sys_exit(code: i64) -> ! {
    // SAFETY: exit does not return and touches no memory.
    unsafe {
        core::arch::asm!(
            "syscall",
            in("rax") chaos_api::syscall::SYS_EXIT,
            in("rdi") code,
            options(noreturn, nostack),
        );
    }
}

/// Services the capability directly against a DRAM view, for running the
/// firmware logic without a sandbox.
pub struct InProcessSyscalls<'a, C: CryptoBackend> {
    dram: MemoryView<'a>,
    base: usize,
    backend: C,
}

impl<'a, C: CryptoBackend> InProcessSyscalls<'a, C> {
    /// Create an instance
    ///
    /// # Arguments
    ///
    /// * `dram` - DRAM region
    /// * `base` - Address the firmware uses for DRAM offset 0
    /// * `backend` - Crypto implementation
    pub fn new(dram: MemoryView<'a>, base: usize, backend: C) -> Self {
        Self {
            dram,
            base,
            backend,
        }
    }

    fn offset(&self, addr: u32, len: usize) -> Option<usize> {
        let offset = (addr as usize).checked_sub(self.base)?;
        self.dram.contains(offset, len).then_some(offset)
    }

    // Empty transfers are refused, as in the sandbox
    fn load(&self, buf: PackedBuf) -> Option<Vec<u8>> {
        if buf.len == 0 {
            return None;
        }
        let mut data = vec![0u8; buf.len as usize];
        let offset = self.offset(buf.addr, data.len())?;
        self.dram.read_bytes(offset, &mut data).ok()?;
        Some(data)
    }

    fn store(&self, addr: u32, data: &[u8]) -> Option<()> {
        let offset = self.offset(addr, data.len())?;
        self.dram.write_bytes(offset, data).ok()
    }
}

impl<C: CryptoBackend> Syscalls for InProcessSyscalls<'_, C> {
    fn crypto(&self, algo: u32, input: PackedBuf, key: PackedBuf, output: PackedBuf) -> i64 {
        let Ok(algo) = Algorithm::try_from(algo) else {
            return -errno::ENOSYS;
        };
        let Some(input_data) = self.load(input) else {
            return -errno::EFAULT;
        };
        let key_data = if algo.uses_key() {
            match self.load(key) {
                Some(data) => data,
                None => return -errno::EFAULT,
            }
        } else {
            Vec::new()
        };
        let out = match self.backend.transform(algo, &input_data, &key_data) {
            Ok(out) => out,
            Err(err) => {
                log::debug!("in-process {algo:?} failed: {err}");
                return -errno::EINVAL;
            }
        };
        if out.len() > output.len as usize {
            return -errno::EOVERFLOW;
        }
        if self.store(output.addr, &out).is_none() {
            return -errno::EFAULT;
        }
        out.len() as i64
    }
}

/*++

Licensed under the Apache-2.0 license.

File Name:

    entry.rs

Abstract:

    File contains the firmware entry point and the trampoline that forms a
    loadable image around it.

--*/

#[cfg(all(target_os = "linux", target_arch = "x86_64"))]
mod fw {
    use crate::{handle_mailbox, sys_exit, Dispatcher, Fatal, RawSyscalls};
    use chaos_api::csr::CSRS_SIZE;
    use chaos_api::syscall::FIRMWARE_FATAL_EXIT;
    use chaos_emu_bus::{CsrBlock, MemoryView};
    use chaos_error::ChaosError;

    /// Firmware entry point
    ///
    /// # Arguments
    ///
    /// * `csr_base` - Address of the register file
    /// * `dram_base` - Address of DRAM
    /// * `dram_size` - Size of DRAM in bytes
    pub extern "C" fn firmware_entry(csr_base: u64, dram_base: u64, dram_size: u64) -> ! {
        match run(csr_base, dram_base, dram_size) {
            Ok(()) => sys_exit(0),
            Err(_) => sys_exit(FIRMWARE_FATAL_EXIT),
        }
    }

    fn run(csr_base: u64, dram_base: u64, dram_size: u64) -> Result<(), Fatal> {
        // SAFETY: the device maps both regions shared before the sandbox
        // forks, so they are live at these addresses in the child.
        let csr_mem = unsafe { MemoryView::from_raw(csr_base as *mut u8, CSRS_SIZE) }
            .ok_or(Fatal(ChaosError::FIRMWARE_INVALID_COMMAND))?;
        let dram = unsafe { MemoryView::from_raw(dram_base as *mut u8, dram_size as usize) }
            .ok_or(Fatal(ChaosError::FIRMWARE_INVALID_COMMAND))?;
        let csr = CsrBlock::new(csr_mem)?;
        let dispatcher = Dispatcher::new(RawSyscalls, dram, dram_base as usize);
        handle_mailbox(&csr, &dispatcher)
    }
}

#[cfg(all(target_os = "linux", target_arch = "x86_64"))]
pub use fw::firmware_entry;

/// Builds position-independent x86-64 code that loads the entry arguments
/// and calls the entry point:
///
/// ```text
/// movabs rdi, csr_base
/// movabs rsi, dram_base
/// movabs rdx, dram_size
/// movabs rax, entry
/// call   rax
/// ud2
/// ```
pub struct Trampoline;

impl Trampoline {
    pub fn build(csr_base: u64, dram_base: u64, dram_size: u64, entry: u64) -> Vec<u8> {
        let mut code = Vec::with_capacity(44);
        for (opcode, imm) in [
            (0xbf, csr_base),
            (0xbe, dram_base),
            (0xba, dram_size),
            (0xb8, entry),
        ] {
            code.extend_from_slice(&[0x48, opcode]);
            code.extend_from_slice(&imm.to_le_bytes());
        }
        code.extend_from_slice(&[0xff, 0xd0, 0x0f, 0x0b]);
        code
    }

    /// Trampoline into [`firmware_entry`] of this process
    #[cfg(all(target_os = "linux", target_arch = "x86_64"))]
    pub fn for_firmware_entry(csr_base: u64, dram_base: u64, dram_size: u64) -> Vec<u8> {
        let entry: extern "C" fn(u64, u64, u64) -> ! = firmware_entry;
        Self::build(csr_base, dram_base, dram_size, entry as usize as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trampoline_bytes() {
        let code = Trampoline::build(0x10000, 0x1000_0000, 0x10_0000, 0x1122_3344_5566_7788);
        assert_eq!(code.len(), 44);
        assert_eq!(&code[0..2], &[0x48, 0xbf]);
        assert_eq!(&code[2..10], &0x10000u64.to_le_bytes());
        assert_eq!(&code[10..12], &[0x48, 0xbe]);
        assert_eq!(&code[20..22], &[0x48, 0xba]);
        assert_eq!(&code[22..30], &0x10_0000u64.to_le_bytes());
        assert_eq!(&code[30..32], &[0x48, 0xb8]);
        assert_eq!(&code[32..40], &0x1122_3344_5566_7788u64.to_le_bytes());
        assert_eq!(&code[40..], &[0xff, 0xd0, 0x0f, 0x0b]);
    }
}
